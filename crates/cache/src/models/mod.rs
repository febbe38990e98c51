mod entry;
mod facet;

pub(crate) use self::entry::EntryRow;
