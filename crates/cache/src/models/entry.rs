use crate::error::{Error, ErrorKind};
use crate::models::facet::{AuthorProxy, DownloadLinkProxy, PreviewProxy};
use exn::ResultExt;
use facet_json::{from_str as from_json, to_string as to_json};
use knewstuff_feed::models::{Author, DownloadLink, Entry, Source, Status};
use time::{Date, UtcDateTime};

#[derive(sqlx::FromRow)]
pub(crate) struct EntryRow {
    pub(crate) provider_id: String,
    pub(crate) unique_id: String,
    pub(crate) name: String,
    pub(crate) category: String,
    pub(crate) license: String,
    pub(crate) version: String,
    pub(crate) update_version: String,
    #[sqlx(default)]
    pub(crate) release_date: Option<i64>,
    #[sqlx(default)]
    pub(crate) update_release_date: Option<i64>,
    pub(crate) author: String,
    pub(crate) summary: String,
    pub(crate) short_summary: String,
    pub(crate) changelog: String,
    pub(crate) homepage: String,
    pub(crate) payload: String,
    pub(crate) previews: String,
    #[sqlx(default)]
    pub(crate) rating: Option<i64>,
    #[sqlx(default)]
    pub(crate) downloads: Option<i64>,
    #[sqlx(default)]
    pub(crate) fans: Option<i64>,
    pub(crate) donation_link: String,
    pub(crate) installed_files: String,
    pub(crate) download_links: String,
    pub(crate) status: String,
    pub(crate) updated_at: i64,
}

fn to_timestamp(date: Option<Date>) -> Option<i64> {
    date.map(|date| date.midnight().as_utc().unix_timestamp())
}

fn from_timestamp(timestamp: Option<i64>, field: &'static str) -> Result<Option<Date>, Error> {
    timestamp
        .map(|ts| UtcDateTime::from_unix_timestamp(ts).map(|dt| dt.date()).or_raise(|| ErrorKind::InvalidData(field)))
        .transpose()
}

impl TryFrom<&Entry> for EntryRow {
    type Error = Error;
    fn try_from(entry: &Entry) -> Result<Self, Self::Error> {
        let previews = entry.previews.iter().map(PreviewProxy::from).collect::<Vec<_>>();
        let links = entry.download_links.iter().map(DownloadLinkProxy::from).collect::<Vec<_>>();
        Ok(Self {
            provider_id: entry.provider_id.clone(),
            unique_id: entry.unique_id.clone(),
            name: entry.name.clone(),
            category: entry.category.clone(),
            license: entry.license.clone(),
            version: entry.version.clone(),
            update_version: entry.update_version.clone(),
            release_date: to_timestamp(entry.release_date),
            update_release_date: to_timestamp(entry.update_release_date),
            author: to_json(&AuthorProxy::from(&entry.author)).or_raise(|| ErrorKind::InvalidData("author"))?,
            summary: entry.summary.clone(),
            short_summary: entry.short_summary.clone(),
            changelog: entry.changelog.clone(),
            homepage: entry.homepage.clone(),
            payload: entry.payload.clone(),
            previews: to_json(&previews).or_raise(|| ErrorKind::InvalidData("previews"))?,
            rating: entry.rating.map(i64::from),
            downloads: entry
                .downloads
                .map(|d| i64::try_from(d).or_raise(|| ErrorKind::InvalidData("downloads")))
                .transpose()?,
            fans: entry.fans.map(|f| i64::try_from(f).or_raise(|| ErrorKind::InvalidData("fans"))).transpose()?,
            donation_link: entry.donation_link.clone(),
            installed_files: to_json(&entry.installed_files).or_raise(|| ErrorKind::InvalidData("installed files"))?,
            download_links: to_json(&links).or_raise(|| ErrorKind::InvalidData("download links"))?,
            status: entry.status.as_str().to_string(),
            updated_at: UtcDateTime::now().unix_timestamp(),
        })
    }
}
impl TryFrom<EntryRow> for Entry {
    type Error = Error;
    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            release_date: from_timestamp(row.release_date, "release date")?,
            update_release_date: from_timestamp(row.update_release_date, "update release date")?,
            author: Author::from(from_json::<AuthorProxy>(&row.author).or_raise(|| ErrorKind::InvalidData("author"))?),
            previews: from_json::<Vec<PreviewProxy>>(&row.previews)
                .or_raise(|| ErrorKind::InvalidData("previews"))?
                .into_iter()
                .filter_map(PreviewProxy::into_pair)
                .collect(),
            rating: row.rating.map(|r| u32::try_from(r).or_raise(|| ErrorKind::InvalidData("rating"))).transpose()?,
            downloads: row
                .downloads
                .map(|d| u64::try_from(d).or_raise(|| ErrorKind::InvalidData("downloads")))
                .transpose()?,
            fans: row.fans.map(|f| u64::try_from(f).or_raise(|| ErrorKind::InvalidData("fans"))).transpose()?,
            installed_files: from_json::<Vec<String>>(&row.installed_files)
                .or_raise(|| ErrorKind::InvalidData("installed files"))?,
            download_links: from_json::<Vec<DownloadLinkProxy>>(&row.download_links)
                .or_raise(|| ErrorKind::InvalidData("download links"))?
                .into_iter()
                .map(DownloadLink::from)
                .collect(),
            status: row.status.parse::<Status>().or_raise(|| ErrorKind::InvalidData("status"))?,
            source: Source::Registry,
            provider_id: row.provider_id,
            unique_id: row.unique_id,
            name: row.name,
            category: row.category,
            license: row.license,
            version: row.version,
            update_version: row.update_version,
            summary: row.summary,
            short_summary: row.short_summary,
            changelog: row.changelog,
            homepage: row.homepage,
            payload: row.payload,
            donation_link: row.donation_link,
        })
    }
}
