use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use crate::error::{Error, ErrorKind};

/// Lifecycle status of an entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Status {
    /// Available remotely, not present locally
    #[default]
    Downloadable,
    /// Install in progress
    Installing,
    Installed,
    /// Installed, and a newer version is available remotely
    Updateable,
    /// Update install in progress
    Updating,
    /// Was installed, now removed
    Deleted,
}
impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Downloadable => "downloadable",
            Status::Installing => "installing",
            Status::Installed => "installed",
            Status::Updateable => "updateable",
            Status::Updating => "updating",
            Status::Deleted => "deleted",
        }
    }

    /// Installed locally, whether or not an update is pending.
    pub fn is_installed(&self) -> bool {
        matches!(self, Status::Installed | Status::Updateable)
    }

    /// Whether entries with this status belong in the persisted registry.
    pub fn is_persisted(&self) -> bool {
        !matches!(self, Status::Downloadable)
    }
}
impl FromStr for Status {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "downloadable" | "" => Self::Downloadable,
            "installing" => Self::Installing,
            "installed" => Self::Installed,
            "updateable" | "updatable" => Self::Updateable,
            "updating" => Self::Updating,
            "deleted" => Self::Deleted,
            _ => exn::bail!(ErrorKind::ParseError {
                field: "status",
                value: s.to_string(),
            }),
        })
    }
}
impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// Where an entry instance was last obtained from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Source {
    #[default]
    Online,
    Cache,
    Registry,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("installed", Status::Installed)]
    #[case("Updatable", Status::Updateable)]
    #[case("", Status::Downloadable)]
    #[case(" deleted ", Status::Deleted)]
    fn test_parse_status(#[case] input: &str, #[case] expected: Status) {
        assert_eq!(input.parse::<Status>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_status_is_an_error() {
        let err = "broken".parse::<Status>().unwrap_err();
        assert!(matches!(&*err, ErrorKind::ParseError { field: "status", .. }));
    }

    #[test]
    fn test_only_downloadable_is_not_persisted() {
        assert!(!Status::Downloadable.is_persisted());
        assert!(Status::Deleted.is_persisted());
        assert!(Status::Updateable.is_installed());
        assert!(!Status::Updating.is_installed());
    }
}
