use directories::BaseDirs;
use exn::OptionExt;
use std::path::{Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Per-user base directories the configuration is resolved against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub home: PathBuf,
    pub config: PathBuf,
    pub data: PathBuf,
    pub cache: PathBuf,
}

impl Paths {
    /// The platform's directories for the current user.
    pub fn from_system() -> Result<Self> {
        let dirs = BaseDirs::new().ok_or_raise(|| ErrorKind::NoHomeDirectory)?;
        Ok(Self {
            home: dirs.home_dir().to_path_buf(),
            config: dirs.config_dir().to_path_buf(),
            data: dirs.data_dir().to_path_buf(),
            cache: dirs.cache_dir().to_path_buf(),
        })
    }

    /// Every directory below a single root, for tests and portable setups.
    pub fn rooted(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            home: root.to_path_buf(),
            config: root.join(".config"),
            data: root.join(".local/share"),
            cache: root.join(".cache"),
        }
    }

    /// Where the registry databases of every application live.
    pub fn registry_dir(&self) -> PathBuf {
        self.cache.join("knewstuff")
    }

    /// Candidate locations of a configuration file.
    ///
    /// A bare file name is looked up in the user's config directory, under
    /// `knsrcfiles/` first. Anything else is taken as given.
    pub(crate) fn config_candidates(&self, name: &Path) -> Vec<PathBuf> {
        let is_bare = name.is_relative() && name.components().count() == 1;
        if !is_bare {
            return vec![name.to_path_buf()];
        }
        vec![name.to_path_buf(), self.config.join("knsrcfiles").join(name), self.config.join(name)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("wallpapers.knsrc", 3)]
    #[case("./wallpapers.knsrc", 1)]
    #[case("/etc/xdg/wallpapers.knsrc", 1)]
    fn test_only_bare_names_are_searched(#[case] name: &str, #[case] expected: usize) {
        let paths = Paths::rooted("/home/jane");
        assert_eq!(paths.config_candidates(Path::new(name)).len(), expected);
    }

    #[test]
    fn test_rooted_layout() {
        let paths = Paths::rooted("/home/jane");
        assert_eq!(paths.registry_dir(), PathBuf::from("/home/jane/.cache/knewstuff"));
        assert_eq!(
            paths.config_candidates(Path::new("wallpapers.knsrc"))[1],
            PathBuf::from("/home/jane/.config/knsrcfiles/wallpapers.knsrc")
        );
    }
}
