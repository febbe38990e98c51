//! Path validation for installed files.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Normalize a path that must stay below the install root.
///
/// `..` may not climb above the start, null bytes and platform prefixes are
/// rejected, and an empty result is an error.
pub(crate) fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(s) => {
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(path.to_path_buf())),
        false => Ok(components.into_iter().collect()),
    }
}

/// Whether `path` is `root` itself or lies below it, without touching the
/// filesystem.
pub(crate) fn is_within(root: &Path, path: &Path) -> bool {
    path.is_absolute() && path.strip_prefix(root).is_ok_and(|rest| validate(rest).is_ok() || rest.as_os_str().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("sunset.png", Some("sunset.png"))]
    #[case("themes/dark.tar.gz", Some("themes/dark.tar.gz"))]
    #[case("a/../sunset.png", Some("sunset.png"))]
    #[case("../etc/passwd", None)]
    #[case("a/../../b", None)]
    #[case("a\0b", None)]
    #[case(".", None)]
    #[case("", None)]
    fn test_validate(#[case] input: &str, #[case] expected: Option<&str>) {
        assert_eq!(validate(input).ok(), expected.map(PathBuf::from));
    }

    #[rstest]
    #[case("/data/wallpapers/sunset.png", true)]
    #[case("/data/wallpapers/sub/sunset.png", true)]
    #[case("/data/wallpapers/../secrets", false)]
    #[case("/data/other/sunset.png", false)]
    #[case("relative/sunset.png", false)]
    fn test_is_within(#[case] path: &str, #[case] expected: bool) {
        assert_eq!(is_within(Path::new("/data/wallpapers"), Path::new(path)), expected);
    }
}
