use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::value::{Dict, Value};
use serde::Deserialize;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, instrument};

use crate::error::{ErrorKind, Result};
use crate::paths::Paths;

/// Environment variables with this prefix override keys of the loaded section
/// (`KNEWSTUFF_PROVIDERSURL`, `KNEWSTUFF_CATEGORIES`, ...).
pub const ENV_PREFIX: &str = "KNEWSTUFF_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionVersion {
    KNewStuff3,
    KNewStuff2,
}
impl SectionVersion {
    /// In order of preference.
    pub const ALL: [SectionVersion; 2] = [SectionVersion::KNewStuff3, SectionVersion::KNewStuff2];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionVersion::KNewStuff3 => "KNewStuff3",
            SectionVersion::KNewStuff2 => "KNewStuff2",
        }
    }
}
impl Display for SectionVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// Where installed payloads are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallTarget {
    /// Relative to the user's data directory
    TargetDir(PathBuf),
    /// Relative to the user's home directory
    InstallPath(PathBuf),
    Absolute(PathBuf),
}
impl InstallTarget {
    pub fn resolve(&self, paths: &Paths) -> PathBuf {
        match self {
            InstallTarget::TargetDir(dir) => paths.data.join(dir),
            InstallTarget::InstallPath(dir) => paths.home.join(dir),
            InstallTarget::Absolute(dir) => dir.clone(),
        }
    }

    fn relative(value: String) -> Result<PathBuf> {
        let path = PathBuf::from(&value);
        let escapes = path.components().any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            exn::bail!(ErrorKind::InvalidInstallTarget(value));
        }
        Ok(path)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum StringList {
    #[default]
    Empty,
    List(Vec<String>),
    Joined(String),
}
impl StringList {
    fn into_vec(self) -> Vec<String> {
        let items = match self {
            StringList::Empty => Vec::new(),
            StringList::List(items) => items,
            StringList::Joined(joined) => joined.split(',').map(str::to_string).collect(),
        };
        items.into_iter().map(|item| item.trim().to_string()).filter(|item| !item.is_empty()).collect()
    }
}

/// Keys are matched case-insensitively, so they are lowercased before
/// extraction.
#[derive(Debug, Default, Deserialize)]
struct RawSection {
    #[serde(default, rename = "categories")]
    categories: StringList,
    #[serde(default, rename = "providersurl")]
    providers_url: Option<String>,
    #[serde(default, rename = "targetdir")]
    target_dir: Option<String>,
    #[serde(default, rename = "installpath")]
    install_path: Option<String>,
    #[serde(default, rename = "absoluteinstallpath")]
    absolute_install_path: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// The structured inputs an engine needs from an application's `.knsrc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Application identity, the stem of the configuration file name
    pub app: String,
    pub path: PathBuf,
    pub section: SectionVersion,
    pub categories: Vec<String>,
    /// Provider list to load; none means default OCS discovery
    pub providers_url: Option<String>,
    pub install_target: InstallTarget,
}

impl Config {
    /// Locate and load a configuration file.
    ///
    /// The format follows the extension: `.json`, `.yaml`/`.yml`, and TOML for
    /// everything else (including `.knsrc`).
    #[instrument(skip(name, paths), fields(name = %name.as_ref().display()))]
    pub fn load(name: impl AsRef<Path>, paths: &Paths) -> Result<Self> {
        let name = name.as_ref();
        let path = paths
            .config_candidates(name)
            .into_iter()
            .find(|candidate| candidate.is_file())
            .ok_or_raise(|| ErrorKind::NotFound(name.to_path_buf()))?;
        let figment = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Figment::from(Json::file(&path)),
            Some("yaml" | "yml") => Figment::from(Yaml::file(&path)),
            _ => Figment::from(Toml::file(&path)),
        };
        let document: Dict = figment.extract().or_raise(|| ErrorKind::Invalid(path.clone()))?;
        Self::from_document(path, document, Env::prefixed(ENV_PREFIX))
    }

    fn from_document(path: PathBuf, document: Dict, env: Env) -> Result<Self> {
        let (section, value) = SectionVersion::ALL
            .into_iter()
            .find_map(|version| {
                document
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(version.as_str()))
                    .map(|(_, value)| (version, value.clone()))
            })
            .ok_or_raise(|| ErrorKind::MissingSection(path.clone()))?;
        debug!(path = %path.display(), %section, "loading configuration");
        let normalized: Dict = value
            .into_dict()
            .ok_or_raise(|| ErrorKind::Invalid(path.clone()))?
            .into_iter()
            .map(|(key, value): (String, Value)| (key.to_lowercase(), value))
            .collect();
        let raw: RawSection = Figment::from(Serialized::defaults(normalized))
            .merge(env)
            .extract()
            .or_raise(|| ErrorKind::Invalid(path.clone()))?;

        let install_target = if let Some(dir) = non_empty(raw.target_dir) {
            InstallTarget::TargetDir(InstallTarget::relative(dir)?)
        } else if let Some(dir) = non_empty(raw.install_path) {
            InstallTarget::InstallPath(InstallTarget::relative(dir)?)
        } else if let Some(dir) = non_empty(raw.absolute_install_path) {
            let dir = PathBuf::from(dir);
            if !dir.is_absolute() {
                exn::bail!(ErrorKind::InvalidInstallTarget(dir.display().to_string()));
            }
            InstallTarget::Absolute(dir)
        } else {
            exn::bail!(ErrorKind::MissingInstallTarget);
        };

        let app = path.file_stem().map(|stem| stem.to_string_lossy().into_owned()).unwrap_or_default();
        Ok(Self {
            app,
            section,
            categories: raw.categories.into_vec(),
            providers_url: non_empty(raw.providers_url),
            install_target,
            path,
        })
    }

    pub fn install_dir(&self, paths: &Paths) -> PathBuf {
        self.install_target.resolve(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    const WALLPAPERS: &str = r#"
        [KNewStuff3]
        Categories = ["Wallpapers", "Images"]
        ProvidersUrl = "https://example.org/providers.xml"
        TargetDir = "wallpapers"
    "#;

    fn load(jail: &Jail, name: &str) -> Result<Config> {
        Config::load(jail.directory().join(name), &Paths::rooted(jail.directory()))
    }

    #[test]
    fn test_load_toml() {
        Jail::expect_with(|jail| {
            jail.create_file("wallpapers.knsrc", WALLPAPERS)?;
            let config = load(jail, "wallpapers.knsrc").unwrap();
            assert_eq!(config.app, "wallpapers");
            assert_eq!(config.section, SectionVersion::KNewStuff3);
            assert_eq!(config.categories, vec!["Wallpapers", "Images"]);
            assert_eq!(config.providers_url.as_deref(), Some("https://example.org/providers.xml"));
            assert_eq!(
                config.install_dir(&Paths::rooted(jail.directory())),
                jail.directory().join(".local/share/wallpapers")
            );
            Ok(())
        });
    }

    #[test]
    fn test_falls_back_to_knewstuff2() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "icons.knsrc",
                r#"
                [KNewStuff2]
                Categories = "Icons, Themes"
                InstallPath = ".icons"
                "#,
            )?;
            let config = load(jail, "icons.knsrc").unwrap();
            assert_eq!(config.section, SectionVersion::KNewStuff2);
            assert_eq!(config.categories, vec!["Icons", "Themes"]);
            assert_eq!(config.providers_url, None);
            assert_eq!(config.install_target, InstallTarget::InstallPath(PathBuf::from(".icons")));
            Ok(())
        });
    }

    #[test]
    fn test_load_json_and_yaml() {
        Jail::expect_with(|jail| {
            jail.create_file("a.json", r#"{"KNewStuff3": {"Categories": ["A"], "AbsoluteInstallPath": "/srv/a"}}"#)?;
            jail.create_file("b.yaml", "KNewStuff3:\n  Categories: [B]\n  TargetDir: b\n")?;
            let a = load(jail, "a.json").unwrap();
            assert_eq!(a.install_target, InstallTarget::Absolute(PathBuf::from("/srv/a")));
            let b = load(jail, "b.yaml").unwrap();
            assert_eq!(b.app, "b");
            assert_eq!(b.categories, vec!["B"]);
            Ok(())
        });
    }

    #[test]
    fn test_bare_name_is_found_in_config_dir() {
        Jail::expect_with(|jail| {
            std::fs::create_dir_all(jail.directory().join(".config/knsrcfiles")).unwrap();
            jail.create_file(".config/knsrcfiles/wallpapers.knsrc", WALLPAPERS)?;
            let config = Config::load("wallpapers.knsrc", &Paths::rooted(jail.directory())).unwrap();
            assert_eq!(config.app, "wallpapers");
            Ok(())
        });
    }

    #[test]
    fn test_environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("wallpapers.knsrc", WALLPAPERS)?;
            jail.set_env("KNEWSTUFF_PROVIDERSURL", "file:///srv/providers.xml");
            let config = load(jail, "wallpapers.knsrc").unwrap();
            assert_eq!(config.providers_url.as_deref(), Some("file:///srv/providers.xml"));
            assert_eq!(config.categories, vec!["Wallpapers", "Images"]);
            Ok(())
        });
    }

    #[rstest]
    #[case::no_section("[Other]\nTargetDir = \"x\"\n")]
    #[case::no_target("[KNewStuff3]\nCategories = [\"A\"]\n")]
    #[case::escaping_target("[KNewStuff3]\nTargetDir = \"../../etc\"\n")]
    #[case::relative_absolute("[KNewStuff3]\nAbsoluteInstallPath = \"relative\"\n")]
    #[case::not_toml("[KNewStuff3\n")]
    fn test_invalid_configurations(#[case] contents: &str) {
        Jail::expect_with(|jail| {
            jail.create_file("broken.knsrc", contents)?;
            let err = load(jail, "broken.knsrc").unwrap_err();
            let expected = match *err {
                ErrorKind::MissingSection(_) => contents.starts_with("[Other]"),
                ErrorKind::MissingInstallTarget => contents.contains("Categories"),
                ErrorKind::InvalidInstallTarget(_) => contents.contains("..") || contents.contains("relative"),
                ErrorKind::Invalid(_) => !contents.contains(']'),
                _ => false,
            };
            assert!(expected, "unexpected error {err}");
            Ok(())
        });
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(dir.path().join("nope.knsrc"), &Paths::rooted(dir.path())).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }
}
