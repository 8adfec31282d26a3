use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::ident::RootLabel;
use crate::store::Store;

const DEFAULT_SESSION_GAP: Duration = Duration::from_secs(10 * 60);
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    database: Option<PathBuf>,
    session_gap: Option<String>,
    busy_timeout: Option<String>,
    include_tech: Option<bool>,
    roots: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database: PathBuf,
    pub session_gap: Duration,
    pub busy_timeout: Duration,
    pub include_tech: bool,
    pub root_names: Vec<(RootLabel, String)>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database: default_database(),
            session_gap: DEFAULT_SESSION_GAP,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            include_tech: false,
            root_names: Vec::new(),
        }
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "stockpile")
}

fn default_database() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join("stockpile.db"))
        .unwrap_or_else(|| PathBuf::from("stockpile.db"))
}

fn parse_duration(field: &str, raw: &str) -> Result<Duration> {
    humantime::parse_duration(raw.trim())
        .map_err(|e| Error::Config(format!("{field} = '{raw}': {e}")))
}

impl Config {
    /// `<config_dir>/stockpile/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from an explicit file (must exist) or the default location
    /// (defaults when absent).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(explicit) => explicit.to_path_buf(),
            None => match Self::default_path() {
                Some(p) if p.exists() => p,
                _ => return Ok(Config::default()),
            },
        };

        debug!(path = %path.display(), "loading config");
        let text = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: FileConfig =
            toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        let defaults = Config::default();

        let session_gap = match file.session_gap.as_deref() {
            Some(raw) => parse_duration("session_gap", raw)?,
            None => defaults.session_gap,
        };
        let busy_timeout = match file.busy_timeout.as_deref() {
            Some(raw) => parse_duration("busy_timeout", raw)?,
            None => defaults.busy_timeout,
        };

        let mut root_names = Vec::with_capacity(file.roots.len());
        for (label, name) in file.roots {
            let root = RootLabel::parse(&label)
                .map_err(|_| Error::Config(format!("[roots] malformed label '{label}'")))?;
            root_names.push((root, name));
        }

        Ok(Config {
            database: file.database.unwrap_or(defaults.database),
            session_gap,
            busy_timeout,
            include_tech: file.include_tech.unwrap_or(defaults.include_tech),
            root_names,
        })
    }

    /// Copy `[roots]` display names onto roots the registry knows about.
    pub fn apply_root_names(&self, store: &Store) -> Result<()> {
        for (root, name) in &self.root_names {
            if store.root_exists(root)? {
                store.set_display_name(root, Some(name))?;
            } else {
                debug!(root = %root, "configured root not seen yet");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.session_gap, Duration::from_secs(600));
        assert_eq!(config.busy_timeout, Duration::from_secs(5));
        assert!(!config.include_tech);
        assert!(config.root_names.is_empty());
    }

    #[test]
    fn fields_parse() {
        let config = Config::from_toml_str(
            r#"
            database = "/tmp/inv.db"
            session_gap = "15m"
            busy_timeout = "250ms"
            include_tech = true

            [roots]
            ST_1 = "Main save"
            "#,
        )
        .unwrap();
        assert_eq!(config.database, PathBuf::from("/tmp/inv.db"));
        assert_eq!(config.session_gap, Duration::from_secs(900));
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        assert!(config.include_tech);
        assert_eq!(
            config.root_names,
            vec![(RootLabel::parse("st_1").unwrap(), "Main save".to_string())]
        );
    }

    #[test]
    fn bad_values_are_config_errors() {
        assert!(matches!(Config::from_toml_str("session_gap = \"soon\""), Err(Error::Config(_))));
        assert!(matches!(Config::from_toml_str("colour = true"), Err(Error::Config(_))));
        assert!(matches!(Config::from_toml_str("[roots]\n\"a b\" = \"x\""), Err(Error::Config(_))));
    }

    #[test]
    fn root_names_applied_to_known_roots() {
        let store = Store::open_in_memory().unwrap();
        let known = RootLabel::parse("st_1").unwrap();
        store.ensure_root(&known, 0).unwrap();

        let config = Config::from_toml_str("[roots]\nst_1 = \"Main\"\nst_2 = \"Other\"").unwrap();
        config.apply_root_names(&store).unwrap();

        let roots = store.list_roots().unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].display_name.as_deref(), Some("Main"));
    }
}
