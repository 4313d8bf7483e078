//! Program settings, read from `settings.toml` in the seisrisk config folder.
//!
//! Settings apply to every job run by the user. Job-specific parameters live in `job.toml`.
use crate::get_seisrisk_config_dir;
use crate::input::read_toml;
use crate::log::{DEFAULT_LOG_LEVEL, parse_log_level};
use anyhow::{Context, Result};
use documented::DocumentedFields;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const SETTINGS_FILE_NAME: &str = "settings.toml";

const DEFAULT_SETTINGS_FILE_HEADER: &str = "# seisrisk program settings
# Uncomment a setting to change its value. SEISRISK_LOG_LEVEL overrides log_level.
";

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

/// The path of the settings file
pub fn get_settings_file_path() -> PathBuf {
    let mut path = get_seisrisk_config_dir();
    path.push(SETTINGS_FILE_NAME);

    path
}

/// Settings shared by all jobs
#[derive(Debug, DocumentedFields, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Log level: off, error, warn, info, debug or trace
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Whether to replace a non-empty output folder without --overwrite
    #[serde(default)]
    pub overwrite: bool,
    /// Number of worker threads for the damage calculation (0 means one per CPU)
    #[serde(default)]
    pub num_threads: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            overwrite: false,
            num_threads: 0,
        }
    }
}

impl Settings {
    /// Load the settings of the user, or the defaults if there is no settings file
    pub fn load() -> Result<Settings> {
        Self::load_from_path(&get_settings_file_path())
    }

    fn load_from_path(file_path: &Path) -> Result<Settings> {
        if !file_path.is_file() {
            return Ok(Settings::default());
        }

        let settings: Settings = read_toml(file_path)?;
        settings
            .validate()
            .with_context(|| format!("Invalid settings file {}", file_path.display()))?;

        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        parse_log_level(&self.log_level)?;

        Ok(())
    }

    /// A settings file with every setting commented out at its default value, each preceded by
    /// the doc comment of its field
    pub fn default_file_contents() -> String {
        let settings_raw =
            toml::to_string(&Settings::default()).expect("Could not convert settings to TOML");

        let mut out = DEFAULT_SETTINGS_FILE_HEADER.to_string();
        for line in settings_raw.lines() {
            let Some((field, _)) = line.split_once('=') else {
                continue;
            };
            let docs = Settings::get_field_docs(field.trim()).expect("Missing doc comment for field");
            out.push('\n');
            for doc_line in docs.lines() {
                out.push_str(&format!("# # {}\n", doc_line.trim()));
            }
            out.push_str(&format!("# {}\n", line.trim()));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_settings_load_from_path_no_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join(SETTINGS_FILE_NAME); // NB: doesn't exist
        assert_eq!(
            Settings::load_from_path(&file_path).unwrap(),
            Settings::default()
        );
    }

    #[test]
    fn test_settings_load_from_path() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join(SETTINGS_FILE_NAME);

        {
            let mut file = File::create(&file_path).unwrap();
            writeln!(file, "log_level = \"warn\"\nnum_threads = 2").unwrap();
        }

        assert_eq!(
            Settings::load_from_path(&file_path).unwrap(),
            Settings {
                log_level: "warn".to_string(),
                overwrite: false,
                num_threads: 2,
            }
        );
    }

    #[test]
    fn test_settings_invalid_log_level() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&file_path, "log_level = \"loud\"").unwrap();

        let err = Settings::load_from_path(&file_path).unwrap_err();
        assert_eq!(err.root_cause().to_string(), "Unknown log level: loud");
    }

    #[test]
    fn test_default_file_contents() {
        let contents = Settings::default_file_contents();
        assert!(contents.contains("# log_level = \"info\""));
        assert!(contents.contains("# num_threads = 0"));

        // The commented-out file is equivalent to an empty one
        let settings: Settings = toml::from_str(&contents).unwrap();
        assert_eq!(settings, Settings::default());
    }
}
