use std::fs;
use std::path::PathBuf;

use camino::Utf8Path;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::LineageError;

pub const DEFAULT_URI: &str = "mongodb://localhost:27017";
pub const DEFAULT_DATABASE: &str = "gisaid";
pub const DEFAULT_COLLECTION: &str = "records";
/// Server-side cap on operations per write command.
pub const DEFAULT_BATCH_SIZE: usize = 100_000;

const LOCAL_CONFIG: &str = "lineage-sync.json";

/// Contents of a `lineage-sync.json` file. Every key is optional.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub batch_size: Option<usize>,
}

/// Values given on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub uri: Option<String>,
    pub database: Option<String>,
    pub collection: Option<String>,
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub uri: String,
    pub database: String,
    pub collection: String,
    pub batch_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads the explicit config file, or the first implicit one that
    /// exists, then layers `overrides` on top.
    pub fn resolve(
        path: Option<&Utf8Path>,
        overrides: SettingsOverrides,
    ) -> Result<Settings, LineageError> {
        let file = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(LineageError::MissingConfig(path.as_std_path().to_path_buf()));
                }
                Self::read(path.as_std_path().to_path_buf())?
            }
            None => match Self::implicit_candidates().into_iter().find(|p| p.exists()) {
                Some(found) => {
                    tracing::debug!(path = %found.display(), "using config file");
                    Self::read(found)?
                }
                None => ConfigFile::default(),
            },
        };

        Self::resolve_config(file, overrides)
    }

    pub fn resolve_config(
        file: ConfigFile,
        overrides: SettingsOverrides,
    ) -> Result<Settings, LineageError> {
        let defaults = Settings::default();
        let settings = Settings {
            uri: overrides.uri.or(file.uri).unwrap_or(defaults.uri),
            database: overrides
                .database
                .or(file.database)
                .unwrap_or(defaults.database),
            collection: overrides
                .collection
                .or(file.collection)
                .unwrap_or(defaults.collection),
            batch_size: overrides
                .batch_size
                .or(file.batch_size)
                .unwrap_or(defaults.batch_size),
        };
        validate(&settings)?;
        Ok(settings)
    }

    fn read(path: PathBuf) -> Result<ConfigFile, LineageError> {
        let content =
            fs::read_to_string(&path).map_err(|_| LineageError::ConfigRead(path.clone()))?;
        serde_json::from_str(&content).map_err(|err| LineageError::ConfigParse(err.to_string()))
    }

    fn implicit_candidates() -> Vec<PathBuf> {
        let mut candidates = vec![PathBuf::from(LOCAL_CONFIG)];
        if let Some(dirs) = ProjectDirs::from("", "", "lineage-sync") {
            candidates.push(dirs.config_dir().join("config.json"));
        }
        candidates
    }
}

fn validate(settings: &Settings) -> Result<(), LineageError> {
    if !(settings.uri.starts_with("mongodb://") || settings.uri.starts_with("mongodb+srv://")) {
        return Err(LineageError::InvalidSetting(format!(
            "uri must start with mongodb:// or mongodb+srv://, got {}",
            settings.uri
        )));
    }
    if settings.database.trim().is_empty() {
        return Err(LineageError::InvalidSetting(
            "database name is empty".to_string(),
        ));
    }
    if settings.collection.trim().is_empty() {
        return Err(LineageError::InvalidSetting(
            "collection name is empty".to_string(),
        ));
    }
    if settings.batch_size == 0 {
        return Err(LineageError::InvalidSetting(
            "batch size must be at least 1".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn defaults_when_nothing_given() {
        let settings =
            ConfigLoader::resolve_config(ConfigFile::default(), SettingsOverrides::default())
                .unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn overrides_win_over_file() {
        let file = ConfigFile {
            uri: Some("mongodb://db.internal:27017".to_string()),
            database: Some("gisaid_test".to_string()),
            collection: None,
            batch_size: Some(500),
        };
        let overrides = SettingsOverrides {
            database: Some("gisaid_prod".to_string()),
            ..SettingsOverrides::default()
        };
        let settings = ConfigLoader::resolve_config(file, overrides).unwrap();
        assert_eq!(settings.uri, "mongodb://db.internal:27017");
        assert_eq!(settings.database, "gisaid_prod");
        assert_eq!(settings.collection, DEFAULT_COLLECTION);
        assert_eq!(settings.batch_size, 500);
    }

    #[test]
    fn rejects_zero_batch_size() {
        let overrides = SettingsOverrides {
            batch_size: Some(0),
            ..SettingsOverrides::default()
        };
        let err = ConfigLoader::resolve_config(ConfigFile::default(), overrides).unwrap_err();
        assert_matches!(err, LineageError::InvalidSetting(_));
    }

    #[test]
    fn rejects_non_mongodb_uri() {
        let overrides = SettingsOverrides {
            uri: Some("postgres://localhost".to_string()),
            ..SettingsOverrides::default()
        };
        let err = ConfigLoader::resolve_config(ConfigFile::default(), overrides).unwrap_err();
        assert_matches!(err, LineageError::InvalidSetting(_));
    }
}
