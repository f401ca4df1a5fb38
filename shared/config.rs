//! Dashboard configuration, stored as human-readable TOML.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_LOCATION: &str = "Global";
pub const DEFAULT_GEO_CACHE: &str = "data/locations.tsv";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML config file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// CSV or TSV file with the fact table.
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoConfig {
    pub cache_path: PathBuf,
    /// Where to fetch the reference from when the cache is missing.
    #[serde(default)]
    pub source_url: Option<String>,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            cache_path: PathBuf::from(DEFAULT_GEO_CACHE),
            source_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Shown by the historical view while nothing is selected.
    pub default_location: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_location: DEFAULT_LOCATION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardConfig {
    pub store: StoreConfig,
    #[serde(default)]
    pub geo: GeoConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl DashboardConfig {
    pub fn with_store(path: &Path) -> Self {
        Self {
            store: StoreConfig {
                path: path.to_path_buf(),
            },
            geo: GeoConfig::default(),
            session: SessionConfig::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let config = toml::from_str(&toml_string)?;
        log::debug!("Loaded configuration from '{}'", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_preserves_every_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atlas.toml");
        let mut config = DashboardConfig::with_store(Path::new("facts.csv"));
        config.session.default_location = "Mexico".to_string();
        config.save(&path).unwrap();

        assert_eq!(DashboardConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn omitted_sections_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atlas.toml");
        fs::write(&path, "[store]\npath = \"facts.tsv\"\n").unwrap();

        let config = DashboardConfig::load(&path).unwrap();
        assert_eq!(config.store.path, PathBuf::from("facts.tsv"));
        assert_eq!(config.geo, GeoConfig::default());
        assert_eq!(config.session.default_location, DEFAULT_LOCATION);
    }

    #[test]
    fn missing_store_section_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atlas.toml");
        fs::write(&path, "[session]\ndefault_location = \"Chad\"\n").unwrap();
        assert!(matches!(
            DashboardConfig::load(&path),
            Err(ConfigError::TomlParseError(_))
        ));
    }
}
