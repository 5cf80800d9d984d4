//! Project configuration stored in `jsonmap.toml`.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// The standard configuration filename.
pub const CONFIG_FILENAME: &str = "jsonmap.toml";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Base URI for references made outside any schema scope.
    pub base_uri: Option<String>,
    /// Directories of `*.json` schemas to preload, relative to the config file.
    pub schema_dirs: Vec<PathBuf>,
    /// Validate mapped documents against their schema.
    pub validate: bool,
}

impl Config {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load a config file, resolving schema directories against its location.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::parse(&std::fs::read_to_string(path)?)?;
        if let Some(dir) = path.parent() {
            config.schema_dirs = config
                .schema_dirs
                .into_iter()
                .map(|schema_dir| dir.join(schema_dir))
                .collect();
        }
        Ok(config)
    }

    /// Find the config file in `start_dir` or its ancestors.
    pub fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
        let mut current = start_dir.to_path_buf();
        loop {
            let config_path = current.join(CONFIG_FILENAME);
            if config_path.exists() {
                return Some(config_path);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Load configuration by searching upward from the given directory.
    pub fn load_from_dir(start_dir: &Path) -> Result<Option<(PathBuf, Self)>, ConfigError> {
        if let Some(config_path) = Self::find_config_file(start_dir) {
            let config = Self::load(&config_path)?;
            Ok(Some((config_path, config)))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let config = Config::parse(
            r#"
            base_uri = "https://schemas.example.org/"
            schema_dirs = ["schemas", "vendor/popolo"]
            validate = true
            "#,
        )
        .unwrap();
        assert_eq!(config.base_uri.as_deref(), Some("https://schemas.example.org/"));
        assert_eq!(config.schema_dirs.len(), 2);
        assert!(config.validate);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(matches!(
            Config::parse("schemas = []"),
            Err(ConfigError::Parse(_))
        ));
    }
}
