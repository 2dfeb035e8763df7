//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid decorator name: {0:?}")]
    InvalidDecoratorName(String),
}

/// Settings shared by every template wrapped through one installation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Reject `return <value>` outside marker blocks when producing coroutines
    #[serde(default)]
    pub strict_async_returns: bool,

    /// Name under which the entry decorator is installed and recognized
    #[serde(default = "default_decorator_name")]
    pub decorator_name: String,

    /// Forwarded to the interpreter
    #[serde(default = "default_recursion_limit")]
    pub recursion_limit: usize,
}

fn default_decorator_name() -> String {
    String::from("transfunction")
}

fn default_recursion_limit() -> usize {
    200
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strict_async_returns: false,
            decorator_name: default_decorator_name(),
            recursion_limit: default_recursion_limit(),
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&contents)
    }

    /// Check that the decorator name is usable as an identifier in templates
    pub fn validate(&self) -> Result<(), ConfigError> {
        if templar_lang::is_identifier(&self.decorator_name) {
            Ok(())
        } else {
            Err(ConfigError::InvalidDecoratorName(self.decorator_name.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_values() {
        let config = EngineConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(!config.strict_async_returns);
        assert_eq!(config.decorator_name, "transfunction");
        assert_eq!(config.recursion_limit, 200);
    }

    #[test]
    fn test_partial_override() {
        let config = EngineConfig::from_yaml_str("strict_async_returns: true\nrecursion_limit: 50\n").unwrap();
        assert!(config.strict_async_returns);
        assert_eq!(config.recursion_limit, 50);
        assert_eq!(config.decorator_name, "transfunction");
    }

    #[test]
    fn test_rejects_bad_decorator_name() {
        let err = EngineConfig::from_yaml_str("decorator_name: \"two words\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDecoratorName(_)));
    }

    #[test]
    fn test_rejects_keyword_decorator_name() {
        for keyword in ["pass", "def", "None"] {
            let err = EngineConfig::from_yaml_str(&format!("decorator_name: \"{keyword}\"\n")).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidDecoratorName(ref name) if name == keyword));
        }
        let config = EngineConfig { decorator_name: "while".into(), ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "decorator_name: template").unwrap();
        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.decorator_name, "template");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = EngineConfig::from_file(dir.path().join("missing.yml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError(_)));
    }
}
