use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{FaceauthError, FaceauthResult};
use crate::types::KdfAlgorithm;

/// Top-level configuration (loaded from faceauth.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceauthConfig {
    pub crypto: CryptoConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

/// Key derivation selection.
///
/// KDF cost parameters are fixed by the file format version and are
/// not configurable here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Algorithm used when the caller does not pick one (default: argon2id)
    pub default_algorithm: KdfAlgorithm,
    /// Reject feature vectors of any other dimensionality
    pub expected_dimension: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Extension appended to encrypted file names (default: "faceauth")
    pub extension: String,
    /// Replace an existing file at the output path (default: false)
    pub overwrite: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            extension: "faceauth".into(),
            overwrite: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            log_format: "text".into(),
        }
    }
}

impl FaceauthConfig {
    /// Parse a TOML document.
    pub fn from_toml(content: &str) -> FaceauthResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| FaceauthError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> FaceauthResult<()> {
        if self.crypto.expected_dimension == Some(0) {
            return Err(FaceauthError::Config(
                "crypto.expected_dimension must be positive".into(),
            ));
        }
        let ext = self.output.extension.trim_start_matches('.');
        if ext.is_empty() || ext.contains(['/', '\\']) {
            return Err(FaceauthError::Config(format!(
                "output.extension is not a usable file extension: {:?}",
                self.output.extension
            )));
        }
        match self.logging.log_format.as_str() {
            "json" | "text" => Ok(()),
            other => Err(FaceauthError::Config(format!(
                "logging.log_format must be \"json\" or \"text\", got {other:?}"
            ))),
        }
    }
}

/// Load configuration from `path`, falling back to defaults when the file
/// does not exist.
pub fn load_config(path: &Path) -> FaceauthResult<FaceauthConfig> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        FaceauthConfig::from_toml(&content)
            .map_err(|e| FaceauthError::Config(format!("{}: {e}", path.display())))
    } else {
        tracing::warn!(
            "config file not found: {}  (using defaults)",
            path.display()
        );
        Ok(FaceauthConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[crypto]
default_algorithm = "combined"
expected_dimension = 512

[output]
extension = "fa"
overwrite = true

[logging]
log_level = "debug"
log_format = "json"
"#;
        let config = FaceauthConfig::from_toml(toml_str).unwrap();

        assert_eq!(config.crypto.default_algorithm, KdfAlgorithm::Combined);
        assert_eq!(config.crypto.expected_dimension, Some(512));
        assert_eq!(config.output.extension, "fa");
        assert!(config.output.overwrite);
        assert_eq!(config.logging.log_level, "debug");
        assert_eq!(config.logging.log_format, "json");
    }

    #[test]
    fn test_parse_defaults() {
        let config = FaceauthConfig::from_toml("").unwrap();

        assert_eq!(config.crypto.default_algorithm, KdfAlgorithm::Argon2id);
        assert_eq!(config.crypto.expected_dimension, None);
        assert_eq!(config.output.extension, "faceauth");
        assert!(!config.output.overwrite);
        assert_eq!(config.logging.log_level, "info");
        assert_eq!(config.logging.log_format, "text");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[crypto]
default_algorithm = "scrypt"
"#;
        let config = FaceauthConfig::from_toml(toml_str).unwrap();

        // Overridden
        assert_eq!(config.crypto.default_algorithm, KdfAlgorithm::Scrypt);
        // Defaults
        assert_eq!(config.output.extension, "faceauth");
        assert_eq!(config.logging.log_level, "info");
    }

    #[test]
    fn test_rejects_unknown_algorithm() {
        let err = FaceauthConfig::from_toml("[crypto]\ndefault_algorithm = \"md5\"\n").unwrap_err();
        assert!(matches!(err, FaceauthError::Config(_)));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(FaceauthConfig::from_toml("[crypto]\nexpected_dimension = 0\n").is_err());
        assert!(FaceauthConfig::from_toml("[output]\nextension = \"a/b\"\n").is_err());
        assert!(FaceauthConfig::from_toml("[logging]\nlog_format = \"xml\"\n").is_err());
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = FaceauthConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed = FaceauthConfig::from_toml(&toml_str).unwrap();

        assert_eq!(config.crypto.default_algorithm, parsed.crypto.default_algorithm);
        assert_eq!(config.output.extension, parsed.output.extension);
        assert_eq!(config.logging.log_format, parsed.logging.log_format);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.output.extension, "faceauth");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faceauth.toml");
        std::fs::write(&path, "[output]\noverwrite = true\n").unwrap();

        let config = load_config(&path).unwrap();
        assert!(config.output.overwrite);
    }
}
