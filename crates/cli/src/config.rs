//! Server configuration: CLI flags, overridden by an optional TOML file.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Default request body limit: 1 MB.
pub(crate) const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// The flags of `approvals serve` that a config file may override.
#[derive(Debug, Clone)]
pub(crate) struct CliConfig {
    pub(crate) host: String,
    pub(crate) port: u16,
}

/// Contents of the TOML config file. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct FileConfig {
    pub(crate) host: Option<String>,
    pub(crate) port: Option<u16>,
    pub(crate) max_body_size: Option<usize>,
    pub(crate) definition_key: Option<String>,
}

impl FileConfig {
    pub(crate) fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Resolved settings of the HTTP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ServeConfig {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) max_body_size: usize,
    /// Definition new cases are started from.
    pub(crate) definition_key: String,
}

impl ServeConfig {
    /// File values win over CLI values where present.
    pub(crate) fn resolve(
        cli: &CliConfig,
        file: Option<FileConfig>,
    ) -> Result<Self, ConfigError> {
        let file = file.unwrap_or_default();

        let host = file.host.unwrap_or_else(|| cli.host.clone());
        if host.trim().is_empty() {
            return Err(ConfigError::Invalid("host cannot be blank".into()));
        }
        let max_body_size = file.max_body_size.unwrap_or(DEFAULT_MAX_BODY_SIZE);
        if max_body_size == 0 {
            return Err(ConfigError::Invalid(
                "max_body_size must be greater than zero".into(),
            ));
        }
        let definition_key = file
            .definition_key
            .unwrap_or_else(|| approvals_engine::APPROVAL_PROCESS_KEY.to_string());
        if definition_key.trim().is_empty() {
            return Err(ConfigError::Invalid("definition_key cannot be blank".into()));
        }

        Ok(ServeConfig {
            host,
            port: file.port.unwrap_or(cli.port),
            max_body_size,
            definition_key,
        })
    }

    pub(crate) fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read the config file, if any, and resolve it against the CLI flags.
pub(crate) fn load(cli: &CliConfig, path: Option<PathBuf>) -> Result<ServeConfig, ConfigError> {
    let file = path.as_deref().map(FileConfig::load).transpose()?;
    ServeConfig::resolve(cli, file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cli() -> CliConfig {
        CliConfig {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }

    #[test]
    fn cli_values_without_file() {
        let config = ServeConfig::resolve(&cli(), None).unwrap();
        assert_eq!(config.addr(), "0.0.0.0:8080");
        assert_eq!(config.max_body_size, DEFAULT_MAX_BODY_SIZE);
        assert_eq!(config.definition_key, "approvalProcess");
    }

    #[test]
    fn file_overrides_cli() {
        let file: FileConfig =
            toml::from_str("host = \"127.0.0.1\"\nport = 9000\nmax_body_size = 2048\n").unwrap();
        let config = ServeConfig::resolve(&cli(), Some(file)).unwrap();
        assert_eq!(config.addr(), "127.0.0.1:9000");
        assert_eq!(config.max_body_size, 2048);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let file: FileConfig = toml::from_str("max_body_size = 0").unwrap();
        assert!(matches!(
            ServeConfig::resolve(&cli(), Some(file)),
            Err(ConfigError::Invalid(_))
        ));
        let file: FileConfig = toml::from_str("definition_key = \" \"").unwrap();
        assert!(ServeConfig::resolve(&cli(), Some(file)).is_err());
    }

    #[test]
    fn unknown_keys_fail_to_parse() {
        assert!(toml::from_str::<FileConfig>("rate_limit = 5").is_err());
    }

    #[test]
    fn load_reads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 9100").unwrap();
        let config = load(&cli(), Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.port, 9100);

        let missing = load(&cli(), Some(PathBuf::from("/nonexistent/approvals.toml")));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
