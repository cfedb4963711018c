use std::path::PathBuf;

/// Error taxonomy for the configuration collaborator, matching the core's
/// `ConfigParse` / `ConfigValidate` / `Io` error kinds one-to-one.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration at output '{output}', key '{key}': {detail}")]
    Invalid {
        output: String,
        key: String,
        detail: String,
    },

    #[error("failed to read configuration file at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(output: impl Into<String>, key: impl Into<String>, detail: impl Into<String>) -> Self {
        ConfigError::Invalid {
            output: output.into(),
            key: key.into(),
            detail: detail.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateFileError {
    #[error("failed to write state file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read state file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed state file line: '{0}'")]
    Malformed(String),
}
