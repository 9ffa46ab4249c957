use strum::{AsRefStr, Display};
use thiserror::Error;

/// Coarse classification of a [`KmsError`], used by callers to decide between
/// retrying, failing permanently and reporting a misconfiguration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    Configuration,
    Lookup,
    Authentication,
    NotFound,
    Conflict,
    Transport,
}

#[derive(Error, Debug)]
pub enum KmsError {
    #[error("missing configuration option: {option}")]
    MissingConfigOption { option: String },

    #[error("invalid value for configuration option {option}: {reason}")]
    InvalidConfigOption { option: String, reason: String },

    #[error("malformed configuration: {0}")]
    MalformedConfig(String),

    #[error("no KMS configuration found for KMS ID {0:?}")]
    UnknownKmsId(String),

    #[error("secret {name:?} not found in namespace {namespace:?}")]
    SecretNotFound { namespace: String, name: String },

    #[error("failed to load KMS configuration: {0:#}")]
    ConfigLoad(anyhow::Error),

    #[error("failed to build client for {endpoint}: {source}")]
    ClientBuild {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unknown KMS provider type {0:?}")]
    UnknownProviderType(String),

    #[error("KMS provider type {0:?} is already registered")]
    DuplicateProvider(String),

    #[error("authentication material missing, expected {expected}")]
    AuthMaterialMissing { expected: String },

    #[error("permission denied by {endpoint} (HTTP {status})")]
    PermissionDenied { endpoint: String, status: u16 },

    #[error("key for volume {0:?} not found")]
    KeyNotFound(String),

    #[error("a key for volume {0:?} is already stored")]
    KeyExists(String),

    #[error("invalid volume ID {0:?}")]
    InvalidVolumeId(String),

    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected response from {endpoint}: {message}")]
    Backend { endpoint: String, message: String },
}

impl KmsError {
    pub fn missing_option(option: impl Into<String>) -> Self {
        Self::MissingConfigOption {
            option: option.into(),
        }
    }

    pub fn invalid_option(option: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfigOption {
            option: option.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            KmsError::MissingConfigOption { .. }
            | KmsError::InvalidConfigOption { .. }
            | KmsError::MalformedConfig(_)
            | KmsError::UnknownKmsId(_)
            | KmsError::SecretNotFound { .. }
            | KmsError::ConfigLoad(_)
            | KmsError::ClientBuild { .. }
            | KmsError::InvalidVolumeId(_) => ErrorKind::Configuration,
            KmsError::UnknownProviderType(_) | KmsError::DuplicateProvider(_) => ErrorKind::Lookup,
            KmsError::AuthMaterialMissing { .. } | KmsError::PermissionDenied { .. } => {
                ErrorKind::Authentication
            }
            KmsError::KeyNotFound(_) => ErrorKind::NotFound,
            KmsError::KeyExists(_) => ErrorKind::Conflict,
            KmsError::Transport { .. } | KmsError::Backend { .. } => ErrorKind::Transport,
        }
    }

    /// Only transport failures are worth retrying, everything else needs a
    /// configuration or credential change first.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }
}

pub type Result<T, E = KmsError> = std::result::Result<T, E>;
