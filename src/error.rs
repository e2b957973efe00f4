use std::error::Error as StdError;

use uuid::Uuid;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while routing capsules.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A configured label has no descriptor in the registry.
    #[error("provider `{label}` not found")]
    ProviderNotFound { label: String },

    /// The configuration is structurally valid but unusable.
    #[error("invalid configuration: {message}")]
    Config { message: String },

    /// A descriptor failed to build its provider.
    #[error("provider `{label}` initialization failed: {source}")]
    ProviderInit {
        label: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// Content class that nothing handles yet (images, audio).
    #[error("{what} is not implemented")]
    NotImplemented { what: String },

    /// No pending message for this identifier (already answered or never seen).
    #[error("pending message {id} not found")]
    PendingMessageNotFound { id: Uuid },

    /// A returned capsule names a front-end that is not running.
    #[error("frontend provider `{label}` not found")]
    UnknownFrontend { label: String },

    /// A front-end could not hand a reply to its chat platform.
    #[error("delivery through `{label}` failed: {source}")]
    Delivery {
        label: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// The back-end call for a capsule failed.
    #[error("provider `{label}` call failed: {source}")]
    ProviderCall {
        label: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// The capsule itself is unusable (e.g. nil identifier).
    #[error("invalid capsule: {message}")]
    InvalidCapsule { message: String },

    /// A manager task panicked or was aborted.
    #[error("worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    #[must_use]
    pub fn config(message: impl std::fmt::Display) -> Self {
        Self::Config {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn provider_not_found(label: impl Into<String>) -> Self {
        Self::ProviderNotFound {
            label: label.into(),
        }
    }

    #[must_use]
    pub fn provider_init(label: impl Into<String>, source: anyhow::Error) -> Self {
        Self::ProviderInit {
            label: label.into(),
            source: source.into(),
        }
    }

    #[must_use]
    pub fn provider_call(label: impl Into<String>, source: anyhow::Error) -> Self {
        Self::ProviderCall {
            label: label.into(),
            source: source.into(),
        }
    }

    #[must_use]
    pub fn delivery(label: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Delivery {
            label: label.into(),
            source: source.into(),
        }
    }

    #[must_use]
    pub fn not_implemented(what: impl std::fmt::Display) -> Self {
        Self::NotImplemented {
            what: what.to_string(),
        }
    }

    #[must_use]
    pub fn invalid_capsule(message: impl std::fmt::Display) -> Self {
        Self::InvalidCapsule {
            message: message.to_string(),
        }
    }
}
