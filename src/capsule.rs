//! The envelope that carries one user exchange across the front-end/back-end
//! boundary, and the channel pair both managers use to pass it around.
//!
//! A [`Capsule`] moves by value. The front-end sets its identity and content,
//! the back-end sets `responses` or `error`, and whoever holds it is the only
//! one allowed to touch it.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Capacity of each direction of the capsule link. One slot keeps the two
/// managers in lock-step: a slow back-end is felt by the front-end.
pub const DEFAULT_CAPACITY: usize = 1;

/// What the user sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Content {
    Text(String),
    Image(Vec<u8>),
    Audio(Vec<u8>),
}

impl Content {
    /// Short name of the content class, for logs and notices.
    pub fn kind(&self) -> &'static str {
        match self {
            Content::Text(_) => "text",
            Content::Image(_) => "image",
            Content::Audio(_) => "audio",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Class of a failure attached to a capsule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapsuleErrorKind {
    NotImplemented,
    InvalidCapsule,
    ProviderCall,
}

/// Failure carried back to the front-end in place of responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct CapsuleError {
    pub kind: CapsuleErrorKind,
    pub message: String,
}

impl From<&Error> for CapsuleError {
    fn from(err: &Error) -> Self {
        let kind = match err {
            Error::NotImplemented { .. } => CapsuleErrorKind::NotImplemented,
            Error::InvalidCapsule { .. } => CapsuleErrorKind::InvalidCapsule,
            _ => CapsuleErrorKind::ProviderCall,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

/// One user message on its round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capsule {
    /// Identifier of the user message this capsule answers.
    pub original_message: Uuid,
    /// Label of the front-end that must receive the reply.
    pub frontend_provider: String,
    pub content: Content,
    /// Display name of the sender.
    pub user: String,
    /// Replies in delivery order. Empty on the way in.
    #[serde(default)]
    pub responses: Vec<String>,
    /// Set when processing failed; `responses` is ignored then.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CapsuleError>,
}

impl Capsule {
    /// Build an outbound capsule. The identifier must be non-nil and carry a
    /// known UUID version.
    pub fn new(
        original_message: Uuid,
        frontend_provider: impl Into<String>,
        content: Content,
        user: impl Into<String>,
    ) -> Result<Self> {
        let capsule = Self {
            original_message,
            frontend_provider: frontend_provider.into(),
            content,
            user: user.into(),
            responses: Vec::new(),
            error: None,
        };
        capsule.validate()?;
        Ok(capsule)
    }

    pub fn validate(&self) -> Result<()> {
        validate_id(&self.original_message)
    }

    /// Attach the back-end's replies, keeping their order.
    pub fn with_responses<I, S>(mut self, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.responses = responses.into_iter().map(Into::into).collect();
        self.error = None;
        self
    }

    /// Attach a failure. Any responses are dropped.
    pub fn with_error(mut self, err: &Error) -> Self {
        self.responses.clear();
        self.error = Some(CapsuleError::from(err));
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.as_ref().is_some_and(|e| !e.message.is_empty())
    }
}

/// Reject identifiers that cannot correlate a reply.
pub fn validate_id(id: &Uuid) -> Result<()> {
    if id.is_nil() {
        return Err(Error::invalid_capsule("nil message identifier"));
    }
    if id.get_version().is_none() {
        return Err(Error::invalid_capsule(format!(
            "message identifier {id} has no known version"
        )));
    }
    Ok(())
}

/// The front-end manager's half of the capsule link.
#[derive(Debug)]
pub struct FrontendLink {
    pub to_backend: mpsc::Sender<Capsule>,
    pub from_backend: mpsc::Receiver<Capsule>,
}

/// The back-end manager's half of the capsule link.
#[derive(Debug)]
pub struct BackendLink {
    pub from_frontend: mpsc::Receiver<Capsule>,
    pub to_frontend: mpsc::Sender<Capsule>,
}

/// Create the link joining both managers. A capacity of zero is raised to one.
pub fn link(capacity: usize) -> (FrontendLink, BackendLink) {
    let capacity = capacity.max(1);
    let (to_backend, from_frontend) = mpsc::channel(capacity);
    let (to_frontend, from_backend) = mpsc::channel(capacity);
    (
        FrontendLink {
            to_backend,
            from_backend,
        },
        BackendLink {
            from_frontend,
            to_frontend,
        },
    )
}
