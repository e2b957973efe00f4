//! Front-end side: chat surfaces that receive user messages and deliver
//! replies.
//!
//! A [`FrontendDescriptor`] builds a live [`FrontendProvider`] and hands it
//! the sender half of the manager's inbound stream. The provider emits one
//! [`InboundMessage`] per user message and later receives the matching
//! [`Capsule`] through [`FrontendProvider::message`].

pub mod manager;
pub mod mock;
pub mod telegram;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::capsule::{Capsule, Content};
use crate::config::FrontendConfig;

/// A user message as emitted by a front-end provider.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Fresh identifier; the provider has already recorded it as pending.
    pub id: Uuid,
    /// Label of the emitting provider.
    pub provider: String,
    pub content: Content,
    /// Display name of the sender.
    pub user: String,
}

impl From<InboundMessage> for Capsule {
    fn from(message: InboundMessage) -> Self {
        Capsule {
            original_message: message.id,
            frontend_provider: message.provider,
            content: message.content,
            user: message.user,
            responses: Vec::new(),
            error: None,
        }
    }
}

/// Builds a live front-end provider. Stateless; the registry holds one per label.
#[async_trait]
pub trait FrontendDescriptor: Send + Sync {
    fn label(&self) -> &str;

    async fn initialize(
        &self,
        config: &FrontendConfig,
        inbound: mpsc::Sender<InboundMessage>,
    ) -> anyhow::Result<Box<dyn FrontendProvider>>;
}

/// A running chat surface.
#[async_trait]
pub trait FrontendProvider: Send + Sync {
    fn label(&self) -> &str;

    /// Receive user messages until [`stop`](Self::stop) is called.
    async fn start(&self) -> anyhow::Result<()>;

    /// Deliver the replies (or the error) a capsule carries to its user.
    async fn message(&self, capsule: &Capsule) -> crate::Result<()>;

    /// Release the provider's resources and end [`start`](Self::start).
    async fn stop(&self);
}
