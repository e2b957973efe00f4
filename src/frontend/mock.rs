use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{FrontendDescriptor, FrontendProvider, InboundMessage};
use crate::capsule::{Capsule, Content};
use crate::config::FrontendConfig;
use crate::pending::PendingMessages;

/// One `message` call received by the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub id: Uuid,
    pub user: String,
    pub texts: Vec<String>,
    pub error: Option<String>,
}

/// An in-memory chat surface for tests. Messages are injected with
/// [`MockFrontend::send_text`] and deliveries are recorded.
///
/// Clones share state, so a test can keep one handle while the manager owns
/// the provider built from another.
#[derive(Clone)]
pub struct MockFrontend {
    label: String,
    inbound: Arc<Mutex<Option<mpsc::Sender<InboundMessage>>>>,
    pending: Arc<PendingMessages<String>>,
    deliveries: Arc<Mutex<Vec<Delivery>>>,
    delivered: Arc<Notify>,
    stopped: Arc<AtomicBool>,
    cancel: CancellationToken,
    init_error: Option<String>,
}

impl MockFrontend {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            inbound: Arc::new(Mutex::new(None)),
            pending: Arc::new(PendingMessages::new()),
            deliveries: Arc::new(Mutex::new(Vec::new())),
            delivered: Arc::new(Notify::new()),
            stopped: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
            init_error: None,
        }
    }

    /// A mock whose initialization always fails with `reason`.
    pub fn failing(label: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            init_error: Some(reason.into()),
            ..Self::new(label)
        }
    }

    /// Simulate `user` typing `text`. Returns the identifier of the message.
    pub async fn send_text(&self, user: &str, text: &str) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.send(id, user, Content::Text(text.to_string())).await?;
        Ok(id)
    }

    /// Simulate a user message with an explicit identifier.
    pub async fn send(&self, id: Uuid, user: &str, content: Content) -> Result<()> {
        let inbound = self
            .inbound
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or_else(|| anyhow!("MockFrontend `{}` is not initialized", self.label))?;

        self.pending.insert(id, user.to_string());
        let message = InboundMessage {
            id,
            provider: self.label.clone(),
            content,
            user: user.to_string(),
        };
        if inbound.send(message).await.is_err() {
            let _ = self.pending.take(&id);
            bail!("frontend manager is not listening");
        }
        Ok(())
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Wait until at least `count` deliveries were recorded.
    pub async fn wait_for_deliveries(&self, count: usize) -> Vec<Delivery> {
        loop {
            let deliveries = self.deliveries();
            if deliveries.len() >= count {
                return deliveries;
            }
            self.delivered.notified().await;
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrontendDescriptor for MockFrontend {
    fn label(&self) -> &str {
        &self.label
    }

    async fn initialize(
        &self,
        _config: &FrontendConfig,
        inbound: mpsc::Sender<InboundMessage>,
    ) -> Result<Box<dyn FrontendProvider>> {
        if let Some(reason) = &self.init_error {
            bail!("{reason}");
        }
        *self
            .inbound
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(inbound);
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl FrontendProvider for MockFrontend {
    fn label(&self) -> &str {
        &self.label
    }

    async fn start(&self) -> Result<()> {
        self.cancel.cancelled().await;
        Ok(())
    }

    async fn message(&self, capsule: &Capsule) -> crate::Result<()> {
        let user = self.pending.take(&capsule.original_message)?;
        let delivery = Delivery {
            id: capsule.original_message,
            user,
            texts: if capsule.is_error() {
                Vec::new()
            } else {
                capsule.responses.clone()
            },
            error: capsule.error.as_ref().map(|e| e.message.clone()),
        };
        self.deliveries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(delivery);
        self.delivered.notify_one();
        Ok(())
    }

    async fn stop(&self) {
        self.cancel.cancel();
        self.inbound
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        self.stopped.store(true, Ordering::SeqCst);
    }
}
