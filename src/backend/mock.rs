use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{BackendDescriptor, BackendProvider, Response};
use crate::config::BackendConfig;

/// What the mock answers to one call.
#[derive(Debug, Clone)]
pub enum MockReply {
    Outputs(Vec<String>),
    Fail(String),
}

/// A scripted back-end for tests. Replies with pre-defined steps in order and
/// records every text it was asked about.
///
/// Clones share state, so a test can keep one handle while the manager owns
/// the provider built from another.
#[derive(Clone)]
pub struct MockBackend {
    label: String,
    replies: Arc<Vec<MockReply>>,
    index: Arc<AtomicUsize>,
    calls: Arc<Mutex<Vec<String>>>,
    stopped: Arc<AtomicBool>,
    init_error: Option<String>,
}

impl MockBackend {
    pub fn new(label: impl Into<String>, replies: Vec<MockReply>) -> Self {
        Self {
            label: label.into(),
            replies: Arc::new(replies),
            index: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(Mutex::new(Vec::new())),
            stopped: Arc::new(AtomicBool::new(false)),
            init_error: None,
        }
    }

    /// A mock whose initialization always fails with `reason`.
    pub fn failing(label: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            init_error: Some(reason.into()),
            ..Self::new(label, Vec::new())
        }
    }

    /// Texts received so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendDescriptor for MockBackend {
    fn label(&self) -> &str {
        &self.label
    }

    async fn initialize(&self, _config: &BackendConfig) -> Result<Box<dyn BackendProvider>> {
        if let Some(reason) = &self.init_error {
            bail!("{reason}");
        }
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl BackendProvider for MockBackend {
    fn label(&self) -> &str {
        &self.label
    }

    async fn message(&self, text: &str) -> Result<Response> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(text.to_string());

        let i = self.index.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .get(i)
            .ok_or_else(|| anyhow!("MockBackend: no more replies (called {} times)", i + 1))?;
        match reply {
            MockReply::Outputs(texts) => Ok(Response::text(texts.iter().cloned())),
            MockReply::Fail(reason) => Err(anyhow!("{reason}")),
        }
    }

    async fn stop(&self) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}
