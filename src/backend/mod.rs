pub mod manager;
pub mod mock;
pub mod watson;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::BackendConfig;

/// One piece of the assistant's reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Output {
    pub response_type: String,
    pub text: String,
}

/// An intent the service recognized in the user's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub intent: String,
    pub confidence: f32,
}

/// Structured result of one back-end call. `outputs` are in delivery order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub status_code: u16,
    pub outputs: Vec<Output>,
    pub intents: Vec<Intent>,
}

impl Response {
    /// A plain-text response, mostly for tests and simple providers.
    pub fn text<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            status_code: 200,
            outputs: texts
                .into_iter()
                .map(|text| Output {
                    response_type: "text".to_string(),
                    text: text.into(),
                })
                .collect(),
            intents: Vec::new(),
        }
    }

    /// Output texts, flattened in order.
    pub fn into_texts(self) -> impl Iterator<Item = String> {
        self.outputs.into_iter().map(|output| output.text)
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "status: {} outputs: [", self.status_code)?;
        for (i, output) in self.outputs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {:?}", output.response_type, output.text)?;
        }
        write!(f, "] intents: [")?;
        for (i, intent) in self.intents.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} ({:.2})", intent.intent, intent.confidence)?;
        }
        write!(f, "]")
    }
}

/// Builds a live back-end provider from its configuration. Stateless; the
/// registry holds one per label.
#[async_trait]
pub trait BackendDescriptor: Send + Sync {
    fn label(&self) -> &str;
    async fn initialize(&self, config: &BackendConfig) -> Result<Box<dyn BackendProvider>>;
}

/// A running NLU client. Could be a hosted assistant or a test script.
#[async_trait]
pub trait BackendProvider: Send + Sync {
    fn label(&self) -> &str;
    async fn message(&self, text: &str) -> Result<Response>;
    async fn stop(&self) -> Result<()>;
}
