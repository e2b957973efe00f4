use anyhow::{Context as _, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{BackendDescriptor, BackendProvider, Intent, Output, Response};
use crate::config::BackendConfig;

const LABEL: &str = "watson";

/// Watson accepts the API key as the password of the `apikey` user.
const BASIC_AUTH_USER: &str = "apikey";

/// Builds [`WatsonBackend`]s.
pub struct WatsonDescriptor;

#[async_trait]
impl BackendDescriptor for WatsonDescriptor {
    fn label(&self) -> &str {
        LABEL
    }

    async fn initialize(&self, config: &BackendConfig) -> Result<Box<dyn BackendProvider>> {
        tracing::debug!(provider = LABEL, url = %config.url, "initializing");
        let mut backend = WatsonBackend::new(config)?;
        backend
            .create_session()
            .await
            .context("creating a Watson Assistant session")?;
        Ok(Box::new(backend))
    }
}

/// A client of the Watson Assistant v2 API, bound to one session.
pub struct WatsonBackend {
    client: reqwest::Client,
    url: String,
    version: String,
    token: String,
    assistant_id: String,
    user_id: Uuid,
    session_id: String,
}

impl WatsonBackend {
    /// Validate the configuration and build a client. No network traffic.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        if config.url.is_empty() {
            bail!("Watson url is not configured");
        }
        if config.assistant_id.is_empty() {
            bail!("Watson assistantID is not configured");
        }
        if config.version.is_empty() {
            bail!("Watson version is not configured");
        }

        Ok(Self {
            client: reqwest::Client::new(),
            url: config.url.trim_end_matches('/').to_string(),
            version: config.version.clone(),
            token: config.token.clone(),
            assistant_id: config.assistant_id.clone(),
            user_id: config.user_id.unwrap_or_else(Uuid::new_v4),
            session_id: String::new(),
        })
    }

    fn sessions_url(&self) -> String {
        format!(
            "{}/v2/assistants/{}/sessions",
            self.url, self.assistant_id
        )
    }

    fn session_url(&self, suffix: &str) -> String {
        format!(
            "{}/{}{}?version={}",
            self.sessions_url(),
            self.session_id,
            suffix,
            self.version
        )
    }

    async fn create_session(&mut self) -> Result<()> {
        let url = format!("{}?version={}", self.sessions_url(), self.version);
        let resp = self
            .client
            .post(url)
            .basic_auth(BASIC_AUTH_USER, Some(&self.token))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("Watson API error ({}): {}", status, text);
        }

        let session: SessionResponse = resp.json().await?;
        tracing::debug!(provider = LABEL, session = %session.session_id, "session created");
        self.session_id = session.session_id;
        Ok(())
    }
}

#[async_trait]
impl BackendProvider for WatsonBackend {
    fn label(&self) -> &str {
        LABEL
    }

    async fn message(&self, text: &str) -> Result<Response> {
        let user_id = self.user_id.to_string();
        let body = MessageRequest {
            input: MessageInput {
                message_type: "text",
                text,
            },
            context: MessageContext {
                global: GlobalContext {
                    system: SystemContext { user_id: &user_id },
                },
            },
        };

        let resp = self
            .client
            .post(self.session_url("/message"))
            .basic_auth(BASIC_AUTH_USER, Some(&self.token))
            .json(&body)
            .send()
            .await
            .context("sending a message to Watson Assistant")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("Watson API error ({}): {}", status, text);
        }

        let api_resp: MessageResponse = resp
            .json()
            .await
            .context("converting Watson response")?;
        Ok(convert_response(status.as_u16(), api_resp))
    }

    async fn stop(&self) -> Result<()> {
        let resp = self
            .client
            .delete(self.session_url(""))
            .basic_auth(BASIC_AUTH_USER, Some(&self.token))
            .send()
            .await?;

        if !resp.status().is_success() {
            bail!("Watson API error ({}) deleting session", resp.status());
        }
        Ok(())
    }
}

/// Flatten a Watson reply. Multi-line texts become one output per line so
/// each line is delivered as its own bubble.
fn convert_response(status_code: u16, response: MessageResponse) -> Response {
    let outputs = response
        .output
        .generic
        .into_iter()
        .filter(|generic| !generic.text.is_empty())
        .flat_map(|generic| {
            let response_type = generic.response_type;
            generic
                .text
                .split('\n')
                .map(|line| Output {
                    response_type: response_type.clone(),
                    text: line.to_string(),
                })
                .collect::<Vec<_>>()
        })
        .collect();

    let intents = response
        .output
        .intents
        .into_iter()
        .map(|intent| Intent {
            intent: intent.intent,
            confidence: intent.confidence,
        })
        .collect();

    Response {
        status_code,
        outputs,
        intents,
    }
}

// --- API types ---

#[derive(Deserialize)]
struct SessionResponse {
    session_id: String,
}

#[derive(Serialize)]
struct MessageRequest<'a> {
    input: MessageInput<'a>,
    context: MessageContext<'a>,
}

#[derive(Serialize)]
struct MessageInput<'a> {
    message_type: &'a str,
    text: &'a str,
}

#[derive(Serialize)]
struct MessageContext<'a> {
    global: GlobalContext<'a>,
}

#[derive(Serialize)]
struct GlobalContext<'a> {
    system: SystemContext<'a>,
}

#[derive(Serialize)]
struct SystemContext<'a> {
    user_id: &'a str,
}

#[derive(Deserialize)]
struct MessageResponse {
    output: MessageOutput,
}

#[derive(Deserialize)]
struct MessageOutput {
    #[serde(default)]
    generic: Vec<Generic>,
    #[serde(default)]
    intents: Vec<WatsonIntent>,
}

#[derive(Deserialize)]
struct Generic {
    response_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct WatsonIntent {
    intent: String,
    confidence: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BackendConfig {
        crate::config::parse_backend(
            r#"
label: watson
url: https://api.example.com/assistant/
version: "2019-02-28"
token: secret
assistantID: assistant-1
userID: 67e55044-10b1-426f-9247-bb680e5fe0c8
"#,
        )
        .unwrap()
        .remove(0)
    }

    fn parse(json: &str) -> MessageResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn convert_single_output() {
        let resp = parse(
            r#"{"output": {"generic": [{"response_type": "text", "text": "Hello!"}], "intents": []}}"#,
        );
        let response = convert_response(200, resp);
        assert_eq!(response.status_code, 200);
        assert_eq!(response.outputs.len(), 1);
        assert_eq!(response.outputs[0].text, "Hello!");
        assert_eq!(response.outputs[0].response_type, "text");
        assert!(response.intents.is_empty());
    }

    #[test]
    fn convert_splits_multiline_text() {
        let resp = parse(
            r#"{"output": {"generic": [
                {"response_type": "text", "text": "first\nsecond"},
                {"response_type": "text", "text": "third"}
            ]}}"#,
        );
        let texts: Vec<String> = convert_response(200, resp).into_texts().collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[test]
    fn convert_skips_items_without_text() {
        let resp = parse(
            r#"{"output": {"generic": [
                {"response_type": "pause", "time": 500},
                {"response_type": "text", "text": "after the pause"}
            ]}}"#,
        );
        let response = convert_response(200, resp);
        assert_eq!(response.outputs.len(), 1);
        assert_eq!(response.outputs[0].text, "after the pause");
    }

    #[test]
    fn convert_copies_intents_in_order() {
        let resp = parse(
            r#"{"output": {"generic": [], "intents": [
                {"intent": "greeting", "confidence": 0.92},
                {"intent": "goodbye", "confidence": 0.05}
            ]}}"#,
        );
        let response = convert_response(200, resp);
        assert_eq!(response.intents.len(), 2);
        assert_eq!(response.intents[0].intent, "greeting");
        assert!((response.intents[0].confidence - 0.92).abs() < f32::EPSILON);
        assert_eq!(response.intents[1].intent, "goodbye");
    }

    #[test]
    fn missing_output_fails_to_parse() {
        let result: Result<MessageResponse, _> = serde_json::from_str(r#"{"result": {}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn new_trims_trailing_slash() {
        let backend = WatsonBackend::new(&config()).unwrap();
        assert_eq!(
            backend.sessions_url(),
            "https://api.example.com/assistant/v2/assistants/assistant-1/sessions"
        );
        assert_eq!(
            backend.user_id.to_string(),
            "67e55044-10b1-426f-9247-bb680e5fe0c8"
        );
    }

    #[test]
    fn session_url_includes_version() {
        let mut backend = WatsonBackend::new(&config()).unwrap();
        backend.session_id = "s-1".to_string();
        assert_eq!(
            backend.session_url("/message"),
            "https://api.example.com/assistant/v2/assistants/assistant-1/sessions/s-1/message?version=2019-02-28"
        );
    }

    #[test]
    fn new_rejects_missing_assistant() {
        let mut config = config();
        config.assistant_id.clear();
        let result = WatsonBackend::new(&config);
        assert!(result.is_err());
        assert!(result.err().unwrap().to_string().contains("assistantID"));
    }

    #[test]
    fn new_generates_user_id_when_absent() {
        let mut config = config();
        config.user_id = None;
        let backend = WatsonBackend::new(&config).unwrap();
        assert!(!backend.user_id.is_nil());
    }

    #[test]
    fn message_request_shape() {
        let body = MessageRequest {
            input: MessageInput {
                message_type: "text",
                text: "hello",
            },
            context: MessageContext {
                global: GlobalContext {
                    system: SystemContext { user_id: "u-1" },
                },
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["input"]["text"], "hello");
        assert_eq!(json["context"]["global"]["system"]["user_id"], "u-1");
    }
}
