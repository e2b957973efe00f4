use anyhow::{Context as _, Result, anyhow, bail};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{FrontendDescriptor, FrontendProvider, InboundMessage};
use crate::capsule::{Capsule, Content};
use crate::config::{AuthorizedUser, FrontendConfig};
use crate::consts::error_notice;
use crate::error::Error;
use crate::pending::PendingMessages;

const LABEL: &str = "telegram";
const API_URL: &str = "https://api.telegram.org";

/// Long-poll timeout when the configuration does not set one.
const DEFAULT_POLL_TIMEOUT_SECS: u64 = 10;

/// Extra time the HTTP client waits beyond the long-poll timeout.
const HTTP_GRACE_SECS: u64 = 15;

/// Pause after a failed poll before trying again.
const RETRY_DELAY: Duration = Duration::from_secs(3);

/// Builds [`TelegramBot`]s.
pub struct TelegramDescriptor;

#[async_trait]
impl FrontendDescriptor for TelegramDescriptor {
    fn label(&self) -> &str {
        LABEL
    }

    async fn initialize(
        &self,
        config: &FrontendConfig,
        inbound: mpsc::Sender<InboundMessage>,
    ) -> Result<Box<dyn FrontendProvider>> {
        debug!(provider = LABEL, "initializing");
        let bot = TelegramBot::new(config, inbound)?;
        let me: BotUser = bot
            .call("getMe", &serde_json::json!({}))
            .await
            .context("initializing telegram")?;
        info!(provider = LABEL, username = ?me.username, "telegram bot connected");
        Ok(Box::new(bot))
    }
}

/// Where to send the reply to a pending message.
#[derive(Debug, Clone, PartialEq)]
struct Recipient {
    chat_id: i64,
    username: String,
}

/// A Telegram bot driven by long polling.
pub struct TelegramBot {
    client: reqwest::Client,
    /// `{api}/bot{token}`
    endpoint: String,
    poll_timeout: u64,
    authorized_users: Vec<AuthorizedUser>,
    pending: PendingMessages<Recipient>,
    inbound: Mutex<Option<mpsc::Sender<InboundMessage>>>,
    cancel: CancellationToken,
}

impl TelegramBot {
    /// Build the bot without touching the network.
    pub fn new(config: &FrontendConfig, inbound: mpsc::Sender<InboundMessage>) -> Result<Self> {
        if config.token.is_empty() {
            bail!("telegram token is not configured");
        }

        let poll_timeout = config.poll_timeout.unwrap_or(DEFAULT_POLL_TIMEOUT_SECS);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(poll_timeout + HTTP_GRACE_SECS))
            .build()?;
        let api = config
            .api_url
            .as_deref()
            .unwrap_or(API_URL)
            .trim_end_matches('/');

        Ok(Self {
            client,
            endpoint: format!("{api}/bot{}", config.token),
            poll_timeout,
            authorized_users: config.authorized_users.clone(),
            pending: PendingMessages::new(),
            inbound: Mutex::new(Some(inbound)),
            cancel: CancellationToken::new(),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: &impl Serialize) -> Result<T> {
        let resp = self
            .client
            .post(format!("{}/{}", self.endpoint, method))
            .json(body)
            .send()
            .await?;
        let api_resp: ApiResponse<T> = resp.json().await?;
        if !api_resp.ok {
            bail!(
                "telegram {} failed: {}",
                method,
                api_resp.description.unwrap_or_default()
            );
        }
        api_resp
            .result
            .ok_or_else(|| anyhow!("telegram {method} returned no result"))
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        let body = GetUpdates {
            offset,
            timeout: self.poll_timeout,
            allowed_updates: &["message"],
        };
        self.call("getUpdates", &body).await
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        let _: serde_json::Value = self
            .call("sendMessage", &SendMessage { chat_id, text })
            .await?;
        Ok(())
    }

    fn inbound_sender(&self) -> Option<mpsc::Sender<InboundMessage>> {
        self.inbound
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    async fn handle_message(&self, message: Message) {
        let Some(sender) = message.from.as_ref() else {
            return;
        };
        let username = sender.username.clone().unwrap_or_default();

        if !is_authorized(&self.authorized_users, sender.id, &username) {
            debug!(from = %username, sender_id = sender.id, "message from unauthorized user");
            return;
        }

        let chat_id = message.chat.id;
        match classify(&message) {
            Incoming::Text(text) => {
                debug!(from = %username, sender_id = sender.id, "user message received");
                let recipient = Recipient { chat_id, username };
                if let Err(e) = self.forward(recipient, text).await {
                    warn!(error = %e, "cannot forward user message");
                    self.notify(chat_id, &e.to_string()).await;
                }
            }
            Incoming::Photo => {
                let err = Error::not_implemented("photo message handling");
                self.notify(chat_id, &err.to_string()).await;
            }
            Incoming::Audio => {
                let err = Error::not_implemented("audio message handling");
                self.notify(chat_id, &err.to_string()).await;
            }
            Incoming::Other => debug!(from = %username, "ignoring unsupported update"),
        }
    }

    /// Record the message as pending, then hand it to the manager.
    async fn forward(&self, recipient: Recipient, text: String) -> Result<()> {
        let inbound = self
            .inbound_sender()
            .ok_or_else(|| anyhow!("telegram provider is stopped"))?;

        let id = Uuid::new_v4();
        let user = recipient.username.clone();
        self.pending.insert(id, recipient);

        let message = InboundMessage {
            id,
            provider: LABEL.to_string(),
            content: Content::Text(text),
            user,
        };

        let sent = tokio::select! {
            _ = self.cancel.cancelled() => false,
            result = inbound.send(message) => result.is_ok(),
        };
        if !sent {
            let _ = self.pending.take(&id);
            bail!("message could not be handed over, please retry later");
        }
        Ok(())
    }

    /// Send a system error notice, logging failures.
    async fn notify(&self, chat_id: i64, content: &str) {
        let notice = error_notice(content);
        if let Err(e) = self.send_text(chat_id, &notice).await {
            warn!(chat_id, error = %e, "cannot send system notice");
        }
    }
}

#[async_trait]
impl FrontendProvider for TelegramBot {
    fn label(&self) -> &str {
        LABEL
    }

    async fn start(&self) -> Result<()> {
        info!(provider = LABEL, "starting telegram polling loop");
        let mut offset = 0;

        loop {
            let updates = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.get_updates(offset) => result,
            };

            match updates {
                Ok(updates) => {
                    for update in updates {
                        offset = update.update_id + 1;
                        if let Some(message) = update.message {
                            self.handle_message(message).await;
                        }
                    }
                }
                Err(e) => {
                    warn!(provider = LABEL, error = %e, "telegram polling failed");
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(RETRY_DELAY) => {}
                    }
                }
            }
        }

        info!(provider = LABEL, "telegram polling stopped");
        Ok(())
    }

    async fn message(&self, capsule: &Capsule) -> crate::Result<()> {
        let recipient = self.pending.take(&capsule.original_message)?;

        if let Some(err) = capsule.error.as_ref().filter(|_| capsule.is_error()) {
            let notice = error_notice(&err.message);
            return self
                .send_text(recipient.chat_id, &notice)
                .await
                .map_err(|e| Error::delivery(LABEL, e));
        }

        // Telegram rejects empty messages.
        let mut sent = 0;
        for response in capsule.responses.iter().filter(|r| !r.is_empty()) {
            self.send_text(recipient.chat_id, response)
                .await
                .map_err(|e| Error::delivery(LABEL, e))?;
            sent += 1;
        }
        let skipped = capsule.responses.len() - sent;
        debug!(to = %recipient.username, sent, skipped, "replies sent");
        Ok(())
    }

    async fn stop(&self) {
        self.cancel.cancel();
        self.inbound
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }
}

/// Both the numeric id and the username must match an allowlist entry.
fn is_authorized(users: &[AuthorizedUser], id: i64, username: &str) -> bool {
    users.iter().any(|u| u.id == id && u.name == username)
}

#[derive(Debug, PartialEq)]
enum Incoming {
    Text(String),
    Photo,
    Audio,
    Other,
}

fn classify(message: &Message) -> Incoming {
    if let Some(text) = &message.text {
        Incoming::Text(text.clone())
    } else if message.photo.is_some() {
        Incoming::Photo
    } else if message.audio.is_some() || message.voice.is_some() {
        Incoming::Audio
    } else {
        Incoming::Other
    }
}

// --- API types ---

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Deserialize)]
struct BotUser {
    username: Option<String>,
}

#[derive(Serialize)]
struct GetUpdates<'a> {
    offset: i64,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

#[derive(Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Deserialize)]
struct Message {
    from: Option<ChatUser>,
    chat: Chat,
    text: Option<String>,
    photo: Option<serde_json::Value>,
    audio: Option<serde_json::Value>,
    voice: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ChatUser {
    id: i64,
    username: Option<String>,
}

#[derive(Deserialize)]
struct Chat {
    id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capsule::CapsuleErrorKind;

    fn config() -> FrontendConfig {
        FrontendConfig {
            label: LABEL.to_string(),
            is_activated: true,
            token: "123:abc".to_string(),
            authorized_users: vec![AuthorizedUser {
                id: 42,
                name: "bob".to_string(),
            }],
            // Nothing listens here; tests never reach the network.
            api_url: Some("http://127.0.0.1:9/".to_string()),
            poll_timeout: Some(1),
        }
    }

    fn message(json: &str) -> Message {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn authorization_needs_id_and_name() {
        let users = config().authorized_users;
        assert!(is_authorized(&users, 42, "bob"));
        assert!(!is_authorized(&users, 42, "mallory"));
        assert!(!is_authorized(&users, 7, "bob"));
        assert!(!is_authorized(&[], 42, "bob"));
    }

    #[test]
    fn classify_text() {
        let msg = message(r#"{"chat": {"id": 1}, "from": {"id": 42, "username": "bob"}, "text": "hello"}"#);
        assert_eq!(classify(&msg), Incoming::Text("hello".to_string()));
    }

    #[test]
    fn classify_photo_and_audio() {
        let photo = message(r#"{"chat": {"id": 1}, "photo": [{"file_id": "x"}]}"#);
        let audio = message(r#"{"chat": {"id": 1}, "audio": {"file_id": "y"}}"#);
        let voice = message(r#"{"chat": {"id": 1}, "voice": {"file_id": "z"}}"#);
        let sticker = message(r#"{"chat": {"id": 1}, "sticker": {"file_id": "s"}}"#);
        assert_eq!(classify(&photo), Incoming::Photo);
        assert_eq!(classify(&audio), Incoming::Audio);
        assert_eq!(classify(&voice), Incoming::Audio);
        assert_eq!(classify(&sticker), Incoming::Other);
    }

    #[test]
    fn parses_update_batch() {
        let json = r#"{"ok": true, "result": [
            {"update_id": 10, "message": {"chat": {"id": 5}, "from": {"id": 42, "username": "bob"}, "text": "hi"}},
            {"update_id": 11, "edited_message": {"chat": {"id": 5}}}
        ]}"#;
        let resp: ApiResponse<Vec<Update>> = serde_json::from_str(json).unwrap();
        let updates = resp.result.unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].update_id, 10);
        assert!(updates[1].message.is_none());
    }

    #[test]
    fn parses_api_error() {
        let json = r#"{"ok": false, "error_code": 401, "description": "Unauthorized"}"#;
        let resp: ApiResponse<Vec<Update>> = serde_json::from_str(json).unwrap();
        assert!(!resp.ok);
        assert_eq!(resp.description.as_deref(), Some("Unauthorized"));
    }

    #[test]
    fn new_rejects_empty_token() {
        let (tx, _rx) = mpsc::channel(1);
        let mut config = config();
        config.token.clear();
        assert!(TelegramBot::new(&config, tx).is_err());
    }

    #[test]
    fn new_builds_endpoint() {
        let (tx, _rx) = mpsc::channel(1);
        let bot = TelegramBot::new(&config(), tx).unwrap();
        assert_eq!(bot.endpoint, "http://127.0.0.1:9/bot123:abc");
        assert_eq!(bot.poll_timeout, 1);
    }

    #[tokio::test]
    async fn forward_records_pending_before_handing_over() {
        let (tx, mut rx) = mpsc::channel(1);
        let bot = TelegramBot::new(&config(), tx).unwrap();
        let recipient = Recipient {
            chat_id: 5,
            username: "bob".to_string(),
        };

        bot.forward(recipient.clone(), "hello".to_string())
            .await
            .unwrap();
        let inbound = rx.recv().await.unwrap();

        assert_eq!(inbound.provider, LABEL);
        assert_eq!(inbound.user, "bob");
        assert_eq!(inbound.content, Content::Text("hello".to_string()));
        assert_eq!(bot.pending.take(&inbound.id).unwrap(), recipient);
    }

    #[tokio::test]
    async fn forward_after_stop_fails_without_pending_entry() {
        let (tx, _rx) = mpsc::channel(1);
        let bot = TelegramBot::new(&config(), tx).unwrap();
        bot.stop().await;

        let recipient = Recipient {
            chat_id: 5,
            username: "bob".to_string(),
        };
        assert!(bot.forward(recipient, "hello".to_string()).await.is_err());
        assert!(bot.pending.is_empty());
    }

    #[tokio::test]
    async fn message_without_pending_entry_is_not_found() {
        let (tx, _rx) = mpsc::channel(1);
        let bot = TelegramBot::new(&config(), tx).unwrap();
        let capsule = Capsule::new(Uuid::new_v4(), LABEL, Content::Text("x".into()), "bob")
            .unwrap()
            .with_responses(["hi"]);

        let result = bot.message(&capsule).await;
        assert!(matches!(result, Err(Error::PendingMessageNotFound { .. })));
    }

    #[tokio::test]
    async fn start_returns_after_stop() {
        let (tx, _rx) = mpsc::channel(1);
        let bot = std::sync::Arc::new(TelegramBot::new(&config(), tx).unwrap());
        bot.stop().await;
        bot.start().await.unwrap();
    }

    #[tokio::test]
    async fn failed_send_is_a_delivery_error() {
        let (tx, _rx) = mpsc::channel(1);
        let bot = TelegramBot::new(&config(), tx).unwrap();
        let id = Uuid::new_v4();
        bot.pending.insert(
            id,
            Recipient {
                chat_id: 5,
                username: "bob".to_string(),
            },
        );
        let capsule = Capsule::new(id, LABEL, Content::Text("x".into()), "bob")
            .unwrap()
            .with_responses(["hi"]);

        let result = bot.message(&capsule).await;
        assert!(
            matches!(&result, Err(Error::Delivery { label, .. }) if label == LABEL),
            "{result:?}"
        );
        assert!(bot.pending.is_empty());
    }

    #[test]
    fn error_capsule_renders_as_system_notice() {
        let capsule = Capsule::new(Uuid::new_v4(), LABEL, Content::Text("x".into()), "bob")
            .unwrap()
            .with_error(&Error::provider_call("watson", anyhow!("timeout")));
        let err = capsule.error.as_ref().unwrap();
        assert_eq!(err.kind, CapsuleErrorKind::ProviderCall);
        let notice = error_notice(&err.message);
        assert!(notice.starts_with("[SYSTEM]Error: "));
        assert!(notice.contains("timeout"));
    }
}
