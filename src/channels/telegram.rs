//! Telegram relay: long-polls the Bot API and forwards each text
//! message to the task router.
//!
//! The Telegram user id is the session id, so authentication and
//! pending operations follow the person across chats. The poller never
//! dies on an error; failures are logged, answered with a fixed apology
//! line, and polling resumes after a short backoff.

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use crate::agent::router::TaskRouter;
use crate::config::TelegramConfig;
use crate::error::ChannelError;

const APOLOGY: &str = "Sorry, I'm having a technical problem reaching the assistant right now.";
const GREETING: &str = "Hello! I'm your Stellar assistant. Log in with your email to get \
     started, e.g. 'login with you@example.com'.";
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct TgEnvelope<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUpdate {
    update_id: i64,
    #[serde(default)]
    message: Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    #[serde(default)]
    from: Option<TgUser>,
    chat: TgChat,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
}

pub struct TelegramRelay {
    http: reqwest::Client,
    token: SecretString,
    poll_timeout_secs: u64,
    router: Arc<TaskRouter>,
}

impl TelegramRelay {
    pub fn new(config: &TelegramConfig, router: Arc<TaskRouter>) -> Result<Self, ChannelError> {
        // Long-poll requests stay open for poll_timeout_secs; give the
        // client some slack on top.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + 15))
            .build()
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".to_string(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            token: config.token.clone(),
            poll_timeout_secs: config.poll_timeout_secs,
            router,
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{method}",
            self.token.expose_secret()
        )
    }

    /// Poll loop; runs until the task is aborted.
    pub async fn run(self) {
        let mut offset: i64 = 0;
        tracing::info!("telegram relay started");
        loop {
            match self.fetch_updates(offset).await {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        self.handle_update(update).await;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "telegram getUpdates failed");
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            }
        }
    }

    async fn fetch_updates(&self, offset: i64) -> Result<Vec<TgUpdate>, ChannelError> {
        let response = self
            .http
            .post(self.api_url("getUpdates"))
            .json(&json!({
                "offset": offset,
                "timeout": self.poll_timeout_secs,
                "allowed_updates": ["message"],
            }))
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".to_string(),
                reason: e.to_string(),
            })?;

        let envelope: TgEnvelope<Vec<TgUpdate>> =
            response.json().await.map_err(|e| ChannelError::SendFailed {
                name: "telegram".to_string(),
                reason: format!("invalid getUpdates response: {e}"),
            })?;

        if !envelope.ok {
            return Err(ChannelError::SendFailed {
                name: "telegram".to_string(),
                reason: envelope
                    .description
                    .unwrap_or_else(|| "getUpdates returned ok=false".to_string()),
            });
        }
        Ok(envelope.result.unwrap_or_default())
    }

    async fn handle_update(&self, update: TgUpdate) {
        let Some(message) = update.message else {
            return;
        };
        let Some(text) = message.text.as_deref() else {
            return;
        };

        let chat_id = message.chat.id;
        let reply = if text.trim() == "/start" {
            GREETING.to_string()
        } else {
            // Fall back to the chat id when Telegram omits the sender
            // (channel posts); sessions stay stable either way.
            let session_id = message
                .from
                .as_ref()
                .map(|from| from.id.to_string())
                .unwrap_or_else(|| chat_id.to_string());
            self.router.handle(&session_id, text).await.message
        };

        if let Err(e) = self.send_message(chat_id, &reply).await {
            tracing::warn!(chat_id, error = %e, "failed to deliver telegram reply");
            let _ = self.send_message(chat_id, APOLOGY).await;
        }
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), ChannelError> {
        let response = self
            .http
            .post(self.api_url("sendMessage"))
            .json(&json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".to_string(),
                reason: e.to_string(),
            })?;

        let envelope: TgEnvelope<serde_json::Value> =
            response.json().await.map_err(|e| ChannelError::SendFailed {
                name: "telegram".to_string(),
                reason: format!("invalid sendMessage response: {e}"),
            })?;
        if !envelope.ok {
            return Err(ChannelError::SendFailed {
                name: "telegram".to_string(),
                reason: envelope
                    .description
                    .unwrap_or_else(|| "sendMessage returned ok=false".to_string()),
            });
        }
        Ok(())
    }
}
