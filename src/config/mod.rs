//! Configuration for Converse.
//!
//! Everything resolves from environment variables once at startup
//! (`.env` is loaded via dotenvy before `Config::load` runs). Invalid
//! values fail startup; nothing is re-read at runtime.

pub(crate) mod helpers;

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use helpers::{optional_env, parsed_env, required_env};

/// Main configuration for the service.
#[derive(Debug, Clone)]
pub struct Config {
    pub http: HttpConfig,
    pub backend: BackendConfig,
    pub classifier: ClassifierConfig,
    pub telegram: Option<TelegramConfig>,
    pub agent: AgentConfig,
}

/// Inbound HTTP API bind address.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

/// Wallet backend connection settings.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    /// Shared secret sent as `x-internal-secret` on every backend call.
    pub internal_secret: SecretString,
    pub timeout: Duration,
}

/// Intent-classification capability selection.
#[derive(Debug, Clone)]
pub enum ClassifierConfig {
    /// Deterministic keyword matcher; the default when no LLM endpoint is
    /// configured.
    Rules,
    /// OpenAI-compatible chat-completions endpoint.
    OpenAiCompatible {
        base_url: String,
        api_key: Option<SecretString>,
        model: String,
        timeout: Duration,
    },
}

/// Telegram relay settings; the relay only starts when a token is set.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub token: SecretString,
    /// Long-poll timeout passed to getUpdates, in seconds.
    pub poll_timeout_secs: u64,
}

/// Conversation-controller tunables.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// How long a pending payment may wait for its secret key before it
    /// is treated as stale and discarded.
    pub pending_ttl: Duration,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let http = HttpConfig {
            host: optional_env("HTTP_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parsed_env("HTTP_PORT")?.unwrap_or(8000),
        };

        let backend = BackendConfig {
            base_url: optional_env("NODE_API_BASE_URL")
                .unwrap_or_else(|| "http://localhost:3001".to_string()),
            internal_secret: SecretString::from(required_env(
                "INTERNAL_API_SECRET",
                "Set it to the shared secret the wallet backend expects in x-internal-secret.",
            )?),
            timeout: Duration::from_secs(parsed_env("BACKEND_TIMEOUT_SECS")?.unwrap_or(30)),
        };

        let classifier = match optional_env("LLM_API_BASE_URL") {
            Some(base_url) => ClassifierConfig::OpenAiCompatible {
                base_url,
                api_key: optional_env("LLM_API_KEY").map(SecretString::from),
                model: optional_env("LLM_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
                timeout: Duration::from_secs(parsed_env("LLM_TIMEOUT_SECS")?.unwrap_or(60)),
            },
            None => ClassifierConfig::Rules,
        };

        let telegram = optional_env("TELEGRAM_TOKEN").map(|token| TelegramConfig {
            token: SecretString::from(token),
            poll_timeout_secs: 30,
        });

        let agent = AgentConfig {
            pending_ttl: Duration::from_secs(parsed_env("PENDING_TTL_SECS")?.unwrap_or(300)),
        };

        Ok(Self {
            http,
            backend,
            classifier,
            telegram,
            agent,
        })
    }
}
