//! LLM-backed intent classifier speaking the OpenAI-compatible
//! chat-completions wire format.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

use crate::config::ClassifierConfig;
use crate::error::{ClassifierError, ConfigError};

use super::classifier::{
    Classification, ClassifierContext, IntentClassifier, parse_classifier_output,
};

/// Instruction prompt: the model sees the task table and must answer
/// with a single JSON object. Parameter extraction rules mirror the
/// schemas in `intent.rs`.
const SYSTEM_PROMPT: &str = r#"You translate a user's chat message into one structured wallet task.

Respond with a single JSON object and nothing else:
{"message": "<short confirmation of what is being done>", "task": "<task name>", "params": {...}}

Tasks and their params:
- login: {"email": ""}
- onboard_user: {"email": ""}
- add_contact: {"contact_name": "", "public_key": ""}
- list_contacts: {}
- lookup_contact: {"contact_name": ""}
- get_account_balance: {}
- get_operations_history: {}
- execute_payment: {"destination": "", "amount": "", "asset_code": "", "memo": ""}
- execute_path_payment: {"destination": "", "dest_asset": "", "dest_amount": "", "source_asset": ""}
- initiate_pix_deposit: {"amount": "", "asset_code": ""}
- clarification_needed: {"message": ""}

Rules:
- Extract parameters exactly as stated. Never invent a value; omit what the user did not say.
- A destination may be a Stellar address (starts with 'G') or a saved contact's name. Pass either through as given.
- Use clarification_needed when the request does not map to a task.
- Respond ONLY with the JSON object. No markdown, no explanations."#;

/// Classifier calling an OpenAI-compatible `/chat/completions` endpoint.
pub struct LlmClassifier {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
}

impl LlmClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self, ConfigError> {
        match config {
            ClassifierConfig::OpenAiCompatible {
                base_url,
                api_key,
                model,
                timeout,
            } => {
                let http = reqwest::Client::builder()
                    .timeout(*timeout)
                    .build()
                    .map_err(|e| ConfigError::InvalidValue {
                        key: "LLM_TIMEOUT_SECS".to_string(),
                        message: format!("failed to build HTTP client: {e}"),
                    })?;
                Ok(Self {
                    http,
                    base_url: base_url.trim_end_matches('/').to_string(),
                    api_key: api_key.clone(),
                    model: model.clone(),
                })
            }
            ClassifierConfig::Rules => Err(ConfigError::MissingRequired {
                key: "LLM_API_BASE_URL".to_string(),
                hint: "LlmClassifier needs an OpenAI-compatible endpoint.".to_string(),
            }),
        }
    }

    fn context_line(ctx: &ClassifierContext) -> String {
        let mut line = if ctx.authenticated {
            "The user is authenticated.".to_string()
        } else {
            "The user is NOT authenticated; only login and onboard_user can execute.".to_string()
        };
        if !ctx.contact_names.is_empty() {
            line.push_str(" Saved contacts: ");
            line.push_str(&ctx.contact_names.join(", "));
            line.push('.');
        }
        line
    }
}

#[async_trait]
impl IntentClassifier for LlmClassifier {
    async fn classify(
        &self,
        text: &str,
        ctx: &ClassifierContext,
    ) -> Result<Classification, ClassifierError> {
        let body = json!({
            "model": self.model,
            "temperature": 0.2,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "system", "content": Self::context_line(ctx) },
                { "role": "user", "content": text },
            ],
        });

        let mut request = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ClassifierError::RequestFailed {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClassifierError::RequestFailed {
                reason: format!("classification endpoint returned HTTP {status}"),
            });
        }

        let payload: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| ClassifierError::InvalidOutput {
                    reason: format!("response is not JSON: {e}"),
                })?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ClassifierError::InvalidOutput {
                reason: "response has no message content".to_string(),
            })?;

        parse_classifier_output(content)
    }
}
