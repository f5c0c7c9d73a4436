//! HTTP implementation of [`BackendActions`] over reqwest.

use async_trait::async_trait;
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use url::Url;

use crate::config::BackendConfig;
use crate::error::{BackendError, ConfigError};

use super::{
    ActionResult, BackendActions, PathPaymentRequest, PaymentRequest,
};

/// Action client speaking to the Node wallet backend.
///
/// One attempt per call, no retries; a timeout or error status becomes a
/// failure result for the current user turn.
pub struct HttpActionClient {
    http: reqwest::Client,
    base_url: Url,
    internal_secret: SecretString,
}

impl HttpActionClient {
    pub fn new(config: &BackendConfig) -> Result<Self, ConfigError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| ConfigError::InvalidValue {
            key: "NODE_API_BASE_URL".to_string(),
            message: format!("not a valid URL: {e}"),
        })?;
        if base_url.host_str().is_none() {
            return Err(ConfigError::InvalidValue {
                key: "NODE_API_BASE_URL".to_string(),
                message: "URL is missing a host".to_string(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                key: "BACKEND_TIMEOUT_SECS".to_string(),
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            base_url,
            internal_secret: config.internal_secret.clone(),
        })
    }

    async fn call(
        &self,
        action: &'static str,
        method: Method,
        path: &str,
        token: Option<&SecretString>,
        body: Option<serde_json::Value>,
    ) -> Result<ActionResult, BackendError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| BackendError::Request {
                action,
                reason: format!("invalid endpoint path: {e}"),
            })?;

        let mut request = self
            .http
            .request(method, url)
            .header("x-internal-secret", self.internal_secret.expose_secret());
        if let Some(token) = token {
            request = request.bearer_auth(token.expose_secret());
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| BackendError::Request {
            action,
            reason: e.to_string(),
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| BackendError::Request {
            action,
            reason: format!("failed to read response body: {e}"),
        })?;

        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(body) if status.is_success() => Ok(ActionResult::from_body(body)),
            Ok(body) => {
                // Error statuses still carry a structured body; surface
                // the backend's own message rather than a bare code.
                tracing::debug!(action, status = status.as_u16(), "backend returned error status");
                let message = body
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(String::from)
                    .unwrap_or_else(|| format!("backend returned HTTP {status}"));
                Ok(ActionResult {
                    success: false,
                    data: body,
                    message: Some(message),
                })
            }
            Err(_) if status.is_success() => Err(BackendError::InvalidResponse {
                action,
                reason: "response body is not JSON".to_string(),
            }),
            Err(_) => Err(BackendError::Status {
                action,
                status: status.as_u16(),
                message: truncate(text.trim(), 200),
            }),
        }
    }

    /// Fold a call error into a failure result, logging the cause.
    async fn call_folded(
        &self,
        action: &'static str,
        method: Method,
        path: &str,
        token: Option<&SecretString>,
        body: Option<serde_json::Value>,
    ) -> ActionResult {
        match self.call(action, method, path, token, body).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(action, error = %e, "backend call failed");
                ActionResult::failure(e.to_string())
            }
        }
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let cut = text
            .char_indices()
            .take_while(|(i, _)| *i < max)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}…", &text[..cut])
    }
}

#[async_trait]
impl BackendActions for HttpActionClient {
    async fn login(&self, email: &str) -> ActionResult {
        self.call_folded(
            "login",
            Method::POST,
            "/api/actions/login",
            None,
            Some(json!({ "email": email })),
        )
        .await
    }

    async fn onboard_user(
        &self,
        email: &str,
        phone_number: Option<&str>,
        public_key: Option<&str>,
    ) -> ActionResult {
        self.call_folded(
            "onboard_user",
            Method::POST,
            "/api/actions/onboard-user",
            None,
            Some(json!({
                "email": email,
                "phone_number": phone_number.unwrap_or(""),
                "public_key": public_key.unwrap_or(""),
            })),
        )
        .await
    }

    async fn add_contact(
        &self,
        token: &SecretString,
        contact_name: &str,
        public_key: &str,
    ) -> ActionResult {
        self.call_folded(
            "add_contact",
            Method::POST,
            "/api/actions/add-contact",
            Some(token),
            Some(json!({
                "contactName": contact_name,
                "publicKey": public_key,
            })),
        )
        .await
    }

    async fn list_contacts(&self, token: &SecretString) -> ActionResult {
        self.call_folded(
            "list_contacts",
            Method::POST,
            "/api/actions/list-contacts",
            Some(token),
            None,
        )
        .await
    }

    async fn lookup_contact(&self, token: &SecretString, contact_name: &str) -> ActionResult {
        self.call_folded(
            "lookup_contact",
            Method::POST,
            "/api/actions/lookup-contact",
            Some(token),
            Some(json!({ "contactName": contact_name })),
        )
        .await
    }

    async fn account_balance(&self, token: &SecretString) -> ActionResult {
        self.call_folded(
            "get_account_balance",
            Method::GET,
            "/api/actions/get-account-balance",
            Some(token),
            None,
        )
        .await
    }

    async fn operations_history(&self, token: &SecretString) -> ActionResult {
        self.call_folded(
            "get_operations_history",
            Method::GET,
            "/api/actions/get-operations-history",
            Some(token),
            None,
        )
        .await
    }

    async fn execute_payment(
        &self,
        token: &SecretString,
        request: &PaymentRequest,
    ) -> ActionResult {
        self.call_folded(
            "execute_payment",
            Method::POST,
            "/api/actions/sign-and-submit-xdr",
            Some(token),
            Some(json!({
                "destination": request.destination,
                "amount": request.amount,
                "assetCode": request.asset_code,
                "memo": request.memo,
                "secretKey": request.secret_key.expose_secret(),
            })),
        )
        .await
    }

    async fn execute_path_payment(
        &self,
        token: &SecretString,
        request: &PathPaymentRequest,
    ) -> ActionResult {
        self.call_folded(
            "execute_path_payment",
            Method::POST,
            "/api/actions/execute-path-payment",
            Some(token),
            Some(json!({
                "destination": request.destination,
                "destAsset": request.dest_asset,
                "destAmount": request.dest_amount,
                "sourceAsset": request.source_asset,
                "secretKey": request.secret_key.expose_secret(),
            })),
        )
        .await
    }

    async fn initiate_pix_deposit(
        &self,
        token: &SecretString,
        amount: &str,
        asset_code: &str,
    ) -> ActionResult {
        self.call_folded(
            "initiate_pix_deposit",
            Method::POST,
            "/api/actions/initiate-pix-deposit",
            Some(token),
            Some(json!({
                "amount": amount,
                "assetCode": asset_code,
            })),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_config(base_url: &str) -> BackendConfig {
        BackendConfig {
            base_url: base_url.to_string(),
            internal_secret: SecretString::from("test-secret".to_string()),
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn rejects_invalid_base_url() {
        assert!(HttpActionClient::new(&test_config("not a url")).is_err());
        assert!(HttpActionClient::new(&test_config("http://localhost:3001")).is_ok());
    }

    #[test]
    fn truncates_long_error_bodies() {
        let long = "x".repeat(500);
        let short = truncate(&long, 200);
        assert!(short.len() < 250);
        assert!(short.ends_with('…'));
        assert_eq!(truncate("short", 200), "short");
    }

    #[tokio::test]
    async fn unreachable_backend_folds_into_failure_result() {
        // Port 9 (discard) is not listening; the connect error must come
        // back as a failure result, not an Err.
        let client = HttpActionClient::new(&test_config("http://127.0.0.1:9")).unwrap();
        let result = client.login("user@example.com").await;
        assert!(!result.success);
        assert!(result.message.is_some());
    }
}
