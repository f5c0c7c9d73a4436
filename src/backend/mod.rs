//! Typed surface over the wallet backend's action endpoints.
//!
//! Every operation makes exactly one HTTP call and folds all failure
//! modes (transport errors, non-2xx statuses, unparseable bodies) into
//! `ActionResult { success: false, .. }`. Callers branch on `success`;
//! nothing here raises past the router.

mod client;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

pub use client::HttpActionClient;

/// Outcome of a backend action call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    /// Full response body as returned by the backend.
    pub data: serde_json::Value,
    pub message: Option<String>,
}

impl ActionResult {
    /// Build a failure result from a local error, with an empty body.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: serde_json::Value::Null,
            message: Some(message.into()),
        }
    }

    /// Interpret a 2xx response body. A missing `success` field counts as
    /// success; the backend only omits it on plain-data replies.
    pub fn from_body(body: serde_json::Value) -> Self {
        let success = body
            .get("success")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);
        let message = body
            .get("message")
            .and_then(|v| v.as_str())
            .map(String::from);
        Self {
            success,
            data: body,
            message,
        }
    }

    /// Pull a string field out of the response body.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }
}

/// A saved address-book entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(alias = "contactName", alias = "contact_name")]
    pub name: String,
    #[serde(rename = "publicKey", alias = "public_key")]
    pub public_key: String,
}

/// Parse the contact array out of a list-contacts response body.
pub fn contacts_from_body(body: &serde_json::Value) -> Vec<Contact> {
    body.get("contacts")
        .and_then(|v| v.as_array())
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Fully-resolved direct payment, ready for sign-and-submit.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub destination: String,
    pub amount: String,
    pub asset_code: String,
    pub memo: String,
    pub secret_key: SecretString,
}

/// Fully-resolved cross-asset payment.
#[derive(Debug, Clone)]
pub struct PathPaymentRequest {
    pub destination: String,
    pub dest_asset: String,
    pub dest_amount: String,
    pub source_asset: String,
    pub secret_key: SecretString,
}

/// One method per backend capability.
///
/// Protected operations take the session's bearer token; `login` and
/// `onboard_user` are the only unauthenticated calls.
#[async_trait]
pub trait BackendActions: Send + Sync {
    async fn login(&self, email: &str) -> ActionResult;

    async fn onboard_user(
        &self,
        email: &str,
        phone_number: Option<&str>,
        public_key: Option<&str>,
    ) -> ActionResult;

    async fn add_contact(
        &self,
        token: &SecretString,
        contact_name: &str,
        public_key: &str,
    ) -> ActionResult;

    async fn list_contacts(&self, token: &SecretString) -> ActionResult;

    async fn lookup_contact(&self, token: &SecretString, contact_name: &str) -> ActionResult;

    async fn account_balance(&self, token: &SecretString) -> ActionResult;

    async fn operations_history(&self, token: &SecretString) -> ActionResult;

    async fn execute_payment(&self, token: &SecretString, request: &PaymentRequest)
    -> ActionResult;

    async fn execute_path_payment(
        &self,
        token: &SecretString,
        request: &PathPaymentRequest,
    ) -> ActionResult;

    async fn initiate_pix_deposit(
        &self,
        token: &SecretString,
        amount: &str,
        asset_code: &str,
    ) -> ActionResult;
}
