//! Turning action results into short user-facing replies.
//!
//! The trait is async so a language-generation implementation can slot
//! in behind it; the default renders fixed templates from the result
//! data. Output is always non-empty.

use async_trait::async_trait;

use crate::backend::{ActionResult, contacts_from_body};

use super::intent::{Intent, TaskParams};

/// Everything the formatter may draw on for one reply.
pub struct FormatContext<'a> {
    pub params: &'a TaskParams,
    pub result: &'a ActionResult,
}

#[async_trait]
pub trait ResponseFormatter: Send + Sync {
    /// Produce the user-facing confirmation or summary for a completed
    /// backend call. Must never return an empty string.
    async fn format(&self, intent: Intent, ctx: &FormatContext<'_>) -> String;
}

/// Template-based formatter.
#[derive(Debug, Default)]
pub struct TemplateFormatter;

impl TemplateFormatter {
    pub fn new() -> Self {
        Self
    }

    fn failure_message(&self, intent: Intent, result: &ActionResult) -> String {
        let cause = result
            .message
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or("the backend rejected the request");
        match intent {
            Intent::Login => format!("Login failed: {cause}"),
            Intent::OnboardUser => format!("Account creation failed: {cause}"),
            _ => format!("Sorry, I couldn't complete that: {cause}"),
        }
    }

    fn success_message(&self, intent: Intent, ctx: &FormatContext<'_>) -> String {
        let data = &ctx.result.data;
        match (intent, ctx.params) {
            (Intent::Login, TaskParams::Login { email }) => {
                format!("Login successful! Welcome, {email}.")
            }
            (Intent::OnboardUser, TaskParams::OnboardUser { email, .. }) => {
                let public_key = lookup_str(data, &["publicKey", "public_key"])
                    .or_else(|| nested_str(data, "user", &["publicKey", "public_key"]));
                let secret = lookup_str(data, &["secretKey", "secret_key", "secret"]);
                match (public_key, secret) {
                    (Some(public_key), Some(secret)) => format!(
                        "Account created for {email}! Your public key is {public_key} and your \
                         secret key is {secret}. Store the secret key somewhere safe; it will \
                         not be shown again."
                    ),
                    (Some(public_key), None) => {
                        format!("Account created for {email}! Your public key is {public_key}.")
                    }
                    _ => format!("Account created for {email}!"),
                }
            }
            (Intent::AddContact, TaskParams::AddContact { contact_name, .. }) => {
                format!("Contact {contact_name} saved.")
            }
            (Intent::ListContacts, _) => {
                let contacts = contacts_from_body(data);
                if contacts.is_empty() {
                    "You don't have any saved contacts yet.".to_string()
                } else {
                    let names: Vec<&str> =
                        contacts.iter().map(|c| c.name.as_str()).collect();
                    format!(
                        "You have {} saved contact{}: {}.",
                        contacts.len(),
                        if contacts.len() == 1 { "" } else { "s" },
                        names.join(", ")
                    )
                }
            }
            (Intent::LookupContact, TaskParams::LookupContact { contact_name }) => {
                match nested_str(data, "contact", &["publicKey", "public_key"]) {
                    Some(key) => format!("{contact_name}'s address is {key}."),
                    None => format!("I found {contact_name} in your contacts."),
                }
            }
            (Intent::GetAccountBalance, _) => format_balances(data),
            (Intent::GetOperationsHistory, _) => {
                let count = data
                    .get("history")
                    .or_else(|| data.get("operations"))
                    .and_then(|v| v.as_array())
                    .map(|entries| entries.len());
                match count {
                    Some(0) => "No operations in your history yet.".to_string(),
                    Some(n) => format!(
                        "I found {n} operation{} in your history.",
                        if n == 1 { "" } else { "s" }
                    ),
                    None => "Here is your operations history.".to_string(),
                }
            }
            (
                Intent::ExecutePayment,
                TaskParams::ExecutePayment {
                    destination,
                    amount,
                    asset_code,
                    ..
                },
            ) => {
                let mut message =
                    format!("Payment of {amount} {asset_code} to {destination} submitted.");
                if let Some(hash) = lookup_str(data, &["hash", "transactionHash"]) {
                    message.push_str(&format!(" Transaction hash: {hash}."));
                }
                message
            }
            (
                Intent::ExecutePathPayment,
                TaskParams::ExecutePathPayment {
                    destination,
                    dest_asset,
                    dest_amount,
                    source_asset,
                },
            ) => format!(
                "Path payment submitted: {destination} receives {dest_amount} {dest_asset}, \
                 paid from your {source_asset}."
            ),
            (Intent::InitiatePixDeposit, TaskParams::InitiatePixDeposit { amount, asset_code }) => {
                let mut message = format!("PIX deposit of {amount} {asset_code} initiated.");
                if let Some(instructions) = lookup_str(data, &["pixKey", "qrCode", "paymentCode"]) {
                    message.push_str(&format!(" Payment code: {instructions}"));
                }
                message
            }
            _ => ctx
                .result
                .message
                .clone()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| "Done.".to_string()),
        }
    }
}

fn lookup_str<'a>(data: &'a serde_json::Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| data.get(*key).and_then(|v| v.as_str()))
}

fn nested_str<'a>(data: &'a serde_json::Value, parent: &str, keys: &[&str]) -> Option<&'a str> {
    let nested = data.get(parent)?;
    lookup_str(nested, keys)
}

fn format_balances(data: &serde_json::Value) -> String {
    let balances = data.get("balances").and_then(|v| v.as_array());
    match balances {
        Some(entries) if !entries.is_empty() => {
            let parts: Vec<String> = entries
                .iter()
                .filter_map(|entry| {
                    let amount = lookup_str(entry, &["balance", "amount"])?;
                    let asset = lookup_str(entry, &["asset_code", "assetCode", "asset_type"])
                        .unwrap_or("XLM");
                    Some(format!("{amount} {asset}"))
                })
                .collect();
            if parts.is_empty() {
                "Here is your account balance.".to_string()
            } else {
                format!("Your balance: {}.", parts.join(", "))
            }
        }
        _ => "Here is your account balance.".to_string(),
    }
}

#[async_trait]
impl ResponseFormatter for TemplateFormatter {
    async fn format(&self, intent: Intent, ctx: &FormatContext<'_>) -> String {
        let message = if ctx.result.success {
            self.success_message(intent, ctx)
        } else {
            self.failure_message(intent, ctx.result)
        };
        if message.trim().is_empty() {
            "Done.".to_string()
        } else {
            message
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn format_blocking(intent: Intent, params: &TaskParams, result: &ActionResult) -> String {
        let formatter = TemplateFormatter::new();
        let ctx = FormatContext { params, result };
        tokio_test::block_on(formatter.format(intent, &ctx))
    }

    #[test]
    fn login_message_names_the_email() {
        let params = TaskParams::Login {
            email: "a@b.com".to_string(),
        };
        let ok = ActionResult::from_body(json!({"success": true, "sessionToken": "t"}));
        let message = format_blocking(Intent::Login, &params, &ok);
        assert!(message.contains("a@b.com"), "message was: {message}");

        let failed = ActionResult::from_body(json!({"success": false, "message": "User not found"}));
        let message = format_blocking(Intent::Login, &params, &failed);
        assert!(message.contains("User not found"));
    }

    #[test]
    fn balance_summary_lists_assets() {
        let result = ActionResult::from_body(json!({
            "success": true,
            "balances": [
                {"balance": "120.5", "asset_code": "XLM"},
                {"balance": "40", "assetCode": "USDC"}
            ]
        }));
        let message = format_blocking(Intent::GetAccountBalance, &TaskParams::GetAccountBalance, &result);
        assert_eq!(message, "Your balance: 120.5 XLM, 40 USDC.");
    }

    #[test]
    fn balance_without_entries_still_answers() {
        let result = ActionResult::from_body(json!({"success": true}));
        let message = format_blocking(Intent::GetAccountBalance, &TaskParams::GetAccountBalance, &result);
        assert!(!message.trim().is_empty());
    }

    #[test]
    fn contact_list_names_everyone() {
        let result = ActionResult::from_body(json!({
            "success": true,
            "contacts": [
                {"contactName": "Maria", "publicKey": "GMARIA"},
                {"contactName": "Paulo", "publicKey": "GPAULO"}
            ]
        }));
        let message = format_blocking(Intent::ListContacts, &TaskParams::ListContacts, &result);
        assert_eq!(message, "You have 2 saved contacts: Maria, Paulo.");
    }

    #[test]
    fn payment_confirmation_includes_hash_when_present() {
        let params = TaskParams::ExecutePayment {
            destination: "GDEST".to_string(),
            amount: "100".to_string(),
            asset_code: "XLM".to_string(),
            memo: String::new(),
        };
        let result = ActionResult::from_body(json!({"success": true, "hash": "abc123"}));
        let message = format_blocking(Intent::ExecutePayment, &params, &result);
        assert!(message.contains("100 XLM"));
        assert!(message.contains("abc123"));
    }

    #[test]
    fn onboarding_warns_about_the_secret_key() {
        let params = TaskParams::OnboardUser {
            email: "new@user.com".to_string(),
            phone_number: None,
            public_key: None,
        };
        let result = ActionResult::from_body(json!({
            "success": true,
            "publicKey": "GNEWUSER",
            "secretKey": "SNEWSECRET"
        }));
        let message = format_blocking(Intent::OnboardUser, &params, &result);
        assert!(message.contains("GNEWUSER"));
        assert!(message.contains("SNEWSECRET"));
        assert!(message.contains("not be shown again"));
    }
}
