//! The closed intent set, per-intent parameter schemas, and the wire
//! reply shape.
//!
//! Each intent carries its own strongly-typed parameter variant;
//! [`extract_params`] is the single place free-form classifier output is
//! validated against the schema, so the router never touches an untyped
//! parameter bag.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Email-shaped token, used by the login short-circuit and for
/// validating email parameters.
pub static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("valid email regex")
});

/// Stellar account address: 'G' followed by 55 base32 characters.
pub static STELLAR_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bG[A-Z2-7]{55}\b").expect("valid address regex"));

/// Whether a destination string is already an address rather than a
/// contact name.
pub fn is_address(value: &str) -> bool {
    let trimmed = value.trim();
    STELLAR_KEY_RE
        .find(trimmed)
        .is_some_and(|m| m.start() == 0 && m.end() == trimmed.len())
}

/// The fixed set of backend tasks a message can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Login,
    OnboardUser,
    AddContact,
    ListContacts,
    LookupContact,
    GetAccountBalance,
    GetOperationsHistory,
    ExecutePayment,
    ExecutePathPayment,
    InitiatePixDeposit,
    ClarificationNeeded,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::OnboardUser => "onboard_user",
            Self::AddContact => "add_contact",
            Self::ListContacts => "list_contacts",
            Self::LookupContact => "lookup_contact",
            Self::GetAccountBalance => "get_account_balance",
            Self::GetOperationsHistory => "get_operations_history",
            Self::ExecutePayment => "execute_payment",
            Self::ExecutePathPayment => "execute_path_payment",
            Self::InitiatePixDeposit => "initiate_pix_deposit",
            Self::ClarificationNeeded => "clarification_needed",
        }
    }

    pub fn from_task_name(name: &str) -> Option<Self> {
        match name.trim() {
            "login" => Some(Self::Login),
            "onboard_user" => Some(Self::OnboardUser),
            "add_contact" => Some(Self::AddContact),
            "list_contacts" => Some(Self::ListContacts),
            "lookup_contact" => Some(Self::LookupContact),
            "get_account_balance" => Some(Self::GetAccountBalance),
            "get_operations_history" => Some(Self::GetOperationsHistory),
            "execute_payment" => Some(Self::ExecutePayment),
            "execute_path_payment" => Some(Self::ExecutePathPayment),
            "initiate_pix_deposit" => Some(Self::InitiatePixDeposit),
            "clarification_needed" => Some(Self::ClarificationNeeded),
            _ => None,
        }
    }

    /// Intents allowed without a session token.
    pub fn is_public(&self) -> bool {
        matches!(
            self,
            Self::Login | Self::OnboardUser | Self::ClarificationNeeded
        )
    }

    /// Intents that need a client-held secret key before dispatch.
    pub fn requires_secret(&self) -> bool {
        matches!(self, Self::ExecutePayment | Self::ExecutePathPayment)
    }

    /// Example phrasing surfaced when required parameters are missing.
    pub fn example_usage(&self) -> &'static str {
        match self {
            Self::Login => "login with you@example.com",
            Self::OnboardUser => "create an account with you@example.com",
            Self::AddContact => "add contact Maria with key GXXXX…",
            Self::ListContacts => "list my contacts",
            Self::LookupContact => "look up Maria in my contacts",
            Self::GetAccountBalance => "what's my balance?",
            Self::GetOperationsHistory => "show my transaction history",
            Self::ExecutePayment => "send 100 XLM to Maria",
            Self::ExecutePathPayment => "send 50 USDC to Maria paying with XLM",
            Self::InitiatePixDeposit => "deposit 500 via PIX",
            Self::ClarificationNeeded => "tell me what you'd like to do",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed parameters, one variant per intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskParams {
    Login {
        email: String,
    },
    OnboardUser {
        email: String,
        phone_number: Option<String>,
        public_key: Option<String>,
    },
    AddContact {
        contact_name: String,
        public_key: String,
    },
    ListContacts,
    LookupContact {
        contact_name: String,
    },
    GetAccountBalance,
    GetOperationsHistory,
    ExecutePayment {
        destination: String,
        amount: String,
        asset_code: String,
        memo: String,
    },
    ExecutePathPayment {
        destination: String,
        dest_asset: String,
        dest_amount: String,
        source_asset: String,
    },
    InitiatePixDeposit {
        amount: String,
        asset_code: String,
    },
    Clarification {
        detail: Option<String>,
    },
}

impl TaskParams {
    pub fn intent(&self) -> Intent {
        match self {
            Self::Login { .. } => Intent::Login,
            Self::OnboardUser { .. } => Intent::OnboardUser,
            Self::AddContact { .. } => Intent::AddContact,
            Self::ListContacts => Intent::ListContacts,
            Self::LookupContact { .. } => Intent::LookupContact,
            Self::GetAccountBalance => Intent::GetAccountBalance,
            Self::GetOperationsHistory => Intent::GetOperationsHistory,
            Self::ExecutePayment { .. } => Intent::ExecutePayment,
            Self::ExecutePathPayment { .. } => Intent::ExecutePathPayment,
            Self::InitiatePixDeposit { .. } => Intent::InitiatePixDeposit,
            Self::Clarification { .. } => Intent::ClarificationNeeded,
        }
    }

    /// Echo of the resolved parameters for the wire reply.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Login { email } => json!({ "email": email }),
            Self::OnboardUser {
                email,
                phone_number,
                public_key,
            } => {
                let mut obj = json!({ "email": email });
                if let Some(phone) = phone_number {
                    obj["phone_number"] = json!(phone);
                }
                if let Some(key) = public_key {
                    obj["public_key"] = json!(key);
                }
                obj
            }
            Self::AddContact {
                contact_name,
                public_key,
            } => json!({ "contact_name": contact_name, "public_key": public_key }),
            Self::ListContacts | Self::GetAccountBalance | Self::GetOperationsHistory => {
                json!({})
            }
            Self::LookupContact { contact_name } => json!({ "contact_name": contact_name }),
            Self::ExecutePayment {
                destination,
                amount,
                asset_code,
                memo,
            } => json!({
                "destination": destination,
                "amount": amount,
                "asset_code": asset_code,
                "memo": memo,
            }),
            Self::ExecutePathPayment {
                destination,
                dest_asset,
                dest_amount,
                source_asset,
            } => json!({
                "destination": destination,
                "dest_asset": dest_asset,
                "dest_amount": dest_amount,
                "source_asset": source_asset,
            }),
            Self::InitiatePixDeposit { amount, asset_code } => {
                json!({ "amount": amount, "asset_code": asset_code })
            }
            Self::Clarification { detail } => match detail {
                Some(detail) => json!({ "message": detail }),
                None => json!({}),
            },
        }
    }
}

/// Why a raw parameter bag failed the schema check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamError {
    Missing {
        intent: Intent,
        fields: Vec<&'static str>,
    },
    Invalid {
        intent: Intent,
        field: &'static str,
        reason: String,
    },
}

/// Validate a raw classifier parameter bag against the intent's schema.
///
/// Values are never guessed: a missing or malformed required field is an
/// error for the caller to surface, not something to fill in.
pub fn extract_params(intent: Intent, raw: &Value) -> Result<TaskParams, ParamError> {
    match intent {
        Intent::Login => {
            let email = require_str(intent, raw, "email", &["email"])?;
            validate_email(intent, &email)?;
            Ok(TaskParams::Login { email })
        }
        Intent::OnboardUser => {
            let email = require_str(intent, raw, "email", &["email"])?;
            validate_email(intent, &email)?;
            Ok(TaskParams::OnboardUser {
                email,
                phone_number: optional_str(raw, &["phone_number", "phoneNumber", "phone"]),
                public_key: optional_str(raw, &["public_key", "publicKey"]),
            })
        }
        Intent::AddContact => {
            let mut missing = Vec::new();
            let contact_name = optional_str(raw, &["contact_name", "contactName", "name"]);
            let public_key = optional_str(raw, &["public_key", "publicKey", "key"]);
            if contact_name.is_none() {
                missing.push("contact_name");
            }
            if public_key.is_none() {
                missing.push("public_key");
            }
            if !missing.is_empty() {
                return Err(ParamError::Missing {
                    intent,
                    fields: missing,
                });
            }
            let public_key = public_key.expect("checked above");
            if !is_address(&public_key) {
                return Err(ParamError::Invalid {
                    intent,
                    field: "public_key",
                    reason: format!("'{public_key}' is not a Stellar address"),
                });
            }
            Ok(TaskParams::AddContact {
                contact_name: contact_name.expect("checked above"),
                public_key,
            })
        }
        Intent::ListContacts => Ok(TaskParams::ListContacts),
        Intent::LookupContact => Ok(TaskParams::LookupContact {
            contact_name: require_str(
                intent,
                raw,
                "contact_name",
                &["contact_name", "contactName", "name"],
            )?,
        }),
        Intent::GetAccountBalance => Ok(TaskParams::GetAccountBalance),
        Intent::GetOperationsHistory => Ok(TaskParams::GetOperationsHistory),
        Intent::ExecutePayment => {
            let destination = require_str(intent, raw, "destination", &["destination", "to"])?;
            let amount = require_amount(intent, raw, "amount", &["amount", "value"])?;
            let asset_code = optional_str(raw, &["asset_code", "assetCode", "asset", "issuer"])
                .map(|code| code.to_ascii_uppercase())
                .unwrap_or_else(|| "XLM".to_string());
            let memo = optional_str(raw, &["memo", "note"]).unwrap_or_default();
            Ok(TaskParams::ExecutePayment {
                destination,
                amount,
                asset_code,
                memo,
            })
        }
        Intent::ExecutePathPayment => {
            let destination = require_str(intent, raw, "destination", &["destination", "to"])?;
            let dest_asset =
                require_str(intent, raw, "dest_asset", &["dest_asset", "destAsset"])?
                    .to_ascii_uppercase();
            let dest_amount =
                require_amount(intent, raw, "dest_amount", &["dest_amount", "destAmount"])?;
            let source_asset =
                require_str(intent, raw, "source_asset", &["source_asset", "sourceAsset"])?
                    .to_ascii_uppercase();
            Ok(TaskParams::ExecutePathPayment {
                destination,
                dest_asset,
                dest_amount,
                source_asset,
            })
        }
        Intent::InitiatePixDeposit => {
            let amount = require_amount(intent, raw, "amount", &["amount", "value"])?;
            let asset_code = optional_str(raw, &["asset_code", "assetCode", "asset"])
                .map(|code| code.to_ascii_uppercase())
                .unwrap_or_else(|| "BRLC".to_string());
            Ok(TaskParams::InitiatePixDeposit { amount, asset_code })
        }
        Intent::ClarificationNeeded => Ok(TaskParams::Clarification {
            detail: optional_str(raw, &["message", "detail"]),
        }),
    }
}

fn optional_str(raw: &Value, keys: &[&str]) -> Option<String> {
    let obj = raw.as_object()?;
    for key in keys {
        match obj.get(*key) {
            Some(Value::String(s)) if !s.trim().is_empty() => return Some(s.trim().to_string()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

fn require_str(
    intent: Intent,
    raw: &Value,
    field: &'static str,
    keys: &[&str],
) -> Result<String, ParamError> {
    optional_str(raw, keys).ok_or(ParamError::Missing {
        intent,
        fields: vec![field],
    })
}

fn require_amount(
    intent: Intent,
    raw: &Value,
    field: &'static str,
    keys: &[&str],
) -> Result<String, ParamError> {
    let raw_amount = require_str(intent, raw, field, keys)?;
    let amount = Decimal::from_str(raw_amount.trim()).map_err(|_| ParamError::Invalid {
        intent,
        field,
        reason: format!("'{raw_amount}' is not a number"),
    })?;
    if amount <= Decimal::ZERO {
        return Err(ParamError::Invalid {
            intent,
            field,
            reason: "amount must be greater than zero".to_string(),
        });
    }
    Ok(amount.normalize().to_string())
}

fn validate_email(intent: Intent, email: &str) -> Result<(), ParamError> {
    if EMAIL_RE
        .find(email)
        .is_some_and(|m| m.start() == 0 && m.end() == email.len())
    {
        Ok(())
    } else {
        Err(ParamError::Invalid {
            intent,
            field: "email",
            reason: format!("'{email}' is not a valid email address"),
        })
    }
}

/// Wire shape returned to every chat transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResponse {
    pub message: String,
    pub task: Intent,
    pub params: Value,
}

impl TaskResponse {
    pub fn new(message: impl Into<String>, task: Intent, params: Value) -> Self {
        Self {
            message: message.into(),
            task,
            params,
        }
    }

    /// A clarification reply with no extra parameters.
    pub fn clarification(message: impl Into<String>) -> Self {
        Self::new(message, Intent::ClarificationNeeded, json!({}))
    }

    /// A clarification reply carrying flag parameters (e.g.
    /// `requires_login`).
    pub fn clarification_with(message: impl Into<String>, params: Value) -> Self {
        Self::new(message, Intent::ClarificationNeeded, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const KEY: &str = "GAW7MQA7YLQLJZF7GD6M7JZWQCB4EGPPC46YSZAXQ7Z5LKLKNYFFOIGU";

    #[test]
    fn intent_serializes_snake_case() {
        let value = serde_json::to_value(Intent::GetAccountBalance).unwrap();
        assert_eq!(value, json!("get_account_balance"));
        let parsed: Intent = serde_json::from_value(json!("execute_payment")).unwrap();
        assert_eq!(parsed, Intent::ExecutePayment);
    }

    #[test]
    fn task_names_round_trip() {
        for name in [
            "login",
            "onboard_user",
            "add_contact",
            "list_contacts",
            "lookup_contact",
            "get_account_balance",
            "get_operations_history",
            "execute_payment",
            "execute_path_payment",
            "initiate_pix_deposit",
            "clarification_needed",
        ] {
            let intent = Intent::from_task_name(name).expect(name);
            assert_eq!(intent.as_str(), name);
        }
        assert!(Intent::from_task_name("transfer_funds").is_none());
    }

    #[test]
    fn public_set_is_exactly_three() {
        let public: Vec<&str> = [
            Intent::Login,
            Intent::OnboardUser,
            Intent::AddContact,
            Intent::ListContacts,
            Intent::LookupContact,
            Intent::GetAccountBalance,
            Intent::GetOperationsHistory,
            Intent::ExecutePayment,
            Intent::ExecutePathPayment,
            Intent::InitiatePixDeposit,
            Intent::ClarificationNeeded,
        ]
        .iter()
        .filter(|i| i.is_public())
        .map(|i| i.as_str())
        .collect();
        assert_eq!(public, vec!["login", "onboard_user", "clarification_needed"]);
    }

    #[test]
    fn address_detection_requires_full_match() {
        assert!(is_address(KEY));
        assert!(is_address(&format!("  {KEY} ")));
        assert!(!is_address("Maria"));
        assert!(!is_address(&format!("send to {KEY}")));
        assert!(!is_address("GSHORT"));
    }

    #[test]
    fn payment_params_extract_with_aliases_and_defaults() {
        let params = extract_params(
            Intent::ExecutePayment,
            &json!({ "destination": "Maria", "amount": "100.50", "issuer": "usdc" }),
        )
        .unwrap();
        assert_eq!(
            params,
            TaskParams::ExecutePayment {
                destination: "Maria".to_string(),
                amount: "100.5".to_string(),
                asset_code: "USDC".to_string(),
                memo: String::new(),
            }
        );

        // Asset defaults to XLM; numeric amounts are accepted.
        let params = extract_params(
            Intent::ExecutePayment,
            &json!({ "destination": KEY, "amount": 25 }),
        )
        .unwrap();
        assert_eq!(
            params,
            TaskParams::ExecutePayment {
                destination: KEY.to_string(),
                amount: "25".to_string(),
                asset_code: "XLM".to_string(),
                memo: String::new(),
            }
        );
    }

    #[test]
    fn payment_params_report_missing_fields() {
        let err = extract_params(Intent::ExecutePayment, &json!({ "amount": "10" })).unwrap_err();
        assert_eq!(
            err,
            ParamError::Missing {
                intent: Intent::ExecutePayment,
                fields: vec!["destination"],
            }
        );
    }

    #[test]
    fn non_positive_amount_is_invalid() {
        let err = extract_params(
            Intent::ExecutePayment,
            &json!({ "destination": "Maria", "amount": "0" }),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ParamError::Invalid {
                field: "amount",
                ..
            }
        ));

        let err = extract_params(
            Intent::ExecutePayment,
            &json!({ "destination": "Maria", "amount": "lots" }),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ParamError::Invalid {
                field: "amount",
                ..
            }
        ));
    }

    #[test]
    fn add_contact_lists_all_missing_fields() {
        let err = extract_params(Intent::AddContact, &json!({})).unwrap_err();
        assert_eq!(
            err,
            ParamError::Missing {
                intent: Intent::AddContact,
                fields: vec!["contact_name", "public_key"],
            }
        );
    }

    #[test]
    fn add_contact_rejects_malformed_key() {
        let err = extract_params(
            Intent::AddContact,
            &json!({ "contactName": "Bob", "publicKey": "GABCD1234" }),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ParamError::Invalid {
                field: "public_key",
                ..
            }
        ));
    }

    #[test]
    fn login_validates_email_shape() {
        assert!(extract_params(Intent::Login, &json!({ "email": "a@b.com" })).is_ok());
        let err = extract_params(Intent::Login, &json!({ "email": "not-an-email" })).unwrap_err();
        assert!(matches!(err, ParamError::Invalid { field: "email", .. }));
    }

    #[test]
    fn pix_deposit_defaults_to_brlc() {
        let params = extract_params(Intent::InitiatePixDeposit, &json!({ "amount": "500" })).unwrap();
        assert_eq!(
            params,
            TaskParams::InitiatePixDeposit {
                amount: "500".to_string(),
                asset_code: "BRLC".to_string(),
            }
        );
    }

    #[test]
    fn params_echo_uses_canonical_keys() {
        let params = TaskParams::ExecutePayment {
            destination: KEY.to_string(),
            amount: "100".to_string(),
            asset_code: "XLM".to_string(),
            memo: "Dinner".to_string(),
        };
        assert_eq!(
            params.to_value(),
            json!({
                "destination": KEY,
                "amount": "100",
                "asset_code": "XLM",
                "memo": "Dinner",
            })
        );
    }
}
