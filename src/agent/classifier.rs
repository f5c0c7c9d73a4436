//! The intent-classification seam.
//!
//! The controller only sees the [`IntentClassifier`] trait; whether the
//! implementation is an LLM call, the deterministic keyword matcher
//! below, or a test double is invisible to it.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::ClassifierError;

use super::intent::{EMAIL_RE, Intent, STELLAR_KEY_RE};

/// Session context made available to the classifier.
#[derive(Debug, Clone, Default)]
pub struct ClassifierContext {
    pub authenticated: bool,
    /// Names from the session's cached contact list, if any.
    pub contact_names: Vec<String>,
}

/// A candidate intent with the raw parameters extracted from the text.
///
/// Parameters are untyped here; the router validates them against the
/// intent's schema before anything is dispatched.
#[derive(Debug, Clone)]
pub struct Classification {
    pub intent: Intent,
    pub params: Value,
    /// Optional user-facing message proposed by the classifier
    /// (clarification phrasing).
    pub message: Option<String>,
}

#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(
        &self,
        text: &str,
        ctx: &ClassifierContext,
    ) -> Result<Classification, ClassifierError>;
}

/// Shape every classifier implementation must produce.
#[derive(Debug, Deserialize)]
struct RawTaskOutput {
    #[serde(default)]
    message: Option<String>,
    task: String,
    #[serde(default)]
    params: Option<Value>,
}

/// Parse a classifier's raw JSON reply into a [`Classification`].
///
/// Tolerates markdown code fences and leading/trailing prose around the
/// JSON object, since LLM output rarely arrives perfectly clean.
pub fn parse_classifier_output(raw: &str) -> Result<Classification, ClassifierError> {
    let candidate = extract_json_object(raw).ok_or_else(|| ClassifierError::InvalidOutput {
        reason: "no JSON object found in output".to_string(),
    })?;

    let parsed: RawTaskOutput =
        serde_json::from_str(candidate).map_err(|e| ClassifierError::InvalidOutput {
            reason: e.to_string(),
        })?;

    let intent =
        Intent::from_task_name(&parsed.task).ok_or_else(|| ClassifierError::InvalidOutput {
            reason: format!("unknown task '{}'", parsed.task),
        })?;

    let params = match parsed.params {
        Some(Value::Object(map)) => Value::Object(map),
        Some(Value::Null) | None => json!({}),
        Some(other) => {
            return Err(ClassifierError::InvalidOutput {
                reason: format!("params must be an object, got {other}"),
            });
        }
    };

    Ok(Classification {
        intent,
        params,
        message: parsed.message.filter(|m| !m.trim().is_empty()),
    })
}

fn extract_json_object(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

static AMOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+(?:[.,]\d+)?\b").expect("valid amount regex"));

static RECIPIENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:to|para)\s+([A-Za-zÀ-ÿ][A-Za-zÀ-ÿ0-9_'\-]*)").expect("valid regex")
});

static CONTACT_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:contact|contato)\s+([A-Za-zÀ-ÿ][A-Za-zÀ-ÿ0-9_'\-]*)")
        .expect("valid regex")
});

static ASSET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z]{3,12}\b").expect("valid asset regex"));

static MEMO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"['"]([^'"]+)['"]"#).expect("valid memo regex"));

/// Deterministic keyword matcher.
///
/// Default classifier when no LLM endpoint is configured, and the one
/// used in tests. Errs on the side of `clarification_needed`: a wrong
/// guess about a payment is worse than a follow-up question.
#[derive(Debug, Default)]
pub struct RuleClassifier;

impl RuleClassifier {
    pub fn new() -> Self {
        Self
    }

    fn classify_text(&self, text: &str) -> Classification {
        let lower = text.to_lowercase();

        if contains_any(&lower, &["login", "log in", "sign in", "logar"]) {
            let params = match EMAIL_RE.find(text) {
                Some(email) => json!({ "email": email.as_str() }),
                None => json!({}),
            };
            return Classification {
                intent: Intent::Login,
                params,
                message: None,
            };
        }

        if contains_any(&lower, &["balance", "saldo"]) {
            return classification(Intent::GetAccountBalance, json!({}));
        }

        if contains_any(
            &lower,
            &["history", "histórico", "historico", "extrato", "operations"],
        ) {
            return classification(Intent::GetOperationsHistory, json!({}));
        }

        if lower.contains("pix") {
            let mut params = json!({});
            if let Some(amount) = AMOUNT_RE.find(text) {
                params["amount"] = json!(amount.as_str().replace(',', "."));
            }
            return classification(Intent::InitiatePixDeposit, params);
        }

        if contains_any(&lower, &["add", "adicionar", "save", "salvar"])
            && contains_any(&lower, &["contact", "contato"])
        {
            let mut params = json!({});
            if let Some(name) = contact_name(text) {
                params["contact_name"] = json!(name);
            }
            if let Some(key) = STELLAR_KEY_RE.find(text) {
                params["public_key"] = json!(key.as_str());
            }
            return classification(Intent::AddContact, params);
        }

        if contains_any(&lower, &["lookup", "look up", "find", "procurar", "buscar"])
            && contains_any(&lower, &["contact", "contato"])
        {
            let mut params = json!({});
            if let Some(name) = contact_name(text) {
                params["contact_name"] = json!(name);
            }
            return classification(Intent::LookupContact, params);
        }

        if contains_any(&lower, &["contacts", "contatos"]) {
            return classification(Intent::ListContacts, json!({}));
        }

        if contains_any(
            &lower,
            &["create account", "open account", "sign up", "register", "criar conta", "onboard"],
        ) {
            let params = match EMAIL_RE.find(text) {
                Some(email) => json!({ "email": email.as_str() }),
                None => json!({}),
            };
            return classification(Intent::OnboardUser, params);
        }

        if contains_any(&lower, &["convert", "swap", "path payment"]) {
            return classification(Intent::ExecutePathPayment, json!({}));
        }

        if contains_any(
            &lower,
            &["send", "pay", "transfer", "enviar", "pagar", "transferir"],
        ) {
            return classification(Intent::ExecutePayment, payment_params(text));
        }

        Classification {
            intent: Intent::ClarificationNeeded,
            params: json!({}),
            message: None,
        }
    }
}

fn classification(intent: Intent, params: Value) -> Classification {
    Classification {
        intent,
        params,
        message: None,
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

fn contact_name(text: &str) -> Option<String> {
    let captured = CONTACT_NAME_RE.captures(text)?.get(1)?.as_str();
    // "add contact with key ..." leaves the name unstated.
    let noise = ["with", "com", "key", "chave", "named"];
    if noise.contains(&captured.to_lowercase().as_str()) {
        None
    } else {
        Some(captured.to_string())
    }
}

fn payment_params(text: &str) -> Value {
    let mut params = json!({});

    if let Some(amount) = AMOUNT_RE.find(text) {
        params["amount"] = json!(amount.as_str().replace(',', "."));
    }

    if let Some(key) = STELLAR_KEY_RE.find(text) {
        params["destination"] = json!(key.as_str());
    } else if let Some(captures) = RECIPIENT_RE.captures(text) {
        params["destination"] = json!(captures.get(1).expect("group 1").as_str());
    }

    // First standalone uppercase token that is not part of an address.
    let key_span = STELLAR_KEY_RE.find(text).map(|m| (m.start(), m.end()));
    for candidate in ASSET_RE.find_iter(text) {
        let inside_key =
            key_span.is_some_and(|(start, end)| candidate.start() >= start && candidate.end() <= end);
        if !inside_key && candidate.as_str() != "PIX" {
            params["asset_code"] = json!(candidate.as_str());
            break;
        }
    }

    if let Some(memo) = MEMO_RE.captures(text) {
        params["memo"] = json!(memo.get(1).expect("group 1").as_str());
    }

    params
}

#[async_trait]
impl IntentClassifier for RuleClassifier {
    async fn classify(
        &self,
        text: &str,
        _ctx: &ClassifierContext,
    ) -> Result<Classification, ClassifierError> {
        Ok(self.classify_text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const KEY: &str = "GAW7MQA7YLQLJZF7GD6M7JZWQCB4EGPPC46YSZAXQ7Z5LKLKNYFFOIGU";

    #[test]
    fn parses_plain_json_output() {
        let parsed = parse_classifier_output(
            r#"{"message": "ok", "task": "get_account_balance", "params": {}}"#,
        )
        .unwrap();
        assert_eq!(parsed.intent, Intent::GetAccountBalance);
        assert_eq!(parsed.message.as_deref(), Some("ok"));
    }

    #[test]
    fn parses_fenced_output() {
        let raw = "```json\n{\"task\": \"list_contacts\", \"params\": {}}\n```";
        let parsed = parse_classifier_output(raw).unwrap();
        assert_eq!(parsed.intent, Intent::ListContacts);
    }

    #[test]
    fn rejects_unknown_task_names() {
        let err = parse_classifier_output(r#"{"task": "rob_bank", "params": {}}"#).unwrap_err();
        assert!(err.to_string().contains("rob_bank"));
    }

    #[test]
    fn rejects_non_object_params() {
        assert!(parse_classifier_output(r#"{"task": "login", "params": "email"}"#).is_err());
        assert!(parse_classifier_output("the answer is probably balance").is_err());
    }

    #[test]
    fn missing_params_default_to_empty_object() {
        let parsed = parse_classifier_output(r#"{"task": "get_account_balance"}"#).unwrap();
        assert_eq!(parsed.params, serde_json::json!({}));
    }

    #[tokio::test]
    async fn rules_classify_balance_and_history() {
        let rules = RuleClassifier::new();
        let ctx = ClassifierContext::default();

        let c = rules.classify("what's my balance?", &ctx).await.unwrap();
        assert_eq!(c.intent, Intent::GetAccountBalance);

        let c = rules.classify("show my operations history", &ctx).await.unwrap();
        assert_eq!(c.intent, Intent::GetOperationsHistory);
    }

    #[tokio::test]
    async fn rules_extract_payment_slots() {
        let rules = RuleClassifier::new();
        let ctx = ClassifierContext::default();

        let c = rules
            .classify("send 100 XLM to Maria with a note saying 'Dinner'", &ctx)
            .await
            .unwrap();
        assert_eq!(c.intent, Intent::ExecutePayment);
        assert_eq!(c.params["amount"], "100");
        assert_eq!(c.params["asset_code"], "XLM");
        assert_eq!(c.params["destination"], "Maria");
        assert_eq!(c.params["memo"], "Dinner");
    }

    #[tokio::test]
    async fn rules_prefer_address_destination_over_name() {
        let rules = RuleClassifier::new();
        let c = rules
            .classify(
                &format!("transfer 5 USDC to {KEY}"),
                &ClassifierContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(c.params["destination"], KEY);
        assert_eq!(c.params["asset_code"], "USDC");
    }

    #[tokio::test]
    async fn rules_classify_contact_operations() {
        let rules = RuleClassifier::new();
        let ctx = ClassifierContext::default();

        let c = rules
            .classify(&format!("add contact Maria with key {KEY}"), &ctx)
            .await
            .unwrap();
        assert_eq!(c.intent, Intent::AddContact);
        assert_eq!(c.params["contact_name"], "Maria");
        assert_eq!(c.params["public_key"], KEY);

        let c = rules.classify("list my contacts", &ctx).await.unwrap();
        assert_eq!(c.intent, Intent::ListContacts);
    }

    #[tokio::test]
    async fn rules_fall_back_to_clarification() {
        let rules = RuleClassifier::new();
        let c = rules
            .classify("how's the weather?", &ClassifierContext::default())
            .await
            .unwrap();
        assert_eq!(c.intent, Intent::ClarificationNeeded);
    }
}
