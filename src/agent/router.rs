//! The conversation controller: the single authority deciding, for each
//! incoming (session, text) pair, what happens next.
//!
//! Per turn, in order: pending-operation interception, the direct login
//! short-circuit, classification, the authorization gate, parameter
//! completeness, contact resolution, the secret-key gate, dispatch.
//! Every failure mode ends here as a user-facing reply; transports never
//! see an error.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::backend::{
    ActionResult, BackendActions, PathPaymentRequest, PaymentRequest, contacts_from_body,
};
use crate::session::{PendingAction, PendingOperation, Session, SessionStore};

use super::classifier::{ClassifierContext, IntentClassifier};
use super::formatter::{FormatContext, ResponseFormatter};
use super::intent::{
    EMAIL_RE, Intent, ParamError, TaskParams, TaskResponse, extract_params, is_address,
};

const LOGIN_REQUIRED: &str = "You need to log in first. Send your email to authenticate, \
     e.g. 'login with you@example.com'.";
const LOGIN_NEEDS_EMAIL: &str =
    "Please provide a valid email to log in, e.g. 'login with you@example.com'.";
const SECRET_PROMPT: &str = "Please provide your secret key to authorize the payment.";
const PENDING_CANCELLED: &str = "Okay, I've cancelled the pending payment.";
const PENDING_EXPIRED: &str = "The pending payment expired before the secret key arrived. \
     Please request the payment again.";
const CLASSIFIER_FALLBACK: &str = "Sorry, I couldn't understand that. You can ask for your \
     balance, manage contacts, or send a payment, e.g. 'send 100 XLM to Maria'.";

const LOGIN_KEYWORDS: &[&str] = &["login", "log in", "sign in", "signin", "logar"];
const CANCEL_KEYWORDS: &[&str] = &["cancel", "cancelar"];

fn is_email(value: &str) -> bool {
    EMAIL_RE
        .find(value)
        .is_some_and(|m| m.start() == 0 && m.end() == value.len())
}

fn is_login_text(text: &str) -> bool {
    let lower = text.to_lowercase();
    LOGIN_KEYWORDS.iter().any(|k| lower.contains(k)) || is_email(text)
}

/// Session-scoped conversational task router.
pub struct TaskRouter {
    sessions: Arc<dyn SessionStore>,
    backend: Arc<dyn BackendActions>,
    classifier: Arc<dyn IntentClassifier>,
    formatter: Arc<dyn ResponseFormatter>,
    pending_ttl: Duration,
}

impl TaskRouter {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        backend: Arc<dyn BackendActions>,
        classifier: Arc<dyn IntentClassifier>,
        formatter: Arc<dyn ResponseFormatter>,
        pending_ttl: Duration,
    ) -> Self {
        Self {
            sessions,
            backend,
            classifier,
            formatter,
            pending_ttl,
        }
    }

    /// Handle one user turn. Never fails: every error becomes a reply.
    pub async fn handle(&self, session_id: &str, raw_text: &str) -> TaskResponse {
        let text = raw_text.trim();
        let mut session = self.sessions.get(session_id).await;
        let reply = self.handle_inner(session_id, &mut session, text).await;
        self.sessions.put(session_id, session).await;
        reply
    }

    async fn handle_inner(
        &self,
        session_id: &str,
        session: &mut Session,
        text: &str,
    ) -> TaskResponse {
        // A set pending operation intercepts the turn before anything
        // else: the text is the awaited secret, not a new request.
        if let Some(pending) = session.pending.take() {
            return self.resolve_pending(session_id, session, pending, text).await;
        }

        // Authentication is the most failure-sensitive path, so login is
        // recognised directly instead of trusting the classifier.
        if is_login_text(text) {
            let email = EMAIL_RE.find(text).map(|m| m.as_str().to_string());
            return self.handle_login(session_id, session, email.as_deref()).await;
        }

        let ctx = ClassifierContext {
            authenticated: session.authenticated,
            contact_names: session
                .contacts
                .as_deref()
                .map(|contacts| contacts.iter().map(|c| c.name.clone()).collect())
                .unwrap_or_default(),
        };
        let classification = match self.classifier.classify(text, &ctx).await {
            Ok(classification) => classification,
            Err(e) => {
                warn!(session_id, error = %e, "classification failed, asking for clarification");
                return TaskResponse::clarification(CLASSIFIER_FALLBACK);
            }
        };
        let intent = classification.intent;
        info!(session_id, intent = %intent, "classified message");

        // Authorization gate: protected intents never reach the backend
        // without a session token.
        if !intent.is_public() && !session.authenticated {
            return TaskResponse::clarification_with(
                LOGIN_REQUIRED,
                json!({ "requires_login": true }),
            );
        }

        if intent == Intent::ClarificationNeeded {
            let message = classification
                .message
                .unwrap_or_else(|| CLASSIFIER_FALLBACK.to_string());
            return TaskResponse::clarification_with(message, classification.params);
        }

        if intent == Intent::Login {
            let email = classification
                .params
                .get("email")
                .and_then(|v| v.as_str())
                .filter(|candidate| is_email(candidate))
                .map(String::from)
                .or_else(|| EMAIL_RE.find(text).map(|m| m.as_str().to_string()));
            return self.handle_login(session_id, session, email.as_deref()).await;
        }

        // Slot-filling completeness check; values are never guessed.
        let params = match extract_params(intent, &classification.params) {
            Ok(params) => params,
            Err(e) => return clarification_for_param_error(e),
        };

        self.dispatch(session_id, session, params).await
    }

    async fn dispatch(
        &self,
        session_id: &str,
        session: &mut Session,
        params: TaskParams,
    ) -> TaskResponse {
        if let TaskParams::OnboardUser {
            email,
            phone_number,
            public_key,
        } = &params
        {
            let result = self
                .backend
                .onboard_user(email, phone_number.as_deref(), public_key.as_deref())
                .await;
            return self.respond(params, result).await;
        }

        // All remaining intents are protected; the gate upstream
        // guarantees a token, but a session with the flag set and no
        // token is treated as logged out rather than panicking.
        let Some(token) = session.session_token.clone() else {
            session.clear_auth();
            return TaskResponse::clarification_with(
                LOGIN_REQUIRED,
                json!({ "requires_login": true }),
            );
        };

        match params {
            TaskParams::AddContact {
                contact_name,
                public_key,
            } => {
                let result = self
                    .backend
                    .add_contact(&token, &contact_name, &public_key)
                    .await;
                // The cached list no longer reflects the address book.
                if result.success {
                    session.contacts = None;
                }
                self.respond(
                    TaskParams::AddContact {
                        contact_name,
                        public_key,
                    },
                    result,
                )
                .await
            }
            TaskParams::ListContacts => {
                let result = self.backend.list_contacts(&token).await;
                if result.success {
                    session.contacts = Some(contacts_from_body(&result.data));
                }
                self.respond(TaskParams::ListContacts, result).await
            }
            TaskParams::LookupContact { contact_name } => {
                let result = self.backend.lookup_contact(&token, &contact_name).await;
                self.respond(TaskParams::LookupContact { contact_name }, result)
                    .await
            }
            TaskParams::GetAccountBalance => {
                let result = self.backend.account_balance(&token).await;
                self.respond(TaskParams::GetAccountBalance, result).await
            }
            TaskParams::GetOperationsHistory => {
                let result = self.backend.operations_history(&token).await;
                self.respond(TaskParams::GetOperationsHistory, result).await
            }
            TaskParams::InitiatePixDeposit { amount, asset_code } => {
                let result = self
                    .backend
                    .initiate_pix_deposit(&token, &amount, &asset_code)
                    .await;
                self.respond(TaskParams::InitiatePixDeposit { amount, asset_code }, result)
                    .await
            }
            TaskParams::ExecutePayment {
                destination,
                amount,
                asset_code,
                memo,
            } => {
                let destination = match self
                    .resolve_destination(session, &token, &destination)
                    .await
                {
                    Ok(destination) => destination,
                    Err(reply) => return reply,
                };
                info!(session_id, "payment awaiting secret key");
                session.pending = Some(PendingOperation::new(PendingAction::Payment {
                    destination,
                    amount,
                    asset_code,
                    memo,
                }));
                TaskResponse::clarification_with(
                    SECRET_PROMPT,
                    json!({ "requires_secret_key": true }),
                )
            }
            TaskParams::ExecutePathPayment {
                destination,
                dest_asset,
                dest_amount,
                source_asset,
            } => {
                let destination = match self
                    .resolve_destination(session, &token, &destination)
                    .await
                {
                    Ok(destination) => destination,
                    Err(reply) => return reply,
                };
                info!(session_id, "path payment awaiting secret key");
                session.pending = Some(PendingOperation::new(PendingAction::PathPayment {
                    destination,
                    dest_asset,
                    dest_amount,
                    source_asset,
                }));
                TaskResponse::clarification_with(
                    SECRET_PROMPT,
                    json!({ "requires_secret_key": true }),
                )
            }
            TaskParams::Login { .. } | TaskParams::OnboardUser { .. } | TaskParams::Clarification { .. } => {
                // Routed before dispatch; reaching here is a logic bug,
                // answered safely instead of panicking.
                TaskResponse::clarification(CLASSIFIER_FALLBACK)
            }
        }
    }

    /// Consume the turn as the secret for the pending operation.
    ///
    /// The operation is cleared whatever happens: executed (successfully
    /// or not), cancelled, or expired.
    async fn resolve_pending(
        &self,
        session_id: &str,
        session: &mut Session,
        pending: PendingOperation,
        text: &str,
    ) -> TaskResponse {
        let lower = text.to_lowercase();
        if CANCEL_KEYWORDS.iter().any(|k| *k == lower) {
            info!(session_id, "pending operation cancelled by user");
            return TaskResponse::clarification_with(
                PENDING_CANCELLED,
                json!({ "cancelled": true }),
            );
        }
        if pending.expired(self.pending_ttl) {
            info!(session_id, "pending operation expired");
            return TaskResponse::clarification_with(PENDING_EXPIRED, json!({ "expired": true }));
        }
        let Some(token) = session.session_token.clone() else {
            session.clear_auth();
            return TaskResponse::clarification_with(
                LOGIN_REQUIRED,
                json!({ "requires_login": true }),
            );
        };

        info!(session_id, intent = %pending.action.intent(), "executing pending operation");
        let secret_key = SecretString::from(text.to_string());
        let (params, result) = match pending.action {
            PendingAction::Payment {
                destination,
                amount,
                asset_code,
                memo,
            } => {
                let request = PaymentRequest {
                    destination: destination.clone(),
                    amount: amount.clone(),
                    asset_code: asset_code.clone(),
                    memo: memo.clone(),
                    secret_key,
                };
                let result = self.backend.execute_payment(&token, &request).await;
                (
                    TaskParams::ExecutePayment {
                        destination,
                        amount,
                        asset_code,
                        memo,
                    },
                    result,
                )
            }
            PendingAction::PathPayment {
                destination,
                dest_asset,
                dest_amount,
                source_asset,
            } => {
                let request = PathPaymentRequest {
                    destination: destination.clone(),
                    dest_asset: dest_asset.clone(),
                    dest_amount: dest_amount.clone(),
                    source_asset: source_asset.clone(),
                    secret_key,
                };
                let result = self.backend.execute_path_payment(&token, &request).await;
                (
                    TaskParams::ExecutePathPayment {
                        destination,
                        dest_asset,
                        dest_amount,
                        source_asset,
                    },
                    result,
                )
            }
        };
        self.respond(params, result).await
    }

    /// Direct login path: bypasses classification entirely.
    async fn handle_login(
        &self,
        session_id: &str,
        session: &mut Session,
        email: Option<&str>,
    ) -> TaskResponse {
        let Some(email) = email else {
            return TaskResponse::clarification(LOGIN_NEEDS_EMAIL);
        };

        let mut result = self.backend.login(email).await;
        if result.success && result.str_field("sessionToken").is_none() {
            result = ActionResult {
                success: false,
                data: result.data,
                message: Some("login response was missing a session token".to_string()),
            };
        }

        if result.success {
            let token = SecretString::from(
                result
                    .str_field("sessionToken")
                    .expect("checked above")
                    .to_string(),
            );
            let user_id = result.str_field("userId").map(String::from);
            session.establish(token.clone(), user_id, email.to_string());
            info!(session_id, "session authenticated");

            // Warm the contact cache so first-payment resolution needs no
            // extra round trip. Best effort only.
            let contacts = self.backend.list_contacts(&token).await;
            if contacts.success {
                session.contacts = Some(contacts_from_body(&contacts.data));
            }
        } else {
            info!(session_id, "login failed");
        }

        self.respond(
            TaskParams::Login {
                email: email.to_string(),
            },
            result,
        )
        .await
    }

    /// Turn a human destination into an address via the contact list.
    /// Addresses pass through untouched; unknown names are surfaced,
    /// never guessed.
    async fn resolve_destination(
        &self,
        session: &mut Session,
        token: &SecretString,
        destination: &str,
    ) -> Result<String, TaskResponse> {
        let destination = destination.trim();
        if is_address(destination) {
            return Ok(destination.to_string());
        }

        if session.contacts.is_none() {
            let result = self.backend.list_contacts(token).await;
            if result.success {
                session.contacts = Some(contacts_from_body(&result.data));
            } else {
                let cause = result
                    .message
                    .unwrap_or_else(|| "the contact list is unavailable".to_string());
                return Err(TaskResponse::clarification_with(
                    format!("I couldn't look up \"{destination}\" in your contacts: {cause}"),
                    json!({ "unresolved_contact": destination }),
                ));
            }
        }

        let contacts = session.contacts.as_deref().unwrap_or_default();
        match contacts
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(destination))
        {
            Some(contact) => Ok(contact.public_key.clone()),
            None => Err(TaskResponse::clarification_with(
                format!(
                    "I couldn't find \"{destination}\" in your contacts. Add them first, \
                     e.g. 'add contact {destination} with key GXXXX…'."
                ),
                json!({ "unresolved_contact": destination }),
            )),
        }
    }

    async fn respond(&self, params: TaskParams, result: ActionResult) -> TaskResponse {
        let intent = params.intent();
        let message = self
            .formatter
            .format(
                intent,
                &FormatContext {
                    params: &params,
                    result: &result,
                },
            )
            .await;
        TaskResponse::new(message, intent, packaged(&params, &result))
    }
}

/// Echo the resolved parameters plus the backend call outcome.
fn packaged(params: &TaskParams, result: &ActionResult) -> Value {
    let mut value = params.to_value();
    if let Value::Object(map) = &mut value {
        map.insert("success".to_string(), json!(result.success));
        map.insert("tool_result".to_string(), result.data.clone());
    }
    value
}

fn clarification_for_param_error(err: ParamError) -> TaskResponse {
    match err {
        ParamError::Missing { intent, fields } => TaskResponse::clarification_with(
            format!(
                "I'm missing {} for that. Try: '{}'.",
                fields.join(" and "),
                intent.example_usage()
            ),
            json!({ "missing_params": fields }),
        ),
        ParamError::Invalid {
            intent,
            field,
            reason,
        } => TaskResponse::clarification_with(
            format!("That {field} doesn't look right: {reason}. Try: '{}'.", intent.example_usage()),
            json!({ "invalid_param": field }),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::classifier::{Classification, RuleClassifier};
    use crate::agent::formatter::TemplateFormatter;
    use crate::backend::Contact;
    use crate::error::ClassifierError;
    use crate::session::InMemorySessionStore;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;
    use serde_json::json;
    use tokio::sync::Mutex;

    const MARIA_KEY: &str = "GAW7MQA7YLQLJZF7GD6M7JZWQCB4EGPPC46YSZAXQ7Z5LKLKNYFFOIGU";
    const SECRET: &str = "SDIUUO4N7SSV5NJRL2DAZ2JCLOJ6Y2B3UQKWLARVADJLQU5R5KSBKSLR";

    /// Records every backend call; responses are canned per operation.
    #[derive(Default)]
    struct FakeBackend {
        calls: Mutex<Vec<String>>,
        fail_login: bool,
        fail_payment: bool,
        fail_list_contacts: bool,
        contacts: Vec<Contact>,
    }

    impl FakeBackend {
        fn with_contacts(contacts: Vec<Contact>) -> Self {
            Self {
                contacts,
                ..Self::default()
            }
        }

        async fn record(&self, call: impl Into<String>) {
            self.calls.lock().await.push(call.into());
        }

        async fn calls(&self) -> Vec<String> {
            self.calls.lock().await.clone()
        }

        async fn count(&self, prefix: &str) -> usize {
            self.calls
                .lock()
                .await
                .iter()
                .filter(|c| c.starts_with(prefix))
                .count()
        }
    }

    #[async_trait]
    impl BackendActions for FakeBackend {
        async fn login(&self, email: &str) -> ActionResult {
            self.record(format!("login:{email}")).await;
            if self.fail_login {
                ActionResult::from_body(json!({"success": false, "message": "User not found"}))
            } else {
                ActionResult::from_body(json!({
                    "success": true,
                    "sessionToken": "tok-123",
                    "userId": "user-1"
                }))
            }
        }

        async fn onboard_user(
            &self,
            email: &str,
            _phone_number: Option<&str>,
            _public_key: Option<&str>,
        ) -> ActionResult {
            self.record(format!("onboard_user:{email}")).await;
            ActionResult::from_body(json!({
                "success": true,
                "publicKey": "GNEWACCOUNT",
                "secretKey": "SNEWACCOUNT"
            }))
        }

        async fn add_contact(
            &self,
            _token: &SecretString,
            contact_name: &str,
            public_key: &str,
        ) -> ActionResult {
            self.record(format!("add_contact:{contact_name}:{public_key}"))
                .await;
            ActionResult::from_body(json!({"success": true}))
        }

        async fn list_contacts(&self, _token: &SecretString) -> ActionResult {
            self.record("list_contacts").await;
            if self.fail_list_contacts {
                return ActionResult::failure("contacts unavailable");
            }
            ActionResult::from_body(json!({
                "success": true,
                "contacts": self.contacts,
            }))
        }

        async fn lookup_contact(&self, _token: &SecretString, contact_name: &str) -> ActionResult {
            self.record(format!("lookup_contact:{contact_name}")).await;
            ActionResult::from_body(json!({"success": true, "contact": null}))
        }

        async fn account_balance(&self, _token: &SecretString) -> ActionResult {
            self.record("account_balance").await;
            ActionResult::from_body(json!({
                "success": true,
                "balances": [{"balance": "120.5", "asset_code": "XLM"}]
            }))
        }

        async fn operations_history(&self, _token: &SecretString) -> ActionResult {
            self.record("operations_history").await;
            ActionResult::from_body(json!({"success": true, "history": []}))
        }

        async fn execute_payment(
            &self,
            _token: &SecretString,
            request: &PaymentRequest,
        ) -> ActionResult {
            self.record(format!(
                "execute_payment:{}:{}:{}:{}",
                request.destination,
                request.amount,
                request.asset_code,
                request.secret_key.expose_secret()
            ))
            .await;
            if self.fail_payment {
                ActionResult::from_body(json!({"success": false, "message": "tx_failed"}))
            } else {
                ActionResult::from_body(json!({"success": true, "hash": "deadbeef"}))
            }
        }

        async fn execute_path_payment(
            &self,
            _token: &SecretString,
            request: &PathPaymentRequest,
        ) -> ActionResult {
            self.record(format!("execute_path_payment:{}", request.destination))
                .await;
            ActionResult::from_body(json!({"success": true}))
        }

        async fn initiate_pix_deposit(
            &self,
            _token: &SecretString,
            amount: &str,
            asset_code: &str,
        ) -> ActionResult {
            self.record(format!("initiate_pix_deposit:{amount}:{asset_code}"))
                .await;
            ActionResult::from_body(json!({"success": true}))
        }
    }

    /// Classifier returning a fixed script of outcomes.
    struct ScriptedClassifier {
        script: Mutex<Vec<Result<Classification, ClassifierError>>>,
    }

    impl ScriptedClassifier {
        fn new(script: Vec<Result<Classification, ClassifierError>>) -> Self {
            Self {
                script: Mutex::new(script),
            }
        }
    }

    #[async_trait]
    impl IntentClassifier for ScriptedClassifier {
        async fn classify(
            &self,
            _text: &str,
            _ctx: &ClassifierContext,
        ) -> Result<Classification, ClassifierError> {
            self.script
                .lock()
                .await
                .pop()
                .expect("scripted classifier exhausted")
        }
    }

    struct Harness {
        router: TaskRouter,
        backend: Arc<FakeBackend>,
        sessions: Arc<InMemorySessionStore>,
    }

    fn harness(backend: FakeBackend) -> Harness {
        harness_with(backend, Duration::from_secs(300))
    }

    fn harness_with(backend: FakeBackend, pending_ttl: Duration) -> Harness {
        let backend = Arc::new(backend);
        let sessions = Arc::new(InMemorySessionStore::new());
        let router = TaskRouter::new(
            Arc::clone(&sessions) as Arc<dyn SessionStore>,
            Arc::clone(&backend) as Arc<dyn BackendActions>,
            Arc::new(RuleClassifier::new()),
            Arc::new(TemplateFormatter::new()),
            pending_ttl,
        );
        Harness {
            router,
            backend,
            sessions,
        }
    }

    fn maria() -> Vec<Contact> {
        vec![Contact {
            name: "Maria".to_string(),
            public_key: MARIA_KEY.to_string(),
        }]
    }

    async fn login(h: &Harness, session_id: &str) {
        let reply = h.router.handle(session_id, "login with a@b.com").await;
        assert_eq!(reply.task, Intent::Login);
        assert_eq!(reply.params["success"], json!(true));
    }

    #[tokio::test]
    async fn protected_intent_without_auth_never_touches_backend() {
        let h = harness(FakeBackend::default());

        let reply = h.router.handle("s1", "what's my balance?").await;

        assert_eq!(reply.task, Intent::ClarificationNeeded);
        assert_eq!(reply.params["requires_login"], json!(true));
        assert!(h.backend.calls().await.is_empty());
    }

    #[tokio::test]
    async fn login_with_email_authenticates_and_stores_token() {
        let h = harness(FakeBackend::with_contacts(maria()));

        let reply = h.router.handle("s1", "login with a@b.com").await;

        assert_eq!(reply.task, Intent::Login);
        assert!(reply.message.contains("a@b.com"));
        assert_eq!(reply.params["success"], json!(true));

        let session = h.sessions.get("s1").await;
        assert!(session.authenticated);
        assert_eq!(
            session.session_token.unwrap().expose_secret(),
            "tok-123"
        );
        assert_eq!(session.user_id.as_deref(), Some("user-1"));
        // Contact cache warmed as a login side-effect.
        assert_eq!(session.contacts.unwrap(), maria());
    }

    #[tokio::test]
    async fn login_without_email_asks_for_one() {
        let h = harness(FakeBackend::default());

        let reply = h.router.handle("s1", "I want to login").await;

        assert_eq!(reply.task, Intent::ClarificationNeeded);
        assert!(reply.message.contains("valid email"));
        assert!(!h.sessions.get("s1").await.authenticated);
        assert!(h.backend.calls().await.is_empty());
    }

    #[tokio::test]
    async fn bare_email_message_is_a_login() {
        let h = harness(FakeBackend::default());

        let reply = h.router.handle("s1", "a@b.com").await;

        assert_eq!(reply.task, Intent::Login);
        assert_eq!(h.backend.count("login:a@b.com").await, 1);
    }

    #[tokio::test]
    async fn failed_login_leaves_session_unauthenticated() {
        let h = harness(FakeBackend {
            fail_login: true,
            ..FakeBackend::default()
        });

        let reply = h.router.handle("s1", "login with a@b.com").await;

        assert_eq!(reply.task, Intent::Login);
        assert_eq!(reply.params["success"], json!(false));
        assert!(reply.message.contains("User not found"));
        assert!(!h.sessions.get("s1").await.authenticated);
    }

    #[tokio::test]
    async fn balance_queries_are_idempotent_and_stateless() {
        let h = harness(FakeBackend::default());
        login(&h, "s1").await;

        let first = h.router.handle("s1", "what's my balance?").await;
        let second = h.router.handle("s1", "what's my balance?").await;

        assert_eq!(first.task, Intent::GetAccountBalance);
        assert_eq!(second.task, Intent::GetAccountBalance);
        assert!(!first.message.is_empty());
        assert_eq!(h.backend.count("account_balance").await, 2);
        assert!(h.sessions.get("s1").await.pending.is_none());
    }

    #[tokio::test]
    async fn payment_round_trip_collects_secret_then_executes_once() {
        let h = harness(FakeBackend::with_contacts(maria()));
        login(&h, "s1").await;

        let ask = h.router.handle("s1", "send 100 XLM to Maria").await;
        assert_eq!(ask.task, Intent::ClarificationNeeded);
        assert_eq!(ask.params["requires_secret_key"], json!(true));
        assert!(h.sessions.get("s1").await.pending.is_some());
        assert_eq!(h.backend.count("execute_payment").await, 0);

        // Next turn is consumed verbatim as the secret.
        let done = h.router.handle("s1", SECRET).await;
        assert_eq!(done.task, Intent::ExecutePayment);
        assert_eq!(done.params["success"], json!(true));
        assert_eq!(done.params["destination"], json!(MARIA_KEY));
        assert_eq!(h.backend.count("execute_payment").await, 1);
        assert_eq!(
            h.backend.calls().await.last().unwrap(),
            &format!("execute_payment:{MARIA_KEY}:100:XLM:{SECRET}")
        );
        assert!(h.sessions.get("s1").await.pending.is_none());
    }

    #[tokio::test]
    async fn pending_clears_even_when_backend_fails() {
        let h = harness(FakeBackend {
            fail_payment: true,
            ..FakeBackend::with_contacts(maria())
        });
        login(&h, "s1").await;

        h.router.handle("s1", "send 100 XLM to Maria").await;
        let done = h.router.handle("s1", SECRET).await;

        assert_eq!(done.task, Intent::ExecutePayment);
        assert_eq!(done.params["success"], json!(false));
        assert!(done.message.contains("tx_failed"));
        assert_eq!(h.backend.count("execute_payment").await, 1);
        assert!(h.sessions.get("s1").await.pending.is_none());
    }

    #[tokio::test]
    async fn unknown_contact_is_surfaced_not_guessed() {
        let h = harness(FakeBackend::with_contacts(maria()));
        login(&h, "s1").await;

        let reply = h.router.handle("s1", "send 100 XLM to Zara").await;

        assert_eq!(reply.task, Intent::ClarificationNeeded);
        assert!(reply.message.contains("Zara"));
        assert_eq!(reply.params["unresolved_contact"], json!("Zara"));
        assert_eq!(h.backend.count("execute_payment").await, 0);
        assert!(h.sessions.get("s1").await.pending.is_none());
    }

    #[tokio::test]
    async fn contact_cache_from_login_avoids_a_second_list_call() {
        let h = harness(FakeBackend::with_contacts(maria()));
        login(&h, "s1").await;
        assert_eq!(h.backend.count("list_contacts").await, 1);

        h.router.handle("s1", "send 100 XLM to Maria").await;

        // Resolution used the cache; no extra list-contacts call.
        assert_eq!(h.backend.count("list_contacts").await, 1);
    }

    #[tokio::test]
    async fn cancel_keyword_cancels_the_pending_payment() {
        let h = harness(FakeBackend::with_contacts(maria()));
        login(&h, "s1").await;
        h.router.handle("s1", "send 100 XLM to Maria").await;

        let reply = h.router.handle("s1", "cancel").await;

        assert_eq!(reply.task, Intent::ClarificationNeeded);
        assert_eq!(reply.params["cancelled"], json!(true));
        assert_eq!(h.backend.count("execute_payment").await, 0);
        assert!(h.sessions.get("s1").await.pending.is_none());
    }

    #[tokio::test]
    async fn expired_pending_operation_is_discarded() {
        let h = harness_with(FakeBackend::with_contacts(maria()), Duration::ZERO);
        login(&h, "s1").await;
        h.router.handle("s1", "send 100 XLM to Maria").await;

        let reply = h.router.handle("s1", SECRET).await;

        assert_eq!(reply.task, Intent::ClarificationNeeded);
        assert_eq!(reply.params["expired"], json!(true));
        assert_eq!(h.backend.count("execute_payment").await, 0);
        assert!(h.sessions.get("s1").await.pending.is_none());
    }

    #[tokio::test]
    async fn paying_an_address_directly_skips_contact_resolution() {
        let h = harness(FakeBackend::default());
        login(&h, "s1").await;

        let ask = h
            .router
            .handle("s1", &format!("send 25 USDC to {MARIA_KEY}"))
            .await;
        assert_eq!(ask.params["requires_secret_key"], json!(true));

        let done = h.router.handle("s1", SECRET).await;
        assert_eq!(done.params["destination"], json!(MARIA_KEY));
        assert_eq!(
            h.backend.calls().await.last().unwrap(),
            &format!("execute_payment:{MARIA_KEY}:25:USDC:{SECRET}")
        );
    }

    #[tokio::test]
    async fn classifier_failure_becomes_a_clarification_reply() {
        let backend = Arc::new(FakeBackend::default());
        let sessions = Arc::new(InMemorySessionStore::new());
        let classifier = ScriptedClassifier::new(vec![Err(ClassifierError::InvalidOutput {
            reason: "not json".to_string(),
        })]);
        let router = TaskRouter::new(
            Arc::clone(&sessions) as Arc<dyn SessionStore>,
            Arc::clone(&backend) as Arc<dyn BackendActions>,
            Arc::new(classifier),
            Arc::new(TemplateFormatter::new()),
            Duration::from_secs(300),
        );

        let reply = router.handle("s1", "do something odd").await;

        assert_eq!(reply.task, Intent::ClarificationNeeded);
        assert!(!reply.message.is_empty());
        assert!(backend.calls().await.is_empty());
    }

    #[tokio::test]
    async fn missing_payment_params_name_the_example_usage() {
        let backend = Arc::new(FakeBackend::default());
        let sessions = Arc::new(InMemorySessionStore::new());
        let classifier = ScriptedClassifier::new(vec![Ok(Classification {
            intent: Intent::ExecutePayment,
            params: json!({ "amount": "10" }),
            message: None,
        })]);
        let router = TaskRouter::new(
            Arc::clone(&sessions) as Arc<dyn SessionStore>,
            Arc::clone(&backend) as Arc<dyn BackendActions>,
            Arc::new(classifier),
            Arc::new(TemplateFormatter::new()),
            Duration::from_secs(300),
        );
        // Authenticate first so the completeness check is what trips.
        router.handle("s1", "login with a@b.com").await;

        let reply = router.handle("s1", "send some money").await;

        assert_eq!(reply.task, Intent::ClarificationNeeded);
        assert!(reply.message.contains(Intent::ExecutePayment.example_usage()));
        assert_eq!(reply.params["missing_params"], json!(["destination"]));
        assert_eq!(backend.count("execute_payment").await, 0);
    }

    #[tokio::test]
    async fn onboarding_is_public_and_dispatches() {
        let h = harness(FakeBackend::default());

        let reply = h
            .router
            .handle("s1", "create account with new@user.com")
            .await;

        assert_eq!(reply.task, Intent::OnboardUser);
        assert_eq!(reply.params["success"], json!(true));
        assert!(reply.message.contains("GNEWACCOUNT"));
        assert_eq!(h.backend.count("onboard_user:new@user.com").await, 1);
    }

    #[tokio::test]
    async fn add_contact_invalidates_the_cache() {
        let h = harness(FakeBackend::with_contacts(maria()));
        login(&h, "s1").await;
        assert!(h.sessions.get("s1").await.contacts.is_some());

        let reply = h
            .router
            .handle("s1", &format!("add contact Bob with key {MARIA_KEY}"))
            .await;

        assert_eq!(reply.task, Intent::AddContact);
        assert!(h.sessions.get("s1").await.contacts.is_none());
    }

    #[tokio::test]
    async fn contact_lookup_failure_blocks_the_payment() {
        let h = harness(FakeBackend {
            fail_list_contacts: true,
            ..FakeBackend::default()
        });
        // Login succeeds but the cache warm-up fails, leaving no cache.
        login(&h, "s1").await;
        assert!(h.sessions.get("s1").await.contacts.is_none());

        let reply = h.router.handle("s1", "send 100 XLM to Maria").await;

        assert_eq!(reply.task, Intent::ClarificationNeeded);
        assert_eq!(reply.params["unresolved_contact"], json!("Maria"));
        assert_eq!(h.backend.count("execute_payment").await, 0);
    }
}
