//! Startup wiring: build the component graph from configuration.

use std::sync::Arc;

use crate::agent::classifier::{IntentClassifier, RuleClassifier};
use crate::agent::formatter::TemplateFormatter;
use crate::agent::llm::LlmClassifier;
use crate::agent::router::TaskRouter;
use crate::backend::{BackendActions, HttpActionClient};
use crate::config::{ClassifierConfig, Config};
use crate::error::Error;
use crate::session::{InMemorySessionStore, SessionStore};

/// Initialise the tracing subscriber. `RUST_LOG` controls the filter;
/// defaults to `info`.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

/// Everything the channels need to run.
pub struct Runtime {
    pub router: Arc<TaskRouter>,
    pub sessions: Arc<dyn SessionStore>,
}

/// Build the session store, action client, classifier and router.
pub fn build_runtime(config: &Config) -> Result<Runtime, Error> {
    let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
    let backend: Arc<dyn BackendActions> = Arc::new(HttpActionClient::new(&config.backend)?);

    let classifier: Arc<dyn IntentClassifier> = match &config.classifier {
        ClassifierConfig::Rules => {
            tracing::info!("no LLM endpoint configured, using the rule-based classifier");
            Arc::new(RuleClassifier::new())
        }
        llm_config @ ClassifierConfig::OpenAiCompatible { model, .. } => {
            tracing::info!(model = %model, "using LLM classifier");
            Arc::new(LlmClassifier::new(llm_config)?)
        }
    };

    let router = Arc::new(TaskRouter::new(
        Arc::clone(&sessions),
        backend,
        classifier,
        Arc::new(TemplateFormatter::new()),
        config.agent.pending_ttl,
    ));

    Ok(Runtime { router, sessions })
}
