//! Converse: a conversational front-end for a Stellar wallet backend.
//!
//! Chat platforms deliver free-text messages here; the task router
//! classifies each message into one of a fixed set of wallet intents,
//! tracks per-session state (authentication, multi-turn payment
//! confirmation), and dispatches structured calls to the wallet backend.
//!
//! The crate is organised around four seams, each a narrow trait so that
//! transports and the NLU capability stay swappable:
//!
//! - [`session::SessionStore`]: per-chat-user state
//! - [`backend::BackendActions`]: authenticated HTTP calls to the wallet
//! - [`agent::IntentClassifier`]: free text to (intent, params)
//! - [`agent::ResponseFormatter`]: action results to user-facing text

pub mod agent;
pub mod backend;
pub mod bootstrap;
pub mod channels;
pub mod config;
pub mod error;
pub mod session;

pub use agent::router::TaskRouter;
pub use error::{Error, Result};
