//! Transport adapters: thin layers that move messages between a chat
//! surface and the task router. All conversation logic stays in
//! [`crate::agent::router`].

pub mod repl;
pub mod telegram;
pub mod web;
