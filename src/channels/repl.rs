//! Interactive local REPL channel.
//!
//! Drives the task router from a terminal against a fixed session id,
//! handy for exercising the conversation flow without a chat platform.
//!
//! ## Commands
//!
//! - `/help` - Show available commands
//! - `/debug` - Toggle printing the full TaskResponse
//! - `/session` - Show the current session state
//! - `/quit` or `/exit` - Exit the REPL

use std::sync::Arc;

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::agent::router::TaskRouter;
use crate::error::ChannelError;
use crate::session::SessionStore;

const HELP: &str = "Commands: /help, /debug, /session, /quit. Anything else is sent to the \
     assistant. Try 'login with you@example.com'.";

pub async fn run(
    router: Arc<TaskRouter>,
    sessions: Arc<dyn SessionStore>,
    session_id: &str,
) -> Result<(), ChannelError> {
    let mut editor = DefaultEditor::new().map_err(|e| ChannelError::StartupFailed {
        name: "repl".to_string(),
        reason: e.to_string(),
    })?;
    let mut debug = false;

    println!("Converse REPL (session '{session_id}'). {HELP}");

    loop {
        match editor.readline("converse> ") {
            Ok(line) => {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(&line);

                match line.as_str() {
                    "/quit" | "/exit" => break,
                    "/help" => {
                        println!("{HELP}");
                    }
                    "/debug" => {
                        debug = !debug;
                        println!("debug {}", if debug { "on" } else { "off" });
                    }
                    "/session" => {
                        let session = sessions.get(session_id).await;
                        println!(
                            "authenticated: {}, email: {}, pending: {}",
                            session.authenticated,
                            session.email.as_deref().unwrap_or("-"),
                            if session.pending.is_some() {
                                "awaiting secret key"
                            } else {
                                "none"
                            }
                        );
                    }
                    _ => {
                        let reply = router.handle(session_id, &line).await;
                        println!("{}", reply.message);
                        if debug {
                            match serde_json::to_string_pretty(&reply) {
                                Ok(raw) => println!("{raw}"),
                                Err(e) => println!("(unprintable reply: {e})"),
                            }
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                return Err(ChannelError::SendFailed {
                    name: "repl".to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    println!("bye");
    Ok(())
}
