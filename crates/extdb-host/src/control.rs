//! The control plane — one-shot setup operations.
//!
//! Grounded on `ext.cpp`'s `case 9` block and on the teacher's pattern of
//! gating optional subsystems behind explicit state
//! (`warpgrid-host/src/config.rs`, `engine.rs`'s `build_host_state`).
//! `ControlPlane` tracks the three-state machine from spec §4.G
//! (`OPEN` → `DB_ATTACHED` → `LOCKED`, with `LOCK` reachable from either of
//! the first two) using a single `AtomicBool` — once true, every further
//! control command is a silent no-op, the deliberate security posture spec
//! §4.G calls for.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::extension::{version_string, Core};
use crate::protocol::log::LogHandler;
use crate::protocol::raw_sql::DbRawHandler;
use crate::protocol::ProtocolHandler;

pub struct ControlPlane {
    core: Arc<Core>,
    locked: AtomicBool,
    db_attached: AtomicBool,
}

impl ControlPlane {
    pub fn new(core: Arc<Core>) -> Self {
        Self {
            core,
            locked: AtomicBool::new(false),
            db_attached: AtomicBool::new(false),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    pub fn is_db_attached(&self) -> bool {
        self.db_attached.load(Ordering::SeqCst)
    }

    /// Handles the `9:...` family. `out_size` is needed verbatim for the
    /// `OUTPUTSIZE` command. Returns the reply envelope, or `None` when the
    /// command arrived after `LOCK` — callers should treat `None` as "do
    /// not touch the output buffer", matching spec §4.G's "silently
    /// ignored" behavior.
    pub async fn dispatch(&self, out_size: usize, tokens: &[&str]) -> Option<String> {
        if self.is_locked() {
            return None;
        }

        match tokens.len() {
            2 => Some(self.dispatch_two(out_size, tokens[1])),
            3 if tokens[1].eq_ignore_ascii_case("DATABASE") => {
                Some(self.attach_database(tokens[2]).await)
            }
            4 if tokens[1].eq_ignore_ascii_case("PROTOCOL") => {
                Some(self.register_protocol(tokens[2], tokens[3], "").await)
            }
            5 if tokens[1].eq_ignore_ascii_case("PROTOCOL") => {
                Some(self.register_protocol(tokens[2], tokens[3], tokens[4]).await)
            }
            _ => Some("[0,\"Error Invalid Format\"]".to_string()),
        }
    }

    /// `VERSION` / `LOCK` / `OUTPUTSIZE` — the 2-token commands. Written as
    /// a properly braced match, unlike the brace-less original (spec §9
    /// Open Question (c)).
    fn dispatch_two(&self, out_size: usize, command: &str) -> String {
        if command.eq_ignore_ascii_case("VERSION") {
            version_string().to_string()
        } else if command.eq_ignore_ascii_case("LOCK") {
            self.locked.store(true, Ordering::SeqCst);
            info!("control plane locked");
            "[1]".to_string()
        } else if command.eq_ignore_ascii_case("OUTPUTSIZE") {
            out_size.to_string()
        } else {
            "[0,\"Error Invalid Format\"]".to_string()
        }
    }

    async fn attach_database(&self, section: &str) -> String {
        match self.core.attach_database(section).await {
            Ok(()) => {
                self.db_attached.store(true, Ordering::SeqCst);
                info!(section, "database attached");
                "[1]".to_string()
            }
            Err(e) => {
                warn!(section, error = %e, "database attach failed");
                e.to_envelope()
            }
        }
    }

    async fn register_protocol(&self, kind: &str, name: &str, init_str: &str) -> String {
        let handler: Arc<dyn ProtocolHandler> = if kind.eq_ignore_ascii_case("SQL_RAW") {
            Arc::new(DbRawHandler::new())
        } else if kind.eq_ignore_ascii_case("LOG") {
            Arc::new(LogHandler)
        } else {
            return "[0,\"Error Unknown Protocol\"]".to_string();
        };

        match self
            .core
            .registry
            .register(&self.core, name, handler, init_str)
            .await
        {
            Ok(()) => {
                info!(kind, name, "protocol registered");
                "[1]".to_string()
            }
            Err(e) => {
                warn!(kind, name, error = %e, "protocol registration failed");
                e.to_envelope()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn version_reports_the_declared_constant() {
        let core = Arc::new(Core::new_for_test().await);
        let control = ControlPlane::new(core);
        let reply = control.dispatch(80, &["9", "VERSION"]).await;
        assert_eq!(reply, Some(version_string().to_string()));
    }

    #[tokio::test]
    async fn outputsize_echoes_the_numeric_buffer_size() {
        let core = Arc::new(Core::new_for_test().await);
        let control = ControlPlane::new(core);
        let reply = control.dispatch(80, &["9", "OUTPUTSIZE"]).await;
        assert_eq!(reply, Some("80".to_string()));
    }

    #[tokio::test]
    async fn lock_is_idempotent_and_monotonic() {
        let core = Arc::new(Core::new_for_test().await);
        let control = ControlPlane::new(core);
        assert_eq!(
            control.dispatch(80, &["9", "LOCK"]).await,
            Some("[1]".to_string())
        );
        assert!(control.is_locked());

        // Every subsequent control command, however well-formed, is a no-op.
        let reply = control
            .dispatch(80, &["9", "PROTOCOL", "LOG", "another"])
            .await;
        assert_eq!(reply, None);
    }

    #[tokio::test]
    async fn registering_unknown_kind_reports_unknown_protocol() {
        let core = Arc::new(Core::new_for_test().await);
        let control = ControlPlane::new(core);
        let reply = control
            .dispatch(80, &["9", "PROTOCOL", "DB_PROCEDURE_V2", "proc"])
            .await;
        assert_eq!(reply, Some("[0,\"Error Unknown Protocol\"]".to_string()));
    }

    #[tokio::test]
    async fn registering_log_protocol_succeeds_and_is_lookup_able() {
        let core = Arc::new(Core::new_for_test().await);
        let control = ControlPlane::new(core.clone());
        let reply = control.dispatch(80, &["9", "PROTOCOL", "LOG", "mylog"]).await;
        assert_eq!(reply, Some("[1]".to_string()));
        assert!(core.registry.lookup("mylog").is_some());
    }
}
