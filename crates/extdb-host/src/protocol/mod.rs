//! The pluggable protocol handler registry.
//!
//! Grounded on the teacher's `ConnectionFactory`/`ConnectionBackend`
//! trait-object split (`warpgrid-host/src/db_proxy.rs`) and on
//! `Ext::addProtocol` in the original `ext.cpp`: a handler is constructed by
//! kind, its `init` is given a chance to fail and roll the registration
//! back, and the registry hands out shared, reference-counted handles that
//! outlive any single dispatch.

pub mod log;
pub mod raw_sql;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use extdb_core::ExtResult;

use crate::extension::Core;

/// The unit of work the dispatcher invokes. Implementors must be safe to
/// call concurrently from many worker tasks against the same instance —
/// handlers own whatever per-call state they need (typically nothing;
/// sessions are borrowed fresh from `Core::sessions` on each call).
#[async_trait]
pub trait ProtocolHandler: Send + Sync {
    /// One-time setup, given the init string from the `PROTOCOL` control
    /// command (or the empty string for the 4-token form). Returning `Err`
    /// rolls the registration back — the name is never bound to a broken
    /// handler.
    async fn init(&self, core: &Core, init_str: &str) -> ExtResult<()>;

    /// Executes the handler's work and returns its *raw* result string —
    /// not yet wrapped in the `[1,...]` envelope; the dispatcher applies
    /// that wrapping uniformly for every handler, exactly like
    /// `Ext::syncCallProtocol`/`asyncCallProtocol` do in the original.
    /// Handlers that fail MUST catch their own errors and return an
    /// already-enveloped `[0,"..."]` string rather than propagating — the
    /// dispatcher does not second-guess a handler's output.
    async fn call(&self, core: &Core, input: &str) -> String;
}

/// Named mapping from handler name to handler instance.
#[derive(Default)]
pub struct ProtocolRegistry {
    handlers: Mutex<HashMap<String, Arc<dyn ProtocolHandler>>>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `name` is already bound to a handler. Used by the dispatcher
    /// for the protocol-existence check that must happen under the same
    /// lock as the result store's wait-set reservation — see
    /// `ResultStore::reserve_if`.
    pub fn contains(&self, name: &str) -> bool {
        let handlers = self.handlers.lock().expect("protocol registry poisoned");
        handlers.contains_key(name)
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn ProtocolHandler>> {
        let handlers = self.handlers.lock().expect("protocol registry poisoned");
        handlers.get(name).cloned()
    }

    /// Binds `name` to a constructed `handler` after running its `init`.
    /// Re-registering an existing name is rejected outright — the core's
    /// default per spec §9 Open Question (b) — without touching the
    /// existing entry.
    pub async fn register(
        &self,
        core: &Core,
        name: &str,
        handler: Arc<dyn ProtocolHandler>,
        init_str: &str,
    ) -> ExtResult<()> {
        if self.contains(name) {
            return Err(extdb_core::ExtError::HandlerInitFailure(format!(
                "protocol '{name}' already registered"
            )));
        }
        handler.init(core, init_str).await?;
        let mut handlers = self.handlers.lock().expect("protocol registry poisoned");
        handlers
            .entry(name.to_string())
            .or_insert_with(|| handler.clone());
        Ok(())
    }

    pub fn clear(&self) {
        let mut handlers = self.handlers.lock().expect("protocol registry poisoned");
        handlers.clear();
    }
}
