//! The request dispatcher — the text ABI's single entry point.
//!
//! Restructured from `Ext::callExtenion` in `ext.cpp` as a pure async
//! function, `Dispatcher::dispatch(out_size, input) -> String`, with no
//! raw buffer/pointer plumbing; the host-FFI boundary that marshals this
//! `String` into the caller's fixed `char*` buffer is the separate, thin
//! adapter in `extension.rs` (§4.H). Keeping this function free of
//! `unsafe` and of the C ABI's pointer lifetime concerns is what makes the
//! chunking arithmetic and kind table testable directly.

use std::sync::Arc;

use extdb_core::ExtError;
use tracing::warn;

use crate::control::ControlPlane;
use crate::extension::Core;
use crate::worker_pool::{Job, ReplyTarget, WorkerPool};

pub struct Dispatcher {
    core: Arc<Core>,
    control: ControlPlane,
    jobs: tokio::sync::mpsc::UnboundedSender<Job>,
}

impl Dispatcher {
    pub fn new(core: Arc<Core>, worker_pool: &WorkerPool) -> Self {
        let control = ControlPlane::new(core.clone());
        Self {
            core,
            control,
            jobs: worker_pool.sender(),
        }
    }

    pub fn control_plane(&self) -> &ControlPlane {
        &self.control
    }

    pub fn core(&self) -> &Arc<Core> {
        &self.core
    }

    /// Single entry per host call. See spec §4.F for the exact kind table
    /// and chunking arithmetic this mirrors byte-for-byte.
    pub async fn dispatch(&self, out_size: usize, input: &str) -> String {
        if input.len() <= 2 {
            warn!(%input, "invalid message: too short");
            return ExtError::InvalidMessage.to_envelope();
        }

        let kind = match input.as_bytes()[0] {
            b @ b'0'..=b'9' => (b - b'0') as u8,
            _ => return ExtError::InvalidMessage.to_envelope(),
        };

        match kind {
            0 => self.dispatch_sync(out_size, input).await,
            1 => self.dispatch_fire_and_forget(input).await,
            2 => self.dispatch_async_with_result(input).await,
            5 => self.dispatch_poll(out_size, input),
            9 => self.dispatch_control(out_size, input).await,
            _ => ExtError::InvalidMessage.to_envelope(),
        }
    }

    /// Splits `input[2..]` on the first `:` into `(protocol, payload)`, the
    /// shape shared by SYNC and both ASYNC variants.
    fn split_protocol_and_payload(input: &str) -> Option<(&str, &str)> {
        let rest = &input[2..];
        let colon = rest.find(':')?;
        Some((&rest[..colon], &rest[colon + 1..]))
    }

    async fn dispatch_sync(&self, out_size: usize, input: &str) -> String {
        let Some((protocol, payload)) = Self::split_protocol_and_payload(input) else {
            return ExtError::InvalidFormat.to_envelope();
        };

        let Some(handler) = self.core.registry.lookup(protocol) else {
            return ExtError::UnknownProtocol(protocol.to_string()).to_envelope();
        };

        let raw = handler.call(&self.core, payload).await;

        let room = out_size.saturating_sub(9);
        if raw.len() <= room {
            // Inline replies carry the `"[1, " + result + "]"` space
            // `ext.cpp:608` (`syncCallProtocol`) puts after the comma; the
            // buffered path below normalizes that away (see
            // `wrap_handler_output`), matching `saveResult_mutexlock`'s
            // `"[1," + result + "]"`.
            wrap_inline_handler_output(&raw)
        } else {
            let envelope = wrap_handler_output(&raw);
            let id = self.core.ids.allocate();
            self.core.results.deliver_raw(id, envelope);
            format!("[2,\"{id}\"]")
        }
    }

    async fn dispatch_fire_and_forget(&self, input: &str) -> String {
        let Some((protocol, payload)) = Self::split_protocol_and_payload(input) else {
            return ExtError::InvalidFormat.to_envelope();
        };

        if let Some(handler) = self.core.registry.lookup(protocol) {
            let job = Job {
                core: self.core.clone(),
                handler,
                payload: payload.to_string(),
                reply: ReplyTarget::None,
            };
            if self.jobs.send(job).is_err() {
                warn!("worker pool queue closed, dropping fire-and-forget job");
            }
        }
        "[1]".to_string()
    }

    async fn dispatch_async_with_result(&self, input: &str) -> String {
        let Some((protocol, payload)) = Self::split_protocol_and_payload(input) else {
            return ExtError::InvalidFormat.to_envelope();
        };

        let id = self.core.ids.allocate();
        // Reservation and the protocol-existence check share one lock
        // (ResultStore::reserve_if) so an id is never exposed to the host
        // for a protocol that doesn't exist.
        let reserved = self
            .core
            .results
            .reserve_if(id, || self.core.registry.contains(protocol));
        if !reserved {
            self.core.ids.free(id);
            return ExtError::UnknownProtocol(protocol.to_string()).to_envelope();
        }

        let handler = self
            .core
            .registry
            .lookup(protocol)
            .expect("existence was just confirmed under the same lock");
        let job = Job {
            core: self.core.clone(),
            handler,
            payload: payload.to_string(),
            reply: ReplyTarget::WithResult(id),
        };
        if self.jobs.send(job).is_err() {
            warn!("worker pool queue closed, dropping async job");
        }
        format!("[2,\"{id}\"]")
    }

    fn dispatch_poll(&self, out_size: usize, input: &str) -> String {
        let Ok(id) = input[2..].parse::<u64>() else {
            return ExtError::InvalidFormat.to_envelope();
        };
        self.core.results.poll(id, out_size)
    }

    async fn dispatch_control(&self, out_size: usize, input: &str) -> String {
        let tokens: Vec<&str> = input.split(':').collect();
        match self.control.dispatch(out_size, &tokens).await {
            Some(reply) => reply,
            // Locked: spec §4.G calls for a silent no-op, no distinguishing
            // output.
            None => String::new(),
        }
    }
}

/// Applies the dispatcher's uniform success wrapping for the buffered path
/// (SYNC overflow, and `ResultStore::deliver`'s async delivery). A handler's
/// raw output is either an already-built error envelope (`"[0,...]"`,
/// untouched) or successful raw payload data (wrapped as `"[1]"` when
/// empty, `"[1,<payload>]"` otherwise) — no space after the comma, matching
/// `saveResult_mutexlock`'s `"[1," + result + "]"`.
fn wrap_handler_output(raw: &str) -> String {
    if raw.starts_with("[0,") {
        raw.to_string()
    } else if raw.is_empty() {
        "[1]".to_string()
    } else {
        format!("[1,{raw}]")
    }
}

/// Same wrapping as [`wrap_handler_output`], but for the inline-SYNC reply,
/// which carries a space after the comma (`"[1, " + result + "]"`,
/// `ext.cpp:608`).
fn wrap_inline_handler_output(raw: &str) -> String {
    if raw.starts_with("[0,") {
        raw.to_string()
    } else if raw.is_empty() {
        "[1]".to_string()
    } else {
        format!("[1, {raw}]")
    }
}
