//! extdb-host — the request multiplexer.
//!
//! Mirrors the module layout of the teacher's `warpgrid-host`: a handful of
//! narrowly-scoped modules (id allocation, the result broker, the session
//! pool, the protocol registry, the worker pool, the dispatcher, the
//! control plane) wired together by one top-level `Extension` that owns
//! the runtime and exposes the single C ABI entry point.

pub mod control;
pub mod dispatcher;
pub mod extension;
pub mod ids;
pub mod protocol;
pub mod result_store;
pub mod session_pool;
pub mod worker_pool;

pub use dispatcher::Dispatcher;
pub use extension::{ext_callback, version_string, Core, Extension};
pub use ids::IdAllocator;
pub use protocol::{ProtocolHandler, ProtocolRegistry};
pub use result_store::ResultStore;
pub use session_pool::{Session, SessionPool};
