//! The `LOG` protocol — a dependency-free log sink.
//!
//! The Rust analogue of the original's `protocols/log.h` (not carried by the
//! retrieval pack, but its interface is fully specified by `ext.cpp`'s
//! dispatch table: an `AbstractProtocol`-shaped sink with no DB dependency).
//! `call` emits a structured `tracing` event and returns the fixed `"[1]"`
//! acknowledgement.

use async_trait::async_trait;
use tracing::info;

use extdb_core::ExtResult;

use crate::extension::Core;
use crate::protocol::ProtocolHandler;

pub struct LogHandler;

#[async_trait]
impl ProtocolHandler for LogHandler {
    async fn init(&self, _core: &Core, _init_str: &str) -> ExtResult<()> {
        Ok(())
    }

    async fn call(&self, _core: &Core, input: &str) -> String {
        info!(message = input, "LOG protocol");
        String::new()
    }
}
