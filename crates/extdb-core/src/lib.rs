//! extdb-core — shared types, config parsing, and error taxonomy for extdb-host.
//!
//! Split out from `extdb-host` the way `warp-core` is split out from
//! `warpgrid-host` in the parent workspace: types that both the runtime and
//! the CLI test harness need to agree on live here, free of any tokio or
//! database-driver dependency.

pub mod config;
pub mod error;

pub use config::{DatabaseConfig, DbType, ExtConfig, LoggingConfig, MainConfig};
pub use error::{ExtError, ExtResult};
