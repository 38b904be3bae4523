//! `extdb-conf.toml` configuration parsing.
//!
//! The original extension read an `.ini` file; this port reads the
//! equivalent structure from TOML, the format the rest of the parent
//! workspace standardizes on (`warp_core::config::WarpConfig`). A config
//! document has one `[main]` table, one optional `[logging]` table, and any
//! number of additional tables — each additional table is a named database
//! section, looked up by name via the `9:DATABASE:<name>` control command
//! (see `extdb_host::control`).

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtConfig {
    #[serde(default)]
    pub main: MainConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Every other top-level table, keyed by name — one of these is chosen
    /// per-attach by the `DATABASE` control command's `<conf_section>` token.
    #[serde(flatten)]
    pub sections: HashMap<String, DatabaseConfig>,
}

impl ExtConfig {
    pub fn from_file(path: &Path) -> Result<Self, crate::ExtError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> Result<Self, crate::ExtError> {
        Ok(toml::from_str(content)?)
    }

    /// Look up a named database section, the way `Ext::connectDatabase`
    /// looks up `pConf->hasOption(conf_option + ".Type")`.
    pub fn database_section(&self, name: &str) -> Option<&DatabaseConfig> {
        self.sections.get(name)
    }
}

/// `[main]` — process-wide settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MainConfig {
    /// Worker thread count. `0` means "use available parallelism", mirroring
    /// the original's `boost::thread::hardware_concurrency()` fallback.
    pub threads: usize,
    /// Opaque API key surfaced to handlers that need one (e.g. a Steam Web
    /// API key in the original). Not interpreted by the core itself.
    pub api_key: Option<String>,
}

impl Default for MainConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            api_key: None,
        }
    }
}

/// `[logging]` — log filtering.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// A `tracing_subscriber::EnvFilter`-compatible directive, e.g. `"info"`.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// Backend wire dialect for a database section.
///
/// The original distinguished `MySQL`, `ODBC`, and `SQLite`; this port keeps
/// `Mysql` and `Sqlite` as concrete dialects (both covered by the `sqlx`
/// driver stack pulled in by `extdb-host`) and folds the `ODBC` case into
/// `Sqlite`/`Mysql` selection being the pool's concern — any other SQL
/// dialect name is rejected with `UnknownDatabaseType` rather than silently
/// guessing a driver, since no ODBC crate is part of this workspace's stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    Mysql,
    Sqlite,
}

impl std::str::FromStr for DbType {
    type Err = crate::ExtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("mysql") {
            Ok(DbType::Mysql)
        } else if s.eq_ignore_ascii_case("sqlite") {
            Ok(DbType::Sqlite)
        } else {
            Err(crate::ExtError::UnknownDatabaseType(s.to_string()))
        }
    }
}

impl std::fmt::Display for DbType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbType::Mysql => write!(f, "MySQL"),
            DbType::Sqlite => write!(f, "SQLite"),
        }
    }
}

/// A single named database section, e.g. `[exile]` in the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Raw dialect string as written in the config; validated lazily via
    /// `DbType::from_str` at attach time so an unknown-but-unused section
    /// doesn't fail config parsing for the whole process.
    #[serde(rename = "type")]
    pub db_type: String,
    pub name: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ip: Option<String>,
    pub port: Option<u16>,
    #[serde(default)]
    pub compress: bool,
    /// Pre-opened session count. Clamped to at least 1 at attach time.
    #[serde(default = "default_min_sessions", rename = "minSessions")]
    pub min_sessions: u32,
    /// Session cap. `0` means "use the worker thread count" — the original's
    /// `db_conn_info.max_sessions = max_threads` fallback. Read from its own
    /// `maxSessions` key, not copy-pasted from `minSessions` (see
    /// DESIGN.md, Open Question (a)).
    #[serde(default, rename = "maxSessions")]
    pub max_sessions: u32,
    #[serde(default, rename = "idleTime")]
    pub idle_time_secs: u64,
}

fn default_min_sessions() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_document() {
        let toml_str = r#"
[main]
threads = 4

[logging]
filter = "debug"

[exile]
type = "MySQL"
name = "exile_db"
username = "root"
password = "secret"
ip = "127.0.0.1"
port = 3306
minSessions = 2
maxSessions = 10
idleTime = 60
"#;
        let config = ExtConfig::from_str(toml_str).unwrap();
        assert_eq!(config.main.threads, 4);
        assert_eq!(config.logging.filter, "debug");

        let db = config.database_section("exile").unwrap();
        assert_eq!(db.db_type, "MySQL");
        assert_eq!(db.name, "exile_db");
        assert_eq!(db.min_sessions, 2);
        assert_eq!(db.max_sessions, 10);
    }

    #[test]
    fn missing_section_returns_none() {
        let config = ExtConfig::from_str("[main]\nthreads = 1\n").unwrap();
        assert!(config.database_section("nope").is_none());
    }

    #[test]
    fn defaults_apply_when_main_and_logging_absent() {
        let config = ExtConfig::from_str("").unwrap();
        assert_eq!(config.main.threads, 0);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn db_type_parses_case_insensitively() {
        assert_eq!("mysql".parse::<DbType>().unwrap(), DbType::Mysql);
        assert_eq!("MySQL".parse::<DbType>().unwrap(), DbType::Mysql);
        assert_eq!("SQLITE".parse::<DbType>().unwrap(), DbType::Sqlite);
        assert!("odbc".parse::<DbType>().is_err());
    }

    #[test]
    fn min_sessions_defaults_to_one() {
        let toml_str = r#"
[exile]
type = "SQLite"
name = "local.db"
"#;
        let config = ExtConfig::from_str(toml_str).unwrap();
        let db = config.database_section("exile").unwrap();
        assert_eq!(db.min_sessions, 1);
        assert_eq!(db.max_sessions, 0);
    }
}
