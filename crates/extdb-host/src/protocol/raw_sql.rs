//! `SQL_RAW` — executes its payload as a literal SQL statement.
//!
//! Grounded on `DB_RAW_V3` (`examples/original_source/src/protocols/db_raw_v3.cpp`):
//! `init` only requires that a database is attached and of a dialect this
//! handler understands, and records whether the handler was initialized
//! with `ADD_QUOTES` (case-insensitively, per the original's
//! `boost::iequals` check). `call` runs the payload verbatim against a
//! borrowed session and serializes the result set as `[[col,col,...],...]`,
//! quoting string-typed columns when `ADD_QUOTES` was set. Unlike the
//! original, a successful `call` returns this raw serialization — not a
//! pre-wrapped `[1,...]` envelope — so the dispatcher's uniform wrapping
//! (see `protocol::ProtocolHandler::call`) applies once, not twice.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use sqlx::any::AnyRow;
use sqlx::{Column, Row, TypeInfo};

use extdb_core::{DbType, ExtError, ExtResult};

use crate::extension::Core;
use crate::protocol::ProtocolHandler;

pub struct DbRawHandler {
    add_quotes: AtomicBool,
}

impl Default for DbRawHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl DbRawHandler {
    pub fn new() -> Self {
        Self {
            add_quotes: AtomicBool::new(false),
        }
    }

    fn render_value(row: &AnyRow, idx: usize) -> Option<String> {
        if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            return v;
        }
        if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            return v.map(|n| n.to_string());
        }
        if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
            return v.map(|n| n.to_string());
        }
        if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
            return v.map(|b| (b as i32).to_string());
        }
        None
    }

    fn is_text_column(row: &AnyRow, idx: usize) -> bool {
        matches!(
            row.column(idx).type_info().name(),
            "TEXT" | "VARCHAR" | "CHAR" | "VARYING CHARACTER" | "NVARCHAR" | "CLOB"
        )
    }

    fn serialize_rows(rows: &[AnyRow], quote_strings: bool) -> String {
        let mut out = String::from("[");
        for (i, row) in rows.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push('[');
            for idx in 0..row.columns().len() {
                if idx > 0 {
                    out.push(',');
                }
                let rendered = Self::render_value(row, idx).unwrap_or_default();
                if quote_strings && Self::is_text_column(row, idx) {
                    let _ = write!(out, "\"{rendered}\"");
                } else {
                    out.push_str(&rendered);
                }
            }
            out.push(']');
        }
        out.push(']');
        out
    }

    fn error_envelope(err: &sqlx::Error) -> String {
        let message = match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                "Error Connection Exception"
            }
            sqlx::Error::Database(db_err) if db_err.message().to_lowercase().contains("locked") => {
                "Error DBLocked Exception"
            }
            sqlx::Error::Database(_) => "Error Statement Exception",
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::RowNotFound => "Error Data Exception",
            _ => "Error Exception",
        };
        format!("[0,\"{message}\"]")
    }
}

#[async_trait]
impl ProtocolHandler for DbRawHandler {
    async fn init(&self, core: &Core, init_str: &str) -> ExtResult<()> {
        let pool = core.session_pool().ok_or_else(|| {
            ExtError::HandlerInitFailure("DB_RAW_V3: No Database Connection".to_string())
        })?;
        match pool.db_type() {
            DbType::Mysql | DbType::Sqlite => {}
        }
        let add_quotes = init_str.eq_ignore_ascii_case("ADD_QUOTES");
        self.add_quotes.store(add_quotes, Ordering::Relaxed);
        Ok(())
    }

    async fn call(&self, core: &Core, input: &str) -> String {
        let Some(pool) = core.session_pool() else {
            return "[0,\"Error: No Database Connection\"]".to_string();
        };
        let mut session = match pool.acquire().await {
            Ok(session) => session,
            Err(e) => return format!("[0,\"Error: {e}\"]"),
        };
        let quote_strings = self.add_quotes.load(Ordering::Relaxed);
        match sqlx::query(input).fetch_all(session.connection()).await {
            Ok(rows) => Self::serialize_rows(&rows, quote_strings),
            Err(e) => Self::error_envelope(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extdb_core::DatabaseConfig;

    use crate::session_pool::SessionPool;

    fn memory_config() -> DatabaseConfig {
        DatabaseConfig {
            db_type: "SQLite".to_string(),
            name: ":memory:".to_string(),
            username: None,
            password: None,
            ip: None,
            port: None,
            compress: false,
            min_sessions: 1,
            max_sessions: 1,
            idle_time_secs: 0,
        }
    }

    #[tokio::test]
    async fn call_executes_statement_and_serializes_rows() {
        let core = Core::new_for_test().await;
        core.attach_session_pool_for_test(
            SessionPool::attach(&memory_config(), 4).await.unwrap(),
        );

        let handler = DbRawHandler::new();
        handler.init(&core, "").await.unwrap();

        let setup = handler
            .call(&core, "CREATE TABLE players (name TEXT, score INTEGER)")
            .await;
        assert!(!setup.starts_with("[0,"), "setup failed: {setup}");

        let insert = handler
            .call(&core, "INSERT INTO players VALUES ('alice', 10)")
            .await;
        assert!(!insert.starts_with("[0,"), "insert failed: {insert}");

        let select = handler.call(&core, "SELECT name, score FROM players").await;
        assert_eq!(select, "[[alice,10]]");
    }

    #[tokio::test]
    async fn call_quotes_text_columns_when_add_quotes_set() {
        let core = Core::new_for_test().await;
        core.attach_session_pool_for_test(
            SessionPool::attach(&memory_config(), 4).await.unwrap(),
        );

        let handler = DbRawHandler::new();
        handler.init(&core, "ADD_QUOTES").await.unwrap();
        handler
            .call(&core, "CREATE TABLE players (name TEXT, score INTEGER)")
            .await;
        handler
            .call(&core, "INSERT INTO players VALUES ('bob', 7)")
            .await;

        let select = handler.call(&core, "SELECT name, score FROM players").await;
        assert_eq!(select, "[[\"bob\",7]]");
    }

    #[tokio::test]
    async fn call_without_attached_database_returns_error_envelope() {
        let core = Core::new_for_test().await;
        let handler = DbRawHandler::new();
        let result = handler.call(&core, "SELECT 1").await;
        assert_eq!(result, "[0,\"Error: No Database Connection\"]");
    }

    #[tokio::test]
    async fn call_with_invalid_sql_returns_statement_exception() {
        let core = Core::new_for_test().await;
        core.attach_session_pool_for_test(
            SessionPool::attach(&memory_config(), 4).await.unwrap(),
        );
        let handler = DbRawHandler::new();
        handler.init(&core, "").await.unwrap();

        let result = handler.call(&core, "SELECT * FROM no_such_table").await;
        assert_eq!(result, "[0,\"Error Statement Exception\"]");
    }
}
