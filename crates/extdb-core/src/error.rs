//! Error taxonomy and the wire-ABI error envelope.
//!
//! Every error that can surface back across the host boundary renders to a
//! `[0,"..."]` envelope via [`ExtError::to_envelope`]. The message text
//! matches the original extension's hardcoded strings (`"Error Invalid
//! Message"`, `"Error Unknown Protocol"`, ...) so callers relying on exact
//! string matching against the old extension keep working unmodified.

use thiserror::Error;

pub type ExtResult<T> = Result<T, ExtError>;

#[derive(Debug, Error)]
pub enum ExtError {
    /// The message didn't even contain a `<type>:` prefix.
    #[error("invalid message")]
    InvalidMessage,

    /// The message had a recognized type byte but the remaining tokens
    /// didn't parse (wrong arity, non-numeric id, ...).
    #[error("invalid format")]
    InvalidFormat,

    /// No handler registered under this protocol name.
    #[error("unknown protocol: {0}")]
    UnknownProtocol(String),

    /// A protocol handler's `init` returned an error.
    #[error("failed to load protocol: {0}")]
    HandlerInitFailure(String),

    /// A backend call failed in a way the caller can retry or route around
    /// (bad SQL, a dropped connection, ...).
    #[error("backend error: {0}")]
    Backend(String),

    /// A backend failure severe enough that the original extension called
    /// `std::exit`. This port never aborts the host process (see
    /// DESIGN.md); callers should treat this as "the pool is unusable"
    /// rather than ignore it.
    #[error("fatal backend error: {0}")]
    BackendFatal(String),

    #[error("unknown database type: {0}")]
    UnknownDatabaseType(String),

    #[error("no config option found: {0}")]
    ConfigOptionNotFound(String),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtError {
    /// Render as the `[0,"..."]` wire envelope described in the ABI spec.
    pub fn to_envelope(&self) -> String {
        match self {
            ExtError::InvalidMessage => "[0,\"Error Invalid Message\"]".to_string(),
            ExtError::InvalidFormat => "[0,\"Error Invalid Format\"]".to_string(),
            ExtError::UnknownProtocol(_) => "[0,\"Error Unknown Protocol\"]".to_string(),
            ExtError::HandlerInitFailure(_) => "[0,\"Failed to Load Protocol\"]".to_string(),
            ExtError::Backend(msg) => format!("[0,\"Error: {msg}\"]"),
            ExtError::BackendFatal(msg) => format!("[0,\"Fatal Error: {msg}\"]"),
            ExtError::UnknownDatabaseType(t) => format!("[0,\"Unknown Database Type: {t}\"]"),
            ExtError::ConfigOptionNotFound(o) => format!("[0,\"No Config Option Found: {o}\"]"),
            ExtError::Config(e) => format!("[0,\"Config Error: {e}\"]"),
            ExtError::Io(e) => format!("[0,\"IO Error: {e}\"]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_message_envelope_matches_original_wording() {
        assert_eq!(
            ExtError::InvalidMessage.to_envelope(),
            "[0,\"Error Invalid Message\"]"
        );
    }

    #[test]
    fn unknown_protocol_envelope_ignores_payload() {
        let err = ExtError::UnknownProtocol("DB_FOO_V9".to_string());
        assert_eq!(err.to_envelope(), "[0,\"Error Unknown Protocol\"]");
    }

    #[test]
    fn backend_error_carries_message_into_envelope() {
        let err = ExtError::Backend("connection refused".to_string());
        assert_eq!(err.to_envelope(), "[0,\"Error: connection refused\"]");
    }

    #[test]
    fn config_option_not_found_includes_option_name() {
        let err = ExtError::ConfigOptionNotFound("exile.Type".to_string());
        assert_eq!(err.to_envelope(), "[0,\"No Config Option Found: exile.Type\"]");
    }
}
