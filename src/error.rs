//! Error types for vault operations
//!
//! `VaultError` is the typed taxonomy callers render; `ClientError` is the
//! transport-level failure produced by the chain clients. Client errors are
//! `Clone` so a single in-flight request can hand the same failure to every
//! waiter of the TTL cache.

use thiserror::Error;

/// Core error type for vault, keyring and reconciler operations
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Token not found: {0}")]
    TokenNotFound(String),

    /// Capability intentionally unsupported for this chain or keyring variant
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Contract violation or unexpected missing data
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Hardware device error {code}: {message}")]
    HardwareDevice { code: i32, message: String },

    #[error("Broadcast retry times exceeded after {attempts} attempts: {last_message}")]
    RetryExhausted { attempts: u32, last_message: String },

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),
}

impl VaultError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::NotImplemented(msg.into())
    }

    pub fn encoding(msg: impl std::fmt::Display) -> Self {
        Self::Encoding(msg.to_string())
    }
}

/// Failure reported by a chain client (HTTP, JSON-RPC or payload decoding)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Structured JSON-RPC error, code preserved for retry classification
    #[error("RPC error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    #[error("Decode error: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn rpc_code(&self) -> Option<i64> {
        match self {
            Self::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn decode(msg: impl std::fmt::Display) -> Self {
        Self::Decode(msg.to_string())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_converts_into_vault_error() {
        let err: VaultError = ClientError::Rpc {
            code: -32005,
            message: "Node is behind by 42 slots".to_string(),
            data: None,
        }
        .into();

        match err {
            VaultError::Client(inner) => assert_eq!(inner.rpc_code(), Some(-32005)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_retry_exhausted_message_carries_last_upstream_message() {
        let err = VaultError::RetryExhausted {
            attempts: 8,
            last_message: "Blockhash not found".to_string(),
        };
        assert!(err.to_string().contains("Blockhash not found"));
    }
}
