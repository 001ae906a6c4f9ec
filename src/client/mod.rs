//! Chain clients
//!
//! Thin RPC/HTTP adapters, one per chain family. Each real client owns its
//! `reqwest::Client` (connection reuse) and its TTL caches, and sits behind an
//! async trait so vaults can run against test doubles. Clients never retry;
//! retry policy belongs to the vault.

pub mod esplora;
pub mod jsonrpc;
pub mod solana;
pub mod xrpl;

use std::time::Duration;

use crate::error::ClientError;

pub use esplora::{EsploraApi, EsploraClient};
pub use jsonrpc::JsonRpcTransport;
pub use solana::{SolanaClient, SolanaRpc};
pub use xrpl::{XrplClient, XrplRpc};

/// Build the shared HTTP client with the configured request timeout
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, ClientError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(ClientError::from)
}
