//! Solana JSON-RPC client
//!
//! Transactions travel base64-encoded on the wire. Token account lookups
//! (owner/mint of an associated token account) change rarely and are cached
//! with the slow TTL; missing accounts are never cached. Balances use the
//! volatile TTL.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::cache::TtlCache;
use crate::client::jsonrpc::JsonRpcTransport;
use crate::error::ClientError;

/// Owner and mint of an SPL token account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAccountInfo {
    pub mint: String,
    pub owner: String,
}

/// Subset of `getAccountInfo` (jsonParsed) the vault needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolAccountInfo {
    pub lamports: u64,
    /// Owning program
    pub program_owner: String,
    /// Present when the account is an SPL token account
    pub token: Option<TokenAccountInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: u64,
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub block_time: Option<i64>,
}

/// A confirmed transaction with its raw wire bytes
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmedTransaction {
    pub slot: u64,
    /// Unix seconds
    pub block_time: Option<i64>,
    /// Lamports
    pub fee: u64,
    pub err: Option<Value>,
    pub raw: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureStatus {
    #[serde(default)]
    pub confirmation_status: Option<String>,
    #[serde(default)]
    pub err: Option<Value>,
}

#[async_trait]
pub trait SolanaRpc: Send + Sync {
    /// Base58 recent blockhash
    async fn latest_blockhash(&self) -> Result<String, ClientError>;
    /// `None` when the account does not exist
    async fn account_info(&self, address: &str) -> Result<Option<SolAccountInfo>, ClientError>;
    async fn balance(&self, address: &str) -> Result<u64, ClientError>;
    /// Raw token amount held by `owner` across its accounts for `mint`
    async fn token_balance(&self, owner: &str, mint: &str) -> Result<u64, ClientError>;
    /// Total fee in lamports for a serialized message
    async fn fee_for_message(&self, message: &[u8]) -> Result<Option<u64>, ClientError>;
    async fn signatures_for_address(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, ClientError>;
    async fn transaction(&self, signature: &str)
        -> Result<Option<ConfirmedTransaction>, ClientError>;
    async fn signature_statuses(
        &self,
        signatures: &[String],
    ) -> Result<Vec<Option<SignatureStatus>>, ClientError>;
    async fn slot(&self) -> Result<u64, ClientError>;
    /// Submit a signed wire transaction, returning its signature
    async fn send_transaction(
        &self,
        raw: &[u8],
        preflight_commitment: Option<&str>,
    ) -> Result<String, ClientError>;
}

pub struct SolanaClient {
    rpc: JsonRpcTransport,
    account_cache: TtlCache<String, Option<SolAccountInfo>>,
    balance_cache: TtlCache<String, u64>,
    token_balance_cache: TtlCache<(String, String), u64>,
}

impl SolanaClient {
    pub fn new(
        http: reqwest::Client,
        rpc_url: impl Into<String>,
        ttl: Duration,
        slow_ttl: Duration,
    ) -> Self {
        let rpc = JsonRpcTransport::new(http, rpc_url);
        log::info!("📡 Solana client: {}", rpc.url());
        Self {
            rpc,
            account_cache: TtlCache::new("sol-account", slow_ttl),
            balance_cache: TtlCache::new("sol-balance", ttl),
            token_balance_cache: TtlCache::new("sol-token-balance", ttl),
        }
    }

    fn parse_account_info(value: &Value) -> Option<SolAccountInfo> {
        let account = value.get("value")?;
        if account.is_null() {
            return None;
        }
        let info = &account["data"]["parsed"]["info"];
        let token = match (info["mint"].as_str(), info["owner"].as_str()) {
            (Some(mint), Some(owner)) => Some(TokenAccountInfo {
                mint: mint.to_string(),
                owner: owner.to_string(),
            }),
            _ => None,
        };
        Some(SolAccountInfo {
            lamports: account["lamports"].as_u64().unwrap_or(0),
            program_owner: account["owner"].as_str().unwrap_or_default().to_string(),
            token,
        })
    }
}

#[async_trait]
impl SolanaRpc for SolanaClient {
    async fn latest_blockhash(&self) -> Result<String, ClientError> {
        let result = self
            .rpc
            .call_value("getLatestBlockhash", json!([{ "commitment": "finalized" }]))
            .await?;
        result["value"]["blockhash"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ClientError::decode("getLatestBlockhash: missing blockhash"))
    }

    async fn account_info(&self, address: &str) -> Result<Option<SolAccountInfo>, ClientError> {
        let rpc = self.rpc.clone();
        let params = json!([address, { "encoding": "jsonParsed" }]);
        let key = address.to_string();
        let info = self
            .account_cache
            .get_or_fetch(key.clone(), move || async move {
                let result = rpc.call_value("getAccountInfo", params).await?;
                Ok(Self::parse_account_info(&result))
            })
            .await?;
        // A missing account may be created at any moment
        if info.is_none() {
            self.account_cache.invalidate(&key);
        }
        Ok(info)
    }

    async fn balance(&self, address: &str) -> Result<u64, ClientError> {
        let rpc = self.rpc.clone();
        let params = json!([address]);
        self.balance_cache
            .get_or_fetch(address.to_string(), move || async move {
                let result = rpc.call_value("getBalance", params).await?;
                result["value"]
                    .as_u64()
                    .ok_or_else(|| ClientError::decode("getBalance: missing value"))
            })
            .await
    }

    async fn token_balance(&self, owner: &str, mint: &str) -> Result<u64, ClientError> {
        let rpc = self.rpc.clone();
        let params = json!([owner, { "mint": mint }, { "encoding": "jsonParsed" }]);
        self.token_balance_cache
            .get_or_fetch((owner.to_string(), mint.to_string()), move || async move {
                let result = rpc.call_value("getTokenAccountsByOwner", params).await?;
                let accounts = result["value"].as_array().cloned().unwrap_or_default();
                let mut total = 0u64;
                for account in accounts {
                    let amount = account["account"]["data"]["parsed"]["info"]["tokenAmount"]
                        ["amount"]
                        .as_str()
                        .and_then(|s| s.parse::<u64>().ok())
                        .unwrap_or(0);
                    total = total.saturating_add(amount);
                }
                Ok(total)
            })
            .await
    }

    async fn fee_for_message(&self, message: &[u8]) -> Result<Option<u64>, ClientError> {
        let encoded = STANDARD.encode(message);
        let result = self
            .rpc
            .call_value("getFeeForMessage", json!([encoded, { "commitment": "processed" }]))
            .await?;
        Ok(result["value"].as_u64())
    }

    async fn signatures_for_address(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, ClientError> {
        self.rpc
            .call("getSignaturesForAddress", json!([address, { "limit": limit }]))
            .await
    }

    async fn transaction(
        &self,
        signature: &str,
    ) -> Result<Option<ConfirmedTransaction>, ClientError> {
        let result = self
            .rpc
            .call_value(
                "getTransaction",
                json!([signature, { "encoding": "base64", "maxSupportedTransactionVersion": 0 }]),
            )
            .await?;
        if result.is_null() {
            return Ok(None);
        }

        let encoded = result["transaction"][0]
            .as_str()
            .ok_or_else(|| ClientError::decode("getTransaction: missing transaction data"))?;
        let raw = STANDARD.decode(encoded).map_err(ClientError::decode)?;
        let err = match &result["meta"]["err"] {
            Value::Null => None,
            other => Some(other.clone()),
        };

        Ok(Some(ConfirmedTransaction {
            slot: result["slot"].as_u64().unwrap_or(0),
            block_time: result["blockTime"].as_i64(),
            fee: result["meta"]["fee"].as_u64().unwrap_or(0),
            err,
            raw,
        }))
    }

    async fn signature_statuses(
        &self,
        signatures: &[String],
    ) -> Result<Vec<Option<SignatureStatus>>, ClientError> {
        let result = self
            .rpc
            .call_value(
                "getSignatureStatuses",
                json!([signatures, { "searchTransactionHistory": true }]),
            )
            .await?;
        serde_json::from_value(result["value"].clone()).map_err(ClientError::decode)
    }

    async fn slot(&self) -> Result<u64, ClientError> {
        self.rpc.call("getSlot", json!([])).await
    }

    async fn send_transaction(
        &self,
        raw: &[u8],
        preflight_commitment: Option<&str>,
    ) -> Result<String, ClientError> {
        let mut options = json!({ "encoding": "base64" });
        if let Some(commitment) = preflight_commitment {
            options["preflightCommitment"] = json!(commitment);
        }
        self.rpc
            .call("sendTransaction", json!([STANDARD.encode(raw), options]))
            .await
    }
}
