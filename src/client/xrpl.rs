//! rippled JSON-RPC client
//!
//! rippled wraps every answer in `result` and reports failures with
//! `result.status == "error"` instead of a JSON-RPC error object, so this
//! client does its own envelope handling.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::cache::TtlCache;
use crate::error::ClientError;

/// Balance and next sequence of an activated account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XrpAccountInfo {
    /// Drops
    pub balance: u64,
    pub sequence: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XrpFee {
    /// Drops
    pub open_ledger_fee: u64,
    pub ledger_current_index: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct XrpTxMeta {
    #[serde(default)]
    pub transaction_result: String,
}

/// A ledger transaction as returned by `tx` / `account_tx`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct XrpLedgerTx {
    #[serde(rename = "hash")]
    pub hash: String,
    pub transaction_type: String,
    pub account: String,
    #[serde(default)]
    pub destination: Option<String>,
    /// Drops as a string, or an issued-currency object
    #[serde(default)]
    pub amount: Option<Value>,
    pub fee: String,
    #[serde(default)]
    pub sequence: u32,
    #[serde(default)]
    pub destination_tag: Option<u32>,
    /// Seconds since the Ripple epoch
    #[serde(rename = "date", default)]
    pub date: Option<i64>,
    #[serde(rename = "meta", default)]
    pub meta: Option<XrpTxMeta>,
    #[serde(rename = "validated", default)]
    pub validated: bool,
}

impl XrpLedgerTx {
    /// Native XRP amount in drops, `None` for issued currencies
    pub fn amount_drops(&self) -> Option<u64> {
        self.amount.as_ref()?.as_str()?.parse().ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitResult {
    pub engine_result: String,
    pub engine_result_message: String,
    pub tx_hash: Option<String>,
}

impl SubmitResult {
    /// Applied (`tes*`) or queued for a later ledger
    pub fn is_accepted(&self) -> bool {
        self.engine_result.starts_with("tes") || self.engine_result == "terQUEUED"
    }
}

#[async_trait]
pub trait XrplRpc: Send + Sync {
    /// `None` for an unfunded account
    async fn account_info(&self, address: &str) -> Result<Option<XrpAccountInfo>, ClientError>;
    async fn fee(&self) -> Result<XrpFee, ClientError>;
    async fn ledger_current_index(&self) -> Result<u32, ClientError>;
    async fn validated_ledger_index(&self) -> Result<u32, ClientError>;
    async fn account_tx(&self, address: &str, limit: u32) -> Result<Vec<XrpLedgerTx>, ClientError>;
    async fn transaction(&self, hash: &str) -> Result<Option<XrpLedgerTx>, ClientError>;
    async fn submit(&self, tx_blob_hex: &str) -> Result<SubmitResult, ClientError>;
}

pub struct XrplClient {
    http: reqwest::Client,
    url: String,
    account_cache: TtlCache<String, Option<XrpAccountInfo>>,
}

impl XrplClient {
    pub fn new(http: reqwest::Client, url: impl Into<String>, ttl: Duration) -> Self {
        let url = url.into();
        log::info!("📡 XRPL client: {}", url);
        Self {
            http,
            url,
            account_cache: TtlCache::new("xrp-account", ttl),
        }
    }

    async fn request(
        http: &reqwest::Client,
        url: &str,
        method: &str,
        params: Value,
    ) -> Result<Value, ClientError> {
        log::debug!("rippled {} -> {}", method, url);
        let body = json!({ "method": method, "params": [params] });
        let response = http.post(url).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status { status, body });
        }

        let envelope: Value = response.json().await?;
        let result = envelope
            .get("result")
            .cloned()
            .ok_or_else(|| ClientError::decode(format!("{}: missing result", method)))?;

        if result["status"].as_str() == Some("error") {
            let error = result["error"].as_str().unwrap_or("unknown").to_string();
            let message = result["error_message"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| error.clone());
            return Err(ClientError::Rpc {
                code: result["error_code"].as_i64().unwrap_or(-1),
                message,
                data: Some(Value::String(error)),
            });
        }

        Ok(result)
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        Self::request(&self.http, &self.url, method, params).await
    }

    fn is_account_not_found(err: &ClientError) -> bool {
        matches!(err, ClientError::Rpc { data: Some(Value::String(e)), .. } if e == "actNotFound")
    }

    fn parse_u64(value: &Value) -> Option<u64> {
        match value {
            Value::String(s) => s.parse().ok(),
            other => other.as_u64(),
        }
    }

    fn ledger_tx(tx: &Value, meta: &Value, validated: bool) -> Result<XrpLedgerTx, ClientError> {
        let mut parsed: XrpLedgerTx =
            serde_json::from_value(tx.clone()).map_err(ClientError::decode)?;
        if !meta.is_null() {
            parsed.meta = serde_json::from_value(meta.clone()).ok();
        }
        parsed.validated = validated;
        Ok(parsed)
    }
}

#[async_trait]
impl XrplRpc for XrplClient {
    async fn account_info(&self, address: &str) -> Result<Option<XrpAccountInfo>, ClientError> {
        let http = self.http.clone();
        let url = self.url.clone();
        let params = json!({ "account": address, "ledger_index": "current" });
        self.account_cache
            .get_or_fetch(address.to_string(), move || async move {
                let result = match Self::request(&http, &url, "account_info", params).await {
                    Ok(result) => result,
                    Err(e) if Self::is_account_not_found(&e) => return Ok(None),
                    Err(e) => return Err(e),
                };
                let data = &result["account_data"];
                let balance = Self::parse_u64(&data["Balance"])
                    .ok_or_else(|| ClientError::decode("account_info: missing Balance"))?;
                let sequence = data["Sequence"]
                    .as_u64()
                    .ok_or_else(|| ClientError::decode("account_info: missing Sequence"))?;
                Ok(Some(XrpAccountInfo {
                    balance,
                    sequence: sequence as u32,
                }))
            })
            .await
    }

    async fn fee(&self) -> Result<XrpFee, ClientError> {
        let result = self.call("fee", json!({})).await?;
        let open_ledger_fee = Self::parse_u64(&result["drops"]["open_ledger_fee"])
            .ok_or_else(|| ClientError::decode("fee: missing open_ledger_fee"))?;
        let ledger_current_index = result["ledger_current_index"].as_u64().unwrap_or(0) as u32;
        Ok(XrpFee {
            open_ledger_fee,
            ledger_current_index,
        })
    }

    async fn ledger_current_index(&self) -> Result<u32, ClientError> {
        let result = self.call("ledger_current", json!({})).await?;
        result["ledger_current_index"]
            .as_u64()
            .map(|i| i as u32)
            .ok_or_else(|| ClientError::decode("ledger_current: missing index"))
    }

    async fn validated_ledger_index(&self) -> Result<u32, ClientError> {
        let result = self
            .call("ledger", json!({ "ledger_index": "validated" }))
            .await?;
        Self::parse_u64(&result["ledger_index"])
            .map(|i| i as u32)
            .ok_or_else(|| ClientError::decode("ledger: missing ledger_index"))
    }

    async fn account_tx(&self, address: &str, limit: u32) -> Result<Vec<XrpLedgerTx>, ClientError> {
        let result = self
            .call(
                "account_tx",
                json!({ "account": address, "limit": limit, "ledger_index_min": -1, "ledger_index_max": -1 }),
            )
            .await?;

        let mut txs = Vec::new();
        for entry in result["transactions"].as_array().cloned().unwrap_or_default() {
            let validated = entry["validated"].as_bool().unwrap_or(false);
            match Self::ledger_tx(&entry["tx"], &entry["meta"], validated) {
                Ok(tx) => txs.push(tx),
                Err(e) => log::warn!("⚠️  Skipping unparseable account_tx entry: {}", e),
            }
        }
        Ok(txs)
    }

    async fn transaction(&self, hash: &str) -> Result<Option<XrpLedgerTx>, ClientError> {
        let result = match self.call("tx", json!({ "transaction": hash })).await {
            Ok(result) => result,
            Err(ClientError::Rpc { data: Some(Value::String(e)), .. }) if e == "txnNotFound" => {
                return Ok(None)
            }
            Err(e) => return Err(e),
        };
        let validated = result["validated"].as_bool().unwrap_or(false);
        Self::ledger_tx(&result, &result["meta"], validated).map(Some)
    }

    async fn submit(&self, tx_blob_hex: &str) -> Result<SubmitResult, ClientError> {
        let result = self.call("submit", json!({ "tx_blob": tx_blob_hex })).await?;
        Ok(SubmitResult {
            engine_result: result["engine_result"].as_str().unwrap_or_default().to_string(),
            engine_result_message: result["engine_result_message"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            tx_hash: result["tx_json"]["hash"].as_str().map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_tx_parses_account_tx_entry() {
        let tx = json!({
            "hash": "ABCD",
            "TransactionType": "Payment",
            "Account": "rSender",
            "Destination": "rReceiver",
            "Amount": "1500000",
            "Fee": "12",
            "Sequence": 7,
            "date": 750000000
        });
        let meta = json!({ "TransactionResult": "tesSUCCESS" });

        let parsed = XrplClient::ledger_tx(&tx, &meta, true).unwrap();
        assert_eq!(parsed.amount_drops(), Some(1_500_000));
        assert_eq!(parsed.meta.unwrap().transaction_result, "tesSUCCESS");
        assert!(parsed.validated);
    }

    #[test]
    fn test_issued_currency_amount_is_not_drops() {
        let tx = json!({
            "hash": "ABCD",
            "TransactionType": "Payment",
            "Account": "rSender",
            "Amount": { "currency": "USD", "issuer": "rIssuer", "value": "1" },
            "Fee": "12"
        });
        let parsed = XrplClient::ledger_tx(&tx, &Value::Null, false).unwrap();
        assert_eq!(parsed.amount_drops(), None);
    }

    #[test]
    fn test_submit_acceptance() {
        let queued = SubmitResult {
            engine_result: "terQUEUED".to_string(),
            engine_result_message: String::new(),
            tx_hash: None,
        };
        let rejected = SubmitResult {
            engine_result: "tecUNFUNDED_PAYMENT".to_string(),
            ..queued.clone()
        };
        assert!(queued.is_accepted());
        assert!(!rejected.is_accepted());
    }
}
