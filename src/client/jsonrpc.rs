//! JSON-RPC 2.0 transport over HTTP
//!
//! Error responses keep the server's structured `code` so callers can tell
//! retryable upstream conditions from terminal ones.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ClientError;

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

/// Cheap-to-clone JSON-RPC caller bound to one endpoint
#[derive(Clone, Debug)]
pub struct JsonRpcTransport {
    http: reqwest::Client,
    url: String,
    next_id: Arc<AtomicU64>,
}

impl JsonRpcTransport {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Call `method` and return the raw `result` value
    pub async fn call_value(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        log::debug!("JSON-RPC {} #{} -> {}", method, id, self.url);

        let response = self.http.post(&self.url).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        // Some nodes answer JSON-RPC errors with a non-2xx status; prefer the body.
        let parsed: RpcResponse = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(e) if status.is_success() => return Err(ClientError::decode(e)),
            Err(_) => {
                return Err(ClientError::Status {
                    status: status.as_u16(),
                    body: text,
                })
            }
        };

        if let Some(error) = parsed.error {
            log::debug!("JSON-RPC {} failed: {} {}", method, error.code, error.message);
            return Err(ClientError::Rpc {
                code: error.code,
                message: error.message,
                data: error.data,
            });
        }

        Ok(parsed.result.unwrap_or(Value::Null))
    }

    /// Call `method` and deserialize its `result`
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, ClientError> {
        let value = self.call_value(method, params).await?;
        serde_json::from_value(value).map_err(ClientError::decode)
    }
}
