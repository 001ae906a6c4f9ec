use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cache::TtlCache;
use crate::error::ClientError;

/// Unspent output reported by Esplora
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub txid: String,
    pub vout: u32,
    /// Value in satoshis
    pub value: u64,
    pub status: EsploraTxStatus,
}

impl Utxo {
    pub fn is_confirmed(&self) -> bool {
        self.status.confirmed
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EsploraTxStatus {
    pub confirmed: bool,
    #[serde(default)]
    pub block_height: Option<u64>,
    /// Unix seconds
    #[serde(default)]
    pub block_time: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EsploraVout {
    #[serde(default)]
    pub scriptpubkey_address: Option<String>,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EsploraVin {
    pub txid: String,
    pub vout: u32,
    #[serde(default)]
    pub prevout: Option<EsploraVout>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EsploraTx {
    pub txid: String,
    pub vin: Vec<EsploraVin>,
    pub vout: Vec<EsploraVout>,
    pub fee: u64,
    pub status: EsploraTxStatus,
}

/// Confirmed plus mempool balance of one address, in satoshis
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddressBalance {
    pub confirmed_sats: u64,
    pub unconfirmed_sats: u64,
}

impl AddressBalance {
    pub fn total(&self) -> u64 {
        self.confirmed_sats + self.unconfirmed_sats
    }
}

#[async_trait]
pub trait EsploraApi: Send + Sync {
    async fn tip_height(&self) -> Result<u64, ClientError>;
    async fn address_utxos(&self, address: &str) -> Result<Vec<Utxo>, ClientError>;
    async fn address_balance(&self, address: &str) -> Result<AddressBalance, ClientError>;
    async fn address_txs(&self, address: &str) -> Result<Vec<EsploraTx>, ClientError>;
    async fn transaction(&self, txid: &str) -> Result<EsploraTx, ClientError>;
    /// Confirmation target (blocks) to sat/vB
    async fn fee_estimates(&self) -> Result<HashMap<String, f64>, ClientError>;
    /// Submit a raw hex transaction, returning its txid
    async fn broadcast(&self, raw_tx_hex: &str) -> Result<String, ClientError>;
    /// Drop cached UTXO and balance entries of an address after spending from it
    fn invalidate_address(&self, _address: &str) {}
}

/// Esplora REST client with cached UTXO and balance lookups
pub struct EsploraClient {
    client: reqwest::Client,
    base_url: String,
    utxo_cache: TtlCache<String, Vec<Utxo>>,
    balance_cache: TtlCache<String, AddressBalance>,
}

impl EsploraClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, ttl: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        log::info!("📡 Esplora client: {}", base_url);
        Self {
            client,
            base_url,
            utxo_cache: TtlCache::new("esplora-utxo", ttl),
            balance_cache: TtlCache::new("esplora-balance", ttl),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        client: &reqwest::Client,
        url: String,
    ) -> Result<T, ClientError> {
        let response = client.get(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status { status, body });
        }
        response.json::<T>().await.map_err(ClientError::from)
    }

    async fn fetch_balance(
        client: reqwest::Client,
        url: String,
    ) -> Result<AddressBalance, ClientError> {
        let info: serde_json::Value = Self::get_json(&client, url).await?;

        let confirmed_funded = info["chain_stats"]["funded_txo_sum"].as_u64().unwrap_or(0);
        let confirmed_spent = info["chain_stats"]["spent_txo_sum"].as_u64().unwrap_or(0);
        let unconfirmed_funded = info["mempool_stats"]["funded_txo_sum"].as_u64().unwrap_or(0);
        let unconfirmed_spent = info["mempool_stats"]["spent_txo_sum"].as_u64().unwrap_or(0);

        Ok(AddressBalance {
            confirmed_sats: confirmed_funded.saturating_sub(confirmed_spent),
            unconfirmed_sats: unconfirmed_funded.saturating_sub(unconfirmed_spent),
        })
    }

}

#[async_trait]
impl EsploraApi for EsploraClient {
    async fn tip_height(&self) -> Result<u64, ClientError> {
        let url = format!("{}/blocks/tip/height", self.base_url);

        let response = self.client.get(&url).send().await?;
        let height = response
            .text()
            .await?
            .trim()
            .parse::<u64>()
            .map_err(ClientError::decode)?;

        Ok(height)
    }

    async fn address_utxos(&self, address: &str) -> Result<Vec<Utxo>, ClientError> {
        let client = self.client.clone();
        let url = format!("{}/address/{}/utxo", self.base_url, address);
        self.utxo_cache
            .get_or_fetch(address.to_string(), move || async move {
                Self::get_json::<Vec<Utxo>>(&client, url).await
            })
            .await
    }

    async fn address_balance(&self, address: &str) -> Result<AddressBalance, ClientError> {
        let client = self.client.clone();
        let url = format!("{}/address/{}", self.base_url, address);
        self.balance_cache
            .get_or_fetch(address.to_string(), move || Self::fetch_balance(client, url))
            .await
    }

    async fn address_txs(&self, address: &str) -> Result<Vec<EsploraTx>, ClientError> {
        let url = format!("{}/address/{}/txs", self.base_url, address);
        Self::get_json(&self.client, url).await
    }

    async fn transaction(&self, txid: &str) -> Result<EsploraTx, ClientError> {
        let url = format!("{}/tx/{}", self.base_url, txid);
        Self::get_json(&self.client, url).await
    }

    async fn fee_estimates(&self) -> Result<HashMap<String, f64>, ClientError> {
        let url = format!("{}/fee-estimates", self.base_url);
        Self::get_json(&self.client, url).await
    }

    async fn broadcast(&self, raw_tx_hex: &str) -> Result<String, ClientError> {
        log::debug!("Broadcasting transaction to: {}/tx", self.base_url);

        let response = self
            .client
            .post(format!("{}/tx", self.base_url))
            .body(raw_tx_hex.to_string())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::Status { status, body });
        }

        let txid = response.text().await?;
        Ok(txid.trim().to_string())
    }

    fn invalidate_address(&self, address: &str) {
        self.utxo_cache.invalidate(&address.to_string());
        self.balance_cache.invalidate(&address.to_string());
    }
}
