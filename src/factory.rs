//! Vault construction by network id
//!
//! The factory owns one HTTP client and one chain client per RPC URL, so every
//! vault on the same endpoint shares its connection pool and TTL caches.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::chains::btc::BtcVault;
use crate::chains::sol::SolVault;
use crate::chains::xrp::XrpVault;
use crate::client::{
    http_client, EsploraApi, EsploraClient, SolanaClient, SolanaRpc, XrplClient, XrplRpc,
};
use crate::config::VaultConfig;
use crate::error::VaultError;
use crate::keyring::Keyring;
use crate::network::{ChainImpl, NetworkRegistry};
use crate::registry::TokenRegistry;
use crate::types::Account;
use crate::vault::{Vault, VaultContext, VaultSettings};
use crate::Result;

pub struct VaultFactory {
    networks: Arc<dyn NetworkRegistry>,
    tokens: Arc<dyn TokenRegistry>,
    config: Arc<VaultConfig>,
    http: reqwest::Client,
    esplora: Mutex<HashMap<String, Arc<dyn EsploraApi>>>,
    solana: Mutex<HashMap<String, Arc<dyn SolanaRpc>>>,
    xrpl: Mutex<HashMap<String, Arc<dyn XrplRpc>>>,
}

impl VaultFactory {
    pub fn new(
        networks: Arc<dyn NetworkRegistry>,
        tokens: Arc<dyn TokenRegistry>,
        config: VaultConfig,
    ) -> Result<Self> {
        let http = http_client(config.http_timeout)?;
        Ok(Self {
            networks,
            tokens,
            config: Arc::new(config),
            http,
            esplora: Mutex::new(HashMap::new()),
            solana: Mutex::new(HashMap::new()),
            xrpl: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Serve `rpc_url` with a caller-provided Esplora client
    pub fn with_esplora(self, rpc_url: &str, client: Arc<dyn EsploraApi>) -> Self {
        self.esplora.lock().insert(rpc_url.to_string(), client);
        self
    }

    pub fn with_solana(self, rpc_url: &str, client: Arc<dyn SolanaRpc>) -> Self {
        self.solana.lock().insert(rpc_url.to_string(), client);
        self
    }

    pub fn with_xrpl(self, rpc_url: &str, client: Arc<dyn XrplRpc>) -> Self {
        self.xrpl.lock().insert(rpc_url.to_string(), client);
        self
    }

    fn esplora_client(&self, rpc_url: &str) -> Arc<dyn EsploraApi> {
        self.esplora
            .lock()
            .entry(rpc_url.to_string())
            .or_insert_with(|| {
                Arc::new(EsploraClient::new(
                    self.http.clone(),
                    rpc_url,
                    self.config.cache_ttl,
                ))
            })
            .clone()
    }

    fn solana_client(&self, rpc_url: &str) -> Arc<dyn SolanaRpc> {
        self.solana
            .lock()
            .entry(rpc_url.to_string())
            .or_insert_with(|| {
                Arc::new(SolanaClient::new(
                    self.http.clone(),
                    rpc_url,
                    self.config.cache_ttl,
                    self.config.slow_cache_ttl,
                ))
            })
            .clone()
    }

    fn xrpl_client(&self, rpc_url: &str) -> Arc<dyn XrplRpc> {
        self.xrpl
            .lock()
            .entry(rpc_url.to_string())
            .or_insert_with(|| {
                Arc::new(XrplClient::new(
                    self.http.clone(),
                    rpc_url,
                    self.config.cache_ttl,
                ))
            })
            .clone()
    }

    /// Vault for `account` on `network_id`, signing through `keyring`
    pub fn create_vault(
        &self,
        network_id: &str,
        account: Account,
        keyring: Arc<Keyring>,
    ) -> Result<Vault> {
        let network = self.networks.get_network(network_id)?;
        if keyring.network().id != network.id {
            return Err(VaultError::internal(format!(
                "keyring for {} cannot serve network {}",
                keyring.network().id,
                network.id
            )));
        }

        let settings = VaultSettings::for_chain(network.impl_);
        let allowed = match keyring.as_ref() {
            Keyring::Hd(_) => true,
            Keyring::Hardware(_) => settings.hardware_account_enabled,
            Keyring::Imported(_) => settings.imported_account_enabled,
            Keyring::Watching(_) => settings.watching_account_enabled,
        };
        if !allowed {
            return Err(VaultError::not_implemented(format!(
                "{} accounts on {}",
                keyring.kind_name(),
                network.id
            )));
        }

        log::debug!(
            "Creating {} vault for account {} ({} keyring)",
            network.id,
            account.id,
            keyring.kind_name()
        );
        let rpc_url = network.rpc_url.clone();
        let chain = network.impl_;
        let ctx = VaultContext {
            network,
            account,
            keyring,
            tokens: Arc::clone(&self.tokens),
            config: Arc::clone(&self.config),
        };

        Ok(match chain {
            ChainImpl::Btc => Vault::Btc(BtcVault::new(ctx, self.esplora_client(&rpc_url))),
            ChainImpl::Sol => Vault::Sol(SolVault::new(ctx, self.solana_client(&rpc_url))),
            ChainImpl::Xrp => Vault::Xrp(XrpVault::new(ctx, self.xrpl_client(&rpc_url))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyring::WatchingKeyring;
    use crate::network::StaticNetworkRegistry;
    use crate::registry::InMemoryTokenRegistry;
    use crate::vault::ChainVault;

    fn factory() -> VaultFactory {
        let config = VaultConfig::default();
        let networks = StaticNetworkRegistry::with_presets(&config);
        let tokens = InMemoryTokenRegistry::with_networks(networks.networks());
        VaultFactory::new(Arc::new(networks), Arc::new(tokens), config).unwrap()
    }

    #[tokio::test]
    async fn test_selects_vault_by_network_id() {
        let factory = factory();
        let network = factory.networks.get_network("xrp--0").unwrap();
        let keyring = WatchingKeyring::new(network, "w", "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh");
        let account = keyring.account("XRP #1".to_string());

        let vault = factory
            .create_vault("xrp--0", account, Arc::new(Keyring::Watching(keyring)))
            .unwrap();
        assert!(matches!(vault, Vault::Xrp(_)));
        assert!(vault.validate_address("rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh").is_ok());
    }

    #[test]
    fn test_rejects_keyring_of_another_network() {
        let factory = factory();
        let network = factory.networks.get_network("xrp--0").unwrap();
        let keyring = WatchingKeyring::new(network, "w", "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh");
        let account = keyring.account("XRP #1".to_string());

        let err = factory
            .create_vault("xrp--1", account, Arc::new(Keyring::Watching(keyring)))
            .err()
            .unwrap();
        assert!(matches!(err, VaultError::Internal(_)));
    }

    #[test]
    fn test_clients_are_shared_per_endpoint() {
        let factory = factory();
        let a = factory.solana_client("https://rpc.example");
        let b = factory.solana_client("https://rpc.example");
        assert!(Arc::ptr_eq(&a, &b));
    }
}
