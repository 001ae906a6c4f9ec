//! Network descriptors and the network registry
//!
//! Network ids follow `"<impl>--<chainId>"` (e.g. `btc--0`, `sol--101`).
//! The `impl` prefix selects the vault variant.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::VaultConfig;
use crate::error::VaultError;
use crate::Result;

/// Closed set of chain families with a vault implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainImpl {
    Btc,
    Sol,
    Xrp,
}

impl ChainImpl {
    /// Resolve the chain family from a `"<impl>--<chainId>"` network id
    pub fn from_network_id(network_id: &str) -> Result<Self> {
        let prefix = network_id.split("--").next().unwrap_or_default();
        prefix.parse()
    }
}

impl FromStr for ChainImpl {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "btc" | "tbtc" => Ok(Self::Btc),
            "sol" => Ok(Self::Sol),
            "xrp" => Ok(Self::Xrp),
            other => Err(VaultError::NotImplemented(format!(
                "no vault for chain impl '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ChainImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Btc => "btc",
            Self::Sol => "sol",
            Self::Xrp => "xrp",
        };
        f.write_str(name)
    }
}

/// Immutable per-chain parameters, shared read-only by every vault
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDescriptor {
    pub id: String,
    #[serde(rename = "impl")]
    pub impl_: ChainImpl,
    pub name: String,
    #[serde(rename = "rpcURL")]
    pub rpc_url: String,
    pub symbol: String,
    pub decimals: u32,
    pub fee_symbol: String,
    pub fee_decimals: u32,
    pub is_testnet: bool,
}

impl NetworkDescriptor {
    /// Bitcoin network parameters (address HRP, WIF/xprv prefixes)
    ///
    /// Test networks use Signet, mirroring the default Esplora endpoint.
    pub fn bitcoin_network(&self) -> bitcoin::Network {
        if self.is_testnet {
            bitcoin::Network::Signet
        } else {
            bitcoin::Network::Bitcoin
        }
    }

    /// BIP44 coin type for derivation paths
    pub fn coin_type(&self) -> u32 {
        match self.impl_ {
            ChainImpl::Btc if self.is_testnet => 1,
            ChainImpl::Btc => 0,
            ChainImpl::Sol => 501,
            ChainImpl::Xrp => 144,
        }
    }
}

/// Lookup of network descriptors by id
pub trait NetworkRegistry: Send + Sync {
    fn get_network(&self, network_id: &str) -> Result<NetworkDescriptor>;
}

/// In-process registry seeded with the built-in presets
#[derive(Debug, Clone, Default)]
pub struct StaticNetworkRegistry {
    networks: HashMap<String, NetworkDescriptor>,
}

impl StaticNetworkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry containing every preset, with RPC overrides from `config` applied
    pub fn with_presets(config: &VaultConfig) -> Self {
        let mut registry = Self::new();
        for mut network in presets() {
            let override_url = match network.impl_ {
                ChainImpl::Btc => config.btc_esplora_url.as_ref(),
                ChainImpl::Sol => config.sol_rpc_url.as_ref(),
                ChainImpl::Xrp => config.xrp_rpc_url.as_ref(),
            };
            if let Some(url) = override_url {
                log::debug!("Overriding RPC for {}: {}", network.id, url);
                network.rpc_url = url.clone();
            }
            registry.networks.insert(network.id.clone(), network);
        }
        registry
    }

    /// Register a descriptor; ids must stay unique
    pub fn insert(&mut self, network: NetworkDescriptor) -> Result<()> {
        if self.networks.contains_key(&network.id) {
            return Err(VaultError::internal(format!(
                "network {} already registered",
                network.id
            )));
        }
        self.networks.insert(network.id.clone(), network);
        Ok(())
    }

    pub fn networks(&self) -> impl Iterator<Item = &NetworkDescriptor> {
        self.networks.values()
    }
}

impl NetworkRegistry for StaticNetworkRegistry {
    fn get_network(&self, network_id: &str) -> Result<NetworkDescriptor> {
        self.networks
            .get(network_id)
            .cloned()
            .ok_or_else(|| VaultError::internal(format!("network {} not found", network_id)))
    }
}

fn preset(
    id: &str,
    impl_: ChainImpl,
    name: &str,
    rpc_url: &str,
    symbol: &str,
    decimals: u32,
    is_testnet: bool,
) -> NetworkDescriptor {
    NetworkDescriptor {
        id: id.to_string(),
        impl_,
        name: name.to_string(),
        rpc_url: rpc_url.to_string(),
        symbol: symbol.to_string(),
        decimals,
        fee_symbol: symbol.to_string(),
        fee_decimals: decimals,
        is_testnet,
    }
}

/// Built-in network presets
pub fn presets() -> Vec<NetworkDescriptor> {
    vec![
        preset("btc--0", ChainImpl::Btc, "Bitcoin", "https://mempool.space/api", "BTC", 8, false),
        preset(
            "tbtc--0",
            ChainImpl::Btc,
            "Bitcoin Signet",
            "https://mempool.space/signet/api",
            "TBTC",
            8,
            true,
        ),
        preset(
            "sol--101",
            ChainImpl::Sol,
            "Solana",
            "https://api.mainnet-beta.solana.com",
            "SOL",
            9,
            false,
        ),
        preset(
            "sol--103",
            ChainImpl::Sol,
            "Solana Devnet",
            "https://api.devnet.solana.com",
            "SOL",
            9,
            true,
        ),
        preset("xrp--0", ChainImpl::Xrp, "Ripple", "https://xrplcluster.com", "XRP", 6, false),
        preset(
            "xrp--1",
            ChainImpl::Xrp,
            "Ripple Testnet",
            "https://s.altnet.rippletest.net:51234",
            "XRP",
            6,
            true,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_impl_from_network_id() {
        assert_eq!(ChainImpl::from_network_id("btc--0").unwrap(), ChainImpl::Btc);
        assert_eq!(ChainImpl::from_network_id("tbtc--0").unwrap(), ChainImpl::Btc);
        assert_eq!(ChainImpl::from_network_id("sol--101").unwrap(), ChainImpl::Sol);
        assert_eq!(ChainImpl::from_network_id("xrp--0").unwrap(), ChainImpl::Xrp);
        assert!(matches!(
            ChainImpl::from_network_id("evm--1"),
            Err(VaultError::NotImplemented(_))
        ));
    }

    #[test]
    fn test_presets_have_unique_ids() {
        let registry = StaticNetworkRegistry::with_presets(&VaultConfig::default());
        assert_eq!(registry.networks().count(), presets().len());
    }

    #[test]
    fn test_insert_rejects_duplicate_id() {
        let mut registry = StaticNetworkRegistry::with_presets(&VaultConfig::default());
        let dup = registry.get_network("sol--101").unwrap();
        assert!(registry.insert(dup).is_err());
    }

    #[test]
    fn test_rpc_override_applies_to_chain_family() {
        let config = VaultConfig {
            sol_rpc_url: Some("http://localhost:8899".to_string()),
            ..Default::default()
        };
        let registry = StaticNetworkRegistry::with_presets(&config);
        assert_eq!(registry.get_network("sol--103").unwrap().rpc_url, "http://localhost:8899");
        assert_eq!(registry.get_network("btc--0").unwrap().rpc_url, "https://mempool.space/api");
    }
}
