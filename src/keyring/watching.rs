use std::collections::BTreeMap;

use crate::network::{ChainImpl, NetworkDescriptor};
use crate::types::{Account, AccountKind};

/// Address-only keyring; it can observe but never sign
pub struct WatchingKeyring {
    network: NetworkDescriptor,
    wallet_id: String,
    address: String,
}

impl WatchingKeyring {
    pub fn new(
        network: NetworkDescriptor,
        wallet_id: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            network,
            wallet_id: wallet_id.into(),
            address: address.into(),
        }
    }

    pub fn network(&self) -> &NetworkDescriptor {
        &self.network
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub(crate) fn account(&self, name: String) -> Account {
        let (kind, addresses) = match self.network.impl_ {
            ChainImpl::Btc => {
                let mut addresses = BTreeMap::new();
                addresses.insert("0/0".to_string(), self.address.clone());
                (AccountKind::Utxo, addresses)
            }
            _ => (AccountKind::Simple, BTreeMap::new()),
        };
        log::debug!("Watching {} address {}", self.network.id, self.address);

        Account {
            id: format!("{}--{}", self.wallet_id, self.address),
            name,
            kind,
            path: String::new(),
            coin_type: self.network.coin_type(),
            public_key: String::new(),
            address: self.address.clone(),
            xpub: None,
            addresses,
        }
    }
}
