//! Token registry boundary
//!
//! Vaults resolve token metadata (symbol, decimals) through this trait; the
//! surrounding engine owns the actual token database.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::VaultError;
use crate::network::NetworkDescriptor;
use crate::types::Token;
use crate::Result;

#[async_trait]
pub trait TokenRegistry: Send + Sync {
    /// Resolve (and remember) a token by its address on `network_id`
    async fn ensure_token_in_db(&self, network_id: &str, token_address: &str) -> Option<Token>;

    /// Native asset of `network_id`
    async fn get_native_token_info(&self, network_id: &str) -> Result<Token>;
}

/// Token registry backed by an in-memory map
#[derive(Debug, Default)]
pub struct InMemoryTokenRegistry {
    natives: RwLock<HashMap<String, Token>>,
    tokens: RwLock<HashMap<(String, String), Token>>,
}

impl InMemoryTokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry knowing the native asset of every given network
    pub fn with_networks<'a>(networks: impl IntoIterator<Item = &'a NetworkDescriptor>) -> Self {
        let registry = Self::new();
        for network in networks {
            registry.add_native(native_token(network));
        }
        registry
    }

    pub fn add_native(&self, token: Token) {
        self.natives.write().insert(token.network_id.clone(), token);
    }

    pub fn add_token(&self, token: Token) {
        let key = (token.network_id.clone(), token.token_id_on_network.clone());
        self.tokens.write().insert(key, token);
    }
}

#[async_trait]
impl TokenRegistry for InMemoryTokenRegistry {
    async fn ensure_token_in_db(&self, network_id: &str, token_address: &str) -> Option<Token> {
        if token_address.is_empty() {
            return self.natives.read().get(network_id).cloned();
        }
        self.tokens
            .read()
            .get(&(network_id.to_string(), token_address.to_string()))
            .cloned()
    }

    async fn get_native_token_info(&self, network_id: &str) -> Result<Token> {
        self.natives
            .read()
            .get(network_id)
            .cloned()
            .ok_or_else(|| VaultError::TokenNotFound(format!("native token of {}", network_id)))
    }
}

/// Native token descriptor derived from network parameters
pub fn native_token(network: &NetworkDescriptor) -> Token {
    Token {
        id: network.id.clone(),
        network_id: network.id.clone(),
        token_id_on_network: String::new(),
        name: network.name.clone(),
        symbol: network.symbol.clone(),
        decimals: network.decimals,
        is_native: true,
    }
}
