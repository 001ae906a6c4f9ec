//! Chain Vault: multi-chain wallet core
//!
//! One uniform contract, [`ChainVault`], covers everything a wallet does with
//! a chain: validating addresses, building and decoding transactions, quoting
//! fees, signing through a [`Keyring`], broadcasting with retries and
//! reconciling on-chain history with locally stored entries.
//!
//! # Architecture
//!
//! - **Network registry**: static descriptors (id, RPC URL, decimals) per network
//! - **Chain clients**: Esplora, Solana JSON-RPC and rippled JSON-RPC, each
//!   fronted by a TTL single-flight cache
//! - **Keyrings**: HD, hardware, imported and watch-only signers
//! - **Vaults**: Bitcoin, Solana and XRP Ledger implementations of [`ChainVault`]
//! - **Swap**: quote service client that composes deposits through a vault
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use chain_vault::{ChainVault, Keyring, VaultConfig, VaultFactory};
//!
//! let config = VaultConfig::from_env();
//! let networks = StaticNetworkRegistry::with_presets(&config);
//! let tokens = InMemoryTokenRegistry::with_networks(networks.networks());
//! let factory = VaultFactory::new(Arc::new(networks), Arc::new(tokens), config)?;
//!
//! let vault = factory.create_vault("sol--101", account, Arc::new(keyring))?;
//! let encoded = vault.build_encoded_tx_from_transfer(&transfer).await?;
//! let unsigned = vault.build_unsigned_tx_from_encoded_tx(&encoded).await?;
//! let signed = vault.sign_and_broadcast(&unsigned, &SignOptions::default()).await?;
//! ```

// Public modules
pub mod amount;
pub mod cache;
pub mod chains;
pub mod client;
pub mod config;
pub mod error;
pub mod factory;
pub mod keyring;
pub mod network;
pub mod registry;
pub mod swap;
pub mod types;
pub mod vault;

// Re-exports for convenience
pub use cache::{CacheStats, TtlCache};
pub use config::VaultConfig;
pub use error::{ClientError, VaultError};
pub use factory::VaultFactory;
pub use keyring::{
    GetAddressParams, HardwareKeyring, HdKeyring, ImportedKeyring, Keyring, PrepareAccountsParams,
    SignOptions, WatchingKeyring,
};
pub use network::{ChainImpl, NetworkDescriptor, NetworkRegistry, StaticNetworkRegistry};
pub use registry::{InMemoryTokenRegistry, TokenRegistry};
pub use swap::{Quote, QuoteParams, SwapBuild, SwapQuoter, SwapTransaction};
pub use types::*;
pub use vault::broadcast::RetryPolicy;
pub use vault::{ChainVault, Vault, VaultContext, VaultSettings};

// Common result type
pub type Result<T> = std::result::Result<T, VaultError>;
