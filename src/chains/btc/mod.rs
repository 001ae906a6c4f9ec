//! Bitcoin (P2WPKH, Esplora-backed)

pub mod builder;
pub mod sign;
mod vault;

pub use vault::BtcVault;

use bitcoin::{Address, CompressedPublicKey, Network};

use crate::error::VaultError;
use crate::Result;

/// Native SegWit address of a compressed public key
pub fn address_from_public_key(public_key: &[u8], network: Network) -> Result<String> {
    let key = CompressedPublicKey::from_slice(public_key).map_err(VaultError::encoding)?;
    Ok(Address::p2wpkh(&key, network).to_string())
}
