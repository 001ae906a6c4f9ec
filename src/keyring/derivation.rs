//! Key derivation and raw signing primitives
//!
//! secp256k1 chains derive through BIP32 (`bitcoin::bip32`); ed25519 chains
//! through SLIP-0010, which only defines hardened children.

use std::str::FromStr;

use bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv, Xpub};
use bitcoin::hashes::{hmac, sha512, Hash, HashEngine};
use bitcoin::secp256k1::{self, Message, Secp256k1, SecretKey};
use ed25519_dalek::Signer as _;

use crate::error::VaultError;
use crate::network::{ChainImpl, NetworkDescriptor};
use crate::types::{AccountKind, Curve, SignatureOutput};
use crate::Result;

const ED25519_SEED_KEY: &[u8] = b"ed25519 seed";

/// Where an account's keys live under the seed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountLayout {
    /// Account-level path for UTXO accounts, key path otherwise
    pub path: String,
    pub kind: AccountKind,
    pub curve: Curve,
    /// Receive/change paths relative to `path` (UTXO accounts only)
    pub address_paths: Vec<String>,
}

pub fn curve_of(chain: ChainImpl) -> Curve {
    match chain {
        ChainImpl::Btc | ChainImpl::Xrp => Curve::Secp256k1,
        ChainImpl::Sol => Curve::Ed25519,
    }
}

/// Derivation layout of the `index`-th account on `network`
pub fn account_layout(network: &NetworkDescriptor, index: u32) -> AccountLayout {
    match network.impl_ {
        ChainImpl::Btc => AccountLayout {
            path: format!("m/84'/{}'/{}'", network.coin_type(), index),
            kind: AccountKind::Utxo,
            curve: Curve::Secp256k1,
            address_paths: vec!["0/0".to_string(), "1/0".to_string()],
        },
        ChainImpl::Sol => AccountLayout {
            path: format!("m/44'/501'/{}'/0'", index),
            kind: AccountKind::Simple,
            curve: Curve::Ed25519,
            address_paths: Vec::new(),
        },
        ChainImpl::Xrp => AccountLayout {
            path: format!("m/44'/144'/0'/0/{}", index),
            kind: AccountKind::Simple,
            curve: Curve::Secp256k1,
            address_paths: Vec::new(),
        },
    }
}

/// Join an account path and a relative path (`"0/3"`)
pub fn join_path(base: &str, relative: &str) -> String {
    if relative.is_empty() {
        base.to_string()
    } else if base.is_empty() {
        format!("m/{}", relative)
    } else {
        format!("{}/{}", base, relative)
    }
}

pub fn parse_path(path: &str) -> Result<DerivationPath> {
    DerivationPath::from_str(path)
        .map_err(|e| VaultError::internal(format!("invalid derivation path {}: {}", path, e)))
}

/// BIP32 extended private key at `path`
pub fn derive_xpriv(seed: &[u8], network: bitcoin::Network, path: &str) -> Result<Xpriv> {
    let secp = Secp256k1::new();
    let master = Xpriv::new_master(network, seed)
        .map_err(|e| VaultError::internal(format!("master key: {}", e)))?;
    master
        .derive_priv(&secp, &parse_path(path)?)
        .map_err(|e| VaultError::internal(format!("derive {}: {}", path, e)))
}

/// Public child of an account xpub along a relative path
pub fn derive_child_public_key(xpub: &Xpub, relative: &str) -> Result<secp256k1::PublicKey> {
    let secp = Secp256k1::verification_only();
    let child = xpub
        .derive_pub(&secp, &parse_path(&join_path("", relative))?)
        .map_err(|e| VaultError::internal(format!("derive {}: {}", relative, e)))?;
    Ok(child.public_key)
}

/// SLIP-0010 ed25519 private key at `path`
pub fn derive_ed25519(seed: &[u8], path: &str) -> Result<[u8; 32]> {
    let parsed = parse_path(path)?;
    let mut node = hmac_sha512(ED25519_SEED_KEY, seed);

    for child in &parsed {
        let index = match child {
            ChildNumber::Hardened { index } => *index | 0x8000_0000,
            ChildNumber::Normal { .. } => {
                return Err(VaultError::internal(format!(
                    "ed25519 derivation requires hardened path: {}",
                    path
                )))
            }
        };
        let mut data = Vec::with_capacity(37);
        data.push(0u8);
        data.extend_from_slice(&node[..32]);
        data.extend_from_slice(&index.to_be_bytes());
        node = hmac_sha512(&node[32..], &data);
    }

    let mut key = [0u8; 32];
    key.copy_from_slice(&node[..32]);
    Ok(key)
}

fn hmac_sha512(key: &[u8], data: &[u8]) -> [u8; 64] {
    let mut engine = hmac::HmacEngine::<sha512::Hash>::new(key);
    engine.input(data);
    hmac::Hmac::<sha512::Hash>::from_engine(engine).to_byte_array()
}

/// 32-byte private key at `path` for the given curve
pub fn derive_private_key(
    seed: &[u8],
    network: &NetworkDescriptor,
    curve: Curve,
    path: &str,
) -> Result<[u8; 32]> {
    match curve {
        Curve::Secp256k1 => {
            let xpriv = derive_xpriv(seed, network.bitcoin_network(), path)?;
            Ok(xpriv.private_key.secret_bytes())
        }
        Curve::Ed25519 => derive_ed25519(seed, path),
    }
}

pub fn to_key_bytes(secret: &[u8]) -> Result<[u8; 32]> {
    secret
        .try_into()
        .map_err(|_| VaultError::internal(format!("expected 32-byte key, got {}", secret.len())))
}

/// Compressed secp256k1 or raw ed25519 public key of a private key
pub fn public_key_of(curve: Curve, secret: &[u8]) -> Result<Vec<u8>> {
    match curve {
        Curve::Secp256k1 => {
            let secp = Secp256k1::signing_only();
            let sk = SecretKey::from_slice(secret).map_err(VaultError::encoding)?;
            Ok(secp256k1::PublicKey::from_secret_key(&secp, &sk)
                .serialize()
                .to_vec())
        }
        Curve::Ed25519 => {
            let key = ed25519_dalek::SigningKey::from_bytes(&to_key_bytes(secret)?);
            Ok(key.verifying_key().to_bytes().to_vec())
        }
    }
}

/// Sign with a raw private key
///
/// secp256k1 signs a 32-byte digest and returns DER; ed25519 signs the whole
/// message and returns 64 bytes.
pub fn sign_with_key(curve: Curve, secret: &[u8], message: &[u8]) -> Result<SignatureOutput> {
    match curve {
        Curve::Secp256k1 => {
            let secp = Secp256k1::signing_only();
            let sk = SecretKey::from_slice(secret).map_err(VaultError::encoding)?;
            let digest = Message::from_digest_slice(message).map_err(|e| {
                VaultError::internal(format!("secp256k1 sign request must be a digest: {}", e))
            })?;
            let signature = secp.sign_ecdsa(&digest, &sk);
            Ok(SignatureOutput {
                signature: signature.serialize_der().to_vec(),
                public_key: secp256k1::PublicKey::from_secret_key(&secp, &sk)
                    .serialize()
                    .to_vec(),
            })
        }
        Curve::Ed25519 => {
            let key = ed25519_dalek::SigningKey::from_bytes(&to_key_bytes(secret)?);
            Ok(SignatureOutput {
                signature: key.sign(message).to_bytes().to_vec(),
                public_key: key.verifying_key().to_bytes().to_vec(),
            })
        }
    }
}
