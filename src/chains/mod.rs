//! Per-chain vault implementations
//!
//! Each chain family owns its builder/decoder and the final assembly step that
//! turns keyring signatures into a broadcastable transaction.

pub mod btc;
pub mod sol;
pub mod xrp;

use bitcoin::hashes::{sha256, Hash};

use crate::error::VaultError;
use crate::network::{ChainImpl, NetworkDescriptor};
use crate::keyring::derivation::{public_key_of, to_key_bytes};
use crate::types::{Curve, SignatureOutput, SignedTx, UnsignedTx};
use crate::Result;

/// Native address of a public key on `network`
pub fn address_from_public_key(network: &NetworkDescriptor, public_key: &[u8]) -> Result<String> {
    match network.impl_ {
        ChainImpl::Btc => btc::address_from_public_key(public_key, network.bitcoin_network()),
        ChainImpl::Sol => {
            if public_key.len() != 32 {
                return Err(VaultError::encoding(format!(
                    "ed25519 public key must be 32 bytes, got {}",
                    public_key.len()
                )));
            }
            Ok(bs58::encode(public_key).into_string())
        }
        ChainImpl::Xrp => Ok(xrp::address::from_public_key(public_key)),
    }
}

/// Payload signed for an off-chain message
pub fn message_sign_payload(network: &NetworkDescriptor, message: &[u8]) -> Vec<u8> {
    match network.impl_ {
        ChainImpl::Btc => {
            let text = String::from_utf8_lossy(message);
            bitcoin::sign_message::signed_msg_hash(&text)
                .to_byte_array()
                .to_vec()
        }
        ChainImpl::Sol => message.to_vec(),
        ChainImpl::Xrp => sha256::Hash::hash(message).to_byte_array().to_vec(),
    }
}

/// Combine signatures, one per sign request and in the same order, into a signed transaction
pub fn assemble_signed_tx(
    network: &NetworkDescriptor,
    unsigned: &UnsignedTx,
    signatures: &[SignatureOutput],
) -> Result<SignedTx> {
    if signatures.len() != unsigned.sign_requests.len() {
        return Err(VaultError::internal(format!(
            "expected {} signatures, got {}",
            unsigned.sign_requests.len(),
            signatures.len()
        )));
    }

    match network.impl_ {
        ChainImpl::Btc => btc::sign::assemble(network, unsigned, signatures),
        ChainImpl::Sol => sol::assemble(unsigned, signatures),
        ChainImpl::Xrp => xrp::assemble(unsigned, signatures),
    }
}

/// Raw 32-byte private key from a chain-native credential
///
/// Bitcoin takes WIF for the descriptor's network, Solana a base58 keypair
/// (64 bytes) or secret key (32 bytes), XRP a hex secret key.
pub fn parse_imported_credential(network: &NetworkDescriptor, credential: &str) -> Result<[u8; 32]> {
    let credential = credential.trim();
    let invalid = || VaultError::encoding(format!("invalid {} private key", network.symbol));

    match network.impl_ {
        ChainImpl::Btc => {
            let key = bitcoin::PrivateKey::from_wif(credential).map_err(|_| invalid())?;
            if key.network != bitcoin::NetworkKind::from(network.bitcoin_network()) {
                return Err(VaultError::encoding(format!(
                    "WIF key is not for network {}",
                    network.id
                )));
            }
            Ok(key.inner.secret_bytes())
        }
        ChainImpl::Sol => {
            let bytes = bs58::decode(credential).into_vec().map_err(|_| invalid())?;
            match bytes.len() {
                32 => to_key_bytes(&bytes),
                64 => {
                    let secret = to_key_bytes(&bytes[..32])?;
                    if public_key_of(Curve::Ed25519, &secret)?.as_slice() != &bytes[32..] {
                        return Err(VaultError::encoding("keypair public half does not match"));
                    }
                    Ok(secret)
                }
                _ => Err(invalid()),
            }
        }
        ChainImpl::Xrp => {
            let hex_key = credential
                .strip_prefix("00")
                .filter(|k| k.len() == 64)
                .unwrap_or(credential);
            let bytes = hex::decode(hex_key).map_err(|_| invalid())?;
            if bytes.len() != 32 {
                return Err(invalid());
            }
            let secret = to_key_bytes(&bytes)?;
            public_key_of(Curve::Secp256k1, &secret)?;
            Ok(secret)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::presets;

    fn network(id: &str) -> NetworkDescriptor {
        presets().into_iter().find(|n| n.id == id).unwrap()
    }

    #[test]
    fn test_wif_must_match_network() {
        let secret = [7u8; 32];
        let key = bitcoin::PrivateKey::new(
            bitcoin::secp256k1::SecretKey::from_slice(&secret).unwrap(),
            bitcoin::Network::Bitcoin,
        );
        let wif = key.to_wif();

        assert_eq!(parse_imported_credential(&network("btc--0"), &wif).unwrap(), secret);
        assert!(parse_imported_credential(&network("tbtc--0"), &wif).is_err());
    }

    #[test]
    fn test_solana_keypair_and_secret_forms() {
        let secret = [9u8; 32];
        let public = public_key_of(Curve::Ed25519, &secret).unwrap();
        let mut keypair = secret.to_vec();
        keypair.extend_from_slice(&public);

        let sol = network("sol--101");
        let from_keypair = bs58::encode(&keypair).into_string();
        assert_eq!(parse_imported_credential(&sol, &from_keypair).unwrap(), secret);
        let from_secret = bs58::encode(secret).into_string();
        assert_eq!(parse_imported_credential(&sol, &from_secret).unwrap(), secret);

        keypair[40] ^= 1;
        let tampered = bs58::encode(&keypair).into_string();
        assert!(parse_imported_credential(&sol, &tampered).is_err());
    }

    #[test]
    fn test_xrp_hex_key() {
        let xrp = network("xrp--0");
        let hex_key = "11".repeat(32);
        assert_eq!(parse_imported_credential(&xrp, &hex_key).unwrap(), [0x11; 32]);
        assert_eq!(
            parse_imported_credential(&xrp, &format!("00{}", hex_key)).unwrap(),
            [0x11; 32]
        );
        assert!(parse_imported_credential(&xrp, "not-a-key").is_err());
    }
}
