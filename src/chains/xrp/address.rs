//! XRP Ledger classic addresses
//!
//! `r...` addresses are base58check (Ripple alphabet, version byte 0) of the
//! 20-byte account id, itself `RIPEMD160(SHA256(public key))`.

use bitcoin::hashes::{hash160, Hash};

use crate::error::VaultError;
use crate::Result;

const ACCOUNT_ID_VERSION: u8 = 0;

/// Classic address of a compressed secp256k1 public key
pub fn from_public_key(public_key: &[u8]) -> String {
    let account_id = hash160::Hash::hash(public_key);
    encode_account_id(account_id.as_byte_array())
}

pub fn encode_account_id(account_id: &[u8; 20]) -> String {
    bs58::encode(account_id)
        .with_alphabet(bs58::Alphabet::RIPPLE)
        .with_check_version(ACCOUNT_ID_VERSION)
        .into_string()
}

/// Decode a classic address into its account id
pub fn decode_account_id(address: &str) -> Result<[u8; 20]> {
    let invalid = || VaultError::InvalidAddress(address.to_string());

    if !address.starts_with('r') {
        return Err(invalid());
    }

    let decoded = bs58::decode(address)
        .with_alphabet(bs58::Alphabet::RIPPLE)
        .with_check(Some(ACCOUNT_ID_VERSION))
        .into_vec()
        .map_err(|_| invalid())?;

    // Output keeps the version byte in front of the payload
    match decoded.split_first() {
        Some((&ACCOUNT_ID_VERSION, payload)) if payload.len() == 20 => {
            let mut account_id = [0u8; 20];
            account_id.copy_from_slice(payload);
            Ok(account_id)
        }
        _ => Err(invalid()),
    }
}

pub fn is_valid(address: &str) -> bool {
    decode_account_id(address).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Genesis account of the XRP Ledger
    const GENESIS: &str = "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh";
    const GENESIS_PUBLIC_KEY: &str =
        "0330E7FC9D56BB25D6893BA3F317AE5BCF33B3291BD63DB32654A313222F7FD020";

    #[test]
    fn test_genesis_public_key_to_address() {
        let public_key = hex::decode(GENESIS_PUBLIC_KEY).unwrap();
        assert_eq!(from_public_key(&public_key), GENESIS);
    }

    #[test]
    fn test_account_id_round_trip() {
        let account_id = decode_account_id(GENESIS).unwrap();
        assert_eq!(encode_account_id(&account_id), GENESIS);
    }

    #[test]
    fn test_rejects_bad_checksum_and_prefix() {
        assert!(!is_valid("rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTi"));
        assert!(!is_valid("xHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh"));
        assert!(!is_valid(""));
    }
}
