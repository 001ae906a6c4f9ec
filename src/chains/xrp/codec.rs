//! Canonical binary encoding of XRP Payment transactions
//!
//! Only the fields an XRP-to-XRP Payment carries are supported. Fields are
//! written in canonical order: by type code, then field code.

use sha2::{Digest, Sha512};

use crate::chains::xrp::address;
use crate::error::VaultError;
use crate::types::EncodedTxXrp;
use crate::Result;

const PAYMENT: u16 = 0;

/// `STX\0`, prefix of the single-signing payload
const SIGNING_PREFIX: [u8; 4] = [0x53, 0x54, 0x58, 0x00];
/// `TXN\0`, prefix of the transaction id preimage
const TXID_PREFIX: [u8; 4] = [0x54, 0x58, 0x4E, 0x00];

const NATIVE_POSITIVE: u64 = 0x4000_0000_0000_0000;
const MAX_DROPS: u64 = 100_000_000_000_000_000;

/// First half of SHA-512
pub fn sha512_half(data: &[u8]) -> [u8; 32] {
    let digest = Sha512::digest(data);
    let mut half = [0u8; 32];
    half.copy_from_slice(&digest[..32]);
    half
}

fn parse_drops(field: &str, value: &str) -> Result<u64> {
    let drops: u64 = value
        .parse()
        .map_err(|_| VaultError::InvalidAmount(format!("{} is not a drops value: {}", field, value)))?;
    if drops > MAX_DROPS {
        return Err(VaultError::InvalidAmount(format!("{} exceeds XRP supply", field)));
    }
    Ok(drops)
}

fn put_amount(out: &mut Vec<u8>, header: u8, drops: u64) {
    out.push(header);
    out.extend_from_slice(&(drops | NATIVE_POSITIVE).to_be_bytes());
}

fn put_vl(out: &mut Vec<u8>, header: u8, data: &[u8]) -> Result<()> {
    out.push(header);
    let len = data.len();
    if len <= 192 {
        out.push(len as u8);
    } else if len <= 12_480 {
        let rest = len - 193;
        out.push(193 + (rest >> 8) as u8);
        out.push((rest & 0xff) as u8);
    } else {
        return Err(VaultError::encoding(format!("blob too long: {} bytes", len)));
    }
    out.extend_from_slice(data);
    Ok(())
}

fn put_account(out: &mut Vec<u8>, header: u8, classic_address: &str) -> Result<()> {
    let account_id = address::decode_account_id(classic_address)?;
    put_vl(out, header, &account_id)
}

/// Serialize a Payment, with the signature when `signature` is set
pub fn serialize(
    tx: &EncodedTxXrp,
    signing_pub_key: &[u8],
    signature: Option<&[u8]>,
) -> Result<Vec<u8>> {
    if tx.transaction_type != "Payment" {
        return Err(VaultError::not_implemented(format!(
            "XRP transaction type {}",
            tx.transaction_type
        )));
    }

    let mut out = Vec::with_capacity(200);

    out.push(0x12);
    out.extend_from_slice(&PAYMENT.to_be_bytes());

    out.push(0x22);
    out.extend_from_slice(&tx.flags.to_be_bytes());

    out.push(0x24);
    out.extend_from_slice(&tx.sequence.to_be_bytes());

    if let Some(tag) = tx.destination_tag {
        out.push(0x2E);
        out.extend_from_slice(&tag.to_be_bytes());
    }

    out.extend_from_slice(&[0x20, 0x1B]);
    out.extend_from_slice(&tx.last_ledger_sequence.to_be_bytes());

    put_amount(&mut out, 0x61, parse_drops("Amount", &tx.amount)?);
    put_amount(&mut out, 0x68, parse_drops("Fee", &tx.fee)?);

    put_vl(&mut out, 0x73, signing_pub_key)?;
    if let Some(signature) = signature {
        put_vl(&mut out, 0x74, signature)?;
    }

    put_account(&mut out, 0x81, &tx.account)?;
    put_account(&mut out, 0x83, &tx.destination)?;

    Ok(out)
}

/// Digest the account key signs
pub fn signing_hash(tx: &EncodedTxXrp, signing_pub_key: &[u8]) -> Result<[u8; 32]> {
    let mut payload = SIGNING_PREFIX.to_vec();
    payload.extend_from_slice(&serialize(tx, signing_pub_key, None)?);
    Ok(sha512_half(&payload))
}

/// Upper-case hex transaction id of a signed blob
pub fn transaction_hash(signed_blob: &[u8]) -> String {
    let mut payload = TXID_PREFIX.to_vec();
    payload.extend_from_slice(signed_blob);
    hex::encode_upper(sha512_half(&payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENESIS: &str = "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh";

    fn payment() -> EncodedTxXrp {
        EncodedTxXrp {
            transaction_type: "Payment".to_string(),
            account: GENESIS.to_string(),
            destination: GENESIS.to_string(),
            amount: "1000000".to_string(),
            fee: "12".to_string(),
            sequence: 1,
            last_ledger_sequence: 100,
            flags: 0,
            destination_tag: None,
        }
    }

    #[test]
    fn test_fields_in_canonical_order() {
        let pubkey = [2u8; 33];
        let blob = serialize(&payment(), &pubkey, None).unwrap();

        assert_eq!(&blob[..3], &[0x12, 0x00, 0x00]);
        assert_eq!(blob[3], 0x22);
        assert_eq!(blob[8], 0x24);
        assert_eq!(&blob[13..15], &[0x20, 0x1B]);
        assert_eq!(blob[19], 0x61);
        // 1 XRP with the positive native marker
        assert_eq!(&blob[20..28], &(1_000_000u64 | NATIVE_POSITIVE).to_be_bytes());
        assert_eq!(blob[28], 0x68);
        assert_eq!(&blob[37..39], &[0x73, 33]);
        // Account follows the public key, destination last
        assert_eq!(&blob[72..74], &[0x81, 0x14]);
        assert_eq!(&blob[94..96], &[0x83, 0x14]);
        assert_eq!(blob.len(), 116);
    }

    #[test]
    fn test_destination_tag_is_encoded() {
        let mut tx = payment();
        tx.destination_tag = Some(42);
        let blob = serialize(&tx, &[2u8; 33], None).unwrap();
        assert_eq!(&blob[13..18], &[0x2E, 0, 0, 0, 42]);
    }

    #[test]
    fn test_signature_changes_id_not_signing_hash() {
        let tx = payment();
        let pubkey = [3u8; 33];
        let a = serialize(&tx, &pubkey, Some(&[1u8; 70])).unwrap();
        let b = serialize(&tx, &pubkey, Some(&[2u8; 70])).unwrap();
        assert_ne!(transaction_hash(&a), transaction_hash(&b));
        assert_eq!(signing_hash(&tx, &pubkey).unwrap(), signing_hash(&tx, &pubkey).unwrap());
        assert_eq!(transaction_hash(&a).len(), 64);
    }

    #[test]
    fn test_rejects_non_payment_and_bad_amount() {
        let mut tx = payment();
        tx.amount = "1.5".to_string();
        assert!(matches!(serialize(&tx, &[2u8; 33], None), Err(VaultError::InvalidAmount(_))));

        let mut tx = payment();
        tx.transaction_type = "TrustSet".to_string();
        assert!(matches!(serialize(&tx, &[2u8; 33], None), Err(VaultError::NotImplemented(_))));
    }
}
