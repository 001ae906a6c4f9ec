//! Solana (system and SPL token transfers)

pub mod instructions;
mod vault;

pub use vault::SolVault;

use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;

use crate::error::VaultError;
use crate::types::{EncodedTx, SignatureOutput, SignedTx, UnsignedTx};
use crate::Result;

/// Base58 of the bincode wire format
pub fn encode_transaction(tx: &Transaction) -> Result<String> {
    let bytes = bincode::serialize(tx).map_err(VaultError::encoding)?;
    Ok(bs58::encode(bytes).into_string())
}

pub fn decode_transaction(encoded: &str) -> Result<Transaction> {
    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(VaultError::encoding)?;
    bincode::deserialize(&bytes).map_err(VaultError::encoding)
}

/// Place each signature in the slot of its signer's public key
pub fn assemble(unsigned: &UnsignedTx, signatures: &[SignatureOutput]) -> Result<SignedTx> {
    let EncodedTx::Sol(encoded) = &unsigned.encoded_tx else {
        return Err(VaultError::internal("expected a solana transaction"));
    };
    let mut tx = decode_transaction(encoded)?;
    let required = tx.message.header.num_required_signatures as usize;

    for output in signatures {
        let slot = tx.message.account_keys[..required.min(tx.message.account_keys.len())]
            .iter()
            .position(|key| key.as_ref() == output.public_key.as_slice())
            .ok_or_else(|| VaultError::internal("signature from a key that is not a signer"))?;
        let bytes: [u8; 64] = output
            .signature
            .as_slice()
            .try_into()
            .map_err(|_| VaultError::encoding("ed25519 signature must be 64 bytes"))?;
        let target = tx
            .signatures
            .get_mut(slot)
            .ok_or_else(|| VaultError::internal("transaction has no signature slot for signer"))?;
        *target = Signature::from(bytes);
    }

    if tx.signatures.iter().any(|s| *s == Signature::default()) {
        return Err(VaultError::internal("transaction is missing a required signature"));
    }
    tx.verify().map_err(|e| VaultError::internal(format!("signature check failed: {}", e)))?;

    let txid = tx
        .signatures
        .first()
        .ok_or_else(|| VaultError::internal("transaction has no signatures"))?
        .to_string();

    Ok(SignedTx {
        txid,
        raw_tx: encode_transaction(&tx)?,
        encoded_tx: Some(unsigned.encoded_tx.clone()),
    })
}
