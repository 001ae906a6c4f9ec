//! XRP Ledger (native XRP payments)

pub mod address;
pub mod codec;
mod vault;

pub use vault::XrpVault;

use crate::error::VaultError;
use crate::types::{EncodedTx, SignatureOutput, SignedTx, UnsignedTx};
use crate::Result;

/// Serialize the payment with its signature and compute the ledger hash
pub fn assemble(unsigned: &UnsignedTx, signatures: &[SignatureOutput]) -> Result<SignedTx> {
    let EncodedTx::Xrp(tx) = &unsigned.encoded_tx else {
        return Err(VaultError::internal("expected an XRP transaction"));
    };
    let [signature] = signatures else {
        return Err(VaultError::internal("XRP payments take exactly one signature"));
    };

    let blob = codec::serialize(tx, &signature.public_key, Some(&signature.signature))?;
    Ok(SignedTx {
        txid: codec::transaction_hash(&blob),
        raw_tx: hex::encode_upper(&blob),
        encoded_tx: Some(unsigned.encoded_tx.clone()),
    })
}
