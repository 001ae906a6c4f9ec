//! Sign-request preparation and witness assembly for P2WPKH spends

use std::str::FromStr;

use bitcoin::absolute;
use bitcoin::blockdata::script::ScriptBuf;
use bitcoin::blockdata::transaction::{Transaction, TxIn, TxOut};
use bitcoin::blockdata::witness::Witness;
use bitcoin::hashes::Hash;
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::{OutPoint, Sequence};
use bitcoin::{Address, Amount, Network, Txid};

use crate::error::VaultError;
use crate::network::NetworkDescriptor;
use crate::types::{EncodedTx, EncodedTxBtc, SignatureOutput, SignedTx, UnsignedTx};
use crate::Result;

pub(crate) fn parse_address(address: &str, network: Network) -> Result<Address> {
    Address::from_str(address)
        .map_err(|_| VaultError::InvalidAddress(address.to_string()))?
        .require_network(network)
        .map_err(|_| VaultError::InvalidAddress(address.to_string()))
}

/// Unsigned native transaction for an encoded spend
pub fn build_transaction(encoded: &EncodedTxBtc, network: Network) -> Result<Transaction> {
    let mut tx = Transaction {
        version: bitcoin::transaction::Version::TWO,
        lock_time: absolute::LockTime::ZERO,
        input: vec![],
        output: vec![],
    };

    for input in &encoded.inputs {
        tx.input.push(TxIn {
            previous_output: OutPoint {
                txid: Txid::from_str(&input.txid)
                    .map_err(|e| VaultError::encoding(format!("Invalid txid: {}", e)))?,
                vout: input.vout,
            },
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: Witness::new(),
        });
    }

    for output in &encoded.outputs {
        tx.output.push(TxOut {
            value: Amount::from_sat(output.value),
            script_pubkey: parse_address(&output.address, network)?.script_pubkey(),
        });
    }

    Ok(tx)
}

/// BIP143 digests, one per input in input order
pub fn sighashes(encoded: &EncodedTxBtc, network: Network) -> Result<Vec<[u8; 32]>> {
    let tx = build_transaction(encoded, network)?;
    let mut cache = SighashCache::new(&tx);

    encoded
        .inputs
        .iter()
        .enumerate()
        .map(|(index, input)| {
            let script_pubkey = parse_address(&input.address, network)?.script_pubkey();
            let sighash = cache
                .p2wpkh_signature_hash(
                    index,
                    &script_pubkey,
                    Amount::from_sat(input.value),
                    EcdsaSighashType::All,
                )
                .map_err(|e| VaultError::encoding(e.to_string()))?;
            Ok(sighash.to_byte_array())
        })
        .collect()
}

/// Attach one `[signature || SIGHASH_ALL, pubkey]` witness per input
pub fn assemble(
    network: &NetworkDescriptor,
    unsigned: &UnsignedTx,
    signatures: &[SignatureOutput],
) -> Result<SignedTx> {
    let EncodedTx::Btc(encoded) = &unsigned.encoded_tx else {
        return Err(VaultError::internal("expected a bitcoin transaction"));
    };
    if signatures.len() != encoded.inputs.len() {
        return Err(VaultError::internal("one signature per input required"));
    }

    let mut tx = build_transaction(encoded, network.bitcoin_network())?;
    for (input, signature) in tx.input.iter_mut().zip(signatures) {
        let mut sig_with_hashtype = signature.signature.clone();
        sig_with_hashtype.push(EcdsaSighashType::All.to_u32() as u8);

        input.witness.push(sig_with_hashtype);
        input.witness.push(signature.public_key.clone());
    }

    Ok(SignedTx {
        txid: tx.compute_txid().to_string(),
        raw_tx: bitcoin::consensus::encode::serialize_hex(&tx),
        encoded_tx: Some(unsigned.encoded_tx.clone()),
    })
}
