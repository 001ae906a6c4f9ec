//! P2WPKH transaction building and coin selection
//!
//! Selection is largest-first over confirmed outputs, with `(txid, vout)` as
//! the tie-break so the same output set always yields the same transaction.

use std::cmp::Ordering;

use crate::error::VaultError;
use crate::types::{BtcInput, BtcOutput, EncodedTxBtc, TransferInfo};
use crate::Result;

/// Outputs below this value are not relayed
pub const DUST_LIMIT: u64 = 546;

/// Estimate transaction size in virtual bytes based on number of inputs and outputs
pub fn estimate_vsize(num_inputs: usize, num_outputs: usize) -> u64 {
    let base_size = 10;
    let input_size = 68;
    let output_size = 34;

    (base_size + (num_inputs * input_size) + (num_outputs * output_size)) as u64
}

/// Chosen inputs plus the fee and change they imply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub inputs: Vec<BtcInput>,
    pub amount: u64,
    pub fee: u64,
    /// Zero when the remainder was below dust and went to the fee
    pub change: u64,
}

fn selection_order(a: &BtcInput, b: &BtcInput) -> Ordering {
    b.value
        .cmp(&a.value)
        .then_with(|| a.txid.cmp(&b.txid))
        .then_with(|| a.vout.cmp(&b.vout))
}

/// Select inputs covering `amount` plus fee at `fee_rate` sat/vB
pub fn select_coins(utxos: &[BtcInput], amount: u64, fee_rate: u64) -> Result<Selection> {
    if amount < DUST_LIMIT {
        return Err(VaultError::InvalidAmount(format!(
            "{} sats is below the dust limit ({} sats)",
            amount, DUST_LIMIT
        )));
    }

    let mut sorted = utxos.to_vec();
    sorted.sort_by(selection_order);

    let mut selected = Vec::new();
    let mut total = 0u64;

    for utxo in sorted {
        total += utxo.value;
        selected.push(utxo);

        let fee = estimate_vsize(selected.len(), 2) * fee_rate;
        if total >= amount + fee + DUST_LIMIT {
            return Ok(Selection {
                inputs: selected,
                amount,
                fee,
                change: total - amount - fee,
            });
        }
    }

    // Without a change output the remainder, if any, is paid as fee
    let fee_without_change = estimate_vsize(selected.len(), 1) * fee_rate;
    if !selected.is_empty() && total >= amount + fee_without_change {
        return Ok(Selection {
            inputs: selected,
            amount,
            fee: total - amount,
            change: 0,
        });
    }

    Err(VaultError::InsufficientFunds(format!(
        "Need {} sats (amount + fee), but only have {} sats confirmed",
        amount + fee_without_change,
        total
    )))
}

/// Spend every input to a single output, minus the fee
pub fn select_max(utxos: &[BtcInput], fee_rate: u64) -> Result<Selection> {
    let mut inputs = utxos.to_vec();
    inputs.sort_by(selection_order);

    let total: u64 = inputs.iter().map(|u| u.value).sum();
    let fee = estimate_vsize(inputs.len(), 1) * fee_rate;

    if inputs.is_empty() || total < fee + DUST_LIMIT {
        return Err(VaultError::InsufficientFunds(format!(
            "Balance of {} sats cannot cover fee ({} sats) plus dust limit",
            total, fee
        )));
    }

    Ok(Selection {
        inputs,
        amount: total - fee,
        fee,
        change: 0,
    })
}

/// Lay out the encoded transaction for a selection
pub fn encode(
    selection: Selection,
    to_address: &str,
    change_address: &str,
    fee_rate: u64,
    transfer_info: TransferInfo,
) -> EncodedTxBtc {
    let mut outputs = vec![BtcOutput {
        address: to_address.to_string(),
        value: selection.amount,
        is_change: false,
    }];
    if selection.change > 0 {
        outputs.push(BtcOutput {
            address: change_address.to_string(),
            value: selection.change,
            is_change: true,
        });
    }

    EncodedTxBtc {
        inputs: selection.inputs,
        outputs,
        fee_rate,
        total_fee: selection.fee,
        total_spent: selection.amount + selection.fee,
        transfer_info,
    }
}
