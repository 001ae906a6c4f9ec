//! Reconciliation of on-chain history with the caller's local history
//!
//! Final local entries are returned untouched and never decoded again.
//! Pending local entries keep their decoded content (built with local context
//! such as token metadata) and only take status and fee from the chain.
//! Everything else is decoded from the native record; a record that fails to
//! decode is logged and left out.

use std::collections::HashMap;
use std::future::Future;

use futures::future::join_all;

use crate::types::{now_ms, Action, DecodedTx, HistoryOrigin, HistoryTx, TxStatus};
use crate::Result;

/// One fetched on-chain transaction, with its native payload
#[derive(Debug, Clone, PartialEq)]
pub struct OnChainRecord<T> {
    pub txid: String,
    /// Block time in unix millis, when known
    pub block_time_ms: Option<i64>,
    pub status: TxStatus,
    /// Fee in native units (human decimal)
    pub fee_in_native: Option<String>,
    pub native: T,
}

/// Merge `records` (in on-chain order) with `local_history`
pub async fn reconcile_history<T, F, Fut>(
    account_id: &str,
    records: Vec<OnChainRecord<T>>,
    local_history: &[HistoryTx],
    decode: F,
    supplements: &HashMap<String, Vec<Action>>,
) -> Vec<HistoryTx>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<DecodedTx>>,
{
    let local: HashMap<&str, &HistoryTx> = local_history
        .iter()
        .map(|entry| (entry.decoded_tx.txid.as_str(), entry))
        .collect();
    let decode = &decode;

    let merged = records.into_iter().map(|record| {
        let local = local.get(record.txid.as_str()).copied();
        async move {
            if let Some(entry) = local {
                if entry.decoded_tx.is_final {
                    return Some(entry.clone());
                }
            }

            let mut decoded = match local {
                Some(entry) => entry.decoded_tx.clone(),
                None => match decode(record.native).await {
                    Ok(decoded) => decoded,
                    Err(e) => {
                        log::error!("Dropping history entry {}: {}", record.txid, e);
                        return None;
                    }
                },
            };

            if decoded.txid.is_empty() {
                decoded.txid = record.txid.clone();
            }
            if decoded.status.can_transition_to(record.status) {
                decoded.status = record.status;
            }
            decoded.is_final = decoded.status.is_final();
            if record.fee_in_native.is_some() {
                decoded.total_fee_in_native = record.fee_in_native;
            }

            let updated_at = now_ms();
            decoded.created_at = local
                .map(|entry| entry.decoded_tx.created_at)
                .or(record.block_time_ms)
                .unwrap_or(updated_at);
            decoded.updated_at = updated_at;

            if let Some(actions) = supplements.get(&record.txid) {
                decoded.actions = actions.clone();
            }

            Some(HistoryTx {
                id: HistoryTx::history_id(account_id, &record.txid),
                decoded_tx: decoded,
                origin: if local.is_some() {
                    HistoryOrigin::Merged
                } else {
                    HistoryOrigin::OnChain
                },
            })
        }
    });

    join_all(merged).await.into_iter().flatten().collect()
}
