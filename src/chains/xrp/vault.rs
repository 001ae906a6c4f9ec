//! XRP vault
//!
//! Payments are autofilled at build time: `Sequence` from the account,
//! `Fee` from the open ledger cost and `LastLedgerSequence` a fixed number of
//! ledgers ahead. The fee is a field of the transaction, so fee quotes carry
//! the transaction back to the caller.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::future::join_all;

use super::{address, codec};
use crate::amount;
use crate::chains::parse_imported_credential;
use crate::client::xrpl::XrpLedgerTx;
use crate::client::XrplRpc;
use crate::error::{ClientError, VaultError};
use crate::types::{
    Action, ActionDirection, BalanceRequest, Curve, DecodeContext, DecodedTx, EncodedTx,
    EncodedTxUpdateOptions, EncodedTxUpdatePayload, EncodedTxUpdateType, EncodedTxXrp,
    EndpointStatus, FeeInfo, HistoryOptions, HistoryTx, SignRequest, SignedTx, Token,
    TransferInfo, TxInput, TxOutput, TxStatus, UnsignedTx,
};
use crate::vault::broadcast::{broadcast_with_retry, never_retry};
use crate::vault::history::{reconcile_history, OnChainRecord};
use crate::vault::{apply_decode_context, nft_supplements, ChainVault, VaultContext};
use crate::Result;

/// Ledgers a payment stays valid for after autofill
const LEDGER_OFFSET: u32 = 20;
const MIN_FEE_DROPS: u64 = 10;
const HISTORY_LIMIT: u32 = 50;
/// Seconds between the unix epoch and the Ripple epoch (2000-01-01)
const RIPPLE_EPOCH_OFFSET: i64 = 946_684_800;

fn ledger_status(tx: &XrpLedgerTx) -> TxStatus {
    if !tx.validated {
        return TxStatus::Pending;
    }
    match &tx.meta {
        Some(meta) if meta.transaction_result == "tesSUCCESS" => TxStatus::Confirmed,
        _ => TxStatus::Failed,
    }
}

fn ripple_time_ms(date: Option<i64>) -> Option<i64> {
    date.map(|seconds| (seconds + RIPPLE_EPOCH_OFFSET) * 1000)
}

pub struct XrpVault {
    ctx: VaultContext,
    client: Arc<dyn XrplRpc>,
}

impl XrpVault {
    pub fn new(ctx: VaultContext, client: Arc<dyn XrplRpc>) -> Self {
        Self { ctx, client }
    }

    fn encoded<'a>(&self, encoded: &'a EncodedTx) -> Result<&'a EncodedTxXrp> {
        match encoded {
            EncodedTx::Xrp(tx) => Ok(tx),
            _ => Err(VaultError::internal("expected an XRP transaction")),
        }
    }

    async fn native_drops(&self, value: &str, allow_zero: bool) -> Result<(Token, String)> {
        let token = self.ctx.resolve_token(None).await?;
        let drops = amount::to_raw(value, token.decimals, allow_zero)?;
        Ok((token, drops.to_string()))
    }

    fn transfer_action(&self, token: &Token, tx: &EncodedTxXrp) -> Result<Action> {
        let drops: u128 = tx
            .amount
            .parse()
            .map_err(|_| VaultError::InvalidAmount(tx.amount.clone()))?;
        self.ctx
            .transfer_action(token, &tx.account, &tx.destination, drops)
    }

    fn decode_ledger_tx(&self, tx: &XrpLedgerTx, token: &Token) -> Result<DecodedTx> {
        let action = match (tx.transaction_type.as_str(), &tx.destination, tx.amount_drops()) {
            ("Payment", Some(destination), Some(drops)) => {
                self.ctx
                    .transfer_action(token, &tx.account, destination, drops as u128)?
            }
            _ => Action::unknown(if self.ctx.is_mine(&tx.account) {
                ActionDirection::Out
            } else {
                ActionDirection::In
            }),
        };

        let fee: u128 = tx.fee.parse().map_err(|_| VaultError::InvalidAmount(tx.fee.clone()))?;
        let status = ledger_status(tx);
        let created_at = ripple_time_ms(tx.date).unwrap_or_else(crate::types::now_ms);
        Ok(DecodedTx {
            txid: tx.hash.clone(),
            owner: self.ctx.account.address.clone(),
            signer: tx.account.clone(),
            nonce: tx.sequence as u64,
            actions: vec![action],
            status,
            network_id: self.ctx.network.id.clone(),
            account_id: self.ctx.account.id.clone(),
            total_fee_in_native: Some(amount::from_raw(fee, token.decimals)?),
            created_at,
            updated_at: created_at,
            is_final: status.is_final(),
            encoded_tx: None,
        })
    }
}

#[async_trait]
impl ChainVault for XrpVault {
    fn context(&self) -> &VaultContext {
        &self.ctx
    }

    fn validate_address(&self, address: &str) -> Result<String> {
        address::decode_account_id(address)?;
        Ok(address.to_string())
    }

    fn validate_imported_credential(&self, credential: &str) -> bool {
        self.settings().imported_account_enabled
            && parse_imported_credential(&self.ctx.network, credential).is_ok()
    }

    async fn build_encoded_tx_from_transfer(&self, transfer: &TransferInfo) -> Result<EncodedTx> {
        self.validate_address(&transfer.to)?;
        let token = self.ctx.resolve_token(transfer.token.as_deref()).await?;
        self.ctx.check_min_transfer(transfer, &token)?;
        let (_, drops) = self
            .native_drops(&transfer.amount, transfer.is_max_send)
            .await?;

        let account = &self.ctx.account.address;
        let info = self.client.account_info(account).await?.ok_or_else(|| {
            VaultError::InsufficientFunds(format!("account {} is not activated", account))
        })?;
        let fee = self.client.fee().await?;

        let tx = EncodedTxXrp {
            transaction_type: "Payment".to_string(),
            account: account.clone(),
            destination: transfer.to.clone(),
            amount: drops,
            fee: fee.open_ledger_fee.max(MIN_FEE_DROPS).to_string(),
            sequence: info.sequence,
            last_ledger_sequence: fee.ledger_current_index + LEDGER_OFFSET,
            flags: 0,
            destination_tag: transfer.destination_tag,
        };
        log::debug!(
            "Autofilled XRP payment: sequence {}, fee {} drops, last ledger {}",
            tx.sequence,
            tx.fee,
            tx.last_ledger_sequence
        );
        Ok(EncodedTx::Xrp(tx))
    }

    async fn update_encoded_tx(
        &self,
        encoded: EncodedTx,
        payload: &EncodedTxUpdatePayload,
        options: &EncodedTxUpdateOptions,
    ) -> Result<EncodedTx> {
        if options.update_type != EncodedTxUpdateType::Transfer {
            return Ok(encoded);
        }
        let mut tx = self.encoded(&encoded)?.clone();
        tx.amount = self.native_drops(&payload.amount, false).await?.1;
        Ok(EncodedTx::Xrp(tx))
    }

    async fn build_unsigned_tx_from_encoded_tx(&self, encoded: EncodedTx) -> Result<UnsignedTx> {
        let tx = self.encoded(&encoded)?;
        let public_key = hex::decode(&self.ctx.account.public_key).map_err(VaultError::encoding)?;
        let digest = codec::signing_hash(tx, &public_key)?;

        Ok(UnsignedTx {
            inputs: vec![TxInput {
                address: tx.account.clone(),
                value: tx.amount.clone(),
            }],
            outputs: vec![TxOutput {
                address: tx.destination.clone(),
                value: tx.amount.clone(),
                is_change: false,
            }],
            sign_requests: vec![SignRequest {
                path: self.ctx.account.path.clone(),
                curve: Curve::Secp256k1,
                message: digest.to_vec(),
            }],
            fee_payer: None,
            encoded_tx: encoded,
        })
    }

    async fn decode_tx(&self, encoded: &EncodedTx, context: &DecodeContext) -> Result<DecodedTx> {
        let tx = self.encoded(encoded)?;
        let token = self.ctx.resolve_token(None).await?;
        let actions = vec![self.transfer_action(&token, tx)?];
        let actions = apply_decode_context(&self.ctx, actions, context);

        let fee: u128 = tx.fee.parse().map_err(|_| VaultError::InvalidAmount(tx.fee.clone()))?;
        let mut decoded = self.ctx.pending_decoded_tx(actions, encoded);
        decoded.nonce = tx.sequence as u64;
        decoded.total_fee_in_native = Some(amount::from_raw(fee, token.decimals)?);
        Ok(decoded)
    }

    async fn fetch_fee_info(&self, encoded: &EncodedTx) -> Result<FeeInfo> {
        let tx = self.encoded(encoded)?;
        let network = &self.ctx.network;

        Ok(FeeInfo {
            limit: tx.fee.clone(),
            prices: vec!["1".to_string()],
            default_preset_index: 0,
            fee_symbol: network.fee_symbol.clone(),
            fee_decimals: network.fee_decimals,
            native_symbol: network.symbol.clone(),
            native_decimals: network.decimals,
            custom_disabled: !self.settings().fee_info_editable,
            tx: Some(encoded.clone()),
        })
    }

    async fn broadcast_transaction(&self, signed: SignedTx) -> Result<SignedTx> {
        let client: &dyn XrplRpc = self.client.as_ref();
        let blob = signed.raw_tx.as_str();

        let result = broadcast_with_retry(
            &self.ctx.config.retry_policy(),
            move |_| async move {
                let result = client.submit(blob).await?;
                if result.is_accepted() {
                    Ok(result)
                } else {
                    Err(ClientError::Rpc {
                        code: -1,
                        message: result.engine_result_message,
                        data: Some(serde_json::Value::String(result.engine_result)),
                    })
                }
            },
            never_retry,
        )
        .await?;
        log::info!(
            "✅ XRP transaction submitted: {} ({})",
            signed.txid,
            result.engine_result
        );

        Ok(SignedTx {
            txid: result.tx_hash.unwrap_or_else(|| signed.txid.clone()),
            ..signed
        })
    }

    async fn fetch_on_chain_history(&self, options: &HistoryOptions) -> Result<Vec<HistoryTx>> {
        let token = self.ctx.resolve_token(None).await?;
        let txs = self
            .client
            .account_tx(&self.ctx.account.address, HISTORY_LIMIT)
            .await?;

        let records = txs
            .into_iter()
            .map(|tx| OnChainRecord {
                txid: tx.hash.clone(),
                block_time_ms: ripple_time_ms(tx.date),
                status: ledger_status(&tx),
                fee_in_native: tx
                    .fee
                    .parse::<u128>()
                    .ok()
                    .and_then(|fee| amount::from_raw(fee, token.decimals).ok()),
                native: tx,
            })
            .collect();

        let token = &token;
        Ok(reconcile_history(
            &self.ctx.account.id,
            records,
            &options.local_history,
            move |tx: XrpLedgerTx| async move { self.decode_ledger_tx(&tx, token) },
            &nft_supplements(&self.ctx, &options.nft_transfers),
        )
        .await)
    }

    async fn get_balances(&self, requests: &[BalanceRequest]) -> Vec<Option<u128>> {
        let lookups = requests.iter().map(move |request| async move {
            if request.token_address.as_deref().is_some_and(|t| !t.is_empty()) {
                return None;
            }
            match self.client.account_info(&request.address).await {
                Ok(info) => Some(info.map_or(0, |info| info.balance as u128)),
                Err(e) => {
                    log::warn!("⚠️ Balance lookup failed for {}: {}", request.address, e);
                    None
                }
            }
        });
        join_all(lookups).await
    }

    async fn get_exported_credential(&self, password: &str) -> Result<String> {
        let secret = self.ctx.exported_secret(password).await?;
        Ok(hex::encode_upper(secret))
    }

    async fn get_transaction_statuses(&self, txids: &[String]) -> Vec<Option<TxStatus>> {
        let lookups = txids.iter().map(move |txid| async move {
            match self.client.transaction(txid).await {
                Ok(tx) => tx.map(|tx| ledger_status(&tx)),
                Err(e) => {
                    log::warn!("⚠️ Status lookup failed for {}: {}", txid, e);
                    Some(TxStatus::Pending)
                }
            }
        });
        join_all(lookups).await
    }

    async fn get_client_endpoint_status(&self) -> Result<EndpointStatus> {
        let start = Instant::now();
        let latest_block = self.client.validated_ledger_index().await?;
        Ok(EndpointStatus {
            response_time_ms: start.elapsed().as_millis() as u64,
            latest_block: latest_block as u64,
        })
    }
}
