//! Bitcoin vault
//!
//! Transfers spend confirmed UTXOs of every address the account owns; change
//! always returns to the account's first internal address (`1/0`).

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bitcoin::bip32::Xpriv;
use futures::future::join_all;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::builder::{self, estimate_vsize};
use super::sign::{parse_address, sighashes};
use crate::amount;
use crate::chains::parse_imported_credential;
use crate::client::esplora::EsploraTx;
use crate::client::EsploraApi;
use crate::error::{ClientError, VaultError};
use crate::keyring::derivation::join_path;
use crate::types::{
    Action, ActionDirection, BalanceRequest, BtcInput, Curve, DecodeContext, DecodedTx, EncodedTx,
    EncodedTxBtc, EncodedTxUpdateOptions, EncodedTxUpdatePayload, EndpointStatus, FeeInfo,
    FeeInfoUnit, HistoryOptions, HistoryTx, SignRequest, SignedTx, Token, TransferInfo, TxInput,
    TxOutput, TxStatus, UnsignedTx,
};
use crate::vault::broadcast::{broadcast_with_retry, never_retry};
use crate::vault::history::{reconcile_history, OnChainRecord};
use crate::vault::{apply_decode_context, nft_supplements, ChainVault, VaultContext};
use crate::Result;

/// Confirmation targets (blocks) of the slow, normal and fast presets
const FEE_TARGETS: [&str; 3] = ["6", "3", "1"];
const DEFAULT_PRESET: usize = 1;

pub struct BtcVault {
    ctx: VaultContext,
    client: Arc<dyn EsploraApi>,
}

impl BtcVault {
    pub fn new(ctx: VaultContext, client: Arc<dyn EsploraApi>) -> Self {
        Self { ctx, client }
    }

    fn network(&self) -> bitcoin::Network {
        self.ctx.network.bitcoin_network()
    }

    fn encoded<'a>(&self, encoded: &'a EncodedTx) -> Result<&'a EncodedTxBtc> {
        match encoded {
            EncodedTx::Btc(tx) => Ok(tx),
            _ => Err(VaultError::internal("expected a bitcoin transaction")),
        }
    }

    /// Fee rates in sat/vB for each preset, slowest first
    async fn fee_rates(&self) -> Result<Vec<u64>> {
        let estimates = self.client.fee_estimates().await?;
        Ok(FEE_TARGETS
            .iter()
            .map(|target| {
                let rate = estimates.get(*target).copied().unwrap_or(1.0);
                (rate.ceil() as u64).max(1)
            })
            .collect())
    }

    /// (relative path, address) pairs owned by the account
    fn owned_addresses(&self) -> Vec<(String, String)> {
        let account = &self.ctx.account;
        if account.addresses.is_empty() {
            return vec![("0/0".to_string(), account.address.clone())];
        }
        account
            .addresses
            .iter()
            .map(|(path, address)| (path.clone(), address.clone()))
            .collect()
    }

    fn change_address(&self) -> String {
        self.ctx
            .account
            .addresses
            .get("1/0")
            .cloned()
            .unwrap_or_else(|| self.ctx.account.address.clone())
    }

    /// Confirmed UTXOs across every owned address
    async fn spendable_utxos(&self) -> Result<Vec<BtcInput>> {
        let owned = self.owned_addresses();
        let fetched = join_all(
            owned
                .iter()
                .map(|(_, address)| self.client.address_utxos(address)),
        )
        .await;

        let mut inputs = Vec::new();
        for ((path, address), utxos) in owned.iter().zip(fetched) {
            for utxo in utxos? {
                if !utxo.is_confirmed() {
                    continue;
                }
                inputs.push(BtcInput {
                    txid: utxo.txid,
                    vout: utxo.vout,
                    value: utxo.value,
                    address: address.clone(),
                    path: path.clone(),
                });
            }
        }
        log::debug!(
            "Found {} confirmed UTXO(s) for account {}",
            inputs.len(),
            self.ctx.account.id
        );
        Ok(inputs)
    }

    async fn build(&self, transfer: &TransferInfo, fee_rate: u64) -> Result<EncodedTxBtc> {
        parse_address(&transfer.to, self.network())?;
        let token = self.ctx.resolve_token(transfer.token.as_deref()).await?;
        self.ctx.check_min_transfer(transfer, &token)?;

        let utxos = self.spendable_utxos().await?;
        let selection = if transfer.is_max_send {
            builder::select_max(&utxos, fee_rate)?
        } else {
            let raw = amount::to_raw(&transfer.amount, token.decimals, false)?;
            let sats = u64::try_from(raw)
                .map_err(|_| VaultError::InvalidAmount(transfer.amount.clone()))?;
            builder::select_coins(&utxos, sats, fee_rate)?
        };

        log::info!(
            "Selected {} input(s), fee {} sats at {} sat/vB",
            selection.inputs.len(),
            selection.fee,
            fee_rate
        );
        Ok(builder::encode(
            selection,
            &transfer.to,
            &self.change_address(),
            fee_rate,
            transfer.clone(),
        ))
    }

    /// Canonical view of a transaction fetched from Esplora
    fn decode_history_tx(&self, tx: &EsploraTx, token: &Token) -> Result<DecodedTx> {
        let input_addresses: Vec<&str> = tx
            .vin
            .iter()
            .filter_map(|vin| vin.prevout.as_ref()?.scriptpubkey_address.as_deref())
            .collect();
        let sent = input_addresses.iter().any(|a| self.ctx.is_mine(a));
        let counterparty = input_addresses.first().copied().unwrap_or_default();

        let mut actions = Vec::new();
        for vout in &tx.vout {
            let Some(to) = vout.scriptpubkey_address.as_deref() else {
                continue;
            };
            if sent && !self.ctx.is_mine(to) {
                actions.push(self.ctx.transfer_action(
                    token,
                    &self.ctx.account.address,
                    to,
                    vout.value as u128,
                )?);
            } else if !sent && self.ctx.is_mine(to) {
                actions.push(self.ctx.transfer_action(token, counterparty, to, vout.value as u128)?);
            }
        }
        if actions.is_empty() && sent {
            // Every output is ours: consolidation or send-to-self
            let first = tx
                .vout
                .iter()
                .find_map(|v| Some((v.scriptpubkey_address.as_deref()?, v.value)));
            if let Some((to, value)) = first {
                actions.push(self.ctx.transfer_action(
                    token,
                    &self.ctx.account.address,
                    to,
                    value as u128,
                )?);
            }
        }
        if actions.is_empty() {
            actions.push(Action::unknown(if sent {
                ActionDirection::Out
            } else {
                ActionDirection::In
            }));
        }

        let created_at = tx
            .status
            .block_time
            .map(|t| t * 1000)
            .unwrap_or_else(crate::types::now_ms);
        let status = if tx.status.confirmed {
            TxStatus::Confirmed
        } else {
            TxStatus::Pending
        };
        Ok(DecodedTx {
            txid: tx.txid.clone(),
            owner: self.ctx.account.address.clone(),
            signer: counterparty.to_string(),
            nonce: 0,
            actions,
            status,
            network_id: self.ctx.network.id.clone(),
            account_id: self.ctx.account.id.clone(),
            total_fee_in_native: Some(amount::from_raw(tx.fee as u128, token.decimals)?),
            created_at,
            updated_at: created_at,
            is_final: status.is_final(),
            encoded_tx: None,
        })
    }
}

#[async_trait]
impl ChainVault for BtcVault {
    fn context(&self) -> &VaultContext {
        &self.ctx
    }

    fn validate_address(&self, address: &str) -> Result<String> {
        parse_address(address, self.network())?;
        Ok(address.to_string())
    }

    fn validate_imported_credential(&self, credential: &str) -> bool {
        self.settings().imported_account_enabled
            && parse_imported_credential(&self.ctx.network, credential).is_ok()
    }

    async fn build_encoded_tx_from_transfer(&self, transfer: &TransferInfo) -> Result<EncodedTx> {
        let fee_rate = self.fee_rates().await?[DEFAULT_PRESET];
        Ok(EncodedTx::Btc(self.build(transfer, fee_rate).await?))
    }

    async fn attach_fee_info_to_encoded_tx(
        &self,
        encoded: EncodedTx,
        fee: &FeeInfoUnit,
    ) -> Result<EncodedTx> {
        let current = self.encoded(&encoded)?;
        let fee_rate = Decimal::from_str(&fee.price)
            .ok()
            .and_then(|price| price.ceil().to_u64())
            .ok_or_else(|| VaultError::InvalidAmount(fee.price.clone()))?
            .max(1);
        if fee_rate == current.fee_rate {
            return Ok(encoded);
        }

        log::debug!("Re-selecting inputs at {} sat/vB", fee_rate);
        let transfer = current.transfer_info.clone();
        Ok(EncodedTx::Btc(self.build(&transfer, fee_rate).await?))
    }

    async fn update_encoded_tx(
        &self,
        encoded: EncodedTx,
        _payload: &EncodedTxUpdatePayload,
        _options: &EncodedTxUpdateOptions,
    ) -> Result<EncodedTx> {
        Ok(encoded)
    }

    async fn build_unsigned_tx_from_encoded_tx(&self, encoded: EncodedTx) -> Result<UnsignedTx> {
        let tx = self.encoded(&encoded)?;
        let digests = sighashes(tx, self.network())?;

        let sign_requests = tx
            .inputs
            .iter()
            .zip(digests)
            .map(|(input, digest)| SignRequest {
                path: join_path(&self.ctx.account.path, &input.path),
                curve: Curve::Secp256k1,
                message: digest.to_vec(),
            })
            .collect();
        let inputs = tx
            .inputs
            .iter()
            .map(|input| TxInput {
                address: input.address.clone(),
                value: input.value.to_string(),
            })
            .collect();
        let outputs = tx
            .outputs
            .iter()
            .map(|output| TxOutput {
                address: output.address.clone(),
                value: output.value.to_string(),
                is_change: output.is_change,
            })
            .collect();

        Ok(UnsignedTx {
            encoded_tx: encoded,
            inputs,
            outputs,
            sign_requests,
            fee_payer: None,
        })
    }

    async fn decode_tx(&self, encoded: &EncodedTx, context: &DecodeContext) -> Result<DecodedTx> {
        let tx = self.encoded(encoded)?;
        let token = self.ctx.resolve_token(None).await?;

        let mut actions = Vec::new();
        for output in tx.outputs.iter().filter(|o| !o.is_change) {
            actions.push(self.ctx.transfer_action(
                &token,
                &self.ctx.account.address,
                &output.address,
                output.value as u128,
            )?);
        }
        if actions.is_empty() {
            actions.push(Action::unknown(ActionDirection::Out));
        }

        let actions = apply_decode_context(&self.ctx, actions, context);
        let mut decoded = self.ctx.pending_decoded_tx(actions, encoded);
        decoded.total_fee_in_native = Some(amount::from_raw(tx.total_fee as u128, token.decimals)?);
        Ok(decoded)
    }

    async fn fetch_fee_info(&self, encoded: &EncodedTx) -> Result<FeeInfo> {
        let tx = self.encoded(encoded)?;
        let rates = self.fee_rates().await?;
        let network = &self.ctx.network;

        Ok(FeeInfo {
            limit: estimate_vsize(tx.inputs.len(), tx.outputs.len()).to_string(),
            prices: rates.iter().map(u64::to_string).collect(),
            default_preset_index: DEFAULT_PRESET,
            fee_symbol: network.fee_symbol.clone(),
            fee_decimals: network.fee_decimals,
            native_symbol: network.symbol.clone(),
            native_decimals: network.decimals,
            custom_disabled: !self.settings().fee_info_editable,
            tx: None,
        })
    }

    async fn broadcast_transaction(&self, signed: SignedTx) -> Result<SignedTx> {
        let client: &dyn EsploraApi = self.client.as_ref();
        let raw = signed.raw_tx.as_str();

        let txid = broadcast_with_retry(
            &self.ctx.config.retry_policy(),
            move |_| client.broadcast(raw),
            never_retry,
        )
        .await?;
        log::info!("✅ Bitcoin transaction broadcast: {}", txid);

        if let Some(EncodedTx::Btc(tx)) = &signed.encoded_tx {
            for input in &tx.inputs {
                client.invalidate_address(&input.address);
            }
        }
        Ok(SignedTx { txid, ..signed })
    }

    async fn fetch_on_chain_history(&self, options: &HistoryOptions) -> Result<Vec<HistoryTx>> {
        let token = self.ctx.resolve_token(None).await?;
        let addresses = self.ctx.account.all_addresses();
        let fetched = join_all(addresses.iter().map(|a| self.client.address_txs(a))).await;

        let mut seen = HashSet::new();
        let mut records = Vec::new();
        for txs in fetched {
            for tx in txs? {
                if !seen.insert(tx.txid.clone()) {
                    continue;
                }
                records.push(OnChainRecord {
                    txid: tx.txid.clone(),
                    block_time_ms: tx.status.block_time.map(|t| t * 1000),
                    status: if tx.status.confirmed {
                        TxStatus::Confirmed
                    } else {
                        TxStatus::Pending
                    },
                    fee_in_native: amount::from_raw(tx.fee as u128, token.decimals).ok(),
                    native: tx,
                });
            }
        }

        let token = &token;
        Ok(reconcile_history(
            &self.ctx.account.id,
            records,
            &options.local_history,
            move |tx: EsploraTx| async move { self.decode_history_tx(&tx, token) },
            &nft_supplements(&self.ctx, &options.nft_transfers),
        )
        .await)
    }

    async fn get_balances(&self, requests: &[BalanceRequest]) -> Vec<Option<u128>> {
        let lookups = requests.iter().map(move |request| async move {
            if request.token_address.as_deref().is_some_and(|t| !t.is_empty()) {
                return None;
            }
            let addresses = if request.address == self.ctx.account.address {
                self.ctx.account.all_addresses()
            } else {
                vec![request.address.clone()]
            };

            let mut total = 0u128;
            for address in &addresses {
                match self.client.address_balance(address).await {
                    Ok(balance) => total += balance.total() as u128,
                    Err(e) => {
                        log::warn!("⚠️ Balance lookup failed for {}: {}", address, e);
                        return None;
                    }
                }
            }
            Some(total)
        });
        join_all(lookups).await
    }

    async fn get_exported_credential(&self, password: &str) -> Result<String> {
        let secret = self.ctx.exported_secret(password).await?;
        match secret.len() {
            78 => Ok(Xpriv::decode(&secret).map_err(VaultError::encoding)?.to_string()),
            32 => {
                let key =
                    bitcoin::secp256k1::SecretKey::from_slice(&secret).map_err(VaultError::encoding)?;
                Ok(bitcoin::PrivateKey::new(key, self.network()).to_wif())
            }
            n => Err(VaultError::internal(format!("unexpected secret length {}", n))),
        }
    }

    async fn get_transaction_statuses(&self, txids: &[String]) -> Vec<Option<TxStatus>> {
        let lookups = txids.iter().map(move |txid| async move {
            match self.client.transaction(txid).await {
                Ok(tx) if tx.status.confirmed => Some(TxStatus::Confirmed),
                Ok(_) => Some(TxStatus::Pending),
                Err(ClientError::Status { status: 404, .. }) => None,
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
        let latest_block = self.client.tip_height().await?;
        Ok(EndpointStatus {
            response_time_ms: start.elapsed().as_millis() as u64,
            latest_block,
        })
    }
}
