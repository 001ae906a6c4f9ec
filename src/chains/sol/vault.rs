//! Solana vault
//!
//! Encoded transactions are legacy messages with a recent blockhash, paid by
//! the account itself. Token transfers go between associated token accounts;
//! the receiver's account is created in the same transaction when missing.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::future::join_all;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::{CompiledInstruction, Instruction};
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::{Transaction, VersionedTransaction};

use super::instructions::{self, parse_instruction, ParsedInstruction};
use super::{decode_transaction, encode_transaction};
use crate::amount;
use crate::chains::parse_imported_credential;
use crate::client::solana::ConfirmedTransaction;
use crate::client::SolanaRpc;
use crate::error::{ClientError, VaultError};
use crate::keyring::derivation::public_key_of;
use crate::types::{
    Action, ActionDirection, BalanceRequest, Curve, DecodeContext, DecodedTx, EncodedTx,
    EncodedTxUpdateOptions, EncodedTxUpdatePayload, EncodedTxUpdateType, EndpointStatus, FeeInfo,
    HistoryOptions, HistoryTx, SignRequest, SignedTx, TransferInfo, TxInput, TxOutput,
    TxStatus, UnsignedTx,
};
use crate::vault::broadcast::{broadcast_with_retry, Retry};
use crate::vault::history::{reconcile_history, OnChainRecord};
use crate::vault::{apply_decode_context, nft_supplements, ChainVault, VaultContext};
use crate::Result;

const HISTORY_LIMIT: usize = 50;
const LAMPORTS_PER_SIGNATURE: u64 = 5_000;

/// Node is behind
const RPC_NODE_UNHEALTHY: i64 = -32005;
/// Blockhash not found / preflight failure
const RPC_PREFLIGHT_FAILURE: i64 = -32002;

/// Retry "node behind" and "blockhash not found" under a lenient preflight commitment
pub fn classify_broadcast_error(err: &ClientError) -> Retry {
    match err.rpc_code() {
        Some(RPC_NODE_UNHEALTHY) | Some(RPC_PREFLIGHT_FAILURE) => Retry::Again { lenient: true },
        _ => Retry::Terminal,
    }
}

fn parse_pubkey(address: &str) -> Result<Pubkey> {
    Pubkey::from_str(address).map_err(|_| VaultError::InvalidAddress(address.to_string()))
}

pub struct SolVault {
    ctx: VaultContext,
    client: Arc<dyn SolanaRpc>,
}

impl SolVault {
    pub fn new(ctx: VaultContext, client: Arc<dyn SolanaRpc>) -> Self {
        Self { ctx, client }
    }

    fn owner(&self) -> Result<Pubkey> {
        parse_pubkey(&self.ctx.account.address)
    }

    fn transaction(&self, encoded: &EncodedTx) -> Result<Transaction> {
        match encoded {
            EncodedTx::Sol(tx) => decode_transaction(tx),
            _ => Err(VaultError::internal("expected a solana transaction")),
        }
    }

    async fn recent_blockhash(&self) -> Result<Hash> {
        let blockhash = self.client.latest_blockhash().await?;
        Hash::from_str(&blockhash).map_err(VaultError::encoding)
    }

    async fn seal(&self, ixs: &[Instruction]) -> Result<EncodedTx> {
        let payer = self.owner()?;
        let blockhash = self.recent_blockhash().await?;
        let message = Message::new_with_blockhash(ixs, Some(&payer), &blockhash);
        Ok(EncodedTx::Sol(encode_transaction(&Transaction::new_unsigned(message))?))
    }

    /// Re-stamp an encoded transaction with a fresh blockhash
    pub async fn refresh_recent_blockhash(&self, encoded: EncodedTx) -> Result<EncodedTx> {
        let mut tx = self.transaction(&encoded)?;
        tx.message.recent_blockhash = self.recent_blockhash().await?;
        Ok(EncodedTx::Sol(encode_transaction(&tx)?))
    }

    /// Instructions for one transfer; `created` tracks token accounts already
    /// being created earlier in the same transaction
    async fn transfer_instructions(
        &self,
        transfer: &TransferInfo,
        created: &mut HashSet<Pubkey>,
    ) -> Result<Vec<Instruction>> {
        let from = self.owner()?;
        let to = parse_pubkey(&transfer.to)?;
        let token = self.ctx.resolve_token(transfer.token.as_deref()).await?;
        self.ctx.check_min_transfer(transfer, &token)?;
        let raw = amount::to_raw(&transfer.amount, token.decimals, transfer.is_max_send)?;
        let raw =
            u64::try_from(raw).map_err(|_| VaultError::InvalidAmount(transfer.amount.clone()))?;

        if token.is_native {
            return Ok(vec![instructions::system_transfer(&from, &to, raw)]);
        }

        let mint = parse_pubkey(&token.token_id_on_network)?;
        let source = instructions::associated_token_address(&from, &mint);
        let mut ixs = Vec::new();

        let destination = if to.is_on_curve() {
            let destination = instructions::associated_token_address(&to, &mint);
            let exists = self
                .client
                .account_info(&destination.to_string())
                .await?
                .is_some();
            if !exists && created.insert(destination) {
                log::debug!("Creating associated token account {} for {}", destination, to);
                ixs.push(instructions::create_associated_token_account(&from, &to, &mint));
            }
            destination
        } else {
            // Off-curve receivers are token accounts already
            to
        };

        let decimals = u8::try_from(token.decimals).map_err(|_| {
            VaultError::internal(format!("token {} decimals out of range", token.id))
        })?;
        ixs.push(instructions::transfer_checked(
            &source,
            &mint,
            &destination,
            &from,
            raw,
            decimals,
        ));
        Ok(ixs)
    }

    /// Walk instructions in order and turn the recognized ones into actions
    async fn decode_instructions(
        &self,
        keys: &[Pubkey],
        compiled: &[CompiledInstruction],
    ) -> Result<Vec<Action>> {
        let mut created: HashMap<Pubkey, (Pubkey, Pubkey)> = HashMap::new();
        let mut actions = Vec::new();
        let native = self.ctx.resolve_token(None).await?;

        for ix in compiled {
            match parse_instruction(keys, ix) {
                ParsedInstruction::CreateAssociatedAccount {
                    account,
                    owner,
                    mint,
                    ..
                } => {
                    created.insert(account, (owner, mint));
                }
                ParsedInstruction::SystemTransfer { from, to, lamports } => {
                    actions.push(self.ctx.transfer_action(
                        &native,
                        &from.to_string(),
                        &to.to_string(),
                        lamports as u128,
                    )?);
                }
                ParsedInstruction::TokenTransfer {
                    source,
                    destination,
                    authority,
                    mint,
                    amount,
                } => {
                    let (owner, mint) = self
                        .token_destination(&created, &source, &destination, mint)
                        .await?;
                    let Some(mint) = mint else {
                        log::debug!("Skipping token transfer with unresolved mint");
                        continue;
                    };
                    let Some(token) = self
                        .ctx
                        .tokens
                        .ensure_token_in_db(&self.ctx.network.id, &mint.to_string())
                        .await
                    else {
                        log::debug!("Skipping transfer of unknown token {}", mint);
                        continue;
                    };
                    actions.push(self.ctx.transfer_action(
                        &token,
                        &authority.to_string(),
                        &owner.to_string(),
                        amount as u128,
                    )?);
                }
                ParsedInstruction::Unknown => {}
            }
        }

        if actions.is_empty() {
            let payer_is_mine = keys
                .first()
                .is_some_and(|payer| self.ctx.is_mine(&payer.to_string()));
            actions.push(Action::unknown(if payer_is_mine {
                ActionDirection::Out
            } else {
                ActionDirection::In
            }));
        }
        Ok(actions)
    }

    /// Owner of a transfer's destination token account, and the mint
    ///
    /// Accounts created earlier in the same transaction resolve from `created`
    /// without an RPC lookup.
    async fn token_destination(
        &self,
        created: &HashMap<Pubkey, (Pubkey, Pubkey)>,
        source: &Pubkey,
        destination: &Pubkey,
        mint: Option<Pubkey>,
    ) -> Result<(Pubkey, Option<Pubkey>)> {
        if let Some((owner, created_mint)) = created.get(destination) {
            return Ok((*owner, mint.or(Some(*created_mint))));
        }

        let info = self.client.account_info(&destination.to_string()).await?;
        let token = info.and_then(|info| info.token);
        let owner = token
            .as_ref()
            .and_then(|t| Pubkey::from_str(&t.owner).ok())
            .unwrap_or(*destination);
        let mut mint =
            mint.or_else(|| token.as_ref().and_then(|t| Pubkey::from_str(&t.mint).ok()));

        if mint.is_none() {
            let source_info = self.client.account_info(&source.to_string()).await?;
            mint = source_info
                .and_then(|info| info.token)
                .and_then(|t| Pubkey::from_str(&t.mint).ok());
        }
        Ok((owner, mint))
    }

    async fn decode_confirmed(
        &self,
        txid: &str,
        confirmed: Option<ConfirmedTransaction>,
    ) -> Result<DecodedTx> {
        let confirmed =
            confirmed.ok_or_else(|| VaultError::internal(format!("transaction {} not found", txid)))?;
        let tx: VersionedTransaction =
            bincode::deserialize(&confirmed.raw).map_err(VaultError::encoding)?;
        let keys = tx.message.static_account_keys();
        let actions = self.decode_instructions(keys, tx.message.instructions()).await?;

        let native = self.ctx.resolve_token(None).await?;
        let status = if confirmed.err.is_some() {
            TxStatus::Failed
        } else {
            TxStatus::Confirmed
        };
        let created_at = confirmed
            .block_time
            .map(|t| t * 1000)
            .unwrap_or_else(crate::types::now_ms);
        Ok(DecodedTx {
            txid: txid.to_string(),
            owner: self.ctx.account.address.clone(),
            signer: keys.first().map(|k| k.to_string()).unwrap_or_default(),
            nonce: 0,
            actions,
            status,
            network_id: self.ctx.network.id.clone(),
            account_id: self.ctx.account.id.clone(),
            total_fee_in_native: Some(amount::from_raw(confirmed.fee as u128, native.decimals)?),
            created_at,
            updated_at: created_at,
            is_final: status.is_final(),
            encoded_tx: None,
        })
    }
}

#[async_trait]
impl ChainVault for SolVault {
    fn context(&self) -> &VaultContext {
        &self.ctx
    }

    fn validate_address(&self, address: &str) -> Result<String> {
        parse_pubkey(address)?;
        Ok(address.to_string())
    }

    fn validate_imported_credential(&self, credential: &str) -> bool {
        self.settings().imported_account_enabled
            && parse_imported_credential(&self.ctx.network, credential).is_ok()
    }

    async fn build_encoded_tx_from_transfer(&self, transfer: &TransferInfo) -> Result<EncodedTx> {
        let ixs = self
            .transfer_instructions(transfer, &mut HashSet::new())
            .await?;
        self.seal(&ixs).await
    }

    async fn build_encoded_tx_from_batch_transfer(
        &self,
        transfers: &[TransferInfo],
    ) -> Result<EncodedTx> {
        let Some(first) = transfers.first() else {
            return Err(VaultError::internal("batch transfer needs at least one transfer"));
        };
        if transfers.iter().any(|t| t.to != first.to) {
            return Err(VaultError::internal("batch transfers must share one receiver"));
        }

        let mut created = HashSet::new();
        let mut ixs = Vec::new();
        for transfer in transfers {
            ixs.extend(self.transfer_instructions(transfer, &mut created).await?);
        }
        log::info!("Built batch of {} transfer(s) to {}", transfers.len(), first.to);
        self.seal(&ixs).await
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

        let mut tx = self.transaction(&encoded)?;
        // Token and batch transfers keep their amounts
        let [ix] = tx.message.instructions.as_mut_slice() else {
            return Ok(encoded);
        };
        if !matches!(
            parse_instruction(&tx.message.account_keys, ix),
            ParsedInstruction::SystemTransfer { .. }
        ) {
            return Ok(encoded);
        }

        let native = self.ctx.resolve_token(None).await?;
        let lamports = amount::to_raw(&payload.amount, native.decimals, false)?;
        let lamports =
            u64::try_from(lamports).map_err(|_| VaultError::InvalidAmount(payload.amount.clone()))?;
        ix.data = instructions::system_transfer_data(lamports);

        Ok(EncodedTx::Sol(encode_transaction(&tx)?))
    }

    async fn build_unsigned_tx_from_encoded_tx(&self, encoded: EncodedTx) -> Result<UnsignedTx> {
        let tx = self.transaction(&encoded)?;
        let keys = &tx.message.account_keys;
        let fee_payer = keys
            .first()
            .ok_or_else(|| VaultError::internal("transaction without fee payer"))?;

        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        for ix in &tx.message.instructions {
            let (from, to, value) = match parse_instruction(keys, ix) {
                ParsedInstruction::SystemTransfer { from, to, lamports } => (from, to, lamports),
                ParsedInstruction::TokenTransfer {
                    authority,
                    destination,
                    amount,
                    ..
                } => (authority, destination, amount),
                _ => continue,
            };
            inputs.push(TxInput {
                address: from.to_string(),
                value: value.to_string(),
            });
            outputs.push(TxOutput {
                address: to.to_string(),
                value: value.to_string(),
                is_change: false,
            });
        }

        Ok(UnsignedTx {
            sign_requests: vec![SignRequest {
                path: self.ctx.account.path.clone(),
                curve: Curve::Ed25519,
                message: tx.message_data(),
            }],
            fee_payer: Some(fee_payer.to_string()),
            inputs,
            outputs,
            encoded_tx: encoded,
        })
    }

    async fn decode_tx(&self, encoded: &EncodedTx, context: &DecodeContext) -> Result<DecodedTx> {
        let tx = self.transaction(encoded)?;
        let actions = self
            .decode_instructions(&tx.message.account_keys, &tx.message.instructions)
            .await?;
        let actions = apply_decode_context(&self.ctx, actions, context);

        let mut decoded = self.ctx.pending_decoded_tx(actions, encoded);
        if let Some(payer) = tx.message.account_keys.first() {
            decoded.signer = payer.to_string();
        }
        Ok(decoded)
    }

    async fn fetch_fee_info(&self, encoded: &EncodedTx) -> Result<FeeInfo> {
        let tx = self.transaction(encoded)?;
        let signatures = tx.message.header.num_required_signatures as u64;
        let fee = match self.client.fee_for_message(&tx.message_data()).await? {
            Some(fee) => fee,
            None => {
                log::warn!("⚠️ Fee unavailable for message, assuming base fee");
                LAMPORTS_PER_SIGNATURE * signatures
            }
        };
        let network = &self.ctx.network;

        Ok(FeeInfo {
            limit: fee.to_string(),
            prices: vec!["1".to_string()],
            default_preset_index: 0,
            fee_symbol: network.fee_symbol.clone(),
            fee_decimals: network.fee_decimals,
            native_symbol: network.symbol.clone(),
            native_decimals: network.decimals,
            custom_disabled: !self.settings().fee_info_editable,
            tx: None,
        })
    }

    async fn broadcast_transaction(&self, signed: SignedTx) -> Result<SignedTx> {
        let raw = bs58::decode(&signed.raw_tx)
            .into_vec()
            .map_err(VaultError::encoding)?;
        let client: &dyn SolanaRpc = self.client.as_ref();
        let raw = raw.as_slice();

        let signature = broadcast_with_retry(
            &self.ctx.config.retry_policy(),
            move |lenient| client.send_transaction(raw, lenient.then_some("confirmed")),
            classify_broadcast_error,
        )
        .await?;
        log::info!("✅ Solana transaction broadcast: {}", signature);

        Ok(SignedTx {
            txid: signature,
            ..signed
        })
    }

    async fn fetch_on_chain_history(&self, options: &HistoryOptions) -> Result<Vec<HistoryTx>> {
        let owner = self.owner()?;
        let address = match options.token_id.as_deref() {
            Some(mint) if !mint.is_empty() => {
                instructions::associated_token_address(&owner, &parse_pubkey(mint)?).to_string()
            }
            _ => owner.to_string(),
        };
        let signatures = self
            .client
            .signatures_for_address(&address, HISTORY_LIMIT)
            .await?;

        let finals: HashSet<&str> = options
            .local_history
            .iter()
            .filter(|h| h.decoded_tx.is_final)
            .map(|h| h.decoded_tx.txid.as_str())
            .collect();
        let finals = &finals;
        let fetches = signatures.iter().map(move |info| async move {
            if finals.contains(info.signature.as_str()) {
                return None;
            }
            match self.client.transaction(&info.signature).await {
                Ok(tx) => tx,
                Err(e) => {
                    log::warn!("⚠️ Could not fetch transaction {}: {}", info.signature, e);
                    None
                }
            }
        });
        let fetched = join_all(fetches).await;

        let native = self.ctx.resolve_token(None).await?;
        let records = signatures
            .iter()
            .zip(fetched)
            .map(|(info, tx)| OnChainRecord {
                txid: info.signature.clone(),
                block_time_ms: info.block_time.map(|t| t * 1000),
                status: if info.err.is_some() {
                    TxStatus::Failed
                } else {
                    TxStatus::Confirmed
                },
                fee_in_native: tx
                    .as_ref()
                    .and_then(|tx| amount::from_raw(tx.fee as u128, native.decimals).ok()),
                native: (info.signature.clone(), tx),
            })
            .collect();

        Ok(reconcile_history(
            &self.ctx.account.id,
            records,
            &options.local_history,
            move |(txid, tx): (String, Option<ConfirmedTransaction>)| async move {
                self.decode_confirmed(&txid, tx).await
            },
            &nft_supplements(&self.ctx, &options.nft_transfers),
        )
        .await)
    }

    async fn get_balances(&self, requests: &[BalanceRequest]) -> Vec<Option<u128>> {
        let lookups = requests.iter().map(move |request| async move {
            let result = match request.token_address.as_deref() {
                Some(mint) if !mint.is_empty() => {
                    self.client.token_balance(&request.address, mint).await
                }
                _ => self.client.balance(&request.address).await,
            };
            match result {
                Ok(balance) => Some(balance as u128),
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
        let mut keypair = secret.clone();
        keypair.extend(public_key_of(Curve::Ed25519, &secret)?);
        Ok(bs58::encode(keypair).into_string())
    }

    async fn get_transaction_statuses(&self, txids: &[String]) -> Vec<Option<TxStatus>> {
        match self.client.signature_statuses(txids).await {
            Ok(statuses) => (0..txids.len())
                .map(|i| {
                    let status = statuses.get(i)?.as_ref()?;
                    Some(if status.err.is_some() {
                        TxStatus::Failed
                    } else {
                        match status.confirmation_status.as_deref() {
                            Some("confirmed") | Some("finalized") => TxStatus::Confirmed,
                            _ => TxStatus::Pending,
                        }
                    })
                })
                .collect(),
            Err(e) => {
                log::warn!("⚠️ Signature status lookup failed: {}", e);
                vec![Some(TxStatus::Pending); txids.len()]
            }
        }
    }

    async fn get_client_endpoint_status(&self) -> Result<EndpointStatus> {
        let start = Instant::now();
        let latest_block = self.client.slot().await?;
        Ok(EndpointStatus {
            response_time_ms: start.elapsed().as_millis() as u64,
            latest_block,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_classifier() {
        let rpc = |code| ClientError::Rpc {
            code,
            message: "x".to_string(),
            data: None,
        };
        assert_eq!(classify_broadcast_error(&rpc(-32005)), Retry::Again { lenient: true });
        assert_eq!(classify_broadcast_error(&rpc(-32002)), Retry::Again { lenient: true });
        assert_eq!(classify_broadcast_error(&rpc(-32003)), Retry::Terminal);
        assert_eq!(
            classify_broadcast_error(&ClientError::Transport("reset".to_string())),
            Retry::Terminal
        );
    }
}
