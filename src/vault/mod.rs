//! The uniform vault contract
//!
//! [`ChainVault`] is the transaction lifecycle every chain implements:
//! intent to encoded transaction, fee attachment, signer-ready unsigned
//! transaction, broadcast, and history. [`Vault`] is the closed set of chain
//! implementations, selected by network id in the factory.

pub mod broadcast;
pub mod history;
pub mod settings;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::chains::btc::BtcVault;
use crate::chains::sol::SolVault;
use crate::chains::xrp::XrpVault;
use crate::config::VaultConfig;
use crate::error::VaultError;
use crate::keyring::{crypto, Keyring, SignOptions};
use crate::network::NetworkDescriptor;
use crate::registry::TokenRegistry;
use crate::types::{
    Account, Action, ActionDirection, ActionKind, ApproveInfo, BalanceRequest, DecodeContext,
    DecodedTx, EncodedTx, EncodedTxUpdateOptions, EncodedTxUpdatePayload, EndpointStatus, FeeInfo,
    FeeInfoUnit, HistoryOptions, HistoryTx, NftTransferRecord, SignedTx, Token, TransferAction, TransferInfo,
    TxStatus, UnsignedTx,
};
use crate::{amount, Result};

pub use settings::VaultSettings;

/// Everything a vault shares with the surrounding engine
#[derive(Clone)]
pub struct VaultContext {
    pub network: NetworkDescriptor,
    pub account: Account,
    pub keyring: Arc<Keyring>,
    pub tokens: Arc<dyn TokenRegistry>,
    pub config: Arc<VaultConfig>,
}

impl VaultContext {
    pub fn settings(&self) -> VaultSettings {
        VaultSettings::for_chain(self.network.impl_)
    }

    /// Resolve a transfer's token; `None` or an empty id is the native asset
    pub async fn resolve_token(&self, token: Option<&str>) -> Result<Token> {
        match token {
            None | Some("") => self.tokens.get_native_token_info(&self.network.id).await,
            Some(_) if !self.settings().token_enabled => Err(VaultError::not_implemented(
                format!("token transfers on {}", self.network.id),
            )),
            Some(address) => self
                .tokens
                .ensure_token_in_db(&self.network.id, address)
                .await
                .ok_or_else(|| VaultError::TokenNotFound(address.to_string())),
        }
    }

    /// Native transfers must reach the chain minimum; max-send is exempt
    pub fn check_min_transfer(&self, transfer: &TransferInfo, token: &Token) -> Result<()> {
        if !token.is_native || transfer.is_max_send {
            return Ok(());
        }
        let minimum = self.settings().min_transfer_amount;
        let min_raw = amount::to_raw(minimum, token.decimals, true)?;
        if amount::to_raw(&transfer.amount, token.decimals, false)? < min_raw {
            return Err(VaultError::InvalidAmount(format!(
                "{} is below the minimum transfer of {} {}",
                transfer.amount, minimum, token.symbol
            )));
        }
        Ok(())
    }

    pub fn is_mine(&self, address: &str) -> bool {
        self.account.is_mine(address)
    }

    /// `SELF` when both ends are ours, `OUT` when we send, `IN` otherwise
    pub fn direction(&self, from: &str, to: &str) -> ActionDirection {
        let from_mine = self.is_mine(from);
        if from_mine && self.is_mine(to) {
            ActionDirection::SelfTransfer
        } else if from_mine {
            ActionDirection::Out
        } else {
            ActionDirection::In
        }
    }

    /// Transfer action with both the human and raw amount
    pub fn transfer_action(&self, token: &Token, from: &str, to: &str, raw: u128) -> Result<Action> {
        let transfer = TransferAction {
            token_info: token.clone(),
            from: from.to_string(),
            to: to.to_string(),
            amount: amount::from_raw(raw, token.decimals)?,
            amount_value: raw.to_string(),
        };
        let kind = if token.is_native {
            ActionKind::NativeTransfer(transfer)
        } else {
            ActionKind::TokenTransfer(transfer)
        };
        Ok(Action {
            kind,
            direction: self.direction(from, to),
        })
    }

    /// Decoded shell for a transaction built by this account
    pub fn pending_decoded_tx(&self, actions: Vec<Action>, encoded: &EncodedTx) -> DecodedTx {
        let now = crate::types::now_ms();
        DecodedTx {
            txid: String::new(),
            owner: self.account.address.clone(),
            signer: self.account.address.clone(),
            nonce: 0,
            actions,
            status: TxStatus::Pending,
            network_id: self.network.id.clone(),
            account_id: self.account.id.clone(),
            total_fee_in_native: None,
            created_at: now,
            updated_at: now,
            is_final: false,
            encoded_tx: Some(encoded.clone()),
        }
    }

    /// Decrypted account secret, software keyrings only
    pub async fn exported_secret(&self, password: &str) -> Result<Vec<u8>> {
        if !self.keyring.supports_export() || !self.settings().private_key_export_enabled {
            return Err(VaultError::internal(format!(
                "{} accounts cannot export credentials",
                self.keyring.kind_name()
            )));
        }

        let sealed = self
            .keyring
            .get_private_keys(password, std::slice::from_ref(&self.account))
            .await?;
        let secret = sealed
            .get(&self.account.id)
            .ok_or_else(|| VaultError::internal(format!("no key for account {}", self.account.id)))?;
        crypto::decrypt(password, secret)
    }
}

/// Replace derived actions with caller-supplied ones where the context says so
pub fn apply_decode_context(
    ctx: &VaultContext,
    actions: Vec<Action>,
    context: &DecodeContext,
) -> Vec<Action> {
    match context {
        DecodeContext::Default => actions,
        DecodeContext::InternalSwap(info) => vec![Action {
            kind: ActionKind::InternalSwap(info.clone()),
            direction: ActionDirection::Out,
        }],
        DecodeContext::NftTransfer(infos) => infos
            .iter()
            .map(|info| Action {
                kind: ActionKind::NftTransfer(info.clone()),
                direction: ctx.direction(&info.from, &info.to),
            })
            .collect(),
    }
}

/// NFT actions from a separate history source, grouped by txid
pub fn nft_supplements(
    ctx: &VaultContext,
    records: &[NftTransferRecord],
) -> HashMap<String, Vec<Action>> {
    let mut supplements: HashMap<String, Vec<Action>> = HashMap::new();
    for record in records {
        supplements
            .entry(record.txid.clone())
            .or_default()
            .push(Action {
                kind: ActionKind::NftTransfer(record.info.clone()),
                direction: ctx.direction(&record.info.from, &record.info.to),
            });
    }
    supplements
}

#[async_trait]
pub trait ChainVault: Send + Sync {
    fn context(&self) -> &VaultContext;

    fn settings(&self) -> VaultSettings {
        self.context().settings()
    }

    /// Returns the address unchanged when valid
    fn validate_address(&self, address: &str) -> Result<String>;

    /// Structural check only; never fails
    fn validate_imported_credential(&self, credential: &str) -> bool;

    fn validate_watching_credential(&self, address: &str) -> bool {
        self.settings().watching_account_enabled && self.validate_address(address).is_ok()
    }

    async fn build_encoded_tx_from_transfer(&self, transfer: &TransferInfo) -> Result<EncodedTx>;

    async fn build_encoded_tx_from_batch_transfer(
        &self,
        _transfers: &[TransferInfo],
    ) -> Result<EncodedTx> {
        Err(VaultError::not_implemented(format!(
            "batch transfer on {}",
            self.context().network.id
        )))
    }

    async fn build_encoded_tx_from_approve(&self, _approve: &ApproveInfo) -> Result<EncodedTx> {
        Err(VaultError::not_implemented(format!(
            "token approval on {}",
            self.context().network.id
        )))
    }

    async fn update_encoded_tx_token_approve(
        &self,
        _encoded: EncodedTx,
        _amount: &str,
    ) -> Result<EncodedTx> {
        Err(VaultError::not_implemented(format!(
            "token approval on {}",
            self.context().network.id
        )))
    }

    async fn attach_fee_info_to_encoded_tx(
        &self,
        encoded: EncodedTx,
        _fee: &FeeInfoUnit,
    ) -> Result<EncodedTx> {
        Ok(encoded)
    }

    async fn update_encoded_tx(
        &self,
        encoded: EncodedTx,
        payload: &EncodedTxUpdatePayload,
        options: &EncodedTxUpdateOptions,
    ) -> Result<EncodedTx>;

    async fn build_unsigned_tx_from_encoded_tx(&self, encoded: EncodedTx) -> Result<UnsignedTx>;

    async fn decode_tx(&self, encoded: &EncodedTx, context: &DecodeContext) -> Result<DecodedTx>;

    async fn fetch_fee_info(&self, encoded: &EncodedTx) -> Result<FeeInfo>;

    async fn broadcast_transaction(&self, signed: SignedTx) -> Result<SignedTx>;

    async fn fetch_on_chain_history(&self, options: &HistoryOptions) -> Result<Vec<HistoryTx>>;

    /// One entry per request, in request order; failed lookups are `None`
    async fn get_balances(&self, requests: &[BalanceRequest]) -> Vec<Option<u128>>;

    async fn get_exported_credential(&self, password: &str) -> Result<String>;

    /// Status per txid, in order; `None` when the chain does not know the txid
    async fn get_transaction_statuses(&self, txids: &[String]) -> Vec<Option<TxStatus>>;

    async fn get_client_endpoint_status(&self) -> Result<EndpointStatus>;
}

pub enum Vault {
    Btc(BtcVault),
    Sol(SolVault),
    Xrp(XrpVault),
}

macro_rules! dispatch {
    ($self:ident, $vault:ident => $call:expr) => {
        match $self {
            Vault::Btc($vault) => $call,
            Vault::Sol($vault) => $call,
            Vault::Xrp($vault) => $call,
        }
    };
}

#[async_trait]
impl ChainVault for Vault {
    fn context(&self) -> &VaultContext {
        dispatch!(self, v => v.context())
    }

    fn validate_address(&self, address: &str) -> Result<String> {
        dispatch!(self, v => v.validate_address(address))
    }

    fn validate_imported_credential(&self, credential: &str) -> bool {
        dispatch!(self, v => v.validate_imported_credential(credential))
    }

    fn validate_watching_credential(&self, address: &str) -> bool {
        dispatch!(self, v => v.validate_watching_credential(address))
    }

    async fn build_encoded_tx_from_transfer(&self, transfer: &TransferInfo) -> Result<EncodedTx> {
        dispatch!(self, v => v.build_encoded_tx_from_transfer(transfer).await)
    }

    async fn build_encoded_tx_from_batch_transfer(
        &self,
        transfers: &[TransferInfo],
    ) -> Result<EncodedTx> {
        dispatch!(self, v => v.build_encoded_tx_from_batch_transfer(transfers).await)
    }

    async fn build_encoded_tx_from_approve(&self, approve: &ApproveInfo) -> Result<EncodedTx> {
        dispatch!(self, v => v.build_encoded_tx_from_approve(approve).await)
    }

    async fn update_encoded_tx_token_approve(
        &self,
        encoded: EncodedTx,
        amount: &str,
    ) -> Result<EncodedTx> {
        dispatch!(self, v => v.update_encoded_tx_token_approve(encoded, amount).await)
    }

    async fn attach_fee_info_to_encoded_tx(
        &self,
        encoded: EncodedTx,
        fee: &FeeInfoUnit,
    ) -> Result<EncodedTx> {
        dispatch!(self, v => v.attach_fee_info_to_encoded_tx(encoded, fee).await)
    }

    async fn update_encoded_tx(
        &self,
        encoded: EncodedTx,
        payload: &EncodedTxUpdatePayload,
        options: &EncodedTxUpdateOptions,
    ) -> Result<EncodedTx> {
        dispatch!(self, v => v.update_encoded_tx(encoded, payload, options).await)
    }

    async fn build_unsigned_tx_from_encoded_tx(&self, encoded: EncodedTx) -> Result<UnsignedTx> {
        dispatch!(self, v => v.build_unsigned_tx_from_encoded_tx(encoded).await)
    }

    async fn decode_tx(&self, encoded: &EncodedTx, context: &DecodeContext) -> Result<DecodedTx> {
        dispatch!(self, v => v.decode_tx(encoded, context).await)
    }

    async fn fetch_fee_info(&self, encoded: &EncodedTx) -> Result<FeeInfo> {
        dispatch!(self, v => v.fetch_fee_info(encoded).await)
    }

    async fn broadcast_transaction(&self, signed: SignedTx) -> Result<SignedTx> {
        dispatch!(self, v => v.broadcast_transaction(signed).await)
    }

    async fn fetch_on_chain_history(&self, options: &HistoryOptions) -> Result<Vec<HistoryTx>> {
        dispatch!(self, v => v.fetch_on_chain_history(options).await)
    }

    async fn get_balances(&self, requests: &[BalanceRequest]) -> Vec<Option<u128>> {
        dispatch!(self, v => v.get_balances(requests).await)
    }

    async fn get_exported_credential(&self, password: &str) -> Result<String> {
        dispatch!(self, v => v.get_exported_credential(password).await)
    }

    async fn get_transaction_statuses(&self, txids: &[String]) -> Vec<Option<TxStatus>> {
        dispatch!(self, v => v.get_transaction_statuses(txids).await)
    }

    async fn get_client_endpoint_status(&self) -> Result<EndpointStatus> {
        dispatch!(self, v => v.get_client_endpoint_status().await)
    }
}

impl Vault {
    pub fn network(&self) -> &NetworkDescriptor {
        &self.context().network
    }

    pub fn account(&self) -> &Account {
        &self.context().account
    }

    /// Sign through the account's keyring
    pub async fn sign_transaction(
        &self,
        unsigned: &UnsignedTx,
        options: &SignOptions,
    ) -> Result<SignedTx> {
        self.context().keyring.sign_transaction(unsigned, options).await
    }

    pub async fn sign_and_broadcast(
        &self,
        unsigned: &UnsignedTx,
        options: &SignOptions,
    ) -> Result<SignedTx> {
        let signed = self.sign_transaction(unsigned, options).await?;
        log::info!("📡 Broadcasting {} transaction {}", self.network().id, signed.txid);
        self.broadcast_transaction(signed).await
    }
}
