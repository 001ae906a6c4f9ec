//! Chain-agnostic data model shared by vaults, keyrings and the reconciler

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ============================================================================
// Accounts & tokens
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Simple,
    Utxo,
}

/// A derived or imported address on one network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub name: String,
    pub kind: AccountKind,
    /// Derivation path (account-level for UTXO accounts)
    pub path: String,
    pub coin_type: u32,
    /// Hex-encoded public key of `path`
    pub public_key: String,
    pub address: String,
    /// Account-level extended public key (UTXO accounts only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpub: Option<String>,
    /// Relative path (`"0/0"`) to address (UTXO accounts only)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub addresses: BTreeMap<String, String>,
}

impl Account {
    /// True if `address` belongs to this account
    pub fn is_mine(&self, address: &str) -> bool {
        self.address == address || self.addresses.values().any(|a| a == address)
    }

    /// Relative derivation path of an owned UTXO address
    pub fn relative_path_of(&self, address: &str) -> Option<&str> {
        self.addresses
            .iter()
            .find(|(_, a)| a.as_str() == address)
            .map(|(path, _)| path.as_str())
    }

    /// Every address owned by the account, primary first
    pub fn all_addresses(&self) -> Vec<String> {
        let mut all = vec![self.address.clone()];
        for address in self.addresses.values() {
            if !all.contains(address) {
                all.push(address.clone());
            }
        }
        all
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub id: String,
    pub network_id: String,
    /// Contract / mint address; empty for the native asset
    pub token_id_on_network: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u32,
    pub is_native: bool,
}

// ============================================================================
// User intents
// ============================================================================

/// User transfer intent, consumed once per build
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferInfo {
    pub from: String,
    pub to: String,
    /// Human decimal amount
    pub amount: String,
    /// Token id on network; `None` for the native asset
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub is_max_send: bool,
    /// XRP destination tag
    #[serde(default)]
    pub destination_tag: Option<u32>,
}

/// Token approval intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveInfo {
    pub from: String,
    pub token: String,
    pub amount: String,
    pub spender: String,
}

// ============================================================================
// Encoded / unsigned / signed transactions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BtcInput {
    pub txid: String,
    pub vout: u32,
    pub value: u64,
    pub address: String,
    /// Path relative to the account (`"0/3"`)
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BtcOutput {
    pub address: String,
    pub value: u64,
    pub is_change: bool,
}

/// Selected inputs and outputs of an unsigned P2WPKH transaction (satoshis)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedTxBtc {
    pub inputs: Vec<BtcInput>,
    pub outputs: Vec<BtcOutput>,
    /// sat/vB
    pub fee_rate: u64,
    pub total_fee: u64,
    pub total_spent: u64,
    pub transfer_info: TransferInfo,
}

/// rippled JSON shape of an autofilled Payment (amounts in drops)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EncodedTxXrp {
    pub transaction_type: String,
    pub account: String,
    pub destination: String,
    pub amount: String,
    pub fee: String,
    pub sequence: u32,
    pub last_ledger_sequence: u32,
    #[serde(default)]
    pub flags: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_tag: Option<u32>,
}

/// Chain-native unsigned transaction, opaque outside its vault
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "chain", content = "tx", rename_all = "lowercase")]
pub enum EncodedTx {
    Btc(EncodedTxBtc),
    /// Base58 of the bincode-serialized unsigned transaction
    Sol(String),
    Xrp(EncodedTxXrp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Curve {
    Secp256k1,
    Ed25519,
}

/// One payload the credential provider must sign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignRequest {
    /// Full derivation path of the signing key
    pub path: String,
    pub curve: Curve,
    /// 32-byte digest for secp256k1, full message bytes for ed25519
    #[serde(with = "hex_bytes")]
    pub message: Vec<u8>,
}

/// Signature produced for a [`SignRequest`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureOutput {
    /// DER for secp256k1, 64 raw bytes for ed25519
    pub signature: Vec<u8>,
    /// Compressed secp256k1 or raw ed25519 public key
    pub public_key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxInput {
    pub address: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxOutput {
    pub address: String,
    pub value: String,
    pub is_change: bool,
}

/// Signer-ready transaction: flattened inputs/outputs plus ordered sign requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedTx {
    pub encoded_tx: EncodedTx,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub sign_requests: Vec<SignRequest>,
    #[serde(default)]
    pub fee_payer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTx {
    pub txid: String,
    /// Hex for BTC/XRP, base58 for Solana
    pub raw_tx: String,
    #[serde(default)]
    pub encoded_tx: Option<EncodedTx>,
}

// ============================================================================
// Decoded transactions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TxStatus {
    pub fn is_final(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Status only moves forward, from Pending to a terminal state
    pub fn can_transition_to(self, next: TxStatus) -> bool {
        self == next || (self == Self::Pending && next.is_final())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionDirection {
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "OUT")]
    Out,
    #[serde(rename = "SELF")]
    SelfTransfer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferAction {
    pub token_info: Token,
    pub from: String,
    pub to: String,
    /// Human decimal amount
    pub amount: String,
    /// Raw integer amount
    pub amount_value: String,
}

/// NFT movement, supplied by the caller or a separate history source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftInfo {
    /// Mint / contract address of the asset
    pub asset: String,
    pub amount: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapSide {
    pub token: Token,
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapInfo {
    pub send: SwapSide,
    pub receive: SwapSide,
    pub account_address: String,
    pub receiving_address: String,
    pub provider: String,
    pub rate: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ActionKind {
    NativeTransfer(TransferAction),
    TokenTransfer(TransferAction),
    NftTransfer(NftInfo),
    InternalSwap(SwapInfo),
    Unknown,
}

/// One economic effect inside a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    pub direction: ActionDirection,
}

impl Action {
    pub fn unknown(direction: ActionDirection) -> Self {
        Self {
            kind: ActionKind::Unknown,
            direction,
        }
    }

    pub fn transfer(&self) -> Option<&TransferAction> {
        match &self.kind {
            ActionKind::NativeTransfer(t) | ActionKind::TokenTransfer(t) => Some(t),
            _ => None,
        }
    }
}

/// Canonical, chain-agnostic transaction view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedTx {
    pub txid: String,
    pub owner: String,
    pub signer: String,
    pub nonce: u64,
    pub actions: Vec<Action>,
    pub status: TxStatus,
    pub network_id: String,
    pub account_id: String,
    #[serde(default)]
    pub total_fee_in_native: Option<String>,
    /// Unix millis
    pub created_at: i64,
    /// Unix millis
    pub updated_at: i64,
    pub is_final: bool,
    #[serde(default)]
    pub encoded_tx: Option<EncodedTx>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryOrigin {
    /// First seen on chain
    OnChain,
    /// Local pending record refreshed from chain
    Merged,
    /// Built locally, not yet seen on chain
    Local,
}

/// A decoded transaction plus reconciliation bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryTx {
    /// `"<accountId>--<txid>"`
    pub id: String,
    pub decoded_tx: DecodedTx,
    pub origin: HistoryOrigin,
}

impl HistoryTx {
    pub fn history_id(account_id: &str, txid: &str) -> String {
        format!("{}--{}", account_id, txid)
    }

    pub fn local(decoded_tx: DecodedTx) -> Self {
        Self {
            id: Self::history_id(&decoded_tx.account_id, &decoded_tx.txid),
            decoded_tx,
            origin: HistoryOrigin::Local,
        }
    }
}

/// NFT transfer metadata from a separate history source, keyed by txid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftTransferRecord {
    pub txid: String,
    pub info: NftInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryOptions {
    #[serde(default)]
    pub token_id: Option<String>,
    #[serde(default)]
    pub local_history: Vec<HistoryTx>,
    #[serde(default)]
    pub nft_transfers: Vec<NftTransferRecord>,
}

/// Caller-supplied context that overrides instruction-derived actions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "info", rename_all = "camelCase")]
pub enum DecodeContext {
    #[default]
    Default,
    InternalSwap(SwapInfo),
    NftTransfer(Vec<NftInfo>),
}

// ============================================================================
// Fees, updates, balances
// ============================================================================

/// Fee quote for an encoded transaction
///
/// Fee in native units = `limit * price` shifted down by `fee_decimals`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeInfo {
    pub limit: String,
    pub prices: Vec<String>,
    pub default_preset_index: usize,
    pub fee_symbol: String,
    pub fee_decimals: u32,
    pub native_symbol: String,
    pub native_decimals: u32,
    pub custom_disabled: bool,
    /// Set only where the fee is a field of the transaction object itself
    pub tx: Option<EncodedTx>,
}

/// The fee selection merged into an encoded transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeInfoUnit {
    pub limit: String,
    pub price: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EncodedTxUpdateType {
    Transfer,
    Speedup,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedTxUpdatePayload {
    /// Corrected human decimal amount
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedTxUpdateOptions {
    #[serde(rename = "type")]
    pub update_type: EncodedTxUpdateType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceRequest {
    pub address: String,
    #[serde(default)]
    pub token_address: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointStatus {
    pub response_time_ms: u64,
    pub latest_block: u64,
}

/// Current time in unix millis
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions_only_forward() {
        assert!(TxStatus::Pending.can_transition_to(TxStatus::Confirmed));
        assert!(TxStatus::Pending.can_transition_to(TxStatus::Failed));
        assert!(!TxStatus::Confirmed.can_transition_to(TxStatus::Pending));
        assert!(!TxStatus::Failed.can_transition_to(TxStatus::Confirmed));
    }

    #[test]
    fn test_direction_serializes_upper_case() {
        let json = serde_json::to_string(&ActionDirection::SelfTransfer).unwrap();
        assert_eq!(json, "\"SELF\"");
    }

    #[test]
    fn test_utxo_account_ownership() {
        let mut addresses = BTreeMap::new();
        addresses.insert("0/0".to_string(), "tb1qreceive".to_string());
        addresses.insert("1/0".to_string(), "tb1qchange".to_string());
        let account = Account {
            id: "hd-1--m/84'/1'/0'".to_string(),
            name: "BTC #1".to_string(),
            kind: AccountKind::Utxo,
            path: "m/84'/1'/0'".to_string(),
            coin_type: 1,
            public_key: String::new(),
            address: "tb1qreceive".to_string(),
            xpub: None,
            addresses,
        };

        assert!(account.is_mine("tb1qchange"));
        assert_eq!(account.relative_path_of("tb1qchange"), Some("1/0"));
        assert_eq!(account.all_addresses().len(), 2);
        assert!(!account.is_mine("tb1qsomeoneelse"));
    }
}
