use serde::{Deserialize, Serialize};

use crate::types::{EncodedTx, Token};

/// Token address the quote service uses for a chain's native asset
pub const NATIVE_TOKEN_ADDRESS: &str = "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee";

/// Which side of the pair the user typed an amount for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndependentField {
    Input,
    Output,
}

/// Pair, amount and addresses of one quote request
#[derive(Debug, Clone)]
pub struct QuoteParams {
    pub network_in_id: String,
    pub network_out_id: String,
    pub token_in: Token,
    pub token_out: Token,
    pub independent_field: IndependentField,
    /// Human decimal amount on the independent side
    pub typed_value: String,
    pub slippage_percentage: String,
    pub user_address: String,
    /// Quotes are only requested once a receiving address is known
    pub receiving_address: Option<String>,
    /// Restrict the service to one quoter
    pub quoter_type: Option<String>,
}

/// Query string sent to the quote service
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuoteQuery {
    pub to_network_id: String,
    pub from_network_id: String,
    pub to_token_address: String,
    pub from_token_address: String,
    pub to_token_decimals: u32,
    pub from_token_decimals: u32,
    pub slippage_percentage: String,
    pub user_address: String,
    pub receiving_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_token_amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_token_amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quoter_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteSource {
    pub name: String,
    #[serde(default)]
    pub logo_url: Option<String>,
}

/// Quote as returned by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResult {
    pub quoter: String,
    pub instant_rate: String,
    pub sell_amount: String,
    pub sell_token_address: String,
    pub buy_amount: String,
    pub buy_token_address: String,
    #[serde(default)]
    pub allowance_target: Option<String>,
    #[serde(default)]
    pub sources: Option<Vec<QuoteSource>>,
    /// Seconds
    #[serde(default)]
    pub arrival_time: Option<u64>,
    #[serde(default)]
    pub percentage_fee: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteLimit {
    pub min: String,
    pub max: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct QuoteEnvelope {
    pub result: QuoteResult,
    #[serde(default)]
    pub limit: Option<QuoteLimit>,
}

/// `{ "data": ... }` wrapper of the GET endpoints
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DataResponse<T> {
    pub data: Option<T>,
}

/// Post-processed quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub quoter: String,
    pub instant_rate: String,
    pub sell_amount: String,
    pub sell_token_address: String,
    pub buy_amount: String,
    pub buy_token_address: String,
    pub providers: Vec<QuoteSource>,
    pub percentage_fee: Option<String>,
    pub allowance_target: Option<String>,
    pub arrival_time: Option<u64>,
    /// Buy amount net of the service and quoter fees
    pub estimated_buy_amount: String,
    /// Accepted sell range, when the quoter has one
    pub limit: Option<QuoteLimit>,
}

/// Deposit order answered by exchange-style quoters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositOrder {
    pub platform_addr: String,
    pub deposit_coin_amt: String,
    pub deposit_coin_code: String,
    pub receive_coin_amt: String,
    pub receive_coin_code: String,
    pub order_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BuildTxResponse {
    #[serde(default)]
    pub transaction: Option<serde_json::Value>,
    #[serde(default)]
    pub order: Option<DepositOrder>,
    #[serde(default)]
    pub err_msg: Option<String>,
    #[serde(default)]
    pub result: Option<QuoteResult>,
}

/// Transaction produced for a swap
#[derive(Debug, Clone, PartialEq)]
pub enum SwapTransaction {
    /// Built by the service; objects carry the sender as `from`
    Ready(serde_json::Value),
    /// Deposit to the order's platform address, built by the vault
    Deposit { encoded_tx: EncodedTx, order_id: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwapBuild {
    pub transaction: SwapTransaction,
    pub result: Option<QuoteResult>,
}
