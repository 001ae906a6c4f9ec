use std::str::FromStr;

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;

use crate::amount;
use crate::client::http_client;
use crate::config::VaultConfig;
use crate::error::{ClientError, VaultError};
use crate::swap::types::{
    BuildTxResponse, DataResponse, DepositOrder, IndependentField, Quote, QuoteEnvelope,
    QuoteParams, QuoteQuery, SwapBuild, SwapTransaction, NATIVE_TOKEN_ADDRESS,
};
use crate::types::{EncodedTx, Token, TransferInfo};
use crate::vault::{ChainVault, Vault};
use crate::Result;

/// Quoter whose quotes carry an extra 0.2% on top of the service fee
const SWFT_QUOTER: &str = "swft";

fn swft_extra_fee() -> Decimal {
    Decimal::new(2, 3)
}

/// Client of the swap quote service
pub struct SwapQuoter {
    http: reqwest::Client,
    endpoint: String,
}

impl SwapQuoter {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        log::info!("📡 Swap quote service: {}", endpoint);
        Self { http, endpoint }
    }

    pub fn from_config(config: &VaultConfig) -> Result<Self> {
        let http = http_client(config.http_timeout)?;
        Ok(Self::new(http, config.swap_endpoint.clone()))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Best quote across quoters, or the one named in `params.quoter_type`
    ///
    /// `None` until a receiving address is known or when the service has no quote.
    pub async fn fetch_quote(&self, params: &QuoteParams) -> Result<Option<Quote>> {
        let Some(query) = quote_query(params)? else {
            return Ok(None);
        };
        let url = format!("{}/swap/v2/quote", self.endpoint);
        let response: DataResponse<QuoteEnvelope> = self.get_json(&url, &query).await?;

        response.data.map(build_quote).transpose()
    }

    /// One quote per quoter able to serve the pair
    pub async fn fetch_quotes(&self, params: &QuoteParams) -> Result<Option<Vec<Quote>>> {
        let Some(mut query) = quote_query(params)? else {
            return Ok(None);
        };
        query.quoter_type = None;
        let url = format!("{}/swap/quote_all", self.endpoint);
        let response: DataResponse<Vec<QuoteEnvelope>> = self.get_json(&url, &query).await?;

        let Some(envelopes) = response.data else {
            return Ok(None);
        };
        log::debug!("Received {} swap quotes", envelopes.len());
        envelopes
            .into_iter()
            .map(build_quote)
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    /// Transaction selling `sell_amount` (raw units of `params.token_in`)
    ///
    /// Quoters that answer with a deposit order get a plain transfer to the
    /// order's platform address, built by `vault`.
    pub async fn build_transaction(
        &self,
        vault: &Vault,
        params: &QuoteParams,
        quoter_type: &str,
        sell_amount: &str,
    ) -> Result<Option<SwapBuild>> {
        let Some(mut query) = quote_query(params)? else {
            return Ok(None);
        };
        query.from_token_amount = Some(sell_amount.to_string());
        query.to_token_amount = None;
        query.quoter_type = Some(quoter_type.to_string());

        let url = format!("{}/swap/build_tx", self.endpoint);
        let response = self.http.post(&url).json(&query).send().await.map_err(ClientError::from)?;
        let data: BuildTxResponse = read_json(response).await?;

        if let Some(mut transaction) = data.transaction {
            if let Some(object) = transaction.as_object_mut() {
                object.insert(
                    "from".to_string(),
                    serde_json::Value::String(vault.account().address.clone()),
                );
            }
            return Ok(Some(SwapBuild {
                transaction: SwapTransaction::Ready(transaction),
                result: data.result,
            }));
        }

        let has_rate = data
            .result
            .as_ref()
            .is_some_and(|result| !result.instant_rate.is_empty());
        if let (Some(order), true) = (data.order, has_rate) {
            log::info!(
                "🔁 Swap order {}: depositing {} {} to {}",
                order.order_id,
                order.deposit_coin_amt,
                order.deposit_coin_code,
                order.platform_addr
            );
            let encoded_tx = deposit_transfer(vault, &params.token_in, &order, sell_amount).await?;
            return Ok(Some(SwapBuild {
                transaction: SwapTransaction::Deposit {
                    encoded_tx,
                    order_id: order.order_id,
                },
                result: data.result,
            }));
        }

        match data.err_msg {
            Some(message) if !message.is_empty() => {
                log::warn!("⚠️ Swap service refused to build: {}", message);
                Err(VaultError::Internal(message))
            }
            _ => Ok(None),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &QuoteQuery) -> Result<T> {
        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(ClientError::from)?;
        read_json(response).await
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::Status { status, body }.into());
    }
    Ok(response.json::<T>().await.map_err(ClientError::from)?)
}

fn token_address(token: &Token) -> String {
    if token.token_id_on_network.is_empty() {
        NATIVE_TOKEN_ADDRESS.to_string()
    } else {
        token.token_id_on_network.clone()
    }
}

/// Query for `params`; `None` without a receiving address
pub(crate) fn quote_query(params: &QuoteParams) -> Result<Option<QuoteQuery>> {
    let Some(receiving_address) = params.receiving_address.clone() else {
        return Ok(None);
    };

    let (from_token_amount, to_token_amount) = match params.independent_field {
        IndependentField::Input => (
            Some(amount::to_raw_string(&params.typed_value, params.token_in.decimals, false)?),
            None,
        ),
        IndependentField::Output => (
            None,
            Some(amount::to_raw_string(&params.typed_value, params.token_out.decimals, false)?),
        ),
    };

    Ok(Some(QuoteQuery {
        to_network_id: params.network_out_id.clone(),
        from_network_id: params.network_in_id.clone(),
        to_token_address: token_address(&params.token_out),
        from_token_address: token_address(&params.token_in),
        to_token_decimals: params.token_out.decimals,
        from_token_decimals: params.token_in.decimals,
        slippage_percentage: params.slippage_percentage.clone(),
        user_address: params.user_address.clone(),
        receiving_address,
        from_token_amount,
        to_token_amount,
        quoter_type: params.quoter_type.clone(),
    }))
}

fn parse_decimal(value: &str) -> Result<Decimal> {
    Decimal::from_str(value.trim())
        .map_err(|e| VaultError::InvalidAmount(format!("{}: {}", value, e)))
}

/// Apply quoter fees to the buy amount and flatten the envelope
pub(crate) fn build_quote(envelope: QuoteEnvelope) -> Result<Quote> {
    let QuoteEnvelope { result, limit } = envelope;

    let extra_fee = if result.quoter == SWFT_QUOTER {
        swft_extra_fee()
    } else {
        Decimal::ZERO
    };
    let percentage_fee = match result.percentage_fee.as_deref() {
        Some(fee) if !fee.trim().is_empty() => parse_decimal(fee)?,
        _ => Decimal::ZERO,
    };
    let buy_amount = parse_decimal(&result.buy_amount)?;
    let estimated = buy_amount * (Decimal::ONE - percentage_fee - extra_fee);

    Ok(Quote {
        estimated_buy_amount: estimated.normalize().to_string(),
        quoter: result.quoter,
        instant_rate: result.instant_rate,
        sell_amount: result.sell_amount,
        sell_token_address: result.sell_token_address,
        buy_amount: result.buy_amount,
        buy_token_address: result.buy_token_address,
        providers: result.sources.unwrap_or_default(),
        percentage_fee: result.percentage_fee,
        allowance_target: result.allowance_target,
        arrival_time: result.arrival_time,
        limit,
    })
}

async fn deposit_transfer(
    vault: &Vault,
    token_in: &Token,
    order: &DepositOrder,
    sell_amount: &str,
) -> Result<EncodedTx> {
    let transfer = TransferInfo {
        from: vault.account().address.clone(),
        to: order.platform_addr.clone(),
        amount: amount::from_raw_str(sell_amount, token_in.decimals)?,
        token: (!token_in.token_id_on_network.is_empty())
            .then(|| token_in.token_id_on_network.clone()),
        ..Default::default()
    };
    vault.build_encoded_tx_from_transfer(&transfer).await
}
