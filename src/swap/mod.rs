//! Swap quotes and swap transaction composition
//!
//! Quotes come from an external HTTP service. Cross-chain quoters may answer
//! a build request with a deposit order instead of a transaction; the deposit
//! is then built as a plain transfer through the selling account's vault.

pub mod quoter;
pub mod types;

pub use quoter::SwapQuoter;
pub use types::{
    DepositOrder, IndependentField, Quote, QuoteLimit, QuoteParams, QuoteResult, QuoteSource,
    SwapBuild, SwapTransaction, NATIVE_TOKEN_ADDRESS,
};
