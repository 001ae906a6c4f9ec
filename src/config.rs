/// Vault configuration from environment variables
///
/// Controls RPC endpoint overrides, client cache lifetimes, the broadcast
/// retry budget and the swap quoting service endpoint.

use std::env;
use std::time::Duration;

use crate::vault::broadcast::RetryPolicy;

#[derive(Clone, Debug)]
pub struct VaultConfig {
    /// Esplora base URL override for the Bitcoin networks
    pub btc_esplora_url: Option<String>,
    /// JSON-RPC endpoint override for the Solana networks
    pub sol_rpc_url: Option<String>,
    /// JSON-RPC endpoint override for the XRP Ledger networks
    pub xrp_rpc_url: Option<String>,
    /// TTL for volatile lookups (unspent outputs, balances)
    pub cache_ttl: Duration,
    /// TTL for slow-changing lookups (token account owners, asset metadata)
    pub slow_cache_ttl: Duration,
    /// Maximum broadcast attempts on retryable upstream errors
    pub broadcast_max_attempts: u32,
    /// Fixed delay between broadcast attempts
    pub broadcast_retry_delay: Duration,
    /// Request timeout applied by the HTTP transport
    pub http_timeout: Duration,
    /// Base URL of the swap quoting service
    pub swap_endpoint: String,
}

impl VaultConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `VAULT_BTC_ESPLORA_URL`, `VAULT_SOL_RPC_URL`, `VAULT_XRP_RPC_URL`: RPC overrides
    /// - `VAULT_CACHE_TTL_SECS`: volatile cache TTL (default 60)
    /// - `VAULT_SLOW_CACHE_TTL_SECS`: slow cache TTL (default 180)
    /// - `VAULT_BROADCAST_MAX_ATTEMPTS`: broadcast attempt budget (default 8)
    /// - `VAULT_BROADCAST_RETRY_DELAY_MS`: delay between attempts (default 1000)
    /// - `VAULT_HTTP_TIMEOUT_SECS`: HTTP request timeout (default 20)
    /// - `SWAP_ENDPOINT`: swap quoting service base URL
    ///
    /// # Examples
    ///
    /// ```bash
    /// # Point Solana at a local validator
    /// VAULT_SOL_RPC_URL=http://localhost:8899 cargo test
    /// ```
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let btc_esplora_url = env::var("VAULT_BTC_ESPLORA_URL").ok();
        if let Some(ref url) = btc_esplora_url {
            log::info!("📡 Esplora URL override: {}", url);
        }

        let sol_rpc_url = env::var("VAULT_SOL_RPC_URL").ok();
        if let Some(ref url) = sol_rpc_url {
            log::info!("📡 Solana RPC override: {}", url);
        }

        let xrp_rpc_url = env::var("VAULT_XRP_RPC_URL").ok();
        if let Some(ref url) = xrp_rpc_url {
            log::info!("📡 XRPL RPC override: {}", url);
        }

        let cache_ttl = Duration::from_secs(env_u64(
            "VAULT_CACHE_TTL_SECS",
            defaults.cache_ttl.as_secs(),
        ));
        let slow_cache_ttl = Duration::from_secs(env_u64(
            "VAULT_SLOW_CACHE_TTL_SECS",
            defaults.slow_cache_ttl.as_secs(),
        ));

        let broadcast_max_attempts = env_u64(
            "VAULT_BROADCAST_MAX_ATTEMPTS",
            defaults.broadcast_max_attempts as u64,
        ) as u32;
        let broadcast_retry_delay = Duration::from_millis(env_u64(
            "VAULT_BROADCAST_RETRY_DELAY_MS",
            defaults.broadcast_retry_delay.as_millis() as u64,
        ));
        let http_timeout = Duration::from_secs(env_u64(
            "VAULT_HTTP_TIMEOUT_SECS",
            defaults.http_timeout.as_secs(),
        ));

        let swap_endpoint = env::var("SWAP_ENDPOINT").unwrap_or(defaults.swap_endpoint);
        log::info!("🔁 Swap endpoint: {}", swap_endpoint);

        log::debug!(
            "Cache TTL {:?} (slow {:?}), broadcast budget {} x {:?}",
            cache_ttl,
            slow_cache_ttl,
            broadcast_max_attempts,
            broadcast_retry_delay
        );

        Self {
            btc_esplora_url,
            sol_rpc_url,
            xrp_rpc_url,
            cache_ttl,
            slow_cache_ttl,
            broadcast_max_attempts,
            broadcast_retry_delay,
            http_timeout,
            swap_endpoint,
        }
    }

    /// Retry policy applied to broadcasts that fail with retryable upstream codes
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.broadcast_max_attempts.max(1),
            delay: self.broadcast_retry_delay,
        }
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            btc_esplora_url: None,
            sol_rpc_url: None,
            xrp_rpc_url: None,
            cache_ttl: Duration::from_secs(60),
            slow_cache_ttl: Duration::from_secs(180),
            broadcast_max_attempts: 8,
            broadcast_retry_delay: Duration::from_millis(1000),
            http_timeout: Duration::from_secs(20),
            swap_endpoint: "https://fiat.onekeycn.com".to_string(),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(value) => value,
            Err(_) => {
                log::warn!("⚠️  Invalid value '{}' for {}, using {}", raw, key, default);
                default
            }
        },
        Err(_) => default,
    }
}
