//! Shared fixtures for the integration tests
//!
//! In-memory doubles of the three chain clients, plus helpers that wire them
//! into a `VaultFactory` with HD accounts derived from the standard test
//! mnemonic.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use chain_vault::client::esplora::{AddressBalance, EsploraTx, Utxo};
use chain_vault::client::solana::{
    ConfirmedTransaction, SignatureInfo, SignatureStatus, SolAccountInfo,
};
use chain_vault::client::xrpl::{SubmitResult, XrpAccountInfo, XrpFee, XrpLedgerTx};
use chain_vault::client::{EsploraApi, SolanaRpc, XrplRpc};
use chain_vault::{
    ClientError, HdKeyring, InMemoryTokenRegistry, Keyring, NetworkRegistry,
    PrepareAccountsParams, StaticNetworkRegistry, Token, Vault, VaultConfig, VaultFactory,
    WatchingKeyring,
};

pub const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
pub const PASSWORD: &str = "correct horse battery staple";

/// Genesis account of the XRP Ledger
pub const XRP_RECEIVER: &str = "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh";

pub fn init_logging() {
    dotenv::dotenv().ok();
    env_logger::builder().is_test(true).try_init().ok();
}

fn rpc_error(code: i64, message: &str) -> ClientError {
    ClientError::Rpc {
        code,
        message: message.to_string(),
        data: None,
    }
}

/// "Node is behind" error of Solana RPC nodes
pub fn node_behind() -> ClientError {
    rpc_error(-32005, "Node is behind by 42 slots")
}

// ============================================================================
// Chain client doubles
// ============================================================================

/// Balance answer of a double: value or failure, after a delay
#[derive(Clone)]
pub struct Delayed<T> {
    pub value: Result<T, String>,
    pub delay: Duration,
}

impl<T: Clone> Delayed<T> {
    pub fn ok(value: T, delay_ms: u64) -> Self {
        Self {
            value: Ok(value),
            delay: Duration::from_millis(delay_ms),
        }
    }

    pub fn err(message: &str, delay_ms: u64) -> Self {
        Self {
            value: Err(message.to_string()),
            delay: Duration::from_millis(delay_ms),
        }
    }

    async fn resolve(&self) -> Result<T, ClientError> {
        tokio::time::sleep(self.delay).await;
        self.value.clone().map_err(ClientError::Transport)
    }
}

#[derive(Default)]
pub struct MockSolana {
    pub accounts: Mutex<HashMap<String, SolAccountInfo>>,
    pub balances: Mutex<HashMap<String, Delayed<u64>>>,
    /// Answers of successive `send_transaction` calls; empty means success
    pub send_results: Mutex<VecDeque<Result<String, ClientError>>>,
    pub send_calls: AtomicU32,
    /// Preflight commitment of every `send_transaction` call
    pub preflights: Mutex<Vec<Option<String>>>,
}

impl MockSolana {
    pub fn send_count(&self) -> u32 {
        self.send_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SolanaRpc for MockSolana {
    async fn latest_blockhash(&self) -> Result<String, ClientError> {
        Ok("4sGjMW1sUnHzSxGspuhpqLDx6wiyjNtZAMdL4VZHirAn".to_string())
    }

    async fn account_info(&self, address: &str) -> Result<Option<SolAccountInfo>, ClientError> {
        Ok(self.accounts.lock().get(address).cloned())
    }

    async fn balance(&self, address: &str) -> Result<u64, ClientError> {
        let answer = self.balances.lock().get(address).cloned();
        match answer {
            Some(answer) => answer.resolve().await,
            None => Ok(0),
        }
    }

    async fn token_balance(&self, _owner: &str, _mint: &str) -> Result<u64, ClientError> {
        Ok(0)
    }

    async fn fee_for_message(&self, _message: &[u8]) -> Result<Option<u64>, ClientError> {
        Ok(Some(5000))
    }

    async fn signatures_for_address(
        &self,
        _address: &str,
        _limit: usize,
    ) -> Result<Vec<SignatureInfo>, ClientError> {
        Ok(Vec::new())
    }

    async fn transaction(
        &self,
        _signature: &str,
    ) -> Result<Option<ConfirmedTransaction>, ClientError> {
        Ok(None)
    }

    async fn signature_statuses(
        &self,
        signatures: &[String],
    ) -> Result<Vec<Option<SignatureStatus>>, ClientError> {
        Ok(vec![None; signatures.len()])
    }

    async fn slot(&self) -> Result<u64, ClientError> {
        Ok(250_000_000)
    }

    async fn send_transaction(
        &self,
        _raw: &[u8],
        preflight_commitment: Option<&str>,
    ) -> Result<String, ClientError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        self.preflights
            .lock()
            .push(preflight_commitment.map(str::to_string));
        self.send_results
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok("sent-signature".to_string()))
    }
}

#[derive(Default)]
pub struct MockXrpl {
    pub accounts: Mutex<HashMap<String, XrpAccountInfo>>,
    pub history: Mutex<Vec<XrpLedgerTx>>,
    pub submitted: Mutex<Vec<String>>,
}

#[async_trait]
impl XrplRpc for MockXrpl {
    async fn account_info(&self, address: &str) -> Result<Option<XrpAccountInfo>, ClientError> {
        Ok(self.accounts.lock().get(address).copied())
    }

    async fn fee(&self) -> Result<XrpFee, ClientError> {
        Ok(XrpFee {
            open_ledger_fee: 12,
            ledger_current_index: 100,
        })
    }

    async fn ledger_current_index(&self) -> Result<u32, ClientError> {
        Ok(100)
    }

    async fn validated_ledger_index(&self) -> Result<u32, ClientError> {
        Ok(99)
    }

    async fn account_tx(&self, _address: &str, _limit: u32) -> Result<Vec<XrpLedgerTx>, ClientError> {
        Ok(self.history.lock().clone())
    }

    async fn transaction(&self, hash: &str) -> Result<Option<XrpLedgerTx>, ClientError> {
        Ok(self.history.lock().iter().find(|tx| tx.hash == hash).cloned())
    }

    async fn submit(&self, tx_blob_hex: &str) -> Result<SubmitResult, ClientError> {
        self.submitted.lock().push(tx_blob_hex.to_string());
        Ok(SubmitResult {
            engine_result: "tesSUCCESS".to_string(),
            engine_result_message: "The transaction was applied.".to_string(),
            tx_hash: None,
        })
    }
}

#[derive(Default)]
pub struct MockEsplora {
    pub utxos: Mutex<HashMap<String, Vec<Utxo>>>,
    pub balances: Mutex<HashMap<String, Delayed<AddressBalance>>>,
}

#[async_trait]
impl EsploraApi for MockEsplora {
    async fn tip_height(&self) -> Result<u64, ClientError> {
        Ok(860_000)
    }

    async fn address_utxos(&self, address: &str) -> Result<Vec<Utxo>, ClientError> {
        Ok(self.utxos.lock().get(address).cloned().unwrap_or_default())
    }

    async fn address_balance(&self, address: &str) -> Result<AddressBalance, ClientError> {
        let answer = self.balances.lock().get(address).cloned();
        match answer {
            Some(answer) => answer.resolve().await,
            None => Ok(AddressBalance {
                confirmed_sats: 0,
                unconfirmed_sats: 0,
            }),
        }
    }

    async fn address_txs(&self, _address: &str) -> Result<Vec<EsploraTx>, ClientError> {
        Ok(Vec::new())
    }

    async fn transaction(&self, txid: &str) -> Result<EsploraTx, ClientError> {
        Err(ClientError::Status {
            status: 404,
            body: format!("transaction {} not found", txid),
        })
    }

    async fn fee_estimates(&self) -> Result<HashMap<String, f64>, ClientError> {
        Ok(HashMap::from([
            ("1".to_string(), 20.5),
            ("3".to_string(), 10.2),
            ("6".to_string(), 4.0),
        ]))
    }

    async fn broadcast(&self, _raw_tx_hex: &str) -> Result<String, ClientError> {
        Err(rpc_error(-26, "not expected in tests"))
    }
}

// ============================================================================
// Vault fixtures
// ============================================================================

pub struct Fixture {
    pub factory: VaultFactory,
    pub networks: Arc<StaticNetworkRegistry>,
    pub tokens: Arc<InMemoryTokenRegistry>,
    pub solana: Arc<MockSolana>,
    pub xrpl: Arc<MockXrpl>,
    pub esplora: Arc<MockEsplora>,
}

/// Configuration with a short broadcast delay; tests pause time anyway
pub fn test_config() -> VaultConfig {
    VaultConfig {
        broadcast_retry_delay: Duration::from_millis(500),
        ..VaultConfig::default()
    }
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: VaultConfig) -> Self {
        init_logging();
        let networks = Arc::new(StaticNetworkRegistry::with_presets(&config));
        let tokens = Arc::new(InMemoryTokenRegistry::with_networks(networks.networks()));
        let solana = Arc::new(MockSolana::default());
        let xrpl = Arc::new(MockXrpl::default());
        let esplora = Arc::new(MockEsplora::default());

        let rpc_url = |id: &str| {
            networks
                .get_network(id)
                .map(|network| network.rpc_url)
                .unwrap()
        };
        let factory = VaultFactory::new(networks.clone(), tokens.clone(), config)
            .unwrap()
            .with_solana(&rpc_url("sol--101"), solana.clone())
            .with_xrpl(&rpc_url("xrp--0"), xrpl.clone())
            .with_esplora(&rpc_url("btc--0"), esplora.clone());

        Self {
            factory,
            networks,
            tokens,
            solana,
            xrpl,
            esplora,
        }
    }

    /// Vault of the first HD account on `network_id`
    pub async fn hd_vault(&self, network_id: &str) -> Vault {
        let network = self.networks.get_network(network_id).unwrap();
        let keyring = HdKeyring::from_mnemonic(network, "hd-1", MNEMONIC, PASSWORD).unwrap();
        let keyring = Arc::new(Keyring::Hd(keyring));

        let params = PrepareAccountsParams {
            indexes: vec![0],
            names: Vec::new(),
            password: Some(PASSWORD.to_string()),
        };
        let account = keyring.prepare_accounts(&params).await.unwrap().remove(0);
        self.factory.create_vault(network_id, account, keyring).unwrap()
    }

    /// Vault of a watch-only account on `network_id`
    pub async fn watching_vault(&self, network_id: &str, address: &str) -> Vault {
        let network = self.networks.get_network(network_id).unwrap();
        let keyring = Arc::new(Keyring::Watching(WatchingKeyring::new(
            network,
            "watching",
            address,
        )));
        let account = keyring
            .prepare_accounts(&PrepareAccountsParams {
                indexes: vec![0],
                ..Default::default()
            })
            .await
            .unwrap()
            .remove(0);
        self.factory.create_vault(network_id, account, keyring).unwrap()
    }

    /// Register an SPL token on Solana mainnet
    pub fn add_sol_token(&self, mint: &str, decimals: u32) -> Token {
        let token = Token {
            id: format!("sol--101--{}", mint),
            network_id: "sol--101".to_string(),
            token_id_on_network: mint.to_string(),
            name: "USD Coin".to_string(),
            symbol: "USDC".to_string(),
            decimals,
            is_native: false,
        };
        self.tokens.add_token(token.clone());
        token
    }
}
