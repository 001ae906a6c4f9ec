//! Credential providers
//!
//! A [`Keyring`] owns the signing capability of one wallet on one network.
//! The variants differ only in where keys live: a sealed BIP39 seed, a single
//! sealed private key, a hardware device, or nowhere at all (watch-only).
//! Operations a variant cannot perform fail with a typed error instead of
//! attempting any cryptography.

pub mod crypto;
pub mod derivation;
pub mod hardware;
pub mod hd;
pub mod imported;
pub mod watching;

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::chains;
use crate::error::VaultError;
use crate::network::NetworkDescriptor;
use crate::types::{Account, AccountKind, Curve, SignRequest, SignatureOutput, SignedTx, UnsignedTx};
use crate::Result;

use self::derivation::{curve_of, join_path, AccountLayout};

pub use hardware::{DeviceFailure, DeviceSession, DeviceTransport, HardwareKeyring};
pub use hd::HdKeyring;
pub use imported::ImportedKeyring;
pub use watching::WatchingKeyring;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareAccountsParams {
    /// Account indexes to derive (ignored by single-key variants)
    pub indexes: Vec<u32>,
    /// Optional display names, matched to `indexes` by position
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl PrepareAccountsParams {
    pub(crate) fn name_at(&self, position: usize, index: u32, network: &NetworkDescriptor) -> String {
        self.names
            .get(position)
            .cloned()
            .unwrap_or_else(|| format!("{} #{}", network.symbol, index + 1))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetAddressParams {
    pub index: u32,
    #[serde(default)]
    pub show_on_device: bool,
    #[serde(default)]
    pub password: Option<String>,
}

/// Unlock material for a signing call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignOptions {
    /// Wallet password; required by the software variants
    pub password: Option<String>,
}

impl SignOptions {
    pub fn with_password(password: impl Into<String>) -> Self {
        Self {
            password: Some(password.into()),
        }
    }
}

fn require_password(password: Option<&str>) -> Result<&str> {
    password.ok_or_else(|| VaultError::internal("password required to unlock keyring"))
}

/// Assemble an [`Account`] from a derivation layout and its public key
pub(crate) fn build_account(
    network: &NetworkDescriptor,
    wallet_id: &str,
    name: String,
    layout: &AccountLayout,
    public_key: &[u8],
    xpub: Option<String>,
    mut addresses: BTreeMap<String, String>,
) -> Result<Account> {
    let address = match layout.kind {
        AccountKind::Utxo => {
            if addresses.is_empty() {
                let address = chains::address_from_public_key(network, public_key)?;
                addresses.insert("0/0".to_string(), address);
            }
            addresses
                .get("0/0")
                .cloned()
                .ok_or_else(|| VaultError::internal("UTXO account without receive address"))?
        }
        AccountKind::Simple => chains::address_from_public_key(network, public_key)?,
    };

    let id = if layout.path.is_empty() {
        format!("{}--{}", wallet_id, address)
    } else {
        format!("{}--{}", wallet_id, layout.path)
    };

    Ok(Account {
        id,
        name,
        kind: layout.kind,
        path: layout.path.clone(),
        coin_type: network.coin_type(),
        public_key: hex::encode(public_key),
        address,
        xpub,
        addresses,
    })
}

pub enum Keyring {
    Hd(HdKeyring),
    Hardware(HardwareKeyring),
    Imported(ImportedKeyring),
    Watching(WatchingKeyring),
}

impl Keyring {
    pub fn network(&self) -> &NetworkDescriptor {
        match self {
            Self::Hd(k) => k.network(),
            Self::Hardware(k) => k.network(),
            Self::Imported(k) => k.network(),
            Self::Watching(k) => k.network(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Hd(_) => "hd",
            Self::Hardware(_) => "hardware",
            Self::Imported(_) => "imported",
            Self::Watching(_) => "watching",
        }
    }

    pub fn can_sign(&self) -> bool {
        !matches!(self, Self::Watching(_))
    }

    /// Software variants hold secrets that can be exported
    pub fn supports_export(&self) -> bool {
        matches!(self, Self::Hd(_) | Self::Imported(_))
    }

    fn watch_only_error(operation: &str) -> VaultError {
        VaultError::not_implemented(format!("{} is not supported for watch-only accounts", operation))
    }

    pub async fn prepare_accounts(&self, params: &PrepareAccountsParams) -> Result<Vec<Account>> {
        match self {
            Self::Hd(k) => k.prepare_accounts(params, require_password(params.password.as_deref())?),
            Self::Imported(k) => {
                k.prepare_accounts(params, require_password(params.password.as_deref())?)
            }
            Self::Hardware(k) => k.prepare_accounts(params, false).await,
            Self::Watching(k) => Ok(vec![k.account(params.name_at(0, 0, k.network()))]),
        }
    }

    /// Receive address of the account at `params.index`
    pub async fn get_address(&self, params: &GetAddressParams) -> Result<String> {
        let prepare = PrepareAccountsParams {
            indexes: vec![params.index],
            names: Vec::new(),
            password: params.password.clone(),
        };
        let accounts = match self {
            Self::Hardware(k) => k.prepare_accounts(&prepare, params.show_on_device).await?,
            _ => self.prepare_accounts(&prepare).await?,
        };
        accounts
            .into_iter()
            .next()
            .map(|account| account.address)
            .ok_or_else(|| VaultError::internal("keyring produced no account"))
    }

    /// Sign every request, in order
    pub async fn sign_requests(
        &self,
        requests: &[SignRequest],
        options: &SignOptions,
    ) -> Result<Vec<SignatureOutput>> {
        match self {
            Self::Hd(k) => k.sign(requests, require_password(options.password.as_deref())?),
            Self::Imported(k) => k.sign(requests, require_password(options.password.as_deref())?),
            Self::Hardware(k) => k.sign(requests).await,
            Self::Watching(_) => Err(Self::watch_only_error("signing")),
        }
    }

    pub async fn sign_transaction(
        &self,
        unsigned: &UnsignedTx,
        options: &SignOptions,
    ) -> Result<SignedTx> {
        if !self.can_sign() {
            return Err(Self::watch_only_error("signing"));
        }

        log::debug!(
            "Signing {} request(s) with {} keyring on {}",
            unsigned.sign_requests.len(),
            self.kind_name(),
            self.network().id
        );
        let signatures = self.sign_requests(&unsigned.sign_requests, options).await?;
        chains::assemble_signed_tx(self.network(), unsigned, &signatures)
    }

    /// Sign off-chain messages with the account's primary key
    ///
    /// secp256k1 signatures are hex DER; ed25519 signatures are base58.
    pub async fn sign_message(
        &self,
        account: &Account,
        messages: &[String],
        options: &SignOptions,
    ) -> Result<Vec<String>> {
        if !self.can_sign() {
            return Err(Self::watch_only_error("message signing"));
        }

        let network = self.network();
        let curve = curve_of(network.impl_);
        let path = match account.kind {
            AccountKind::Utxo => join_path(&account.path, "0/0"),
            AccountKind::Simple => account.path.clone(),
        };
        let requests: Vec<SignRequest> = messages
            .iter()
            .map(|message| SignRequest {
                path: path.clone(),
                curve,
                message: chains::message_sign_payload(network, message.as_bytes()),
            })
            .collect();

        let signatures = self.sign_requests(&requests, options).await?;
        Ok(signatures
            .into_iter()
            .map(|output| match curve {
                Curve::Secp256k1 => hex::encode(output.signature),
                Curve::Ed25519 => bs58::encode(output.signature).into_string(),
            })
            .collect())
    }

    /// Account id to password-sealed secret, software variants only
    pub async fn get_private_keys(
        &self,
        password: &str,
        accounts: &[Account],
    ) -> Result<HashMap<String, Vec<u8>>> {
        match self {
            Self::Hd(k) => k.private_keys(password, accounts),
            Self::Imported(k) => k.private_keys(password, accounts),
            Self::Hardware(_) => Err(VaultError::internal(
                "hardware accounts do not expose private keys",
            )),
            Self::Watching(_) => Err(VaultError::internal(
                "watch-only accounts do not hold private keys",
            )),
        }
    }
}
