//! HD keyring: one BIP39 seed, sealed under the wallet password

use std::collections::{BTreeMap, HashMap};

use bip39::Mnemonic;
use bitcoin::bip32::Xpub;
use bitcoin::secp256k1::Secp256k1;

use crate::chains::address_from_public_key;
use crate::error::VaultError;
use crate::keyring::crypto;
use crate::keyring::derivation::{
    account_layout, curve_of, derive_child_public_key, derive_ed25519, derive_private_key, derive_xpriv,
    public_key_of, sign_with_key,
};
use crate::keyring::{build_account, PrepareAccountsParams};
use crate::network::NetworkDescriptor;
use crate::types::{Account, AccountKind, Curve, SignRequest, SignatureOutput};
use crate::Result;

pub struct HdKeyring {
    network: NetworkDescriptor,
    wallet_id: String,
    sealed_seed: Vec<u8>,
}

impl HdKeyring {
    /// Import a wallet from an existing mnemonic phrase
    pub fn from_mnemonic(
        network: NetworkDescriptor,
        wallet_id: impl Into<String>,
        words: &str,
        password: &str,
    ) -> Result<Self> {
        let mnemonic = Mnemonic::parse(words)
            .map_err(|e| VaultError::internal(format!("invalid mnemonic: {}", e)))?;
        let seed = mnemonic.to_seed("");

        Ok(Self {
            network,
            wallet_id: wallet_id.into(),
            sealed_seed: crypto::encrypt(password, &seed)?,
        })
    }

    /// Generate a new random 12-word wallet, returning the keyring and its phrase
    pub fn generate(
        network: NetworkDescriptor,
        wallet_id: impl Into<String>,
        password: &str,
    ) -> Result<(Self, String)> {
        let entropy = rand::random::<[u8; 16]>();
        let mnemonic = Mnemonic::from_entropy(&entropy)
            .map_err(|e| VaultError::internal(format!("mnemonic generation: {}", e)))?;
        let words = mnemonic.to_string();
        let keyring = Self::from_mnemonic(network, wallet_id, &words, password)?;
        Ok((keyring, words))
    }

    pub fn network(&self) -> &NetworkDescriptor {
        &self.network
    }

    fn seed(&self, password: &str) -> Result<Vec<u8>> {
        crypto::decrypt(password, &self.sealed_seed)
    }

    pub(crate) fn prepare_accounts(
        &self,
        params: &PrepareAccountsParams,
        password: &str,
    ) -> Result<Vec<Account>> {
        let seed = self.seed(password)?;
        let secp = Secp256k1::signing_only();

        let mut accounts = Vec::with_capacity(params.indexes.len());
        for (position, index) in params.indexes.iter().enumerate() {
            let layout = account_layout(&self.network, *index);
            let name = params.name_at(position, *index, &self.network);

            let account = match layout.curve {
                Curve::Secp256k1 => {
                    let xpriv = derive_xpriv(&seed, self.network.bitcoin_network(), &layout.path)?;
                    let xpub = Xpub::from_priv(&secp, &xpriv);
                    let public_key = xpub.public_key.serialize();

                    let mut addresses = BTreeMap::new();
                    let mut account_xpub = None;
                    if layout.kind == AccountKind::Utxo {
                        for relative in &layout.address_paths {
                            let child = derive_child_public_key(&xpub, relative)?;
                            let address =
                                address_from_public_key(&self.network, &child.serialize())?;
                            addresses.insert(relative.clone(), address);
                        }
                        account_xpub = Some(xpub.to_string());
                    }

                    build_account(
                        &self.network,
                        &self.wallet_id,
                        name,
                        &layout,
                        &public_key,
                        account_xpub,
                        addresses,
                    )?
                }
                Curve::Ed25519 => {
                    let secret = derive_ed25519(&seed, &layout.path)?;
                    let public_key = public_key_of(Curve::Ed25519, &secret)?;
                    build_account(
                        &self.network,
                        &self.wallet_id,
                        name,
                        &layout,
                        &public_key,
                        None,
                        BTreeMap::new(),
                    )?
                }
            };

            log::debug!("Prepared account {} -> {}", account.id, account.address);
            accounts.push(account);
        }
        Ok(accounts)
    }

    pub(crate) fn sign(
        &self,
        requests: &[SignRequest],
        password: &str,
    ) -> Result<Vec<SignatureOutput>> {
        let seed = self.seed(password)?;
        requests
            .iter()
            .map(|request| {
                let secret = derive_private_key(&seed, &self.network, request.curve, &request.path)?;
                sign_with_key(request.curve, &secret, &request.message)
            })
            .collect()
    }

    /// Account-level secrets, re-sealed under `password`
    ///
    /// UTXO accounts yield the 78-byte BIP32 extended key so they can be
    /// exported as xprv; every other account yields its 32-byte leaf key.
    pub(crate) fn private_keys(
        &self,
        password: &str,
        accounts: &[Account],
    ) -> Result<HashMap<String, Vec<u8>>> {
        let seed = self.seed(password)?;
        let mut keys = HashMap::with_capacity(accounts.len());
        for account in accounts {
            let secret = match curve_of(self.network.impl_) {
                Curve::Secp256k1 => {
                    let xpriv = derive_xpriv(&seed, self.network.bitcoin_network(), &account.path)?;
                    match account.kind {
                        AccountKind::Utxo => xpriv.encode().to_vec(),
                        AccountKind::Simple => xpriv.private_key.secret_bytes().to_vec(),
                    }
                }
                Curve::Ed25519 => derive_ed25519(&seed, &account.path)?.to_vec(),
            };
            keys.insert(account.id.clone(), crypto::encrypt(password, &secret)?);
        }
        Ok(keys)
    }
}
