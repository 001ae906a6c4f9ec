use std::collections::{BTreeMap, HashMap};

use crate::chains::parse_imported_credential;
use crate::error::VaultError;
use crate::keyring::crypto;
use crate::keyring::derivation::{curve_of, public_key_of, sign_with_key, AccountLayout};
use crate::keyring::{build_account, PrepareAccountsParams};
use crate::network::{ChainImpl, NetworkDescriptor};
use crate::types::{Account, AccountKind, SignRequest, SignatureOutput};
use crate::Result;

/// Single imported private key, sealed under the wallet password
pub struct ImportedKeyring {
    network: NetworkDescriptor,
    wallet_id: String,
    sealed_key: Vec<u8>,
}

impl ImportedKeyring {
    /// Import a chain-native credential (WIF, base58 keypair or hex key)
    pub fn from_credential(
        network: NetworkDescriptor,
        wallet_id: impl Into<String>,
        credential: &str,
        password: &str,
    ) -> Result<Self> {
        let key = parse_imported_credential(&network, credential)?;
        Ok(Self {
            sealed_key: crypto::encrypt(password, &key)?,
            network,
            wallet_id: wallet_id.into(),
        })
    }

    pub fn network(&self) -> &NetworkDescriptor {
        &self.network
    }

    fn key(&self, password: &str) -> Result<Vec<u8>> {
        crypto::decrypt(password, &self.sealed_key)
    }

    pub(crate) fn prepare_accounts(
        &self,
        params: &PrepareAccountsParams,
        password: &str,
    ) -> Result<Vec<Account>> {
        let key = self.key(password)?;
        let curve = curve_of(self.network.impl_);
        let public_key = public_key_of(curve, &key)?;

        let kind = match self.network.impl_ {
            ChainImpl::Btc => AccountKind::Utxo,
            ChainImpl::Sol | ChainImpl::Xrp => AccountKind::Simple,
        };
        let layout = AccountLayout {
            path: String::new(),
            kind,
            curve,
            address_paths: Vec::new(),
        };

        let account = build_account(
            &self.network,
            &self.wallet_id,
            params.name_at(0, 0, &self.network),
            &layout,
            &public_key,
            None,
            BTreeMap::new(),
        )?;
        Ok(vec![account])
    }

    pub(crate) fn sign(
        &self,
        requests: &[SignRequest],
        password: &str,
    ) -> Result<Vec<SignatureOutput>> {
        let key = self.key(password)?;
        let curve = curve_of(self.network.impl_);
        requests
            .iter()
            .map(|request| {
                if request.curve != curve {
                    return Err(VaultError::internal(format!(
                        "imported {:?} key cannot sign {:?} request",
                        curve, request.curve
                    )));
                }
                sign_with_key(curve, &key, &request.message)
            })
            .collect()
    }

    pub(crate) fn private_keys(
        &self,
        password: &str,
        accounts: &[Account],
    ) -> Result<HashMap<String, Vec<u8>>> {
        let key = self.key(password)?;
        accounts
            .iter()
            .map(|account| Ok((account.id.clone(), crypto::encrypt(password, &key)?)))
            .collect()
    }
}
