//! Hardware device keyring
//!
//! Every key operation is routed through a [`DeviceTransport`] bound to one
//! device session. The transport itself (USB, BLE, bridge) lives outside this
//! crate; failures it reports become `VaultError::HardwareDevice`.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::VaultError;
use crate::keyring::derivation::{account_layout, join_path};
use crate::keyring::{build_account, PrepareAccountsParams};
use crate::network::NetworkDescriptor;
use crate::types::{Account, AccountKind, Curve, SignRequest, SignatureOutput};
use crate::Result;

/// Identifies the connected device and its unlocked passphrase wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSession {
    pub connect_id: String,
    pub device_id: String,
    #[serde(default)]
    pub passphrase_state: Option<String>,
}

/// Failure reported by the device or its transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("device error {code}: {message}")]
pub struct DeviceFailure {
    pub code: i32,
    pub message: String,
}

impl From<DeviceFailure> for VaultError {
    fn from(failure: DeviceFailure) -> Self {
        VaultError::HardwareDevice {
            code: failure.code,
            message: failure.message,
        }
    }
}

#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Public key at `path`, optionally confirming the address on screen
    async fn get_public_key(
        &self,
        session: &DeviceSession,
        path: &str,
        curve: Curve,
        show_on_device: bool,
    ) -> std::result::Result<Vec<u8>, DeviceFailure>;

    async fn sign(
        &self,
        session: &DeviceSession,
        request: &SignRequest,
    ) -> std::result::Result<SignatureOutput, DeviceFailure>;
}

pub struct HardwareKeyring {
    network: NetworkDescriptor,
    wallet_id: String,
    session: DeviceSession,
    transport: Arc<dyn DeviceTransport>,
}

impl HardwareKeyring {
    pub fn new(
        network: NetworkDescriptor,
        wallet_id: impl Into<String>,
        session: DeviceSession,
        transport: Arc<dyn DeviceTransport>,
    ) -> Self {
        Self {
            network,
            wallet_id: wallet_id.into(),
            session,
            transport,
        }
    }

    pub fn network(&self) -> &NetworkDescriptor {
        &self.network
    }

    pub fn session(&self) -> &DeviceSession {
        &self.session
    }

    pub(crate) async fn prepare_accounts(
        &self,
        params: &PrepareAccountsParams,
        show_on_device: bool,
    ) -> Result<Vec<Account>> {
        log::debug!(
            "Preparing {} hardware accounts on {} via device {}",
            params.indexes.len(),
            self.network.id,
            self.session.device_id
        );

        let mut accounts = Vec::with_capacity(params.indexes.len());
        for (position, index) in params.indexes.iter().enumerate() {
            let layout = account_layout(&self.network, *index);
            let public_key = self
                .transport
                .get_public_key(&self.session, &layout.path, layout.curve, false)
                .await?;

            let mut addresses = BTreeMap::new();
            if layout.kind == AccountKind::Utxo {
                for relative in &layout.address_paths {
                    let child = self
                        .transport
                        .get_public_key(
                            &self.session,
                            &join_path(&layout.path, relative),
                            layout.curve,
                            show_on_device && relative == "0/0",
                        )
                        .await?;
                    let address =
                        crate::chains::address_from_public_key(&self.network, &child)?;
                    addresses.insert(relative.clone(), address);
                }
            } else if show_on_device {
                self.transport
                    .get_public_key(&self.session, &layout.path, layout.curve, true)
                    .await?;
            }

            accounts.push(build_account(
                &self.network,
                &self.wallet_id,
                params.name_at(position, *index, &self.network),
                &layout,
                &public_key,
                None,
                addresses,
            )?);
        }
        Ok(accounts)
    }

    pub(crate) async fn sign(&self, requests: &[SignRequest]) -> Result<Vec<SignatureOutput>> {
        let mut signatures = Vec::with_capacity(requests.len());
        // Devices handle one request at a time
        for request in requests {
            let signature = self.transport.sign(&self.session, request).await.map_err(|e| {
                log::warn!("⚠️  Device {} rejected signing: {}", self.session.device_id, e);
                VaultError::from(e)
            })?;
            signatures.push(signature);
        }
        Ok(signatures)
    }
}
