use crate::network::ChainImpl;

/// Static capabilities of one chain's vault
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultSettings {
    pub fee_info_editable: bool,
    pub private_key_export_enabled: bool,
    pub token_enabled: bool,

    pub imported_account_enabled: bool,
    pub hardware_account_enabled: bool,
    pub watching_account_enabled: bool,

    /// Human decimal; native transfers below it are rejected
    pub min_transfer_amount: &'static str,
    pub is_utxo_model: bool,
}

impl VaultSettings {
    pub fn for_chain(chain: ChainImpl) -> Self {
        match chain {
            ChainImpl::Btc => Self {
                fee_info_editable: true,
                private_key_export_enabled: true,
                token_enabled: false,
                imported_account_enabled: true,
                hardware_account_enabled: true,
                watching_account_enabled: true,
                min_transfer_amount: "0.00000546",
                is_utxo_model: true,
            },
            ChainImpl::Sol => Self {
                fee_info_editable: false,
                private_key_export_enabled: true,
                token_enabled: true,
                imported_account_enabled: true,
                hardware_account_enabled: true,
                watching_account_enabled: true,
                min_transfer_amount: "0",
                is_utxo_model: false,
            },
            ChainImpl::Xrp => Self {
                fee_info_editable: false,
                private_key_export_enabled: true,
                token_enabled: false,
                imported_account_enabled: true,
                hardware_account_enabled: true,
                watching_account_enabled: true,
                min_transfer_amount: "0.001",
                is_utxo_model: false,
            },
        }
    }
}
