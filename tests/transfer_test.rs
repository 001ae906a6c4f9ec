//! Transfer Lifecycle Integration Tests
//!
//! Bitcoin build/decode and fee re-selection, Solana batch transfers and
//! amount updates, caller-supplied decode contexts, and the per-chain
//! transfer rules (minimum amounts, token support, fee editability).
//!
//! Run with: cargo test --test transfer_test -- --nocapture

mod common;

use chain_vault::chains::sol::decode_transaction;
use chain_vault::chains::sol::instructions::{parse_instruction, ParsedInstruction};
use chain_vault::client::esplora::{EsploraTxStatus, Utxo};
use chain_vault::client::xrpl::XrpAccountInfo;
use chain_vault::registry::native_token;
use chain_vault::{
    ActionDirection, ActionKind, ChainVault, DecodeContext, EncodedTx, EncodedTxUpdateOptions,
    EncodedTxUpdatePayload, EncodedTxUpdateType, FeeInfoUnit, NetworkRegistry, NftInfo, SwapInfo,
    SwapSide, TransferInfo, Vault, VaultError,
};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};

use common::{Fixture, XRP_RECEIVER};

const BTC_RECEIVER: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";

fn transfer(from: &str, to: &str, amount: &str, token: Option<&str>) -> TransferInfo {
    TransferInfo {
        from: from.to_string(),
        to: to.to_string(),
        amount: amount.to_string(),
        token: token.map(str::to_string),
        ..Default::default()
    }
}

fn confirmed_utxo(txid_byte: char, value: u64) -> Utxo {
    Utxo {
        txid: txid_byte.to_string().repeat(64),
        vout: 0,
        value,
        status: EsploraTxStatus {
            confirmed: true,
            block_height: Some(850_000),
            block_time: Some(1_720_000_000),
        },
    }
}

async fn funded_xrp_vault(fx: &Fixture) -> Vault {
    let vault = fx.hd_vault("xrp--0").await;
    fx.xrpl.accounts.lock().insert(
        vault.account().address.clone(),
        XrpAccountInfo {
            balance: 50_000_000,
            sequence: 3,
        },
    );
    vault
}

// ============================================================================
// Bitcoin
// ============================================================================

#[tokio::test]
async fn test_btc_transfer_round_trip() {
    let fx = Fixture::new();
    let vault = fx.hd_vault("btc--0").await;
    let from = vault.account().address.clone();
    fx.esplora.utxos.lock().insert(
        from.clone(),
        vec![confirmed_utxo('a', 60_000), confirmed_utxo('b', 40_000)],
    );

    let encoded = vault
        .build_encoded_tx_from_transfer(&transfer(&from, BTC_RECEIVER, "0.00055", None))
        .await
        .unwrap();
    let EncodedTx::Btc(tx) = &encoded else {
        panic!("expected a bitcoin transaction");
    };
    // Normal preset: ceil(10.2) sat/vB, one input covers amount, fee and change
    assert_eq!(tx.fee_rate, 11);
    assert_eq!(tx.inputs.len(), 1);
    assert_eq!(tx.inputs[0].value, 60_000);
    assert_eq!(tx.total_fee, 146 * 11);
    assert_eq!(tx.outputs[1].value, 60_000 - 55_000 - 146 * 11);
    assert!(tx.outputs[1].is_change);

    let decoded = vault.decode_tx(&encoded, &DecodeContext::Default).await.unwrap();
    assert_eq!(decoded.actions.len(), 1);
    let action = &decoded.actions[0];
    assert_eq!(action.direction, ActionDirection::Out);
    let t = action.transfer().expect("transfer");
    assert_eq!(t.to, BTC_RECEIVER);
    assert_eq!(t.amount, "0.00055");
    assert_eq!(t.amount_value, "55000");
    assert_eq!(decoded.total_fee_in_native.as_deref(), Some("0.00001606"));

    let unsigned = vault.build_unsigned_tx_from_encoded_tx(encoded).await.unwrap();
    assert_eq!(unsigned.sign_requests.len(), 1);
    assert_eq!(unsigned.sign_requests[0].path, "m/84'/0'/0'/0/0");
}

#[tokio::test]
async fn test_btc_fee_change_reselects_inputs() {
    let fx = Fixture::new();
    let vault = fx.hd_vault("btc--0").await;
    let from = vault.account().address.clone();
    fx.esplora.utxos.lock().insert(
        from.clone(),
        vec![confirmed_utxo('a', 60_000), confirmed_utxo('b', 40_000)],
    );

    let encoded = vault
        .build_encoded_tx_from_transfer(&transfer(&from, BTC_RECEIVER, "0.00055", None))
        .await
        .unwrap();
    let fee_info = vault.fetch_fee_info(&encoded).await.unwrap();
    assert_eq!(fee_info.prices, vec!["4", "11", "21"]);
    assert!(!fee_info.custom_disabled);

    // Same rate: nothing to do
    let unchanged = vault
        .attach_fee_info_to_encoded_tx(
            encoded.clone(),
            &FeeInfoUnit {
                limit: fee_info.limit.clone(),
                price: "11".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(unchanged, encoded);

    let bumped = vault
        .attach_fee_info_to_encoded_tx(
            encoded,
            &FeeInfoUnit {
                limit: fee_info.limit,
                price: "40".to_string(),
            },
        )
        .await
        .unwrap();
    let EncodedTx::Btc(tx) = &bumped else {
        panic!("expected a bitcoin transaction");
    };
    assert_eq!(tx.fee_rate, 40);
    assert_eq!(tx.inputs.len(), 2);
    assert_eq!(tx.total_fee, 214 * 40);
    assert_eq!(tx.outputs[0].value, 55_000);
    assert_eq!(tx.total_spent, 55_000 + 214 * 40);
}

#[tokio::test]
async fn test_btc_amount_below_dust_is_rejected() {
    let fx = Fixture::new();
    let vault = fx.hd_vault("btc--0").await;
    let from = vault.account().address.clone();

    let err = vault
        .build_encoded_tx_from_transfer(&transfer(&from, BTC_RECEIVER, "0.000005", None))
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::InvalidAmount(_)), "{:?}", err);
}

// ============================================================================
// Solana batches and updates
// ============================================================================

#[tokio::test]
async fn test_sol_batch_creates_receiver_account_once() {
    let fx = Fixture::new();
    let vault = fx.hd_vault("sol--101").await;
    let from = vault.account().address.clone();
    let mint = Pubkey::new_unique().to_string();
    fx.add_sol_token(&mint, 6);
    let to = Keypair::new().pubkey().to_string();

    let encoded = vault
        .build_encoded_tx_from_batch_transfer(&[
            transfer(&from, &to, "0.1", None),
            transfer(&from, &to, "1", Some(&mint)),
            transfer(&from, &to, "2.5", Some(&mint)),
        ])
        .await
        .unwrap();

    let EncodedTx::Sol(blob) = &encoded else {
        panic!("expected a solana transaction");
    };
    let tx = decode_transaction(blob).unwrap();
    let creates = tx
        .message
        .instructions
        .iter()
        .filter(|ix| {
            matches!(
                parse_instruction(&tx.message.account_keys, ix),
                ParsedInstruction::CreateAssociatedAccount { .. }
            )
        })
        .count();
    assert_eq!(creates, 1);

    let decoded = vault.decode_tx(&encoded, &DecodeContext::Default).await.unwrap();
    let amounts: Vec<&str> = decoded
        .actions
        .iter()
        .map(|a| a.transfer().expect("transfer").amount.as_str())
        .collect();
    assert_eq!(amounts, vec!["0.1", "1", "2.5"]);
    assert!(decoded.actions.iter().all(|a| a.direction == ActionDirection::Out));
}

#[tokio::test]
async fn test_sol_batch_needs_one_receiver() {
    let fx = Fixture::new();
    let vault = fx.hd_vault("sol--101").await;
    let from = vault.account().address.clone();
    let a = Keypair::new().pubkey().to_string();
    let b = Keypair::new().pubkey().to_string();

    assert!(vault
        .build_encoded_tx_from_batch_transfer(&[
            transfer(&from, &a, "0.1", None),
            transfer(&from, &b, "0.1", None),
        ])
        .await
        .is_err());
    assert!(vault.build_encoded_tx_from_batch_transfer(&[]).await.is_err());
}

#[tokio::test]
async fn test_sol_native_update_keeps_payer_and_blockhash() {
    let fx = Fixture::new();
    let vault = fx.hd_vault("sol--101").await;
    let from = vault.account().address.clone();
    let to = Keypair::new().pubkey().to_string();

    let encoded = vault
        .build_encoded_tx_from_transfer(&transfer(&from, &to, "0.25", None))
        .await
        .unwrap();
    let updated = vault
        .update_encoded_tx(
            encoded.clone(),
            &EncodedTxUpdatePayload {
                amount: "0.75".to_string(),
            },
            &EncodedTxUpdateOptions {
                update_type: EncodedTxUpdateType::Transfer,
            },
        )
        .await
        .unwrap();

    let (EncodedTx::Sol(before), EncodedTx::Sol(after)) = (&encoded, &updated) else {
        panic!("expected solana transactions");
    };
    let before = decode_transaction(before).unwrap();
    let after = decode_transaction(after).unwrap();
    assert_eq!(after.message.account_keys[0], before.message.account_keys[0]);
    assert_eq!(after.message.recent_blockhash, before.message.recent_blockhash);

    let decoded = vault.decode_tx(&updated, &DecodeContext::Default).await.unwrap();
    let t = decoded.actions[0].transfer().expect("transfer");
    assert_eq!(t.amount, "0.75");
    assert_eq!(t.to, to);
}

#[tokio::test]
async fn test_sol_token_update_is_left_unchanged() {
    let fx = Fixture::new();
    let vault = fx.hd_vault("sol--101").await;
    let from = vault.account().address.clone();
    let mint = Pubkey::new_unique().to_string();
    fx.add_sol_token(&mint, 6);
    let to = Keypair::new().pubkey().to_string();

    let encoded = vault
        .build_encoded_tx_from_transfer(&transfer(&from, &to, "1.5", Some(&mint)))
        .await
        .unwrap();
    let updated = vault
        .update_encoded_tx(
            encoded.clone(),
            &EncodedTxUpdatePayload {
                amount: "3".to_string(),
            },
            &EncodedTxUpdateOptions {
                update_type: EncodedTxUpdateType::Transfer,
            },
        )
        .await
        .unwrap();
    assert_eq!(updated, encoded);
}

// ============================================================================
// Decode contexts
// ============================================================================

#[tokio::test]
async fn test_internal_swap_context_replaces_actions() {
    let fx = Fixture::new();
    let vault = funded_xrp_vault(&fx).await;
    let from = vault.account().address.clone();
    let encoded = vault
        .build_encoded_tx_from_transfer(&transfer(&from, XRP_RECEIVER, "5", None))
        .await
        .unwrap();

    let xrp = fx.networks.get_network("xrp--0").unwrap();
    let btc = fx.networks.get_network("btc--0").unwrap();
    let swap = SwapInfo {
        send: SwapSide {
            token: native_token(&xrp),
            amount: "5".to_string(),
        },
        receive: SwapSide {
            token: native_token(&btc),
            amount: "0.0001".to_string(),
        },
        account_address: from.clone(),
        receiving_address: BTC_RECEIVER.to_string(),
        provider: "swft".to_string(),
        rate: "0.00002".to_string(),
    };

    let decoded = vault
        .decode_tx(&encoded, &DecodeContext::InternalSwap(swap.clone()))
        .await
        .unwrap();
    assert_eq!(decoded.actions.len(), 1);
    assert_eq!(decoded.actions[0].kind, ActionKind::InternalSwap(swap));
    assert_eq!(decoded.actions[0].direction, ActionDirection::Out);
    // Fee and nonce still come from the transaction
    assert_eq!(decoded.nonce, 3);
    assert_eq!(decoded.total_fee_in_native.as_deref(), Some("0.000012"));
}

#[tokio::test]
async fn test_nft_context_takes_direction_from_parties() {
    let fx = Fixture::new();
    let vault = funded_xrp_vault(&fx).await;
    let me = vault.account().address.clone();
    let encoded = vault
        .build_encoded_tx_from_transfer(&transfer(&me, XRP_RECEIVER, "1", None))
        .await
        .unwrap();

    let nft = |from: &str, to: &str| NftInfo {
        asset: "000800006203F49C21D5D6E022CB16DE3538F248662FC73C00000001".to_string(),
        amount: "1".to_string(),
        from: from.to_string(),
        to: to.to_string(),
    };
    let context = DecodeContext::NftTransfer(vec![nft(&me, XRP_RECEIVER), nft(XRP_RECEIVER, &me)]);

    let decoded = vault.decode_tx(&encoded, &context).await.unwrap();
    let directions: Vec<ActionDirection> = decoded.actions.iter().map(|a| a.direction).collect();
    assert_eq!(directions, vec![ActionDirection::Out, ActionDirection::In]);
    assert!(decoded
        .actions
        .iter()
        .all(|a| matches!(a.kind, ActionKind::NftTransfer(_))));
}

// ============================================================================
// Per-chain transfer rules
// ============================================================================

#[tokio::test]
async fn test_xrp_minimum_transfer_is_enforced() {
    let fx = Fixture::new();
    let vault = funded_xrp_vault(&fx).await;
    let from = vault.account().address.clone();

    let err = vault
        .build_encoded_tx_from_transfer(&transfer(&from, XRP_RECEIVER, "0.0005", None))
        .await
        .unwrap_err();
    match err {
        VaultError::InvalidAmount(msg) => assert!(msg.contains("minimum"), "{}", msg),
        other => panic!("expected InvalidAmount, got {:?}", other),
    }

    assert!(vault
        .build_encoded_tx_from_transfer(&transfer(&from, XRP_RECEIVER, "0.001", None))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_tokens_are_refused_where_unsupported() {
    let fx = Fixture::new();
    let vault = funded_xrp_vault(&fx).await;
    let from = vault.account().address.clone();

    let err = vault
        .build_encoded_tx_from_transfer(&transfer(&from, XRP_RECEIVER, "1", Some("USD.rIssuer")))
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::NotImplemented(_)), "{:?}", err);
}

#[tokio::test]
async fn test_xrp_fee_is_not_editable() {
    let fx = Fixture::new();
    let vault = funded_xrp_vault(&fx).await;
    let from = vault.account().address.clone();
    let encoded = vault
        .build_encoded_tx_from_transfer(&transfer(&from, XRP_RECEIVER, "1", None))
        .await
        .unwrap();

    let fee_info = vault.fetch_fee_info(&encoded).await.unwrap();
    assert!(fee_info.custom_disabled);
    assert!(!vault.settings().fee_info_editable);
    assert_eq!(fee_info.tx, Some(encoded));
}
