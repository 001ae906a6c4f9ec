//! Broadcast Integration Tests
//!
//! Retry behaviour of `broadcast_transaction` under "node behind" errors, and
//! a full sign-and-broadcast of an XRP payment through the HD keyring.
//!
//! Time is paused so retry delays elapse instantly.
//!
//! Run with: cargo test --test broadcast_test -- --nocapture

mod common;

use chain_vault::client::xrpl::XrpAccountInfo;
use chain_vault::{ChainVault, ClientError, SignOptions, SignedTx, TransferInfo, VaultError};

use common::{node_behind, Fixture, PASSWORD, XRP_RECEIVER};

fn signed_sol_tx() -> SignedTx {
    SignedTx {
        txid: "local-signature".to_string(),
        raw_tx: bs58::encode([1u8, 2, 3, 4, 5]).into_string(),
        encoded_tx: None,
    }
}

// ============================================================================
// Retry budget
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_broadcast_succeeds_on_fourth_attempt() {
    let fx = Fixture::new();
    let vault = fx.hd_vault("sol--101").await;
    {
        let mut results = fx.solana.send_results.lock();
        for _ in 0..3 {
            results.push_back(Err(node_behind()));
        }
    }

    let signed = vault.broadcast_transaction(signed_sol_tx()).await.unwrap();

    assert_eq!(fx.solana.send_count(), 4);
    assert_eq!(signed.txid, "sent-signature");
    // The first retryable failure switches submission to the lenient commitment
    let preflights = fx.solana.preflights.lock().clone();
    assert_eq!(preflights[0], None);
    assert!(preflights[1..]
        .iter()
        .all(|p| p.as_deref() == Some("confirmed")));
}

#[tokio::test(start_paused = true)]
async fn test_broadcast_gives_up_after_eight_attempts() {
    let fx = Fixture::new();
    let vault = fx.hd_vault("sol--101").await;
    {
        let mut results = fx.solana.send_results.lock();
        for _ in 0..20 {
            results.push_back(Err(node_behind()));
        }
    }

    let err = vault.broadcast_transaction(signed_sol_tx()).await.unwrap_err();

    match err {
        VaultError::RetryExhausted {
            attempts,
            last_message,
        } => {
            assert_eq!(attempts, 8);
            assert!(last_message.contains("behind"), "{}", last_message);
        }
        other => panic!("expected RetryExhausted, got {:?}", other),
    }
    assert_eq!(fx.solana.send_count(), 8);
}

#[tokio::test(start_paused = true)]
async fn test_terminal_error_is_not_retried() {
    let fx = Fixture::new();
    let vault = fx.hd_vault("sol--101").await;
    fx.solana.send_results.lock().push_back(Err(ClientError::Rpc {
        code: -32003,
        message: "Transaction signature verification failure".to_string(),
        data: None,
    }));

    let err = vault.broadcast_transaction(signed_sol_tx()).await.unwrap_err();

    assert!(matches!(err, VaultError::Client(ClientError::Rpc { code: -32003, .. })));
    assert_eq!(fx.solana.send_count(), 1);
}

// ============================================================================
// Sign and broadcast
// ============================================================================

#[tokio::test]
async fn test_xrp_sign_and_broadcast() {
    let fx = Fixture::new();
    let vault = fx.hd_vault("xrp--0").await;
    let from = vault.account().address.clone();
    fx.xrpl.accounts.lock().insert(
        from.clone(),
        XrpAccountInfo {
            balance: 50_000_000,
            sequence: 1,
        },
    );

    let encoded = vault
        .build_encoded_tx_from_transfer(&TransferInfo {
            from,
            to: XRP_RECEIVER.to_string(),
            amount: "2".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    let unsigned = vault.build_unsigned_tx_from_encoded_tx(encoded).await.unwrap();
    assert_eq!(unsigned.sign_requests.len(), 1);

    // Software keyrings need the wallet password
    assert!(vault
        .sign_and_broadcast(&unsigned, &SignOptions::default())
        .await
        .is_err());
    assert!(fx.xrpl.submitted.lock().is_empty());

    let signed = vault
        .sign_and_broadcast(&unsigned, &SignOptions::with_password(PASSWORD))
        .await
        .unwrap();

    assert_eq!(signed.txid.len(), 64);
    let submitted = fx.xrpl.submitted.lock().clone();
    assert_eq!(submitted, vec![signed.raw_tx.clone()]);
}
