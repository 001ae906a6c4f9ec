//! History and Query Integration Tests
//!
//! On-chain history reconciliation against local history, and ordering of
//! the batched balance and status queries.
//!
//! Run with: cargo test --test history_test -- --nocapture

mod common;

use std::collections::HashMap;

use chain_vault::client::esplora::AddressBalance;
use chain_vault::client::xrpl::{XrpLedgerTx, XrpTxMeta};
use chain_vault::{
    ActionDirection, BalanceRequest, ChainVault, HistoryOptions, HistoryOrigin, HistoryTx,
    TxStatus,
};

use common::{Delayed, Fixture, XRP_RECEIVER};

fn payment(hash: &str, from: &str, to: &str, drops: u64, result: Option<&str>) -> XrpLedgerTx {
    XrpLedgerTx {
        hash: hash.to_string(),
        transaction_type: "Payment".to_string(),
        account: from.to_string(),
        destination: Some(to.to_string()),
        amount: Some(serde_json::Value::String(drops.to_string())),
        fee: "12".to_string(),
        sequence: 3,
        destination_tag: None,
        date: Some(770_000_000),
        meta: result.map(|r| XrpTxMeta {
            transaction_result: r.to_string(),
        }),
        validated: result.is_some(),
    }
}

fn request(address: &str) -> BalanceRequest {
    BalanceRequest {
        address: address.to_string(),
        token_address: None,
    }
}

// ============================================================================
// History reconciliation
// ============================================================================

#[tokio::test]
async fn test_history_refetch_keeps_final_entries() {
    let fx = Fixture::new();
    let vault = fx.hd_vault("xrp--0").await;
    let me = vault.account().address.clone();
    *fx.xrpl.history.lock() = vec![
        payment(&"A".repeat(64), &me, XRP_RECEIVER, 1_000_000, Some("tesSUCCESS")),
        payment(&"B".repeat(64), XRP_RECEIVER, &me, 2_500_000, Some("tesSUCCESS")),
        payment(&"C".repeat(64), &me, XRP_RECEIVER, 10, Some("tecUNFUNDED_PAYMENT")),
        payment(&"D".repeat(64), &me, XRP_RECEIVER, 500_000, None),
    ];

    let first = vault
        .fetch_on_chain_history(&HistoryOptions::default())
        .await
        .unwrap();
    assert_eq!(first.len(), 4);
    assert!(first.iter().all(|h| h.origin == HistoryOrigin::OnChain));

    let statuses: Vec<TxStatus> = first.iter().map(|h| h.decoded_tx.status).collect();
    assert_eq!(
        statuses,
        vec![
            TxStatus::Confirmed,
            TxStatus::Confirmed,
            TxStatus::Failed,
            TxStatus::Pending
        ]
    );
    assert_eq!(first[0].decoded_tx.actions[0].direction, ActionDirection::Out);
    assert_eq!(first[1].decoded_tx.actions[0].direction, ActionDirection::In);
    assert_eq!(
        first[1].decoded_tx.actions[0].transfer().unwrap().amount,
        "2.5"
    );
    assert_eq!(
        first[0].id,
        HistoryTx::history_id(&vault.account().id, &"A".repeat(64))
    );

    let second = vault
        .fetch_on_chain_history(&HistoryOptions {
            local_history: first.clone(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(second.len(), 4);

    let before: HashMap<&str, &HistoryTx> =
        first.iter().map(|h| (h.decoded_tx.txid.as_str(), h)).collect();
    for entry in &second {
        let previous = before[entry.decoded_tx.txid.as_str()];
        if previous.decoded_tx.is_final {
            assert_eq!(entry.decoded_tx, previous.decoded_tx);
        } else {
            assert_eq!(entry.origin, HistoryOrigin::Merged);
            assert_eq!(entry.decoded_tx.actions, previous.decoded_tx.actions);
            assert_eq!(entry.decoded_tx.created_at, previous.decoded_tx.created_at);
        }
    }
}

#[tokio::test]
async fn test_pending_local_entry_takes_chain_status() {
    let fx = Fixture::new();
    let vault = fx.hd_vault("xrp--0").await;
    let me = vault.account().address.clone();
    let hash = "E".repeat(64);

    *fx.xrpl.history.lock() = vec![payment(&hash, &me, XRP_RECEIVER, 1_000_000, None)];
    let pending = vault
        .fetch_on_chain_history(&HistoryOptions::default())
        .await
        .unwrap();
    assert_eq!(pending[0].decoded_tx.status, TxStatus::Pending);

    *fx.xrpl.history.lock() = vec![payment(&hash, &me, XRP_RECEIVER, 1_000_000, Some("tesSUCCESS"))];
    let confirmed = vault
        .fetch_on_chain_history(&HistoryOptions {
            local_history: pending,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(confirmed[0].decoded_tx.status, TxStatus::Confirmed);
    assert!(confirmed[0].decoded_tx.is_final);
    assert_eq!(confirmed[0].origin, HistoryOrigin::Merged);
}

// ============================================================================
// Batched queries
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_balances_keep_request_order() {
    let fx = Fixture::new();
    let vault = fx.hd_vault("sol--101").await;
    {
        let mut balances = fx.solana.balances.lock();
        // The first request resolves last
        balances.insert("addr-1".to_string(), Delayed::ok(111, 300));
        balances.insert("addr-2".to_string(), Delayed::err("connection reset", 10));
        balances.insert("addr-3".to_string(), Delayed::ok(333, 50));
    }

    let balances = vault
        .get_balances(&[request("addr-1"), request("addr-2"), request("addr-3")])
        .await;

    assert_eq!(balances, vec![Some(111), None, Some(333)]);
}

#[tokio::test(start_paused = true)]
async fn test_btc_balances_keep_request_order() {
    let fx = Fixture::new();
    let vault = fx.hd_vault("btc--0").await;
    let primary = vault.account().address.clone();
    {
        let mut balances = fx.esplora.balances.lock();
        balances.insert(
            primary.clone(),
            Delayed::ok(
                AddressBalance {
                    confirmed_sats: 70_000,
                    unconfirmed_sats: 5_000,
                },
                200,
            ),
        );
        balances.insert("bc1-broken".to_string(), Delayed::err("timeout", 1));
    }

    let balances = vault
        .get_balances(&[
            request("bc1-broken"),
            request(&primary),
            BalanceRequest {
                address: primary.clone(),
                token_address: Some("not-a-token".to_string()),
            },
        ])
        .await;

    assert_eq!(balances, vec![None, Some(75_000), None]);
}

#[tokio::test]
async fn test_statuses_follow_txid_order() {
    let fx = Fixture::new();
    let vault = fx.hd_vault("xrp--0").await;
    let me = vault.account().address.clone();
    *fx.xrpl.history.lock() = vec![
        payment(&"1".repeat(64), &me, XRP_RECEIVER, 1, Some("tesSUCCESS")),
        payment(&"2".repeat(64), &me, XRP_RECEIVER, 1, None),
    ];

    let statuses = vault
        .get_transaction_statuses(&["2".repeat(64), "9".repeat(64), "1".repeat(64)])
        .await;

    assert_eq!(
        statuses,
        vec![Some(TxStatus::Pending), None, Some(TxStatus::Confirmed)]
    );
}
