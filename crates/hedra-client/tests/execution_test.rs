//! End-to-end execution against an in-memory ledger: submission, retries,
//! failover, receipts and paid queries.

mod common;

use common::{ledger_client, QUERY_COST};
use hedra_client::{AccountBalanceQuery, AccountInfoQuery, PrivateKey, Transaction, TransactionResponse};
use hedra_common::{AccountId, HedraError, Status, TransactionData};
use std::sync::Arc;

fn operator() -> AccountId {
    AccountId::from(1001)
}

fn with_operator(client: &hedra_client::Client) -> PrivateKey {
    let key = PrivateKey::from_seed([5; 32]);
    client.set_operator(operator(), Arc::new(key.clone()));
    key
}

#[tokio::test]
async fn test_transfer_then_successful_receipt() {
    let (client, ledger) = ledger_client(&[3, 4, 5]);
    let key = with_operator(&client);

    let response = Transaction::transfer([(operator(), -10), (AccountId::from(1002), 10)])
        .execute(&client)
        .await
        .unwrap();
    let receipt = response.get_successful_receipt(&client).await.unwrap();
    assert_eq!(receipt.status, Status::Success);

    let accepted = ledger.accepted();
    assert_eq!(accepted.len(), 1);
    let (node, body, signed) = &accepted[0];
    assert_eq!(AccountId::from(*node), response.node_account_id);
    assert_eq!(body.transaction_id, response.transaction_id);
    assert_eq!(body.transaction_id.payer, operator());
    assert!(matches!(body.data, TransactionData::CryptoTransfer(_)));
    assert_eq!(signed.sig_map.pairs.len(), 1);
    assert!(key.public_key().verify(&signed.body_bytes, &signed.sig_map.pairs[0].signature));

    // receipt went to the node that accepted the transaction
    let receipt_calls: Vec<_> = ledger
        .calls()
        .into_iter()
        .filter(|(_, method)| method == "getTransactionReceipts")
        .collect();
    assert_eq!(receipt_calls, vec![(*node, "getTransactionReceipts".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn test_busy_node_is_retried_until_it_accepts() {
    let (client, ledger) = ledger_client(&[3]);
    with_operator(&client);
    ledger.set_busy(3, 2);

    let start = tokio::time::Instant::now();
    let response = Transaction::transfer([(operator(), -1), (AccountId::from(1002), 1)])
        .execute(&client)
        .await
        .unwrap();

    assert_eq!(response.node_account_id, AccountId::from(3));
    assert_eq!(ledger.calls_to(3), 3);
    assert_eq!(ledger.accepted().len(), 1);
    // 250ms after the first busy answer, 500ms after the second
    assert!(start.elapsed() >= std::time::Duration::from_millis(750));
}

#[tokio::test]
async fn test_unavailable_node_fails_over() {
    let (client, ledger) = ledger_client(&[3, 4]);
    with_operator(&client);
    ledger.set_down(3);

    let mut tx = Transaction::transfer([(operator(), -1), (AccountId::from(1002), 1)]);
    tx.set_node_account_ids(vec![AccountId::from(3), AccountId::from(4)]).unwrap();
    let response = tx.execute(&client).await.unwrap();

    assert_eq!(response.node_account_id, AccountId::from(4));
    assert!(!client.network().node(&AccountId::from(3)).unwrap().is_healthy());
    assert!(client.network().node(&AccountId::from(4)).unwrap().is_healthy());
}

#[tokio::test(start_paused = true)]
async fn test_all_nodes_down_exhausts_attempts() {
    let (client, ledger) = ledger_client(&[3, 4]);
    with_operator(&client);
    ledger.set_down(3);
    ledger.set_down(4);

    let err = Transaction::transfer([(operator(), -1), (AccountId::from(1002), 1)])
        .execute(&client)
        .await
        .unwrap_err();

    match err {
        HedraError::MaxAttemptsExceeded { max_attempts, last_error } => {
            assert_eq!(max_attempts, 10);
            assert!(last_error.is_some());
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(ledger.calls().len(), 9);
    assert!(ledger.accepted().is_empty());
}

#[tokio::test]
async fn test_receipt_for_unknown_transaction_fails_precheck() {
    let (client, ledger) = ledger_client(&[3]);
    with_operator(&client);

    let mut tx = Transaction::transfer([(operator(), -1), (AccountId::from(1002), 1)]);
    tx.freeze_with(&client).await.unwrap();
    let response = TransactionResponse {
        transaction_id: tx.transaction_id().unwrap(),
        node_account_id: AccountId::from(3),
        transaction_hash: Vec::new(),
    };

    let err = response.get_receipt(&client).await.unwrap_err();
    assert_eq!(err.status(), Some(Status::ReceiptNotFound));
    assert!(ledger.accepted().is_empty());
}

#[tokio::test]
async fn test_paid_query_pays_the_answering_node() {
    let (client, ledger) = ledger_client(&[3]);
    with_operator(&client);

    let info = AccountInfoQuery::new(AccountId::from(2002))
        .execute(&client)
        .await
        .unwrap();
    assert_eq!(info.balance, 200_200);

    let payments = ledger.payments();
    assert_eq!(payments.len(), 1);
    let (node, body) = &payments[0];
    assert_eq!(*node, 3);
    assert_eq!(body.transaction_id.payer, operator());
    match &body.data {
        TransactionData::CryptoTransfer(list) => {
            assert_eq!(list.net(), 0);
            assert!(list
                .transfers
                .iter()
                .any(|t| t.account_id == AccountId::from(3) && t.amount == QUERY_COST as i64));
        }
        other => panic!("unexpected payment {:?}", other),
    }
}

#[tokio::test]
async fn test_free_query_needs_no_operator() {
    let (client, ledger) = ledger_client(&[3, 4]);

    let balance = AccountBalanceQuery::new(AccountId::from(7))
        .execute(&client)
        .await
        .unwrap();
    assert_eq!(balance.hbars, 700);
    assert!(ledger.payments().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_ping_all_reports_only_unreachable_nodes() {
    let (client, ledger) = ledger_client(&[3, 4, 5]);
    ledger.set_down(4);

    let failures = client.ping_all().await;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, AccountId::from(4));
    assert!(matches!(failures[0].1, HedraError::MaxAttemptsExceeded { .. }));
}
