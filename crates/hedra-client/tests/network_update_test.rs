//! A membership updater attached to a client changes the nodes its requests
//! go to.

mod common;

use async_trait::async_trait;
use common::{ledger_client, BASE_PORT};
use hedra_client::{AccountBalanceQuery, PrivateKey, Transaction};
use hedra_common::{AccountId, HedraError, Result};
use hedra_network::{AddressBookSource, NodeAddress};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Address book whose contents the test swaps between ticks.
#[derive(Default)]
struct SwappableBook {
    members: Mutex<Vec<u64>>,
}

impl SwappableBook {
    fn publish(&self, nodes: &[u64]) {
        *self.members.lock() = nodes.to_vec();
    }
}

#[async_trait]
impl AddressBookSource<AccountId> for SwappableBook {
    async fn fetch(&self) -> Result<Vec<(AccountId, NodeAddress)>> {
        self.members
            .lock()
            .iter()
            .map(|n| Ok((AccountId::from(*n), NodeAddress::new("127.0.0.1", BASE_PORT + *n as u16)?)))
            .collect()
    }
}

fn operator() -> AccountId {
    AccountId::from(1001)
}

#[tokio::test(start_paused = true)]
async fn test_updater_moves_client_to_new_membership() {
    let (client, ledger) = ledger_client(&[3]);
    client.set_operator(operator(), Arc::new(PrivateKey::from_seed([5; 32])));

    let book = Arc::new(SwappableBook::default());
    book.publish(&[4]);
    let updater = client.spawn_network_updater(book.clone(), Duration::from_secs(60));

    // the first fetch runs right away
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(client.network().node_account_ids(), vec![AccountId::from(4)]);

    let response = Transaction::transfer([(operator(), -1), (AccountId::from(1002), 1)])
        .execute(&client)
        .await
        .unwrap();
    assert_eq!(response.node_account_id, AccountId::from(4));
    assert_eq!(ledger.calls_to(3), 0);

    book.publish(&[5]);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(client.network().node_account_ids(), vec![AccountId::from(5)]);

    let balance = AccountBalanceQuery::new(AccountId::from(1002))
        .execute(&client)
        .await
        .unwrap();
    assert_eq!(balance.hbars, 100_200);
    assert_eq!(ledger.calls_to(5), 1);

    // an explicit request for a removed node is refused
    let err = AccountBalanceQuery::new(AccountId::from(1002))
        .set_node_account_ids(vec![AccountId::from(4)])
        .execute(&client)
        .await
        .unwrap_err();
    assert!(matches!(err, HedraError::NodeAccountUnknown(id) if id == AccountId::from(4)));

    drop(updater);
}
