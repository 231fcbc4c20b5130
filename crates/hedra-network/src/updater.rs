use async_trait::async_trait;
use hedra_common::Result;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::address::NodeAddress;
use crate::pool::NodePool;

/// Supplies the target membership of a pool.
#[async_trait]
pub trait AddressBookSource<K>: Send + Sync {
    async fn fetch(&self) -> Result<Vec<(K, NodeAddress)>>;
}

/// Handle to a running membership updater. Dropping it stops the task.
pub struct NetworkUpdater {
    handle: JoinHandle<()>,
}

impl NetworkUpdater {
    /// Starts reconciling `pool` against `source` every `interval`.
    ///
    /// The first fetch happens immediately. A failed fetch only logs; the pool
    /// is left as it was until the next tick.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<K>(
        pool: Arc<NodePool<K>>,
        source: Arc<dyn AddressBookSource<K>>,
        interval: Duration,
    ) -> Self
    where
        K: Clone + Eq + Hash + fmt::Display + Send + Sync + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                Self::update_once(&pool, source.as_ref()).await;
            }
        });

        Self { handle }
    }

    async fn update_once<K>(pool: &NodePool<K>, source: &dyn AddressBookSource<K>)
    where
        K: Clone + Eq + Hash + fmt::Display + Send + Sync + 'static,
    {
        match source.fetch().await {
            Ok(members) if members.is_empty() => {
                warn!("address book is empty, keeping current membership");
            }
            Ok(members) => {
                let report = pool.reconcile(members).await;
                if report.is_empty() {
                    debug!("address book unchanged");
                } else {
                    info!(
                        added = report.added.len(),
                        removed = report.removed.len(),
                        "applied address book update"
                    );
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch address book");
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}

impl Drop for NetworkUpdater {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
