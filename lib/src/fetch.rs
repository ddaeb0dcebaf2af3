//! Concurrent item fetching with fan-in.
//!
//! One task is launched per id into a [`JoinSet`]. Every task holds its own
//! clone of the channel sender, so the merged stream closes exactly when the
//! last task finishes, whether it produced an item, produced nothing or
//! panicked. Arrival order is completion order.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

use crate::feed::{FeedSource, Item, ItemId};
use crate::ErrorKind;

/// Per-cycle fetch statistics, available once every task has finished.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FetchReport {
    pub launched: usize,
    pub fetched: usize,
    /// Responses that were empty, mismatched, deleted or dead.
    pub skipped: usize,
    /// Network, decode or timeout failures, and panicked tasks.
    pub failed: usize,
}

enum Outcome {
    Fetched,
    Skipped,
    Failed,
}

#[derive(Clone)]
pub struct FanOut {
    source: Arc<dyn FeedSource>,
    timeout: Duration,
    limit: Option<Arc<Semaphore>>,
}

impl FanOut {
    pub fn new(source: Arc<dyn FeedSource>, config: &crate::config::Feed) -> Self {
        let limit = match config.max_concurrent_fetches {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n))),
        };
        Self {
            source,
            timeout: config.fetch_timeout(),
            limit,
        }
    }

    /// Launches one fetch per id and returns the merged stream.
    pub fn launch(&self, ids: Vec<ItemId>) -> Merged {
        let (tx, rx) = mpsc::channel(ids.len().max(1));
        let this = self.clone();

        let supervisor = tokio::spawn(async move {
            let mut report = FetchReport {
                launched: ids.len(),
                ..Default::default()
            };

            let mut set = JoinSet::new();
            for id in ids {
                let tx = tx.clone();
                let this = this.clone();
                set.spawn(async move { this.fetch_one(id, tx).await });
            }
            // Only the tasks keep the channel open from here on.
            drop(tx);

            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(Outcome::Fetched) => report.fetched += 1,
                    Ok(Outcome::Skipped) => report.skipped += 1,
                    Ok(Outcome::Failed) => report.failed += 1,
                    Err(e) => {
                        tracing::error!("fetch task did not complete: {e}");
                        report.failed += 1;
                    }
                }
            }
            report
        });

        Merged {
            items: rx,
            supervisor: Some(supervisor),
        }
    }

    async fn fetch_one(&self, id: ItemId, tx: mpsc::Sender<Item>) -> Outcome {
        let _permit = match &self.limit {
            Some(limit) => limit.clone().acquire_owned().await.ok(),
            None => None,
        };

        let result = match tokio::time::timeout(self.timeout, self.source.item(id)).await {
            Ok(result) => result,
            Err(_) => Err(ErrorKind::Timeout(format!("fetching item {id}")).into()),
        };

        match result {
            Ok(Some(item)) => {
                // The receiver is only gone when the cycle was abandoned.
                if tx.send(item).await.is_err() {
                    tracing::debug!("merged stream dropped before item {id} arrived");
                }
                Outcome::Fetched
            }
            Ok(None) => Outcome::Skipped,
            Err(e) => {
                tracing::warn!("skipping item {id}: {}", e.kind);
                Outcome::Failed
            }
        }
    }
}

/// Receiving end of a fan-out.
///
/// Dropping it before the barrier is reached aborts the remaining fetches.
pub struct Merged {
    items: mpsc::Receiver<Item>,
    supervisor: Option<JoinHandle<FetchReport>>,
}

impl Merged {
    /// Next item in completion order. `None` once every task has finished.
    pub async fn next(&mut self) -> Option<Item> {
        self.items.recv().await
    }

    /// Waits for the barrier and returns the fetch statistics.
    pub async fn finish(mut self) -> FetchReport {
        // Drain whatever is left so no task blocks on a full channel.
        while self.items.recv().await.is_some() {}
        let Some(supervisor) = self.supervisor.take() else {
            return FetchReport::default();
        };
        match supervisor.await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!("fetch supervisor failed: {e}");
                FetchReport::default()
            }
        }
    }

    /// Collects the whole stream. Convenient where streaming is not needed.
    pub async fn collect(mut self) -> (Vec<Item>, FetchReport) {
        let mut items = Vec::new();
        while let Some(item) = self.next().await {
            items.push(item);
        }
        let report = self.finish().await;
        (items, report)
    }
}

impl Drop for Merged {
    fn drop(&mut self) {
        if let Some(supervisor) = self.supervisor.take() {
            supervisor.abort();
        }
    }
}
