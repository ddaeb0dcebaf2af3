//! Periodic, single-flight cycle trigger.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::pipeline::{CycleReport, Pipeline};
use crate::{ErrorKind, Result};

#[derive(Clone)]
pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    interval: Duration,
    deadline: Duration,
    running: Arc<AtomicBool>,
}

/// Holds the in-flight flag for the duration of one cycle.
struct Flight<'a>(&'a AtomicBool);

impl<'a> Flight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Flight(flag))
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Scheduler {
    pub fn new(pipeline: Arc<Pipeline>, interval: Duration, deadline: Duration) -> Self {
        Self {
            pipeline,
            interval,
            deadline,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_config(pipeline: Arc<Pipeline>, config: &crate::config::Feed) -> Self {
        Self::new(pipeline, config.interval(), config.cycle_deadline())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Runs one cycle unless another one is in flight, in which case `None`
    /// is returned right away. A cycle exceeding the deadline is abandoned
    /// and reported as a timeout.
    pub async fn trigger(&self) -> Option<Result<CycleReport>> {
        let Some(_flight) = Flight::acquire(&self.running) else {
            tracing::warn!("previous cycle still running, skipping");
            return None;
        };

        match tokio::time::timeout(self.deadline, self.pipeline.run_cycle()).await {
            Ok(result) => Some(result),
            Err(_) => Some(Err(ErrorKind::Timeout(format!(
                "cycle exceeded its deadline of {}s",
                self.deadline.as_secs_f32()
            ))
            .into())),
        }
    }

    /// Fires a cycle every interval, starting immediately, until `shutdown`
    /// is cancelled. Cycles run on their own tasks so that a tick arriving
    /// during a slow cycle is seen and skipped instead of queued.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!("scheduling a cycle every {}s", self.interval.as_secs());

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let this = self.clone();
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = shutdown.cancelled() => {
                                tracing::info!("cycle interrupted by shutdown");
                            }
                            outcome = this.trigger() => match outcome {
                                Some(Ok(_)) | None => (),
                                Some(Err(e)) => tracing::error!("cycle failed: {e}"),
                            },
                        }
                    });
                }
            }
        }
        tracing::info!("scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use futures::future::BoxFuture;
    use futures::FutureExt;

    use super::*;
    use crate::feed::{FeedSource, Item, ItemId};
    use crate::mock::RecordingMailer;
    use crate::subscriber::SubscriberStore;
    use crate::{Config, Database};

    /// Ranking takes `delay` and is counted. There are no items.
    struct SlowRanking {
        delay: Duration,
        calls: AtomicUsize,
    }

    impl FeedSource for SlowRanking {
        fn top_item_ids(&self) -> BoxFuture<'_, Result<Vec<ItemId>>> {
            async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(self.delay).await;
                Ok(vec![])
            }
            .boxed()
        }

        fn item(&self, _id: ItemId) -> BoxFuture<'_, Result<Option<Item>>> {
            async { Ok(None) }.boxed()
        }
    }

    fn scheduler(delay: Duration, interval: Duration, deadline: Duration) -> (Scheduler, Arc<SlowRanking>) {
        let feed = Arc::new(SlowRanking {
            delay,
            calls: AtomicUsize::new(0),
        });
        let store = SubscriberStore::new(&Database::temporary().unwrap()).unwrap();
        let pipeline = Pipeline::new(
            feed.clone(),
            store,
            Arc::new(RecordingMailer::default()),
            Arc::new(Config::default()),
        );
        (Scheduler::new(Arc::new(pipeline), interval, deadline), feed)
    }

    #[tokio::test]
    async fn overlapping_trigger_is_skipped() {
        let (scheduler, feed) = scheduler(
            Duration::from_millis(200),
            Duration::from_secs(60),
            Duration::from_secs(5),
        );

        let (first, second) = tokio::join!(scheduler.trigger(), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            scheduler.trigger().await
        });
        assert!(matches!(first, Some(Ok(_))));
        assert!(second.is_none());
        assert_eq!(feed.calls.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn deadline_abandons_cycle_and_releases_guard() {
        let (scheduler, feed) = scheduler(
            Duration::from_secs(30),
            Duration::from_secs(60),
            Duration::from_millis(50),
        );

        let err = scheduler.trigger().await.unwrap().unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Timeout(_)));
        assert!(!scheduler.is_running());

        // the guard is free again
        assert!(scheduler.trigger().await.is_some());
        assert_eq!(feed.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn run_fires_immediately_and_stops_on_shutdown() {
        let (scheduler, feed) = scheduler(
            Duration::from_millis(1),
            Duration::from_millis(40),
            Duration::from_secs(5),
        );
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(scheduler.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(150)).await;
        shutdown.cancel();
        handle.await.unwrap();

        let calls = feed.calls.load(Ordering::SeqCst);
        assert!(calls >= 2, "expected repeated cycles, got {calls}");
    }
}
