//! One notification cycle: ranking, fan-out fetch, matching and dispatch.

use std::sync::Arc;

use crate::email::Mailer;
use crate::feed::{FeedSource, ItemId};
use crate::fetch::{FanOut, FetchReport};
use crate::matching;
use crate::notify::Dispatcher;
use crate::subscriber::SubscriberStore;
use crate::{Config, ErrorKind, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Ids taken from the ranking after applying `feed.max_items`.
    pub ranked: usize,
    pub fetch: FetchReport,
    /// Items with at least one eligible subscriber.
    pub matched_items: usize,
    /// Subscriber notifications sent and recorded.
    pub notifications: usize,
    pub failed_batches: usize,
    /// Items skipped because the eligibility query failed.
    pub match_errors: usize,
}

#[derive(Clone)]
pub struct Pipeline {
    feed: Arc<dyn FeedSource>,
    fan_out: FanOut,
    store: SubscriberStore,
    dispatcher: Dispatcher,
    config: Arc<Config>,
}

impl Pipeline {
    pub fn new(
        feed: Arc<dyn FeedSource>,
        store: SubscriberStore,
        mailer: Arc<dyn Mailer>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            fan_out: FanOut::new(feed.clone(), &config.feed),
            dispatcher: Dispatcher::new(store.clone(), mailer, config.clone()),
            feed,
            store,
            config,
        }
    }

    /// Runs a single cycle.
    ///
    /// Only a failure to get the ranking fails the cycle. Per-item fetch,
    /// matching and send failures are logged and counted in the report.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let ids = self.ranking().await?;
        tracing::info!("cycle started with {} ranked items", ids.len());

        let mut report = CycleReport {
            ranked: ids.len(),
            ..Default::default()
        };

        let mut merged = self.fan_out.launch(ids);
        while let Some(item) = merged.next().await {
            let subscribers = match matching::eligible(&self.store, &item) {
                Ok(subscribers) => subscribers,
                Err(e) => {
                    tracing::error!("matching item {} failed: {e}", item.id);
                    report.match_errors += 1;
                    continue;
                }
            };
            if subscribers.is_empty() {
                continue;
            }

            report.matched_items += 1;
            let delivery = self.dispatcher.notify(&item, &subscribers).await;
            report.notifications += delivery.sent_to.len();
            report.failed_batches += delivery.errors.len();
        }
        report.fetch = merged.finish().await;

        tracing::info!(
            "cycle finished: {} fetched, {} skipped, {} failed, {} notifications for {} items",
            report.fetch.fetched,
            report.fetch.skipped,
            report.fetch.failed,
            report.notifications,
            report.matched_items,
        );
        Ok(report)
    }

    async fn ranking(&self) -> Result<Vec<ItemId>> {
        let mut ids = tokio::time::timeout(
            self.config.feed.fetch_timeout(),
            self.feed.top_item_ids(),
        )
        .await
        .map_err(|_| ErrorKind::Timeout("fetching ranking".to_string()))??;

        if self.config.feed.max_items > 0 {
            ids.truncate(self.config.feed.max_items);
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use crate::error::Category;
    use crate::feed::Item;
    use crate::mock::{RecordingMailer, StaticFeed};
    use crate::subscriber::{Preferences, TokenEffect};
    use crate::Database;

    struct Fixture {
        pipeline: Pipeline,
        feed: Arc<StaticFeed>,
        mailer: Arc<RecordingMailer>,
        store: SubscriberStore,
    }

    fn fixture(items: Vec<Item>, max_items: usize) -> Fixture {
        let store = SubscriberStore::new(&Database::temporary().unwrap()).unwrap();
        let feed = Arc::new(StaticFeed::new(items));
        let mailer = Arc::new(RecordingMailer::default());
        let config = Config {
            feed: config::Feed {
                max_items,
                ..Default::default()
            },
            ..Default::default()
        };
        let pipeline = Pipeline::new(feed.clone(), store.clone(), mailer.clone(), Arc::new(config));
        Fixture {
            pipeline,
            feed,
            mailer,
            store,
        }
    }

    fn item(id: ItemId, score: i64, title: &str) -> Item {
        Item {
            id,
            title: title.to_string(),
            url: format!("https://example.com/{id}"),
            score,
        }
    }

    fn subscribe(store: &SubscriberStore, email: &str, threshold: i64, words: &[&str]) {
        let preferences = Preferences {
            threshold,
            keywords: words.iter().map(|w| w.to_string()).collect(),
        };
        store.register(email, preferences, "t".into()).unwrap();
        store
            .consume_token(email, "t", TokenEffect::Activate(None))
            .unwrap();
    }

    #[tokio::test]
    async fn delivers_each_item_once() {
        let fx = fixture(
            vec![item(1, 500, "Rust in production"), item(2, 50, "Low score")],
            0,
        );
        subscribe(&fx.store, "a@x.com", 100, &[]);
        subscribe(&fx.store, "b@x.com", 10, &["python"]);

        let report = fx.pipeline.run_cycle().await.unwrap();
        assert_eq!(report.ranked, 2);
        assert_eq!(report.fetch.fetched, 2);
        assert_eq!(report.matched_items, 1);
        assert_eq!(report.notifications, 1);
        assert_eq!(fx.mailer.sent().len(), 1);
        assert_eq!(fx.mailer.sent()[0].subject, "Rust in production");

        let again = fx.pipeline.run_cycle().await.unwrap();
        assert_eq!(again.notifications, 0);
        assert_eq!(fx.mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn failed_batch_is_retried_next_cycle() {
        let fx = fixture(vec![item(7, 500, "Anything")], 0);
        subscribe(&fx.store, "a@x.com", 1, &[]);

        fx.mailer.fail_sends(true);
        let report = fx.pipeline.run_cycle().await.unwrap();
        assert_eq!(report.failed_batches, 1);
        assert_eq!(report.notifications, 0);

        fx.mailer.fail_sends(false);
        let report = fx.pipeline.run_cycle().await.unwrap();
        assert_eq!(report.notifications, 1);
        assert_eq!(fx.mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn item_failures_do_not_abort_the_cycle() {
        let fx = fixture(vec![item(1, 500, "a"), item(2, 500, "b"), item(3, 500, "c")], 0);
        subscribe(&fx.store, "a@x.com", 1, &[]);
        fx.feed.fail_items(&[2]);

        let report = fx.pipeline.run_cycle().await.unwrap();
        assert_eq!(report.fetch.failed, 1);
        assert_eq!(report.notifications, 2);
    }

    #[tokio::test]
    async fn ranking_failure_aborts_the_cycle() {
        let fx = fixture(vec![item(1, 500, "a")], 0);
        subscribe(&fx.store, "a@x.com", 1, &[]);
        fx.feed.fail_ranking(true);

        let err = fx.pipeline.run_cycle().await.unwrap_err();
        assert_ne!(err.category(), Category::Validation);
        assert!(fx.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn max_items_caps_the_ranking() {
        let fx = fixture(vec![item(1, 500, "a"), item(2, 500, "b"), item(3, 500, "c")], 2);
        subscribe(&fx.store, "a@x.com", 1, &[]);

        let report = fx.pipeline.run_cycle().await.unwrap();
        assert_eq!(report.ranked, 2);
        assert_eq!(report.notifications, 2);
        let subscriber = fx.store.find_by_email("a@x.com").unwrap().unwrap();
        assert!(!subscriber.sent_items.contains(&3));
    }
}
