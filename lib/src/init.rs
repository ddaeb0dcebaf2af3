//! Assembly of the application state.
//!
//! Decides between the real feed and mailer and their in-memory stand-ins,
//! and wires the store into the pipeline and the subscription lifecycle.

use std::sync::Arc;

use crate::email::{Mailer, SmtpMailer};
use crate::feed::{FeedSource, HnClient};
use crate::pipeline::Pipeline;
use crate::scheduler::Scheduler;
use crate::subscriber::SubscriberStore;
use crate::subscription::Subscriptions;
use crate::{mock, Config, Database, Result};

/// Shared handles passed to every component. Cheap to clone.
#[derive(Clone)]
pub struct Services {
    pub config: Arc<Config>,
    pub store: SubscriberStore,
    pub pipeline: Arc<Pipeline>,
    pub subscriptions: Arc<Subscriptions>,
}

impl Services {
    pub fn scheduler(&self) -> Scheduler {
        Scheduler::from_config(self.pipeline.clone(), &self.config.feed)
    }
}

/// Builds the services on top of an opened database.
///
/// With `dev.enabled` and `dev.mock` set, the feed serves [`mock::items`],
/// mail only goes to the log and a mock subscriber is created.
pub fn initialize(config: Config, db: &Database) -> Result<Services> {
    let config = Arc::new(config);
    let store = SubscriberStore::new(db)?;

    let mock = config.dev.enabled && config.dev.mock;
    let (feed, mailer): (Arc<dyn FeedSource>, Arc<dyn Mailer>) = if mock {
        tracing::warn!("dev mode: using mock feed and log-only mailer");
        mock::generate(&config, &store)?;
        (
            Arc::new(mock::StaticFeed::new(mock::items())),
            Arc::new(mock::LogMailer),
        )
    } else {
        (
            Arc::new(HnClient::new(&config.feed)?),
            Arc::new(SmtpMailer::new(&config.email)?),
        )
    };

    Ok(Services {
        pipeline: Arc::new(Pipeline::new(
            feed,
            store.clone(),
            mailer.clone(),
            config.clone(),
        )),
        subscriptions: Arc::new(Subscriptions::new(store.clone(), mailer, config.clone())),
        store,
        config,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DevMode;

    #[tokio::test]
    async fn mock_mode_runs_a_cycle_for_the_mock_subscriber() {
        let config = Config {
            dev: DevMode {
                enabled: true,
                mock: true,
            },
            ..Default::default()
        };
        let services = initialize(config, &Database::temporary().unwrap()).unwrap();
        assert_eq!(services.store.count(), 1);

        let report = services.pipeline.run_cycle().await.unwrap();
        assert_eq!(report.fetch.fetched, mock::items().len());
        assert_eq!(report.notifications, mock::items().len());
    }
}
