//! Delivery of item notifications with sent-state bookkeeping.
//!
//! Recipients of one item are split into batches of at most
//! `subscription.max_recipients_per_message` and each batch is a single
//! Bcc message. A batch is all-or-nothing: only after the relay accepted it
//! is the item added to the `sent_items` of every subscriber in it. A failed
//! batch leaves its subscribers eligible for the next cycle, so delivery is
//! at-least-once.

use std::sync::Arc;

use crate::email::{self, Mailer};
use crate::feed::Item;
use crate::subscriber::{Subscriber, SubscriberId, SubscriberStore};
use crate::{Config, Error};

/// Outcome of notifying about one item.
#[derive(Debug, Default)]
pub struct Delivery {
    /// Subscribers whose batch was accepted and recorded.
    pub sent_to: Vec<SubscriberId>,
    pub batches: usize,
    /// One entry per failed batch.
    pub errors: Vec<Error>,
}

#[derive(Clone)]
pub struct Dispatcher {
    store: SubscriberStore,
    mailer: Arc<dyn Mailer>,
    config: Arc<Config>,
}

impl Dispatcher {
    pub fn new(store: SubscriberStore, mailer: Arc<dyn Mailer>, config: Arc<Config>) -> Self {
        Self {
            store,
            mailer,
            config,
        }
    }

    pub async fn notify(&self, item: &Item, subscribers: &[Subscriber]) -> Delivery {
        let mut delivery = Delivery::default();
        let batch_size = self.config.subscription.max_recipients_per_message.max(1);

        for batch in subscribers.chunks(batch_size) {
            delivery.batches += 1;
            let recipients = batch.iter().map(|s| s.email.clone()).collect();
            let sent = match email::item_notification(&self.config, item, recipients) {
                Ok(mail) => self.mailer.send(mail).await,
                Err(e) => Err(e),
            };

            if let Err(e) = sent {
                tracing::error!(
                    "sending item {} to {} recipients failed: {e}",
                    item.id,
                    batch.len()
                );
                delivery.errors.push(e);
                continue;
            }

            let ids: Vec<SubscriberId> = batch.iter().map(|s| s.id).collect();
            match self.store.add_sent_item(&ids, item.id) {
                Ok(_) => {
                    tracing::info!("item {} sent to {} subscribers", item.id, ids.len());
                    delivery.sent_to.extend(ids);
                }
                Err(e) => {
                    // Mail is out but not recorded. The batch may get the
                    // item again next cycle.
                    tracing::error!("recording item {} as sent failed: {e}", item.id);
                    delivery.errors.push(e);
                }
            }
        }

        delivery
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Subscription;
    use crate::email::Recipients;
    use crate::mock::RecordingMailer;
    use crate::subscriber::{Preferences, TokenEffect};
    use crate::Database;

    fn setup(batch: usize, subscribers: usize) -> (Dispatcher, Arc<RecordingMailer>, Vec<Subscriber>) {
        let store = SubscriberStore::new(&Database::temporary().unwrap()).unwrap();
        let mut active = Vec::new();
        for n in 0..subscribers {
            let email = format!("s{n}@x.com");
            store
                .register(&email, Preferences::default(), "t".into())
                .unwrap();
            active.push(
                store
                    .consume_token(&email, "t", TokenEffect::Activate(None))
                    .unwrap()
                    .unwrap(),
            );
        }

        let config = Config {
            subscription: Subscription {
                max_recipients_per_message: batch,
                ..Default::default()
            },
            ..Default::default()
        };
        let mailer = Arc::new(RecordingMailer::default());
        let dispatcher = Dispatcher::new(store, mailer.clone(), Arc::new(config));
        (dispatcher, mailer, active)
    }

    fn item() -> Item {
        Item {
            id: 42,
            title: "Something happened".to_string(),
            url: "https://example.com".to_string(),
            score: 350,
        }
    }

    #[tokio::test]
    async fn recipients_are_batched_and_recorded() {
        let (dispatcher, mailer, subscribers) = setup(2, 5);

        let delivery = dispatcher.notify(&item(), &subscribers).await;
        assert_eq!(delivery.batches, 3);
        assert_eq!(delivery.sent_to.len(), 5);
        assert!(delivery.errors.is_empty());

        let sizes: Vec<_> = mailer.sent().iter().map(|m| m.recipients.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert!(mailer
            .sent()
            .iter()
            .all(|m| matches!(m.recipients, Recipients::Bcc(_))));

        for s in &subscribers {
            let stored = dispatcher.store.get(s.id).unwrap().unwrap();
            assert!(stored.sent_items.contains(&42));
        }
    }

    #[tokio::test]
    async fn failed_send_records_nothing() {
        let (dispatcher, mailer, subscribers) = setup(10, 3);
        mailer.fail_sends(true);

        let delivery = dispatcher.notify(&item(), &subscribers).await;
        assert!(delivery.sent_to.is_empty());
        assert_eq!(delivery.errors.len(), 1);

        for s in &subscribers {
            let stored = dispatcher.store.get(s.id).unwrap().unwrap();
            assert!(stored.sent_items.is_empty());
        }
        assert_eq!(
            crate::matching::eligible(&dispatcher.store, &item())
                .unwrap()
                .len(),
            3
        );
    }

    #[tokio::test]
    async fn nobody_to_notify_sends_nothing() {
        let (dispatcher, mailer, _) = setup(10, 0);
        let delivery = dispatcher.notify(&item(), &[]).await;
        assert_eq!(delivery.batches, 0);
        assert!(mailer.sent().is_empty());
    }
}
