//! In-memory stand-ins for the feed and the mailer, plus mock data used to
//! populate a development database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::email::{Mail, Mailer};
use crate::feed::{FeedSource, Item, ItemId};
use crate::subscriber::{Preferences, Subscriber, SubscriberStore, TokenEffect};
use crate::{token, Config, ErrorKind, Result};

pub const MOCK_SUBSCRIBER_EMAIL: &str = "test@mail.com";

/// Feed serving a fixed set of items, ranked in insertion order.
#[derive(Default)]
pub struct StaticFeed {
    ranking: Mutex<Vec<ItemId>>,
    items: Mutex<HashMap<ItemId, Item>>,
    failing: Mutex<Vec<ItemId>>,
    ranking_fails: AtomicBool,
}

impl StaticFeed {
    pub fn new(items: Vec<Item>) -> Self {
        let feed = Self::default();
        feed.set_items(items);
        feed
    }

    /// Replaces the served items, e.g. to bump scores between cycles.
    pub fn set_items(&self, items: Vec<Item>) {
        let mut ranking = lock(&self.ranking);
        let mut map = lock(&self.items);
        ranking.clear();
        map.clear();
        for item in items {
            ranking.push(item.id);
            map.insert(item.id, item);
        }
    }

    /// Makes fetching the given ids fail with a transient error.
    pub fn fail_items(&self, ids: &[ItemId]) {
        *lock(&self.failing) = ids.to_vec();
    }

    pub fn fail_ranking(&self, fail: bool) {
        self.ranking_fails.store(fail, Ordering::SeqCst);
    }
}

impl FeedSource for StaticFeed {
    fn top_item_ids(&self) -> BoxFuture<'_, Result<Vec<ItemId>>> {
        let result = if self.ranking_fails.load(Ordering::SeqCst) {
            Err(ErrorKind::Other("mock ranking unavailable".to_string()).into())
        } else {
            Ok(lock(&self.ranking).clone())
        };
        async move { result }.boxed()
    }

    fn item(&self, id: ItemId) -> BoxFuture<'_, Result<Option<Item>>> {
        let result = if lock(&self.failing).contains(&id) {
            Err(ErrorKind::Other(format!("mock item {id} unavailable")).into())
        } else {
            Ok(lock(&self.items).get(&id).cloned())
        };
        async move { result }.boxed()
    }
}

/// Mailer keeping every accepted message in memory.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<Mail>>,
    fail: AtomicBool,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<Mail> {
        lock(&self.sent).clone()
    }

    /// While set, every send is rejected like a relay refusing the message.
    pub fn fail_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl Mailer for RecordingMailer {
    fn send(&self, mail: Mail) -> BoxFuture<'_, Result<()>> {
        let result = if self.fail.load(Ordering::SeqCst) {
            Err(ErrorKind::EmailBadResponse("554".to_string()).into())
        } else {
            lock(&self.sent).push(mail);
            Ok(())
        };
        async move { result }.boxed()
    }
}

/// Mailer that only writes messages to the log. Used in dev mode.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, mail: Mail) -> BoxFuture<'_, Result<()>> {
        tracing::info!(
            "mock mail to {:?}, subject: {}\n{}",
            mail.recipients,
            mail.subject,
            mail.plain
        );
        async { Ok(()) }.boxed()
    }
}

/// A few items resembling a front page.
pub fn items() -> Vec<Item> {
    vec![
        Item {
            id: 8863,
            title: "My YC app: Dropbox - Throw away your USB drive".to_string(),
            url: "http://www.getdropbox.com/u/2/screencast.html".to_string(),
            score: 111,
        },
        Item {
            id: 121003,
            title: "Ask HN: The Arc Effect".to_string(),
            url: String::new(),
            score: 25,
        },
        Item {
            id: 192327,
            title: "Rust 1.0 released".to_string(),
            url: "https://blog.rust-lang.org/".to_string(),
            score: 980,
        },
    ]
}

/// Generates and saves mock data in the store.
pub fn generate(config: &Config, store: &SubscriberStore) -> Result<Subscriber> {
    subscriber(config, store)
}

/// Active subscriber with the lowest accepted threshold and no keyword
/// filter. Reuses the existing record if there is one.
pub fn subscriber(config: &Config, store: &SubscriberStore) -> Result<Subscriber> {
    if let Some(existing) = store.find_by_email(MOCK_SUBSCRIBER_EMAIL)? {
        return Ok(existing);
    }

    let token = token::issue();
    let preferences = Preferences {
        threshold: config.subscription.min_score,
        keywords: Default::default(),
    };
    store.register(MOCK_SUBSCRIBER_EMAIL, preferences, token.clone())?;
    store
        .consume_token(MOCK_SUBSCRIBER_EMAIL, &token, TokenEffect::Activate(None))?
        .ok_or_else(|| ErrorKind::DbError("mock subscriber vanished".to_string()).into())
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
