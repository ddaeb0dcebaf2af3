//! Subscriber records.
//!
//! A subscriber is identified by an email address and a stable id. It only
//! becomes eligible for notifications after the first successful activation
//! through a token sent to that address.

pub mod store;

pub use store::{Registration, SubscriberStore, TokenEffect};

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::Collectable;
use crate::feed::{Item, ItemId};
use crate::keywords;

pub type SubscriberId = Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Subscriber {
    pub id: SubscriberId,

    /// Normalized address, unique across all subscribers.
    pub email: String,

    /// Minimum item score to notify about, inclusive.
    pub threshold: i64,
    /// Normalized keyword filter. Empty means every item matches.
    pub keywords: BTreeSet<String>,

    /// Ids of items already delivered. Only ever grows.
    pub sent_items: BTreeSet<ItemId>,

    /// Outstanding single-use token, present only while an action waits for
    /// confirmation.
    pub token: Option<String>,
    /// Transition the outstanding token was issued for.
    #[serde(default)]
    pub token_purpose: Option<TokenPurpose>,

    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Notification preferences chosen by the subscriber.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Preferences {
    pub threshold: i64,
    pub keywords: BTreeSet<String>,
}

/// Transition a token can confirm. A token only works for the purpose it
/// was issued with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum TokenPurpose {
    /// Activation or settings change.
    Activate,
    Unsubscribe,
}

/// Lifecycle state derived from the record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum State {
    /// Registered but never activated.
    Pending,
    Active,
    /// Active with a token outstanding, e.g. a settings change or an
    /// unsubscribe request awaiting confirmation.
    Updating,
}

impl Collectable for Subscriber {
    fn get_collection_name() -> &'static str {
        "subscriber"
    }
}

impl Subscriber {
    /// Creates an inactive subscriber holding the given token.
    pub fn new(email: &str, preferences: Preferences, token: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: normalize_email(email),
            threshold: preferences.threshold,
            keywords: preferences.keywords,
            sent_items: BTreeSet::new(),
            token: Some(token),
            token_purpose: Some(TokenPurpose::Activate),
            active: false,
            created_at: Utc::now(),
        }
    }

    pub fn state(&self) -> State {
        match (self.active, &self.token) {
            (false, _) => State::Pending,
            (true, Some(_)) => State::Updating,
            (true, None) => State::Active,
        }
    }

    /// Replaces the outstanding token.
    pub fn set_token(&mut self, token: String, purpose: TokenPurpose) {
        self.token = Some(token);
        self.token_purpose = Some(purpose);
    }

    pub fn clear_token(&mut self) {
        self.token = None;
        self.token_purpose = None;
    }

    pub fn preferences(&self) -> Preferences {
        Preferences {
            threshold: self.threshold,
            keywords: self.keywords.clone(),
        }
    }

    /// Full eligibility check for one item: active, threshold met, not yet
    /// delivered and keyword filter matched. `title_keywords` is the
    /// normalized keyword set of the item title.
    pub fn wants(&self, item: &Item, title_keywords: &BTreeSet<String>) -> bool {
        self.active
            && self.threshold <= item.score
            && !self.sent_items.contains(&item.id)
            && keywords::matches(&self.keywords, title_keywords)
    }
}

/// Trims and lowercases an address so that it can be used as unique key.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active(threshold: i64, words: &[&str]) -> Subscriber {
        let mut subscriber = Subscriber::new(
            "A@x.com",
            Preferences {
                threshold,
                keywords: words.iter().map(|w| w.to_string()).collect(),
            },
            "t".to_string(),
        );
        subscriber.active = true;
        subscriber.clear_token();
        subscriber
    }

    fn item(id: ItemId, score: i64, title: &str) -> Item {
        Item {
            id,
            title: title.to_string(),
            url: String::new(),
            score,
        }
    }

    fn wants(subscriber: &Subscriber, item: &Item) -> bool {
        subscriber.wants(item, &keywords::extract(&item.title))
    }

    #[test]
    fn new_subscriber_is_pending_with_normalized_email() {
        let subscriber = Subscriber::new(" Someone@Example.COM ", Preferences::default(), "t".into());
        assert_eq!(subscriber.email, "someone@example.com");
        assert_eq!(subscriber.state(), State::Pending);
        assert!(!subscriber.active);
    }

    #[test]
    fn threshold_is_inclusive() {
        let subscriber = active(200, &[]);
        assert!(wants(&subscriber, &item(1, 200, "x")));
        assert!(!wants(&subscriber, &item(1, 199, "x")));
    }

    #[test]
    fn inactive_subscribers_never_want_items() {
        let mut subscriber = active(0, &[]);
        subscriber.active = false;
        assert!(!wants(&subscriber, &item(1, 1000, "x")));
    }

    #[test]
    fn sent_items_are_excluded() {
        let mut subscriber = active(0, &[]);
        subscriber.sent_items.insert(42);
        assert!(!wants(&subscriber, &item(42, 500, "x")));
        assert!(wants(&subscriber, &item(43, 500, "x")));
    }

    #[test]
    fn keyword_filter_applies() {
        let subscriber = active(0, &["rust", "go"]);
        assert!(wants(&subscriber, &item(1, 10, "Go 2.0 released")));
        assert!(!wants(&subscriber, &item(2, 10, "Python update")));
    }

    #[test]
    fn state_reflects_outstanding_token() {
        let mut subscriber = active(0, &[]);
        assert_eq!(subscriber.state(), State::Active);
        subscriber.set_token("pending".into(), TokenPurpose::Unsubscribe);
        assert_eq!(subscriber.state(), State::Updating);
        subscriber.clear_token();
        assert_eq!(subscriber.token_purpose, None);
    }
}
