//! Eligibility of subscribers for a single item.
//!
//! The store narrows candidates down with its threshold index and filters
//! out inactive and already-served subscribers. The keyword filter is applied
//! here against the tokenized title.

use crate::feed::Item;
use crate::keywords;
use crate::subscriber::{Subscriber, SubscriberStore};
use crate::Result;

/// Subscribers that should be notified about `item`: active, threshold met,
/// item not delivered yet and keyword filter (if any) matched.
pub fn eligible(store: &SubscriberStore, item: &Item) -> Result<Vec<Subscriber>> {
    let title_keywords = keywords::extract(&item.title);
    let subscribers = store
        .eligible_for(item)?
        .into_iter()
        .filter(|s| s.wants(item, &title_keywords))
        .collect();
    Ok(subscribers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriber::{Preferences, TokenEffect};
    use crate::Database;

    fn store() -> SubscriberStore {
        SubscriberStore::new(&Database::temporary().unwrap()).unwrap()
    }

    fn subscribe(store: &SubscriberStore, email: &str, threshold: i64, words: &[&str]) {
        let preferences = Preferences {
            threshold,
            keywords: words.iter().map(|w| w.to_string()).collect(),
        };
        store.register(email, preferences, "t".into()).unwrap();
        store
            .consume_token(email, "t", TokenEffect::Activate(None))
            .unwrap()
            .unwrap();
    }

    fn item(id: u64, score: i64, title: &str) -> Item {
        Item {
            id,
            title: title.to_string(),
            url: String::new(),
            score,
        }
    }

    fn emails(store: &SubscriberStore, item: &Item) -> Vec<String> {
        let mut emails: Vec<_> = eligible(store, item)
            .unwrap()
            .into_iter()
            .map(|s| s.email)
            .collect();
        emails.sort();
        emails
    }

    #[test]
    fn keyword_filter_is_or_over_tokens() {
        let store = store();
        subscribe(&store, "langs@x.com", 0, &["rust", "go"]);
        subscribe(&store, "all@x.com", 0, &[]);

        assert_eq!(
            emails(&store, &item(1, 10, "Go 2.0 released")),
            vec!["all@x.com", "langs@x.com"]
        );
        assert_eq!(emails(&store, &item(2, 10, "Python update")), vec!["all@x.com"]);
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        let store = store();
        subscribe(&store, "a@x.com", 200, &[]);
        assert_eq!(emails(&store, &item(1, 200, "x")), vec!["a@x.com"]);
        assert!(emails(&store, &item(1, 199, "x")).is_empty());
    }

    #[test]
    fn delivered_items_are_not_matched_again() {
        let store = store();
        subscribe(&store, "a@x.com", 0, &[]);
        let target = item(42, 350, "Something");

        let matched = eligible(&store, &target).unwrap();
        assert_eq!(matched.len(), 1);
        store.add_sent_item(&[matched[0].id], 42).unwrap();
        assert!(eligible(&store, &target).unwrap().is_empty());
    }

    #[test]
    fn pending_subscribers_are_never_matched() {
        let store = store();
        store
            .register("p@x.com", Preferences::default(), "t".into())
            .unwrap();
        assert!(eligible(&store, &item(1, 1000, "x")).unwrap().is_empty());
    }
}
