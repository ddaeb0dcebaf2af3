use std::sync::Arc;

use hnotify::email::Recipients;
use hnotify::feed::Item;
use hnotify::mock::{RecordingMailer, StaticFeed};
use hnotify::pipeline::Pipeline;
use hnotify::subscriber::{State, SubscriberStore};
use hnotify::subscription::{LinkQuery, Notice, SubscribeForm, Subscriptions};
use hnotify::{Config, Database, ErrorKind};

struct Setup {
    subscriptions: Subscriptions,
    pipeline: Pipeline,
    store: SubscriberStore,
    feed: Arc<StaticFeed>,
    mailer: Arc<RecordingMailer>,
}

fn setup() -> Setup {
    let config = Arc::new(Config::default());
    let store = SubscriberStore::new(&Database::temporary().unwrap()).unwrap();
    let feed = Arc::new(StaticFeed::default());
    let mailer = Arc::new(RecordingMailer::default());
    Setup {
        subscriptions: Subscriptions::new(store.clone(), mailer.clone(), config.clone()),
        pipeline: Pipeline::new(feed.clone(), store.clone(), mailer.clone(), config),
        store,
        feed,
        mailer,
    }
}

fn item(id: u64, score: i64) -> Item {
    Item {
        id,
        title: format!("Item number {id}"),
        url: format!("https://example.com/{id}"),
        score,
    }
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn subscribe_activate_and_receive_once() -> anyhow::Result<()> {
    let s = setup();

    let notice = s.subscriptions.subscribe(&SubscribeForm {
        email: "a@x.com".to_string(),
        score: "300".to_string(),
        keywords: String::new(),
    })?;
    assert_eq!(notice, Notice::VerificationSent);

    let pending = s.store.find_by_email("a@x.com")?.unwrap();
    assert_eq!(pending.state(), State::Pending);
    assert!(!pending.active);

    let token = pending.token.clone().unwrap();
    let activation = LinkQuery {
        email: "a@x.com".to_string(),
        token: token.clone(),
        ..Default::default()
    };
    assert_eq!(s.subscriptions.activate(&activation)?, Notice::Activated);

    let active = s.store.find_by_email("a@x.com")?.unwrap();
    assert!(active.active);
    assert_eq!(active.token, None);

    // the activation token is spent
    let err = s.subscriptions.activate(&activation).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidLink));
    let err = s.subscriptions.confirm_unsubscribe(&activation).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidLink));

    settle().await;
    let lifecycle_mails = s.mailer.sent().len();

    s.feed.set_items(vec![item(42, 350), item(43, 299)]);
    let report = s.pipeline.run_cycle().await?;
    assert_eq!(report.notifications, 1);

    let sent = s.mailer.sent();
    assert_eq!(sent.len(), lifecycle_mails + 1);
    let notification = sent.last().unwrap();
    assert_eq!(notification.subject, "Item number 42");
    assert_eq!(notification.recipients, Recipients::Bcc(vec!["a@x.com".to_string()]));

    let record = s.store.find_by_email("a@x.com")?.unwrap();
    assert!(record.sent_items.contains(&42));
    assert!(!record.sent_items.contains(&43));

    // same item again, higher score: nothing new
    s.feed.set_items(vec![item(42, 800)]);
    let report = s.pipeline.run_cycle().await?;
    assert_eq!(report.notifications, 0);
    assert_eq!(s.mailer.sent().len(), lifecycle_mails + 1);

    let record = s.store.find_by_email("a@x.com")?.unwrap();
    assert_eq!(record.sent_items.len(), 1);

    Ok(())
}

#[tokio::test]
async fn keyword_subscribers_only_get_matching_titles() -> anyhow::Result<()> {
    let s = setup();
    for (email, keywords) in [("langs@x.com", "rust, go"), ("all@x.com", "")] {
        s.subscriptions.subscribe(&SubscribeForm {
            email: email.to_string(),
            score: "1".to_string(),
            keywords: keywords.to_string(),
        })?;
        let token = s.store.find_by_email(email)?.unwrap().token.unwrap();
        s.subscriptions.activate(&LinkQuery {
            email: email.to_string(),
            token,
            ..Default::default()
        })?;
    }

    s.feed.set_items(vec![
        Item {
            id: 1,
            title: "Go 2.0 released".to_string(),
            url: String::new(),
            score: 10,
        },
        Item {
            id: 2,
            title: "Python update".to_string(),
            url: String::new(),
            score: 10,
        },
    ]);
    let report = s.pipeline.run_cycle().await?;
    assert_eq!(report.matched_items, 2);
    assert_eq!(report.notifications, 3);

    let langs = s.store.find_by_email("langs@x.com")?.unwrap();
    assert_eq!(langs.sent_items.into_iter().collect::<Vec<_>>(), vec![1]);
    let all = s.store.find_by_email("all@x.com")?.unwrap();
    assert_eq!(all.sent_items.len(), 2);
    Ok(())
}
