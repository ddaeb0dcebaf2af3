//! Persistent subscriber store.
//!
//! Records live in the `subscriber` tree keyed by id. Two index trees are
//! maintained next to it:
//!
//! - `subscriber_email`: normalized email -> id, enforcing one record per
//!   address
//! - `subscriber_threshold`: order-preserving `threshold ++ id` keys, so the
//!   eligibility query is a range scan up to the item score
//!
//! Every mutation runs as one sled transaction over the record and both
//! indexes. Token checks happen inside the same transaction as their effect,
//! which makes each lifecycle transition an atomic read-modify-write.

use sled::transaction::{
    abort, ConflictableTransactionError, TransactionError, TransactionResult, TransactionalTree,
};
use sled::{Transactional, Tree};
use uuid::Uuid;

use crate::db::{decode, encode, Collectable, Database};
use crate::feed::{Item, ItemId};
use crate::{token, Error, ErrorKind, Result};

use super::{normalize_email, Preferences, Subscriber, SubscriberId, TokenPurpose};

const EMAIL_INDEX: &str = "subscriber_email";
const THRESHOLD_INDEX: &str = "subscriber_threshold";

type TxResult<T> = std::result::Result<T, ConflictableTransactionError<Error>>;

/// Outcome of a subscribe request.
#[derive(Clone, Debug)]
pub enum Registration {
    /// A new pending record was created.
    Created(Subscriber),
    /// The address was already registered. The record got a fresh token and
    /// is otherwise unchanged.
    Existing(Subscriber),
}

impl Registration {
    pub fn subscriber(&self) -> &Subscriber {
        match self {
            Registration::Created(s) | Registration::Existing(s) => s,
        }
    }
}

/// What a successfully validated token does to its record.
#[derive(Clone, Debug)]
pub enum TokenEffect {
    /// Mark active, optionally applying changed preferences.
    Activate(Option<Preferences>),
    /// Delete the record.
    Remove,
}

impl TokenEffect {
    /// Purpose a token must have been issued with to cause this effect.
    pub fn purpose(&self) -> TokenPurpose {
        match self {
            TokenEffect::Activate(_) => TokenPurpose::Activate,
            TokenEffect::Remove => TokenPurpose::Unsubscribe,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SubscriberStore {
    db: Database,
    records: Tree,
    emails: Tree,
    thresholds: Tree,
}

impl SubscriberStore {
    pub fn new(db: &Database) -> Result<Self> {
        Ok(Self {
            db: db.clone(),
            records: db.tree(Subscriber::get_collection_name())?,
            emails: db.tree(EMAIL_INDEX)?,
            thresholds: db.tree(THRESHOLD_INDEX)?,
        })
    }

    pub fn get(&self, id: SubscriberId) -> Result<Option<Subscriber>> {
        self.db.get(id)
    }

    pub fn find_by_email(&self, email: &str) -> Result<Option<Subscriber>> {
        let email = normalize_email(email);
        match self.emails.get(email.as_bytes())? {
            Some(id) => self.get(Uuid::from_slice(&id)?),
            None => Ok(None),
        }
    }

    pub fn list(&self) -> Result<Vec<Subscriber>> {
        self.db.get_collection()
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    /// Inserts a new record, failing if the email is already taken.
    pub fn insert(&self, subscriber: &Subscriber) -> Result<()> {
        finish(
            (&self.records, &self.emails, &self.thresholds).transaction(
                |(records, emails, thresholds)| {
                    if emails.get(subscriber.email.as_bytes())?.is_some() {
                        return abort(
                            ErrorKind::SubscriberExists(subscriber.email.clone()).into(),
                        );
                    }
                    write_indexed(records, emails, thresholds, subscriber)?;
                    Ok(())
                },
            ),
        )
    }

    /// Creates a pending record for a new address or puts a fresh token on
    /// the existing one. Preferences are only stored for new records.
    pub fn register(
        &self,
        email: &str,
        preferences: Preferences,
        token: String,
    ) -> Result<Registration> {
        let candidate = Subscriber::new(email, preferences, token.clone());
        finish(
            (&self.records, &self.emails, &self.thresholds).transaction(
                |(records, emails, thresholds)| {
                    if let Some(id) = emails.get(candidate.email.as_bytes())? {
                        let mut existing = load(records, &id)?;
                        existing.set_token(token.clone(), TokenPurpose::Activate);
                        write_record(records, &existing)?;
                        return Ok(Registration::Existing(existing));
                    }
                    write_indexed(records, emails, thresholds, &candidate)?;
                    Ok(Registration::Created(candidate.clone()))
                },
            ),
        )
    }

    /// Replaces the outstanding token of the record registered under
    /// `email`. Returns `None` if there is no such record.
    pub fn issue_token(
        &self,
        email: &str,
        token: String,
        purpose: TokenPurpose,
    ) -> Result<Option<Subscriber>> {
        let email = normalize_email(email);
        finish((&self.records, &self.emails).transaction(|(records, emails)| {
            let Some(id) = emails.get(email.as_bytes())? else {
                return Ok(None);
            };
            let mut subscriber = load(records, &id)?;
            subscriber.set_token(token.clone(), purpose);
            write_record(records, &subscriber)?;
            Ok(Some(subscriber))
        }))
    }

    /// Applies `effect` if `token` matches the outstanding token of the
    /// record registered under `email` and was issued for that effect,
    /// clearing the token in the process.
    ///
    /// Returns the record as it is after the effect (for removal: as it was
    /// just before), or `None` when nothing matched. Nothing is written in
    /// the latter case.
    pub fn consume_token(
        &self,
        email: &str,
        token: &str,
        effect: TokenEffect,
    ) -> Result<Option<Subscriber>> {
        let email = normalize_email(email);
        finish(
            (&self.records, &self.emails, &self.thresholds).transaction(
                |(records, emails, thresholds)| {
                    let Some(id) = emails.get(email.as_bytes())? else {
                        return Ok(None);
                    };
                    let mut subscriber = load(records, &id)?;
                    if !token::verify(subscriber.token.as_deref(), token)
                        || subscriber.token_purpose != Some(effect.purpose())
                    {
                        return Ok(None);
                    }
                    subscriber.clear_token();

                    match &effect {
                        TokenEffect::Activate(preferences) => {
                            if let Some(preferences) = preferences {
                                thresholds
                                    .remove(threshold_key(subscriber.threshold, subscriber.id))?;
                                thresholds.insert(
                                    threshold_key(preferences.threshold, subscriber.id),
                                    Vec::new(),
                                )?;
                                subscriber.threshold = preferences.threshold;
                                subscriber.keywords = preferences.keywords.clone();
                            }
                            subscriber.active = true;
                            write_record(records, &subscriber)?;
                        }
                        TokenEffect::Remove => {
                            records.remove(&subscriber.id.as_bytes()[..])?;
                            emails.remove(email.as_bytes())?;
                            thresholds
                                .remove(threshold_key(subscriber.threshold, subscriber.id))?;
                        }
                    }
                    Ok(Some(subscriber))
                },
            ),
        )
    }

    /// Active subscribers whose threshold is met by the item score and who
    /// have not received the item yet. Keyword filters are not applied here.
    pub fn eligible_for(&self, item: &Item) -> Result<Vec<Subscriber>> {
        let mut upper = threshold_prefix(item.score).to_vec();
        upper.extend_from_slice(&[0xff; 16]);

        let mut out = Vec::new();
        for entry in self.thresholds.range(..=upper) {
            let (key, _) = entry?;
            let id = Uuid::from_slice(&key[8..])?;
            // The record may have been removed since the index was read.
            let Some(subscriber) = self.get(id)? else {
                continue;
            };
            if subscriber.active
                && subscriber.threshold <= item.score
                && !subscriber.sent_items.contains(&item.id)
            {
                out.push(subscriber);
            }
        }
        Ok(out)
    }

    /// Adds `item` to the delivered set of every listed subscriber in a
    /// single transaction. Adding an id that is already present is a no-op
    /// and records deleted in the meantime are skipped.
    ///
    /// Returns how many of the listed subscribers still exist.
    pub fn add_sent_item(&self, ids: &[SubscriberId], item: ItemId) -> Result<usize> {
        finish(self.records.transaction(|records| {
            let mut found = 0;
            for id in ids {
                let Some(bytes) = records.get(&id.as_bytes()[..])? else {
                    continue;
                };
                found += 1;
                let mut subscriber: Subscriber =
                    decode(&bytes).map_err(ConflictableTransactionError::Abort)?;
                if subscriber.sent_items.insert(item) {
                    write_record(records, &subscriber)?;
                }
            }
            Ok(found)
        }))
    }
}

/// Order-preserving encoding of a signed threshold.
fn threshold_prefix(threshold: i64) -> [u8; 8] {
    ((threshold as u64) ^ (1 << 63)).to_be_bytes()
}

fn threshold_key(threshold: i64, id: SubscriberId) -> Vec<u8> {
    let mut key = threshold_prefix(threshold).to_vec();
    key.extend_from_slice(id.as_bytes());
    key
}

fn load(records: &TransactionalTree, id: &[u8]) -> TxResult<Subscriber> {
    match records.get(id)? {
        Some(bytes) => decode(&bytes).map_err(ConflictableTransactionError::Abort),
        None => abort(
            ErrorKind::DbError(format!(
                "email index points at missing record {:?}",
                Uuid::from_slice(id).unwrap_or_default()
            ))
            .into(),
        ),
    }
}

fn write_record(records: &TransactionalTree, subscriber: &Subscriber) -> TxResult<()> {
    let bytes = encode(subscriber).map_err(ConflictableTransactionError::Abort)?;
    records.insert(&subscriber.id.as_bytes()[..], bytes)?;
    Ok(())
}

fn write_indexed(
    records: &TransactionalTree,
    emails: &TransactionalTree,
    thresholds: &TransactionalTree,
    subscriber: &Subscriber,
) -> TxResult<()> {
    write_record(records, subscriber)?;
    emails.insert(subscriber.email.as_bytes(), &subscriber.id.as_bytes()[..])?;
    thresholds.insert(threshold_key(subscriber.threshold, subscriber.id), Vec::new())?;
    Ok(())
}

fn finish<T>(result: TransactionResult<T, Error>) -> Result<T> {
    result.map_err(|e| match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => e.into(),
    })
}
