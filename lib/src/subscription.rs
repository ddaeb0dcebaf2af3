//! Subscription lifecycle.
//!
//! ```text
//! subscribe ──> Pending ──activate──> Active ──request unsubscribe──> Updating
//!                                      ^  |                             |
//!                                      |  └──subscribe (new prefs)──────┤
//!                                      └────────activate────────────────┘
//!                                                  confirm unsubscribe ──> Removed
//! ```
//!
//! Possession of the inbox is the only credential. Every transition that
//! consumes a token goes through [`Subscriptions::validate`] and then through
//! the store's atomic check-and-apply, so a token is good for one transition
//! only. All failures of that check look the same to the caller.
//!
//! Emails triggered here are sent on a separate task. The caller gets its
//! [`Notice`] before the relay has answered.

use std::sync::Arc;

use url::Url;
use validator::ValidateEmail;

use crate::email::{self, Mailer};
use crate::subscriber::{
    normalize_email, Preferences, Registration, Subscriber, SubscriberStore, TokenEffect,
    TokenPurpose,
};
use crate::{keywords, routes, token, Config, ErrorKind, Result};

/// User-facing confirmation of a successful request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum Notice {
    #[strum(to_string = "An account verification email has been sent.")]
    VerificationSent,
    #[strum(to_string = "Your account is now active!")]
    Activated,
    #[strum(to_string = "Your settings have been updated.")]
    SettingsUpdated,
    #[strum(to_string = "If this address is subscribed, an unsubscribe link has been sent to it.")]
    UnsubscribeSent,
    #[strum(to_string = "You have been successfully unsubscribed.")]
    Unsubscribed,
}

/// Fields of the subscription form.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct SubscribeForm {
    #[serde(default)]
    pub email: String,
    /// Kept as text so that a non-numeric value is reported as a validation
    /// error instead of a rejected request.
    #[serde(default, alias = "threshold")]
    pub score: String,
    #[serde(default)]
    pub keywords: String,
}

/// Fields of the unsubscribe request form.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct UnsubscribeForm {
    #[serde(default)]
    pub email: String,
}

/// Query of an activation or unsubscribe link.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct LinkQuery {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub token: String,
    /// Pending preference change carried by an activation link.
    #[serde(default, alias = "threshold")]
    pub score: Option<String>,
    pub keywords: Option<String>,
}

impl LinkQuery {
    /// True when neither email nor token were given, e.g. when someone opens
    /// the unsubscribe page directly.
    pub fn is_empty(&self) -> bool {
        self.email.is_empty() && self.token.is_empty()
    }
}

#[derive(Clone)]
pub struct Subscriptions {
    store: SubscriberStore,
    mailer: Arc<dyn Mailer>,
    config: Arc<Config>,
}

impl Subscriptions {
    pub fn new(store: SubscriberStore, mailer: Arc<dyn Mailer>, config: Arc<Config>) -> Self {
        Self {
            store,
            mailer,
            config,
        }
    }

    pub fn store(&self) -> &SubscriberStore {
        &self.store
    }

    /// Registers a new address or re-issues a token for a known one.
    ///
    /// For a known address the submitted preferences are not stored yet.
    /// They travel in the activation link and are applied on activation.
    pub fn subscribe(&self, form: &SubscribeForm) -> Result<Notice> {
        let email = self.parse_email(&form.email)?;
        let preferences = self.parse_preferences(&form.score, &form.keywords)?;

        let token = token::issue();
        let registration = self
            .store
            .register(&email, preferences.clone(), token.clone())?;

        let link = match &registration {
            Registration::Created(subscriber) => {
                tracing::info!("new subscriber {}", subscriber.id);
                self.link(routes::ACTIVATE, &email, &token, None)?
            }
            Registration::Existing(subscriber) => {
                tracing::info!("re-issued activation token for {}", subscriber.id);
                self.link(routes::ACTIVATE, &email, &token, Some(&preferences))?
            }
        };

        email::send_detached(
            self.mailer.clone(),
            email::activation(&self.config, &email, &link)?,
        );
        Ok(Notice::VerificationSent)
    }

    /// Checks a submitted email and token pair against the store.
    ///
    /// Fails closed with [`ErrorKind::InvalidLink`] on empty input, unknown
    /// email or token mismatch, without telling them apart.
    pub fn validate(&self, email: &str, token: &str) -> Result<Subscriber> {
        if email.trim().is_empty() || token.is_empty() {
            return Err(ErrorKind::InvalidLink.into());
        }
        match self.store.find_by_email(email)? {
            Some(subscriber) if token::verify(subscriber.token.as_deref(), token) => {
                Ok(subscriber)
            }
            _ => Err(ErrorKind::InvalidLink.into()),
        }
    }

    /// Activates a pending subscriber, or applies the preference change
    /// carried by the link to an active one.
    pub fn activate(&self, query: &LinkQuery) -> Result<Notice> {
        let preferences = match (&query.score, &query.keywords) {
            (None, None) => None,
            (Some(score), keywords) => Some(
                self.parse_preferences(score, keywords.as_deref().unwrap_or_default())?,
            ),
            (None, Some(_)) => {
                return Err(ErrorKind::BadInput(
                    "A score is required when changing keywords.".to_string(),
                )
                .into())
            }
        };

        let before = self.validate(&query.email, &query.token)?;
        let after = self.consume(
            &query.email,
            &query.token,
            TokenEffect::Activate(preferences),
        )?;

        if before.active {
            tracing::info!(
                "subscriber {} now at threshold {} with {} keywords",
                after.id,
                after.threshold,
                after.keywords.len()
            );
            Ok(Notice::SettingsUpdated)
        } else {
            tracing::info!("subscriber {} activated", after.id);
            Ok(Notice::Activated)
        }
    }

    /// Sends an unsubscribe link to a registered address.
    ///
    /// The answer is the same whether or not the address is registered.
    pub fn request_unsubscribe(&self, form: &UnsubscribeForm) -> Result<Notice> {
        let email = self.parse_email(&form.email)?;

        let token = token::issue();
        match self
            .store
            .issue_token(&email, token.clone(), TokenPurpose::Unsubscribe)? {
            Some(subscriber) => {
                tracing::info!("unsubscribe requested for {}", subscriber.id);
                let link = self.link(routes::UNSUBSCRIBE, &email, &token, None)?;
                email::send_detached(
                    self.mailer.clone(),
                    email::unsubscribe(&self.config, &email, &link)?,
                );
            }
            None => tracing::debug!("unsubscribe requested for unknown address"),
        }
        Ok(Notice::UnsubscribeSent)
    }

    /// Deletes the subscriber if the link is valid.
    pub fn confirm_unsubscribe(&self, query: &LinkQuery) -> Result<Notice> {
        self.validate(&query.email, &query.token)?;
        let removed = self.consume(&query.email, &query.token, TokenEffect::Remove)?;
        tracing::info!("subscriber {} removed", removed.id);
        Ok(Notice::Unsubscribed)
    }

    fn consume(&self, email: &str, token: &str, effect: TokenEffect) -> Result<Subscriber> {
        // Another request may have used the token since it was validated.
        self.store
            .consume_token(email, token, effect)?
            .ok_or_else(|| ErrorKind::InvalidLink.into())
    }

    fn parse_email(&self, input: &str) -> Result<String> {
        let email = normalize_email(input);
        if email.is_empty() {
            return Err(ErrorKind::BadInput("You must provide a valid email!".to_string()).into());
        }
        if !email.validate_email() {
            return Err(ErrorKind::BadInput(format!("`{email}` is not a valid email.")).into());
        }
        Ok(email)
    }

    fn parse_preferences(&self, score: &str, keywords: &str) -> Result<Preferences> {
        let threshold: i64 = score
            .trim()
            .parse()
            .map_err(|_| ErrorKind::BadInput("The score must be a whole number.".to_string()))?;
        let min = self.config.subscription.min_score;
        if threshold < min {
            return Err(ErrorKind::BadInput(format!("The score must be at least {min}.")).into());
        }
        let keywords = keywords::parse_input(keywords, self.config.subscription.max_keywords)?;
        Ok(Preferences {
            threshold,
            keywords,
        })
    }

    fn link(
        &self,
        route: &str,
        email: &str,
        token: &str,
        preferences: Option<&Preferences>,
    ) -> Result<Url> {
        let mut url = Url::parse(&format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            route
        ))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("email", email).append_pair("token", token);
            if let Some(preferences) = preferences {
                query
                    .append_pair("score", &preferences.threshold.to_string())
                    .append_pair("keywords", &keywords::join(&preferences.keywords));
            }
        }
        Ok(url)
    }
}
