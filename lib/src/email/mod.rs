//! Outgoing email.
//!
//! Messages are rendered into a transport-independent [`Mail`] and handed to
//! a [`Mailer`]. The SMTP mailer converts them into lettre messages at the
//! last moment.

use std::sync::Arc;

use askama::Template;
use futures::future::BoxFuture;
use futures::FutureExt;
use lettre::{
    address::AddressError,
    message::{Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use url::Url;

use crate::feed::Item;
use crate::{routes, Config, Error, ErrorKind, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recipients {
    /// Single visible recipient.
    To(String),
    /// Recipients hidden from each other. The message carries no `To`.
    Bcc(Vec<String>),
}

impl Recipients {
    pub fn len(&self) -> usize {
        match self {
            Recipients::To(_) => 1,
            Recipients::Bcc(list) => list.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A rendered message with its recipients.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mail {
    pub recipients: Recipients,
    pub subject: String,
    pub plain: String,
    pub html: String,
}

impl Mail {
    /// Builds the multipart lettre message sent from the configured sender.
    pub fn to_message(&self, config: &crate::config::Email) -> Result<Message> {
        let mut builder = Message::builder()
            .from(parse_mailbox(&format!(
                "{} <{}>",
                config.sender_name, config.address
            ))?)
            .subject(self.subject.clone());

        match &self.recipients {
            Recipients::To(addr) => builder = builder.to(parse_mailbox(addr)?),
            Recipients::Bcc(list) => {
                for addr in list {
                    builder = builder.bcc(parse_mailbox(addr)?);
                }
            }
        }

        let message = builder.multipart(
            MultiPart::alternative()
                .singlepart(SinglePart::plain(self.plain.clone()))
                .singlepart(SinglePart::html(self.html.clone())),
        )?;
        Ok(message)
    }
}

fn parse_mailbox(addr: &str) -> Result<Mailbox> {
    addr.parse()
        .map_err(|e: AddressError| Error::new(ErrorKind::EmailParseError(e.to_string())))
}

/// Email-send capability.
pub trait Mailer: Send + Sync {
    /// Resolves once the relay has accepted the message for every recipient,
    /// or fails for all of them.
    fn send(&self, mail: Mail) -> BoxFuture<'_, Result<()>>;
}

/// Mailer relaying through an SMTP server with STARTTLS.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    config: crate::config::Email,
}

impl SmtpMailer {
    pub fn new(config: &crate::config::Email) -> Result<Self> {
        let creds = Credentials::new(config.smtp_user.clone(), config.smtp_password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_server)?
            .port(config.smtp_port)
            .credentials(creds)
            .build();
        Ok(Self {
            transport,
            config: config.clone(),
        })
    }

    async fn send_async(&self, mail: Mail) -> Result<()> {
        let message = mail.to_message(&self.config)?;
        let response = self.transport.send(message).await?;
        if response.is_positive() {
            Ok(())
        } else {
            Err(ErrorKind::EmailBadResponse(response.code().to_string()).into())
        }
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, mail: Mail) -> BoxFuture<'_, Result<()>> {
        self.send_async(mail).boxed()
    }
}

/// Sends on a separate task. The outcome is only logged.
pub fn send_detached(mailer: Arc<dyn Mailer>, mail: Mail) {
    tokio::spawn(async move {
        let subject = mail.subject.clone();
        if let Err(e) = mailer.send(mail).await {
            tracing::error!("failed sending `{subject}`: {e}");
        }
    });
}

struct ItemContext {
    title: String,
    link: String,
    discussion: String,
    settings: String,
    score: i64,
}

#[derive(Template)]
#[template(path = "email/item.html")]
struct ItemHtml<'a> {
    item: &'a ItemContext,
}

#[derive(Template)]
#[template(path = "email/item.txt")]
struct ItemText<'a> {
    item: &'a ItemContext,
}

#[derive(Template)]
#[template(path = "email/activation.html")]
struct ActivationHtml<'a> {
    name: &'a str,
    link: &'a str,
}

#[derive(Template)]
#[template(path = "email/activation.txt")]
struct ActivationText<'a> {
    name: &'a str,
    link: &'a str,
}

#[derive(Template)]
#[template(path = "email/unsubscribe.html")]
struct UnsubscribeHtml<'a> {
    name: &'a str,
    link: &'a str,
}

#[derive(Template)]
#[template(path = "email/unsubscribe.txt")]
struct UnsubscribeText<'a> {
    name: &'a str,
    link: &'a str,
}

/// Notification about `item` for a batch of recipients.
pub fn item_notification(config: &Config, item: &Item, recipients: Vec<String>) -> Result<Mail> {
    let discussion = config.feed.discussion_url_for(item.id);
    let context = ItemContext {
        title: item.title.clone(),
        link: if item.url.is_empty() {
            discussion.clone()
        } else {
            item.url.clone()
        },
        discussion,
        settings: format!(
            "{}{}",
            config.base_url.trim_end_matches('/'),
            routes::UNSUBSCRIBE
        ),
        score: item.score,
    };

    Ok(Mail {
        recipients: Recipients::Bcc(recipients),
        subject: item.title.clone(),
        plain: ItemText { item: &context }.render()?,
        html: ItemHtml { item: &context }.render()?,
    })
}

/// Activation link for a new subscription or a settings change.
pub fn activation(config: &Config, email: &str, link: &Url) -> Result<Mail> {
    let (name, link) = (config.name.as_str(), link.as_str());
    Ok(Mail {
        recipients: Recipients::To(email.to_string()),
        subject: format!("{} - Email verification needed", config.name),
        plain: ActivationText { name, link }.render()?,
        html: ActivationHtml { name, link }.render()?,
    })
}

/// Confirmation link for an unsubscribe request.
pub fn unsubscribe(config: &Config, email: &str, link: &Url) -> Result<Mail> {
    let (name, link) = (config.name.as_str(), link.as_str());
    Ok(Mail {
        recipients: Recipients::To(email.to_string()),
        subject: format!("{} - Unsubscribe", config.name),
        plain: UnsubscribeText { name, link }.render()?,
        html: UnsubscribeHtml { name, link }.render()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(url: &str) -> Item {
        Item {
            id: 42,
            title: "Show HN: <b>bold</b> & co".to_string(),
            url: url.to_string(),
            score: 350,
        }
    }

    #[test]
    fn item_mail_is_blind_copied_with_title_subject() {
        let config = Config::default();
        let mail = item_notification(
            &config,
            &item("https://example.com/post"),
            vec!["a@x.com".into(), "b@x.com".into()],
        )
        .unwrap();
        assert_eq!(mail.subject, "Show HN: <b>bold</b> & co");
        assert_eq!(
            mail.recipients,
            Recipients::Bcc(vec!["a@x.com".into(), "b@x.com".into()])
        );
        assert!(mail.plain.contains("https://example.com/post"));
        assert!(mail.plain.contains("https://news.ycombinator.com/item?id=42"));
        assert!(mail.plain.starts_with("Show HN: <b>bold</b> & co"));
        assert!(mail.html.contains("&lt;b&gt;bold"));
        assert!(mail.html.contains("&amp; co"));
        assert!(!mail.html.contains("<b>"));
    }

    #[test]
    fn text_posts_link_to_the_discussion() {
        let config = Config::default();
        let mail = item_notification(&config, &item(""), vec!["a@x.com".into()]).unwrap();
        assert!(mail
            .plain
            .contains("Link: https://news.ycombinator.com/item?id=42"));
    }

    #[test]
    fn bcc_message_has_every_recipient_in_envelope() {
        let config = Config::default();
        let mail = item_notification(
            &config,
            &item("https://example.com"),
            vec!["a@x.com".into(), "b@x.com".into(), "c@x.com".into()],
        )
        .unwrap();
        let message = mail.to_message(&config.email).unwrap();
        assert_eq!(message.envelope().to().len(), 3);

        let formatted = String::from_utf8(message.formatted()).unwrap();
        assert!(!formatted.contains("b@x.com"));
    }

    #[test]
    fn malformed_address_is_rejected() {
        let config = Config::default();
        let url = Url::parse("http://localhost:8080/activate").unwrap();
        let mail = activation(&config, "not an address", &url).unwrap();
        let err = mail.to_message(&config.email).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::EmailParseError(_)));
    }

    #[test]
    fn lifecycle_mails_carry_the_link() {
        let config = Config::default();
        let url = Url::parse("http://localhost:8080/unsubscribe?email=a%40x.com&token=abc").unwrap();
        let mail = unsubscribe(&config, "a@x.com", &url).unwrap();
        assert_eq!(mail.recipients, Recipients::To("a@x.com".into()));
        assert!(mail.plain.contains(url.as_str()));
        assert!(mail.html.contains("token=abc"));
    }
}
