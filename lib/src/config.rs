use std::net::SocketAddr;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::Result;

pub static CONFIG_FILE: &'static str = "hnotify.toml";

/// Application configuration.
///
/// # Sensible defaults
///
/// `Config::default()` describes a runnable local setup: Hacker News as the
/// feed, a sled database in the working directory and the HTTP surface on
/// `127.0.0.1:8080`. Only the email section needs real values before
/// notifications can leave the machine.
///
/// Using the *struct update syntax* one can initialize a new `Config`, making
/// a few changes right in the definition.
///
/// ```ignore
/// let cfg = Config {
///     feed: Feed {
///         max_items: 30,
///         ..Default::default()
///     },
///     ..Default::default()
/// }
/// ```
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub name: String,

    /// Public URL under which the HTTP surface is reachable. Used to build
    /// activation and unsubscribe links, so it must include the scheme.
    pub base_url: String,
    /// Address on which to serve the HTTP surface. Defaults to
    /// `127.0.0.1:8080`.
    pub address: SocketAddr,
    /// Directory holding the subscriber database.
    pub db_path: String,

    pub assets: Assets,
    pub tracing: Tracing,
    pub email: Email,
    pub feed: Feed,
    pub subscription: Subscription,

    /// Development mode configuration.
    pub dev: DevMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "HN Notifications".to_string(),
            base_url: "http://localhost:8080".to_string(),
            address: SocketAddr::from(([127, 0, 0, 1], 8080)),
            db_path: "db".to_string(),
            assets: Assets::default(),
            tracing: Tracing::default(),
            email: Email::default(),
            feed: Feed::default(),
            subscription: Subscription::default(),
            dev: DevMode::default(),
        }
    }
}

/// Loads application config from toml file at default location.
pub fn load<T: DeserializeOwned>() -> Result<T> {
    load_from(CONFIG_FILE)
}

/// Loads application config from toml file at standard path using provided
/// name.
///
/// For example for `name` == `hnotify.toml` we will load both `hnotify.toml`
/// and `secret.hnotify.toml` from the working directory. Environment
/// variables override both, e.g. `EMAIL__SMTP_PASSWORD`.
pub fn load_from<T: DeserializeOwned>(name: impl AsRef<str>) -> Result<T> {
    let config = config::Config::builder()
        .add_source(config::File::with_name(name.as_ref()))
        .add_source(config::File::with_name(&format!("secret.{}", name.as_ref())).required(false))
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix_separator("__"),
        )
        .build()?;

    let config: T = config.try_deserialize()?;

    Ok(config)
}

/// Writes the configuration as toml to the given path.
pub fn save(config: &Config, path: impl AsRef<std::path::Path>) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Assets {
    /// Flag for enabling static file serving from the filesystem directory
    /// based on provided path.
    pub serve: bool,
    /// Path to the assets directory, relative to current working directory.
    pub path: String,
}

impl Default for Assets {
    fn default() -> Self {
        Self {
            serve: true,
            path: "public".to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Tracing {
    pub enabled: bool,

    pub mode: crate::tracing::Mode,
    pub level: crate::tracing::Level,

    pub loki_address: String,
}

impl Default for Tracing {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: crate::tracing::Mode::default(),
            level: crate::tracing::Level::default(),
            loki_address: "".to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Email {
    /// Address that the application will use to send emails to subscribers.
    pub address: String,
    /// Display name put in front of the sender address.
    pub sender_name: String,

    // Smtp server and credentials.
    pub smtp_server: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_password: String,
}

impl Default for Email {
    fn default() -> Self {
        Self {
            address: "notifications@localhost".to_string(),
            sender_name: "HN Notifications".to_string(),
            smtp_server: "localhost".to_string(),
            smtp_port: 587,
            smtp_user: "".to_string(),
            smtp_password: "".to_string(),
        }
    }
}

/// Upstream feed and polling settings.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Feed {
    /// Endpoint returning a JSON array of ranked item ids.
    pub top_stories_url: String,
    /// Item detail endpoint, `{id}` is replaced with the item id.
    pub item_url: String,
    /// Human readable discussion page, `{id}` is replaced with the item id.
    pub discussion_url: String,
    pub user_agent: String,

    /// Seconds between two pipeline cycles.
    pub interval_secs: u64,
    /// Only the first `max_items` ranked ids are fetched each cycle. `0`
    /// fetches the whole ranking.
    pub max_items: usize,
    /// Upper bound on fetches in flight. `0` leaves fan-out unbounded.
    pub max_concurrent_fetches: usize,
    pub fetch_timeout_secs: u64,
    /// A cycle still running after this many seconds is abandoned.
    pub cycle_deadline_secs: u64,
}

impl Default for Feed {
    fn default() -> Self {
        Self {
            top_stories_url: "https://hacker-news.firebaseio.com/v0/topstories.json".to_string(),
            item_url: "https://hacker-news.firebaseio.com/v0/item/{id}.json".to_string(),
            discussion_url: "https://news.ycombinator.com/item?id={id}".to_string(),
            user_agent: format!("hnotify/{}", env!("CARGO_PKG_VERSION")),
            interval_secs: 15 * 60,
            max_items: 100,
            max_concurrent_fetches: 0,
            fetch_timeout_secs: 10,
            cycle_deadline_secs: 10 * 60,
        }
    }
}

impl Feed {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }

    pub fn cycle_deadline(&self) -> Duration {
        Duration::from_secs(self.cycle_deadline_secs.max(1))
    }

    pub fn item_url_for(&self, id: u64) -> String {
        self.item_url.replace("{id}", &id.to_string())
    }

    pub fn discussion_url_for(&self, id: u64) -> String {
        self.discussion_url.replace("{id}", &id.to_string())
    }
}

/// Limits applied to subscriber input and outgoing notification batches.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Subscription {
    /// Lowest accepted score threshold.
    pub min_score: i64,
    /// Maximum number of distinct keywords a subscriber can filter on.
    pub max_keywords: usize,
    /// Bcc recipients per notification message. Larger recipient sets are
    /// split into several messages.
    pub max_recipients_per_message: usize,
}

impl Default for Subscription {
    fn default() -> Self {
        Self {
            min_score: 1,
            max_keywords: 20,
            max_recipients_per_message: 50,
        }
    }
}

/// NOTE: make sure to disable on production.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DevMode {
    /// Global switch for all dev mode items.
    pub enabled: bool,
    /// Use an in-memory feed and a mailer that only logs, and create a mock
    /// subscriber on startup.
    pub mock: bool,
}
