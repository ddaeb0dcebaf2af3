//! Ranked feed access.
//!
//! The feed has two endpoints: one returning the current ranking as a JSON
//! array of ids and one returning the detail of a single item.

use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;

use crate::{ErrorKind, Result};

pub type ItemId = u64;

/// A feed entry as seen at fetch time.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Item {
    pub id: ItemId,
    pub title: String,
    /// Link to the item's target. Empty for text posts.
    pub url: String,
    pub score: i64,
}

/// Item detail exactly as served by the API. Every field may be missing.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawItem {
    pub id: Option<ItemId>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub score: i64,
    pub deleted: bool,
    pub dead: bool,
}

impl RawItem {
    /// Validates the raw response against the id that was asked for.
    ///
    /// A `null` body, a missing id, an id that differs from the requested one
    /// and deleted or dead items all yield nothing.
    pub fn into_item(raw: Option<RawItem>, requested: ItemId) -> Option<Item> {
        let raw = raw?;
        if raw.id != Some(requested) || raw.deleted || raw.dead {
            return None;
        }
        Some(Item {
            id: requested,
            title: raw.title.unwrap_or_default(),
            url: raw.url.unwrap_or_default(),
            score: raw.score,
        })
    }
}

/// Source of ranked items.
///
/// Implementations are shared read-only across concurrent fetch tasks.
pub trait FeedSource: Send + Sync {
    /// Current ranking, best first.
    fn top_item_ids(&self) -> BoxFuture<'_, Result<Vec<ItemId>>>;

    /// Detail for a single id. `Ok(None)` means the response was empty or
    /// did not describe the requested item.
    fn item(&self, id: ItemId) -> BoxFuture<'_, Result<Option<Item>>>;
}

/// Hacker News style JSON API client.
#[derive(Clone, Debug)]
pub struct HnClient {
    client: Client,
    config: crate::config::Feed,
}

impl HnClient {
    pub fn new(config: &crate::config::Feed) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.fetch_timeout())
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ErrorKind::FeedStatus(response.status()).into());
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn fetch_top_item_ids(&self) -> Result<Vec<ItemId>> {
        let bytes = self.get_bytes(&self.config.top_stories_url).await?;
        let ids: Vec<ItemId> = serde_json::from_slice(&bytes)?;
        tracing::debug!("fetched ranking with {} ids", ids.len());
        Ok(ids)
    }

    async fn fetch_item(&self, id: ItemId) -> Result<Option<Item>> {
        let url = self.config.item_url_for(id);
        let bytes = self.get_bytes(&url).await?;
        let raw: Option<RawItem> = serde_json::from_slice(&bytes)?;
        let item = RawItem::into_item(raw, id);
        if item.is_none() {
            tracing::debug!("discarding empty or mismatched response for item {id}");
        }
        Ok(item)
    }
}

impl FeedSource for HnClient {
    fn top_item_ids(&self) -> BoxFuture<'_, Result<Vec<ItemId>>> {
        self.fetch_top_item_ids().boxed()
    }

    fn item(&self, id: ItemId) -> BoxFuture<'_, Result<Option<Item>>> {
        self.fetch_item(id).boxed()
    }
}
