//! News source backed by the GDELT DOC 2.0 `artlist` API.
//!
//! One `fetch` returns one cycle's worth of candidate articles: newest
//! matches for the configured keyword and source countries, filtered
//! client-side by article language and capped at `feed.max_articles`.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::{info, instrument};

use crate::config::Feed;
use crate::model::NewsItem;

const GDELT_API_BASE: &str = "https://api.gdeltproject.org/";

/// GDELT caps `maxrecords` at 250; we over-fetch relative to
/// `feed.max_articles` because the language filter discards rows.
const MAX_RECORDS: &str = "75";

/// Produces the ordered candidate list for one cycle.
#[async_trait]
pub trait NewsSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<NewsItem>>;
}

#[derive(Clone)]
pub struct GdeltClient {
    http: Client,
    base_url: Url,
    feed: Feed,
}

impl fmt::Debug for GdeltClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GdeltClient")
            .field("base_url", &self.base_url)
            .field("feed", &self.feed)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default, Deserialize)]
struct ArtList {
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
struct Article {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    language: String,
    #[serde(default)]
    seendate: String,
}

impl GdeltClient {
    pub fn new(feed: Feed, timeout: Duration) -> Self {
        let base_url = Url::parse(GDELT_API_BASE).expect("valid default GDELT URL");
        Self::with_base_url(feed, timeout, base_url)
    }

    pub fn with_base_url(feed: Feed, timeout: Duration, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("tg-memebot/0.1")
            .timeout(timeout)
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            feed,
        }
    }
}

#[async_trait]
impl NewsSource for GdeltClient {
    #[instrument(skip_all)]
    async fn fetch(&self) -> Result<Vec<NewsItem>> {
        let endpoint = self
            .base_url
            .join("api/v2/doc/doc")
            .context("invalid GDELT base URL")?;
        let res = self
            .http
            .get(endpoint)
            .query(&[
                ("query", build_query(&self.feed).as_str()),
                ("mode", "artlist"),
                ("format", "json"),
                ("timespan", self.feed.timespan.as_str()),
                ("maxrecords", MAX_RECORDS),
                ("sort", "datedesc"),
            ])
            .send()
            .await
            .context("failed to reach GDELT")?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("gdelt error {}: {}", status, body));
        }

        // GDELT reports query errors as plain text with a 200 status, so a
        // parse failure here usually carries a human-readable reason.
        let body = res.text().await.context("failed to read GDELT response")?;
        let list: ArtList = serde_json::from_str(&body)
            .with_context(|| format!("invalid GDELT response: {}", snippet(&body)))?;

        let items = select_items(list.articles, &self.feed);
        info!(
            keyword = %self.feed.keyword,
            candidates = items.len(),
            "fetched news feed"
        );
        Ok(items)
    }
}

/// Build the GDELT `query` expression: quoted keyword plus an OR-group of
/// `sourcecountry:` terms, matching what the upstream query language expects.
fn build_query(feed: &Feed) -> String {
    let countries: Vec<String> = feed
        .countries
        .iter()
        .map(|c| format!("sourcecountry:{}", c.trim()))
        .collect();
    let scope = if countries.len() == 1 {
        countries[0].clone()
    } else {
        format!("({})", countries.join(" OR "))
    };
    format!("\"{}\" {}", feed.keyword.trim(), scope)
}

/// Keep articles in the configured language, drop blank titles, cap at
/// `feed.max_articles`, preserving GDELT's order.
fn select_items(articles: Vec<Article>, feed: &Feed) -> Vec<NewsItem> {
    articles
        .into_iter()
        .filter(|a| !a.title.trim().is_empty())
        .filter(|a| a.language.eq_ignore_ascii_case(&feed.language))
        .take(feed.max_articles)
        .map(|a| NewsItem {
            title: a.title.trim().to_string(),
            source_url: if a.url.is_empty() { None } else { Some(a.url) },
            fetched_at: parse_seendate(&a.seendate).unwrap_or_else(Utc::now),
        })
        .collect()
}

/// GDELT timestamps look like `20240510T123000Z`.
fn parse_seendate(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y%m%dT%H%M%SZ")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn snippet(body: &str) -> &str {
    let end = body
        .char_indices()
        .nth(200)
        .map(|(i, _)| i)
        .unwrap_or(body.len());
    body[..end].trim_end()
}
