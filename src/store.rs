//! Durable title store backed by a Supabase Postgres table, reached through
//! the PostgREST API.
//!
//! Membership is keyed on a normalized form of the title so that
//! near-identical headlines (case, punctuation, spacing) dedup together.
//! Inserts go through PostgREST's `on_conflict` + `ignore-duplicates`
//! resolution, making the record write an atomic insert-if-absent.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

const TITLES_TABLE: &str = "news_titles";

/// Persisted set of already-processed titles.
///
/// The pipeline relies on two properties: `exists` answers membership for
/// the dedup filter, and `insert` is only called after a successful publish.
/// Re-inserting a known title must not fail.
#[async_trait]
pub trait TitleStore: Send + Sync {
    async fn exists(&self, title: &str) -> Result<bool>;
    async fn insert(&self, title: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct SupabaseStore {
    http: Client,
    base_url: Url,
    key: String,
}

impl fmt::Debug for SupabaseStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseStore")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct TitleRow {
    #[allow(dead_code)]
    title: String,
}

impl SupabaseStore {
    pub fn new(project_url: &str, key: String, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(project_url).context("invalid SUPABASE_URL")?;
        let http = Client::builder()
            .user_agent("tg-memebot/0.1")
            .timeout(timeout)
            .build()
            .expect("reqwest client");
        Ok(Self {
            http,
            base_url,
            key,
        })
    }

    fn table_endpoint(&self) -> Result<Url> {
        self.base_url
            .join(&format!("rest/v1/{TITLES_TABLE}"))
            .context("invalid Supabase base URL")
    }

    pub fn build_exists_request(&self, title: &str) -> Result<reqwest::Request> {
        let filter = format!("eq.{}", normalize(title));
        self.http
            .get(self.table_endpoint()?)
            .query(&[
                ("select", "title"),
                ("normalized_title", filter.as_str()),
                ("limit", "1"),
            ])
            .header("apikey", &self.key)
            .header("Authorization", format!("Bearer {}", self.key))
            .build()
            .context("failed to build title lookup request")
    }

    pub fn build_insert_request(&self, title: &str) -> Result<reqwest::Request> {
        let body = json!({
            "title": title,
            "normalized_title": normalize(title),
        });
        self.http
            .post(self.table_endpoint()?)
            .query(&[("on_conflict", "normalized_title")])
            .header("apikey", &self.key)
            .header("Authorization", format!("Bearer {}", self.key))
            .header("Prefer", "resolution=ignore-duplicates,return=minimal")
            .json(&body)
            .build()
            .context("failed to build title insert request")
    }
}

#[async_trait]
impl TitleStore for SupabaseStore {
    #[instrument(skip_all)]
    async fn exists(&self, title: &str) -> Result<bool> {
        let request = self.build_exists_request(title)?;
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach Supabase")?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("supabase lookup error {}: {}", status, body));
        }

        let rows: Vec<TitleRow> = res
            .json()
            .await
            .context("invalid Supabase lookup response")?;
        debug!(found = !rows.is_empty(), "title lookup");
        Ok(!rows.is_empty())
    }

    #[instrument(skip_all)]
    async fn insert(&self, title: &str) -> Result<()> {
        let request = self.build_insert_request(title)?;
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach Supabase")?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("supabase insert error {}: {}", status, body));
        }
        Ok(())
    }
}

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\s]+").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Normalize a title for membership comparison: lowercase, strip everything
/// but letters, digits and whitespace, collapse runs of whitespace.
pub fn normalize(title: &str) -> String {
    let lower = title.to_lowercase();
    let stripped = NON_ALNUM.replace_all(&lower, "");
    WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_store() -> SupabaseStore {
        SupabaseStore::new(
            "https://proj.supabase.co",
            "service-key".into(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn normalize_lowercases_and_strips_punctuation() {
        assert_eq!(
            normalize("Breaking: Man Eats 72 Hot-Dogs!"),
            "breaking man eats 72 hotdogs"
        );
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize("  Climate\t\tChange \n Accelerates  "), "climate change accelerates");
    }

    #[test]
    fn normalize_matches_near_identical_titles() {
        assert_eq!(normalize("AI takes over!"), normalize("ai Takes Over"));
    }

    #[test]
    fn exists_request_filters_on_normalized_title() {
        let store = sample_store();
        let request = store.build_exists_request("Hello, World!").unwrap();

        assert_eq!(request.method(), reqwest::Method::GET);
        assert_eq!(request.url().path(), "/rest/v1/news_titles");
        let query = request.url().query().unwrap();
        assert!(query.contains("normalized_title=eq.hello+world"));
        assert!(query.contains("limit=1"));
        assert_eq!(
            request
                .headers()
                .get("apikey")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "service-key"
        );
        assert_eq!(
            request
                .headers()
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "Bearer service-key"
        );
    }

    #[test]
    fn insert_request_is_conditional_on_normalized_title() {
        let store = sample_store();
        let request = store.build_insert_request("Hello, World!").unwrap();

        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().path(), "/rest/v1/news_titles");
        assert!(request
            .url()
            .query()
            .unwrap()
            .contains("on_conflict=normalized_title"));
        assert_eq!(
            request
                .headers()
                .get("Prefer")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "resolution=ignore-duplicates,return=minimal"
        );

        let body = request.body().and_then(|b| b.as_bytes()).unwrap();
        let body: serde_json::Value = serde_json::from_slice(body).unwrap();
        assert_eq!(body["title"], "Hello, World!");
        assert_eq!(body["normalized_title"], "hello world");
    }

    #[test]
    fn rejects_invalid_project_url() {
        assert!(SupabaseStore::new("not a url", "k".into(), Duration::from_secs(5)).is_err());
    }
}
