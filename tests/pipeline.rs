use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tg_memebot::caption::CaptionGenerator;
use tg_memebot::gdelt::NewsSource;
use tg_memebot::image::ImageGenerator;
use tg_memebot::model::NewsItem;
use tg_memebot::pipeline::run_cycle;
use tg_memebot::store::{normalize, TitleStore};
use tg_memebot::telegram::Publisher;
use tokio::sync::Mutex;

fn item(title: &str) -> NewsItem {
    NewsItem {
        title: title.to_string(),
        source_url: Some(format!(
            "https://news.example/{}",
            normalize(title).replace(' ', "-")
        )),
        fetched_at: Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap(),
    }
}

#[derive(Clone, Default)]
struct StaticFeed {
    items: Vec<NewsItem>,
}

impl StaticFeed {
    fn new(items: Vec<NewsItem>) -> Self {
        Self { items }
    }
}

#[async_trait]
impl NewsSource for StaticFeed {
    async fn fetch(&self) -> Result<Vec<NewsItem>> {
        Ok(self.items.clone())
    }
}

struct FailingFeed;

#[async_trait]
impl NewsSource for FailingFeed {
    async fn fetch(&self) -> Result<Vec<NewsItem>> {
        Err(anyhow!("gdelt unreachable"))
    }
}

#[derive(Clone, Default)]
struct MemoryStore {
    titles: Arc<Mutex<HashSet<String>>>,
    fail_lookups: bool,
}

impl MemoryStore {
    async fn seeded(titles: &[&str]) -> Self {
        let store = Self::default();
        for title in titles {
            store.titles.lock().await.insert(normalize(title));
        }
        store
    }

    fn failing() -> Self {
        Self {
            fail_lookups: true,
            ..Default::default()
        }
    }

    async fn contains(&self, title: &str) -> bool {
        self.titles.lock().await.contains(&normalize(title))
    }

    async fn len(&self) -> usize {
        self.titles.lock().await.len()
    }
}

#[async_trait]
impl TitleStore for MemoryStore {
    async fn exists(&self, title: &str) -> Result<bool> {
        if self.fail_lookups {
            return Err(anyhow!("store unreachable"));
        }
        Ok(self.contains(title).await)
    }

    async fn insert(&self, title: &str) -> Result<()> {
        self.titles.lock().await.insert(normalize(title));
        Ok(())
    }
}

#[derive(Clone, Default)]
struct RecordingCaptions {
    calls: Arc<Mutex<Vec<String>>>,
    responses: Arc<Mutex<VecDeque<Result<String>>>>,
}

impl RecordingCaptions {
    fn with_responses(responses: Vec<Result<String>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            ..Default::default()
        }
    }

    async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl CaptionGenerator for RecordingCaptions {
    async fn generate(&self, headline: &str) -> Result<String> {
        self.calls.lock().await.push(headline.to_string());
        let mut guard = self.responses.lock().await;
        guard
            .pop_front()
            .unwrap_or_else(|| Ok(format!("joke-{headline}")))
    }
}

#[derive(Clone, Default)]
struct RecordingImages {
    calls: Arc<Mutex<Vec<String>>>,
    responses: Arc<Mutex<VecDeque<Result<Vec<u8>>>>>,
}

impl RecordingImages {
    fn with_responses(responses: Vec<Result<Vec<u8>>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            ..Default::default()
        }
    }

    async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl ImageGenerator for RecordingImages {
    async fn generate(&self, caption: &str) -> Result<Vec<u8>> {
        self.calls.lock().await.push(caption.to_string());
        let mut guard = self.responses.lock().await;
        guard
            .pop_front()
            .unwrap_or_else(|| Ok(b"image-bytes".to_vec()))
    }
}

#[derive(Debug, Clone)]
struct PublishCall {
    text: String,
    image: Option<Vec<u8>>,
}

#[derive(Clone, Default)]
struct RecordingPublisher {
    calls: Arc<Mutex<Vec<PublishCall>>>,
    responses: Arc<Mutex<VecDeque<Result<()>>>>,
}

impl RecordingPublisher {
    fn with_responses(responses: Vec<Result<()>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            ..Default::default()
        }
    }

    async fn calls(&self) -> Vec<PublishCall> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, text: &str, image: Option<&[u8]>) -> Result<()> {
        self.calls.lock().await.push(PublishCall {
            text: text.to_string(),
            image: image.map(<[u8]>::to_vec),
        });
        let mut guard = self.responses.lock().await;
        guard.pop_front().unwrap_or(Ok(()))
    }
}

#[tokio::test]
async fn publishes_new_item_and_records_title() {
    let feed = StaticFeed::new(vec![item("X")]);
    let store = MemoryStore::default();
    let captions = RecordingCaptions::default();
    let images = RecordingImages::default();
    let publisher = RecordingPublisher::default();

    assert!(!store.contains("X").await);
    let report = run_cycle(&feed, &store, &captions, &images, &publisher)
        .await
        .unwrap();

    assert_eq!(report.published, 1);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.failed, 0);
    assert!(store.contains("X").await);

    assert_eq!(captions.calls().await, vec!["X".to_string()]);
    assert_eq!(images.calls().await, vec!["joke-X".to_string()]);

    let calls = publisher.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].text, "joke-X\n\nhttps://news.example/x");
    assert_eq!(calls[0].image.as_deref(), Some(b"image-bytes".as_slice()));
}

#[tokio::test]
async fn duplicate_title_triggers_no_downstream_calls() {
    let feed = StaticFeed::new(vec![item("X")]);
    let store = MemoryStore::seeded(&["X"]).await;
    let captions = RecordingCaptions::default();
    let images = RecordingImages::default();
    let publisher = RecordingPublisher::default();

    let report = run_cycle(&feed, &store, &captions, &images, &publisher)
        .await
        .unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.published, 0);
    assert!(captions.calls().await.is_empty());
    assert!(images.calls().await.is_empty());
    assert!(publisher.calls().await.is_empty());
}

#[tokio::test]
async fn publish_failure_leaves_title_unrecorded() {
    let feed = StaticFeed::new(vec![item("X")]);
    let store = MemoryStore::default();
    let captions = RecordingCaptions::default();
    let images = RecordingImages::default();
    let publisher = RecordingPublisher::with_responses(vec![Err(anyhow!("telegram 500"))]);

    let report = run_cycle(&feed, &store, &captions, &images, &publisher)
        .await
        .unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.published, 0);
    assert!(!store.contains("X").await);
    // Generation did run; only the record write was withheld.
    assert_eq!(captions.calls().await.len(), 1);
    assert_eq!(publisher.calls().await.len(), 1);
}

#[tokio::test]
async fn caption_failure_is_isolated_to_its_item() {
    let feed = StaticFeed::new(vec![item("A"), item("B")]);
    let store = MemoryStore::default();
    let captions = RecordingCaptions::with_responses(vec![Err(anyhow!("model busy"))]);
    let images = RecordingImages::default();
    let publisher = RecordingPublisher::default();

    let report = run_cycle(&feed, &store, &captions, &images, &publisher)
        .await
        .unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.published, 1);
    assert!(!store.contains("A").await);
    assert!(store.contains("B").await);

    let calls = publisher.calls().await;
    assert_eq!(calls.len(), 1);
    assert!(calls[0].text.starts_with("joke-B"));
}

#[tokio::test]
async fn image_failure_is_isolated_to_its_item() {
    let feed = StaticFeed::new(vec![item("X")]);
    let store = MemoryStore::default();
    let captions = RecordingCaptions::default();
    let images = RecordingImages::with_responses(vec![Err(anyhow!("diffusion quota"))]);
    let publisher = RecordingPublisher::default();

    let report = run_cycle(&feed, &store, &captions, &images, &publisher)
        .await
        .unwrap();

    assert_eq!(report.failed, 1);
    assert!(!store.contains("X").await);
    assert!(publisher.calls().await.is_empty());
}

#[tokio::test]
async fn second_cycle_over_same_feed_processes_nothing() {
    let feed = StaticFeed::new(vec![item("X")]);
    let store = MemoryStore::default();
    let captions = RecordingCaptions::default();
    let images = RecordingImages::default();
    let publisher = RecordingPublisher::default();

    let first = run_cycle(&feed, &store, &captions, &images, &publisher)
        .await
        .unwrap();
    assert_eq!(first.published, 1);

    let second = run_cycle(&feed, &store, &captions, &images, &publisher)
        .await
        .unwrap();
    assert_eq!(second.published, 0);
    assert_eq!(second.skipped, 1);
    assert_eq!(publisher.calls().await.len(), 1);
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn source_order_is_preserved_around_duplicates() {
    let feed = StaticFeed::new(vec![item("A"), item("B"), item("C")]);
    let store = MemoryStore::seeded(&["B"]).await;
    let captions = RecordingCaptions::default();
    let images = RecordingImages::default();
    let publisher = RecordingPublisher::default();

    let report = run_cycle(&feed, &store, &captions, &images, &publisher)
        .await
        .unwrap();

    assert_eq!(report.published, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(
        captions.calls().await,
        vec!["A".to_string(), "C".to_string()]
    );

    let texts: Vec<String> = publisher.calls().await.into_iter().map(|c| c.text).collect();
    assert!(texts[0].starts_with("joke-A"));
    assert!(texts[1].starts_with("joke-C"));
}

#[tokio::test]
async fn near_identical_titles_dedup_within_one_cycle() {
    let feed = StaticFeed::new(vec![item("AI Takes Over!"), item("ai takes over")]);
    let store = MemoryStore::default();
    let captions = RecordingCaptions::default();
    let images = RecordingImages::default();
    let publisher = RecordingPublisher::default();

    let report = run_cycle(&feed, &store, &captions, &images, &publisher)
        .await
        .unwrap();

    assert_eq!(report.published, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(store.len().await, 1);
    assert_eq!(publisher.calls().await.len(), 1);
}

#[tokio::test]
async fn fetch_failure_aborts_the_cycle() {
    let store = MemoryStore::default();
    let captions = RecordingCaptions::default();
    let images = RecordingImages::default();
    let publisher = RecordingPublisher::default();

    let err = run_cycle(&FailingFeed, &store, &captions, &images, &publisher)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("news fetch failed"));
    assert!(captions.calls().await.is_empty());
    assert!(publisher.calls().await.is_empty());
}

#[tokio::test]
async fn store_lookup_failure_aborts_the_cycle() {
    let feed = StaticFeed::new(vec![item("X")]);
    let store = MemoryStore::failing();
    let captions = RecordingCaptions::default();
    let images = RecordingImages::default();
    let publisher = RecordingPublisher::default();

    let err = run_cycle(&feed, &store, &captions, &images, &publisher)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("title store lookup failed"));
    assert!(captions.calls().await.is_empty());
}
