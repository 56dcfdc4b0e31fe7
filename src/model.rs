use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One candidate article as produced by the news source. Immutable after
/// fetch; `title` is the deduplication key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewsItem {
    pub title: String,
    pub source_url: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

/// Caption/image pair for a single item. Lives only between generation and
/// publish; nothing of it is persisted on failure.
#[derive(Clone)]
pub struct GeneratedContent {
    pub caption: String,
    pub image: Vec<u8>,
}

impl std::fmt::Debug for GeneratedContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedContent")
            .field("caption", &self.caption)
            .field("image_bytes", &self.image.len())
            .finish()
    }
}

/// Outcome counters for one full pass over the feed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CycleReport {
    /// Items that went through caption, image and publish, and were recorded.
    pub published: usize,
    /// Items skipped by the dedup filter.
    pub skipped: usize,
    /// Items aborted by a generation or publish error; retried next cycle.
    pub failed: usize,
}

impl CycleReport {
    pub fn total(&self) -> usize {
        self.published + self.skipped + self.failed
    }
}
