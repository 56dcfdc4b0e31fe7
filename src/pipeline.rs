//! Pipeline coordinator: fetch → dedup filter → caption → image → publish →
//! record, strictly sequential, one item at a time.
//!
//! Per-item generation and publish errors are isolated: the item is logged,
//! left unrecorded, and retried on a future cycle. Feed and store errors are
//! infrastructure failures and abort the whole cycle.

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::caption::CaptionGenerator;
use crate::gdelt::NewsSource;
use crate::image::ImageGenerator;
use crate::model::{CycleReport, GeneratedContent, NewsItem};
use crate::store::TitleStore;
use crate::telegram::Publisher;

/// Run one full pass over the feed.
///
/// The title is recorded as the very last step for each item, after the
/// publisher has acknowledged delivery. Any earlier failure leaves the store
/// untouched, so the common failure modes (network errors mid-generation)
/// can never produce a false-positive dedup entry. The remaining unsafe
/// window is a crash between publish and record, which re-publishes the item
/// on a later cycle.
#[instrument(skip_all)]
pub async fn run_cycle(
    source: &dyn NewsSource,
    store: &dyn TitleStore,
    captions: &dyn CaptionGenerator,
    images: &dyn ImageGenerator,
    publisher: &dyn Publisher,
) -> Result<CycleReport> {
    let items = source.fetch().await.context("news fetch failed")?;
    info!(candidates = items.len(), "starting cycle");

    let mut report = CycleReport::default();
    for item in &items {
        if store
            .exists(&item.title)
            .await
            .context("title store lookup failed")?
        {
            info!(title = %item.title, "skipping duplicate title");
            report.skipped += 1;
            continue;
        }

        match process_item(item, captions, images, publisher).await {
            Ok(()) => {
                store
                    .insert(&item.title)
                    .await
                    .context("title store insert failed")?;
                report.published += 1;
                info!(title = %item.title, "published and recorded");
            }
            Err(err) => {
                warn!(?err, title = %item.title, "item failed; leaving unrecorded for retry");
                report.failed += 1;
            }
        }
    }

    info!(
        published = report.published,
        skipped = report.skipped,
        failed = report.failed,
        "cycle finished"
    );
    Ok(report)
}

/// caption → image → publish for a single item. Returns an error at the
/// first failing step; the caller decides what that means for the cycle.
async fn process_item(
    item: &NewsItem,
    captions: &dyn CaptionGenerator,
    images: &dyn ImageGenerator,
    publisher: &dyn Publisher,
) -> Result<()> {
    let caption = captions
        .generate(&item.title)
        .await
        .context("caption generation failed")?;
    let image = images
        .generate(&caption)
        .await
        .context("image generation failed")?;
    let content = GeneratedContent { caption, image };

    let text = message_text(&content.caption, item.source_url.as_deref());
    publisher
        .publish(&text, Some(&content.image))
        .await
        .context("publish failed")
}

/// The published message is the caption followed by the article link when
/// one is known.
fn message_text(caption: &str, source_url: Option<&str>) -> String {
    match source_url {
        Some(url) => format!("{caption}\n\n{url}"),
        None => caption.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_appends_source_link() {
        assert_eq!(
            message_text("lol", Some("https://news.example/a")),
            "lol\n\nhttps://news.example/a"
        );
    }

    #[test]
    fn message_without_link_is_caption_only() {
        assert_eq!(message_text("lol", None), "lol");
    }
}
