//! Joke caption generation through the Hugging Face hosted-inference API.
//!
//! The client applies a few-shot prompt template to the headline, asks the
//! configured text model for a completion, and cleans the result up into a
//! tweet-sized caption. Generation is retried a configured number of times;
//! hosted inference fails transiently often enough (cold models, rate
//! limits) that a single attempt would abort too many items.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

use crate::config;

const HF_API_BASE: &str = "https://api-inference.huggingface.co/";

/// Hard ceiling matching the destination's comfortable caption length.
const MAX_CAPTION_CHARS: usize = 280;

/// Completions shorter than this are treated as a failed generation.
const MIN_CAPTION_CHARS: usize = 10;

const PROMPT_PREAMBLE: &str = "\
Write a humorous tweet-style comment (under 280 characters) for the given \
news headline. Keep the tone witty and relatable, in casual online language. \
Follow the style of these examples:

HEADLINE: Scientists Discover New Super-Earth 12 Light Years Away
Comment: New Super-Earth discovered, and the first thing humans think is 'can we move there and ruin that one too?'

HEADLINE: Global Economy Faces Unprecedented Challenges
Comment: Unprecedented challenges = 'we broke it but can't fix it.' Classic human vibes, just reboot the year already.

HEADLINE: Local Man Breaks World Record for Eating Hot Dogs
Comment: Breaking news: man eats 72 hot dogs. Somewhere, a cardiologist just fainted.

HEADLINE: Billionaires Compete to Build Space Hotels
Comment: Space hotels? We just want affordable rent on Earth. Stop playing Monopoly with the galaxy.

Now, in the same style and tone, comment on the following headline:
";

/// Turns a headline into a short humorous caption.
#[async_trait]
pub trait CaptionGenerator: Send + Sync {
    async fn generate(&self, headline: &str) -> Result<String>;
}

#[derive(Clone)]
pub struct HfCaptionClient {
    http: Client,
    base_url: Url,
    model: String,
    token: String,
    max_attempts: u32,
    retry_pause: Duration,
}

impl fmt::Debug for HfCaptionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HfCaptionClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct Generation {
    generated_text: String,
}

impl HfCaptionClient {
    pub fn new(cfg: config::Caption, token: String, timeout: Duration) -> Self {
        let base_url = Url::parse(HF_API_BASE).expect("valid default Hugging Face URL");
        Self::with_base_url(cfg, token, timeout, base_url)
    }

    pub fn with_base_url(
        cfg: config::Caption,
        token: String,
        timeout: Duration,
        base_url: Url,
    ) -> Self {
        let http = Client::builder()
            .user_agent("tg-memebot/0.1")
            .timeout(timeout)
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            model: cfg.model,
            token,
            max_attempts: cfg.max_attempts,
            retry_pause: Duration::from_millis(cfg.retry_pause_ms),
        }
    }

    async fn request_caption(&self, prompt: &str) -> Result<String> {
        let endpoint = self
            .base_url
            .join(&format!("models/{}", self.model))
            .context("invalid Hugging Face base URL")?;
        let body = json!({
            "inputs": prompt,
            "parameters": {
                "max_new_tokens": 120,
                "return_full_text": false,
            },
        });

        let res = self
            .http
            .post(endpoint)
            .header("Authorization", format!("Bearer {}", self.token))
            .json(&body)
            .send()
            .await
            .context("failed to reach Hugging Face")?;

        if res.status() == StatusCode::TOO_MANY_REQUESTS
            || res.status() == StatusCode::SERVICE_UNAVAILABLE
        {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("inference endpoint busy {}: {}", status, body));
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("inference error {}: {}", status, body));
        }

        let generations: Vec<Generation> = res
            .json()
            .await
            .context("invalid inference response JSON")?;
        let raw = generations
            .into_iter()
            .next()
            .map(|g| g.generated_text)
            .ok_or_else(|| anyhow!("inference response contained no generations"))?;

        Ok(shorten(&tidy(&raw), MAX_CAPTION_CHARS))
    }
}

#[async_trait]
impl CaptionGenerator for HfCaptionClient {
    #[instrument(skip_all)]
    async fn generate(&self, headline: &str) -> Result<String> {
        let prompt = render_prompt(headline);
        let mut last_err = None;

        for attempt in 1..=self.max_attempts {
            match self.request_caption(&prompt).await {
                Ok(caption) if caption.chars().count() >= MIN_CAPTION_CHARS => {
                    info!(attempt, chars = caption.chars().count(), "generated caption");
                    return Ok(caption);
                }
                Ok(caption) => {
                    warn!(attempt, caption = %caption, "generated caption too short");
                    last_err = Some(anyhow!("generated caption too short: {caption:?}"));
                }
                Err(err) => {
                    warn!(?err, attempt, "caption attempt failed");
                    last_err = Some(err);
                }
            }
            if attempt < self.max_attempts {
                sleep(self.retry_pause).await;
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("caption generation failed")))
            .with_context(|| format!("no caption after {} attempts", self.max_attempts))
    }
}

fn render_prompt(headline: &str) -> String {
    format!("{PROMPT_PREAMBLE}\nHEADLINE: {headline}\nComment:")
}

/// Strip surrounding quotes and collapse whitespace; models like to return
/// the comment wrapped in quotation marks and padded with newlines.
fn tidy(raw: &str) -> String {
    let trimmed = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '\u{201c}' || c == '\u{201d}');
    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Word-boundary truncation with a `...` placeholder.
fn shorten(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let limit = max_chars.saturating_sub(3);
    let mut out = String::new();
    for word in text.split_whitespace() {
        let sep = usize::from(!out.is_empty());
        if out.chars().count() + sep + word.chars().count() > limit {
            break;
        }
        if sep == 1 {
            out.push(' ');
        }
        out.push_str(word);
    }
    if out.is_empty() {
        out = text.chars().take(limit).collect();
    }
    out.push_str("...");
    out
}
