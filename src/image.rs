//! Meme image generation through the Hugging Face hosted-inference API.
//!
//! The caption is wrapped in a fixed meme-style base prompt and sent to the
//! configured diffusion model; the endpoint answers with raw image bytes.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::json;
use std::fmt;
use std::time::Duration;
use tracing::{info, instrument};

use crate::config;

const HF_API_BASE: &str = "https://api-inference.huggingface.co/";

const BASE_PROMPT: &str = "\
A humorous, engaging meme-style image capturing the essence of a social \
media post. Modern meme aesthetic, vibrant eye-catching colors, a clear \
focal point, simple impactful composition, suitable for sharing. \
The post:";

/// Turns a caption into an image payload.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, caption: &str) -> Result<Vec<u8>>;
}

#[derive(Clone)]
pub struct HfImageClient {
    http: Client,
    base_url: Url,
    model: String,
    token: String,
}

impl fmt::Debug for HfImageClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HfImageClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl HfImageClient {
    pub fn new(cfg: config::Image, token: String, timeout: Duration) -> Self {
        let base_url = Url::parse(HF_API_BASE).expect("valid default Hugging Face URL");
        Self::with_base_url(cfg, token, timeout, base_url)
    }

    pub fn with_base_url(
        cfg: config::Image,
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
        }
    }
}

#[async_trait]
impl ImageGenerator for HfImageClient {
    #[instrument(skip_all)]
    async fn generate(&self, caption: &str) -> Result<Vec<u8>> {
        let endpoint = self
            .base_url
            .join(&format!("models/{}", self.model))
            .context("invalid Hugging Face base URL")?;
        let body = json!({ "inputs": build_prompt(caption) });

        let res = self
            .http
            .post(endpoint)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "image/png")
            .json(&body)
            .send()
            .await
            .context("failed to reach Hugging Face")?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("image inference error {}: {}", status, body));
        }

        let bytes = res
            .bytes()
            .await
            .context("failed to read image response")?;
        if bytes.is_empty() {
            return Err(anyhow!("image inference returned an empty body"));
        }

        info!(bytes = bytes.len(), "generated image");
        Ok(bytes.to_vec())
    }
}

fn build_prompt(caption: &str) -> String {
    format!("{BASE_PROMPT} \"{caption}\"")
}
