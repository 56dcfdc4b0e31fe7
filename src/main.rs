use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

use tg_memebot::caption::HfCaptionClient;
use tg_memebot::config::{self, Secrets};
use tg_memebot::gdelt::GdeltClient;
use tg_memebot::image::HfImageClient;
use tg_memebot::pipeline;
use tg_memebot::store::SupabaseStore;
use tg_memebot::telegram::TelegramPublisher;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Keep running, sleeping `app.watch_interval_secs` between cycles,
    /// instead of exiting after one cycle.
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    let secrets = Secrets::from_env()?;

    let timeout = Duration::from_secs(cfg.app.request_timeout_secs);
    let source = GdeltClient::new(cfg.feed.clone(), timeout);
    let store = SupabaseStore::new(&secrets.supabase_url, secrets.supabase_key.clone(), timeout)?;
    let captions = HfCaptionClient::new(cfg.caption.clone(), secrets.llm_token.clone(), timeout);
    let images = HfImageClient::new(cfg.image.clone(), secrets.image_token.clone(), timeout);
    let publisher = TelegramPublisher::new(&secrets.bot_token, &secrets.chat_id)?;

    if args.watch {
        let interval = Duration::from_secs(cfg.app.watch_interval_secs);
        info!(interval_secs = cfg.app.watch_interval_secs, "starting watch loop");
        loop {
            // A failed cycle is logged and retried on the next tick; items it
            // did not record stay eligible.
            if let Err(err) =
                pipeline::run_cycle(&source, &store, &captions, &images, &publisher).await
            {
                error!(?err, "cycle failed");
            }
            tokio::time::sleep(interval).await;
        }
    }

    pipeline::run_cycle(&source, &store, &captions, &images, &publisher).await?;
    Ok(())
}
