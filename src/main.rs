//! recapbot command line: process Meet transcripts into published recaps.
//!
//! Reads `~/.recapbot/config.json` (override with `--config` or
//! `RECAPBOT_CONFIG`), processes the given Drive file ids, prints one JSON
//! object keyed by file id, and exits non-zero if any file failed. Logging
//! goes to stderr, filtered via `RUST_LOG`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use recapbot::bridge::{CalendarBridge, DriveCalendarBridge};
use recapbot::config::AppConfig;
use recapbot::directory::UserDirectory;
use recapbot::google_api::token_store::TokenStore;
use recapbot::google_api::GoogleAuth;
use recapbot::notion::NotionClient;
use recapbot::pipeline::RecapPipeline;
use recapbot::processor::{MeetingTranscriptProcessor, ProcessorOptions};
use recapbot::slack::SlackClient;
use recapbot::summarizer::GeminiSummarizer;
use recapbot::types::ProcessingStatus;

#[derive(Parser, Debug)]
#[command(name = "recapbot")]
#[command(about = "Match Meet transcripts to calendar events and publish recaps")]
#[command(version)]
struct Args {
    /// Drive file ids of the transcripts to process
    #[arg(required = true)]
    file_ids: Vec<String>,

    /// Config file path (default ~/.recapbot/config.json)
    #[arg(short, long, env = "RECAPBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Print run statistics after the outcomes
    #[arg(long)]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AppConfig::load(path),
        None => AppConfig::load_default(),
    }
    .context("Failed to load configuration")?;

    let pipeline = build_pipeline(&config)?;

    let outcomes = pipeline.run_batch(&args.file_ids).await;
    println!("{}", serde_json::to_string_pretty(&outcomes)?);

    let stats = pipeline.processor().get_statistics();
    if args.stats {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }
    log::info!(
        "Run complete: {} processed, {} ok, {} failed",
        stats.total_processed,
        stats.successful,
        stats.failed
    );

    let failed = outcomes
        .values()
        .filter(|o| o.result.status != ProcessingStatus::Completed)
        .count();

    pipeline.processor().cleanup().await;

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Wire collaborators from config. Feature flags are enforced by the
/// processor's constructor; this only decides what can be built from the
/// credentials present.
fn build_pipeline(config: &AppConfig) -> Result<RecapPipeline> {
    let oauth = config
        .google
        .oauth
        .clone()
        .context("Config is missing google.oauth client credentials")?;
    let token_dir = config
        .google
        .token_dir
        .clone()
        .unwrap_or_else(TokenStore::default_dir);
    let auth = Arc::new(GoogleAuth::new(oauth, TokenStore::new(token_dir)));

    let slack_client = config.slack.bot_token.as_deref().map(SlackClient::new);
    let notion_client = config.notion.api_token.as_deref().map(NotionClient::new);

    let bridge: Option<Arc<dyn CalendarBridge>> = Some(Arc::new(DriveCalendarBridge::new(
        auth.clone(),
        config.google.user.clone(),
    )));
    let slack_directory: Option<Arc<dyn UserDirectory>> = match &slack_client {
        Some(client) => Some(Arc::new(client.clone())),
        None => None,
    };
    let notion_directory: Option<Arc<dyn UserDirectory>> = match &notion_client {
        Some(client) => Some(Arc::new(client.clone())),
        None => None,
    };

    let processor = MeetingTranscriptProcessor::new(
        ProcessorOptions::from(&config.processing),
        bridge,
        slack_directory,
        notion_directory,
    );

    let mut pipeline = RecapPipeline::new(processor, auth, config.google.user.clone());
    if let Some(key) = &config.gemini.api_key {
        let mut summarizer = GeminiSummarizer::new(key.clone());
        if let Some(model) = &config.gemini.model {
            summarizer = summarizer.with_model(model.clone());
        }
        pipeline = pipeline.with_summarizer(summarizer);
    }
    if let (Some(client), Some(channel)) = (&slack_client, &config.slack.recap_channel) {
        pipeline = pipeline.with_slack(client.clone(), channel.clone());
    }
    if let (Some(client), Some(database_id)) = (&notion_client, &config.notion.recap_database_id) {
        pipeline = pipeline.with_notion(client.clone(), database_id.clone());
    }
    Ok(pipeline)
}
