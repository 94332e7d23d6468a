use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use vk_client::{Credentials, VkClient};
use wallscout_common::{CollectMessage, Config, Source, VkAuthConfig};
use wallscout_collector::cursor::{CursorStore, FileCursorStore, MemoryCursorStore};
use wallscout_collector::notify::NoopPublisher;
use wallscout_collector::parser::WallPostParser;
use wallscout_collector::store::{MemoryNoteStore, StoreDuplicateFinder};
use wallscout_collector::{
    assemble_note, prune_stale_notes, CollectConsumer, CollectorSettings, HandleOutcome, UserExplorer,
    WallCollector,
};

#[derive(Parser)]
#[command(name = "wallscout", about = "VK wall harvester")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one collect cycle per source and print collect messages as JSON lines
    Collect {
        /// JSON file holding an array of sources
        #[arg(long)]
        sources: PathBuf,
        /// Keep cursors in memory instead of CURSOR_DIR
        #[arg(long)]
        dry_run: bool,
    },
    /// Run collect messages from stdin through dedup into an in-memory note
    /// store, then prune notes older than NOTE_MAX_AGE_SECS
    Consume,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr; stdout carries the messages.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("wallscout=info".parse()?)
                .add_directive("vk_client=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = Config::from_env()?;
    config.log_redacted();

    match cli.command {
        Command::Collect { sources, dry_run } => collect(&config, &sources, dry_run).await,
        Command::Consume => consume(&config).await,
    }
}

async fn collect(config: &Config, sources_path: &Path, dry_run: bool) -> Result<()> {
    let raw = tokio::fs::read_to_string(sources_path)
        .await
        .with_context(|| format!("Failed to read sources from {}", sources_path.display()))?;
    let sources: Vec<Source> = serde_json::from_str(&raw).context("Sources file is not a JSON array of sources")?;

    let client = Arc::new(vk_client(config));
    let cursors: Arc<dyn CursorStore> = if dry_run {
        info!("Dry run, cursors kept in memory");
        Arc::new(MemoryCursorStore::new())
    } else {
        Arc::new(FileCursorStore::new(config.cursor_dir.clone()))
    };

    let collector = WallCollector::new(
        client.clone(),
        cursors,
        Arc::new(WallPostParser),
        CollectorSettings::from_config(config),
    );
    let explorer = UserExplorer::new(client, config.user_cache_capacity);

    info!(sources = sources.len(), "Wallscout collect starting...");

    let mut stdout = std::io::stdout();
    let mut emitted = 0usize;
    for source in &sources {
        let candidates = collector.collect(source).await;
        for candidate in &candidates {
            let note = match assemble_note(candidate, source, &explorer).await {
                Ok(note) => note,
                Err(e) => {
                    warn!(source_id = source.id, candidate = %candidate.id, error = %e, "Failed to assemble note");
                    continue;
                }
            };
            let message = CollectMessage {
                note,
                source: source.clone(),
            };
            match serde_json::to_string(&message) {
                Ok(line) => {
                    writeln!(stdout, "{line}")?;
                    emitted += 1;
                }
                Err(e) => error!(source_id = source.id, candidate = %candidate.id, error = %e, "Failed to encode message"),
            }
        }
    }
    stdout.flush()?;

    info!(sources = sources.len(), emitted, "Wallscout collect complete");
    Ok(())
}

async fn consume(config: &Config) -> Result<()> {
    let store = Arc::new(MemoryNoteStore::new());
    let consumer = CollectConsumer::from_config(
        config,
        Arc::new(StoreDuplicateFinder::new(store.clone())),
        store.clone(),
        Arc::new(NoopPublisher),
    );

    info!("Wallscout consume starting...");

    let mut tally: HashMap<&'static str, usize> = HashMap::new();
    for line in std::io::stdin().lock().lines() {
        let line = line.context("Failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let message: CollectMessage = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Skipping undecodable collect message");
                *tally.entry("undecodable").or_default() += 1;
                continue;
            }
        };
        let key = match consumer.handle(message).await {
            HandleOutcome::Accepted { notified: true, .. } => "notified",
            HandleOutcome::Accepted { notified: false, .. } => "debounced",
            HandleOutcome::DuplicateDiscarded => "discarded",
            HandleOutcome::ErrorSuppressed => "failed",
        };
        *tally.entry(key).or_default() += 1;
    }

    let stats = prune_stale_notes(store.as_ref(), chrono::Utc::now(), config.note_max_age).await?;

    info!(outcomes = ?tally, stored = store.len(), pruned = stats.deleted, "Wallscout consume complete");
    Ok(())
}

fn vk_client(config: &Config) -> VkClient {
    match &config.vk_auth {
        VkAuthConfig::Token(token) => VkClient::with_token(token.clone(), &config.vk_api_version),
        VkAuthConfig::Password {
            username,
            password,
            app_id,
            app_secret,
        } => VkClient::with_password(
            Credentials {
                username: username.clone(),
                password: password.clone(),
                app_id: app_id.clone(),
                app_secret: app_secret.clone(),
                scope: vec!["wall".to_string(), "groups".to_string()],
            },
            &config.vk_api_version,
        ),
    }
}
