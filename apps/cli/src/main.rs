//! ankimark: reconcile markdown flashcards with Anki over AnkiConnect.

mod anki;
mod config;
mod vault;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ankimark_core::{SyncEngine, SyncError};

use crate::anki::AnkiClient;
use crate::vault::{Vault, VaultMediaResolver};

#[derive(Parser)]
#[command(name = "ankimark", version, about = "Sync markdown flashcards with Anki")]
struct Cli {
    /// AnkiConnect endpoint; overrides the configured one.
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Path to the config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile one note with Anki and write identifier markers back.
    Sync {
        /// The note to sync.
        file: PathBuf,

        /// Vault root the note belongs to; defaults to the note's folder.
        #[arg(long)]
        vault: Option<PathBuf>,

        /// Deck to use when the note declares none.
        #[arg(long)]
        deck: Option<String>,
    },
    /// Check that AnkiConnect is reachable.
    Ping,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = config::load(cli.config.as_deref())?;
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }

    match cli.command {
        Command::Ping => {
            let client = AnkiClient::new(&config.endpoint);
            let version = client.ping().await?;
            println!("AnkiConnect protocol version {version} at {}", config.endpoint);
        }
        Command::Sync { file, vault, deck } => {
            if !file.is_file() {
                return Err(SyncError::NoActiveSource.into());
            }
            if let Some(deck) = deck {
                config.settings.default_deck = deck;
                config.settings.folder_based_deck = false;
            }

            let root = vault.unwrap_or_else(|| {
                file.parent()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("."))
            });
            let vault = Vault::new(&root);
            let note = vault.note_context(&file)?;

            let client = AnkiClient::new(&config.endpoint);
            client.ping().await?;

            let engine = SyncEngine::new(config.settings.clone());
            let media = VaultMediaResolver::new(&root);
            let outcome = engine.sync(note, &client, &media).await?;

            if let Some(text) = outcome.patched_text {
                vault.write_note(&file, &text)?;
            }
            for line in &outcome.notifications {
                println!("{line}");
            }
        }
    }

    Ok(())
}
