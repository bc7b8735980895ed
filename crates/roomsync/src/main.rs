//! Command-line client for a DDP chat backend.
//!
//! Mirrors chat rooms to stdout as JSON lines, or sends a message, over the
//! backend's real-time API.
//!
//!   roomsync --url ws://localhost:3000/websocket --token-file ~/.roomsync-token watch --room GENERAL
//!   roomsync --config roomsync.toml send --room GENERAL "hello"

mod output;
mod settings;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use roomsync_client::{ConnectionState, SyncClient};
use roomsync_core::{InMemoryMessageStore, MessageStore};
use settings::{FileSettings, Overrides, Settings};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "roomsync", version, about)]
struct Cli {
    /// TOML config file.
    #[arg(long, env = "ROOMSYNC_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// WebSocket URL of the real-time endpoint.
    #[arg(long, env = "ROOMSYNC_URL", global = true)]
    url: Option<String>,

    /// Resume token. Takes precedence over any token file.
    #[arg(long, env = "ROOMSYNC_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// File holding the resume token, re-read on every connect.
    #[arg(long, global = true)]
    token_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print messages from rooms as JSON lines until interrupted.
    Watch {
        /// Room id to follow (repeatable).
        #[arg(long = "room", required = true)]
        rooms: Vec<String>,
    },
    /// Send one message and exit.
    Send {
        #[arg(long)]
        room: String,
        text: String,
        /// Livechat visitor token.
        #[arg(long)]
        visitor_token: Option<String>,
        /// Seconds to wait for the connection.
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("roomsync=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let file = match &cli.config {
        Some(path) => FileSettings::load(path)?,
        None => FileSettings::default(),
    };
    let settings = Settings::resolve(
        file,
        Overrides {
            url: cli.url,
            token: cli.token,
            token_file: cli.token_file,
        },
    )?;
    tracing::debug!(?settings, "resolved settings");

    let credentials = settings.token.into_source();
    match cli.command {
        Command::Watch { rooms } => {
            let store: Arc<dyn MessageStore> = Arc::new(output::JsonLines::new(std::io::stdout()));
            let client = SyncClient::new(settings.client, credentials, store);
            watch(client, rooms).await
        }
        Command::Send {
            room,
            text,
            visitor_token,
            timeout,
        } => {
            let client = SyncClient::new(
                settings.client,
                credentials,
                Arc::new(InMemoryMessageStore::new()),
            );
            send(client, &room, &text, visitor_token.as_deref(), Duration::from_secs(timeout)).await
        }
    }
}

/// Follow rooms, re-subscribing every time a session opens.
async fn watch(client: SyncClient, rooms: Vec<String>) -> anyhow::Result<()> {
    let mut state = client.watch_state();
    client.connect();

    let result = loop {
        tokio::select! {
            changed = state.changed() => {
                if let Err(e) = changed {
                    break Err(e.into());
                }
                let current = *state.borrow_and_update();
                match current {
                    ConnectionState::Connected => {
                        for room in &rooms {
                            client.subscribe_to_room(room);
                        }
                    }
                    ConnectionState::Unauthorized => break Err(anyhow::anyhow!("resume token rejected by the server")),
                    ConnectionState::Unsupported => break Err(anyhow::anyhow!("server does not support DDP version 1")),
                    ConnectionState::Exhausted => {
                        break Err(anyhow::anyhow!(
                            "gave up after {} reconnection attempts",
                            client.config().reconnect.max_attempts
                        ));
                    }
                    _ => {}
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break Ok(());
            }
        }
    };

    client.shutdown().await;
    result
}

async fn send(
    client: SyncClient,
    room: &str,
    text: &str,
    visitor_token: Option<&str>,
    timeout: Duration,
) -> anyhow::Result<()> {
    let mut state = client.watch_state();
    client.connect();

    let reached = tokio::time::timeout(
        timeout,
        state.wait_for(|s| *s == ConnectionState::Connected || s.is_terminal()),
    )
    .await
    .context("timed out waiting for the connection")?
    .map(|s| *s)?;
    if reached != ConnectionState::Connected {
        bail!("could not connect: {reached:?}");
    }

    let id = client.send_message(room, text, visitor_token);
    println!("{id}");

    // Queued frames are written before the close.
    client.shutdown().await;
    Ok(())
}
