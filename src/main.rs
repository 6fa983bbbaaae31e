// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! BlueChat terminal client.

use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bluechat::bluetooth::{Discovery, RfcommConnector};
use bluechat::config::Config;
use bluechat::timeline::{timeline, TimelineItem};
use bluechat::{
    DeviceIdentity, HistoryStore, Message, MessageKind, Session, SessionEvent, SessionOptions,
    SessionRegistry, SessionState,
};

#[derive(Debug, Parser)]
#[command(name = "bluechat", author, version, about = "Chat with a paired device over Bluetooth serial.")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List bonded devices
    Devices,

    /// Scan for nearby devices
    Scan {
        /// Scan length in seconds (defaults to config)
        #[arg(long)]
        secs: Option<u64>,
    },

    /// Open a chat session
    Chat {
        /// Hardware address, e.g. AA:BB:CC:DD:EE:FF
        address: String,

        /// Display name for the device
        #[arg(long)]
        name: Option<String>,
    },

    /// Print the stored conversation with a device
    History { address: String },

    /// Search the stored text messages with a device
    Search { address: String, query: String },

    /// Export the stored conversation to a text file
    Export { address: String, path: PathBuf },

    /// Delete the stored conversation with a device
    Clear { address: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bluechat=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let config = Config::load()?;
    info!("Configuration loaded");

    let history = HistoryStore::new(&config.data_dir)?;

    match cli.command {
        Command::Devices => {
            let discovery = Discovery::new().await?;
            for device in discovery.paired_devices().await? {
                println!("{}", device);
            }
        }
        Command::Scan { secs } => {
            let discovery = Discovery::new().await?;
            let duration = secs
                .map(std::time::Duration::from_secs)
                .unwrap_or_else(|| config.bluetooth.scan_duration());
            for device in discovery.scan(duration).await? {
                println!("{}", device);
            }
        }
        Command::Chat { address, name } => {
            let device = DeviceIdentity::new(name.unwrap_or_else(|| address.clone()), address);
            run_chat(&config, history, device).await?;
        }
        Command::History { address } => {
            let device = known_device(&history, &address)?;
            print_history(&config, &history.load(&device)?);
        }
        Command::Search { address, query } => {
            let device = known_device(&history, &address)?;
            let found = history.search(&device, &query)?;
            for message in &found {
                print_message(message);
            }
            println!("{} match(es)", found.len());
        }
        Command::Export { address, path } => {
            let device = known_device(&history, &address)?;
            let count = history.export(&device, &path)?;
            println!("Exported {} message(s) to {}", count, path.display());
        }
        Command::Clear { address } => {
            let device = known_device(&history, &address)?;
            history.clear(&device)?;
            println!("Cleared history for {}", device);
        }
    }

    Ok(())
}

/// Resolve an address to a stored identity so the display name survives.
fn known_device(history: &HistoryStore, address: &str) -> Result<DeviceIdentity> {
    let wanted = DeviceIdentity::new(address, address);
    let found = history
        .devices()?
        .into_iter()
        .find(|d| d.storage_key() == wanted.storage_key());
    Ok(found.unwrap_or(wanted))
}

fn print_history(config: &Config, messages: &[Message]) {
    let today = Local::now().date_naive();
    for item in timeline(messages, today, &Local, config.history.day_grouping) {
        match item {
            TimelineItem::Separator { label, .. } => println!("--- {} ---", label),
            TimelineItem::Message(message) => print_message(message),
        }
    }
}

fn print_message(message: &Message) {
    println!("{}", format_message(message));
}

fn format_message(message: &Message) -> String {
    let who = message.direction.as_str();
    match message.kind {
        MessageKind::Text => format!("[{}] {}", who, message.payload),
        MessageKind::Audio => format!("[{}] (audio) {}", who, message.payload),
        MessageKind::Image => format!("[{}] (image) {}", who, message.payload),
    }
}

/// Parse an input line into a message. `/audio <ref>` and `/image <ref>`
/// send resource references; anything else is text.
fn parse_input(line: &str) -> Option<(MessageKind, String)> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }

    if let Some(reference) = line.strip_prefix("/audio ") {
        return Some((MessageKind::Audio, reference.trim().to_string()));
    }
    if let Some(reference) = line.strip_prefix("/image ") {
        return Some((MessageKind::Image, reference.trim().to_string()));
    }
    Some((MessageKind::Text, line.to_string()))
}

async fn run_chat(config: &Config, history: HistoryStore, device: DeviceIdentity) -> Result<()> {
    let connector =
        RfcommConnector::new(config.bluetooth.rfcomm_channel, config.transport.max_frame_bytes)
            .await?;

    let (event_tx, mut event_rx) = mpsc::channel::<SessionEvent>(64);
    let options = SessionOptions {
        registry: SessionRegistry::global().clone(),
        events: Some(event_tx),
        connect_timeout: config.bluetooth.connect_timeout(),
        ..SessionOptions::default()
    };
    let session = Session::with_options(device.clone(), history, options);

    println!("Connecting to {}...", device);
    if let Err(e) = session.connect(&connector).await {
        error!("Connect failed: {}", e);
        println!("Could not connect: {}", e);
        return Ok(());
    }

    println!("Connected. Type a message, /audio <path>, /image <uri>, or /quit.");
    print_history(config, &session.history());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim() == "/quit" {
                    break;
                }
                if let Some((kind, content)) = parse_input(&line) {
                    if let Err(e) = session.send(kind, content).await {
                        warn!("Send failed: {}", e);
                        println!("Not delivered: {}", e);
                    }
                }
            }
            Some(event) = event_rx.recv() => {
                match &event {
                    SessionEvent::MessageReceived(message) => print_message(message),
                    SessionEvent::StateChanged { state, .. } => {
                        println!("* {}", event.summary());
                        if matches!(state, SessionState::Disconnected | SessionState::Failed(_)) {
                            break;
                        }
                    }
                    SessionEvent::PersistFailed(_) => println!("* {}", event.summary()),
                    SessionEvent::PayloadDropped(_) => debug!("{}", event.summary()),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    session.disconnect().await;
    info!("BlueChat stopped");
    Ok(())
}
