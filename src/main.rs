use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axscope::playback::{reconstruct_with_report, PlaybackConfig};
use axscope::{
    spawn_observer, util, Config, HubConfig, JsonFileCaptureSource, ObserverEvent, PatchOp,
    PlaybackController, PlaybackFrame, Recording, SyncHub, SyncMessage, SyncServer, TreeNode,
};
use clap::{Parser, Subcommand};

/// Inspect, record and replay accessibility-tree state.
#[derive(Parser, Debug)]
#[command(name = "axscope")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: <data dir>/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory (default: ~/.axscope)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log to stderr instead of the log file
    #[arg(long, global = true)]
    log_stderr: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve a flat node table file to WebSocket observers
    Serve {
        /// JSON file holding the node table; re-read on every poll
        #[arg(long)]
        source: PathBuf,

        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,

        /// Start recording as soon as the server is up
        #[arg(long)]
        record: bool,
    },

    /// Replay a recording, or print the tree at one index
    Play {
        recording: PathBuf,

        /// Playback speed multiplier
        #[arg(long)]
        speed: Option<f64>,

        /// Print the tree at this timeline index (-1 = initial snapshot) and exit
        #[arg(long, allow_negative_numbers = true)]
        index: Option<isize>,
    },

    /// Summarize a recording file
    Inspect { recording: PathBuf },

    /// Connect to a sync server and print what it sends
    Watch {
        /// Override the configured server URL
        #[arg(long)]
        url: Option<String>,
    },
}

fn init_logging(to_stderr: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if to_stderr {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        return Ok(());
    }

    // Log to file (~/.axscope/logs/axscope.log)
    fs::create_dir_all(util::logs_dir())?;
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(util::log_file_path())?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(log_file)
        .with_ansi(false) // Disable ANSI colors in log file
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    util::init_data_dir(cli.data_dir.clone());
    init_logging(cli.log_stderr)?;

    let config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load(),
    };

    match cli.command {
        Commands::Serve {
            source,
            port,
            record,
        } => serve(config, source, port, record).await,
        Commands::Play {
            recording,
            speed,
            index,
        } => play(config, recording, speed, index).await,
        Commands::Inspect { recording } => inspect(recording),
        Commands::Watch { url } => watch(config, url).await,
    }
}

async fn serve(config: Config, source: PathBuf, port: Option<u16>, record: bool) -> Result<()> {
    let capture = Arc::new(JsonFileCaptureSource::new(source));
    let hub = SyncHub::new(capture, HubConfig::from_config(&config));

    let mut server_config = config.server.clone();
    if let Some(port) = port {
        server_config.port = port;
    }
    let mut server = SyncServer::new(hub.clone(), server_config);
    let addr = server.start().await?;
    println!("serving on ws://{}{}", addr, config.server.ws_path);

    if record {
        hub.start_recording()
            .await
            .context("failed to start recording")?;
        println!("recording started");
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    if hub.status().await.is_recording {
        let recording = hub.stop_recording().await?;
        println!("recording stopped with {} entries", recording.timeline.len());
    }
    server.stop().await
}

async fn play(
    config: Config,
    path: PathBuf,
    speed: Option<f64>,
    index: Option<isize>,
) -> Result<()> {
    let recording = Recording::read_from_path(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    if let Some(index) = index {
        let report = reconstruct_with_report(&recording, index)?;
        for skipped in &report.skipped {
            eprintln!("warning: delta at index {skipped} could not be applied");
        }
        println!("{}", serde_json::to_string_pretty(&report.tree)?);
        return Ok(());
    }

    let len = recording.timeline.len();
    let recording = Arc::new(recording);
    let playback = PlaybackConfig {
        speed: speed.unwrap_or(config.playback.speed),
        ..config.playback
    };
    let controller = PlaybackController::new(recording.clone(), playback)?;

    let initial = controller.current_frame();
    print_frame(&initial, recording.initial_snapshot.timestamp);
    print_outline(&initial.tree, 1);
    if len == 0 {
        return Ok(());
    }

    let mut frames = controller.subscribe();
    controller.play();
    let mut last = initial;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                controller.pause();
                break;
            }
            frame = frames.recv() => {
                let Ok(frame) = frame else { break };
                print_frame(&frame, recording.initial_snapshot.timestamp);
                let done = frame.index + 1 >= len as isize;
                last = frame;
                if done {
                    break;
                }
            }
        }
    }

    println!("final tree at index {}:", last.index);
    print_outline(&last.tree, 1);
    Ok(())
}

fn print_frame(frame: &PlaybackFrame, start: u64) {
    let offset = frame.timestamp.saturating_sub(start);
    let mut line = format!("[{:>4}] +{}ms", frame.index, offset);
    if let Some(event) = &frame.event {
        line.push_str(&format!(" event={}", event.kind));
    }
    if let Some(ids) = &frame.changed_node_ids {
        line.push_str(&format!(" changed={ids:?}"));
    }
    println!("{line}");
}

fn print_outline(tree: &TreeNode, depth: usize) {
    let name = tree
        .name
        .as_deref()
        .map(|n| format!(" {n:?}"))
        .unwrap_or_default();
    println!(
        "{}{}{} [{}]",
        "  ".repeat(depth),
        tree.role,
        name,
        tree.backend_node_id
    );
    for child in &tree.children {
        print_outline(child, depth + 1);
    }
}

fn inspect(path: PathBuf) -> Result<()> {
    let recording = Recording::read_from_path(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let metadata = &recording.metadata;

    println!("file:      {}", path.display());
    println!("version:   {}", metadata.version);
    if let Some(url) = &metadata.url {
        println!("url:       {url}");
    }
    if let Some(title) = &metadata.title {
        println!("title:     {title}");
    }
    println!(
        "duration:  {}ms",
        metadata.end_time.saturating_sub(metadata.start_time)
    );
    println!("nodes:     {}", recording.initial_snapshot.tree.node_count());
    println!("entries:   {}", recording.timeline.len());

    let mut ops: BTreeMap<&str, usize> = BTreeMap::new();
    let mut events: BTreeMap<&str, usize> = BTreeMap::new();
    for entry in &recording.timeline {
        for op in &entry.delta.ops {
            let kind = match op {
                PatchOp::ReplaceRoot { .. } => "replaceRoot",
                PatchOp::RemoveNode { .. } => "removeNode",
                PatchOp::AddNode { .. } => "addNode",
                PatchOp::MoveNode { .. } => "moveNode",
                PatchOp::SetField { .. } => "setField",
            };
            *ops.entry(kind).or_default() += 1;
        }
        if let Some(event) = &entry.event {
            *events.entry(event.kind.as_str()).or_default() += 1;
        }
    }
    for (kind, count) in &ops {
        println!("  op {kind:<12} {count}");
    }
    for (kind, count) in &events {
        println!("  event {kind:<9} {count}");
    }

    let last = recording.timeline.len() as isize - 1;
    let report = reconstruct_with_report(&recording, last)?;
    println!("final nodes: {}", report.tree.node_count());
    if !report.skipped.is_empty() {
        println!("unapplicable deltas at: {:?}", report.skipped);
    }
    Ok(())
}

async fn watch(config: Config, url: Option<String>) -> Result<()> {
    let mut observer_config = config.observer;
    if let Some(url) = url {
        observer_config.url = url;
    }
    println!("watching {}", observer_config.url);
    let mut observer = spawn_observer(observer_config);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = observer.recv() => {
                let Some(event) = event else { break };
                match event {
                    ObserverEvent::Connected => println!("connected"),
                    ObserverEvent::Disconnected { reason } => println!("disconnected: {reason}"),
                    ObserverEvent::Message(message) => print_message(&message),
                }
            }
        }
    }
    observer.shutdown().await;
    Ok(())
}

fn print_message(message: &SyncMessage) {
    match message {
        SyncMessage::Snapshot {
            tree,
            changed_node_ids,
        } => match changed_node_ids {
            Some(ids) => println!("snapshot: {} nodes, changed {ids:?}", tree.node_count()),
            None => println!("snapshot: {} nodes", tree.node_count()),
        },
        SyncMessage::RecordingStatus(status) if status.is_recording => println!(
            "recording: {} entries, {}ms",
            status.timeline_length,
            status.duration.unwrap_or_default()
        ),
        SyncMessage::RecordingStopped { recording } => {
            println!("recording stopped: {} entries", recording.timeline.len())
        }
        SyncMessage::Error { message } => println!("error: {message}"),
        other => println!("{}", other.kind()),
    }
}
