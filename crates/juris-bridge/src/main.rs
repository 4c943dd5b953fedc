//! juris - legal-study chat relay

use anyhow::Context;
use clap::{Parser, Subcommand};
use juris_ai::{ChatMode, FileAttachment, ResponseLevel};
use juris_bridge::config::{self, Config};
use juris_bridge::server::{AppState, BridgeServer};
use juris_client::{ChatSession, ClientEvent, StreamHandle, StreamOutcome};
use juris_document::{Node, render};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing_subscriber::EnvFilter;

/// juris - streaming relay for a legal-study assistant
#[derive(Parser, Debug)]
#[command(name = "juris")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (default: ~/.config/juris/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP bridge
    Serve {
        /// Listen address (overrides config)
        #[arg(short, long)]
        listen: Option<String>,
    },
    /// Ask one question through a running bridge and stream the answer
    Ask {
        prompt: String,
        /// chat, study, lesson, analysis, recommendation, simulation
        #[arg(short, long, default_value = "chat")]
        mode: String,
        /// basic, complete, deep
        #[arg(short, long)]
        level: Option<String>,
        /// Bridge chat endpoint (overrides config)
        #[arg(short, long)]
        endpoint: Option<String>,
        /// Attach a file
        #[arg(short, long)]
        file: Vec<PathBuf>,
    },
    /// Write an example config file
    InitConfig,
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("info,juris=debug,juris_ai=debug,juris_client=debug,juris_bridge=debug,tower_http=debug")
        } else {
            EnvFilter::new("warn,juris_bridge=info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.command {
        Command::InitConfig => {
            let path = Config::init(args.config.as_deref())?;
            println!("Config file at: {}", path.display());
            println!("\nExample config:\n{}", config::example_config());
            Ok(())
        }
        Command::Serve { listen } => {
            let config = Config::load(args.config.as_deref())?;
            let listen_addr = listen.unwrap_or_else(|| config.listen_addr.clone());
            let state = AppState::from_config(&config)?;
            BridgeServer::new(listen_addr, state).serve().await?;
            Ok(())
        }
        Command::Ask {
            prompt,
            mode,
            level,
            endpoint,
            file,
        } => {
            let config = Config::load(args.config.as_deref())?;
            let mut client = config.client_config();
            if let Some(endpoint) = endpoint {
                client.endpoint = endpoint;
            }
            if let Some(level) = level {
                client.level = ResponseLevel::parse(&level)
                    .with_context(|| format!("unknown response level: {level}"))?;
            }
            let files = file
                .iter()
                .map(|path| read_attachment(path))
                .collect::<anyhow::Result<Vec<_>>>()?;

            ask(ChatSession::new(client, ChatMode::parse(&mode)), &prompt, files).await
        }
    }
}

fn read_attachment(path: &Path) -> anyhow::Result<FileAttachment> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let mime = match path.extension().and_then(|e| e.to_str()).map(str::to_lowercase).as_deref() {
        Some("pdf") => "application/pdf",
        Some("txt") | Some("md") => "text/plain",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(FileAttachment::from_bytes(&bytes, mime, name))
}

async fn ask(mut session: ChatSession, prompt: &str, files: Vec<FileAttachment>) -> anyhow::Result<()> {
    let receiver = session.subscribe();
    let handle = StreamHandle::new();

    // Ctrl+C aborts the request; the partial answer is kept if long enough
    let abort = handle.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort.abort();
        }
    });

    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        print_events(receiver, &mut stdout).await;
    });

    let result = session.send_message(prompt, files, &handle).await;
    ctrl_c.abort();
    drop(session);
    let _ = printer.await;

    match result? {
        StreamOutcome::Completed(message) | StreamOutcome::Partial { message, .. } => {
            println!();
            print_widgets(&message.content);
            if let Some(metrics) = message.metrics {
                println!(
                    "\n[{} palavras | {} min de leitura | {} citações | {} exemplos]",
                    metrics.word_count,
                    metrics.reading_time_minutes,
                    metrics.citation_count,
                    metrics.example_count
                );
                if !metrics.topics.is_empty() {
                    println!("[Tópicos: {}]", metrics.topics.join(", "));
                }
            }
            Ok(())
        }
        StreamOutcome::Discarded { cause } => anyhow::bail!(cause.message()),
    }
}

/// Print streaming text as it arrives
async fn print_events<W: Write>(mut receiver: broadcast::Receiver<ClientEvent>, out: &mut W) {
    let mut lagged = false;
    loop {
        let event = match receiver.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                // fragments were lost, reprint the whole answer at the end
                tracing::debug!(skipped, "printer fell behind");
                lagged = true;
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        match event {
            ClientEvent::MessageUpdate { delta, .. } => {
                let _ = write!(out, "{delta}");
                let _ = out.flush();
            }
            ClientEvent::Warning { message, .. } => eprintln!("\n[{message}]"),
            ClientEvent::Error { message } => eprintln!("\nError: {message}"),
            ClientEvent::MessageEnd { message } if lagged => {
                let _ = write!(out, "\n\n{}", message.content);
                lagged = false;
            }
            ClientEvent::MessageEnd { .. } | ClientEvent::MessageStart { .. } => {}
        }
    }
}

/// Summarize the widgets found in the finished answer
fn print_widgets(content: &str) {
    for node in render(content, false) {
        if let Node::Widget(widget) = node {
            match widget.title {
                Some(title) => println!("[{}: {} ({} itens)]", widget.kind, title, widget.payload.entry_count()),
                None => println!("[{} ({} itens)]", widget.kind, widget.payload.entry_count()),
            }
        }
    }
}
