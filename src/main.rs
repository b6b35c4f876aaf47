//! stompwire - STOMP command-line client
//!
//! Subscribes to destinations and prints delivered messages, or sends a
//! single message.

mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use config::Config;
use serde::Serialize;
use std::path::PathBuf;
use stompwire_client::{channel_handler, ClientError, Session};
use stompwire_protocol::Frame;
use tokio::sync::{broadcast, mpsc};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stompwire")]
#[command(about = "Command-line client for STOMP brokers")]
#[command(version)]
struct Cli {
    /// YAML config file
    #[arg(short, long, env = "STOMPWIRE_CONFIG")]
    config: Option<PathBuf>,

    /// Broker host
    #[arg(long, env = "STOMPWIRE_HOST")]
    host: Option<String>,

    /// Broker port
    #[arg(short, long, env = "STOMPWIRE_PORT")]
    port: Option<u16>,

    /// Login
    #[arg(short, long, env = "STOMPWIRE_LOGIN")]
    login: Option<String>,

    /// Password
    #[arg(long, env = "STOMPWIRE_PASSWORD")]
    password: Option<String>,

    /// Prefix joining destination names to wire destinations
    #[arg(long, env = "STOMPWIRE_PREFIX")]
    prefix: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Subscribe to destinations and print messages until Ctrl+C
    Listen {
        /// Destination names
        #[arg(required = true)]
        destinations: Vec<String>,

        /// Print one JSON object per message
        #[arg(long)]
        json: bool,
    },

    /// Send one message
    Send {
        /// Destination name
        destination: String,

        /// Message body (or @file to read from file)
        body: String,

        /// Content type header
        #[arg(long)]
        content_type: Option<String>,
    },
}

/// A delivered message as printed with `--json`.
#[derive(Serialize)]
struct PrintedMessage<'a> {
    destination: Option<&'a str>,
    headers: &'a [(String, String)],
    body: String,
}

impl<'a> PrintedMessage<'a> {
    fn from_frame(frame: &'a Frame) -> Self {
        Self {
            destination: frame.header("destination"),
            headers: &frame.headers,
            body: String::from_utf8_lossy(frame.body_bytes()).into_owned(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.broker.host = host;
    }
    if let Some(port) = cli.port {
        config.broker.port = port;
    }
    if let Some(login) = cli.login {
        config.broker.login = login;
    }
    if let Some(password) = cli.password {
        config.broker.password = password;
    }
    if let Some(prefix) = cli.prefix {
        config.broker.destination_prefix = prefix;
    }

    tracing::debug!(
        "Connecting to {}:{} as {:?}",
        config.broker.host,
        config.broker.port,
        config.broker.login
    );
    let session = Session::connect(config.to_connection_config())
        .await
        .map_err(|e| {
            eprintln!("{}: {}", "Connection failed".red(), e);
            e
        })?;

    let result = match cli.command {
        Commands::Listen { destinations, json } => listen(&session, &destinations, json).await,
        Commands::Send {
            destination,
            body,
            content_type,
        } => send(&session, &destination, &body, content_type.as_deref()).await,
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red(), e);
        std::process::exit(1);
    }
    Ok(())
}

async fn listen(session: &Session, destinations: &[String], json: bool) -> Result<(), ClientError> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut errors = session.subscribe_errors();

    for destination in destinations {
        let id = session.subscribe(destination, channel_handler(tx.clone())).await?;
        eprintln!(
            "{} {} (id: {})",
            "Subscribed".green(),
            destination.cyan(),
            id
        );
    }
    eprintln!("{}", "Press Ctrl+C to stop...".dimmed());

    loop {
        tokio::select! {
            Some(frame) = rx.recv() => print_message(&frame, json),
            error = errors.recv() => match error {
                Ok(frame) => eprintln!(
                    "{}: {}",
                    "Broker error".red(),
                    frame.header("message").unwrap_or("<no message>")
                ),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    eprintln!("{}: lagged {} errors", "Warning".yellow(), n);
                }
                Err(broadcast::error::RecvError::Closed) => {}
            },
            _ = session.closed() => {
                eprintln!("{}", "Connection closed".red());
                return Err(ClientError::ConnectionClosed);
            }
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\n{}", "Disconnecting...".dimmed());
                break;
            }
        }
    }

    session.disconnect().await
}

async fn send(
    session: &Session,
    destination: &str,
    body: &str,
    content_type: Option<&str>,
) -> Result<(), ClientError> {
    let body = match body.strip_prefix('@') {
        Some(path) => std::fs::read(path)?,
        None => body.as_bytes().to_vec(),
    };
    let len = body.len();

    session.send(destination, body, content_type).await?;
    eprintln!(
        "{} {} bytes to {}",
        "Sent".green(),
        len,
        destination.cyan()
    );

    session.disconnect().await
}

fn print_message(frame: &Frame, json: bool) {
    if json {
        match serde_json::to_string(&PrintedMessage::from_frame(frame)) {
            Ok(line) => println!("{}", line),
            Err(e) => eprintln!("{}: {}", "Warning".yellow(), e),
        }
        return;
    }

    println!(
        "{} {}",
        frame.header("destination").unwrap_or("?").cyan(),
        String::from_utf8_lossy(frame.body_bytes())
    );
}
