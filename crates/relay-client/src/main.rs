//! Relay client binary.
//!
//! Reads lines from stdin and sends them to the relay; prints everything the
//! relay sends. Logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! relay-client --name alice
//! relay-client --server 192.168.1.20:5000 --name bob
//! ```

use clap::Parser;
use relay_client::{InboundEvent, line};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Line relay terminal client
#[derive(Parser, Debug)]
#[command(name = "relay-client")]
#[command(about = "Terminal client for the chat line relay")]
#[command(version)]
struct Args {
    /// Relay address
    #[arg(short, long, default_value = "127.0.0.1:5000")]
    server: String,

    /// Display name
    #[arg(short, long)]
    name: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mut client = relay_client::connect(&args.server, &args.name).await?;
    tracing::info!("Connected to {} as {}", args.server, client.display_name());

    let mut stdout = tokio::io::stdout();
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            typed = input.next_line() => match typed? {
                Some(text) if text.is_empty() => {},
                Some(text) => {
                    client.send_line(&text).await?;
                    show(&mut stdout, &line::local_echo(&text)).await?;
                },
                None => break,
            },
            event = client.recv() => match event {
                Some(InboundEvent::Line(text)) => show(&mut stdout, &text).await?,
                Some(InboundEvent::Closed) | None => {
                    show(&mut stdout, "[server] Connection closed by server.").await?;
                    break;
                },
                Some(InboundEvent::Failed(reason)) => {
                    tracing::warn!("Connection lost: {}", reason);
                    show(&mut stdout, "[server] Connection closed.").await?;
                    break;
                },
            },
        }
    }

    Ok(())
}

/// Print one line and flush.
async fn show(stdout: &mut Stdout, text: &str) -> std::io::Result<()> {
    stdout.write_all(text.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}
