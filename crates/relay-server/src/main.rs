//! Relay server binary.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default port with default limits
//! relay-server
//!
//! # Local only, five clients, no welcome banner
//! relay-server --bind 127.0.0.1:5000 --max-clients 5 --no-welcome
//! ```

use clap::Parser;
use relay_server::{DEFAULT_BIND_ADDRESS, RelayConfig, Server, ServerRuntimeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Line relay server
#[derive(Parser, Debug)]
#[command(name = "relay-server")]
#[command(about = "Plain-text chat line relay")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = DEFAULT_BIND_ADDRESS)]
    bind: String,

    /// Maximum concurrent connections, joined or not
    #[arg(long, default_value_t = relay_core::DEFAULT_MAX_CLIENTS)]
    max_clients: usize,

    /// Longest accepted line in bytes, terminator excluded
    #[arg(long, default_value_t = relay_core::DEFAULT_MAX_LINE_LEN)]
    max_line_len: usize,

    /// Display names are truncated to this many bytes
    #[arg(long, default_value_t = relay_core::DEFAULT_MAX_NAME_LEN)]
    max_name_len: usize,

    /// Banner sent to a client after it joins
    #[arg(long, default_value = relay_core::DEFAULT_WELCOME_BANNER, conflicts_with = "no_welcome")]
    welcome: String,

    /// Do not send a welcome banner
    #[arg(long)]
    no_welcome: bool,

    /// Do not announce departures to remaining members
    #[arg(long)]
    no_departures: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Relay server starting");

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        driver: RelayConfig {
            max_clients: args.max_clients,
            max_line_len: args.max_line_len,
            max_name_len: args.max_name_len,
            welcome_banner: (!args.no_welcome).then_some(args.welcome),
            announce_departures: !args.no_departures,
        },
        ..Default::default()
    };

    let server = Server::bind(config)?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    server.run()?;

    Ok(())
}
