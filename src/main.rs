// relaychat - length-prefixed TCP chat relay: server and interactive client.

use std::net::SocketAddr;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

use relaychat::{ChatClient, ChatServer, Config};

/// Global allocator configured per M-MIMALLOC-APPS guideline.
/// mimalloc provides better multi-threaded performance than the system allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Log filter env var (`env_logger` syntax, e.g. `relaychat=debug`).
const LOG_ENV: &str = "RELAYCHAT_LOG";
/// Optional log file; logs go to stderr when unset.
const LOG_FILE_ENV: &str = "RELAYCHAT_LOG_FILE";

// CLI
#[derive(Parser)]
#[command(name = "relaychat")]
#[command(version)]
#[command(about = "Length-prefixed TCP chat relay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a chat server; each port hosts its own room
    Server {
        /// Ports to listen on
        #[arg(required = true)]
        ports: Vec<u16>,
    },
    /// Connect to a server, send stdin lines and print broadcasts
    Client {
        /// Server host name or address
        host: String,
        /// Server port
        port: u16,
    },
}

fn init_logging(default_filter: &str) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::new().filter_or(LOG_ENV, default_filter));
    builder.format_timestamp_secs();

    if let Ok(path) = std::env::var(LOG_FILE_ENV) {
        match std::fs::File::create(&path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!("Cannot open log file {path}: {e}; logging to stderr"),
        }
    }

    builder.init();
}

async fn run_server(ports: Vec<u16>) -> Result<()> {
    let config = Config::load()?;
    let addrs: Vec<SocketAddr> = ports
        .into_iter()
        .map(|port| SocketAddr::new(config.bind_addr, port))
        .collect();

    let server = ChatServer::bind(&addrs, &config).await?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => log::info!("Received Ctrl-C, shutting down"),
            Err(e) => log::error!("Failed to listen for Ctrl-C: {e}"),
        }
        signal_token.cancel();
    });

    server.run(shutdown).await
}

async fn run_client(host: String, port: u16) -> Result<()> {
    let client = ChatClient::connect(format!("{host}:{port}")).await?;
    let stdin = BufReader::new(tokio::io::stdin());
    client.run(stdin, tokio::io::stdout()).await
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Server { ports } => {
            init_logging("info");
            run_server(ports).await
        }
        Commands::Client { host, port } => {
            init_logging("warn");
            let code = match run_client(host, port).await {
                Ok(()) => 0,
                Err(e) => {
                    eprintln!("{e:#}");
                    1
                }
            };
            // Tokio's stdin reader blocks a thread that cannot be cancelled;
            // exit here instead of waiting on it during runtime shutdown.
            std::process::exit(code);
        }
    }
}
