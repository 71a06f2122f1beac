//! Framebridge RPC - command-line host and client for the frame bridge.
//!
//! `serve` runs a host that answers bridge calls from peers connecting over
//! TCP; `call` connects to such a host and issues a single call.

mod allow_list;
mod client;
mod overrides_file;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "framebridge-rpc")]
#[command(about = "Host and client for origin-checked frame bridge calls")]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve bridge calls until interrupted
    Serve(server::ServeArgs),
    /// Issue one call and print its result
    Call(client::CallArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    match args.command {
        Command::Serve(serve_args) => {
            info!("Starting framebridge host as {}", serve_args.origin);
            let handle = server::start(&serve_args).await?;

            // Print port for the parent process to read (intentional stdout)
            println!("RPC_PORT={}", handle.port());
            info!("Bridge host running on {}", handle.addr());

            tokio::signal::ctrl_c().await?;
            info!("Shutdown signal received, exiting");
        }
        Command::Call(call_args) => {
            let value = client::run(&call_args).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }

    Ok(())
}
