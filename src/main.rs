use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use ts_relay::{playlist, RelayServer, ServerConfig};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "TS_RELAY_CONFIG", default_value = "config.yml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the relay server (default)
    Serve,
    /// Point every URL of a playlist at this relay
    RewritePlaylist {
        #[arg(short, long, default_value = playlist::DEFAULT_INPUT)]
        input: PathBuf,
        #[arg(short, long, default_value = playlist::DEFAULT_OUTPUT)]
        output: PathBuf,
        /// Stream URL prefix (defaults to the configured bind address)
        #[arg(short, long)]
        prefix: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ts_relay=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = ServerConfig::load(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let server = RelayServer::new(config)?;
            server.run_until(shutdown_signal()).await?;
        }
        Command::RewritePlaylist {
            input,
            output,
            prefix,
        } => {
            let prefix = prefix.unwrap_or_else(|| {
                playlist::stream_prefix(
                    &config.bind_addr.ip().to_string(),
                    config.bind_addr.port(),
                )
            });
            playlist::rewrite_file(&input, &output, &prefix).await?;
            println!("Rewritten playlist written to: {}", output.display());
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
