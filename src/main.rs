use std::path::PathBuf;

use clap::Parser;

use dragonfly::lifecycle::startup::{self, StartupOptions};

#[derive(Parser)]
#[command(name = "dragonfly")]
#[command(about = "HTTP key/value server with zero-downtime restarts", long_about = None)]
struct Cli {
    /// Configuration file (default: ./dragonfly.toml, then /etc/dragonfly/dragonfly.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address: host:port, :port or unix:/path
    #[arg(short, long)]
    addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let options = StartupOptions {
        config: cli.config,
        address: cli.addr,
    };

    if let Err(e) = startup::run(options).await {
        tracing::error!(error = %e, pid = std::process::id(), "dragonfly failed");
        return Err(e.into());
    }
    Ok(())
}
