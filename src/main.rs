mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use jobgrid::config::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server(args) => {
            let mut config = Config::load()?;
            if let Some(address) = args.address {
                config.server.bind_addr = address;
            }
            jobgrid::api::run(config).await?;
        }
    }

    Ok(())
}
