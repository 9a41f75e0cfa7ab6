mod cli;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wiremap=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Extract {
            file,
            function,
            refresh,
            format,
        } => {
            cli::extract(&cli.root, &file, function.as_deref(), refresh, format).await?;
        }
        Commands::Roots { file } => {
            cli::roots(&file)?;
        }
        Commands::Scan { path } => {
            cli::scan(&path)?;
        }
        Commands::List => {
            cli::list(&cli.root).await?;
        }
        Commands::Watch { path } => {
            cli::watch(&cli.root, &path).await?;
        }
    }

    Ok(())
}
