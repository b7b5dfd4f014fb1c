mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, ClientCommand, Commands};

#[tokio::main]
async fn main() -> logcask::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            data_dir,
            bind,
            rotation_threshold,
            merge_interval_secs,
            config: _,
        } => {
            commands::serve::run_serve(data_dir, bind, rotation_threshold, merge_interval_secs)
                .await?;
        }

        Commands::Balance {
            bind,
            backends,
            timeout_secs,
            health_interval_secs,
        } => {
            commands::balance::run_balance(bind, backends, timeout_secs, health_interval_secs)
                .await?;
        }

        Commands::Client { addr, command } => match command {
            ClientCommand::Put { key, value } => {
                commands::client::put(&addr, key, value).await?;
            }

            ClientCommand::Get { key } => {
                commands::client::get(&addr, key).await?;
            }
        },
    }

    Ok(())
}
