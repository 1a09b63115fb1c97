use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hive_config::{ConfigLoader, HiveConfig, LogFormat};
use hive_kernel::{DispatchingFactory, Kernel};
use hive_kv::EtcdStore;
use hive_server::{ApiClient, HttpHealthCheck};

mod cli;
mod echo;

use cli::{Cli, Commands, ConfigCommands, JobCommands};
use echo::EchoFactory;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => serve(config).await,
        Commands::Job { command } => job(command).await,
        Commands::Health { url } => health(url).await,
        Commands::Config {
            command: ConfigCommands::Generate,
        } => {
            print!("{}", HiveConfig::generate_sample());
            Ok(())
        }
    }
}

fn init_tracing(config: &HiveConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_filter_str()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.logging.format {
        LogFormat::Text => builder.init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let config = ConfigLoader::new()
        .load(config_path.as_ref())
        .context("Cannot load configuration")?;
    init_tracing(&config);

    let kv = EtcdStore::connect(&config.kv)
        .await
        .context("Cannot connect to the KV store")?;

    let mut factory = DispatchingFactory::new("root");
    factory.register(Arc::new(EchoFactory))?;

    let listen_addr = config.server.listen_addr();
    let mut kernel = Kernel::builder(config, Arc::new(kv), Arc::new(factory))
        .health_check(Arc::new(HttpHealthCheck::new()))
        .build()?;
    kernel.start().await?;

    let registry = kernel.registry();
    tokio::select! {
        result = hive_server::serve(&listen_addr, registry) => {
            result.context("API server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    kernel.stop().await;
    Ok(())
}

async fn job(command: JobCommands) -> Result<()> {
    match command {
        JobCommands::Submit { url, data, file } => {
            let payload = match (data, file) {
                (Some(data), _) => data.into_bytes(),
                (None, Some(path)) => std::fs::read(&path)
                    .with_context(|| format!("Cannot read payload file {}", path.display()))?,
                (None, None) => anyhow::bail!("Provide a payload with --data or --file"),
            };

            let job = ApiClient::new(url).submit_job(payload).await?;
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        JobCommands::Remove { url, id } => {
            ApiClient::new(url).remove_job(&id).await?;
            println!("Removed job {}", id);
        }
        JobCommands::List { url } => {
            let jobs = ApiClient::new(url).list_jobs().await?;
            for job in &jobs {
                println!("{}  {}", job.id, job.payload_str());
            }
            if jobs.is_empty() {
                println!("No jobs stored");
            }
        }
    }
    Ok(())
}

async fn health(url: String) -> Result<()> {
    if ApiClient::new(url.clone()).health().await {
        println!("{}: OK", url);
        Ok(())
    } else {
        anyhow::bail!("{}: unreachable", url)
    }
}
