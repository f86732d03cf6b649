use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use worker::{Config, Exporter, Redis, RunOptions, Worker, DEFAULT_CONFIG_PATH};

#[derive(Parser, Debug)]
#[command(name = "worker")]
#[command(about = "Rewrites pending posts through a text/image round-trip", long_about = None)]
struct Cli {
    /// Path to the TOML config
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Poll the pending queue
    Run {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,

        /// Commit posts without calling any model
        #[arg(long)]
        no_modify: bool,
    },

    /// Write committed posts to a JSON lines file
    Export {
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Could not listen for ctrl-c: {}", err);
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> worker::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "worker=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Run { once, no_modify } => {
            if no_modify {
                config.worker.modify = false;
            }
            let options = if once {
                RunOptions::once()
            } else {
                RunOptions::default()
            };

            info!(
                "Starting worker on {} (modify: {})",
                config.worker.pending_queue, config.worker.modify
            );
            let worker = Worker::from_config(&config).await?;
            let run = worker.run_until(options, shutdown_signal()).await;
            info!(
                "Stopped after {} cycles: {} ({} cycles failed)",
                run.cycles, run.totals, run.failed_cycles
            );
        }
        Commands::Export { output } => {
            let path = output.unwrap_or_else(|| config.export.path.clone());
            let redis = Redis::new(config.redis.clone()).await?;
            let exporter = Exporter::new(Arc::new(redis), &config.worker.posts_index);
            exporter.export_to_file(&path).await?;
        }
    }

    Ok(())
}
