use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use airq_predictor::{pipeline, server, Gateway, ServiceContext, Settings};

#[derive(Parser, Debug)]
#[command(name = "airq")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train and serve the Beijing air quality classifier", long_about = None)]
struct Cli {
    /// TOML settings file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Label a raw multi-site export and write the training dataset
    Prepare {
        /// Raw CSV (defaults to paths.raw_dataset)
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Output CSV (defaults to paths.dataset)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Fit the scaler and classifier and write both artifacts
    Train {
        /// Labeled CSV (defaults to paths.dataset)
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Artifact directory (defaults to paths.artifact_dir)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Score the saved artifacts on the held-out partition
    Evaluate,
    /// Run the HTTP prediction service
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut settings =
        Settings::load(cli.config.as_deref()).context("failed to load settings")?;

    match cli.command {
        Command::Prepare { input, output } => {
            let input = input.unwrap_or_else(|| settings.paths.raw_dataset.clone());
            let output = output.unwrap_or_else(|| settings.paths.dataset.clone());
            let report = pipeline::prepare(&input, &output, &settings.gray_zone)
                .context("failed to prepare dataset")?;
            info!(
                "read {} rows, {} incomplete, wrote {}",
                report.rows_read, report.incomplete, report.written
            );
        }
        Command::Train { input, output } => {
            if let Some(input) = input {
                settings.paths.dataset = input;
            }
            if let Some(output) = output {
                settings.paths.artifact_dir = output;
            }
            info!("training from {}", settings.paths.dataset.display());
            // Fitting is CPU bound and owns its own thread pool.
            let report = tokio::task::spawn_blocking(move || pipeline::train(&settings))
                .await
                .context("training task panicked")?
                .context("training failed")?;
            println!("{}", report.evaluation);
            info!(
                "trained on {} rows ({} after balancing), tested on {}, run {}",
                report.train_rows, report.balanced_rows, report.test_rows, report.run_tag
            );
        }
        Command::Evaluate => {
            let report = pipeline::evaluate(&settings).context("evaluation failed")?;
            println!("accuracy: {:.4}", report.accuracy);
            println!("{report}");
        }
        Command::Serve { host, port } => {
            if let Some(host) = host {
                settings.server.host = host;
            }
            if let Some(port) = port {
                settings.server.port = port;
            }
            serve(settings).await?;
        }
    }
    Ok(())
}

async fn serve(settings: Settings) -> Result<()> {
    info!("artifacts: {}", settings.paths.artifact_dir.display());
    info!("dataset: {}", settings.paths.dataset.display());
    let ctx = ServiceContext::load(&settings).context("failed to load model artifacts")?;
    if !ctx.is_ready() {
        info!("serving without a model; /predict will report unavailable");
    }

    let app = server::router(Gateway::new(Arc::new(ctx)));
    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("invalid listen address")?;
    info!("listening on {}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server error")?;
    Ok(())
}
