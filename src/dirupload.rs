use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

use dirupload::config::Config;
use dirupload::s3::{MemoryStore, ObjectStore, S3Client};
use dirupload::upload::Dispatcher;

#[derive(Parser, Debug)]
#[command(
    name = "dirupload",
    version = env!("CARGO_PKG_VERSION"),
    about = "Upload a whole directory tree to an S3-compatible object store",
    long_about = "Recursively uploads every regular file under a directory to an S3-compatible bucket \
                  (AWS S3, Wasabi, MinIO, R2, ...) using a fixed pool of concurrent workers. \
                  Object keys mirror the paths relative to the root. Configure via .env file.",
    after_help = "Examples:\n  \
                  dirupload                               # Upload UPLOAD_DIR from .env\n  \
                  dirupload push --root ./public -c 10    # Upload ./public with 10 workers\n  \
                  dirupload push --dry-run                # Run everything except the network calls\n  \
                  dirupload exists img/logo.png           # Check if an object exists\n  \
                  dirupload get img/logo.png -o logo.png  # Download an object\n  \
                  dirupload url img/logo.png              # Print the public URL\n\n\
                  Configuration (.env):\n  \
                  UPLOAD_DIR=./public\n  \
                  CONCURRENCY=5\n  \
                  S3_ENDPOINT=https://s3.wasabisys.com\n  \
                  S3_REGION=us-east-1\n  \
                  S3_BUCKET=my-bucket\n  \
                  S3_ACCESS_KEY=...\n  \
                  S3_SECRET_KEY=...\n  \
                  PUBLIC_URL_BASE=https://cdn.example.com   # optional"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload the root directory (default)
    Push(PushArgs),

    /// Print the public URL of an object
    Url {
        /// Object key
        key: String,
    },

    /// Check whether an object exists (exit status 1 when absent)
    Exists {
        /// Object key
        key: String,
    },

    /// Download an object
    Get {
        /// Object key
        key: String,

        /// Output file (defaults to stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Default)]
struct PushArgs {
    /// Directory to upload (overrides UPLOAD_DIR)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Number of concurrent workers (overrides CONCURRENCY)
    #[arg(long, short = 'c', allow_negative_numbers = true)]
    concurrency: Option<i64>,

    /// Run the whole pipeline against an in-memory store
    #[arg(long)]
    dry_run: bool,

    /// Print the public URL of every uploaded object
    #[arg(long)]
    print_urls: bool,

    /// Disable the progress bar
    #[arg(long)]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file early to get LOG_LEVEL
    dotenv::dotenv().ok();

    let log_level = std::env::var("LOG_LEVEL")
        .ok()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(&log_level))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        None => push(config, PushArgs::default()).await,
        Some(Command::Push(args)) => push(config, args).await,
        Some(Command::Url { key }) => {
            let store = S3Client::new(config.storage).await;
            println!("{}", store.public_url(&key));
            Ok(ExitCode::SUCCESS)
        }
        Some(Command::Exists { key }) => {
            let store = S3Client::new(config.storage).await;
            let found = store
                .exists(&key)
                .await
                .with_context(|| format!("Failed to check {}", key))?;
            println!("{}", found);
            Ok(if found {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Some(Command::Get { key, output }) => {
            let store = S3Client::new(config.storage).await;
            download(&store, &key, output).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn push(mut config: Config, args: PushArgs) -> Result<ExitCode> {
    if let Some(root) = args.root {
        config.upload_dir = Some(root);
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = usize::try_from(concurrency).unwrap_or(0).max(1);
    }

    let root = config.root_dir()?;

    info!("dirupload v{}", env!("CARGO_PKG_VERSION"));
    info!("Concurrent workers: {}", config.concurrency);

    for warning in config.storage.warnings() {
        warn!("{}", warning);
    }

    let store: Arc<dyn ObjectStore> = if args.dry_run {
        println!(
            "{}",
            style("🔍 DRY RUN MODE - No files will be uploaded")
                .yellow()
                .bold()
        );
        Arc::new(MemoryStore::with_storage(config.storage.clone()))
    } else {
        Arc::new(S3Client::new(config.storage.clone()).await)
    };

    println!(
        "{}",
        style(format!(
            "📦 Target: s3://{} ({} workers)",
            config.storage.bucket(),
            config.concurrency
        ))
        .cyan()
        .bold()
    );

    let progress = if args.no_progress {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {elapsed_precise}")?
                .progress_chars("#>-"),
        );
        pb
    };

    let dispatcher = Dispatcher::new(store, root, config.concurrency)
        .with_progress(progress)
        .with_public_urls(args.print_urls);

    let report = dispatcher.upload_tree().await.context("Upload aborted")?;
    report.print_summary();

    Ok(report.exit_code())
}

async fn download(store: &S3Client, key: &str, output: Option<PathBuf>) -> Result<()> {
    let body = store
        .get(key)
        .await
        .with_context(|| format!("Failed to download {}", key))?;
    let mut reader = Box::pin(body.into_async_read());

    match output {
        Some(path) => {
            let mut file = tokio::fs::File::create(&path)
                .await
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let bytes = tokio::io::copy(&mut reader, &mut file).await?;
            info!("Saved {} ({} bytes) to {}", key, bytes, path.display());
        }
        None => {
            let mut stdout = tokio::io::stdout();
            tokio::io::copy(&mut reader, &mut stdout).await?;
        }
    }

    Ok(())
}
