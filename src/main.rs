use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use url::Url;

use precache::cache::SqliteStorage;
use precache::event::EventHandler;
use precache::network::HttpNetwork;
use precache::request::AssetRequest;
use precache::router::Routing;
use precache::{Config, ServiceWorker};

#[derive(Parser, Debug)]
#[command(name = "precache")]
#[command(about = "Precache and serve a web build's static assets offline")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/precache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Cache database (default: $XDG_DATA_HOME/precache/cache.db)
  #[arg(long)]
  db: Option<PathBuf>,

  /// Write logs to this file instead of stderr
  #[arg(long)]
  log_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Stage the application shell
  Install,
  /// Migrate the content cache to the current manifest
  Activate,
  /// Install, then activate
  Deploy,
  /// Route one request through the worker
  Fetch {
    /// Absolute URL or path relative to the origin
    url: String,
    /// Write the response body here
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// Download every resource missing from the cache
  Prefetch,
  /// Deliver a raw message (e.g. skipWaiting, downloadOffline)
  Message { message: String },
  /// Show manifest and cache state
  Status,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_logging(args.log_file.as_deref())?;

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let worker_config = config.worker_config()?;

  let storage = match &args.db {
    Some(path) => SqliteStorage::open_at(path)?,
    None => SqliteStorage::open_default()?,
  };
  let network = HttpNetwork::new()?;
  let worker = Arc::new(ServiceWorker::new(
    worker_config,
    Arc::new(storage),
    Arc::new(network),
  ));
  let events = EventHandler::new(worker.clone());

  match args.command {
    Command::Install => {
      let staged = events.install().await?;
      println!("staged {} shell resources", staged);
    }
    Command::Activate => {
      let outcome = events.activate().await?;
      println!("{:?}", outcome);
    }
    Command::Deploy => {
      let staged = events.install().await?;
      println!("staged {} shell resources", staged);
      let outcome = events.activate().await?;
      println!("{:?}", outcome);
    }
    Command::Fetch { url, output } => {
      let url = resolve_url(worker.config().resolver.origin(), &url)?;
      match events.fetch(AssetRequest::get(url.clone())).await? {
        Routing::PassThrough => println!("{} is not a precached resource", url),
        Routing::Respond(result) => {
          println!(
            "{} {} ({:?}, {} bytes)",
            result.data.status,
            url,
            result.source,
            result.data.body.len()
          );
          if let Some(path) = output {
            std::fs::write(&path, &result.data.body)
              .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?;
          }
        }
      }
    }
    Command::Prefetch => {
      let outcome = worker.message("downloadOffline").await?;
      println!("{:?}", outcome);
    }
    Command::Message { message } => {
      let outcome = worker.message(&message).await?;
      println!("{:?}", outcome);
    }
    Command::Status => {
      let status = worker.status().await?;
      println!("manifest  {} ({} resources)", status.manifest_digest, status.resources);
      println!(
        "snapshot  {}",
        status.snapshot_digest.as_deref().unwrap_or("none")
      );
      println!("stores    {}", status.stores.join(", "));
      println!("cached    {}", status.cached);
      println!("missing   {}", status.missing);
    }
  }

  events.shutdown().await?;
  Ok(())
}

fn init_logging(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

  let Some(path) = log_file else {
    tracing_subscriber::fmt()
      .with_env_filter(filter)
      .with_writer(std::io::stderr)
      .init();
    return Ok(None);
  };

  let dir = path
    .parent()
    .filter(|p| !p.as_os_str().is_empty())
    .unwrap_or_else(|| Path::new("."));
  let name = path
    .file_name()
    .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;
  let appender = tracing_appender::rolling::never(dir, name);
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(Some(guard))
}

fn resolve_url(origin: &Url, raw: &str) -> Result<Url> {
  Url::parse(raw)
    .or_else(|_| origin.join(raw))
    .map_err(|e| eyre!("Invalid URL '{}': {}", raw, e))
}
