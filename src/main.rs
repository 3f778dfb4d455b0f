use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::Result;
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use pixcache::domain::{ConnectionStatus, ImageSlot};
use pixcache::infrastructure::image::ImageCache;
use pixcache::infrastructure::{
    BindOutcome, BindRequest, CliArgs, ConfigStore, HttpFetcher, ImageLoader, LoaderConfig,
    NetworkMonitor, ResultDispatcher, SampledDecoder, WorkerPool,
};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

fn init_logging(config: &LoaderConfig) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from(config.log_level.to_tracing_level()).into())
        .from_env_lossy();

    if let Some(log_path) = config.effective_log_path() {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_names(true);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<LoaderConfig> {
    let store = ConfigStore::new()?;
    let mut config = store.load_config(args.config.as_deref())?;
    config.merge_with_args(args);
    Ok(config)
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let config = load_config(&args)?;
    init_logging(&config)?;

    info!(version = pixcache::VERSION, "Starting {}", pixcache::NAME);

    let pool = Arc::new(WorkerPool::new(config.pool.to_worker_pool_config())?);

    let status = if args.offline {
        ConnectionStatus::Disconnected
    } else {
        ConnectionStatus::Connected
    };
    let monitor = Arc::new(NetworkMonitor::new(status));
    let fetcher = HttpFetcher::new(
        monitor,
        config.network.timeout(),
        &config.network.user_agent,
    )?;

    let cache = Arc::new(pool.block_on(ImageCache::open(&config.cache)));
    let (mut dispatcher, results) = ResultDispatcher::new();
    let loader = ImageLoader::new(
        cache,
        pool.clone(),
        Arc::new(fetcher),
        Arc::new(SampledDecoder::new()),
        results,
    );

    if args.clear {
        loader.clear_cache();
    }

    let slots: Vec<(String, Arc<ImageSlot>)> = args
        .uris
        .iter()
        .map(|uri| (uri.clone(), Arc::new(ImageSlot::new())))
        .collect();

    let mut queued = 0usize;
    for (uri, slot) in &slots {
        let request = BindRequest::new(uri.as_str()).with_size(args.width, args.height);
        if loader.bind_request(request, slot) == BindOutcome::Queued {
            queued += 1;
        }
    }

    for _ in 0..queued {
        if dispatcher.blocking_dispatch_next().is_none() {
            break;
        }
    }
    let stats = dispatcher.stats();
    info!(
        applied = stats.applied,
        stale = stats.stale,
        dropped = stats.dropped,
        "Delivered load results"
    );
    info!(stats = %loader.cache().memory().stats(), "Memory cache");

    for (uri, slot) in &slots {
        match slot.image() {
            Some(image) => println!(
                "{uri} -> {}x{} ({})",
                image.width(),
                image.height(),
                image.source
            ),
            None => println!("{uri} -> no image"),
        }
    }

    loader.flush_cache();
    loader.close_cache();
    drop(loader);
    drop(dispatcher);

    match Arc::try_unwrap(pool) {
        Ok(pool) => pool.shutdown(SHUTDOWN_TIMEOUT),
        Err(_) => warn!("Worker pool still shared at exit"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_uris_and_size() {
        let args = CliArgs::parse_from([
            "pixcache",
            "--width",
            "64",
            "--height",
            "48",
            "--offline",
            "https://example.com/a.png",
            "https://example.com/b.png",
        ]);

        assert_eq!(args.uris.len(), 2);
        assert_eq!((args.width, args.height), (64, 48));
        assert!(args.offline);
        assert!(!args.clear);
    }

    #[test]
    fn test_load_config_from_explicit_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("pixcache.toml");
        std::fs::write(&path, "[network]\ntimeout_secs = 5\n").unwrap();
        let args = CliArgs::parse_from([
            "pixcache",
            "--config",
            path.to_str().unwrap(),
            "--max-workers",
            "3",
        ]);

        let config = load_config(&args).unwrap();

        assert_eq!(config.network.timeout(), Duration::from_secs(5));
        assert_eq!(config.pool.max_size, Some(3));
    }
}
