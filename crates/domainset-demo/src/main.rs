// # domainset-demo
//
// Thin demo binary for the domain-set cache.
//
// The demo is an integration layer only: it reads configuration from
// environment variables, wires up the filesystem storage driver, starts the
// engine, and answers queries until interrupted. All caching logic lives in
// domainset-core.
//
// ## Configuration
//
// - `DOMAINSET_DATA_DIR`: cache directory (default `./domainset-data`,
//   created if missing)
// - `DOMAINSET_DB`: database name (default `disposable`)
// - `DOMAINSET_URLS`: comma-separated source URLs (required)
// - `DOMAINSET_REFRESH_SECS`: refresh interval in seconds (default 86400)
// - `DOMAINSET_DISABLE_DOWNLOAD`: set to `1` to run from cache only
// - `DOMAINSET_QUERY`: comma-separated domains to check after startup
// - `RUST_LOG`: tracing filter (default `info`)
//
// ## Example
//
// ```bash
// export DOMAINSET_URLS=https://example.com/disposable-domains.txt
// export DOMAINSET_QUERY=10minutemail.com,gmail.com
//
// domainset-demo
// ```

use anyhow::{Context, Result};
use domainset_core::{DataSource, DomainSetEngine, EngineOptions, FsStorageDriver};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

struct Config {
    data_dir: String,
    db_name: String,
    urls: Vec<Url>,
    refresh_interval: Duration,
    disable_download: bool,
    queries: Vec<String>,
}

impl Config {
    fn from_env() -> Result<Self> {
        let urls = env::var("DOMAINSET_URLS")
            .context("DOMAINSET_URLS is required (comma-separated source URLs)")?;
        let urls = urls
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(|part| Url::parse(part.trim()).with_context(|| format!("invalid URL: {part}")))
            .collect::<Result<Vec<_>>>()?;

        let refresh_secs: u64 = env::var("DOMAINSET_REFRESH_SECS")
            .ok()
            .map(|raw| raw.parse())
            .transpose()
            .context("DOMAINSET_REFRESH_SECS must be an integer")?
            .unwrap_or(86_400);

        Ok(Self {
            data_dir: env::var("DOMAINSET_DATA_DIR")
                .unwrap_or_else(|_| "./domainset-data".to_string()),
            db_name: env::var("DOMAINSET_DB").unwrap_or_else(|_| "disposable".to_string()),
            urls,
            refresh_interval: Duration::from_secs(refresh_secs),
            disable_download: env::var("DOMAINSET_DISABLE_DOWNLOAD").as_deref() == Ok("1"),
            queries: env::var("DOMAINSET_QUERY")
                .map(|raw| {
                    raw.split(',')
                        .map(|domain| domain.trim().to_string())
                        .filter(|domain| !domain.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .with_context(|| format!("failed to create data directory {}", config.data_dir))?;
    let storage = Arc::new(
        FsStorageDriver::new(&config.data_dir)
            .await
            .context("failed to open storage driver")?,
    );

    info!(
        data_dir = %config.data_dir,
        db = %config.db_name,
        urls = config.urls.len(),
        "starting domainset demo"
    );

    let mut options = EngineOptions::new(storage).with_source(
        &config.db_name,
        DataSource::from_urls(config.urls.clone(), config.refresh_interval),
    );
    options.disable_download = config.disable_download;

    let engine = DomainSetEngine::new(options)
        .await
        .context("failed to initialize engine")?;

    info!(
        domains = engine.database_len(&config.db_name).unwrap_or(0),
        "engine ready"
    );

    for domain in &config.queries {
        match engine.has_domain(&config.db_name, domain) {
            Ok(hit) => info!(domain = %domain, listed = hit, "query"),
            Err(err) => warn!(domain = %domain, error = %err, "query failed"),
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");
    engine.close();

    Ok(())
}
