use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use setforge_server::config;
use setforge_server::generation::providers::{self, TrackListProvider};
use setforge_server::generation::OrchestratorSettings;
use setforge_server::kv::{KvHandle, SqliteKvBackend};
use setforge_server::media::MediaCache;
use setforge_server::quota::QuotaLedger;
use setforge_server::resolver::{
    ArtCatalog, InvidiousMirror, ItunesCatalog, MirrorBackend, PaidSearch, PipedMirror,
    ResolutionService, YoutubeDataApi,
};
use setforge_server::server::{metrics, run_server, AppState};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    if path_buf.is_absolute() {
        return Ok(path_buf);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(path_buf))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Path of the SQLite key/value store backing the media cache and the
    /// quota ledger. Omit to run without persistence.
    #[clap(long, value_parser = parse_path)]
    pub kv_db_path: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = config::DEFAULT_PORT)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = config::DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,
}

impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            kv_db_path: args.kv_db_path.clone(),
            port: args.port,
            metrics_port: args.metrics_port,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  kv_db_path: {:?}", app_config.kv_db_path);
    info!("  port: {}", app_config.port);
    info!("  providers: {}", app_config.providers.len());

    metrics::init_metrics();

    let kv: KvHandle = match &app_config.kv_db_path {
        Some(path) => Some(Arc::new(SqliteKvBackend::new(path)?)),
        None => {
            warn!("No kv_db_path configured, running without cache or quota persistence");
            None
        }
    };

    let providers: Vec<Arc<dyn TrackListProvider>> = app_config
        .providers
        .iter()
        .map(providers::from_settings)
        .collect::<Result<_>>()?;
    if providers.is_empty() {
        warn!("No providers configured, generation requests will be rejected");
    }

    // One HTTP client for every resolution backend.
    let http_client = reqwest::Client::new();

    let mut mirrors: Vec<Arc<dyn MirrorBackend>> = Vec::new();
    for host in &app_config.mirrors.family_a_hosts {
        mirrors.push(Arc::new(InvidiousMirror::new(
            http_client.clone(),
            host.clone(),
        )));
    }
    for host in &app_config.mirrors.family_b_hosts {
        mirrors.push(Arc::new(PipedMirror::new(
            http_client.clone(),
            host.clone(),
        )));
    }
    info!("Free mirror pool: {} hosts", mirrors.len());

    let catalog: Option<Arc<dyn ArtCatalog>> = app_config.catalog.enabled.then(|| {
        Arc::new(ItunesCatalog::new(
            http_client.clone(),
            app_config.catalog.base_url.clone(),
        )) as _
    });

    let paid: Option<Arc<dyn PaidSearch>> = app_config.paid.api_key.as_ref().map(|key| {
        Arc::new(YoutubeDataApi::new(
            http_client.clone(),
            app_config.paid.base_url.clone(),
            key.clone(),
        )) as _
    });
    if paid.is_none() {
        info!("Paid search tier disabled (no API key)");
    }

    let ledger = QuotaLedger::new(kv.clone(), app_config.paid.daily_quota);
    let resolver = Arc::new(ResolutionService::new(
        MediaCache::new(kv),
        ledger.clone(),
        mirrors,
        catalog,
        paid,
        app_config.mirrors.timeout(),
        app_config.enrichment.concurrency,
    ));

    let state = AppState {
        resolver,
        providers,
        ledger,
        orchestrator: OrchestratorSettings {
            enrichment_batch_size: app_config.enrichment.batch_size,
            enrichment_timeout: Duration::from_secs(app_config.enrichment.timeout_secs),
            prefer_hd_artwork: app_config.enrichment.hd_artwork,
            ..Default::default()
        },
    };

    let shutdown_token = CancellationToken::new();
    info!("Ready to serve at port {}!", app_config.port);
    info!("Metrics available at port {}!", app_config.metrics_port);

    tokio::select! {
        result = run_server(
            state,
            app_config.port,
            app_config.metrics_port,
            shutdown_token.clone(),
        ) => {
            info!("HTTP server stopped: {:?}", result);
            result
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown");
            shutdown_token.cancel();
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        }
    }
}
