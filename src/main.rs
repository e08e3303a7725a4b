//! Peer certificate signer - approves and signs in-cluster peer certificate
//! requests addressed to a single signer name.

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use config::LogFormat;
use peer_cert_signer::{
    config, services, AppConfig, CaLoader, Dispatcher, FileStore, RequestWatcher,
    SignerController, StatusManager, WorkQueue,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        print_help();
        return Ok(());
    }

    if args.iter().any(|arg| arg == "--version" || arg == "-V") {
        println!("peer-cert-signer {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Load configuration first (before logging, so we know log format)
    let config = AppConfig::load().context("Failed to load configuration")?;

    if args.iter().any(|arg| arg == "--check-ca") {
        return check_ca(&config).await;
    }

    // The guard must be kept alive for the duration of the program
    // to ensure log messages are flushed to files
    let _log_guard = init_logging(&config);

    info!("peer-cert-signer {} starting up", env!("CARGO_PKG_VERSION"));
    info!("Signer name: {}", config.signer.name);

    let store = Arc::new(FileStore::new(&config.store.root_dir));
    store
        .ensure_layout()
        .await
        .with_context(|| format!("Failed to prepare store at {:?}", config.store.root_dir))?;
    info!("Using object store at {:?}", store.root());

    let health = Arc::new(StatusManager::new(config.status.status_file.clone()));
    let ca = CaLoader::new(
        store.clone(),
        &config.signer.ca_secret_namespace,
        &config.signer.ca_secret_name,
    );
    info!("CA material is read from secret {}", ca.location());

    let controller = Arc::new(
        SignerController::new(config.signer.name.clone(), store.clone(), ca, health)
            .with_validity(config.certificate_validity()),
    );

    let queue = Arc::new(WorkQueue::new(config.backoff()?));
    let watcher = RequestWatcher::new(store.clone(), queue.clone(), config.poll_interval());
    let dispatcher = Dispatcher::new(controller, queue, config.controller.workers);

    let shutdown = CancellationToken::new();
    let watcher_task = tokio::spawn(watcher.run(shutdown.clone()));
    let dispatcher_task = tokio::spawn(dispatcher.run(shutdown.clone()));

    wait_for_shutdown_signal().await;
    info!("Shutdown signal received");
    shutdown.cancel();

    if let Err(e) = watcher_task.await {
        warn!("Request watcher task failed: {}", e);
    }
    if let Err(e) = dispatcher_task.await {
        warn!("Dispatcher task failed: {}", e);
    }

    info!("peer-cert-signer stopped");
    Ok(())
}

/// Load and validate the configured CA, printing a short summary
async fn check_ca(config: &AppConfig) -> Result<()> {
    let store = Arc::new(FileStore::new(&config.store.root_dir));
    let loader = CaLoader::new(
        store,
        &config.signer.ca_secret_namespace,
        &config.signer.ca_secret_name,
    );

    let material = loader
        .load()
        .await
        .with_context(|| format!("Could not read CA secret {}", loader.location()))?;
    let certificate = services::pem::decode_certificate(&material.certificate)
        .context("Unable to decode CA certificate")?;
    let key = services::pem::decode_private_key(&material.key)
        .context("Unable to decode CA private key")?;
    let summary = services::issuance::check_ca_pair(&certificate, &key)
        .context("CA certificate and key are not usable for signing")?;

    println!("CA secret:   {}", loader.location());
    println!("Subject:     {}", summary.subject);
    println!("Serial:      {}", summary.serial);
    println!("Not before:  {}", summary.not_before.to_rfc3339());
    println!("Not after:   {}", summary.not_after.to_rfc3339());
    println!("SHA-256:     {}", summary.fingerprint);

    if summary.not_after < chrono::Utc::now() {
        anyhow::bail!("CA certificate expired at {}", summary.not_after.to_rfc3339());
    }
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

type BoxedLayer = Box<dyn tracing_subscriber::Layer<tracing_subscriber::Registry> + Send + Sync>;

/// Initialize the logging/tracing infrastructure
///
/// File output falls back to the console when the log directory is unusable.
fn init_logging(config: &AppConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use config::LogTarget;
    use tracing_subscriber::{prelude::*, EnvFilter};

    let log_config = &config.logging;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_config.level));

    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guard = None;

    if log_config.target != LogTarget::Console {
        match create_file_writer(log_config) {
            Ok((writer, file_guard)) => {
                layers.push(format_layer(&log_config.format, writer, false));
                guard = Some(file_guard);
            }
            Err(e) => eprintln!(
                "Warning: File logging unavailable ({}), logging to console",
                e
            ),
        }
    }
    if log_config.target != LogTarget::File || guard.is_none() {
        layers.push(format_layer(&log_config.format, std::io::stdout, true));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .init();
    guard
}

/// One formatting layer writing to `writer`
fn format_layer<W>(format: &LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> tracing_subscriber::fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    use tracing_subscriber::Layer;

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi);
    match format {
        LogFormat::Json => layer.json().with_target(true).boxed(),
        LogFormat::Compact => layer.compact().with_target(false).boxed(),
        LogFormat::Pretty => layer.with_target(true).boxed(),
    }
}

/// Create a non-blocking file writer with optional daily rotation
fn create_file_writer(
    log_config: &config::LoggingConfig,
) -> Result<(
    tracing_appender::non_blocking::NonBlocking,
    tracing_appender::non_blocking::WorkerGuard,
)> {
    use tracing_appender::rolling::{Builder, Rotation};

    std::fs::create_dir_all(&log_config.log_dir)
        .with_context(|| format!("Failed to create log directory {:?}", log_config.log_dir))?;

    let rotation = if log_config.daily_rotation {
        Rotation::DAILY
    } else {
        Rotation::NEVER
    };

    let mut builder = Builder::new()
        .rotation(rotation)
        .filename_prefix(&log_config.log_prefix);
    if log_config.max_log_files > 0 {
        builder = builder.max_log_files(log_config.max_log_files);
    }
    let file_appender = builder
        .build(&log_config.log_dir)
        .context("Failed to create log file appender")?;

    Ok(tracing_appender::non_blocking(file_appender))
}

/// Print help message
fn print_help() {
    println!(
        r#"peer-cert-signer {}

USAGE:
    peer-cert-signer [OPTIONS]

OPTIONS:
    -h, --help              Print this help message
    -V, --version           Print version information
    --check-ca              Load the configured CA secret, verify that the
                            certificate and key belong together, print the
                            CA subject and expiry, then exit

ENVIRONMENT:
    SIGNER_CONFIG               Path to configuration file (default: config.yaml)
    SIGNER_NAME                 Signer name handled by this controller
    SIGNER_CA_NAMESPACE         Namespace of the CA secret
    SIGNER_CA_NAME              Name of the CA secret
    SIGNER_STORE_ROOT           Root directory of the object store
    SIGNER_WORKERS              Number of reconcile workers
    SIGNER_POLL_INTERVAL_SECS   Seconds between store scans
    SIGNER_STATUS_FILE          File the component health is written to
    SIGNER_LOG_FORMAT           Log format (pretty, json, compact)
    RUST_LOG                    Log level filter (overrides config)
"#,
        env!("CARGO_PKG_VERSION")
    );
}
