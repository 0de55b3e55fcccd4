use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use discourse_mbox_archiver::archive::Archiver;
use discourse_mbox_archiver::config::Config;
use discourse_mbox_archiver::mbox::MboxSink;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    // Initialize logging
    init_tracing()?;

    info!("Starting discourse-mbox-archiver");

    // Load and validate configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(
        api_base = %config.api_base,
        period = config.top_period.as_str(),
        mbox = %config.mbox_path.display(),
        "Configuration loaded"
    );

    let mut sink = MboxSink::open(&config.mbox_path)
        .await
        .with_context(|| format!("Failed to open mbox: {}", config.mbox_path.display()))?;

    let archiver = Archiver::new(config).context("Failed to initialize archiver")?;

    let outcome = tokio::select! {
        result = archiver.run(&mut sink) => Some(result),
        () = shutdown_signal() => None,
    };

    let Some(result) = outcome else {
        warn!(
            path = %sink.path().display(),
            appended = sink.appended(),
            "Interrupted; mbox holds the messages written so far"
        );
        anyhow::bail!("interrupted");
    };

    let stats = result.context("Archive run failed")?;
    info!(
        path = %sink.path().display(),
        messages = stats.messages,
        topics = stats.topics,
        "Archive written"
    );

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,discourse_mbox_archiver=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
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
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
