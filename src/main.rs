use clap::Parser;
use tokio::net::TcpListener;

use filecast_server::config::{generate_config_template, Cli, Config};
use filecast_server::events::SubscriberRegistry;
use filecast_server::uploads::BlobStore;
use filecast_server::{db, routes, state};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Handle --generate-config: print template and exit
    if cli.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load(&cli)?;

    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("filecast_server=info,tower_http=info"))
    };
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(env_filter()).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(env_filter()).init();
    }

    tracing::info!("filecast server v{} starting", env!("CARGO_PKG_VERSION"));

    let db = db::init_db(&config.data_dir)?;

    // One registry for the whole process, torn down on shutdown
    let subscribers = SubscriberRegistry::new(config.events.channel_capacity);
    let blobs = BlobStore::new(config.upload_dir.clone(), config.max_upload_bytes());
    tracing::info!(
        upload_dir = %blobs.upload_dir(),
        max_upload_size_mb = config.max_upload_size_mb,
        "Upload storage ready"
    );

    let app_state = state::AppState {
        db,
        subscribers: subscribers.clone(),
        blobs,
        keep_alive: config.events.keep_alive(),
    };

    let app = routes::build_router(app_state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(subscribers))
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM, then close all event streams so in-flight
/// SSE responses finish and graceful shutdown can complete.
async fn shutdown_signal(subscribers: SubscriberRegistry) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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

    tracing::info!("Shutdown signal received");
    subscribers.shutdown();
}
