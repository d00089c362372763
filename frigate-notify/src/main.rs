use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use frigate_notify::{
    Config, Dispatcher, EventProcessor, FrigateMediaFetcher, TelegramSink, logging,
    utils::http_client,
};
use frigate_stream::{StreamClient, StreamClientConfig};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "FRIGATE_NOTIFY_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = Config::load(&args.config)
        .with_context(|| format!("invalid configuration in {}", args.config.display()))?;

    if args.check {
        println!("Configuration {} is valid", args.config.display());
        return Ok(());
    }

    logging::init_logging(config.debug)?;
    http_client::install_rustls_provider();

    info!("frigate-notify {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Loaded configuration from {} ({} cameras configured)",
        args.config.display(),
        config.cameras.len()
    );

    let sink = Arc::new(TelegramSink::from_config(&config.telegram)?);
    if config.telegram.verify_on_startup {
        let bot = sink
            .verify()
            .await
            .context("Telegram bot token verification failed")?;
        info!("Telegram bot {} verified", bot);
    }

    let media = Arc::new(FrigateMediaFetcher::from_config(&config)?);
    info!("Event media delivered in {:?} mode", media.mode());
    let processor = EventProcessor::from_config(&config, sink, media)?;
    let dispatcher = Arc::new(
        Dispatcher::from_config(&config.dispatch, processor).with_span(info_span!("dispatch")),
    );
    dispatcher.start();

    let client = StreamClient::websocket(
        config.frigate.websocket_url.clone(),
        StreamClientConfig {
            reconnect_backoff: config.frigate.reconnect_backoff(),
            connect_timeout: config.frigate.connect_timeout(),
        },
    )
    .with_span(info_span!("stream"));
    let stream_stats = client.stats();

    let cancel = CancellationToken::new();
    let stream_task = tokio::spawn({
        let dispatcher = dispatcher.clone();
        let cancel = cancel.clone();
        async move {
            client
                .run(
                    move |event| {
                        dispatcher.submit(event);
                    },
                    cancel,
                )
                .await
        }
    });

    shutdown_signal().await;
    info!("Shutdown signal received");

    cancel.cancel();
    if let Err(e) = stream_task.await {
        warn!("Event stream task failed: {}", e);
    }
    dispatcher.stop().await;

    info!("Stream: {:?}", stream_stats.snapshot());
    info!("Dispatch: {:?}", dispatcher.stats());
    info!("frigate-notify stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
