use clap::Parser;
use miette::{IntoDiagnostic, Result, WrapErr};
use orderflow::app::App;
use orderflow::config::Config;
use orderflow::interfaces::http;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    init_tracing();

    let app = App::from_config(&config).into_diagnostic()?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .into_diagnostic()
        .wrap_err_with(|| format!("cannot bind admin API on {addr}"))?;

    let started = app.start().await.into_diagnostic()?;
    tracing::info!(
        workers = started.current,
        payment_concurrency = config.payment_concurrency,
        payment_latency_ms = config.payment_latency_ms,
        "order processor running"
    );

    http::serve(listener, app.router(), shutdown_signal())
        .await
        .into_diagnostic()?;

    tracing::info!("draining workers");
    app.shutdown().await;
    tracing::info!("shutdown complete");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("orderflow=info,tower_http=info")),
        )
        .with_target(false)
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
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
    tracing::info!("shutdown signal received");
}
