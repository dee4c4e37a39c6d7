//! Social media post API server entry point.

use sm_post_api::config::Settings;
use sm_post_api::error::AppError;
use sm_post_api::{app, build_router, telemetry};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let settings = Settings::from_env()?;
    let telemetry = telemetry::init(&settings)?;

    info!(version = env!("CARGO_PKG_VERSION"), "starting social media post API server");

    let application = app::bootstrap(&settings).await?;
    let router = build_router(application.state.clone());

    let listener = TcpListener::bind(settings.bind_address()).await?;
    info!(address = %listener.local_addr()?, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, draining background tasks");
    application.shutdown().await;
    telemetry.shutdown();

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
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
                warn!(error = %e, "failed to listen for SIGTERM");
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

    info!("shutdown signal received");
}
