//! Arbiter service.
//!
//! Loads the config (path from the first argument, default `arbiter.yaml`),
//! the policy pack and the ledger key, opens and verifies the ledger, and
//! serves the ops endpoints until Ctrl-C. On shutdown it drains in-flight
//! arbitrations and seals the ledger.

use std::net::SocketAddr;

use tracing_subscriber::{fmt, EnvFilter};

use arbiter_core::error::{ArbiterError, Result};
use arbiter_engine::{app_state::AppState, config, router};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    if let Err(e) = run().await {
        tracing::error!(code = e.fault_code().as_str(), error = %e, "arbiter stopped");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "arbiter.yaml".into());
    let cfg = config::load_from_file(&path)?;
    let listen: SocketAddr = cfg
        .ops
        .listen
        .parse()
        .map_err(|e| ArbiterError::InvalidConfig(format!("ops.listen: {e}")))?;

    let state = AppState::from_config(cfg)?;
    let app = router::build_router(state.clone());

    tracing::info!(%listen, pack = state.pack().name(), "arbiter starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| ArbiterError::Internal(format!("bind {listen}: {e}")))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await
        .map_err(|e| ArbiterError::Internal(format!("server failed: {e}")))?;
    Ok(())
}

async fn shutdown_signal(state: AppState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested; draining");
    if let Err(e) = state.drain().await {
        tracing::error!(code = e.fault_code().as_str(), error = %e, "drain failed");
    }
}
