//! Recall daemon: HTTP surface for the microagent listing API.
//!
//! Endpoints:
//!   GET /api/microagents → all global and user microagents, sorted by
//!                          origin then name; always 200, possibly empty
//!   GET /api/health      → liveness probe

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::{extract::State, response::Json, routing::get, Router};
use clap::Parser;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::{info, Level};

use recall_core::{list_microagents, telemetry, MicroagentInfo};

#[derive(Debug, Parser)]
#[command(name = "recalld", about = "Recall microagent listing daemon")]
struct Args {
    /// Port to listen on.
    #[arg(long, env = "RECALLD_PORT", default_value_t = 3310)]
    port: u16,

    /// Directory holding global microagents.
    #[arg(long, env = "RECALL_MICROAGENTS_DIR")]
    microagents_dir: PathBuf,

    /// Directory holding user-level microagents.
    #[arg(long, env = "RECALL_USER_MICROAGENTS_DIR")]
    user_microagents_dir: PathBuf,

    /// Emit newline-delimited JSON log lines.
    #[arg(long, env = "RECALLD_JSON_LOGS")]
    json_logs: bool,
}

#[derive(Clone)]
struct AppState {
    global_dir: PathBuf,
    user_dir: PathBuf,
}

#[derive(Debug, Serialize)]
struct MicroagentListResponse {
    microagents: Vec<MicroagentInfo>,
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/microagents", get(list_handler))
        .route("/api/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// List all available microagents.
///
/// Ingestion problems never surface as HTTP errors; a failed origin
/// simply contributes no entries.
async fn list_handler(State(state): State<Arc<AppState>>) -> Json<MicroagentListResponse> {
    let microagents = list_microagents(&state.global_dir, &state.user_dir);
    Json(MicroagentListResponse { microagents })
}

async fn health() -> &'static str {
    "ok"
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    telemetry::init_tracing(args.json_logs, Level::INFO);

    let state = Arc::new(AppState {
        global_dir: args.microagents_dir,
        user_dir: args.user_microagents_dir,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "recalld listening");

    axum::serve(listener, router(state)).await?;
    Ok(())
}
