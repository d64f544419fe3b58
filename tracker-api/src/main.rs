//! Tracker API server: JSON over HTTP for the acceptance-test tracker.

mod error;
mod routes;
mod sse;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::Router;
use axum::routing::get;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "tracker-api")]
#[command(about = "HTTP API for the battery acceptance-test tracker")]
struct Args {
    /// Address to bind to (defaults to `server.bind` in config)
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on (defaults to `server.port` in config)
    #[arg(long)]
    port: Option<u16>,

    /// Project directory (contains .tracker/)
    #[arg(long, default_value = ".")]
    project_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tracker_api=info".parse()?)
                .add_directive("tracker=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let project_dir = args.project_dir.canonicalize().unwrap_or(args.project_dir);
    info!(project_dir = %project_dir.display(), "starting tracker-api");

    let state = AppState::open(project_dir)?;
    let server = state.service.lock().await.config().server.clone();

    sse::start_file_watcher(state.clone());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .nest("/api", routes::api_router())
        .route("/events", get(sse::events_handler))
        .layer(cors)
        .with_state(state);

    let bind = args.bind.unwrap_or(server.bind);
    let port = args.port.unwrap_or(server.port);
    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
