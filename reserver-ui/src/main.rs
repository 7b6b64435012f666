//! Reserver UI server - web controls for a reservation session.

mod routes;
mod sse;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use axum::Router;
use axum::routing::get;
use clap::Parser;
use reserver::io::config::load_config;
use reserver::io::init::ReserverPaths;
use reserver::io::page::FilePage;
use reserver::session::{SessionOptions, spawn_session};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::info;

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "reserver-ui")]
#[command(about = "Web controls and live status for a reservation session")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "3002")]
    port: u16,

    /// Project directory (contains .reserver/)
    #[arg(long, default_value = ".")]
    project_dir: PathBuf,

    /// Directory containing UI static files (defaults to ./ui/dist under the project)
    #[arg(long)]
    ui_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("reserver_ui=info".parse()?)
                .add_directive("reserver=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let project_dir = args.project_dir.canonicalize().unwrap_or(args.project_dir);
    info!(project_dir = %project_dir.display(), "starting reserver-ui");

    let paths = ReserverPaths::new(&project_dir);
    let cfg = load_config(&paths.config_path).context("load reserver config")?;
    let page = FilePage::new(
        paths.resolve(&cfg.reservation.page_path),
        paths.resolve(&cfg.reservation.actions_path),
    );
    let reporter = AppState::reporter();
    let session = spawn_session(
        page,
        reporter.clone(),
        SessionOptions {
            retry: cfg.retry,
            success_policy: cfg.reservation.success_policy(),
        },
    );
    let state = AppState::new(paths, session, reporter);

    sse::start_snapshot_forwarder(state.clone());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .nest("/api", routes::api_router())
        .route("/events", get(sse::events_handler))
        .layer(cors)
        .with_state(state.clone());

    let ui_dir = args
        .ui_dir
        .unwrap_or_else(|| project_dir.join("ui").join("dist"));
    if ui_dir.exists() {
        info!(ui_dir = %ui_dir.display(), "serving static UI files");
        app = app.fallback_service(ServeDir::new(ui_dir).append_index_html_on_directories(true));
    } else {
        info!(ui_dir = %ui_dir.display(), "UI directory not found, API-only mode");
    }

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            state.session.stop("Manually stopped");
        })
        .await?;

    Ok(())
}
