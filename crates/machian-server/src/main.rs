use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use clap::Parser;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use machian_nbody::Device;

mod handlers;
mod session;
mod state;

use state::AppState;

#[derive(Parser, Debug)]
#[command(name = "machian-server")]
#[command(about = "Simulation backend for the Machian physics lab")]
struct Cli {
    /// TCP address to bind
    #[arg(long, default_value = "0.0.0.0:8000")]
    bind: SocketAddr,

    /// Streaming session tick interval in milliseconds
    #[arg(long, default_value_t = 33)]
    tick_ms: u64,

    /// Skip GPU probing and run all kernels on the CPU
    #[arg(long)]
    no_gpu: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "machian_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let device = if cli.no_gpu {
        info!("GPU probing disabled by flag");
        Device::cpu_only()
    } else {
        Device::probe()
    };

    let state = AppState {
        device,
        tick: Duration::from_millis(cli.tick_ms),
    };

    let app = Router::new()
        .route("/", get(handlers::health))
        .route("/api/cosmology/lookback", get(handlers::lookback))
        .route("/api/galaxy/rotation", get(handlers::rotation))
        .route("/api/blackhole/infall", get(handlers::infall))
        .route("/ws/nbody", get(session::ws_handler))
        .layer(TraceLayer::new_for_http())
        // The lesson frontend is served elsewhere.
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = match TcpListener::bind(cli.bind).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("Failed to bind {}: {err}", cli.bind);
            std::process::exit(1);
        }
    };

    info!("Machian lab backend: http://{}", cli.bind);

    if let Err(err) = axum::serve(listener, app).await {
        error!("Server error: {err}");
    }
}
