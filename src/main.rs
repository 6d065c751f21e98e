//! Rain radar alert server.
//!
//! # Usage
//!
//! ```text
//! rain-radar            # serve the HTTP API on $PORT
//! rain-radar --once     # run a single evaluation cycle and print the result
//! ```
//!
//! # API Endpoints
//!
//! - `GET /health` - Health check
//! - `POST /evaluate` - Run one evaluation cycle
//! - `GET /state` - Stored alert state
//! - `PUT /profile` - Create or replace the watched profile

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use rain_radar::api::{AppState, router};
use rain_radar::config::Config;
use rain_radar::service::AlertService;
use rain_radar::storage::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("rain_radar=info".parse()?))
        .init();

    let once = env::args().skip(1).any(|arg| arg == "--once");

    let config = Config::from_env(true)?;
    info!(
        db_url = %config.database_url,
        user_id = %config.user_id,
        frame_count = config.radar.frame_count,
        "Configuration loaded"
    );

    let storage = Storage::new(&config.database_url).await?;
    info!("Database initialized");

    let port = config.port;
    let service = Arc::new(AlertService::new(config, storage));

    if once {
        let response = service.run_cycle(Utc::now()).await?;
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    let app = router(AppState { service });

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "Rain radar is listening");

    axum::serve(listener, app).await?;

    Ok(())
}
