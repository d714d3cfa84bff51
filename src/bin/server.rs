//! Post Policy Server
//!
//! Serves policy acceptance endpoints backed by SQLite.
//!
//! # Configuration
//!
//! Environment variables:
//! - `POSTPOLICY_CONFIG`: Path to config file (default: ~/.config/postpolicy/config.yaml)
//! - `POSTPOLICY_PORT`: Port to listen on (default: 8080)
//! - `POSTPOLICY_DATABASE_PATH`: SQLite database (default: ~/.local/share/postpolicy/postpolicy.db)
//! - `POSTPOLICY_ENABLED`: Master switch (default: true)
//! - `POSTPOLICY_RESTRICT_TO_STAFF_POSTS`: Staff-authored posts only (default: false)
//! - `POSTPOLICY_PAGE_SIZE`: Users per listing page (default: 25)
//!
//! # Config File Format
//!
//! ```yaml
//! policy_enabled: true
//! restrict_to_staff_posts: false
//! page_size: 25
//! api_keys:
//!   - key: "your-secret-key-here"
//!     user_id: 1
//! ```

use postpolicy::config::Config;
use postpolicy::db::init_db;
use postpolicy::server::{build_router, AppState, ChangeHub};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "postpolicy=info,postpolicy_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(None)?;

    tracing::info!("Database: {}", config.database_path.display());
    if !config.policy_enabled {
        tracing::warn!("Policies are disabled; all policy endpoints return 404");
    }

    let pool = init_db(&config.database_path).await?;

    let hub = Arc::new(ChangeHub::default());
    let state = AppState::new(pool, &config, hub);
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
