// Deal Board - Web Server
// REST API with Axum over the cached board query

use anyhow::{Context, Result};
use axum::Router;
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tracing::info;

use deal_board::logging::{init_tracing, LogTarget};
use deal_board::{api, setup_database, AppConfig, BoardQuery, SqliteDealSource};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load(std::env::args_os().nth(1).map(PathBuf::from).as_deref())?;
    init_tracing(LogTarget::Stderr { json: config.log_json });

    println!("🌐 Deal Board - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // Open database
    let conn = Connection::open(&config.database_path)
        .with_context(|| format!("Failed to open database: {:?}", config.database_path))?;
    setup_database(&conn)?;
    println!("✓ Database opened: {:?}", config.database_path);

    // Board query shared by every request
    let query = Arc::new(BoardQuery::new(
        SqliteDealSource::new(Arc::new(Mutex::new(conn))),
        config.template()?,
        config.query_config(),
    ));
    info!(
        stale_secs = config.query.stale_secs,
        cache_secs = config.query.cache_secs,
        retry = config.query.retry,
        "board query configured"
    );

    // Drop expired boards even when nobody asks for one
    let sweeper = Arc::clone(&query);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(sweeper.config().cache_time.max(std::time::Duration::from_secs(1)));
        loop {
            tick.tick().await;
            sweeper.evict_expired();
        }
    });

    let app = Router::new()
        .nest("/api", api::router(query))
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    println!("✓ Server running on http://{}", config.bind_addr);
    println!("\n📍 Endpoints:");
    println!("   GET  /api/health            - Health check");
    println!("   GET  /api/board             - Board (cached)");
    println!("   GET  /api/board/status      - Query status");
    println!("   POST /api/board/refresh     - Refetch board");
    println!("   GET  /api/board/columns/:id - Single column");
    println!("   GET  /api/external-data     - Sample external data");
    println!("\n🚀 Ready to serve requests!\n");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
