// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Therapy-Tracker API Server
//!
//! Stores hand-therapy exercise sessions and lets patients share them with
//! the clinicians they choose.

use std::sync::Arc;
use std::time::Duration;
use therapy_tracker::{
    cache::MemoryCache,
    config::{Config, StoreBackend},
    db::{FirestoreDb, MemoryStore, RelationshipStore, SessionStore},
    AppState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often expired cache entries are swept out.
const CACHE_EVICTION_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(
        port = config.port,
        store = config.store_backend.as_str(),
        "Starting Therapy-Tracker API"
    );

    let (relations, sessions): (Arc<dyn RelationshipStore>, Arc<dyn SessionStore>) =
        match config.store_backend {
            StoreBackend::Firestore => {
                let db = Arc::new(
                    FirestoreDb::new(&config.gcp_project_id)
                        .await
                        .expect("Failed to connect to Firestore"),
                );
                (db.clone(), db)
            }
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory store; data is lost on restart");
                let store = Arc::new(MemoryStore::new());
                (store.clone(), store)
            }
        };

    // Process-local query cache, shared by all requests on this instance
    let cache = Arc::new(MemoryCache::new());
    let evictor = cache.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CACHE_EVICTION_INTERVAL);
        loop {
            ticker.tick().await;
            let evicted = evictor.evict_expired();
            if evicted > 0 {
                tracing::debug!(evicted, "Evicted expired cache entries");
            }
        }
    });

    // Build shared state
    let state = Arc::new(AppState::new(config.clone(), relations, sessions, cache));

    // Build router
    let app = therapy_tracker::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("therapy_tracker=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
