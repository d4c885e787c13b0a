// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! One-shot sweep over the viewer graph.
//!
//! Restores edges recorded on one side only, drops references to users
//! that no longer exist and collapses duplicate entries. Prints the report
//! as JSON on stdout.

use std::sync::Arc;
use therapy_tracker::{
    config::{Config, StoreBackend},
    db::{FirestoreDb, RelationshipStore},
    services::ViewerGraphService,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("therapy_tracker=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
        .init();

    let config = Config::from_env()?;
    if config.store_backend != StoreBackend::Firestore {
        anyhow::bail!("reconcile_graph only runs against Firestore (STORE_BACKEND=firestore)");
    }

    let store: Arc<dyn RelationshipStore> =
        Arc::new(FirestoreDb::new(&config.gcp_project_id).await?);
    let graph = ViewerGraphService::new(store, config.scan_page_size);

    let report = graph.reconcile().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
