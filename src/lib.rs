// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Therapy-Tracker: exercise session storage and sharing for hand therapy
//!
//! This crate provides the backend API that stores exercise sessions
//! uploaded by patients, lets them share those sessions with clinicians, and
//! serves filtered, cached views of the data.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use cache::CacheStore;
use config::Config;
use db::{RelationshipStore, SessionStore};
use services::{
    AccountPurgeService, CacheCoordinator, RetryPolicy, SessionService, ViewerGraphService,
};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub graph: ViewerGraphService,
    pub sessions: SessionService,
    pub cache: Arc<CacheCoordinator>,
    pub purge: AccountPurgeService,
}

impl AppState {
    /// Wire every service to the given stores.
    pub fn new(
        config: Config,
        relations: Arc<dyn RelationshipStore>,
        sessions: Arc<dyn SessionStore>,
        cache: Arc<dyn CacheStore>,
    ) -> Self {
        let coordinator = Arc::new(CacheCoordinator::new(
            cache,
            sessions.clone(),
            config.cache_namespace.clone(),
            config.cache_ttl,
        ));

        Self {
            graph: ViewerGraphService::new(relations.clone(), config.scan_page_size),
            sessions: SessionService::new(sessions.clone(), coordinator.clone()),
            purge: AccountPurgeService::new(
                relations,
                sessions,
                coordinator.clone(),
                RetryPolicy::from_config(&config),
                config.scan_page_size,
                config.purge_full_scan,
            ),
            cache: coordinator,
            config,
        }
    }
}
