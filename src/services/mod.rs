// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod coordinator;
pub mod purge;
pub mod query;
pub mod retry;
pub mod session;
pub mod viewer_graph;

pub use coordinator::{CacheCoordinator, CacheSource, QueryResult};
pub use purge::{AccountPurgeService, PurgeReport};
pub use query::{ParsedFilter, QueryEngine, SessionFilter};
pub use retry::RetryPolicy;
pub use session::{SessionService, SettingsPatch, UploadOutcome};
pub use viewer_graph::{GrantResult, ReconcileReport, SubjectSummary, ViewerGraphService};
