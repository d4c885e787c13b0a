// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod relation;
pub mod session;
pub mod user;

pub use relation::{GrantOutcome, Page, Tombstone, ViewerRelation};
pub use session::{ActivitySession, DeviceInfo, Hand, RawSessionEntry, SessionKey};
pub use user::{SessionSettings, UserProfile};
