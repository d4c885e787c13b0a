// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Viewer relationship record and scan pages.

use serde::{Deserialize, Serialize};

/// Per-user record of the viewer graph, keyed by lowercased email.
///
/// For every pair of users A and B, B appears in `A.sharing_with` exactly
/// when A appears in `B.allowed_to_view`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerRelation {
    /// Owner of this record (also used as document ID)
    pub user_id: String,
    /// Users allowed to view this user's data
    #[serde(default)]
    pub sharing_with: Vec<String>,
    /// Users whose data this user may view
    #[serde(default)]
    pub allowed_to_view: Vec<String>,
}

impl ViewerRelation {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            sharing_with: Vec::new(),
            allowed_to_view: Vec::new(),
        }
    }

    pub fn is_sharing_with(&self, viewer: &str) -> bool {
        self.sharing_with.iter().any(|u| u == viewer)
    }

    pub fn may_view(&self, subject: &str) -> bool {
        self.allowed_to_view.iter().any(|u| u == subject)
    }

    /// Whether either list mentions `user_id`.
    pub fn references(&self, user_id: &str) -> bool {
        self.is_sharing_with(user_id) || self.may_view(user_id)
    }

    /// Remove `user_id` from both lists. Returns `true` if anything changed.
    pub fn remove_references(&mut self, user_id: &str) -> bool {
        let before = self.sharing_with.len() + self.allowed_to_view.len();
        self.sharing_with.retain(|u| u != user_id);
        self.allowed_to_view.retain(|u| u != user_id);
        before != self.sharing_with.len() + self.allowed_to_view.len()
    }

    /// Collapse duplicate entries, keeping first occurrences in order.
    /// Returns `true` if anything changed.
    pub fn dedup(&mut self) -> bool {
        let a = dedup_in_order(&mut self.sharing_with);
        let b = dedup_in_order(&mut self.allowed_to_view);
        a || b
    }

    /// Every user this record points at, without duplicates.
    pub fn neighbours(&self) -> Vec<String> {
        let mut all: Vec<String> = self
            .sharing_with
            .iter()
            .chain(self.allowed_to_view.iter())
            .cloned()
            .collect();
        dedup_in_order(&mut all);
        all
    }
}

/// Append `id` unless already present. Returns `true` if appended.
pub fn push_unique(list: &mut Vec<String>, id: &str) -> bool {
    if list.iter().any(|u| u == id) {
        return false;
    }
    list.push(id.to_string());
    true
}

fn dedup_in_order(list: &mut Vec<String>) -> bool {
    let before = list.len();
    let mut seen = std::collections::HashSet::new();
    list.retain(|u| seen.insert(u.clone()));
    before != list.len()
}

/// Result of the combined two-record grant write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    Granted,
    AlreadyAuthorized,
}

/// Marker left behind by an account purge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tombstone {
    pub user_id: String,
    pub purged_at: String,
}

/// One page of a paginated collection scan.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Continuation token; `None` once the scan is exhausted.
    pub next_page_token: Option<String>,
}
