// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Filtered reads over a single owner's sessions.

use crate::db::SessionStore;
use crate::error::{AppError, Result};
use crate::models::ActivitySession;
use crate::time_utils::{format_utc_rfc3339, parse_timestamp};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Filter parameters as supplied by the caller. Blank values mean "no
/// constraint".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFilter {
    pub hand: Option<String>,
    pub exercise_name: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

/// Validated, case-normalized filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFilter {
    /// Lowercased
    pub hand: Option<String>,
    /// Lowercased
    pub exercise_name: Option<String>,
    /// Inclusive; only set when both bounds were given
    pub range: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_bound(name: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    raw.map(|value| {
        parse_timestamp(value).ok_or_else(|| {
            AppError::Validation(format!("Invalid '{}' parameter: {}", name, value))
        })
    })
    .transpose()
}

impl SessionFilter {
    pub fn parse(&self) -> Result<ParsedFilter> {
        let start = parse_bound("start", non_blank(&self.start))?;
        let end = parse_bound("end", non_blank(&self.end))?;

        Ok(ParsedFilter {
            hand: non_blank(&self.hand).map(str::to_lowercase),
            exercise_name: non_blank(&self.exercise_name).map(str::to_lowercase),
            range: start.zip(end),
        })
    }
}

impl ParsedFilter {
    pub fn matches(&self, session: &ActivitySession) -> bool {
        if let Some(hand) = &self.hand {
            if session.hand.as_str().to_lowercase() != *hand {
                return false;
            }
        }
        if let Some(exercise) = &self.exercise_name {
            if session.exercise_name.to_lowercase() != *exercise {
                return false;
            }
        }
        if let Some((start, end)) = &self.range {
            if session.timestamp < *start || session.timestamp > *end {
                return false;
            }
        }
        true
    }

    /// Parameters in a fixed order, so equal filters always render the same.
    fn canonical(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some((_, end)) = &self.range {
            parts.push(format!("end={}", format_utc_rfc3339(*end)));
        }
        if let Some(exercise) = &self.exercise_name {
            parts.push(format!("exerciseName={}", urlencoding::encode(exercise)));
        }
        if let Some(hand) = &self.hand {
            parts.push(format!("hand={}", urlencoding::encode(hand)));
        }
        if let Some((start, _)) = &self.range {
            parts.push(format!("start={}", format_utc_rfc3339(*start)));
        }
        parts.sort();
        parts.join("&")
    }

    /// Short, stable digest of the canonical parameters.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.canonical().as_bytes());
        hex::encode(&digest[..8])
    }
}

/// Reads one owner's partition and applies the filters in memory.
#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<dyn SessionStore>,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Entries owned by `owner` that pass every filter, in store order.
    pub async fn get_filtered_entries(
        &self,
        owner: &str,
        filter: &SessionFilter,
    ) -> Result<Vec<ActivitySession>> {
        let parsed = filter.parse()?;
        self.fetch(owner, &parsed).await
    }

    pub async fn fetch(&self, owner: &str, filter: &ParsedFilter) -> Result<Vec<ActivitySession>> {
        let owner = owner.trim().to_lowercase();
        let sessions = self.store.sessions_for_owner(&owner).await?;
        let total = sessions.len();

        let entries: Vec<ActivitySession> = sessions
            .into_iter()
            .filter(|s| s.username == owner && filter.matches(s))
            .collect();

        tracing::debug!(
            owner = %owner,
            total,
            matched = entries.len(),
            "Filtered session query"
        );
        Ok(entries)
    }
}
