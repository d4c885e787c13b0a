//! User directory and per-user session settings.

use crate::models::Hand;
use serde::{Deserialize, Serialize};

/// Directory entry, keyed by lowercased email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Lowercased email (also used as document ID)
    pub email: String,
    /// Display name
    pub name: String,
    /// When the user registered
    pub created_at: String,
}

/// Defaults applied by clients when starting a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSettings {
    pub username: String,
    #[serde(default)]
    pub default_hand: Hand,
    #[serde(default = "default_target_reps")]
    pub target_reps: u32,
    #[serde(default)]
    pub updated_at: String,
}

fn default_target_reps() -> u32 {
    10
}

impl SessionSettings {
    /// Settings created on first lookup.
    pub fn default_for(username: &str, now: &str) -> Self {
        Self {
            username: username.to_string(),
            default_hand: Hand::default(),
            target_reps: default_target_reps(),
            updated_at: now.to_string(),
        }
    }
}
