//! Store snapshots for seeding and restoring the in-memory store.
//!
//! A snapshot is a flat JSON document of every record the engine reads. It is used to seed
//! the server at startup (`ENVELOPE_SEED_FILE`) and by the admin export/import endpoints.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use crate::types::*;

/// Schema version for snapshot format compatibility
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot schema version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("{0}")]
    Dangling(String),

    #[error("failed to read snapshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse snapshot: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    pub schema_version: u32,
    #[serde(default)]
    pub exported_at: String,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub games: Vec<Game>,
    #[serde(default)]
    pub participants: Vec<GameParticipant>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub nominations: Vec<Nomination>,
    #[serde(default)]
    pub picks: Vec<Pick>,
}

impl StoreSnapshot {
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Validate references before import
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.schema_version > SNAPSHOT_SCHEMA_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: self.schema_version,
                supported: SNAPSHOT_SCHEMA_VERSION,
            });
        }

        let users: HashSet<&str> = self.users.iter().map(|u| u.id.as_str()).collect();
        let games: HashSet<&str> = self.games.iter().map(|g| g.id.as_str()).collect();
        let categories: HashSet<&str> = self.categories.iter().map(|c| c.id.as_str()).collect();

        let mut codes = HashSet::new();
        for game in &self.games {
            if !codes.insert(game.access_code.as_str()) {
                return Err(SnapshotError::Dangling(format!(
                    "Access code '{}' is used by more than one game",
                    game.access_code
                )));
            }
        }

        for participant in &self.participants {
            if !users.contains(participant.user_id.as_str())
                || !games.contains(participant.game_id.as_str())
            {
                return Err(SnapshotError::Dangling(format!(
                    "Participant ({}, {}) references a missing user or game",
                    participant.user_id, participant.game_id
                )));
            }
        }

        for category in &self.categories {
            if category.is_revealed && category.winner_nomination_id.is_none() {
                return Err(SnapshotError::Dangling(format!(
                    "Category '{}' is revealed without a winner",
                    category.id
                )));
            }
        }

        for nomination in &self.nominations {
            if !categories.contains(nomination.category_id.as_str()) {
                return Err(SnapshotError::Dangling(format!(
                    "Nomination '{}' references category '{}' which doesn't exist",
                    nomination.id, nomination.category_id
                )));
            }
        }

        for pick in &self.picks {
            let owner = self
                .nominations
                .iter()
                .find(|n| n.id == pick.nomination_id)
                .map(|n| n.category_id.as_str());
            if owner != Some(pick.category_id.as_str()) {
                return Err(SnapshotError::Dangling(format!(
                    "Pick for game '{}' by '{}' names nomination '{}' outside category '{}'",
                    pick.game_id, pick.user_id, pick.nomination_id, pick.category_id
                )));
            }
        }

        Ok(())
    }
}
