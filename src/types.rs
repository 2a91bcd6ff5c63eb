use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque ID types for type safety
pub type GameId = String;
pub type EventId = String;
pub type CategoryId = String;
pub type NominationId = String;
pub type UserId = String;
pub type ConnectionId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    Setup,
    Open,
    Live,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub id: GameId,
    pub name: String,
    pub status: GameStatus,
    pub access_code: String,
    /// Picks lock at this instant; required before the game can open
    pub picks_lock_at: Option<DateTime<Utc>>,
    pub event_id: EventId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameParticipant {
    pub user_id: UserId,
    pub game_id: GameId,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,
    pub event_id: EventId,
    pub name: String,
    pub points: u32,
    pub is_revealed: bool,
    pub winner_nomination_id: Option<NominationId>,
}

impl Category {
    /// Winner that counts for scoring. Unrevealed categories never have one,
    /// even if a draft winner is stored.
    pub fn revealed_winner(&self) -> Option<&NominationId> {
        if self.is_revealed {
            self.winner_nomination_id.as_ref()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Nomination {
    pub id: NominationId,
    pub category_id: CategoryId,
    #[serde(default)]
    pub work_title: Option<String>,
    #[serde(default)]
    pub person_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Pick {
    pub game_id: GameId,
    pub user_id: UserId,
    pub category_id: CategoryId,
    pub nomination_id: NominationId,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: Option<String>,
    pub email: String,
    #[serde(default)]
    pub image: Option<String>,
}

impl User {
    /// Name shown on the leaderboard and in reactions
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.email)
    }
}

/// One ranked row of a game's leaderboard. Derived, never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardPlayer {
    pub user_id: UserId,
    pub name: String,
    pub email: String,
    pub image: Option<String>,
    pub total_score: u32,
    pub correct_count: u32,
    pub rank: u32,
    pub is_current_user: bool,
}

/// Reactions accepted from participants
pub const REACTION_EMOJIS: &[&str] = &["🔥", "😍", "😱", "💀"];
