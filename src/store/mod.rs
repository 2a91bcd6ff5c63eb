//! Store gateway: the CRUD boundary the engine reads and writes through.
//!
//! The engine owns no persistence; every call here is assumed to be strongly consistent
//! (a read issued after a write observes that write).

mod memory;
pub mod snapshot;

pub use memory::MemoryStore;

use async_trait::async_trait;
use std::error::Error;
use thiserror::Error;

use crate::types::*;
use snapshot::StoreSnapshot;

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Error raised by store backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Option<Box<dyn Error + Send + Sync>>,
    },

    #[error("{entity} {id} does not exist")]
    Missing { entity: &'static str, id: String },
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        StoreError::Unavailable {
            message: message.into(),
            source: None,
        }
    }

    /// Construct an unavailable error from any backend failure.
    pub fn from_source(
        message: impl Into<String>,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        StoreError::Unavailable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn missing(entity: &'static str, id: impl Into<String>) -> Self {
        StoreError::Missing {
            entity,
            id: id.into(),
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn find_game_by_id(&self, game_id: &str) -> StoreResult<Option<Game>>;

    async fn find_game_by_access_code(&self, access_code: &str) -> StoreResult<Option<Game>>;

    async fn find_games_for_event(&self, event_id: &str) -> StoreResult<Vec<Game>>;

    async fn update_game_status(&self, game_id: &str, status: GameStatus) -> StoreResult<Game>;

    async fn find_user_by_id(&self, user_id: &str) -> StoreResult<Option<User>>;

    async fn find_participant(
        &self,
        user_id: &str,
        game_id: &str,
    ) -> StoreResult<Option<GameParticipant>>;

    /// Insert a membership. Implementations must treat (user, game) as unique and return the
    /// existing row instead of duplicating it.
    async fn create_participant(
        &self,
        user_id: &str,
        game_id: &str,
    ) -> StoreResult<GameParticipant>;

    /// Participants of a game joined with their user records.
    async fn find_participants_for_game(&self, game_id: &str) -> StoreResult<Vec<User>>;

    async fn find_picks_for_game(&self, game_id: &str) -> StoreResult<Vec<Pick>>;

    /// Insert or overwrite the pick keyed by (game, user, category).
    async fn upsert_pick(
        &self,
        game_id: &str,
        user_id: &str,
        category_id: &str,
        nomination_id: &str,
    ) -> StoreResult<Pick>;

    async fn find_category_by_id(&self, category_id: &str) -> StoreResult<Option<Category>>;

    async fn find_categories_for_event(&self, event_id: &str) -> StoreResult<Vec<Category>>;

    /// Set the winner and the revealed flag together.
    async fn mark_category_winner(
        &self,
        category_id: &str,
        nomination_id: &str,
    ) -> StoreResult<Category>;

    /// Clear the winner and the revealed flag together.
    async fn clear_category_winner(&self, category_id: &str) -> StoreResult<Category>;

    async fn find_nomination_by_id(&self, nomination_id: &str)
        -> StoreResult<Option<Nomination>>;

    /// Dump every record. Backends without snapshot support report `Unavailable`.
    async fn export_snapshot(&self) -> StoreResult<StoreSnapshot> {
        Err(StoreError::unavailable("snapshot export is not supported"))
    }

    /// Replace every record with the snapshot contents.
    async fn import_snapshot(&self, _snapshot: StoreSnapshot) -> StoreResult<()> {
        Err(StoreError::unavailable("snapshot import is not supported"))
    }
}
