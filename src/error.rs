//! Engine error taxonomy.
//!
//! Every error has a stable wire code (sent to websocket clients and HTTP callers) and a
//! [`ErrorKind`] used to pick an HTTP status and a log level.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use thiserror::Error;

use crate::store::snapshot::SnapshotError;
use crate::store::StoreError;
use crate::types::{GameId, GameStatus};

/// Result type for engine operations
pub type GameResult<T> = Result<T, GameError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Infrastructure,
}

#[derive(Debug, Error)]
pub enum GameError {
    #[error("cannot move game from {from} to {to}")]
    InvalidTransition { from: GameStatus, to: GameStatus },

    #[error("a pick lock time must be set before the game can open")]
    MissingLockTime,

    #[error("user is not a participant of this game")]
    NotAParticipant,

    #[error("picks are closed while the game is {0}")]
    PicksClosed(GameStatus),

    #[error("nomination does not belong to the selected category")]
    CategoryMismatch,

    #[error("emoji {0:?} is not an allowed reaction")]
    InvalidEmoji(String),

    #[error("a game id is required")]
    GameIdRequired,

    #[error("this game is not yet open")]
    NotYetOpen,

    #[error("this game is no longer accepting players")]
    NoLongerAccepting,

    #[error("authentication required")]
    AuthRequired,

    #[error("too many reactions, slow down")]
    RateLimited,

    #[error("game {0} not found")]
    GameNotFound(GameId),

    #[error("nomination not found")]
    NominationNotFound,

    #[error("category not found")]
    CategoryNotFound,

    #[error("user not found")]
    UserNotFound,

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(#[from] SnapshotError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GameError {
    /// Stable code sent to clients
    pub fn code(&self) -> &'static str {
        match self {
            GameError::InvalidTransition { .. } => "INVALID_TRANSITION",
            GameError::MissingLockTime => "MISSING_LOCK_TIME",
            GameError::NotAParticipant => "NOT_A_PARTICIPANT",
            GameError::PicksClosed(_) => "PICKS_CLOSED",
            GameError::CategoryMismatch => "CATEGORY_MISMATCH",
            GameError::InvalidEmoji(_) => "INVALID_EMOJI",
            GameError::GameIdRequired => "GAME_ID_REQUIRED",
            GameError::NotYetOpen => "NOT_YET_OPEN",
            GameError::NoLongerAccepting => "NO_LONGER_ACCEPTING",
            GameError::AuthRequired => "AUTH_REQUIRED",
            GameError::RateLimited => "RATE_LIMITED",
            GameError::GameNotFound(_) => "GAME_NOT_FOUND",
            GameError::NominationNotFound => "NOMINATION_NOT_FOUND",
            GameError::CategoryNotFound => "CATEGORY_NOT_FOUND",
            GameError::UserNotFound => "USER_NOT_FOUND",
            GameError::InvalidSnapshot(_) => "INVALID_SNAPSHOT",
            GameError::Store(_) => "STORE_UNAVAILABLE",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            GameError::GameNotFound(_)
            | GameError::NominationNotFound
            | GameError::CategoryNotFound
            | GameError::UserNotFound => ErrorKind::NotFound,
            GameError::Store(_) => ErrorKind::Infrastructure,
            _ => ErrorKind::Validation,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            GameError::AuthRequired => StatusCode::UNAUTHORIZED,
            GameError::NotAParticipant => StatusCode::FORBIDDEN,
            GameError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            GameError::InvalidTransition { .. }
            | GameError::PicksClosed(_)
            | GameError::NotYetOpen
            | GameError::NoLongerAccepting => StatusCode::CONFLICT,
            _ => match self.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Infrastructure => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for GameError {
    fn into_response(self) -> axum::response::Response {
        if self.kind() == ErrorKind::Infrastructure {
            tracing::error!(error = %self, "request failed on store access");
        }
        let status = self.status_code();
        let body = Json(ErrorBody {
            code: self.code(),
            message: self.to_string(),
        });
        (status, body).into_response()
    }
}
