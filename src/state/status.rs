use super::AppState;
use crate::error::{GameError, GameResult};
use crate::protocol::{server_now, ServerMessage};
use crate::types::*;
use std::fmt;
use std::sync::Arc;

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GameStatus::Setup => "SETUP",
            GameStatus::Open => "OPEN",
            GameStatus::Live => "LIVE",
            GameStatus::Completed => "COMPLETED",
        };
        f.write_str(name)
    }
}

impl GameStatus {
    pub const ALL: [GameStatus; 4] = [
        GameStatus::Setup,
        GameStatus::Open,
        GameStatus::Live,
        GameStatus::Completed,
    ];

    /// Transition table. Linear, no skipping, no going back; every state may stay put.
    pub fn can_transition_to(self, to: GameStatus) -> bool {
        use GameStatus::*;

        match (self, to) {
            (Setup, Open) | (Open, Live) | (Live, Completed) => true,
            (Setup, Setup) | (Open, Open) | (Live, Live) | (Completed, Completed) => true,
            (Setup, Live | Completed) => false,
            (Open, Setup | Completed) => false,
            (Live, Setup | Open) => false,
            (Completed, Setup | Open | Live) => false,
        }
    }

    /// States reachable from here, excluding staying put
    pub fn next_statuses(self) -> Vec<GameStatus> {
        Self::ALL
            .into_iter()
            .filter(|to| *to != self && self.can_transition_to(*to))
            .collect()
    }

    pub fn accepts_joins(self) -> GameResult<()> {
        match self {
            GameStatus::Open | GameStatus::Live => Ok(()),
            GameStatus::Setup => Err(GameError::NotYetOpen),
            GameStatus::Completed => Err(GameError::NoLongerAccepting),
        }
    }

    pub fn accepts_picks(self) -> bool {
        match self {
            GameStatus::Open => true,
            GameStatus::Setup | GameStatus::Live | GameStatus::Completed => false,
        }
    }
}

/// Check a status change against the table, then the opening guard
pub fn validate_transition(game: &Game, to: GameStatus) -> GameResult<()> {
    if !game.status.can_transition_to(to) {
        return Err(GameError::InvalidTransition {
            from: game.status,
            to,
        });
    }

    if game.status == GameStatus::Setup && to == GameStatus::Open && game.picks_lock_at.is_none()
    {
        return Err(GameError::MissingLockTime);
    }

    Ok(())
}

impl AppState {
    pub(crate) async fn load_game(&self, game_id: &str) -> GameResult<Game> {
        self.store
            .find_game_by_id(game_id)
            .await?
            .ok_or_else(|| GameError::GameNotFound(game_id.to_string()))
    }

    /// Validate and persist a status change under the game's lock.
    /// Returns the stored game and whether the status actually changed.
    pub(crate) async fn apply_transition(
        &self,
        game_id: &str,
        to: GameStatus,
    ) -> GameResult<(Game, bool)> {
        let _guard = self.game_locks.lock(game_id).await;

        let game = self.load_game(game_id).await?;
        validate_transition(&game, to)?;

        if game.status == to {
            return Ok((game, false));
        }

        let updated = self.store.update_game_status(game_id, to).await?;
        tracing::info!(
            game_id,
            from = %game.status,
            to = %updated.status,
            "Game status changed"
        );
        Ok((updated, true))
    }

    /// Operator-driven status change.
    ///
    /// The caller waits for the store write only. Standings (and the completion
    /// announcement when the game just finished) are published in the background.
    pub async fn transition_game_status(
        self: &Arc<Self>,
        game_id: &str,
        to: GameStatus,
    ) -> GameResult<Game> {
        let (game, changed) = self.apply_transition(game_id, to).await?;

        if changed {
            let state = self.clone();
            let game_id = game.id.clone();
            let finished = game.status == GameStatus::Completed;
            tokio::spawn(async move {
                state.publish_standings(&game_id, finished).await;
            });
        }

        Ok(game)
    }

    /// Join a game by id. Idempotent for existing members.
    pub async fn join_game(&self, user_id: &str, game_id: &str) -> GameResult<GameParticipant> {
        let game = self.load_game(game_id).await?;
        self.join(user_id, &game).await
    }

    /// Join a game using its access code
    pub async fn join_game_by_code(
        &self,
        user_id: &str,
        access_code: &str,
    ) -> GameResult<(Game, GameParticipant)> {
        let code = access_code.trim().to_uppercase();
        let game = self
            .store
            .find_game_by_access_code(&code)
            .await?
            .ok_or_else(|| GameError::GameNotFound(code.clone()))?;
        let participant = self.join(user_id, &game).await?;
        Ok((game, participant))
    }

    async fn join(&self, user_id: &str, game: &Game) -> GameResult<GameParticipant> {
        game.status.accepts_joins()?;

        if let Some(existing) = self.store.find_participant(user_id, &game.id).await? {
            return Ok(existing);
        }

        let participant = self.store.create_participant(user_id, &game.id).await?;
        tracing::info!(game_id = %game.id, user_id, "Player joined game");
        Ok(participant)
    }

    /// Announce that a game finished. Only called when the game entered COMPLETED.
    pub(crate) async fn announce_completion(&self, game_id: &str) {
        let delivered = self
            .rooms
            .emit(
                game_id,
                ServerMessage::GameCompleted {
                    game_id: game_id.to_string(),
                    timestamp: server_now(),
                },
            )
            .await;
        tracing::info!(game_id, delivered, "Game completion announced");
    }
}
