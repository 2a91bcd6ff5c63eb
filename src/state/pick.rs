use super::AppState;
use crate::error::{GameError, GameResult};
use crate::types::*;

impl AppState {
    /// Validate and store a participant's pick for one category.
    ///
    /// Checks run in order and the first failure wins: membership, game status,
    /// nomination/category pairing. Re-submitting for the same category overwrites the
    /// previous nomination. Picks stay private, so nothing is broadcast.
    pub async fn submit_pick(
        &self,
        user_id: &str,
        game_id: &str,
        category_id: &str,
        nomination_id: &str,
    ) -> GameResult<Pick> {
        if self
            .store
            .find_participant(user_id, game_id)
            .await?
            .is_none()
        {
            return Err(GameError::NotAParticipant);
        }

        let game = self.load_game(game_id).await?;
        if !game.status.accepts_picks() {
            return Err(GameError::PicksClosed(game.status));
        }

        let nomination = self
            .store
            .find_nomination_by_id(nomination_id)
            .await?
            .ok_or(GameError::NominationNotFound)?;
        if nomination.category_id != category_id {
            return Err(GameError::CategoryMismatch);
        }

        let pick = self
            .store
            .upsert_pick(game_id, user_id, category_id, nomination_id)
            .await?;
        tracing::debug!(game_id, user_id, category_id, "Pick stored");
        Ok(pick)
    }
}
