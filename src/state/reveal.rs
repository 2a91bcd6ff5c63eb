use super::AppState;
use crate::error::{GameError, GameResult};
use crate::protocol::{server_now, ServerMessage};
use crate::types::*;
use std::sync::Arc;

impl AppState {
    /// Reveal a category's winner.
    ///
    /// The winner and the revealed flag are written together. Every game of the category's
    /// event is then rescored and broadcast in the background.
    pub async fn mark_category_winner(
        self: &Arc<Self>,
        category_id: &str,
        nomination_id: &str,
    ) -> GameResult<Category> {
        let category = self
            .store
            .find_category_by_id(category_id)
            .await?
            .ok_or(GameError::CategoryNotFound)?;
        let nomination = self
            .store
            .find_nomination_by_id(nomination_id)
            .await?
            .ok_or(GameError::NominationNotFound)?;
        if nomination.category_id != category.id {
            return Err(GameError::CategoryMismatch);
        }

        let revealed = {
            let _event = self.event_locks.lock(&category.event_id).await;
            self.store
                .mark_category_winner(category_id, nomination_id)
                .await?
        };
        tracing::info!(
            category_id,
            nomination_id,
            event_id = %revealed.event_id,
            "Category winner revealed"
        );

        self.spawn_event_standings(revealed.event_id.clone());
        Ok(revealed)
    }

    /// Undo a reveal. Scores drop back as if the category was never revealed.
    pub async fn clear_category_winner(
        self: &Arc<Self>,
        category_id: &str,
    ) -> GameResult<Category> {
        let category = self
            .store
            .find_category_by_id(category_id)
            .await?
            .ok_or(GameError::CategoryNotFound)?;

        let cleared = {
            let _event = self.event_locks.lock(&category.event_id).await;
            self.store.clear_category_winner(category_id).await?
        };
        tracing::info!(category_id, event_id = %cleared.event_id, "Category winner cleared");

        self.spawn_event_standings(cleared.event_id.clone());
        Ok(cleared)
    }

    fn spawn_event_standings(self: &Arc<Self>, event_id: EventId) {
        let state = self.clone();
        tokio::spawn(async move {
            state.publish_event_standings(&event_id).await;
        });
    }

    /// Rescore every game of an event after its reveal state changed.
    ///
    /// LIVE games whose categories are now all revealed are completed first when
    /// auto-completion is enabled, so their subscribers see the final standings followed by
    /// a single `game:completed`.
    pub(crate) async fn publish_event_standings(&self, event_id: &str) {
        let games = match self.store.find_games_for_event(event_id).await {
            Ok(games) => games,
            Err(e) => {
                tracing::error!(event_id, error = %e, "Failed to load games for event");
                return;
            }
        };

        let completed = if self.config.auto_complete {
            self.complete_finished_games(event_id, &games).await
        } else {
            Vec::new()
        };

        for game in games {
            let finished = completed.contains(&game.id);
            self.publish_standings(&game.id, finished).await;
        }
    }

    /// Move LIVE games to COMPLETED when every category of their event is revealed.
    ///
    /// Holds the event's lock from the category read through the status writes, so a reveal
    /// or clear cannot land in between. Returns the games that actually changed.
    async fn complete_finished_games(&self, event_id: &str, games: &[Game]) -> Vec<GameId> {
        let _event = self.event_locks.lock(event_id).await;

        let categories = match self.store.find_categories_for_event(event_id).await {
            Ok(categories) => categories,
            Err(e) => {
                tracing::error!(event_id, error = %e, "Failed to load categories for event");
                return Vec::new();
            }
        };
        if categories.is_empty() || !categories.iter().all(|c| c.is_revealed) {
            return Vec::new();
        }

        let mut completed = Vec::new();
        for game in games.iter().filter(|g| g.status == GameStatus::Live) {
            match self.apply_transition(&game.id, GameStatus::Completed).await {
                Ok((_, true)) => completed.push(game.id.clone()),
                Ok((_, false)) => {}
                Err(e) => {
                    tracing::warn!(game_id = %game.id, error = %e, "Auto-complete failed")
                }
            }
        }
        completed
    }

    /// Recompute and broadcast one game's leaderboard, then announce completion if asked.
    ///
    /// Runs under the game's lock and always reads the store fresh. Skips scoring when
    /// nobody is watching. A failed scoring run is logged and nothing is emitted.
    pub(crate) async fn publish_standings(&self, game_id: &str, announce_completion: bool) {
        let _guard = self.game_locks.lock(game_id).await;

        if self.rooms.subscriber_count(game_id).await > 0 {
            match self.leaderboard(game_id, None).await {
                Ok(players) => {
                    let count = players.len();
                    let delivered = self
                        .rooms
                        .emit(
                            game_id,
                            ServerMessage::LeaderboardUpdate {
                                game_id: game_id.to_string(),
                                players,
                                timestamp: server_now(),
                            },
                        )
                        .await;
                    tracing::debug!(game_id, players = count, delivered, "Leaderboard broadcast");
                }
                Err(e) => {
                    tracing::error!(game_id, error = %e, "Leaderboard recomputation failed");
                }
            }
        }

        if announce_completion {
            self.announce_completion(game_id).await;
        }
    }
}
