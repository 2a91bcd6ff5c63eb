use super::AppState;
use crate::broadcast::ClientSender;
use crate::error::{GameError, GameResult};
use crate::protocol::{server_now, ServerMessage};
use crate::types::*;

impl AppState {
    /// Resolve the identity a connection presented. Missing or unknown identities are fatal
    /// for the connection.
    pub async fn authenticate(&self, user_id: Option<&str>) -> GameResult<User> {
        let user_id = user_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(GameError::AuthRequired)?;

        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or(GameError::UserNotFound)
    }

    /// Subscribe a connection to a game's room.
    ///
    /// Only participants may watch a game. On success the current standings are queued for
    /// this connection alone so it never waits for the next reveal to catch up. Runs under
    /// the game's lock, like every other standings emission.
    pub async fn subscribe_connection(
        &self,
        user_id: &str,
        connection_id: &str,
        sender: ClientSender,
        game_id: Option<&str>,
    ) -> GameResult<GameId> {
        let game_id = game_id
            .filter(|id| !id.is_empty())
            .ok_or(GameError::GameIdRequired)?;

        if self
            .store
            .find_participant(user_id, game_id)
            .await?
            .is_none()
        {
            return Err(GameError::NotAParticipant);
        }

        // Held until the backfill is queued, so a reveal's broadcast always lands after it
        let _guard = self.game_locks.lock(game_id).await;

        self.rooms
            .subscribe(game_id, connection_id, sender.clone())
            .await;
        tracing::info!(game_id, user_id, connection_id, "Connection joined room");

        match self.leaderboard(game_id, Some(user_id)).await {
            Ok(players) => {
                let snapshot = ServerMessage::LeaderboardUpdate {
                    game_id: game_id.to_string(),
                    players,
                    timestamp: server_now(),
                };
                if sender.try_send(snapshot).is_err() {
                    tracing::warn!(game_id, connection_id, "Could not queue join backfill");
                }
            }
            Err(e) => {
                tracing::error!(game_id, error = %e, "Join backfill scoring failed");
            }
        }

        Ok(game_id.to_string())
    }

    /// Relay an ephemeral reaction to everyone in the game's room, sender included.
    /// Returns how many connections it was queued for.
    pub async fn send_reaction(
        &self,
        user: &User,
        game_id: Option<&str>,
        emoji: &str,
    ) -> GameResult<usize> {
        let game_id = game_id
            .filter(|id| !id.is_empty())
            .ok_or(GameError::GameIdRequired)?;

        if self
            .store
            .find_participant(&user.id, game_id)
            .await?
            .is_none()
        {
            return Err(GameError::NotAParticipant);
        }

        if !REACTION_EMOJIS.contains(&emoji) {
            return Err(GameError::InvalidEmoji(emoji.to_string()));
        }

        let key = (game_id.to_string(), user.id.clone());
        if !self.reactions.check(&key).await {
            tracing::debug!(game_id, user_id = %user.id, "Reaction rate limited");
            return Err(GameError::RateLimited);
        }

        let delivered = self
            .rooms
            .emit(
                game_id,
                ServerMessage::ReactionBroadcast {
                    game_id: game_id.to_string(),
                    user_id: user.id.clone(),
                    user_name: user.display_name().to_string(),
                    emoji: emoji.to_string(),
                    timestamp: server_now(),
                },
            )
            .await;
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::AppConfig;
    use crate::error::GameError;
    use crate::protocol::ServerMessage;
    use crate::state::test_support::Fixture;
    use crate::store::Store;
    use crate::types::GameStatus;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_authenticate() {
        let fx = Fixture::new().await;
        let ada = fx.user("Ada").await;

        assert!(matches!(
            fx.state.authenticate(None).await,
            Err(GameError::AuthRequired)
        ));
        assert!(matches!(
            fx.state.authenticate(Some("  ")).await,
            Err(GameError::AuthRequired)
        ));
        assert!(matches!(
            fx.state.authenticate(Some("ghost")).await,
            Err(GameError::UserNotFound)
        ));
        assert_eq!(fx.state.authenticate(Some(&ada.id)).await.unwrap(), ada);
    }

    #[tokio::test]
    async fn test_join_room_requires_participant() {
        let fx = Fixture::new().await;
        let eve = fx.user("Eve").await;
        let (tx, _rx) = mpsc::channel(8);

        let result = fx
            .state
            .subscribe_connection(&eve.id, "c1", tx, Some(&fx.game.id))
            .await;
        assert!(matches!(result, Err(GameError::NotAParticipant)));
        assert_eq!(fx.state.rooms.subscriber_count(&fx.game.id).await, 0);
    }

    #[tokio::test]
    async fn test_join_room_requires_game_id() {
        let fx = Fixture::new().await;
        let ada = fx.participant("Ada").await;
        let (tx, _rx) = mpsc::channel(8);

        let result = fx.state.subscribe_connection(&ada.id, "c1", tx, None).await;
        assert!(matches!(result, Err(GameError::GameIdRequired)));
    }

    #[tokio::test]
    async fn test_join_room_backfills_leaderboard() {
        let fx = Fixture::new().await;
        let ada = fx.participant("Ada").await;
        for category in 0..3 {
            fx.pick(&ada, category, 0).await;
        }
        fx.reveal(0, 0).await;

        let (tx, mut rx) = mpsc::channel(8);
        let joined = fx
            .state
            .subscribe_connection(&ada.id, "c1", tx, Some(&fx.game.id))
            .await
            .unwrap();
        assert_eq!(joined, fx.game.id);
        assert_eq!(fx.state.rooms.subscriber_count(&fx.game.id).await, 1);

        match rx.try_recv() {
            Ok(ServerMessage::LeaderboardUpdate { players, .. }) => {
                assert_eq!(players.len(), 1);
                assert_eq!(players[0].total_score, 10);
                assert!(players[0].is_current_user);
            }
            other => panic!("Expected backfill, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reaction_broadcast_to_room() {
        let fx = Fixture::new().await;
        let ada = fx.participant("Ada").await;
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        fx.state.rooms.subscribe(&fx.game.id, "c1", tx1).await;
        fx.state.rooms.subscribe(&fx.game.id, "c2", tx2).await;

        let delivered = fx
            .state
            .send_reaction(&ada, Some(&fx.game.id), "🔥")
            .await
            .unwrap();
        assert_eq!(delivered, 2);

        for rx in [&mut rx1, &mut rx2] {
            match rx.try_recv() {
                Ok(ServerMessage::ReactionBroadcast {
                    user_id,
                    user_name,
                    emoji,
                    ..
                }) => {
                    assert_eq!(user_id, ada.id);
                    assert_eq!(user_name, "Ada");
                    assert_eq!(emoji, "🔥");
                }
                other => panic!("Expected reaction, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_reaction_outside_allow_list_is_not_broadcast() {
        let fx = Fixture::new().await;
        let ada = fx.participant("Ada").await;
        let (tx, mut rx) = mpsc::channel(8);
        fx.state.rooms.subscribe(&fx.game.id, "c1", tx).await;

        let result = fx.state.send_reaction(&ada, Some(&fx.game.id), "🎉").await;
        assert!(matches!(result, Err(GameError::InvalidEmoji(e)) if e == "🎉"));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reaction_requires_participant() {
        let fx = Fixture::new().await;
        let eve = fx.user("Eve").await;

        let result = fx.state.send_reaction(&eve, Some(&fx.game.id), "🔥").await;
        assert!(matches!(result, Err(GameError::NotAParticipant)));

        let result = fx.state.send_reaction(&eve, None, "🔥").await;
        assert!(matches!(result, Err(GameError::GameIdRequired)));
    }

    #[tokio::test]
    async fn test_reactions_are_rate_limited() {
        let config = AppConfig {
            reaction_limit: 2,
            ..AppConfig::default()
        };
        let fx = Fixture::with_config(config).await;
        let ada = fx.participant("Ada").await;

        for _ in 0..2 {
            fx.state
                .send_reaction(&ada, Some(&fx.game.id), "💀")
                .await
                .unwrap();
        }
        let result = fx.state.send_reaction(&ada, Some(&fx.game.id), "💀").await;
        assert!(matches!(result, Err(GameError::RateLimited)));

        // The budget is per game
        let other = fx.store.add_game("oscars-2025", "Second pool").await;
        fx.store.create_participant(&ada.id, &other.id).await.unwrap();
        fx.state
            .send_reaction(&ada, Some(&other.id), "💀")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_backfill_never_lands_after_newer_standings() {
        let (fx, store) = Fixture::flaky().await;
        fx.set_status(GameStatus::Live).await;
        let ada = fx.participant("Ada").await;
        for category in 0..3 {
            fx.pick(&ada, category, 0).await;
        }

        // The backfill's scoring run reads categories, then stalls before sending
        store.delay_next_category_read(Duration::from_millis(300));
        let (tx, mut rx) = mpsc::channel(8);
        let join = {
            let state = fx.state.clone();
            let user_id = ada.id.clone();
            let game_id = fx.game.id.clone();
            tokio::spawn(async move {
                state
                    .subscribe_connection(&user_id, "c1", tx, Some(&game_id))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        fx.state
            .mark_category_winner(&fx.categories[0].id, &fx.nominations[0][0].id)
            .await
            .unwrap();
        join.await.unwrap().unwrap();

        let mut scores = Vec::new();
        while let Ok(Some(msg)) = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
            if let ServerMessage::LeaderboardUpdate { players, .. } = msg {
                scores.push(players[0].total_score);
            }
        }
        assert_eq!(scores, vec![0, 10]);
    }
}
