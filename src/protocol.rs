use crate::error::GameError;
use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "t", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Subscribe this connection to a game's room
    #[serde(rename = "join")]
    Join {
        #[serde(default)]
        game_id: Option<GameId>,
    },
    #[serde(rename = "reaction:send")]
    ReactionSend {
        #[serde(default)]
        game_id: Option<GameId>,
        emoji: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "t", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Sent to the joining connection only
    #[serde(rename = "joined")]
    Joined { game_id: GameId },
    #[serde(rename = "leaderboard:update")]
    LeaderboardUpdate {
        game_id: GameId,
        players: Vec<LeaderboardPlayer>,
        timestamp: String,
    },
    #[serde(rename = "game:completed")]
    GameCompleted { game_id: GameId, timestamp: String },
    #[serde(rename = "reaction:broadcast")]
    ReactionBroadcast {
        game_id: GameId,
        user_id: UserId,
        user_name: String,
        emoji: String,
        timestamp: String,
    },
    /// Never broadcast; only sent to the connection that caused it
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl ServerMessage {
    /// Room-wide messages name the game they belong to
    pub fn game_id(&self) -> Option<&GameId> {
        match self {
            ServerMessage::Joined { game_id }
            | ServerMessage::LeaderboardUpdate { game_id, .. }
            | ServerMessage::GameCompleted { game_id, .. }
            | ServerMessage::ReactionBroadcast { game_id, .. } => Some(game_id),
            ServerMessage::Error { .. } => None,
        }
    }

    /// Mark the viewer's own row in a leaderboard update. Other messages pass through.
    pub fn for_viewer(self, viewer: &str) -> Self {
        match self {
            ServerMessage::LeaderboardUpdate {
                game_id,
                mut players,
                timestamp,
            } => {
                for player in &mut players {
                    player.is_current_user = player.user_id == viewer;
                }
                ServerMessage::LeaderboardUpdate {
                    game_id,
                    players,
                    timestamp,
                }
            }
            other => other,
        }
    }
}

impl From<&GameError> for ServerMessage {
    fn from(err: &GameError) -> Self {
        ServerMessage::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<GameError> for ServerMessage {
    fn from(err: GameError) -> Self {
        ServerMessage::from(&err)
    }
}

pub fn server_now() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_wire_names() {
        let join: ClientMessage = serde_json::from_str(r#"{"t":"join","gameId":"g1"}"#).unwrap();
        assert_eq!(
            join,
            ClientMessage::Join {
                game_id: Some("g1".to_string())
            }
        );

        let reaction: ClientMessage =
            serde_json::from_str(r#"{"t":"reaction:send","gameId":"g1","emoji":"🔥"}"#).unwrap();
        assert!(matches!(reaction, ClientMessage::ReactionSend { emoji, .. } if emoji == "🔥"));
    }

    #[test]
    fn test_join_without_game_id_parses() {
        let join: ClientMessage = serde_json::from_str(r#"{"t":"join"}"#).unwrap();
        assert_eq!(join, ClientMessage::Join { game_id: None });
    }

    #[test]
    fn test_server_message_shape() {
        let msg = ServerMessage::GameCompleted {
            game_id: "g1".to_string(),
            timestamp: "2025-03-02T00:00:00Z".to_string(),
        };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["t"], "game:completed");
        assert_eq!(json["gameId"], "g1");

        let err: ServerMessage = GameError::NotAParticipant.into();
        let json: serde_json::Value = serde_json::to_value(&err).unwrap();
        assert_eq!(json["t"], "error");
        assert_eq!(json["code"], "NOT_A_PARTICIPANT");
        assert!(json["message"].is_string());
    }

    #[test]
    fn test_for_viewer_marks_only_viewer() {
        let player = |id: &str, rank| LeaderboardPlayer {
            user_id: id.to_string(),
            name: id.to_string(),
            email: format!("{id}@example.com"),
            image: None,
            total_score: 0,
            correct_count: 0,
            rank,
            is_current_user: false,
        };
        let msg = ServerMessage::LeaderboardUpdate {
            game_id: "g1".to_string(),
            players: vec![player("a", 1), player("b", 1)],
            timestamp: server_now(),
        };

        match msg.for_viewer("b") {
            ServerMessage::LeaderboardUpdate { players, .. } => {
                assert!(!players[0].is_current_user);
                assert!(players[1].is_current_user);
            }
            other => panic!("Expected LeaderboardUpdate, got {other:?}"),
        }
    }
}
