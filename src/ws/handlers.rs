//! WebSocket message dispatch
//!
//! Each connection's inbound messages are handled one at a time, in arrival order.
//! Failures become an `error` message for the originating connection only.

use crate::broadcast::ClientSender;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::types::{ConnectionId, User};
use std::sync::Arc;

/// An authenticated connection
#[derive(Debug, Clone)]
pub struct Session {
    pub connection_id: ConnectionId,
    pub user: User,
    /// Outbound queue shared with every room this connection joins
    pub outbound: ClientSender,
}

/// Handle client messages and return an optional direct reply
pub async fn handle_message(
    msg: ClientMessage,
    session: &Session,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::Join { game_id } => {
            match state
                .subscribe_connection(
                    &session.user.id,
                    &session.connection_id,
                    session.outbound.clone(),
                    game_id.as_deref(),
                )
                .await
            {
                Ok(game_id) => Some(ServerMessage::Joined { game_id }),
                Err(e) => {
                    tracing::debug!(
                        connection_id = %session.connection_id,
                        code = e.code(),
                        "Join rejected"
                    );
                    Some(ServerMessage::from(e))
                }
            }
        }

        ClientMessage::ReactionSend { game_id, emoji } => {
            match state
                .send_reaction(&session.user, game_id.as_deref(), &emoji)
                .await
            {
                // The sender sees its own reaction through the room
                Ok(_) => None,
                Err(e) => Some(ServerMessage::from(e)),
            }
        }
    }
}
