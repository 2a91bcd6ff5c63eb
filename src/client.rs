//! Reconnecting websocket subscriber for game rooms.
//!
//! The server never retries anything for a dropped connection. This client keeps one
//! connection alive with exponential backoff, re-sends `join` for every room it joined after
//! each reconnect, remembers the latest leaderboard per game and re-publishes every server
//! event to local listeners.

use futures::{SinkExt, StreamExt};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use crate::protocol::{ClientMessage, ServerMessage};
use crate::types::{GameId, LeaderboardPlayer, UserId};

const COMMAND_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("subscriber has shut down")]
    Closed,
}

/// Reconnection backoff configuration.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub initial_delay: Duration,
    /// Growth factor applied per failed attempt (2.0 doubles the delay)
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Consecutive failed attempts before giving up (None = retry forever)
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

impl ReconnectConfig {
    /// Delay before the given 1-based retry attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(scaled)
        }
    }
}

/// What local listeners see
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriberEvent {
    Connected,
    Disconnected,
    /// Reconnection attempts exhausted; the subscriber has stopped
    GaveUp,
    Message(ServerMessage),
}

/// Rooms joined plus the most recent data the server pushed for each
#[derive(Debug, Default, Clone)]
pub struct SubscriberState {
    pub rooms: BTreeSet<GameId>,
    pub leaderboards: HashMap<GameId, Vec<LeaderboardPlayer>>,
    pub completed: HashSet<GameId>,
}

impl SubscriberState {
    pub fn apply(&mut self, msg: &ServerMessage) {
        match msg {
            ServerMessage::LeaderboardUpdate {
                game_id, players, ..
            } => {
                self.leaderboards.insert(game_id.clone(), players.clone());
            }
            ServerMessage::GameCompleted { game_id, .. } => {
                self.completed.insert(game_id.clone());
            }
            ServerMessage::Joined { .. }
            | ServerMessage::ReactionBroadcast { .. }
            | ServerMessage::Error { .. } => {}
        }
    }
}

#[derive(Debug)]
enum Command {
    Join(GameId),
    Reaction { game_id: GameId, emoji: String },
    Shutdown,
}

enum SessionEnd {
    Shutdown,
    Disconnected,
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub struct ReconnectingSubscriber {
    base_url: String,
    user_id: UserId,
    config: ReconnectConfig,
}

impl ReconnectingSubscriber {
    /// `base_url` is the websocket origin, e.g. `ws://127.0.0.1:7878`
    pub fn new(base_url: impl Into<String>, user_id: impl Into<UserId>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_id: user_id.into(),
            config: ReconnectConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ReconnectConfig) -> Self {
        self.config = config;
        self
    }

    fn url(&self) -> String {
        format!("{}/ws?userId={}", self.base_url, self.user_id)
    }

    /// Start the connection task
    pub fn spawn(self) -> SubscriberHandle {
        let (commands, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let state = Arc::new(RwLock::new(SubscriberState::default()));

        let task = tokio::spawn(self.run(command_rx, state.clone(), events.clone()));

        SubscriberHandle {
            commands,
            state,
            events,
            task,
        }
    }

    async fn run(
        self,
        mut commands: mpsc::Receiver<Command>,
        state: Arc<RwLock<SubscriberState>>,
        events: broadcast::Sender<SubscriberEvent>,
    ) {
        let url = self.url();
        let mut failures = 0u32;

        loop {
            match connect_async(url.as_str()).await {
                Ok((stream, _)) => {
                    failures = 0;
                    tracing::info!(user_id = %self.user_id, "Subscriber connected");
                    let _ = events.send(SubscriberEvent::Connected);

                    match session(stream, &mut commands, &state, &events).await {
                        SessionEnd::Shutdown => return,
                        SessionEnd::Disconnected => {
                            tracing::info!(user_id = %self.user_id, "Subscriber disconnected");
                            let _ = events.send(SubscriberEvent::Disconnected);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(user_id = %self.user_id, error = %e, "Subscriber connect failed");
                }
            }

            failures += 1;
            if self.config.max_attempts.is_some_and(|max| failures > max) {
                tracing::warn!(user_id = %self.user_id, failures, "Subscriber giving up");
                let _ = events.send(SubscriberEvent::GaveUp);
                return;
            }

            let delay = self.config.delay_for_attempt(failures);
            tracing::debug!(attempt = failures, ?delay, "Reconnecting after delay");
            if !wait_offline(delay, &mut commands, &state).await {
                return;
            }
        }
    }
}

/// Sleep out a backoff delay while still accepting commands.
/// Joins are remembered for the next connection; reactions are dropped.
/// Returns false on shutdown.
async fn wait_offline(
    delay: Duration,
    commands: &mut mpsc::Receiver<Command>,
    state: &RwLock<SubscriberState>,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            cmd = commands.recv() => match cmd {
                None | Some(Command::Shutdown) => return false,
                Some(Command::Join(game_id)) => {
                    state.write().await.rooms.insert(game_id);
                }
                Some(Command::Reaction { game_id, .. }) => {
                    tracing::debug!(game_id, "Dropping reaction while offline");
                }
            },
        }
    }
}

async fn send_message(
    write: &mut futures::stream::SplitSink<WsStream, WsMessage>,
    msg: &ClientMessage,
) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => write.send(WsMessage::Text(json)).await.is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize client message");
            true
        }
    }
}

async fn session(
    stream: WsStream,
    commands: &mut mpsc::Receiver<Command>,
    state: &RwLock<SubscriberState>,
    events: &broadcast::Sender<SubscriberEvent>,
) -> SessionEnd {
    let (mut write, mut read) = stream.split();

    let rooms: Vec<GameId> = state.read().await.rooms.iter().cloned().collect();
    for game_id in rooms {
        let join = ClientMessage::Join {
            game_id: Some(game_id),
        };
        if !send_message(&mut write, &join).await {
            return SessionEnd::Disconnected;
        }
    }

    loop {
        tokio::select! {
            cmd = commands.recv() => {
                let msg = match cmd {
                    None | Some(Command::Shutdown) => {
                        let _ = write.send(WsMessage::Close(None)).await;
                        return SessionEnd::Shutdown;
                    }
                    Some(Command::Join(game_id)) => {
                        state.write().await.rooms.insert(game_id.clone());
                        ClientMessage::Join { game_id: Some(game_id) }
                    }
                    Some(Command::Reaction { game_id, emoji }) => ClientMessage::ReactionSend {
                        game_id: Some(game_id),
                        emoji,
                    },
                };
                if !send_message(&mut write, &msg).await {
                    return SessionEnd::Disconnected;
                }
            }

            incoming = read.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(msg) => {
                            state.write().await.apply(&msg);
                            let _ = events.send(SubscriberEvent::Message(msg));
                        }
                        Err(e) => tracing::warn!(error = %e, "Unparseable server message"),
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => return SessionEnd::Disconnected,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Subscriber read failed");
                    return SessionEnd::Disconnected;
                }
            },
        }
    }
}

/// Control side of a running [`ReconnectingSubscriber`]
pub struct SubscriberHandle {
    commands: mpsc::Sender<Command>,
    state: Arc<RwLock<SubscriberState>>,
    events: broadcast::Sender<SubscriberEvent>,
    task: JoinHandle<()>,
}

impl SubscriberHandle {
    /// Join a room now and after every reconnect
    pub async fn join(&self, game_id: impl Into<GameId>) -> Result<(), ClientError> {
        self.commands
            .send(Command::Join(game_id.into()))
            .await
            .map_err(|_| ClientError::Closed)
    }

    pub async fn send_reaction(
        &self,
        game_id: impl Into<GameId>,
        emoji: impl Into<String>,
    ) -> Result<(), ClientError> {
        self.commands
            .send(Command::Reaction {
                game_id: game_id.into(),
                emoji: emoji.into(),
            })
            .await
            .map_err(|_| ClientError::Closed)
    }

    /// Listen to every event from now on
    pub fn events(&self) -> broadcast::Receiver<SubscriberEvent> {
        self.events.subscribe()
    }

    pub async fn latest_leaderboard(&self, game_id: &str) -> Option<Vec<LeaderboardPlayer>> {
        self.state.read().await.leaderboards.get(game_id).cloned()
    }

    pub async fn is_completed(&self, game_id: &str) -> bool {
        self.state.read().await.completed.contains(game_id)
    }

    pub async fn rooms(&self) -> Vec<GameId> {
        self.state.read().await.rooms.iter().cloned().collect()
    }

    /// Close the connection and wait for the task to finish
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown).await;
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Subscriber task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_millis(500),
            max_attempts: None,
        };

        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(500));
        assert_eq!(config.delay_for_attempt(1000), Duration::from_millis(500));
    }

    #[test]
    fn test_state_keeps_latest_snapshot() {
        let mut state = SubscriberState::default();
        let update = |score| ServerMessage::LeaderboardUpdate {
            game_id: "g1".to_string(),
            players: vec![LeaderboardPlayer {
                user_id: "u1".to_string(),
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                image: None,
                total_score: score,
                correct_count: 1,
                rank: 1,
                is_current_user: true,
            }],
            timestamp: "t".to_string(),
        };

        state.apply(&update(5));
        state.apply(&update(15));
        assert_eq!(state.leaderboards["g1"][0].total_score, 15);
        assert!(!state.completed.contains("g1"));

        state.apply(&ServerMessage::GameCompleted {
            game_id: "g1".to_string(),
            timestamp: "t".to_string(),
        });
        assert!(state.completed.contains("g1"));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        // Nothing listens on port 9 locally
        let subscriber = ReconnectingSubscriber::new("ws://127.0.0.1:9", "u1").with_config(
            ReconnectConfig {
                initial_delay: Duration::from_millis(5),
                multiplier: 1.0,
                max_delay: Duration::from_millis(5),
                max_attempts: Some(2),
            },
        );
        let handle = subscriber.spawn();
        let mut events = handle.events();
        handle.join("g1").await.ok();

        let event = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match events.recv().await {
                    Ok(SubscriberEvent::GaveUp) => return true,
                    Ok(_) => continue,
                    Err(_) => return false,
                }
            }
        })
        .await;
        assert_eq!(event.ok(), Some(true));
    }
}
