mod export;
pub mod leaderboard;
mod pick;
mod reveal;
mod room;
mod status;

pub use status::validate_transition;

use crate::broadcast::RoomBroadcaster;
use crate::config::AppConfig;
use crate::ratelimit::RateLimiter;
use crate::store::Store;
use crate::types::{GameId, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Shared application state
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub rooms: Arc<RoomBroadcaster>,
    pub reactions: RateLimiter<(GameId, UserId)>,
    pub config: AppConfig,
    game_locks: KeyedLocks,
    event_locks: KeyedLocks,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: AppConfig) -> Self {
        Self::with_rooms(store, Arc::new(RoomBroadcaster::new()), config)
    }

    pub fn with_rooms(
        store: Arc<dyn Store>,
        rooms: Arc<RoomBroadcaster>,
        config: AppConfig,
    ) -> Self {
        let reactions = RateLimiter::new(config.reaction_limit, config.reaction_window);
        Self {
            store,
            rooms,
            reactions,
            config,
            game_locks: KeyedLocks::default(),
            event_locks: KeyedLocks::default(),
        }
    }
}

/// One async mutex per key.
///
/// Game locks serialize status writes and standings recomputation for the same game.
/// Event locks serialize reveal writes with the auto-completion check. Lock order is event,
/// then game. Entries nobody holds or waits on are dropped on the next acquisition.
#[derive(Default)]
struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(key.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}
