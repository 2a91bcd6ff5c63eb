//! Reaction throttling
//!
//! Reactions are an ephemeral overlay, so a fixed window per key is enough to keep one
//! excited viewer from flooding a room. The engine keys windows by (game, user): a viewer
//! following two games gets a separate budget in each.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started: Instant,
}

#[derive(Debug)]
pub struct RateLimiter<K> {
    windows: Arc<RwLock<HashMap<K, Window>>>,
    max_per_window: u32,
    window: Duration,
}

impl<K> Clone for RateLimiter<K> {
    fn clone(&self) -> Self {
        Self {
            windows: self.windows.clone(),
            max_per_window: self.max_per_window,
            window: self.window,
        }
    }
}

impl<K> RateLimiter<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            windows: Arc::new(RwLock::new(HashMap::new())),
            max_per_window,
            window,
        }
    }

    /// Record one hit for `key`. Returns false when the key is over its limit; a rejected hit
    /// does not extend the window.
    pub async fn check(&self, key: &K) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.write().await;

        let Some(window) = windows.get_mut(key) else {
            windows.insert(
                key.clone(),
                Window {
                    count: 1,
                    started: now,
                },
            );
            return true;
        };

        if now.duration_since(window.started) >= self.window {
            *window = Window {
                count: 1,
                started: now,
            };
            return true;
        }

        if window.count >= self.max_per_window {
            return false;
        }
        window.count += 1;
        true
    }

    /// Forget windows that ended long ago
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut windows = self.windows.write().await;
        let before = windows.len();
        windows.retain(|_, window| now.duration_since(window.started) < self.window * 2);
        let pruned = before - windows.len();
        if pruned > 0 {
            tracing::debug!(pruned, remaining = windows.len(), "Pruned reaction windows");
        }
    }

    pub async fn tracked_keys(&self) -> usize {
        self.windows.read().await.len()
    }

    /// Spawn a background task that periodically prunes stale windows
    pub fn spawn_cleanup(&self) -> tokio::task::JoinHandle<()> {
        let limiter = self.clone();
        let period = (self.window * 4).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                limiter.cleanup().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(game: &str, user: &str) -> (String, String) {
        (game.to_string(), user.to_string())
    }

    #[tokio::test]
    async fn test_allows_up_to_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(5));
        let ada = key("g1", "ada");

        for _ in 0..3 {
            assert!(limiter.check(&ada).await);
        }
        assert!(!limiter.check(&ada).await);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(5));

        assert!(limiter.check(&key("g1", "ada")).await);
        assert!(!limiter.check(&key("g1", "ada")).await);
        assert!(limiter.check(&key("g1", "bob")).await);
        // Same user, other game
        assert!(limiter.check(&key("g2", "ada")).await);
    }

    #[tokio::test]
    async fn test_window_reset() {
        let limiter = RateLimiter::new(1, Duration::from_millis(50));
        let ada = key("g1", "ada");

        assert!(limiter.check(&ada).await);
        assert!(!limiter.check(&ada).await);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(limiter.check(&ada).await);
    }

    #[tokio::test]
    async fn test_cleanup_drops_stale_windows() {
        let limiter = RateLimiter::new(5, Duration::from_millis(10));
        limiter.check(&key("g1", "ada")).await;
        assert_eq!(limiter.tracked_keys().await, 1);

        tokio::time::sleep(Duration::from_millis(30)).await;
        limiter.cleanup().await;
        assert_eq!(limiter.tracked_keys().await, 0);
    }
}
