use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::snapshot::{StoreSnapshot, SNAPSHOT_SCHEMA_VERSION};
use super::{Store, StoreError, StoreResult};
use crate::types::*;

/// Safe character set for access codes (excludes 0/O, 1/I/L to avoid confusion)
const CODE_CHARS: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const CODE_LENGTH: usize = 6;

fn generate_access_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_CHARS[rng.random_range(0..CODE_CHARS.len())] as char)
        .collect()
}

/// Process-local store gateway backed by hash maps.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<UserId, User>>,
    games: RwLock<HashMap<GameId, Game>>,
    participants: RwLock<HashMap<(GameId, UserId), GameParticipant>>,
    categories: RwLock<HashMap<CategoryId, Category>>,
    nominations: RwLock<HashMap<NominationId, Nomination>>,
    picks: RwLock<HashMap<(GameId, UserId, CategoryId), Pick>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, name: Option<&str>, email: &str) -> User {
        let user = User {
            id: ulid::Ulid::new().to_string(),
            name: name.map(str::to_string),
            email: email.to_string(),
            image: None,
        };
        self.users
            .write()
            .await
            .insert(user.id.clone(), user.clone());
        user
    }

    /// Create a game in SETUP with a fresh, unique access code
    pub async fn add_game(&self, event_id: &str, name: &str) -> Game {
        let mut games = self.games.write().await;
        let access_code = loop {
            let code = generate_access_code();
            if !games.values().any(|g| g.access_code == code) {
                break code;
            }
        };

        let game = Game {
            id: ulid::Ulid::new().to_string(),
            name: name.to_string(),
            status: GameStatus::Setup,
            access_code,
            picks_lock_at: None,
            event_id: event_id.to_string(),
        };
        games.insert(game.id.clone(), game.clone());
        game
    }

    pub async fn add_category(&self, event_id: &str, name: &str, points: u32) -> Category {
        let category = Category {
            id: ulid::Ulid::new().to_string(),
            event_id: event_id.to_string(),
            name: name.to_string(),
            points,
            is_revealed: false,
            winner_nomination_id: None,
        };
        self.categories
            .write()
            .await
            .insert(category.id.clone(), category.clone());
        category
    }

    pub async fn add_nomination(&self, category_id: &str, work_title: &str) -> Nomination {
        let nomination = Nomination {
            id: ulid::Ulid::new().to_string(),
            category_id: category_id.to_string(),
            work_title: Some(work_title.to_string()),
            person_name: None,
        };
        self.nominations
            .write()
            .await
            .insert(nomination.id.clone(), nomination.clone());
        nomination
    }

    pub async fn set_picks_lock_at(
        &self,
        game_id: &str,
        lock_at: Option<DateTime<Utc>>,
    ) -> StoreResult<Game> {
        let mut games = self.games.write().await;
        let game = games
            .get_mut(game_id)
            .ok_or_else(|| StoreError::missing("game", game_id))?;
        game.picks_lock_at = lock_at;
        Ok(game.clone())
    }

    /// Store a draft winner without revealing it
    pub async fn set_draft_winner(
        &self,
        category_id: &str,
        nomination_id: &str,
    ) -> StoreResult<Category> {
        let mut categories = self.categories.write().await;
        let category = categories
            .get_mut(category_id)
            .ok_or_else(|| StoreError::missing("category", category_id))?;
        category.winner_nomination_id = Some(nomination_id.to_string());
        Ok(category.clone())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_game_by_id(&self, game_id: &str) -> StoreResult<Option<Game>> {
        Ok(self.games.read().await.get(game_id).cloned())
    }

    async fn find_game_by_access_code(&self, access_code: &str) -> StoreResult<Option<Game>> {
        Ok(self
            .games
            .read()
            .await
            .values()
            .find(|g| g.access_code == access_code)
            .cloned())
    }

    async fn find_games_for_event(&self, event_id: &str) -> StoreResult<Vec<Game>> {
        let mut games: Vec<_> = self
            .games
            .read()
            .await
            .values()
            .filter(|g| g.event_id == event_id)
            .cloned()
            .collect();
        games.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(games)
    }

    async fn update_game_status(&self, game_id: &str, status: GameStatus) -> StoreResult<Game> {
        let mut games = self.games.write().await;
        let game = games
            .get_mut(game_id)
            .ok_or_else(|| StoreError::missing("game", game_id))?;
        game.status = status;
        Ok(game.clone())
    }

    async fn find_user_by_id(&self, user_id: &str) -> StoreResult<Option<User>> {
        Ok(self.users.read().await.get(user_id).cloned())
    }

    async fn find_participant(
        &self,
        user_id: &str,
        game_id: &str,
    ) -> StoreResult<Option<GameParticipant>> {
        Ok(self
            .participants
            .read()
            .await
            .get(&(game_id.to_string(), user_id.to_string()))
            .cloned())
    }

    async fn create_participant(
        &self,
        user_id: &str,
        game_id: &str,
    ) -> StoreResult<GameParticipant> {
        let mut participants = self.participants.write().await;
        let participant = participants
            .entry((game_id.to_string(), user_id.to_string()))
            .or_insert_with(|| GameParticipant {
                user_id: user_id.to_string(),
                game_id: game_id.to_string(),
                joined_at: Utc::now(),
            });
        Ok(participant.clone())
    }

    async fn find_participants_for_game(&self, game_id: &str) -> StoreResult<Vec<User>> {
        let mut memberships: Vec<_> = self
            .participants
            .read()
            .await
            .values()
            .filter(|p| p.game_id == game_id)
            .cloned()
            .collect();
        memberships.sort_by(|a, b| a.joined_at.cmp(&b.joined_at));

        let users = self.users.read().await;
        Ok(memberships
            .iter()
            .filter_map(|p| users.get(&p.user_id).cloned())
            .collect())
    }

    async fn find_picks_for_game(&self, game_id: &str) -> StoreResult<Vec<Pick>> {
        Ok(self
            .picks
            .read()
            .await
            .values()
            .filter(|p| p.game_id == game_id)
            .cloned()
            .collect())
    }

    async fn upsert_pick(
        &self,
        game_id: &str,
        user_id: &str,
        category_id: &str,
        nomination_id: &str,
    ) -> StoreResult<Pick> {
        let pick = Pick {
            game_id: game_id.to_string(),
            user_id: user_id.to_string(),
            category_id: category_id.to_string(),
            nomination_id: nomination_id.to_string(),
            updated_at: Utc::now(),
        };
        self.picks.write().await.insert(
            (
                game_id.to_string(),
                user_id.to_string(),
                category_id.to_string(),
            ),
            pick.clone(),
        );
        Ok(pick)
    }

    async fn find_category_by_id(&self, category_id: &str) -> StoreResult<Option<Category>> {
        Ok(self.categories.read().await.get(category_id).cloned())
    }

    async fn find_categories_for_event(&self, event_id: &str) -> StoreResult<Vec<Category>> {
        let mut categories: Vec<_> = self
            .categories
            .read()
            .await
            .values()
            .filter(|c| c.event_id == event_id)
            .cloned()
            .collect();
        categories.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(categories)
    }

    async fn mark_category_winner(
        &self,
        category_id: &str,
        nomination_id: &str,
    ) -> StoreResult<Category> {
        let mut categories = self.categories.write().await;
        let category = categories
            .get_mut(category_id)
            .ok_or_else(|| StoreError::missing("category", category_id))?;
        category.winner_nomination_id = Some(nomination_id.to_string());
        category.is_revealed = true;
        Ok(category.clone())
    }

    async fn clear_category_winner(&self, category_id: &str) -> StoreResult<Category> {
        let mut categories = self.categories.write().await;
        let category = categories
            .get_mut(category_id)
            .ok_or_else(|| StoreError::missing("category", category_id))?;
        category.winner_nomination_id = None;
        category.is_revealed = false;
        Ok(category.clone())
    }

    async fn find_nomination_by_id(
        &self,
        nomination_id: &str,
    ) -> StoreResult<Option<Nomination>> {
        Ok(self.nominations.read().await.get(nomination_id).cloned())
    }

    async fn export_snapshot(&self) -> StoreResult<StoreSnapshot> {
        let mut participants: Vec<_> = self.participants.read().await.values().cloned().collect();
        participants.sort_by(|a, b| a.joined_at.cmp(&b.joined_at));

        Ok(StoreSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            exported_at: Utc::now().to_rfc3339(),
            users: self.users.read().await.values().cloned().collect(),
            games: self.games.read().await.values().cloned().collect(),
            participants,
            categories: self.categories.read().await.values().cloned().collect(),
            nominations: self.nominations.read().await.values().cloned().collect(),
            picks: self.picks.read().await.values().cloned().collect(),
        })
    }

    async fn import_snapshot(&self, snapshot: StoreSnapshot) -> StoreResult<()> {
        snapshot
            .validate()
            .map_err(|e| StoreError::from_source("snapshot rejected", e))?;

        // Lock in a fixed order so concurrent imports cannot deadlock
        let mut users = self.users.write().await;
        let mut games = self.games.write().await;
        let mut participants = self.participants.write().await;
        let mut categories = self.categories.write().await;
        let mut nominations = self.nominations.write().await;
        let mut picks = self.picks.write().await;

        *users = snapshot
            .users
            .into_iter()
            .map(|u| (u.id.clone(), u))
            .collect();
        *games = snapshot
            .games
            .into_iter()
            .map(|g| (g.id.clone(), g))
            .collect();
        *participants = snapshot
            .participants
            .into_iter()
            .map(|p| ((p.game_id.clone(), p.user_id.clone()), p))
            .collect();
        *categories = snapshot
            .categories
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();
        *nominations = snapshot
            .nominations
            .into_iter()
            .map(|n| (n.id.clone(), n))
            .collect();
        *picks = snapshot
            .picks
            .into_iter()
            .map(|p| {
                (
                    (p.game_id.clone(), p.user_id.clone(), p.category_id.clone()),
                    p,
                )
            })
            .collect();

        tracing::info!(
            games = games.len(),
            users = users.len(),
            picks = picks.len(),
            "Store snapshot imported"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_access_codes_are_unique() {
        let store = MemoryStore::new();
        let a = store.add_game("oscars", "Office pool").await;
        let b = store.add_game("oscars", "Family pool").await;

        assert_eq!(a.access_code.len(), CODE_LENGTH);
        assert_ne!(a.access_code, b.access_code);
        let found = store
            .find_game_by_access_code(&b.access_code)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, b.id);
    }

    #[tokio::test]
    async fn test_create_participant_is_idempotent() {
        let store = MemoryStore::new();
        let user = store.add_user(Some("Ada"), "ada@example.com").await;
        let game = store.add_game("oscars", "Pool").await;

        let first = store.create_participant(&user.id, &game.id).await.unwrap();
        let second = store.create_participant(&user.id, &game.id).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(
            store.find_participants_for_game(&game.id).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_winner_and_reveal_change_together() {
        let store = MemoryStore::new();
        let category = store.add_category("oscars", "Best Picture", 10).await;
        let nomination = store.add_nomination(&category.id, "Anora").await;

        let marked = store
            .mark_category_winner(&category.id, &nomination.id)
            .await
            .unwrap();
        assert!(marked.is_revealed);
        assert_eq!(marked.winner_nomination_id, Some(nomination.id.clone()));

        let cleared = store.clear_category_winner(&category.id).await.unwrap();
        assert!(!cleared.is_revealed);
        assert_eq!(cleared.winner_nomination_id, None);
    }

    #[tokio::test]
    async fn test_update_missing_game_fails() {
        let store = MemoryStore::new();
        let result = store.update_game_status("nope", GameStatus::Open).await;
        assert!(matches!(result, Err(StoreError::Missing { entity: "game", .. })));
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_keeps_picks() {
        let store = MemoryStore::new();
        let user = store.add_user(None, "bo@example.com").await;
        let game = store.add_game("oscars", "Pool").await;
        let category = store.add_category("oscars", "Best Director", 5).await;
        let nomination = store.add_nomination(&category.id, "The Brutalist").await;
        store.create_participant(&user.id, &game.id).await.unwrap();
        store
            .upsert_pick(&game.id, &user.id, &category.id, &nomination.id)
            .await
            .unwrap();

        let snapshot = store.export_snapshot().await.unwrap();
        let restored = MemoryStore::new();
        restored.import_snapshot(snapshot).await.unwrap();

        let picks = restored.find_picks_for_game(&game.id).await.unwrap();
        assert_eq!(picks.len(), 1);
        assert_eq!(picks[0].nomination_id, nomination.id);
        assert!(restored
            .find_participant(&user.id, &game.id)
            .await
            .unwrap()
            .is_some());
    }
}
