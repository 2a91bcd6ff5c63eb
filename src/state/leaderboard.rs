//! Leaderboard scoring
//!
//! [`rank_players`] is a pure function over a snapshot of participants, picks and the
//! event's categories. [`AppState::leaderboard`] loads that snapshot from the store and is the
//! only source of standings the server ever broadcasts.

use super::AppState;
use crate::error::GameResult;
use crate::types::*;
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct Tally {
    total_score: u32,
    correct_count: u32,
    picked: u32,
}

/// Score and rank every eligible participant.
///
/// Only players with a pick in every category of the event are ranked. Revealed
/// categories award their points for a pick matching the winner; unrevealed ones are
/// skipped. Ties on (score, correct picks) share a rank and the next player gets their
/// 1-based position. Equal rows are ordered by display name (byte-wise, case-sensitive),
/// then by user id.
pub fn rank_players(
    participants: &[User],
    picks: &[Pick],
    categories: &[Category],
    viewer: Option<&str>,
) -> Vec<LeaderboardPlayer> {
    let total_categories = categories.len() as u32;
    let by_id: HashMap<&str, &Category> = categories.iter().map(|c| (c.id.as_str(), c)).collect();

    let mut tallies: HashMap<&str, Tally> = HashMap::new();
    for pick in picks {
        let Some(category) = by_id.get(pick.category_id.as_str()) else {
            continue;
        };
        let tally = tallies.entry(pick.user_id.as_str()).or_default();
        tally.picked += 1;

        if category.revealed_winner() == Some(&pick.nomination_id) {
            tally.total_score += category.points;
            tally.correct_count += 1;
        }
    }

    let mut players: Vec<LeaderboardPlayer> = participants
        .iter()
        .filter_map(|user| {
            let tally = tallies.remove(user.id.as_str()).unwrap_or_default();
            if tally.picked != total_categories {
                return None;
            }
            Some(LeaderboardPlayer {
                user_id: user.id.clone(),
                name: user.display_name().to_string(),
                email: user.email.clone(),
                image: user.image.clone(),
                total_score: tally.total_score,
                correct_count: tally.correct_count,
                rank: 0,
                is_current_user: viewer == Some(user.id.as_str()),
            })
        })
        .collect();

    players.sort_by(compare_standing);
    assign_ranks(&mut players);
    players
}

fn compare_standing(a: &LeaderboardPlayer, b: &LeaderboardPlayer) -> Ordering {
    b.total_score
        .cmp(&a.total_score)
        .then_with(|| b.correct_count.cmp(&a.correct_count))
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.user_id.cmp(&b.user_id))
}

/// rank[i] = rank[i-1] on an exact (score, correct) tie, else i + 1
fn assign_ranks(players: &mut [LeaderboardPlayer]) {
    for i in 0..players.len() {
        let tied = i > 0
            && players[i].total_score == players[i - 1].total_score
            && players[i].correct_count == players[i - 1].correct_count;
        players[i].rank = if tied {
            players[i - 1].rank
        } else {
            i as u32 + 1
        };
    }
}

impl AppState {
    /// Recompute a game's leaderboard from the store
    pub async fn leaderboard(
        &self,
        game_id: &str,
        viewer: Option<&str>,
    ) -> GameResult<Vec<LeaderboardPlayer>> {
        let game = self.load_game(game_id).await?;
        let participants = self.store.find_participants_for_game(game_id).await?;
        let picks = self.store.find_picks_for_game(game_id).await?;
        let categories = self.store.find_categories_for_event(&game.event_id).await?;

        Ok(rank_players(&participants, &picks, &categories, viewer))
    }
}
