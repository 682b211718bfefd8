use super::{Game, GameState};
use crate::types::*;

/// Normalized 1..=100 display metric derived from a running score
fn percent(score: f64, available: f64) -> f64 {
    let ratio = if available > 0.0 {
        (100.0 * score / available).clamp(0.0, 100.0)
    } else {
        0.0
    };
    (100.0 - ratio).clamp(1.0, 100.0)
}

impl Game {
    /// Sum of every answer row for a username across the whole catalog
    pub(super) fn score_of(&self, username: &str) -> f64 {
        self.questions.iter().map(|q| q.points_for(username)).sum()
    }

    /// Points on offer from the first question up to the cursor
    pub(super) fn points_available(&self) -> f64 {
        self.questions[..self.cursor()]
            .iter()
            .map(|q| q.points_available)
            .sum()
    }

    pub(super) fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let available = self.points_available();
        let mut entries: Vec<LeaderboardEntry> = self
            .participants
            .values()
            .map(|p| {
                let score = self.score_of(&p.username);
                LeaderboardEntry {
                    username: p.username.clone(),
                    score,
                    percent: percent(score, available),
                    is_admin: p.is_admin,
                    is_spectator: p.is_spectator,
                }
            })
            .collect();

        entries.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.username.cmp(&b.username))
        });
        entries
    }
}

impl GameState {
    /// Scores derived from the answer log, highest first
    pub async fn compute_leaderboard(&self) -> Vec<LeaderboardEntry> {
        self.lock().await.leaderboard()
    }
}
