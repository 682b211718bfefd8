//! Hydration snapshot of the whole game for one viewer.
//!
//! Correct answers stay hidden from non-admin viewers until the host reveals
//! them, and other participants' answers stay hidden until the question ends.

use super::{Game, GameState};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub players: BTreeMap<Username, ParticipantView>,
    pub all_questions: Vec<Question>,
    pub current_question: Question,
    pub total_questions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_user: Option<ParticipantView>,
}

fn redact(question: &Question, viewer: Option<&Participant>) -> Question {
    let mut question = question.clone();
    if viewer.is_some_and(|v| v.is_admin) {
        return question;
    }
    if !question.show_answer {
        question.correct_answers.clear();
    }
    if !question.is_timed_out {
        question
            .answers
            .retain(|a| viewer.is_some_and(|v| v.username == a.username));
    }
    question
}

impl Game {
    fn snapshot(&self, viewer: Option<&str>) -> GameSnapshot {
        let viewer = viewer.and_then(|u| self.participants.get(u));

        let players: BTreeMap<Username, ParticipantView> = self
            .leaderboard()
            .into_iter()
            .filter_map(|entry| {
                let participant = self.participants.get(&entry.username)?.clone();
                Some((
                    entry.username,
                    ParticipantView {
                        participant,
                        score: entry.score,
                        percent: entry.percent,
                    },
                ))
            })
            .collect();

        GameSnapshot {
            current_user: viewer.and_then(|v| players.get(&v.username).cloned()),
            players,
            all_questions: self.questions.iter().map(|q| redact(q, viewer)).collect(),
            current_question: redact(self.current(), viewer),
            total_questions: self.questions.len(),
        }
    }

    /// Count down the viewer's ephemeral message
    fn tick_message(&mut self, username: &str) {
        if let Some(p) = self.participants.get_mut(username) {
            p.message_ticks = p.message_ticks.saturating_sub(1);
            if p.message_ticks == 0 {
                p.message = None;
            }
        }
    }
}

impl GameState {
    /// Full state as seen by `viewer` (None for anonymous observers)
    pub async fn snapshot(&self, viewer: Option<&str>) -> GameSnapshot {
        let mut game = self.lock().await;
        let snapshot = game.snapshot(viewer);
        if let Some(username) = viewer {
            game.tick_message(username);
        }
        snapshot
    }
}
