mod answer;
mod question;
mod roster;
mod score;
pub mod snapshot;

use crate::catalog::CatalogError;
use crate::clock::{Clock, SystemClock};
use crate::types::*;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockWriteGuard};

pub use answer::{SubmitError, Submission};
pub use snapshot::GameSnapshot;

/// Everything guarded by the game lock: roster, catalog and cursor
#[derive(Debug, Clone)]
pub struct Game {
    pub participants: HashMap<Username, Participant>,
    pub questions: Vec<Question>,
    /// 1-based; `None` until the host first moves it
    pub cursor: Option<QuestionNumber>,
}

impl Game {
    fn new(questions: Vec<Question>) -> Self {
        Self {
            participants: HashMap::new(),
            questions,
            cursor: None,
        }
    }

    /// Cursor clamped into the catalog, defaulting to the first question
    fn cursor(&self) -> QuestionNumber {
        self.cursor.unwrap_or(1).clamp(1, self.questions.len())
    }

    fn current(&self) -> &Question {
        &self.questions[self.cursor() - 1]
    }

    fn current_mut(&mut self) -> &mut Question {
        let idx = self.cursor() - 1;
        &mut self.questions[idx]
    }

    fn question_mut(&mut self, number: QuestionNumber) -> Option<&mut Question> {
        number
            .checked_sub(1)
            .and_then(move |idx| self.questions.get_mut(idx))
    }

    /// Pre-read hook run under the write lock before every operation.
    ///
    /// The question timer is pull-based: there is no scheduler, so expiry is
    /// only observed when somebody touches the state. The latency of the
    /// timed-out transition is bounded by the slowest client poll interval,
    /// and a question nobody reads stays "running" past its limit until the
    /// next read. Swapping this for a scheduled check only needs to change
    /// this function and `GameState::lock`.
    fn decorate(&mut self, now: DateTime<Utc>) {
        let idx = self.cursor() - 1;
        let participants = &self.participants;
        let question = &mut self.questions[idx];

        let Some(started) = question.time_started else {
            return;
        };

        let remaining = f64::from(question.time_limit) - elapsed_secs(started, now);

        let mut players = participants.values().filter(|p| p.is_player()).peekable();
        let everyone_answered =
            players.peek().is_some() && players.all(|p| question.has_answer_from(&p.username));

        if remaining <= 0.0 || everyone_answered {
            end_question(question);
            tracing::info!(
                question = question.question_number,
                everyone_answered,
                "Question timed out"
            );
        } else {
            question.time_left = remaining.floor() as u32;
        }
    }
}

/// The question-ended transition shared by timeouts and forced stops
fn end_question(question: &mut Question) {
    question.time_started = None;
    question.time_left = 0;
    question.is_timed_out = true;
}

fn elapsed_secs(since: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - since).num_milliseconds() as f64 / 1000.0
}

/// Shared, authoritative game state.
///
/// One coarse lock covers the roster, the catalog and the cursor. Every
/// operation, reads included, takes it exclusively because `decorate` may
/// fire the timeout transition.
#[derive(Clone)]
pub struct GameState {
    game: Arc<RwLock<Game>>,
    clock: Arc<dyn Clock>,
}

impl GameState {
    pub fn new(questions: Vec<Question>) -> Result<Self, CatalogError> {
        Self::with_clock(questions, Arc::new(SystemClock))
    }

    pub fn with_clock(
        questions: Vec<Question>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CatalogError> {
        if questions.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(Self {
            game: Arc::new(RwLock::new(Game::new(questions))),
            clock,
        })
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Take the game lock with the timer check already applied
    async fn lock(&self) -> RwLockWriteGuard<'_, Game> {
        let mut game = self.game.write().await;
        game.decorate(self.now());
        game
    }

    pub async fn total_questions(&self) -> usize {
        self.lock().await.questions.len()
    }

    /// Current cursor position (1-based)
    pub async fn cursor(&self) -> QuestionNumber {
        self.lock().await.cursor()
    }

    pub async fn question(&self, number: QuestionNumber) -> Option<Question> {
        self.lock().await.question_mut(number).cloned()
    }
}
