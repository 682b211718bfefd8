//! Cursor movement and the per-question clock.
//!
//! A question is Idle (no start time), Running (start time set) or TimedOut
//! (no start time, nothing left, `is_timed_out`). Pausing drops the start
//! time but keeps the remaining seconds; unpausing back-dates a synthetic
//! start so the elapsed-time arithmetic picks up where it left off.

use super::{elapsed_secs, end_question, Game, GameState};
use crate::types::*;
use chrono::{DateTime, Duration, Utc};

fn pause(question: &mut Question, now: DateTime<Utc>) -> bool {
    let Some(started) = question.time_started.take() else {
        return false;
    };
    let elapsed = elapsed_secs(started, now).floor().max(0.0) as u32;
    question.time_left = question.time_limit.saturating_sub(elapsed);
    tracing::info!(
        question = question.question_number,
        time_left = question.time_left,
        "Question paused"
    );
    true
}

fn unpause(question: &mut Question, now: DateTime<Utc>) -> bool {
    if question.is_running() || question.time_left == 0 {
        return false;
    }
    let already_elapsed = question.time_limit.saturating_sub(question.time_left);
    question.time_started = Some(now - Duration::seconds(i64::from(already_elapsed)));
    tracing::info!(
        question = question.question_number,
        time_left = question.time_left,
        "Question resumed"
    );
    true
}

impl Game {
    /// Move the cursor, clamped to the catalog. Returns true if it moved.
    ///
    /// A question left running is paused so its clock does not keep going
    /// while nobody looks at it.
    fn move_cursor(&mut self, target: isize, now: DateTime<Utc>) -> bool {
        let current = self.cursor();
        self.cursor = Some(current);

        let target = target.clamp(1, self.questions.len() as isize) as QuestionNumber;
        if target == current {
            return false;
        }

        pause(self.current_mut(), now);
        self.cursor = Some(target);
        let question = self.current_mut();
        question.is_timed_out = false;
        question.show_answer = false;
        true
    }
}

impl GameState {
    /// The question under the cursor
    pub async fn current_question(&self) -> Question {
        self.lock().await.current().clone()
    }

    pub async fn advance_question(&self) -> QuestionNumber {
        let now = self.now();
        let mut game = self.lock().await;
        let target = game.cursor() as isize + 1;
        if game.move_cursor(target, now) {
            tracing::info!(question = game.cursor(), "Advanced to question");
        }
        game.cursor()
    }

    pub async fn retreat_question(&self) -> QuestionNumber {
        let now = self.now();
        let mut game = self.lock().await;
        let target = game.cursor() as isize - 1;
        if game.move_cursor(target, now) {
            tracing::info!(question = game.cursor(), "Went back to question");
        }
        game.cursor()
    }

    /// Start (or restart) the current question's clock. Answers are kept.
    pub async fn start_question(&self) {
        let now = self.now();
        let mut game = self.lock().await;
        let question = game.current_mut();
        question.time_started = Some(now);
        question.time_left = question.time_limit;
        question.is_timed_out = false;
        tracing::info!(
            question = question.question_number,
            time_limit = question.time_limit,
            "Question started"
        );
    }

    pub async fn pause_question(&self) {
        let now = self.now();
        pause(self.lock().await.current_mut(), now);
    }

    pub async fn unpause_question(&self) {
        let now = self.now();
        unpause(self.lock().await.current_mut(), now);
    }

    /// Pause a running question, resume a paused one
    pub async fn toggle_pause(&self) {
        let now = self.now();
        let mut game = self.lock().await;
        let question = game.current_mut();
        if !pause(question, now) {
            unpause(question, now);
        }
    }

    /// Force the current question to end now
    pub async fn stop_question(&self) {
        let mut game = self.lock().await;
        let question = game.current_mut();
        end_question(question);
        tracing::info!(question = question.question_number, "Question stopped");
    }

    /// Reveal the correct answer. Only allowed once the question has timed out.
    pub async fn reveal_answer(&self) -> bool {
        let mut game = self.lock().await;
        let question = game.current_mut();
        if !question.is_timed_out {
            tracing::debug!(
                question = question.question_number,
                "Ignoring reveal before timeout"
            );
            return false;
        }
        question.show_answer = true;
        true
    }
}
