use super::{Game, GameState};
use crate::scoring::{self, Scored, ScoringError};
use crate::types::*;

fn sort_by_points(answers: &mut [Answer]) {
    answers.sort_by(|a, b| b.points.total_cmp(&a.points));
}

/// Why a live answer was turned away
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SubmitError {
    #[error("Question is not open for answers")]
    NotRunning,
    #[error(transparent)]
    Invalid(#[from] ScoringError),
}

/// A scored answer to the running question
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub question_number: QuestionNumber,
    /// False when the participant had already answered
    pub recorded: bool,
    pub scored: Scored,
}

impl Game {
    fn record_answer(&mut self, answer: Answer) -> bool {
        let Some(question) = self.question_mut(answer.question_number) else {
            tracing::warn!(
                question = answer.question_number,
                username = %answer.username,
                "Answer for unknown question"
            );
            return false;
        };

        if question.has_answer_from(&answer.username) {
            tracing::debug!(
                question = question.question_number,
                username = %answer.username,
                "Ignoring repeat answer"
            );
            return false;
        }

        tracing::info!(
            question = question.question_number,
            username = %answer.username,
            points = answer.points,
            "Answer submitted"
        );
        question.answers.push(answer);
        sort_by_points(&mut question.answers);
        true
    }
}

impl GameState {
    /// Record an answer for the question it names.
    ///
    /// Only the first answer per (question, username) is kept; repeats are
    /// dropped silently. Returns whether the answer was recorded.
    pub async fn submit_answer(&self, answer: Answer) -> bool {
        self.lock().await.record_answer(answer)
    }

    /// Score `raw` against the question under the cursor and record it.
    ///
    /// Only a running question takes answers. The clock check, the scoring
    /// (which reads the remaining time) and the append happen under one lock.
    pub async fn answer_current_question(
        &self,
        username: &str,
        raw: &str,
        map_scale: f64,
    ) -> Result<Submission, SubmitError> {
        let mut game = self.lock().await;
        let question = game.current();
        if !question.is_running() {
            return Err(SubmitError::NotRunning);
        }
        let question_number = question.question_number;
        let scored = scoring::score_answer(question, raw, map_scale)?;

        let recorded = game.record_answer(Answer {
            question_number,
            username: username.to_string(),
            answer: scored.answer.clone(),
            comment: scored.comment.clone(),
            points: scored.points,
        });
        Ok(Submission {
            question_number,
            recorded,
            scored,
        })
    }

    /// Submit a zero-point answer on a participant's behalf so the host can
    /// move on without waiting for them
    pub async fn forfeit_participant(&self, username: &str) -> bool {
        let mut game = self.lock().await;
        if !game.participants.contains_key(username) {
            return false;
        }
        let question_number = game.cursor();
        game.record_answer(Answer {
            question_number,
            username: username.to_string(),
            answer: String::new(),
            comment: FORFEIT_COMMENT.to_string(),
            points: 0.0,
        })
    }

    /// Award (positive) or dock (negative) points on the current question
    pub async fn adjust_score(&self, username: &str, delta: f64, reason: &str) -> bool {
        let mut game = self.lock().await;
        if !game.participants.contains_key(username) || !delta.is_finite() {
            return false;
        }
        let question = game.current_mut();
        question.adjustments.push(Answer {
            question_number: question.question_number,
            username: username.to_string(),
            answer: String::new(),
            comment: reason.to_string(),
            points: delta,
        });
        tracing::info!(
            question = question.question_number,
            username,
            delta,
            reason,
            "Score adjusted"
        );
        true
    }
}
