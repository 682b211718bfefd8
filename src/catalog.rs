//! Question catalog loading.
//!
//! The catalog is read once at startup. A game without questions is not a
//! game, so every failure here is fatal to the caller.

use crate::scoring::parse_point;
use crate::types::{Question, QuestionKind};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("catalog contains no questions")]
    Empty,
    #[error("question {number} has no correct answers")]
    NoCorrectAnswer { number: usize },
    #[error("question {number} needs an \"x,y\" target and image bounds")]
    BadTarget { number: usize },
}

/// Read and validate the catalog at `path`
pub fn load_catalog(path: impl AsRef<Path>) -> Result<Vec<Question>, CatalogError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let questions = parse_catalog(&raw)?;
    tracing::info!(
        path = %path.display(),
        count = questions.len(),
        "Question catalog loaded"
    );
    Ok(questions)
}

/// Parse a JSON array of questions, numbering them by position and
/// resetting any lifecycle state the file may carry
pub fn parse_catalog(raw: &str) -> Result<Vec<Question>, CatalogError> {
    let mut questions: Vec<Question> = serde_json::from_str(raw)?;
    if questions.is_empty() {
        return Err(CatalogError::Empty);
    }

    for (idx, q) in questions.iter_mut().enumerate() {
        q.question_number = idx + 1;
        if q.correct_answers.iter().all(|a| a.trim().is_empty()) {
            return Err(CatalogError::NoCorrectAnswer {
                number: q.question_number,
            });
        }
        q.correct_answers.retain(|a| !a.trim().is_empty());
        if matches!(q.kind, QuestionKind::ClickTarget | QuestionKind::Geolocation) {
            let has_target = q.correct_answers.first().and_then(|a| parse_point(a)).is_some();
            let has_bounds = q.image_width.zip(q.image_height).is_some();
            if !has_target || !has_bounds {
                return Err(CatalogError::BadTarget {
                    number: q.question_number,
                });
            }
        }
        q.time_started = None;
        q.time_left = q.time_limit;
        q.is_timed_out = false;
        q.show_answer = false;
        q.answers.clear();
        q.adjustments.clear();
    }

    Ok(questions)
}
