//! Server-side answer scoring.
//!
//! Clients send only what the player entered. Points are always computed
//! here from the question under the cursor, never taken from the request.

use crate::types::{Question, QuestionKind};

/// Pixels-to-miles factor for geolocation comments
pub const DEFAULT_MAP_SCALE: f64 = 3.4;

/// Longest raw answer accepted from a client
pub const MAX_ANSWER_LEN: usize = 500;

/// Share of the available points lost by answering at the last moment
const TIME_PENALTY_SHARE: f64 = 0.05;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoringError {
    #[error("answer is empty")]
    Empty,
    #[error("answer is longer than {MAX_ANSWER_LEN} characters")]
    TooLong,
    #[error("{0:?} is not one of the choices")]
    UnknownChoice(String),
    #[error("expected coordinates as \"x,y\", got {0:?}")]
    BadCoordinates(String),
    #[error("question {0} cannot be scored")]
    Unscorable(usize),
}

/// The stored form of a scored answer
#[derive(Debug, Clone, PartialEq)]
pub struct Scored {
    pub answer: String,
    pub comment: String,
    pub points: f64,
}

/// Score a raw answer against `question`, including the time penalty
pub fn score_answer(question: &Question, raw: &str, map_scale: f64) -> Result<Scored, ScoringError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ScoringError::Empty);
    }
    if raw.chars().count() > MAX_ANSWER_LEN {
        return Err(ScoringError::TooLong);
    }

    let mut scored = match question.kind {
        QuestionKind::FreeText => score_free_text(question, raw),
        QuestionKind::MultiChoice => score_multi_choice(question, raw)?,
        QuestionKind::ClickTarget | QuestionKind::Geolocation => {
            score_click(question, raw, map_scale)?
        }
    };
    scored.points = apply_time_penalty(question, scored.points);
    Ok(scored)
}

/// Correct answers lose up to 5% of the available points the longer the
/// player took
pub fn apply_time_penalty(question: &Question, points: f64) -> f64 {
    if points <= 0.0 || question.time_limit == 0 {
        return points;
    }
    let used = 1.0 - f64::from(question.time_left) / f64::from(question.time_limit);
    points - used.clamp(0.0, 1.0) * TIME_PENALTY_SHARE * question.points_available
}

fn score_free_text(question: &Question, raw: &str) -> Scored {
    let guess = raw.to_lowercase();
    let max_distance = question.penalisation_factor.unwrap_or(0.0).max(0.0);

    let mut best: Option<(usize, f64)> = None;
    for correct in &question.correct_answers {
        let correct = correct.trim().to_lowercase();
        let distance = fuzzy_distance(&guess, &correct);
        let longest = guess.chars().count().max(correct.chars().count()).max(1);
        let similarity = 1.0 - distance as f64 / longest as f64;
        if best.is_none_or(|(d, _)| distance < d) {
            best = Some((distance, similarity));
        }
    }

    let (distance, similarity) = best.unwrap_or((usize::MAX, 0.0));
    let correct = if max_distance == 0.0 {
        distance == 0
    } else {
        distance as f64 <= max_distance
    };

    Scored {
        answer: raw.to_string(),
        comment: format!("Similarity: {}%", (similarity * 100.0).round()),
        points: if correct { question.points_available } else { 0.0 },
    }
}

fn score_multi_choice(question: &Question, raw: &str) -> Result<Scored, ScoringError> {
    if !question.choices.is_empty() && !question.choices.iter().any(|c| c.trim() == raw) {
        return Err(ScoringError::UnknownChoice(raw.to_string()));
    }
    let correct = question
        .correct_answers
        .first()
        .ok_or(ScoringError::Unscorable(question.question_number))?;

    let right = correct.trim() == raw;
    Ok(Scored {
        answer: raw.to_string(),
        comment: if right { "yes" } else { "no" }.to_string(),
        points: if right { question.points_available } else { 0.0 },
    })
}

fn score_click(question: &Question, raw: &str, map_scale: f64) -> Result<Scored, ScoringError> {
    let (x, y) = parse_point(raw).ok_or_else(|| ScoringError::BadCoordinates(raw.to_string()))?;
    let unscorable = || ScoringError::Unscorable(question.question_number);
    let (cx, cy) = question
        .correct_answers
        .first()
        .and_then(|c| parse_point(c))
        .ok_or_else(unscorable)?;
    let (width, height) = question
        .image_width
        .zip(question.image_height)
        .ok_or_else(unscorable)?;

    let distance = (x - cx).hypot(y - cy);
    let max_error = [(0.0, 0.0), (width, 0.0), (0.0, height), (width, height)]
        .iter()
        .map(|(px, py)| (cx - px).hypot(cy - py))
        .fold(0.0, f64::max);

    let accuracy = if max_error > 0.0 {
        (-10.0 * distance / max_error).exp()
    } else if distance == 0.0 {
        1.0
    } else {
        0.0
    };
    let points = ((question.points_available * accuracy * 10.0).round() / 10.0).max(0.0);

    let comment = if question.kind == QuestionKind::Geolocation {
        format!("{} miles off", (distance * map_scale).round())
    } else {
        format!("{} pixels away", distance.round())
    };

    Ok(Scored {
        answer: format!("{:.0} - {:.0}", x, y),
        comment,
        points,
    })
}

/// Parse "x,y" with optional whitespace into finite coordinates
pub fn parse_point(raw: &str) -> Option<(f64, f64)> {
    let (x, y) = raw.split_once(',')?;
    let x: f64 = x.trim().parse().ok()?;
    let y: f64 = y.trim().parse().ok()?;
    (x.is_finite() && y.is_finite()).then_some((x, y))
}

/// Smallest edit distance between the shorter string and any equally long
/// window of the longer one
fn fuzzy_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (shorter, longer) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };

    (0..=longer.len() - shorter.len())
        .map(|i| levenshtein(shorter, &longer[i..i + shorter.len()]))
        .min()
        .unwrap_or(0)
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j]
            } else {
                1 + prev[j].min(prev[j + 1]).min(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
