use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque ID types for readability
pub type Username = String;
pub type SessionToken = String;
pub type QuestionNumber = usize;

/// Comment attached to answers synthesized when a participant gives up
pub const FORFEIT_COMMENT: &str = "forfeit";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    #[serde(alias = "text", alias = "free_text")]
    FreeText,
    #[serde(alias = "multiple_choice", alias = "multi_choice")]
    MultiChoice,
    #[serde(alias = "kazakhstan", alias = "click_target")]
    ClickTarget,
    /// Click-target on a map; distance is reported in miles
    Geolocation,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub username: Username,
    pub is_admin: bool,
    pub is_spectator: bool,
    pub ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub message_ticks: u32,
}

impl Participant {
    pub fn new(username: &str, is_admin: bool, is_spectator: bool, ip: &str) -> Self {
        Self {
            username: username.to_string(),
            is_admin,
            is_spectator,
            ip: ip.to_string(),
            message: None,
            message_ticks: 0,
        }
    }

    /// Players are the participants expected to answer every question
    pub fn is_player(&self) -> bool {
        !self.is_admin && !self.is_spectator
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub question_number: QuestionNumber,
    pub username: Username,
    pub answer: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub points: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// 1-based position in the catalog, assigned at load time
    #[serde(default)]
    pub question_number: QuestionNumber,
    pub question: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub click_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street_view: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Bounds of the click-target image in pixels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_height: Option<f64>,
    #[serde(default)]
    pub correct_answers: Vec<String>,
    pub points_available: f64,
    pub time_limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub penalisation_factor: Option<f64>,

    // Lifecycle, owned by the game state machine
    #[serde(default)]
    pub time_started: Option<DateTime<Utc>>,
    #[serde(default)]
    pub time_left: u32,
    #[serde(default)]
    pub is_timed_out: bool,
    #[serde(default)]
    pub show_answer: bool,
    #[serde(default)]
    pub answers: Vec<Answer>,
    /// Host awards and dockings, counted like answers by the leaderboard
    #[serde(default)]
    pub adjustments: Vec<Answer>,
}

impl Question {
    pub fn is_running(&self) -> bool {
        self.time_started.is_some()
    }

    pub fn has_answer_from(&self, username: &str) -> bool {
        self.answers.iter().any(|a| a.username == username)
    }

    /// Every answer row attributable to a username, adjustments included
    pub fn points_for(&self, username: &str) -> f64 {
        self.answers
            .iter()
            .chain(self.adjustments.iter())
            .filter(|a| a.username == username)
            .map(|a| a.points)
            .sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub username: Username,
    pub score: f64,
    pub percent: f64,
    pub is_admin: bool,
    pub is_spectator: bool,
}

/// A participant as seen by clients, with derived score fields
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantView {
    #[serde(flatten)]
    pub participant: Participant,
    pub score: f64,
    pub percent: f64,
}

/// Role flags remembered by a session so an ejected participant can be re-admitted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Roles {
    pub is_admin: bool,
    pub is_spectator: bool,
}

impl Roles {
    pub const HOST: Roles = Roles {
        is_admin: true,
        is_spectator: true,
    };
    pub const PLAYER: Roles = Roles {
        is_admin: false,
        is_spectator: false,
    };
}

impl From<&Participant> for Roles {
    fn from(p: &Participant) -> Self {
        Self {
            is_admin: p.is_admin,
            is_spectator: p.is_spectator,
        }
    }
}
