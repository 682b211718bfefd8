//! HTTP surface: routing and the handlers that translate requests into
//! game and session operations.
//!
//! All JSON is camelCase, matching what the browser client expects.

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Query, State},
    http::{header, HeaderMap, Request, StatusCode},
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Extension, Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::auth::{self, Caller};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::session::request::{
    browser_fingerprint, expired_cookie, session_cookie, session_token, ProxyPolicy,
};
use crate::session::{SessionError, SessionRegistry};
use crate::state::{GameState, SubmitError};
use crate::types::*;

/// Longest accepted username, in characters
pub const MAX_USERNAME_LEN: usize = 32;

/// Everything a handler needs, cloned into each request
#[derive(Clone)]
pub struct AppState {
    pub game: GameState,
    pub sessions: Arc<SessionRegistry>,
    pub config: Arc<Config>,
    pub proxy_policy: Arc<ProxyPolicy>,
}

impl AppState {
    pub fn new(game: GameState, config: Config) -> Self {
        Self::with_clock(game, config, Arc::new(SystemClock))
    }

    pub fn with_clock(game: GameState, config: Config, clock: Arc<dyn Clock>) -> Self {
        let sessions = SessionRegistry::with_clock(game.clone(), config.session_ttl(), clock)
            .with_ip_bans(!config.testing_mode);
        if config.testing_mode {
            tracing::warn!("Testing mode: bans are not matched by address");
        }
        Self {
            game,
            sessions: Arc::new(sessions),
            proxy_policy: Arc::new(config.proxy_policy()),
            config: Arc::new(config),
        }
    }

    fn token(&self, headers: &HeaderMap) -> Option<String> {
        session_token(headers, &self.config.cookie_name)
    }
}

pub fn router(state: AppState) -> Router {
    let host = Router::new()
        .route("/host", get(host_page))
        .route("/api/next-question", get(next_question).post(next_question))
        .route(
            "/api/previous-question",
            get(previous_question).post(previous_question),
        )
        .route("/api/start-question", get(start_question).post(start_question))
        .route("/api/pause-question", get(pause_question).post(pause_question))
        .route("/api/stop-question", get(stop_question).post(stop_question))
        .route("/api/show-answer", get(show_answer).post(show_answer))
        .route("/api/players", get(player_action).post(player_action))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin,
        ));

    let members = Router::new()
        .route("/play", get(play_page))
        .route("/observe", get(observe_page))
        .route("/scoreboard", get(scoreboard_page))
        .route("/api/game-state", get(game_state))
        .route("/api/get-leaderboard", get(leaderboard))
        .route("/api/submit-answer", post(submit_answer))
        .merge(host)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_login,
        ));

    let public = Router::new()
        .route("/", get(|| async { Redirect::to("/play") }))
        .route("/join", get(join_page).post(join))
        .route("/api/session", get(session_status))
        .route("/api/logout", post(logout))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            attach_request_ip,
        ));

    Router::new()
        .merge(public)
        .merge(members)
        .nest_service("/static", ServeDir::new(&state.config.static_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Pages

async fn serve_page(state: &AppState, name: &str) -> Response {
    let path = state.config.static_dir.join(name);
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => Html(content).into_response(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Page not found");
            (StatusCode::NOT_FOUND, "Page not found").into_response()
        }
    }
}

async fn join_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(RequestIp(ip)): Extension<RequestIp>,
) -> Response {
    let token = state.token(&headers);
    if state.sessions.is_banned(token.as_deref(), None, &ip).await {
        return StatusCode::FORBIDDEN.into_response();
    }
    if state.sessions.is_logged_in(token.as_deref(), &ip).await {
        return Redirect::to("/play").into_response();
    }
    serve_page(&state, "join.html").await
}

async fn play_page(State(state): State<AppState>) -> Response {
    serve_page(&state, "play.html").await
}

async fn observe_page(State(state): State<AppState>) -> Response {
    serve_page(&state, "observe.html").await
}

async fn scoreboard_page(State(state): State<AppState>) -> Response {
    serve_page(&state, "scoreboard.html").await
}

async fn host_page(State(state): State<AppState>) -> Response {
    serve_page(&state, "host.html").await
}

// Session

#[derive(Debug, Deserialize)]
pub struct JoinForm {
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JoinResponse {
    pub success: bool,
    pub message: String,
}

impl JoinResponse {
    fn rejected(message: &str) -> Json<Self> {
        Json(Self {
            success: false,
            message: message.to_string(),
        })
    }
}

/// Normalize a requested username, or say why it cannot be used
fn normalize_username(raw: &str) -> Result<Username, &'static str> {
    let username = raw.trim().to_lowercase();
    if username.is_empty() {
        return Err("Username is required");
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err("Username is too long");
    }
    if username.chars().any(char::is_control) {
        return Err("Username contains invalid characters");
    }
    Ok(username)
}

/// POST /join
async fn join(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(RequestIp(ip)): Extension<RequestIp>,
    Form(form): Form<JoinForm>,
) -> Response {
    let token = state.token(&headers);
    if state.sessions.is_banned(token.as_deref(), None, &ip).await {
        return StatusCode::FORBIDDEN.into_response();
    }

    let username = match normalize_username(&form.username) {
        Ok(username) => username,
        Err(message) => return JoinResponse::rejected(message).into_response(),
    };

    let browser = browser_fingerprint(&headers);
    match state.sessions.admit(&username, &ip, &browser).await {
        Ok(admission) => {
            let cookie = session_cookie(
                &state.config.cookie_name,
                &admission.token,
                state.config.session_ttl_secs,
            );
            (
                [(header::SET_COOKIE, cookie)],
                Json(JoinResponse {
                    success: true,
                    message: "Logged In".to_string(),
                }),
            )
                .into_response()
        }
        // The same device may rejoin; anyone else needs another name
        Err(SessionError::UsernameTaken(_)) => {
            JoinResponse::rejected("Username already taken, please choose another").into_response()
        }
        Err(e) => {
            tracing::warn!(username = %username, ip = %ip, error = %e, "Join refused");
            (StatusCode::FORBIDDEN, JoinResponse::rejected("You have been banned")).into_response()
        }
    }
}

/// Client address resolved once per request for handlers that are not
/// behind the login gate
#[derive(Debug, Clone)]
pub struct RequestIp(pub String);

async fn attach_request_ip(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: middleware::Next,
) -> Response {
    let ip = auth::request_ip(&state, &request);
    request.extensions_mut().insert(RequestIp(ip));
    next.run(request).await
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub is_logged_in: bool,
}

/// GET /api/session
async fn session_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(RequestIp(ip)): Extension<RequestIp>,
) -> Json<SessionStatus> {
    let token = state.token(&headers);
    Json(SessionStatus {
        is_logged_in: state.sessions.is_logged_in(token.as_deref(), &ip).await,
    })
}

/// POST /api/logout
async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = state.token(&headers) {
        state.sessions.clear_session(&token).await;
    }
    (
        [(header::SET_COOKIE, expired_cookie(&state.config.cookie_name))],
        StatusCode::OK,
    )
        .into_response()
}

// Player API

/// GET /api/game-state
async fn game_state(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Json<crate::state::GameSnapshot> {
    Json(state.game.snapshot(Some(&caller.username)).await)
}

/// GET /api/get-leaderboard
async fn leaderboard(State(state): State<AppState>) -> Json<Vec<LeaderboardEntry>> {
    Json(state.game.compute_leaderboard().await)
}

#[derive(Debug, Deserialize)]
pub struct SubmitAnswer {
    pub answer: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResult {
    pub recorded: bool,
    pub question_number: QuestionNumber,
    pub points: f64,
    pub comment: String,
}

/// POST /api/submit-answer
///
/// Scores the answer against the question under the cursor. Client-sent
/// points are never trusted.
async fn submit_answer(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<SubmitAnswer>, JsonRejection>,
) -> Result<Json<SubmitResult>, (StatusCode, String)> {
    let Json(body) = body.map_err(|e| (StatusCode::BAD_REQUEST, e.body_text()))?;

    let submission = state
        .game
        .answer_current_question(&caller.username, &body.answer, state.config.map_scale)
        .await
        .map_err(|e| match e {
            SubmitError::NotRunning => (StatusCode::CONFLICT, e.to_string()),
            SubmitError::Invalid(_) => (StatusCode::BAD_REQUEST, e.to_string()),
        })?;

    Ok(Json(SubmitResult {
        recorded: submission.recorded,
        question_number: submission.question_number,
        points: submission.scored.points,
        comment: submission.scored.comment,
    }))
}

// Host API

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    pub question_number: QuestionNumber,
    pub total_questions: usize,
}

async fn cursor_of(state: &AppState, question_number: QuestionNumber) -> Json<Cursor> {
    Json(Cursor {
        question_number,
        total_questions: state.game.total_questions().await,
    })
}

async fn next_question(State(state): State<AppState>) -> Json<Cursor> {
    let n = state.game.advance_question().await;
    cursor_of(&state, n).await
}

async fn previous_question(State(state): State<AppState>) -> Json<Cursor> {
    let n = state.game.retreat_question().await;
    cursor_of(&state, n).await
}

async fn start_question(State(state): State<AppState>) -> StatusCode {
    state.game.start_question().await;
    StatusCode::OK
}

/// Toggles: pauses a running question, resumes a paused one
async fn pause_question(State(state): State<AppState>) -> StatusCode {
    state.game.toggle_pause().await;
    StatusCode::OK
}

async fn stop_question(State(state): State<AppState>) -> StatusCode {
    state.game.stop_question().await;
    StatusCode::OK
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Revealed {
    pub revealed: bool,
}

async fn show_answer(State(state): State<AppState>) -> Json<Revealed> {
    Json(Revealed {
        revealed: state.game.reveal_answer().await,
    })
}

#[derive(Debug, Deserialize)]
pub struct PlayerActionParams {
    pub username: Option<String>,
    pub action: Option<String>,
    /// Points for award/dock, message text for msg
    pub points: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
}

fn parse_points(raw: Option<&str>) -> Result<f64, (StatusCode, String)> {
    raw.and_then(|p| p.trim().parse::<f64>().ok())
        .filter(|p| p.is_finite())
        .ok_or((StatusCode::BAD_REQUEST, "Invalid points value".to_string()))
}

/// GET /api/players?username=..&action=..&points=..
async fn player_action(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(params): Query<PlayerActionParams>,
) -> Result<Json<ActionResult>, (StatusCode, String)> {
    let (Some(username), Some(action)) = (params.username, params.action) else {
        return Ok(Json(ActionResult { success: false }));
    };
    let username = username.trim().to_lowercase();
    let points = params.points.as_deref();

    tracing::info!(
        host = %caller.username,
        username = %username,
        action = %action,
        "Host player action"
    );

    let success = match action.as_str() {
        "kick" => state.sessions.eject(&username).await,
        "ban" => state.sessions.ban(&username).await,
        "award" => {
            let delta = parse_points(points)?;
            state.game.adjust_score(&username, delta, "award").await
        }
        "dock" => {
            let delta = parse_points(points)?;
            state.game.adjust_score(&username, -delta, "dock").await
        }
        "msg" => match points.map(str::trim).filter(|m| !m.is_empty()) {
            Some(text) => {
                state
                    .game
                    .message_participant(&username, text, state.config.message_ticks)
                    .await
            }
            None => false,
        },
        "surrender" => state.game.forfeit_participant(&username).await,
        other => {
            tracing::warn!(action = other, "Unknown player action");
            false
        }
    };

    Ok(Json(ActionResult { success }))
}
