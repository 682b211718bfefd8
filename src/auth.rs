//! Cookie session gate for player pages and the admin check for host routes

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::net::SocketAddr;

use crate::api::AppState;
use crate::session::request::{client_ip, session_token};
use crate::types::*;

/// The logged-in participant behind a request, set by `require_login`
#[derive(Debug, Clone)]
pub struct Caller {
    pub username: Username,
    pub token: SessionToken,
    pub ip: String,
}

/// Client address for a request, honoring the configured proxy policy
pub fn request_ip(state: &AppState, request: &Request<Body>) -> String {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    client_ip(request.headers(), peer, &state.proxy_policy)
}

/// Resolve the session cookie. Pages redirect to /join without one, the
/// JSON API answers 401.
pub async fn require_login(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let ip = request_ip(&state, &request);
    let token = session_token(request.headers(), &state.config.cookie_name);

    let caller = match token {
        Some(token) => state
            .sessions
            .validate(&token, &ip)
            .await
            .map(|username| Caller {
                username,
                token,
                ip,
            }),
        None => None,
    };

    match caller {
        Some(caller) => {
            request.extensions_mut().insert(caller);
            next.run(request).await
        }
        None if request.uri().path().starts_with("/api/") => {
            StatusCode::UNAUTHORIZED.into_response()
        }
        None => Redirect::to("/join").into_response(),
    }
}

/// Host-only routes. Must run inside `require_login`.
///
/// Non-admins are sent to /play from the host page; host API calls from
/// them are dropped without an error.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(caller) = request.extensions().get::<Caller>() else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    if state.game.is_admin(&caller.username).await {
        return next.run(request).await;
    }

    tracing::warn!(
        username = %caller.username,
        path = %request.uri().path(),
        "Ignoring host action from non-admin"
    );
    if request.uri().path().starts_with("/api/") {
        StatusCode::OK.into_response()
    } else {
        Redirect::to("/play").into_response()
    }
}
