use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use pubquiz::api::{self, AppState};
use pubquiz::catalog::parse_catalog;
use pubquiz::clock::ManualClock;
use pubquiz::config::Config;
use pubquiz::state::GameState;
use pubquiz::types::FORFEIT_COMMENT;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;

const HOST_IP: &str = "10.0.0.1";
const ALICE_IP: &str = "10.0.0.2";
const BOB_IP: &str = "10.0.0.3";

const CATALOG: &str = r#"[
    {
        "question": "Capital of France?",
        "type": "freetext",
        "correctAnswers": ["Paris"],
        "pointsAvailable": 10,
        "timeLimit": 30,
        "penalisationFactor": 1
    },
    {
        "question": "Largest planet?",
        "type": "multichoice",
        "choices": ["Mars", "Jupiter", "Venus"],
        "correctAnswers": ["Jupiter"],
        "pointsAvailable": 5,
        "timeLimit": 20
    }
]"#;

struct TestApp {
    app: Router,
    state: AppState,
    clock: ManualClock,
    _pages: tempfile::TempDir,
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Reply {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    /// "name=token" from Set-Cookie, ready to send back
    fn cookie(&self) -> Option<String> {
        self.headers
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::to_string)
    }

    fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }
}

impl TestApp {
    fn new() -> Self {
        Self::with_config(|_| {})
    }

    fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let pages = tempfile::tempdir().unwrap();
        for name in ["join.html", "play.html", "host.html"] {
            std::fs::write(pages.path().join(name), format!("<h1>{name}</h1>")).unwrap();
        }
        let mut config = Config {
            static_dir: pages.path().to_path_buf(),
            ..Default::default()
        };
        adjust(&mut config);

        let clock = ManualClock::default();
        let questions = parse_catalog(CATALOG).unwrap();
        let game = GameState::with_clock(questions, Arc::new(clock.clone())).unwrap();
        let state = AppState::with_clock(game, config, Arc::new(clock.clone()));

        Self {
            app: api::router(state.clone()),
            state,
            clock,
            _pages: pages,
        }
    }

    async fn send(
        &self,
        method: &str,
        path: &str,
        ip: &str,
        cookie: Option<&str>,
        content_type: Option<&str>,
        body: Body,
    ) -> Reply {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        let mut request = builder
            .header(header::USER_AGENT, "Mozilla/5.0 Firefox/121.0")
            .body(body)
            .unwrap();
        let peer: SocketAddr = format!("{ip}:50000").parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();
        Reply {
            status,
            headers,
            body,
        }
    }

    async fn get(&self, path: &str, ip: &str, cookie: Option<&str>) -> Reply {
        self.send("GET", path, ip, cookie, None, Body::empty()).await
    }

    async fn join(&self, username: &str, ip: &str) -> Reply {
        self.send(
            "POST",
            "/join",
            ip,
            None,
            Some("application/x-www-form-urlencoded"),
            Body::from(format!("username={username}")),
        )
        .await
    }

    /// Join and return the session cookie
    async fn login(&self, username: &str, ip: &str) -> String {
        let reply = self.join(username, ip).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.json()["success"], true);
        reply.cookie().unwrap()
    }

    async fn submit(&self, ip: &str, cookie: &str, body: &str) -> Reply {
        self.send(
            "POST",
            "/api/submit-answer",
            ip,
            Some(cookie),
            Some("application/json"),
            Body::from(body.to_string()),
        )
        .await
    }
}

/// Host and one player through a whole question
#[tokio::test]
async fn test_full_quiz_flow() {
    let t = TestApp::new();
    let host = t.login("Quizmaster", HOST_IP).await;
    let alice = t.login("Alice", ALICE_IP).await;

    assert!(t.state.game.is_admin("quizmaster").await);
    assert!(!t.state.game.is_admin("alice").await);

    let reply = t.get("/api/start-question", HOST_IP, Some(&host)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(t.state.game.current_question().await.is_running());

    let reply = t.submit(ALICE_IP, &alice, r#"{"answer": "paris"}"#).await;
    assert_eq!(reply.status, StatusCode::OK);
    let result = reply.json();
    assert_eq!(result["recorded"], true);
    assert_eq!(result["points"], 10.0);
    assert_eq!(result["questionNumber"], 1);

    // Before the reveal alice cannot see the solution
    let snapshot = t.get("/api/game-state", ALICE_IP, Some(&alice)).await.json();
    assert_eq!(snapshot["currentQuestion"]["correctAnswers"], Value::Array(vec![]));
    // The only player answered, so the question is over
    assert_eq!(snapshot["currentQuestion"]["isTimedOut"], true);

    let reply = t.get("/api/show-answer", HOST_IP, Some(&host)).await;
    assert_eq!(reply.json()["revealed"], true);

    let snapshot = t.get("/api/game-state", ALICE_IP, Some(&alice)).await.json();
    assert_eq!(snapshot["currentQuestion"]["correctAnswers"][0], "Paris");
    assert_eq!(snapshot["currentUser"]["username"], "alice");
    assert_eq!(snapshot["currentUser"]["score"], 10.0);
    assert_eq!(snapshot["totalQuestions"], 2);

    let board = t.get("/api/get-leaderboard", ALICE_IP, Some(&alice)).await.json();
    assert_eq!(board[0]["username"], "alice");
    assert_eq!(board[0]["score"], 10.0);

    let reply = t.get("/api/next-question", HOST_IP, Some(&host)).await;
    assert_eq!(reply.json()["questionNumber"], 2);

    // Multi-choice, answered late
    t.get("/api/start-question", HOST_IP, Some(&host)).await;
    t.clock.advance_secs(10);
    let reply = t.submit(ALICE_IP, &alice, r#"{"answer": "Jupiter"}"#).await;
    let result = reply.json();
    assert_eq!(result["comment"], "yes");
    // Half the time used: 5 - 0.5 * 0.05 * 5
    assert_eq!(result["points"], 4.875);
}

#[tokio::test]
async fn test_login_required() {
    let t = TestApp::new();

    let reply = t.get("/api/game-state", ALICE_IP, None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let reply = t.get("/play", ALICE_IP, None).await;
    assert_eq!(reply.status, StatusCode::SEE_OTHER);
    assert_eq!(reply.location(), Some("/join"));

    let reply = t.get("/api/game-state", ALICE_IP, Some("quiz_session=forged")).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let status = t.get("/api/session", ALICE_IP, None).await.json();
    assert_eq!(status["isLoggedIn"], false);

    let alice = t.login("alice", ALICE_IP).await;
    let status = t.get("/api/session", ALICE_IP, Some(&alice)).await.json();
    assert_eq!(status["isLoggedIn"], true);

    let reply = t.get("/play", ALICE_IP, Some(&alice)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, b"<h1>play.html</h1>");
}

#[tokio::test]
async fn test_join_page() {
    let t = TestApp::new();
    let reply = t.get("/join", ALICE_IP, None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, b"<h1>join.html</h1>");

    let alice = t.login("alice", ALICE_IP).await;
    let reply = t.get("/join", ALICE_IP, Some(&alice)).await;
    assert_eq!(reply.status, StatusCode::SEE_OTHER);
    assert_eq!(reply.location(), Some("/play"));
}

#[tokio::test]
async fn test_join_validation() {
    let t = TestApp::new();

    let reply = t.join("", ALICE_IP).await;
    assert_eq!(reply.json()["success"], false);
    assert_eq!(reply.json()["message"], "Username is required");
    assert!(reply.cookie().is_none());

    let long = "x".repeat(40);
    let reply = t.join(&long, ALICE_IP).await;
    assert_eq!(reply.json()["success"], false);
}

#[tokio::test]
async fn test_duplicate_username() {
    let t = TestApp::new();
    let first = t.login("Bob", BOB_IP).await;

    // Someone else cannot take the name
    let reply = t.join("bob", ALICE_IP).await;
    assert_eq!(reply.json()["success"], false);
    assert_eq!(
        reply.json()["message"],
        "Username already taken, please choose another"
    );

    // The same device gets its session back
    let again = t.login("BOB", BOB_IP).await;
    assert_eq!(again, first);
    assert_eq!(t.state.game.participant_count().await, 1);
}

#[tokio::test]
async fn test_host_actions_ignored_for_players() {
    let t = TestApp::new();
    let _host = t.login("host", HOST_IP).await;
    let alice = t.login("alice", ALICE_IP).await;

    let reply = t.get("/api/next-question", ALICE_IP, Some(&alice)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.is_empty());
    assert_eq!(t.state.game.cursor().await, 1);

    let reply = t
        .get("/api/players?username=host&action=ban", ALICE_IP, Some(&alice))
        .await;
    assert!(reply.body.is_empty());
    assert!(t.state.game.has_participant("host").await);

    let reply = t.get("/host", ALICE_IP, Some(&alice)).await;
    assert_eq!(reply.status, StatusCode::SEE_OTHER);
    assert_eq!(reply.location(), Some("/play"));
}

#[tokio::test]
async fn test_submit_rejects_bad_input() {
    let t = TestApp::new();
    let host = t.login("host", HOST_IP).await;
    let alice = t.login("alice", ALICE_IP).await;
    let _bob = t.login("bob", BOB_IP).await;
    t.get("/api/start-question", HOST_IP, Some(&host)).await;

    let reply = t.submit(ALICE_IP, &alice, "{not json").await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = t.submit(ALICE_IP, &alice, r#"{"comment": "no answer"}"#).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = t.submit(ALICE_IP, &alice, r#"{"answer": "   "}"#).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    // Client-sent points are ignored
    let reply = t
        .submit(ALICE_IP, &alice, r#"{"answer": "london", "points": 1000}"#)
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["points"], 0.0);

    // Only the first answer counts
    let reply = t.submit(ALICE_IP, &alice, r#"{"answer": "paris"}"#).await;
    assert_eq!(reply.json()["recorded"], false);
    let q = t.state.game.current_question().await;
    assert_eq!(q.answers.len(), 1);
    assert_eq!(q.answers[0].points, 0.0);
}

#[tokio::test]
async fn test_submit_after_question_ended() {
    let t = TestApp::new();
    let host = t.login("host", HOST_IP).await;
    let alice = t.login("alice", ALICE_IP).await;
    t.get("/api/start-question", HOST_IP, Some(&host)).await;

    t.clock.advance_secs(31);
    let reply = t.submit(ALICE_IP, &alice, r#"{"answer": "paris"}"#).await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert!(t.state.game.current_question().await.answers.is_empty());
}

#[tokio::test]
async fn test_submit_before_question_started() {
    let t = TestApp::new();
    let host = t.login("host", HOST_IP).await;
    let alice = t.login("alice", ALICE_IP).await;

    let reply = t.submit(ALICE_IP, &alice, r#"{"answer": "paris"}"#).await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert!(t.state.game.current_question().await.answers.is_empty());

    // A paused question takes no answers either
    t.get("/api/start-question", HOST_IP, Some(&host)).await;
    t.get("/api/pause-question", HOST_IP, Some(&host)).await;
    let reply = t.submit(ALICE_IP, &alice, r#"{"answer": "paris"}"#).await;
    assert_eq!(reply.status, StatusCode::CONFLICT);

    t.get("/api/pause-question", HOST_IP, Some(&host)).await;
    let reply = t.submit(ALICE_IP, &alice, r#"{"answer": "paris"}"#).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["recorded"], true);
}

#[tokio::test]
async fn test_ban_on_a_shared_address() {
    let t = TestApp::new();
    let host = t.login("host", HOST_IP).await;
    t.login("alice", HOST_IP).await;

    let reply = t
        .get("/api/players?username=alice&action=ban", HOST_IP, Some(&host))
        .await;
    assert_eq!(reply.json()["success"], true);

    // The host on the same network keeps playing
    let reply = t.get("/api/game-state", HOST_IP, Some(&host)).await;
    assert_eq!(reply.status, StatusCode::OK);
    t.login("bob", HOST_IP).await;
    assert_eq!(t.join("alice", HOST_IP).await.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_ban_is_permanent() {
    let t = TestApp::new();
    let host = t.login("host", HOST_IP).await;
    let alice = t.login("alice", ALICE_IP).await;
    t.get("/api/start-question", HOST_IP, Some(&host)).await;
    t.submit(ALICE_IP, &alice, r#"{"answer": "paris"}"#).await;

    let reply = t
        .get("/api/players?username=alice&action=ban", HOST_IP, Some(&host))
        .await;
    assert_eq!(reply.json()["success"], true);

    assert!(!t.state.game.has_participant("alice").await);
    assert!(t.state.game.question(1).await.unwrap().has_answer_from("alice"));

    let reply = t.get("/api/game-state", ALICE_IP, Some(&alice)).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    // Not under the old name, not from the old address
    assert_eq!(t.join("alice", BOB_IP).await.status, StatusCode::FORBIDDEN);
    assert_eq!(t.join("mallory", ALICE_IP).await.status, StatusCode::FORBIDDEN);
    assert_eq!(t.get("/join", ALICE_IP, None).await.status, StatusCode::FORBIDDEN);

    // Everyone else is unaffected
    t.login("bob", BOB_IP).await;
}

#[tokio::test]
async fn test_testing_mode_does_not_ban_addresses() {
    let t = TestApp::with_config(|c| c.testing_mode = true);
    let host = t.login("host", HOST_IP).await;
    t.login("alice", HOST_IP).await;

    t.get("/api/players?username=alice&action=ban", HOST_IP, Some(&host))
        .await;

    // Same machine, different player
    t.login("bob", HOST_IP).await;
    assert_eq!(t.join("alice", HOST_IP).await.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_kicked_player_comes_back() {
    let t = TestApp::new();
    let host = t.login("host", HOST_IP).await;
    let alice = t.login("alice", ALICE_IP).await;

    let reply = t
        .get("/api/players?username=alice&action=kick", HOST_IP, Some(&host))
        .await;
    assert_eq!(reply.json()["success"], true);
    assert!(!t.state.game.has_participant("alice").await);

    // Her next poll puts her back on the roster
    let reply = t.get("/api/game-state", ALICE_IP, Some(&alice)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["currentUser"]["username"], "alice");
    assert!(t.state.game.has_participant("alice").await);
}

#[tokio::test]
async fn test_score_adjustments_and_messages() {
    let t = TestApp::new();
    let host = t.login("host", HOST_IP).await;
    let alice = t.login("alice", ALICE_IP).await;
    let _bob = t.login("bob", BOB_IP).await;

    t.get("/api/players?username=alice&action=award&points=5", HOST_IP, Some(&host))
        .await;
    t.get("/api/players?username=alice&action=dock&points=2", HOST_IP, Some(&host))
        .await;
    let board = t.get("/api/get-leaderboard", HOST_IP, Some(&host)).await.json();
    assert_eq!(board[0]["username"], "alice");
    assert_eq!(board[0]["score"], 3.0);

    let reply = t
        .get("/api/players?username=alice&action=award&points=lots", HOST_IP, Some(&host))
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    t.get("/api/players?username=alice&action=msg&points=hello", HOST_IP, Some(&host))
        .await;
    let snapshot = t.get("/api/game-state", ALICE_IP, Some(&alice)).await.json();
    assert_eq!(snapshot["currentUser"]["message"], "hello");

    let reply = t
        .get("/api/players?username=bob&action=surrender", HOST_IP, Some(&host))
        .await;
    assert_eq!(reply.json()["success"], true);
    let q = t.state.game.current_question().await;
    let forfeit = q.answers.iter().find(|a| a.username == "bob").unwrap();
    assert_eq!(forfeit.comment, FORFEIT_COMMENT);
    assert_eq!(forfeit.points, 0.0);

    let reply = t
        .get("/api/players?username=alice&action=juggle", HOST_IP, Some(&host))
        .await;
    assert_eq!(reply.json()["success"], false);
}

#[tokio::test]
async fn test_pause_toggles() {
    let t = TestApp::new();
    let host = t.login("host", HOST_IP).await;
    t.login("alice", ALICE_IP).await;

    t.get("/api/start-question", HOST_IP, Some(&host)).await;
    t.clock.advance_secs(5);
    t.get("/api/pause-question", HOST_IP, Some(&host)).await;
    let q = t.state.game.current_question().await;
    assert!(!q.is_running());
    assert_eq!(q.time_left, 25);

    t.get("/api/pause-question", HOST_IP, Some(&host)).await;
    assert!(t.state.game.current_question().await.is_running());

    t.get("/api/stop-question", HOST_IP, Some(&host)).await;
    assert!(t.state.game.current_question().await.is_timed_out);

    let reply = t.get("/api/previous-question", HOST_IP, Some(&host)).await;
    assert_eq!(reply.json()["questionNumber"], 1);
}

#[tokio::test]
async fn test_sessions_expire() {
    let t = TestApp::new();
    let alice = t.login("alice", ALICE_IP).await;

    t.clock.advance_secs(3601);
    let reply = t.get("/api/game-state", ALICE_IP, Some(&alice)).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    // The name is free again and a fresh session is issued
    let again = t.login("alice", ALICE_IP).await;
    assert_ne!(again, alice);
}

#[tokio::test]
async fn test_logout() {
    let t = TestApp::new();
    let alice = t.login("alice", ALICE_IP).await;

    let reply = t
        .send("POST", "/api/logout", ALICE_IP, Some(&alice), None, Body::empty())
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    let cleared = reply.headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cleared.contains("Max-Age=0"));

    let reply = t.get("/api/game-state", ALICE_IP, Some(&alice)).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
}
