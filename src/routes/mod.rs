//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - REST-ish API under `/api/v1/...`
/// - Static frontend from `./static` with index fallback
/// - CORS (allow any origin/method/headers), adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // HTTP API
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/session", post(http::http_post_session))
        .route("/api/v1/session/:id", get(http::http_get_session))
        .route("/api/v1/prompt", post(http::http_post_prompt))
        .route("/api/v1/reset", post(http::http_post_reset))
        .route("/api/v1/api_key", post(http::http_post_api_key))
        .route("/api/v1/leaderboard", get(http::http_get_leaderboard))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::domain::{Scenario, Technique};
    use crate::engine::LevelTable;
    use crate::leaderboard::MemoryLeaderboard;
    use crate::protocol::{ClientWsMessage, ServerWsMessage};
    use crate::scenarios::{BundledSource, MemorySource, ScenarioSource};

    fn state_with(source: Arc<dyn ScenarioSource>) -> Arc<AppState> {
        let levels = LevelTable::new(vec![Technique::RolePrompting, Technique::SelfConsistency]).unwrap();
        Arc::new(AppState::from_parts(
            source,
            None,
            None,
            Duration::from_secs(1),
            levels,
            Arc::new(MemoryLeaderboard::new()),
        ))
    }

    fn test_state() -> Arc<AppState> {
        state_with(Arc::new(BundledSource))
    }

    /// One scenario per level so two passing prompts finish the game.
    fn short_game() -> Arc<AppState> {
        let source = MemorySource::new()
            .with(Technique::RolePrompting, vec![Scenario {
                required_role: Some("Energy Expert".into()),
                task_input: Some("Explain solar power.".into()),
                ..Scenario::new("role-1", "Role", "Play a role.")
            }])
            .with(Technique::SelfConsistency, vec![Scenario {
                task_input: Some("Classify complex text.".into()),
                ..Scenario::new("sc-1", "Majority", "Sample several answers.")
            }]);
        state_with(Arc::new(source))
    }

    async fn call(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let req = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(b) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (status, body) = call(build_router(test_state()), Method::GET, "/api/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));
    }

    #[tokio::test]
    async fn unknown_session_is_404() {
        let app = build_router(test_state());
        let (status, body) = call(app.clone(), Method::GET, "/api/v1/session/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("nope"));

        let (status, _) = call(app, Method::POST, "/api/v1/prompt", Some(json!({ "sessionId": "nope", "text": "hi" }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn session_prompt_and_reset_flow() {
        let app = build_router(test_state());
        let (status, created) = call(app.clone(), Method::POST, "/api/v1/session", None).await;
        assert_eq!(status, StatusCode::OK);
        let id = created["sessionId"].as_str().unwrap().to_string();
        assert_eq!(created["state"]["level"], 1);
        assert_eq!(created["state"]["active"], "role_prompting");

        let (_, fetched) = call(app.clone(), Method::GET, &format!("/api/v1/session/{id}"), None).await;
        assert_eq!(fetched["sessionId"], id.as_str());

        let (status, fb) = call(
            app.clone(),
            Method::POST,
            "/api/v1/prompt",
            Some(json!({ "sessionId": id, "text": "Tell me about solar power" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fb["state"]["score"], 3);
        assert_eq!(fb["state"]["level"], 1);

        let (_, reset) = call(app, Method::POST, "/api/v1/reset", Some(json!({ "sessionId": id }))).await;
        assert_eq!(reset["state"]["score"], 0);
    }

    #[tokio::test]
    async fn api_key_falls_back_to_server_default() {
        let app = build_router(test_state());
        let (_, created) = call(app.clone(), Method::POST, "/api/v1/session", None).await;
        let id = created["sessionId"].as_str().unwrap().to_string();

        let (_, set) = call(app.clone(), Method::POST, "/api/v1/api_key", Some(json!({ "sessionId": id, "apiKey": "sk-x" }))).await;
        assert_eq!(set["hasKey"], true);
        let (_, cleared) = call(app, Method::POST, "/api/v1/api_key", Some(json!({ "sessionId": id }))).await;
        assert_eq!(cleared["hasKey"], false);
    }

    #[tokio::test]
    async fn finished_identified_games_reach_the_leaderboard() {
        let state = short_game();
        let reply = ws::handle_client_ws(
            ClientWsMessage::NewSession {
                player: Some(crate::leaderboard::PlayerIdentity { user_id: "u1".into(), user_name: "Ada".into() }),
            },
            &state,
        )
        .await;
        let ServerWsMessage::Session { session_id, .. } = reply else { panic!("expected session frame") };

        for text in [
            "Act as Energy Expert. Explain solar power.",
            "Explain why, step by step, and take the majority of several answers.",
        ] {
            let reply = ws::handle_client_ws(ClientWsMessage::SubmitPrompt { session_id: session_id.clone(), text: text.into() }, &state).await;
            assert!(matches!(reply, ServerWsMessage::Feedback { .. }));
        }

        // The hook submits on a spawned task.
        let mut entries = Vec::new();
        for _ in 0..50 {
            entries = state.leaderboard.top(10).await;
            if !entries.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].user_name, "Ada");

        let (_, board) = call(build_router(state), Method::GET, "/api/v1/leaderboard?limit=5", None).await;
        assert_eq!(board["entries"][0]["user_id"], "u1");
    }

    #[tokio::test]
    async fn ws_ping_and_unknown_session() {
        let state = test_state();
        assert!(matches!(ws::handle_client_ws(ClientWsMessage::Ping, &state).await, ServerWsMessage::Pong));
        let reply = ws::handle_client_ws(ClientWsMessage::State { session_id: "missing".into() }, &state).await;
        assert!(matches!(reply, ServerWsMessage::Error { .. }));
    }
}
