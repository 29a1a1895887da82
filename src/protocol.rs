//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::engine::EngineView;
use crate::leaderboard::{LeaderboardEntry, PlayerIdentity};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    NewSession {
        #[serde(default)]
        player: Option<PlayerIdentity>,
    },
    SubmitPrompt {
        #[serde(rename = "sessionId")]
        session_id: String,
        text: String,
    },
    Reset {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    State {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    SetApiKey {
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(default, rename = "apiKey")]
        api_key: Option<String>,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Session {
        #[serde(rename = "sessionId")]
        session_id: String,
        state: EngineView,
    },
    Feedback {
        message: String,
        state: EngineView,
    },
    State {
        state: EngineView,
    },
    Error {
        message: String,
    },
}

// --- HTTP DTOs ---

#[derive(Debug, Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct NewSessionIn {
    #[serde(default)]
    pub player: Option<PlayerIdentity>,
}

#[derive(Debug, Serialize)]
pub struct SessionOut {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub state: EngineView,
}

#[derive(Debug, Deserialize)]
pub struct PromptIn {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct FeedbackOut {
    pub message: String,
    pub state: EngineView,
}

#[derive(Debug, Deserialize)]
pub struct SessionIn {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiKeyIn {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(default, rename = "apiKey")]
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApiKeyOut {
    #[serde(rename = "hasKey")]
    pub has_key: bool,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardOut {
    pub entries: Vec<LeaderboardEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_frames_use_snake_case_tags_and_camel_case_ids() {
        let msg: ClientWsMessage =
            serde_json::from_str(r#"{"type":"submit_prompt","sessionId":"s1","text":"Act as..."}"#).unwrap();
        assert!(matches!(msg, ClientWsMessage::SubmitPrompt { ref session_id, .. } if session_id == "s1"));

        let msg: ClientWsMessage = serde_json::from_str(r#"{"type":"new_session"}"#).unwrap();
        assert!(matches!(msg, ClientWsMessage::NewSession { player: None }));

        let msg: ClientWsMessage = serde_json::from_str(r#"{"type":"set_api_key","sessionId":"s1"}"#).unwrap();
        assert!(matches!(msg, ClientWsMessage::SetApiKey { api_key: None, .. }));
    }

    #[test]
    fn server_errors_are_tagged() {
        let v = serde_json::to_value(ServerWsMessage::Error { message: "nope".into() }).unwrap();
        assert_eq!(v, serde_json::json!({ "type": "error", "message": "nope" }));
    }
}
