//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. We reply with a single JSON message per request.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{debug, error, info, instrument};

use crate::logic::*;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "prompt_ninja", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "prompt_ninja", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => handle_client_ws(incoming, &state).await,
          Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "prompt_ninja", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "prompt_ninja", "WebSocket disconnected");
}

pub(crate) async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::NewSession { player } => {
      let (session_id, view) = new_session(state, player).await;
      debug!(target: "prompt_ninja", session = %session_id, "WS new_session");
      ServerWsMessage::Session { session_id, state: view }
    }

    ClientWsMessage::SubmitPrompt { session_id, text } => match submit_prompt(state, &session_id, &text).await {
      Ok((message, view)) => ServerWsMessage::Feedback { message, state: view },
      Err(e) => ServerWsMessage::Error { message: e.to_string() },
    },

    ClientWsMessage::Reset { session_id } => match reset_session(state, &session_id).await {
      Ok(view) => ServerWsMessage::State { state: view },
      Err(e) => ServerWsMessage::Error { message: e.to_string() },
    },

    ClientWsMessage::State { session_id } => match session_state(state, &session_id).await {
      Ok(view) => ServerWsMessage::State { state: view },
      Err(e) => ServerWsMessage::Error { message: e.to_string() },
    },

    ClientWsMessage::SetApiKey { session_id, api_key } => {
      let result = set_api_key(state, &session_id, api_key).await;
      match result.and(session_state(state, &session_id).await) {
        Ok(view) => ServerWsMessage::State { state: view },
        Err(e) => ServerWsMessage::Error { message: e.to_string() },
      }
    }
  }
}
