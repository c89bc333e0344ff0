//! Real-time progress session: `GET /ws`.
//!
//! One axum websocket task per connection. Incoming frames drive the
//! Progress Bus's subscription tables directly; outgoing frames are
//! whatever the bus's per-session channel produces, published by workers
//! elsewhere. A session with no traffic for `HEARTBEAT_IDLE_SECS` is closed
//! by the Janitor's heartbeat sweep, not by this task.

use crate::progress::{ClientFrame, ServerFrame};
use crate::AppState;
use audiolevel_common::JobId;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::{routing::get, Router};
use futures::{SinkExt, StreamExt};

fn new_session_id() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..24)
        .map(|_| {
            let n = rng.gen_range(0..36);
            std::char::from_digit(n, 36).unwrap()
        })
        .collect()
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> axum::response::Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let session_id = new_session_id();
    let mut rx = state.bus.register_session(session_id.clone()).await;
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            outgoing = rx.recv() => {
                let Some(frame) = outgoing else { break };
                let Ok(text) = serde_json::to_string(&frame) else { continue };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => {
                let Some(incoming) = incoming else { break };
                let Ok(message) = incoming else { break };
                match message {
                    Message::Text(text) => {
                        if !handle_client_frame(&state, &session_id, &text, &mut sink).await {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    state.bus.close_session(&session_id).await;
}

/// Returns false if the connection should be torn down (send failure).
async fn handle_client_frame(
    state: &AppState,
    session_id: &str,
    text: &str,
    sink: &mut (impl futures::Sink<Message> + Unpin),
) -> bool {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(_) => {
            return send(sink, ServerFrame::Error { message: "malformed frame".to_string(), code: Some("BAD_FRAME".to_string()) }).await;
        }
    };

    state.bus.touch(session_id).await;

    match frame {
        ClientFrame::Subscribe { job_id } => {
            let Ok(job_id) = JobId::parse(&job_id) else {
                return send(sink, ServerFrame::Error { message: "invalid job id".to_string(), code: Some("INVALID_JOB_ID".to_string()) }).await;
            };
            match state.bus.subscribe(session_id, job_id.clone()).await {
                Ok(()) => send(sink, ServerFrame::Subscribed { job_id: job_id.to_string() }).await,
                Err(code) => send(sink, ServerFrame::Error { message: "subscription limit reached".to_string(), code: Some(code.to_string()) }).await,
            }
        }
        ClientFrame::Unsubscribe { job_id } => {
            let Ok(job_id) = JobId::parse(&job_id) else {
                return send(sink, ServerFrame::Error { message: "invalid job id".to_string(), code: Some("INVALID_JOB_ID".to_string()) }).await;
            };
            state.bus.unsubscribe(session_id, &job_id).await;
            send(sink, ServerFrame::Unsubscribed { job_id: job_id.to_string() }).await
        }
        ClientFrame::Ping => {
            send(sink, ServerFrame::Pong { timestamp: chrono::Utc::now().timestamp_millis() }).await
        }
    }
}

async fn send(sink: &mut (impl futures::Sink<Message> + Unpin), frame: ServerFrame) -> bool {
    let Ok(text) = serde_json::to_string(&frame) else { return true };
    sink.send(Message::Text(text)).await.is_ok()
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_unique_enough() {
        let ids: std::collections::HashSet<_> = (0..1000).map(|_| new_session_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn session_id_has_fixed_length() {
        assert_eq!(new_session_id().len(), 24);
    }
}
