//! WebSocket transport glue: one socket = one session.
//!
//! Frames in both directions are single JSON text messages. A dedicated
//! writer task owns the sink; everything outbound (replies, pongs,
//! publications) goes through the session's bounded queue, so a slow
//! socket backs up onto itself and nowhere else.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;

use emberwire::CODE_BAD_REQUEST;
use emberwire::frame::{ClientFrame, ServerFrame};

use crate::AppState;
use crate::hub::{Hub, SESSION_BUFFER};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| session_task(socket, state.hub))
}

async fn session_task(socket: WebSocket, hub: Arc<Hub>) {
    let session = hub.next_session_id();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerFrame>(SESSION_BUFFER);

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&frame) else {
                continue;
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = stream.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(_) => break,
        };
        match msg {
            Message::Text(text) => {
                let Ok(frame) = serde_json::from_str::<ClientFrame>(&text) else {
                    let _ = tx
                        .send(ServerFrame::Error {
                            id: 0,
                            code: CODE_BAD_REQUEST,
                            message: "bad json".to_string(),
                        })
                        .await;
                    continue;
                };
                let out = match frame {
                    ClientFrame::Rpc { id, method, params } => {
                        match hub.handle_rpc(session, &method, params).await {
                            Ok(result) => ServerFrame::Reply { id, result },
                            Err(e) => ServerFrame::Error {
                                id,
                                code: e.code,
                                message: e.message,
                            },
                        }
                    }
                    ClientFrame::Subscribe { id, channel } => {
                        match hub.subscribe(session, &channel, tx.clone()).await {
                            Ok(()) => ServerFrame::Subscribed { id, channel },
                            Err(e) => ServerFrame::Error {
                                id,
                                code: e.code,
                                message: e.message,
                            },
                        }
                    }
                    ClientFrame::Unsubscribe { id, channel } => {
                        hub.unsubscribe(session, &channel).await;
                        ServerFrame::Unsubscribed { id, channel }
                    }
                    ClientFrame::Ping {} => ServerFrame::Pong {},
                };
                let _ = tx.send(out).await;
            }
            Message::Close(_) => break,
            Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    hub.disconnect(session).await;
    drop(tx);
    let _ = writer.await;
    debug!(session = session, "ws session ended");
}
