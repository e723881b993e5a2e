// BSD 3-Clause License
// Copyright (c) 2025, LABGATE
//
//! WebSocket feeds: session events and the live VM log.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{SinkExt, StreamExt};
use futures_util::stream::SplitStream;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use super::{AppState, SessionId};
use crate::security::short_id;

pub async fn events_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(SessionId(session_id)): Extension<SessionId>,
) -> Response {
    info!("Event feed requested for session {}...", short_id(&session_id));
    ws.on_upgrade(move |socket| handle_events(socket, state, session_id))
}

async fn handle_events(socket: WebSocket, state: AppState, session_id: String) {
    let (mut ws_sender, ws_receiver) = socket.split();
    let mut events = state.events.subscribe();

    let feed_session = session_id.clone();
    let mut output_task = tokio::spawn(async move {
        loop {
            let envelope = match events.recv().await {
                Ok(envelope) => envelope,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event feed lagged, {} events dropped", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if !envelope.visible_to(&feed_session) {
                continue;
            }
            let text = match serde_json::to_string(&envelope) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Could not encode event: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(text)).await.is_err() {
                debug!("Event feed receiver gone");
                break;
            }
        }
    });

    let mut input_task = tokio::spawn(drain_until_close(ws_receiver));

    tokio::select! {
        _ = &mut output_task => input_task.abort(),
        _ = &mut input_task => output_task.abort(),
    }
    info!("Event feed for session {}... closed", short_id(&session_id));
}

pub async fn vm_logs_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_vm_logs(socket, state))
}

/// Replays the VM log from the start, then follows it.
async fn handle_vm_logs(socket: WebSocket, state: AppState) {
    let (mut ws_sender, ws_receiver) = socket.split();
    let tail = state.vm.tail();

    let mut output_task = tokio::spawn(async move {
        let lines = tail.into_stream();
        futures::pin_mut!(lines);
        while let Some(line) = lines.next().await {
            match line {
                Ok(line) => {
                    if ws_sender.send(Message::Text(line)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("VM log read failed: {}", e);
                    let _ = ws_sender
                        .send(Message::Text(format!("❌ Log unavailable: {}", e)))
                        .await;
                    break;
                }
            }
        }
        debug!("VM log feed finished");
    });

    let mut input_task = tokio::spawn(drain_until_close(ws_receiver));

    tokio::select! {
        _ = &mut output_task => input_task.abort(),
        _ = &mut input_task => output_task.abort(),
    }
}

/// Consume client frames until the socket closes. Clients only listen on
/// these feeds, so anything they send is ignored.
async fn drain_until_close(mut ws_receiver: SplitStream<WebSocket>) {
    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Close(_)) => break,
            Err(e) => {
                debug!("WebSocket receive error: {}", e);
                break;
            }
            _ => {}
        }
    }
}
