use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{ws::{Message, WebSocket}, State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};

use crate::hub::{Hub, InboundError};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn hub_ws(
    State(hub): State<Arc<Hub>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |stream| serve_session(hub, stream))
}

/// Reader loop for one connection. Frames are handed to the hub strictly in
/// arrival order; a writer task drains the session's outbox to the socket.
async fn serve_session(hub: Arc<Hub>, stream: WebSocket) {
    let (mut session, mut outbox) = hub.connect().await;
    let (mut sender, mut receiver) = stream.split();
    let session_id = session.id();

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbox.recv().await {
            if let Err(e) = sender.send(Message::Text(frame)).await {
                tracing::debug!(session_id, error = %e, "Socket write failed");
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match hub.handle_frame(&mut session, text.as_str()).await {
                Ok(()) => {}
                Err(InboundError::Malformed(e)) => {
                    tracing::warn!(session_id, error = %e, "Discarding malformed frame");
                }
                Err(e @ InboundError::Closed(_)) => {
                    tracing::debug!(session_id, error = %e, "Frame after close");
                    break;
                }
            },
            Ok(Message::Binary(_)) => {
                tracing::debug!(session_id, "Ignoring binary frame");
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Err(e) => {
                tracing::debug!(session_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    hub.disconnect(&mut session).await;

    // Unbinding dropped the outbox sender; the writer exits once the queue is flushed.
    if let Err(e) = writer.await {
        tracing::debug!(session_id, error = %e, "Writer task ended abnormally");
    }
}
