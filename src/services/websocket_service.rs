use std::ops::ControlFlow;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    dto::ws::{RegistryInboundMessage, RegistryOutboundMessage},
    error::{CommandError, ServiceError},
    services::registry_service::ObserverId,
    state::SharedState,
};

/// Handle the full lifecycle for an individual registry WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let observer = state.observers().connect(outbound_tx.clone());
    info!(observer = %observer, "observer connected");

    if let Err(err) = state.registry().attach(observer).await {
        warn!(observer = %observer, error = %err, "cannot send initial rooms list");
        state.observers().disconnect(&observer);
        finalize(writer_task, outbound_tx).await;
        return;
    }

    while let Some(message) = receiver.next().await {
        let message = match message {
            Ok(message) => message,
            Err(err) => {
                warn!(observer = %observer, error = %err, "websocket error");
                break;
            }
        };
        if handle_frame(&state, observer, &outbound_tx, message)
            .await
            .is_break()
        {
            break;
        }
    }

    state.observers().disconnect(&observer);
    info!(observer = %observer, "observer disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Process one inbound frame. Breaks when the session should end.
async fn handle_frame(
    state: &SharedState,
    observer: ObserverId,
    tx: &mpsc::UnboundedSender<Message>,
    message: Message,
) -> ControlFlow<()> {
    match message {
        Message::Text(text) => {
            debug!(observer = %observer, payload = %text, "received registry message");

            match RegistryInboundMessage::from_json_str(text.as_str()) {
                Ok(command) => {
                    if let Err(err) = dispatch(state, observer, command).await {
                        warn!(observer = %observer, error = %err, "registry command failed");
                        if matches!(err, ServiceError::RegistryUnavailable) {
                            return ControlFlow::Break(());
                        }
                    }
                }
                Err(err) => reject(tx, observer, &err),
            }
        }
        Message::Binary(_) => {
            reject(
                tx,
                observer,
                &CommandError::invalid("binary frames are not supported"),
            );
        }
        Message::Ping(payload) => {
            let _ = tx.send(Message::Pong(payload));
        }
        Message::Close(frame) => {
            info!(observer = %observer, "observer closed");
            let _ = tx.send(Message::Close(frame));
            return ControlFlow::Break(());
        }
        Message::Pong(_) => {}
    }
    ControlFlow::Continue(())
}

/// Route one admitted command to the registry.
///
/// `GET_ROOMS` is answered to `observer` alone; mutations reach every observer
/// through the registry broadcast.
pub async fn dispatch(
    state: &SharedState,
    observer: ObserverId,
    command: RegistryInboundMessage,
) -> Result<(), ServiceError> {
    let registry = state.registry();
    match command {
        RegistryInboundMessage::GetRooms => registry.send_rooms_to(observer).await,
        RegistryInboundMessage::RegisterRoom { room } => registry.register_room(room).await.map(drop),
        RegistryInboundMessage::UpdateRoom { code, player_count } => {
            registry.update_room(code, player_count).await.map(drop)
        }
        RegistryInboundMessage::RemoveRoom { code } => registry.remove_room(code).await.map(drop),
        RegistryInboundMessage::ClearAllRooms => registry.clear_all_rooms().await.map(drop),
    }
}

/// Acknowledge a frame that was not admitted. The registry is not touched.
fn reject(tx: &mpsc::UnboundedSender<Message>, observer: ObserverId, err: &CommandError) {
    warn!(observer = %observer, error = %err, "rejected registry message");
    send_message_to_websocket(tx, &RegistryOutboundMessage::invalid_command(err));
}

/// Serialize a payload and push it onto the provided WebSocket sender.
fn send_message_to_websocket<T>(tx: &mpsc::UnboundedSender<Message>, value: &T)
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    match serde_json::to_string(value) {
        Ok(payload) => {
            let _ = tx.send(Message::Text(payload.into()));
        }
        Err(err) => warn!(error = %err, "failed to serialize message `{value:?}`"),
    }
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
