use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::{
    dto::{
        sse::{ROOMS_EVENT, ServerEvent},
        ws::RegistryOutboundMessage,
    },
    error::ServiceError,
    state::SharedState,
};

/// Subscribe to room list updates and fetch the list to open the stream with.
///
/// The subscription is taken before the snapshot so no update can fall in between.
pub async fn subscribe_rooms(
    state: &SharedState,
) -> Result<(ServerEvent, broadcast::Receiver<ServerEvent>), ServiceError> {
    let receiver = state.observers().sse().subscribe();
    let rooms = state.registry().snapshot().await?;
    let initial = ServerEvent::json(
        Some(ROOMS_EVENT.to_string()),
        &RegistryOutboundMessage::RoomsList { rooms },
    )?;
    Ok((initial, receiver))
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}

/// Convert a broadcast receiver into an SSE response, forwarding events and
/// cleaning up once the client disconnects.
pub fn to_sse_stream(
    initial: ServerEvent,
    mut receiver: broadcast::Receiver<ServerEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    // forwarder task: reads from broadcast and pushes into mpsc
    tokio::spawn(async move {
        if tx.send(Ok(to_event(initial))).await.is_err() {
            return;
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            if tx.send(Ok(to_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            // Every event is a full list, so the next one catches the client up.
                            warn!(skipped, "rooms SSE subscriber lagged");
                            continue;
                        }
                    }
                }
            }
        }

        info!("rooms SSE stream disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{body::Body, response::IntoResponse};
    use futures::StreamExt;

    use super::*;
    use crate::{
        dao::kv_store::memory::MemoryKvStore,
        services::registry_service::RegistryConfig,
        state::{AppState, clock::ManualClock, registry::RoomDraft},
    };

    async fn state() -> SharedState {
        AppState::bootstrap(
            RegistryConfig::default(),
            Arc::new(MemoryKvStore::new()),
            Arc::new(ManualClock::new(1_000)),
        )
        .await
    }

    fn draft(code: &str) -> RoomDraft {
        RoomDraft {
            code: code.into(),
            host: "Ann".into(),
            subject_name: "Maya".into(),
            player_count: 1,
        }
    }

    /// Read body chunks until one complete SSE event has arrived.
    async fn next_event(body: &mut axum::body::BodyDataStream) -> String {
        let mut buffer = String::new();
        while !buffer.contains("\n\n") {
            let chunk = body.next().await.unwrap().unwrap();
            buffer.push_str(std::str::from_utf8(&chunk).unwrap());
        }
        buffer
    }

    fn field<'a>(event: &'a str, name: &str) -> Option<&'a str> {
        event
            .lines()
            .find_map(|line| line.strip_prefix(name)?.strip_prefix(':'))
            .map(str::trim)
    }

    fn data_line(event: &str) -> serde_json::Value {
        serde_json::from_str(field(event, "data").unwrap()).unwrap()
    }

    #[tokio::test]
    async fn initial_event_carries_current_rooms() {
        let state = state().await;
        state.registry().register_room(draft("ABC123")).await.unwrap();

        let (initial, _receiver) = subscribe_rooms(&state).await.unwrap();

        assert_eq!(initial.event.as_deref(), Some(ROOMS_EVENT));
        let payload: serde_json::Value = serde_json::from_str(&initial.data).unwrap();
        assert_eq!(payload["type"], "ROOMS_LIST");
        assert_eq!(payload["rooms"][0]["code"], "ABC123");
    }

    #[tokio::test]
    async fn stream_sends_snapshot_then_changes() {
        let state = state().await;
        state.registry().register_room(draft("ABC123")).await.unwrap();

        let (initial, receiver) = subscribe_rooms(&state).await.unwrap();
        let response = to_sse_stream(initial, receiver).into_response();
        let mut body = Body::into_data_stream(response.into_body());

        let first = next_event(&mut body).await;
        assert_eq!(field(&first, "event"), Some(ROOMS_EVENT), "{first}");
        assert_eq!(data_line(&first)["rooms"][0]["code"], "ABC123");

        state.registry().register_room(draft("XYZ789")).await.unwrap();

        let second = next_event(&mut body).await;
        assert_eq!(field(&second, "event"), Some(ROOMS_EVENT), "{second}");
        assert_eq!(data_line(&second)["rooms"].as_array().unwrap().len(), 2);
    }
}
