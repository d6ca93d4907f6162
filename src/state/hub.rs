use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dto::{
        sse::{ROOMS_EVENT, ServerEvent},
        ws::RegistryOutboundMessage,
    },
    services::registry_service::{Broadcaster, ObserverId},
    state::registry::RoomInfo,
};

#[derive(Clone)]
/// Handle used to push messages to a connected observer.
pub struct ObserverConnection {
    /// Id handed out by [`ObserverHub::connect`].
    pub id: ObserverId,
    /// Outbound queue drained by the connection's writer task.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Every party watching the room list: WebSocket connections and SSE subscribers.
pub struct ObserverHub {
    connections: DashMap<ObserverId, ObserverConnection>,
    sse: SseHub,
}

impl ObserverHub {
    /// Build a hub whose SSE channel buffers `sse_capacity` events per subscriber.
    pub fn new(sse_capacity: usize) -> Self {
        Self {
            connections: DashMap::new(),
            sse: SseHub::new(sse_capacity),
        }
    }

    /// Register a WebSocket writer queue and return its observer id.
    pub fn connect(&self, tx: mpsc::UnboundedSender<Message>) -> ObserverId {
        let id = Uuid::new_v4();
        self.connections.insert(id, ObserverConnection { id, tx });
        id
    }

    /// Forget a WebSocket observer.
    pub fn disconnect(&self, id: &ObserverId) {
        self.connections.remove(id);
    }

    /// Connected WebSocket observers.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no WebSocket observer is connected.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Broadcast hub used for the rooms SSE stream.
    pub fn sse(&self) -> &SseHub {
        &self.sse
    }
}

/// Serialize a rooms list once so it can be cloned into every queue.
fn rooms_payload(rooms: &[RoomInfo]) -> Option<String> {
    let message = RegistryOutboundMessage::RoomsList {
        rooms: rooms.to_vec(),
    };
    match serde_json::to_string(&message) {
        Ok(payload) => Some(payload),
        Err(err) => {
            warn!(error = %err, "failed to serialize rooms list");
            None
        }
    }
}

impl Broadcaster for ObserverHub {
    fn unicast(&self, observer: ObserverId, rooms: &[RoomInfo]) {
        let Some(tx) = self.connections.get(&observer).map(|conn| conn.tx.clone()) else {
            debug!(observer = %observer, "observer left before its rooms list was sent");
            return;
        };
        let Some(payload) = rooms_payload(rooms) else {
            return;
        };
        if tx.send(Message::Text(payload.into())).is_err() {
            self.disconnect(&observer);
        }
    }

    fn broadcast(&self, rooms: &[RoomInfo]) {
        let Some(payload) = rooms_payload(rooms) else {
            return;
        };

        let closed: Vec<ObserverId> = self
            .connections
            .iter()
            .filter(|conn| conn.tx.send(Message::Text(payload.clone().into())).is_err())
            .map(|conn| conn.id)
            .collect();
        for id in closed {
            debug!(observer = %id, "dropping closed observer");
            self.disconnect(&id);
        }

        self.sse.broadcast(ServerEvent {
            event: Some(ROOMS_EVENT.into()),
            data: payload,
        });
    }
}

/// Simple broadcast hub wrapper used by the SSE services.
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Send an event to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(code: &str) -> RoomInfo {
        RoomInfo {
            code: code.into(),
            host: "Ann".into(),
            subject_name: "Maya".into(),
            player_count: 1,
            created_at: 1,
            last_update: 1,
        }
    }

    fn text(message: Message) -> serde_json::Value {
        match message {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn broadcast_reaches_every_observer_and_sse() {
        let hub = ObserverHub::new(4);
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        hub.connect(tx_a);
        hub.connect(tx_b);
        let mut sse = hub.sse().subscribe();

        hub.broadcast(&[room("ABC123")]);

        for rx in [&mut rx_a, &mut rx_b] {
            let payload = text(rx.try_recv().unwrap());
            assert_eq!(payload["type"], "ROOMS_LIST");
            assert_eq!(payload["rooms"][0]["code"], "ABC123");
        }
        let event = sse.try_recv().unwrap();
        assert_eq!(event.event.as_deref(), Some(ROOMS_EVENT));
    }

    #[test]
    fn closed_observers_are_dropped_without_affecting_others() {
        let hub = ObserverHub::new(4);
        let (tx_dead, rx_dead) = mpsc::unbounded_channel();
        let (tx_live, mut rx_live) = mpsc::unbounded_channel();
        hub.connect(tx_dead);
        hub.connect(tx_live);
        drop(rx_dead);

        hub.broadcast(&[]);

        assert_eq!(hub.len(), 1);
        assert_eq!(text(rx_live.try_recv().unwrap())["rooms"], serde_json::json!([]));
    }

    #[test]
    fn unicast_targets_a_single_observer() {
        let hub = ObserverHub::new(4);
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let a = hub.connect(tx_a);
        hub.connect(tx_b);

        hub.unicast(a, &[room("ABC123")]);

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());

        // Unknown observers are ignored.
        hub.unicast(Uuid::new_v4(), &[]);
    }
}
