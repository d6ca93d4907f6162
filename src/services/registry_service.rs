//! Single-writer room registry.
//!
//! One Tokio task owns the [`RegistryState`] and processes commands from an mpsc
//! channel one at a time. Each command is applied in memory, fanned out to
//! observers, then persisted before the next command is looked at, so stored
//! snapshots always follow command order. Persistence is best effort: a failed
//! or slow write is logged and counted, never rolled back.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, oneshot},
    time::{Instant, MissedTickBehavior, interval_at, timeout},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        kv_store::KvStore,
        storage::{StorageError, StorageResult},
    },
    error::ServiceError,
    state::{
        clock::Clock,
        registry::{RegistryState, RoomDraft, RoomInfo},
    },
};

/// Storage key holding the whole registry snapshot.
pub const STATE_KEY: &str = "state";
/// Rooms without an update for longer than this are evicted.
pub const DEFAULT_STALE_THRESHOLD: Duration = Duration::from_secs(5 * 60);
/// Upper bound on a single storage call.
pub const DEFAULT_PERSIST_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_COMMAND_CAPACITY: usize = 256;

/// Identifier of one connected observer.
pub type ObserverId = Uuid;

/// Delivery side of the registry: per-observer send and fan-out to everyone.
///
/// Implementations must not block; a slow or dead observer only affects itself.
pub trait Broadcaster: Send + Sync {
    /// Send the room list to a single observer.
    fn unicast(&self, observer: ObserverId, rooms: &[RoomInfo]);
    /// Send the room list to every connected observer.
    fn broadcast(&self, rooms: &[RoomInfo]);
}

/// Tunables of a registry instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Maximum age of `last_update` before a room is evicted.
    pub stale_threshold: Duration,
    /// Run an eviction pass on this period in addition to the one on every `GET_ROOMS`.
    pub sweep_interval: Option<Duration>,
    /// Timeout applied to every storage call.
    pub persist_timeout: Duration,
    /// Commands that may queue up before callers wait.
    pub command_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            stale_threshold: DEFAULT_STALE_THRESHOLD,
            sweep_interval: None,
            persist_timeout: DEFAULT_PERSIST_TIMEOUT,
            command_capacity: DEFAULT_COMMAND_CAPACITY,
        }
    }
}

/// Counters exposed to the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// Live rooms held in memory.
    pub rooms: usize,
    /// Storage writes that failed or timed out since startup.
    pub persist_failures: u64,
}

enum RegistryCommand {
    GetRooms {
        observer: Option<ObserverId>,
        reply: oneshot::Sender<Vec<RoomInfo>>,
    },
    Snapshot {
        observer: Option<ObserverId>,
        reply: oneshot::Sender<Vec<RoomInfo>>,
    },
    Register {
        draft: RoomDraft,
        reply: oneshot::Sender<RoomInfo>,
    },
    Update {
        code: String,
        player_count: u32,
        reply: oneshot::Sender<Option<RoomInfo>>,
    },
    Remove {
        code: String,
        reply: oneshot::Sender<bool>,
    },
    ClearAll {
        reply: oneshot::Sender<usize>,
    },
    Stats {
        reply: oneshot::Sender<RegistryStats>,
    },
}

/// Cloneable handle to a running registry. The registry stops once every handle is dropped.
#[derive(Clone)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Hydrate the registry from `store`, evict stale rooms and start serving commands.
    pub async fn spawn(
        config: RegistryConfig,
        store: Arc<dyn KvStore>,
        broadcaster: Arc<dyn Broadcaster>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.command_capacity.max(1));
        let mut actor = RegistryActor {
            state: RegistryState::new(),
            config,
            store,
            broadcaster,
            clock,
            persist_failures: 0,
        };
        actor.hydrate().await;
        tokio::spawn(actor.run(receiver));
        Self { sender }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RegistryCommand,
    ) -> Result<T, ServiceError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(build(reply_tx))
            .await
            .map_err(|_| ServiceError::RegistryUnavailable)?;
        reply_rx.await.map_err(|_| ServiceError::RegistryUnavailable)
    }

    /// Evict stale rooms and return the live ones.
    pub async fn get_rooms(&self) -> Result<Vec<RoomInfo>, ServiceError> {
        self.request(|reply| RegistryCommand::GetRooms {
            observer: None,
            reply,
        })
        .await
    }

    /// Evict stale rooms and unicast the live ones to `observer`.
    pub async fn send_rooms_to(&self, observer: ObserverId) -> Result<(), ServiceError> {
        self.request(|reply| RegistryCommand::GetRooms {
            observer: Some(observer),
            reply,
        })
        .await
        .map(drop)
    }

    /// Current rooms, without an eviction pass.
    pub async fn snapshot(&self) -> Result<Vec<RoomInfo>, ServiceError> {
        self.request(|reply| RegistryCommand::Snapshot {
            observer: None,
            reply,
        })
        .await
    }

    /// Greet a freshly connected observer with the current rooms, without an eviction pass.
    ///
    /// The list is sent from inside the registry task, so it can never overtake a
    /// later broadcast queued for the same observer.
    pub async fn attach(&self, observer: ObserverId) -> Result<(), ServiceError> {
        self.request(|reply| RegistryCommand::Snapshot {
            observer: Some(observer),
            reply,
        })
        .await
        .map(drop)
    }

    /// Advertise a room, replacing any room that used the same code.
    pub async fn register_room(&self, draft: RoomDraft) -> Result<RoomInfo, ServiceError> {
        self.request(|reply| RegistryCommand::Register { draft, reply })
            .await
    }

    /// Record a new player count. Returns `None` when the code is unknown.
    pub async fn update_room(
        &self,
        code: impl Into<String>,
        player_count: u32,
    ) -> Result<Option<RoomInfo>, ServiceError> {
        let code = code.into();
        self.request(|reply| RegistryCommand::Update {
            code,
            player_count,
            reply,
        })
        .await
    }

    /// Stop advertising a room. Returns whether it existed.
    pub async fn remove_room(&self, code: impl Into<String>) -> Result<bool, ServiceError> {
        let code = code.into();
        self.request(|reply| RegistryCommand::Remove { code, reply })
            .await
    }

    /// Drop every room. Returns how many were removed.
    pub async fn clear_all_rooms(&self) -> Result<usize, ServiceError> {
        self.request(|reply| RegistryCommand::ClearAll { reply })
            .await
    }

    /// Room count and persistence failure counter.
    pub async fn stats(&self) -> Result<RegistryStats, ServiceError> {
        self.request(|reply| RegistryCommand::Stats { reply })
            .await
    }
}

struct RegistryActor {
    state: RegistryState,
    config: RegistryConfig,
    store: Arc<dyn KvStore>,
    broadcaster: Arc<dyn Broadcaster>,
    clock: Arc<dyn Clock>,
    persist_failures: u64,
}

impl RegistryActor {
    async fn run(mut self, mut receiver: mpsc::Receiver<RegistryCommand>) {
        let mut sweep = self.config.sweep_interval.map(|period| {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });

        loop {
            let command = match sweep.as_mut() {
                Some(ticker) => tokio::select! {
                    command = receiver.recv() => command,
                    _ = ticker.tick() => {
                        self.sweep().await;
                        continue;
                    }
                },
                None => receiver.recv().await,
            };

            let Some(command) = command else {
                break;
            };
            self.handle(command).await;
        }

        info!(rooms = self.state.len(), "room registry stopped");
    }

    async fn hydrate(&mut self) {
        match self.load().await {
            Ok(Some(blob)) => match RegistryState::from_blob(blob) {
                Ok(state) => self.state = state,
                Err(err) => warn!(error = %err, "stored registry state is unreadable; starting empty"),
            },
            Ok(None) => info!("no stored registry state; starting empty"),
            Err(err) => warn!(error = %err, "failed to load registry state; starting empty"),
        }

        let evicted = self.evict_stale();
        info!(
            rooms = self.state.len(),
            evicted,
            backend = self.store.backend(),
            "room registry hydrated"
        );
        if evicted > 0 {
            self.persist().await;
        }
    }

    async fn handle(&mut self, command: RegistryCommand) {
        match command {
            RegistryCommand::GetRooms { observer, reply } => {
                self.evict_stale();
                let rooms = self.state.rooms();
                if let Some(observer) = observer {
                    self.broadcaster.unicast(observer, &rooms);
                }
                self.persist().await;
                let _ = reply.send(rooms);
            }
            RegistryCommand::Snapshot { observer, reply } => {
                let rooms = self.state.rooms();
                if let Some(observer) = observer {
                    self.broadcaster.unicast(observer, &rooms);
                }
                let _ = reply.send(rooms);
            }
            RegistryCommand::Register { draft, reply } => {
                let room = self.state.register(draft, self.clock.now_ms());
                info!(code = %room.code, host = %room.host, "room registered");
                self.broadcast();
                self.persist().await;
                let _ = reply.send(room);
            }
            RegistryCommand::Update {
                code,
                player_count,
                reply,
            } => {
                let updated =
                    self.state
                        .update_player_count(&code, player_count, self.clock.now_ms());
                if updated.is_some() {
                    debug!(code = %code, player_count, "room updated");
                    self.broadcast();
                } else {
                    debug!(code = %code, "update for unknown room ignored");
                }
                self.persist().await;
                let _ = reply.send(updated);
            }
            RegistryCommand::Remove { code, reply } => {
                let removed = self.state.remove(&code).is_some();
                if removed {
                    info!(code = %code, "room removed");
                } else {
                    debug!(code = %code, "remove for unknown room");
                }
                self.broadcast();
                self.persist().await;
                let _ = reply.send(removed);
            }
            RegistryCommand::ClearAll { reply } => {
                let removed = self.state.clear();
                info!(removed, "all rooms cleared");
                self.broadcast();
                self.persist().await;
                let _ = reply.send(removed);
            }
            RegistryCommand::Stats { reply } => {
                let _ = reply.send(RegistryStats {
                    rooms: self.state.len(),
                    persist_failures: self.persist_failures,
                });
            }
        }
    }

    async fn sweep(&mut self) {
        if self.evict_stale() > 0 {
            self.broadcast();
            self.persist().await;
        }
    }

    fn evict_stale(&mut self) -> usize {
        let removed = self
            .state
            .evict_stale(self.clock.now_ms(), self.config.stale_threshold);
        if removed > 0 {
            info!(removed, "cleaned up stale rooms");
        }
        removed
    }

    fn broadcast(&self) {
        self.broadcaster.broadcast(&self.state.rooms());
    }

    async fn load(&self) -> StorageResult<Option<serde_json::Value>> {
        let limit = self.config.persist_timeout;
        timeout(limit, self.store.get(STATE_KEY))
            .await
            .unwrap_or(Err(StorageError::Timeout(limit)))
    }

    async fn persist(&mut self) {
        let result = match self.state.to_blob() {
            Ok(blob) => {
                let limit = self.config.persist_timeout;
                timeout(limit, self.store.put(STATE_KEY, blob))
                    .await
                    .unwrap_or(Err(StorageError::Timeout(limit)))
            }
            Err(source) => Err(StorageError::Codec {
                key: STATE_KEY.into(),
                source,
            }),
        };

        if let Err(err) = result {
            self.persist_failures += 1;
            warn!(
                error = %err,
                failures = self.persist_failures,
                "failed to persist registry state; keeping in-memory state"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures::future::{BoxFuture, pending};
    use serde_json::Value;

    use super::*;
    use crate::{dao::kv_store::memory::MemoryKvStore, state::clock::ManualClock};

    const START: u64 = 1_700_000_000_000;

    #[derive(Default)]
    struct Recorder {
        broadcasts: Mutex<Vec<Vec<RoomInfo>>>,
        unicasts: Mutex<Vec<(ObserverId, Vec<RoomInfo>)>>,
    }

    impl Recorder {
        fn broadcasts(&self) -> Vec<Vec<RoomInfo>> {
            self.broadcasts.lock().unwrap().clone()
        }

        fn unicasts(&self) -> Vec<(ObserverId, Vec<RoomInfo>)> {
            self.unicasts.lock().unwrap().clone()
        }
    }

    impl Broadcaster for Recorder {
        fn unicast(&self, observer: ObserverId, rooms: &[RoomInfo]) {
            self.unicasts
                .lock()
                .unwrap()
                .push((observer, rooms.to_vec()));
        }

        fn broadcast(&self, rooms: &[RoomInfo]) {
            self.broadcasts.lock().unwrap().push(rooms.to_vec());
        }
    }

    struct BrokenStore;

    impl KvStore for BrokenStore {
        fn backend(&self) -> &'static str {
            "broken"
        }

        fn get(&self, _key: &str) -> BoxFuture<'static, StorageResult<Option<Value>>> {
            Box::pin(async {
                Err(StorageError::unavailable(
                    "down".into(),
                    std::io::Error::other("down"),
                ))
            })
        }

        fn put(&self, _key: &str, _value: Value) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(async {
                Err(StorageError::unavailable(
                    "down".into(),
                    std::io::Error::other("down"),
                ))
            })
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    struct HangingStore;

    impl KvStore for HangingStore {
        fn backend(&self) -> &'static str {
            "hanging"
        }

        fn get(&self, _key: &str) -> BoxFuture<'static, StorageResult<Option<Value>>> {
            Box::pin(pending())
        }

        fn put(&self, _key: &str, _value: Value) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(pending())
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(pending())
        }
    }

    fn draft(code: &str, players: u32) -> RoomDraft {
        RoomDraft {
            code: code.into(),
            host: "Ann".into(),
            subject_name: "Maya".into(),
            player_count: players,
        }
    }

    async fn spawn_with(
        config: RegistryConfig,
        store: Arc<dyn KvStore>,
    ) -> (RegistryHandle, Arc<Recorder>, Arc<ManualClock>) {
        let recorder = Arc::new(Recorder::default());
        let clock = Arc::new(ManualClock::new(START));
        let handle =
            RegistryHandle::spawn(config, store, recorder.clone(), clock.clone()).await;
        (handle, recorder, clock)
    }

    #[tokio::test]
    async fn each_mutation_broadcasts_once() {
        let store = MemoryKvStore::new();
        let (registry, recorder, _clock) =
            spawn_with(RegistryConfig::default(), Arc::new(store)).await;

        registry.register_room(draft("ABC123", 1)).await.unwrap();
        registry.update_room("ABC123", 2).await.unwrap();
        registry.remove_room("ABC123").await.unwrap();
        registry.clear_all_rooms().await.unwrap();

        let broadcasts = recorder.broadcasts();
        assert_eq!(broadcasts.len(), 4);
        assert_eq!(broadcasts[0][0].player_count, 1);
        assert_eq!(broadcasts[1][0].player_count, 2);
        assert!(broadcasts[2].is_empty());
        assert!(broadcasts[3].is_empty());
    }

    #[tokio::test]
    async fn unknown_codes_leave_rooms_untouched() {
        let store = MemoryKvStore::new();
        let (registry, recorder, _clock) =
            spawn_with(RegistryConfig::default(), Arc::new(store)).await;
        registry.register_room(draft("ABC123", 1)).await.unwrap();
        let before = registry.snapshot().await.unwrap();

        assert_eq!(registry.update_room("ZZZ999", 4).await.unwrap(), None);
        assert_eq!(recorder.broadcasts().len(), 1, "unknown update stays quiet");

        assert!(!registry.remove_room("ZZZ999").await.unwrap());
        let broadcasts = recorder.broadcasts();
        assert_eq!(broadcasts.len(), 2, "remove always re-announces the list");
        assert_eq!(broadcasts[1], before);

        assert_eq!(registry.snapshot().await.unwrap(), before);
    }

    #[tokio::test]
    async fn queries_do_not_broadcast() {
        let (registry, recorder, _clock) = spawn_with(
            RegistryConfig::default(),
            Arc::new(MemoryKvStore::new()),
        )
        .await;
        registry.register_room(draft("ABC123", 1)).await.unwrap();

        let first = registry.get_rooms().await.unwrap();
        let second = registry.get_rooms().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(recorder.broadcasts().len(), 1);
    }

    #[tokio::test]
    async fn get_rooms_evicts_but_snapshot_does_not() {
        let (registry, _recorder, clock) = spawn_with(
            RegistryConfig::default(),
            Arc::new(MemoryKvStore::new()),
        )
        .await;
        registry.register_room(draft("ABC123", 1)).await.unwrap();
        clock.advance(DEFAULT_STALE_THRESHOLD + Duration::from_millis(1));

        assert_eq!(registry.snapshot().await.unwrap().len(), 1);
        assert!(registry.get_rooms().await.unwrap().is_empty());
        assert!(registry.snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn observer_requests_are_unicast() {
        let (registry, recorder, _clock) = spawn_with(
            RegistryConfig::default(),
            Arc::new(MemoryKvStore::new()),
        )
        .await;
        registry.register_room(draft("ABC123", 1)).await.unwrap();

        let observer = Uuid::new_v4();
        registry.attach(observer).await.unwrap();
        registry.send_rooms_to(observer).await.unwrap();

        let unicasts = recorder.unicasts();
        assert_eq!(unicasts.len(), 2);
        assert!(unicasts.iter().all(|(id, rooms)| *id == observer && rooms.len() == 1));
        assert_eq!(recorder.broadcasts().len(), 1);
    }

    #[tokio::test]
    async fn hydration_drops_stale_rooms_and_rewrites() {
        let store = MemoryKvStore::new();
        let mut seeded = RegistryState::new();
        seeded.register(draft("OLD", 1), START - 10 * 60 * 1000);
        seeded.register(draft("NEW", 2), START - 60 * 1000);
        store
            .put(STATE_KEY, seeded.to_blob().unwrap())
            .await
            .unwrap();

        let (registry, _recorder, _clock) =
            spawn_with(RegistryConfig::default(), Arc::new(store.clone())).await;

        let rooms = registry.snapshot().await.unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].code, "NEW");

        let persisted = RegistryState::from_blob(store.snapshot(STATE_KEY).unwrap()).unwrap();
        assert!(persisted.get("OLD").is_none());
    }

    #[tokio::test]
    async fn unreadable_snapshot_starts_empty() {
        let store = MemoryKvStore::new();
        store
            .put(STATE_KEY, serde_json::json!({"rooms": 5}))
            .await
            .unwrap();
        let (registry, _recorder, _clock) =
            spawn_with(RegistryConfig::default(), Arc::new(store)).await;
        assert!(registry.snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn persistence_failures_keep_memory_state() {
        let (registry, recorder, _clock) =
            spawn_with(RegistryConfig::default(), Arc::new(BrokenStore)).await;

        let room = registry.register_room(draft("ABC123", 1)).await.unwrap();
        assert_eq!(room.code, "ABC123");
        assert_eq!(registry.get_rooms().await.unwrap().len(), 1);
        assert_eq!(recorder.broadcasts().len(), 1);

        let stats = registry.stats().await.unwrap();
        assert_eq!(stats.rooms, 1);
        assert_eq!(stats.persist_failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_storage_times_out_instead_of_blocking() {
        let config = RegistryConfig {
            persist_timeout: Duration::from_millis(50),
            ..RegistryConfig::default()
        };
        let (registry, _recorder, _clock) = spawn_with(config, Arc::new(HangingStore)).await;

        registry.register_room(draft("ABC123", 3)).await.unwrap();
        let stats = registry.stats().await.unwrap();
        assert_eq!(stats.rooms, 1);
        assert_eq!(stats.persist_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_sweep_evicts_and_broadcasts() {
        let config = RegistryConfig {
            sweep_interval: Some(Duration::from_secs(30)),
            ..RegistryConfig::default()
        };
        let store = MemoryKvStore::new();
        let (registry, recorder, clock) = spawn_with(config, Arc::new(store.clone())).await;
        registry.register_room(draft("ABC123", 1)).await.unwrap();

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(recorder.broadcasts().len(), 1, "nothing stale yet");

        clock.advance(DEFAULT_STALE_THRESHOLD + Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(30)).await;

        let broadcasts = recorder.broadcasts();
        assert_eq!(broadcasts.len(), 2);
        assert!(broadcasts[1].is_empty());
        assert!(registry.snapshot().await.unwrap().is_empty());
        let persisted = RegistryState::from_blob(store.snapshot(STATE_KEY).unwrap()).unwrap();
        assert!(persisted.is_empty());
    }
}
