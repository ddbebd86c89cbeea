//! Live session bookkeeping and output fan-out.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, broadcast};
use tracing::{debug, info, warn};

use crate::persist::{PersistenceBridge, SessionStatus};
use crate::process::{ProcessBackend, ProcessEvent, ProcessEvents};

use super::buffer::ReplayBuffer;
use super::types::{AttachGrant, RegistryConfig, RegistryError, RegistryStats, SessionEvent};

/// One live session: the broadcast fan-out plus everything mutated under the
/// per-session lock.
struct SessionSlot {
    session_id: String,
    event_tx: broadcast::Sender<SessionEvent>,
    inner: Mutex<SlotInner>,
}

struct SlotInner {
    spawned: bool,
    replay: ReplayBuffer,
    clients: HashSet<String>,
}

/// Registry of live sessions.
///
/// The outer map lock only guards map edits and is never held across await
/// points that touch a slot. Per-slot work serialises on the slot's own
/// mutex, so operations on different sessions never contend.
///
/// Lock order is always slot-then-map; the map lock is never held while
/// waiting on a slot.
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Arc<SessionSlot>>>>,
    backend: Arc<dyn ProcessBackend>,
    bridge: PersistenceBridge,
    config: RegistryConfig,
}

impl SessionRegistry {
    pub fn new(
        backend: Arc<dyn ProcessBackend>,
        bridge: PersistenceBridge,
        config: RegistryConfig,
    ) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            backend,
            bridge,
            config,
        }
    }

    /// Attach a client to a session, spawning its process if this is the
    /// first attach (or the first after an exit).
    ///
    /// The replay snapshot and the live subscription are taken under the
    /// same slot lock the output pump publishes under, so the pair covers
    /// the output stream with no gap and no duplication.
    pub async fn attach(
        &self,
        session_id: &str,
        client_id: &str,
    ) -> Result<AttachGrant, RegistryError> {
        loop {
            let slot = self.get_or_create_slot(session_id).await;
            let mut inner = slot.inner.lock().await;

            // The slot may have been retired (process exit, failed spawn)
            // while we waited for its lock. Start over on a fresh one.
            let current = self.sessions.read().await.get(session_id).map(Arc::clone);
            match current {
                Some(ref cur) if Arc::ptr_eq(cur, &slot) => {}
                _ => continue,
            }

            if !inner.spawned {
                let events = match self.backend.spawn(session_id, self.config.geometry).await {
                    Ok(events) => events,
                    Err(e) => {
                        warn!(session_id, error = %e, "Process spawn failed");
                        if inner.clients.is_empty() {
                            self.sessions.write().await.remove(session_id);
                        }
                        return Err(e.into());
                    }
                };
                inner.spawned = true;
                self.spawn_output_pump(Arc::clone(&slot), events);
                self.bridge.set_status(session_id, SessionStatus::Active);
                info!(session_id, "Session process spawned");
            }

            let replay = inner.replay.snapshot();
            let events = slot.event_tx.subscribe();
            inner.clients.insert(client_id.to_string());
            debug!(
                session_id,
                client_id,
                clients = inner.clients.len(),
                "Client attached"
            );
            return Ok(AttachGrant { replay, events });
        }
    }

    /// Detach a client. The process keeps running even when the last client
    /// leaves; sessions only end when their process exits or is killed.
    pub async fn detach(&self, session_id: &str, client_id: &str) {
        let slot = self.sessions.read().await.get(session_id).map(Arc::clone);
        if let Some(slot) = slot {
            let mut inner = slot.inner.lock().await;
            if inner.clients.remove(client_id) {
                debug!(
                    session_id,
                    client_id,
                    clients = inner.clients.len(),
                    "Client detached"
                );
            }
        }
    }

    /// Forward input bytes to the session's process.
    pub async fn write(&self, session_id: &str, data: &str) -> Result<(), RegistryError> {
        if !self.exists(session_id).await {
            return Err(RegistryError::SessionNotFound {
                session_id: session_id.to_string(),
            });
        }
        self.backend.write(session_id, data).await?;
        Ok(())
    }

    /// Resize the session's terminal.
    pub async fn resize(
        &self,
        session_id: &str,
        cols: u16,
        rows: u16,
    ) -> Result<(), RegistryError> {
        if !self.exists(session_id).await {
            return Err(RegistryError::SessionNotFound {
                session_id: session_id.to_string(),
            });
        }
        self.backend.resize(session_id, cols, rows).await?;
        Ok(())
    }

    /// Terminate a session's process. Idempotent.
    pub async fn kill(&self, session_id: &str, signal: Option<i32>) -> Result<(), RegistryError> {
        self.backend.kill(session_id, signal).await?;
        Ok(())
    }

    pub async fn exists(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    /// Current replay snapshot, empty for unknown sessions.
    pub async fn replay(&self, session_id: &str) -> String {
        let slot = self.sessions.read().await.get(session_id).map(Arc::clone);
        match slot {
            Some(slot) => slot.inner.lock().await.replay.snapshot(),
            None => String::new(),
        }
    }

    pub async fn stats(&self) -> RegistryStats {
        let slots: Vec<Arc<SessionSlot>> =
            self.sessions.read().await.values().cloned().collect();
        let mut total_clients = 0;
        for slot in &slots {
            total_clients += slot.inner.lock().await.clients.len();
        }
        RegistryStats {
            session_count: slots.len(),
            total_clients,
        }
    }

    /// Kill every live session, for daemon shutdown.
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        for session_id in ids {
            if let Err(e) = self.backend.kill(&session_id, None).await {
                warn!(session_id, error = %e, "Kill during shutdown failed");
            }
        }
    }

    async fn get_or_create_slot(&self, session_id: &str) -> Arc<SessionSlot> {
        let mut sessions = self.sessions.write().await;
        Arc::clone(sessions.entry(session_id.to_string()).or_insert_with(|| {
            let (event_tx, _) = broadcast::channel(self.config.broadcast_capacity);
            Arc::new(SessionSlot {
                session_id: session_id.to_string(),
                event_tx,
                inner: Mutex::new(SlotInner {
                    spawned: false,
                    replay: ReplayBuffer::new(self.config.replay_capacity),
                    clients: HashSet::new(),
                }),
            })
        }))
    }

    fn spawn_output_pump(&self, slot: Arc<SessionSlot>, mut events: ProcessEvents) {
        let sessions = Arc::clone(&self.sessions);
        let bridge = self.bridge.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    ProcessEvent::Output(chunk) => {
                        let snapshot = {
                            let mut inner = slot.inner.lock().await;
                            inner.replay.push(&chunk);
                            // Publish under the slot lock: attach snapshots
                            // and subscribes under the same lock, so a chunk
                            // lands in exactly one of replay or live stream
                            // for every client.
                            let _ = slot.event_tx.send(SessionEvent::Output(chunk));
                            inner.replay.snapshot()
                        };
                        bridge.mirror_output(&slot.session_id, snapshot);
                    }
                    ProcessEvent::Exit { code, .. } => {
                        // Retire the slot before broadcasting so a racing
                        // attach restarts on a fresh slot instead of
                        // subscribing to a dead one.
                        let inner = slot.inner.lock().await;
                        sessions.write().await.remove(&slot.session_id);
                        let _ = slot.event_tx.send(SessionEvent::Exit { exit_code: code });
                        drop(inner);

                        bridge.set_status(&slot.session_id, SessionStatus::Terminated);
                        info!(
                            session_id = %slot.session_id,
                            exit_code = code,
                            "Session terminated"
                        );
                        break;
                    }
                }
            }
        });
    }
}
