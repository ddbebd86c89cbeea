//! Synthetic process backend.
//!
//! Used when no real PTY should be spawned (tests, demos, hosts without a
//! usable shell). Each "process" greets with a banner, echoes input back the
//! way a terminal would, and answers every completed line with a canned
//! response. Deterministic enough for integration tests to assert on.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, mpsc};
use tracing::info;

use super::{ProcessBackend, ProcessError, ProcessEvent, ProcessEvents, PtyGeometry};

const BANNER_DELAY: Duration = Duration::from_millis(150);
const RESPONSE_DELAY: Duration = Duration::from_millis(30);

const BANNER: &str = "termhub synthetic session ready\r\n";
const RESPONSE: &str = "ok\r\n";

/// Synthetic [`ProcessBackend`] with no OS processes behind it.
#[derive(Default)]
pub struct FallbackBackend {
    procs: Arc<RwLock<HashMap<String, FallbackProcess>>>,
}

struct FallbackProcess {
    events_tx: mpsc::Sender<ProcessEvent>,
}

impl FallbackBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live synthetic processes.
    pub async fn active_count(&self) -> usize {
        self.procs.read().await.len()
    }
}

#[async_trait::async_trait]
impl ProcessBackend for FallbackBackend {
    async fn spawn(
        &self,
        session_id: &str,
        _geometry: PtyGeometry,
    ) -> Result<ProcessEvents, ProcessError> {
        let (events_tx, events_rx) = mpsc::channel::<ProcessEvent>(256);

        {
            let mut procs = self.procs.write().await;
            if procs.contains_key(session_id) {
                return Err(ProcessError::AlreadyExists {
                    session_id: session_id.to_string(),
                });
            }
            procs.insert(
                session_id.to_string(),
                FallbackProcess {
                    events_tx: events_tx.clone(),
                },
            );
        }

        info!(session_id, "Spawned synthetic process");

        tokio::spawn(async move {
            tokio::time::sleep(BANNER_DELAY).await;
            let _ = events_tx.send(ProcessEvent::Output(BANNER.into())).await;
        });

        Ok(events_rx)
    }

    async fn write(&self, session_id: &str, data: &str) -> Result<(), ProcessError> {
        let events_tx = self
            .procs
            .read()
            .await
            .get(session_id)
            .map(|p| p.events_tx.clone())
            .ok_or_else(|| ProcessError::NotRunning {
                session_id: session_id.to_string(),
            })?;

        // Terminal-style echo of whatever the driver typed.
        let _ = events_tx
            .send(ProcessEvent::Output(data.to_string()))
            .await;

        if data.contains('\n') || data.contains('\r') {
            tokio::spawn(async move {
                tokio::time::sleep(RESPONSE_DELAY).await;
                let _ = events_tx.send(ProcessEvent::Output(RESPONSE.into())).await;
            });
        }
        Ok(())
    }

    async fn resize(&self, _session_id: &str, _cols: u16, _rows: u16) -> Result<(), ProcessError> {
        Ok(())
    }

    async fn kill(&self, session_id: &str, _signal: Option<i32>) -> Result<(), ProcessError> {
        let Some(proc) = self.procs.write().await.remove(session_id) else {
            return Ok(());
        };
        let _ = proc
            .events_tx
            .send(ProcessEvent::Exit {
                code: 0,
                signal: None,
            })
            .await;
        info!(session_id, "Synthetic process terminated");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn next_event(events: &mut ProcessEvents) -> ProcessEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event before timeout")
            .expect("stream open")
    }

    #[tokio::test]
    async fn banner_then_echo_then_response() {
        let backend = FallbackBackend::new();
        let mut events = backend.spawn("s-1", PtyGeometry::default()).await.unwrap();

        assert_eq!(next_event(&mut events).await, ProcessEvent::Output(BANNER.into()));

        backend.write("s-1", "ls\n").await.unwrap();
        assert_eq!(next_event(&mut events).await, ProcessEvent::Output("ls\n".into()));
        assert_eq!(next_event(&mut events).await, ProcessEvent::Output(RESPONSE.into()));
    }

    #[tokio::test]
    async fn partial_input_echoes_without_response() {
        let backend = FallbackBackend::new();
        let mut events = backend.spawn("s-2", PtyGeometry::default()).await.unwrap();
        let _ = next_event(&mut events).await; // banner

        backend.write("s-2", "l").await.unwrap();
        assert_eq!(next_event(&mut events).await, ProcessEvent::Output("l".into()));

        // No trailing response for an incomplete line.
        let extra = tokio::time::timeout(Duration::from_millis(100), events.recv()).await;
        assert!(extra.is_err());
    }

    #[tokio::test]
    async fn kill_emits_exit_and_reaps() {
        let backend = FallbackBackend::new();
        let mut events = backend.spawn("s-3", PtyGeometry::default()).await.unwrap();
        let _ = next_event(&mut events).await; // banner

        backend.kill("s-3", None).await.unwrap();
        assert_eq!(
            next_event(&mut events).await,
            ProcessEvent::Exit { code: 0, signal: None }
        );
        assert_eq!(backend.active_count().await, 0);
        assert!(matches!(
            backend.write("s-3", "x").await,
            Err(ProcessError::NotRunning { .. })
        ));

        // Idempotent.
        backend.kill("s-3", None).await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_spawn_rejected() {
        let backend = FallbackBackend::new();
        let _events = backend.spawn("s-4", PtyGeometry::default()).await.unwrap();
        assert!(matches!(
            backend.spawn("s-4", PtyGeometry::default()).await,
            Err(ProcessError::AlreadyExists { .. })
        ));
    }
}
