//! Real process backend: one pseudo-terminal per session.
//!
//! Blocking PTY I/O runs on the blocking thread pool; the async side only
//! sees channels. Input goes through a writer task (mpsc-fed, like a stdin
//! pump), output comes back as [`ProcessEvent::Output`] chunks, and a waiter
//! task emits the final [`ProcessEvent::Exit`] once the reader has drained.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::Arc;

use portable_pty::{Child, ChildKiller, CommandBuilder, MasterPty, PtySize, native_pty_system};
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, info, warn};

use super::{ProcessBackend, ProcessError, ProcessEvent, ProcessEvents, PtyGeometry};

/// Command launched inside every session's PTY.
#[derive(Debug, Clone)]
pub struct PtyCommand {
    pub program: String,
    pub args: Vec<String>,
}

/// PTY-backed [`ProcessBackend`].
pub struct PtyBackend {
    command: PtyCommand,
    procs: Arc<RwLock<HashMap<String, PtyEntry>>>,
}

/// Map entry. `Reserved` claims the id while PTY setup runs outside the map
/// lock, so one session's spawn never stalls I/O on another session.
enum PtyEntry {
    Reserved,
    Ready(PtyProcess),
}

struct PtyProcess {
    input_tx: mpsc::Sender<String>,
    master: Mutex<Box<dyn MasterPty + Send>>,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    pid: Option<u32>,
}

/// Handles produced by the blocking PTY setup.
struct PtySetup {
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    writer: Box<dyn Write + Send>,
    reader: Box<dyn Read + Send>,
}

fn open_session_pty(command: &PtyCommand, geometry: PtyGeometry) -> Result<PtySetup, String> {
    let pty_system = native_pty_system();
    let pair = pty_system
        .openpty(PtySize {
            rows: geometry.rows,
            cols: geometry.cols,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|e| e.to_string())?;

    let mut cmd = CommandBuilder::new(&command.program);
    cmd.args(&command.args);
    // CommandBuilder starts with an empty environment; inherit ours.
    for (key, value) in std::env::vars() {
        cmd.env(key, value);
    }
    cmd.env("TERM", "xterm-256color");

    let child = pair.slave.spawn_command(cmd).map_err(|e| e.to_string())?;
    drop(pair.slave);

    let writer = pair.master.take_writer().map_err(|e| e.to_string())?;
    let reader = pair.master.try_clone_reader().map_err(|e| e.to_string())?;

    Ok(PtySetup {
        master: pair.master,
        child,
        writer,
        reader,
    })
}

impl PtyBackend {
    /// Create a backend that runs `command` in each session's terminal.
    pub fn new(command: PtyCommand) -> Self {
        Self {
            command,
            procs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of live processes.
    pub async fn active_count(&self) -> usize {
        self.procs.read().await.len()
    }

    fn spawn_waiter(
        &self,
        session_id: &str,
        mut child: Box<dyn Child + Send + Sync>,
        reader_handle: tokio::task::JoinHandle<()>,
        events_tx: mpsc::Sender<ProcessEvent>,
    ) {
        let procs = Arc::clone(&self.procs);
        let sid = session_id.to_string();
        tokio::spawn(async move {
            let status = tokio::task::spawn_blocking(move || child.wait()).await;
            // Drain the reader before Exit so no Output trails the exit event.
            let _ = reader_handle.await;

            #[allow(clippy::cast_possible_wrap)]
            let code = match status {
                Ok(Ok(s)) => s.exit_code() as i32,
                _ => -1,
            };

            // Drop the tracked entry first: a later join must spawn fresh,
            // and writes racing the exit get NotRunning.
            procs.write().await.remove(&sid);
            let _ = events_tx.send(ProcessEvent::Exit { code, signal: None }).await;
            info!(session_id = %sid, exit_code = code, "PTY process exited");
        });
    }
}

#[async_trait::async_trait]
impl ProcessBackend for PtyBackend {
    async fn spawn(
        &self,
        session_id: &str,
        geometry: PtyGeometry,
    ) -> Result<ProcessEvents, ProcessError> {
        // Reserve the id first. The map lock is only held for the insert, so
        // the PTY setup below never blocks other sessions' map access.
        {
            let mut procs = self.procs.write().await;
            if procs.contains_key(session_id) {
                return Err(ProcessError::AlreadyExists {
                    session_id: session_id.to_string(),
                });
            }
            procs.insert(session_id.to_string(), PtyEntry::Reserved);
        }

        info!(
            session_id,
            program = %self.command.program,
            cols = geometry.cols,
            rows = geometry.rows,
            "Spawning PTY process"
        );

        let command = self.command.clone();
        let setup = tokio::task::spawn_blocking(move || open_session_pty(&command, geometry))
            .await
            .map_err(|e| e.to_string())
            .and_then(|r| r);

        let setup = match setup {
            Ok(setup) => setup,
            Err(reason) => {
                self.procs.write().await.remove(session_id);
                return Err(ProcessError::SpawnFailed { reason });
            }
        };

        let pid = setup.child.process_id();
        let killer = setup.child.clone_killer();

        let (events_tx, events_rx) = mpsc::channel::<ProcessEvent>(256);
        let (input_tx, mut input_rx) = mpsc::channel::<String>(32);

        // Input pump: blocking writes off the async runtime.
        let mut writer = setup.writer;
        let sid = session_id.to_string();
        tokio::task::spawn_blocking(move || {
            while let Some(data) = input_rx.blocking_recv() {
                if writer.write_all(data.as_bytes()).is_err() || writer.flush().is_err() {
                    debug!(session_id = %sid, "PTY writer closed");
                    break;
                }
            }
        });

        // Output pump: blocking reads feeding the event stream.
        let mut reader = setup.reader;
        let output_tx = events_tx.clone();
        let sid = session_id.to_string();
        let reader_handle = tokio::task::spawn_blocking(move || {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                        if output_tx.blocking_send(ProcessEvent::Output(chunk)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(session_id = %sid, error = %e, "PTY read ended");
                        break;
                    }
                }
            }
        });

        // Fill the reservation before the waiter starts: the waiter removes
        // the entry on exit, and that removal must come after this insert
        // even for a process that dies instantly.
        self.procs.write().await.insert(
            session_id.to_string(),
            PtyEntry::Ready(PtyProcess {
                input_tx,
                master: Mutex::new(setup.master),
                killer: Mutex::new(killer),
                pid,
            }),
        );
        self.spawn_waiter(session_id, setup.child, reader_handle, events_tx);

        Ok(events_rx)
    }

    async fn write(&self, session_id: &str, data: &str) -> Result<(), ProcessError> {
        let input_tx = match self.procs.read().await.get(session_id) {
            Some(PtyEntry::Ready(proc)) => proc.input_tx.clone(),
            _ => {
                return Err(ProcessError::NotRunning {
                    session_id: session_id.to_string(),
                });
            }
        };

        input_tx
            .send(data.to_string())
            .await
            .map_err(|_| ProcessError::NotRunning {
                session_id: session_id.to_string(),
            })
    }

    #[allow(clippy::significant_drop_tightening)]
    async fn resize(&self, session_id: &str, cols: u16, rows: u16) -> Result<(), ProcessError> {
        let procs = self.procs.read().await;
        let Some(PtyEntry::Ready(proc)) = procs.get(session_id) else {
            return Err(ProcessError::NotRunning {
                session_id: session_id.to_string(),
            });
        };

        proc.master
            .lock()
            .await
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| ProcessError::Backend {
                reason: e.to_string(),
            })
    }

    #[allow(clippy::significant_drop_tightening)]
    async fn kill(&self, session_id: &str, signal: Option<i32>) -> Result<(), ProcessError> {
        let procs = self.procs.read().await;
        let Some(PtyEntry::Ready(proc)) = procs.get(session_id) else {
            // Already dead and reaped, or still mid-setup.
            return Ok(());
        };

        #[cfg(unix)]
        if let (Some(sig), Some(pid)) = (signal, proc.pid) {
            // SAFETY: pid is a valid process ID obtained from our own child
            // handle. kill(2) is safe to call on an owned subprocess.
            #[allow(unsafe_code)]
            #[allow(clippy::cast_possible_wrap)]
            let ret = unsafe { libc::kill(pid as i32, sig) };
            if ret == 0 {
                return Ok(());
            }
            let err = std::io::Error::last_os_error();
            warn!(session_id, pid, sig, error = %err, "Signal delivery failed, falling back to kill");
        }
        #[cfg(not(unix))]
        let _ = signal;

        if let Err(e) = proc.killer.lock().await.kill() {
            debug!(session_id, error = %e, "Kill on dead process ignored");
        }
        Ok(())
    }
}
