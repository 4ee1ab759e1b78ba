// SPDX-License-Identifier: MIT

//! Child process supervision
//!
//! One handle per running server, kept in a registry keyed by instance name.
//! Each handle owns exactly one background pump thread that is the sole
//! reader of the child's combined stdout+stderr pipe; the pump forwards
//! every non-empty line to the subscriber channel and exits when the pipe
//! reaches end-of-file. The command stream sits behind its own mutex, so a
//! command write can never interleave with a partial read.

use crate::config::ManagerConfig;
use crate::error::{ManagerError, Result};
use crate::metadata::MetadataStore;
use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, ErrorKind, PipeReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Graceful-shutdown command understood by the child
const STOP_COMMAND: &str = "stop";

/// One console line relayed from a running server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleLine {
    pub instance: String,
    pub line: String,
}

struct ProcessHandle {
    child: Child,
    stdin: Arc<Mutex<ChildStdin>>,
    /// Shared with the pump. True while the process is considered running;
    /// flipped by `stop` (requested exit) or by the pump (observed exit).
    running: Arc<AtomicBool>,
    pump: Option<std::thread::JoinHandle<()>>,
}

pub struct ProcessSupervisor {
    root: PathBuf,
    runtime: String,
    stop_timeout: Duration,
    store: MetadataStore,
    handles: Mutex<HashMap<String, ProcessHandle>>,
    lines_tx: Sender<ConsoleLine>,
    lines_rx: Receiver<ConsoleLine>,
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("root", &self.root)
            .field("runtime", &self.runtime)
            .finish_non_exhaustive()
    }
}

impl ProcessSupervisor {
    pub fn new(config: &ManagerConfig) -> Self {
        let (lines_tx, lines_rx) = unbounded();
        Self {
            root: config.root.clone(),
            runtime: config.runtime.clone(),
            stop_timeout: Duration::from_secs(config.stop_timeout_secs),
            store: MetadataStore::new(&config.root),
            handles: Mutex::new(HashMap::new()),
            lines_tx,
            lines_rx,
        }
    }

    /// Subscription point: console lines from every running server
    pub fn lines(&self) -> Receiver<ConsoleLine> {
        self.lines_rx.clone()
    }

    pub fn is_running(&self, instance: &str) -> bool {
        self.handles
            .lock()
            .get(instance)
            .is_some_and(|handle| handle.running.load(Ordering::SeqCst))
    }

    /// Launch a server from its metadata record. A second `start` while the
    /// server is live is a logged no-op, never a restart.
    pub fn start(&self, instance: &str) -> Result<()> {
        let mut handles = self.handles.lock();

        let live = handles
            .get(instance)
            .map(|handle| handle.running.load(Ordering::SeqCst));
        match live {
            Some(true) => {
                tracing::info!("server {instance} is already running");
                return Ok(());
            }
            Some(false) => {
                // Exited on its own; reap the stale handle before respawning.
                if let Some(mut stale) = handles.remove(instance) {
                    if let Some(pump) = stale.pump.take() {
                        let _ = pump.join();
                    }
                    let _ = stale.child.wait();
                }
            }
            None => {}
        }

        let record = self.store.load(instance)?;
        let dir = self.root.join(instance);
        let jar = dir.join(format!("{instance}.jar"));

        // Single pipe shared by stdout and stderr, so the pump sees one
        // combined stream in emission order.
        let (reader, writer) = std::io::pipe()
            .map_err(|e| ManagerError::Launch(format!("creating output pipe failed: {e}")))?;
        let writer_clone = writer
            .try_clone()
            .map_err(|e| ManagerError::Launch(format!("cloning output pipe failed: {e}")))?;

        let mut command = Command::new(&self.runtime);
        command
            .arg(format!("-Xmx{}M", record.maximum))
            .arg(format!("-Xms{}M", record.minimum))
            .arg("-jar")
            .arg(&jar)
            .arg("nogui")
            .current_dir(&dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::from(writer))
            .stderr(Stdio::from(writer_clone));

        let mut child = command.spawn().map_err(|e| match e.kind() {
            ErrorKind::NotFound => ManagerError::Launch(format!(
                "server runtime {:?} not found on this system or in PATH",
                self.runtime
            )),
            _ => ManagerError::Launch(format!("failed to spawn server {instance}: {e}")),
        })?;

        // Close our copies of the pipe writer so the pump observes EOF once
        // the child exits.
        drop(command);

        let pid = child.id();
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ManagerError::Launch("child stdin was not captured".into()))?;

        let running = Arc::new(AtomicBool::new(true));
        let pump = spawn_pump(
            instance.to_string(),
            reader,
            Arc::clone(&running),
            self.lines_tx.clone(),
        )?;

        handles.insert(
            instance.to_string(),
            ProcessHandle {
                child,
                stdin: Arc::new(Mutex::new(stdin)),
                running,
                pump: Some(pump),
            },
        );

        tracing::info!("server {instance} started (pid {pid})");
        Ok(())
    }

    /// Write one newline-terminated command to the server's input stream
    pub fn send_command(&self, instance: &str, command: &str) -> Result<()> {
        let stdin = {
            let handles = self.handles.lock();
            match handles.get(instance) {
                Some(handle) if handle.running.load(Ordering::SeqCst) => {
                    Arc::clone(&handle.stdin)
                }
                _ => return Err(ManagerError::NotRunning(instance.to_string())),
            }
        };

        let mut stdin = stdin.lock();
        stdin
            .write_all(format!("{command}\n").as_bytes())
            .and_then(|()| stdin.flush())
            .map_err(|e| {
                ManagerError::Process(format!("writing command to {instance} failed: {e}"))
            })?;

        tracing::info!("sent command to {instance}: {command}");
        Ok(())
    }

    /// Graceful stop: write the shutdown command, wait (bounded) for exit,
    /// kill on timeout or broken pipe, then release the handle. A stop on a
    /// server that is not running is a logged no-op.
    pub fn stop(&self, instance: &str) -> Result<()> {
        let mut handle = match self.handles.lock().remove(instance) {
            Some(handle) => handle,
            None => {
                tracing::info!("server {instance} is not running");
                return Ok(());
            }
        };

        if !handle.running.swap(false, Ordering::SeqCst) {
            // Already exited; reap what is left.
            tracing::info!("server {instance} had already exited");
            if let Some(pump) = handle.pump.take() {
                let _ = pump.join();
            }
            let _ = handle.child.wait();
            return Ok(());
        }

        tracing::info!("stopping server {instance}");

        let graceful = {
            let mut stdin = handle.stdin.lock();
            stdin
                .write_all(format!("{STOP_COMMAND}\n").as_bytes())
                .and_then(|()| stdin.flush())
        };
        if let Err(e) = graceful {
            tracing::warn!("graceful shutdown write to {instance} failed, terminating: {e}");
            let _ = handle.child.kill();
        }

        let deadline = Instant::now() + self.stop_timeout;
        loop {
            match handle.child.try_wait() {
                Ok(Some(status)) => {
                    tracing::info!("server {instance} stopped ({status})");
                    break;
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        tracing::warn!(
                            "server {instance} ignored shutdown for {}s, killing",
                            self.stop_timeout.as_secs()
                        );
                        let _ = handle.child.kill();
                        let _ = handle.child.wait();
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(e) => {
                    tracing::warn!("waiting for {instance} failed, killing: {e}");
                    let _ = handle.child.kill();
                    let _ = handle.child.wait();
                    break;
                }
            }
        }

        // The child is gone, so the pipe is at EOF and the pump is done.
        if let Some(pump) = handle.pump.take() {
            let _ = pump.join();
        }

        Ok(())
    }

    /// Stop every running server
    pub fn stop_all(&self) -> Result<()> {
        let instances: Vec<String> = self.handles.lock().keys().cloned().collect();
        for instance in instances {
            self.stop(&instance)?;
        }
        Ok(())
    }
}

fn spawn_pump(
    instance: String,
    reader: PipeReader,
    running: Arc<AtomicBool>,
    lines_tx: Sender<ConsoleLine>,
) -> Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name(format!("pump-{instance}"))
        .spawn(move || {
            let mut reader = BufReader::new(reader);
            let mut buf = String::new();

            loop {
                buf.clear();
                match reader.read_line(&mut buf) {
                    // EOF: every writer end is closed, the child is gone.
                    Ok(0) => break,
                    Ok(_) => {
                        let line = buf.trim_end();
                        if !line.is_empty() {
                            tracing::debug!(server = %instance, "{line}");
                            let _ = lines_tx.send(ConsoleLine {
                                instance: instance.clone(),
                                line: line.to_string(),
                            });
                        }
                    }
                    Err(e) => {
                        tracing::warn!("console pump for {instance} failed: {e}");
                        break;
                    }
                }
            }

            if running.swap(false, Ordering::SeqCst) {
                // Flag was still set: nobody asked for this exit.
                tracing::warn!("server {instance} exited unexpectedly");
            }
        })
        .map_err(|e| ManagerError::Launch(format!("failed to spawn console pump: {e}")))
}
