//! Background reloading of the responses document
//!
//! The watcher is the only writer of the current snapshot. Publishing is a
//! single `watch` send of a new `Arc<ResponseStore>`; readers clone the `Arc`
//! out of their receiver and keep using it for the rest of their request even
//! if a newer snapshot is published meanwhile.

use super::document::{fingerprint, parse_document};
use super::{ConfigSourceError, ResponseStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Polls with an unchanged file stamp before the content is hashed anyway
const REHASH_EVERY_POLLS: u32 = 10;

/// Read side of the published snapshot
#[derive(Debug, Clone)]
pub struct SnapshotHandle {
    rx: watch::Receiver<Arc<ResponseStore>>,
}

impl SnapshotHandle {
    /// Handle over a store that never changes
    pub fn fixed(store: ResponseStore) -> Self {
        let (_tx, rx) = watch::channel(Arc::new(store));
        Self { rx }
    }

    /// The snapshot that is current right now
    pub fn current(&self) -> Arc<ResponseStore> {
        self.rx.borrow().clone()
    }

    /// Wait until a newer snapshot is published. Returns false once the
    /// watcher is gone and no further snapshots can arrive.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

/// Result of a reload attempt that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// A new snapshot was published
    Reloaded { version: u64, entries: usize },
    /// The document content matches the live snapshot
    Unchanged { version: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

async fn stamp(path: &Path) -> std::io::Result<FileStamp> {
    let metadata = tokio::fs::metadata(path).await?;
    Ok(FileStamp {
        modified: metadata.modified().ok(),
        len: metadata.len(),
    })
}

/// Owns the write path for response snapshots
#[derive(Debug)]
pub struct ConfigWatcher {
    path: PathBuf,
    poll_interval: Duration,
    publisher: watch::Sender<Arc<ResponseStore>>,
    last_stamp: Option<FileStamp>,
    current_fingerprint: String,
    rejected_fingerprint: Option<String>,
    read_failing: bool,
    unchanged_polls: u32,
}

impl ConfigWatcher {
    /// Initial load. Any failure here is fatal for the server.
    pub fn load(
        path: impl Into<PathBuf>,
        poll_interval: Duration,
    ) -> Result<(Self, SnapshotHandle), ConfigSourceError> {
        let path = path.into();
        let last_stamp = std::fs::metadata(&path).ok().map(|metadata| FileStamp {
            modified: metadata.modified().ok(),
            len: metadata.len(),
        });
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigSourceError::Read {
            path: path.clone(),
            source,
        })?;

        let current_fingerprint = fingerprint(&content);
        let store = parse_document(&content)
            .map_err(|source| ConfigSourceError::Parse {
                path: path.clone(),
                source,
            })?
            .stamped(1, current_fingerprint.clone());

        info!(
            path = %path.display(),
            entries = store.len(),
            version = store.version(),
            "Loaded responses document"
        );

        let (publisher, rx) = watch::channel(Arc::new(store));
        let watcher = Self {
            path,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
            publisher,
            last_stamp,
            current_fingerprint,
            rejected_fingerprint: None,
            read_failing: false,
            unchanged_polls: 0,
        };
        Ok((watcher, SnapshotHandle { rx }))
    }

    /// Another read handle on the snapshots this watcher publishes
    pub fn snapshots(&self) -> SnapshotHandle {
        SnapshotHandle {
            rx: self.publisher.subscribe(),
        }
    }

    fn current_version(&self) -> u64 {
        self.publisher.borrow().version()
    }

    /// Poll step: skip the read when size and modification time are unchanged.
    /// Every `REHASH_EVERY_POLLS` skipped polls the content is hashed anyway,
    /// so an edit that keeps both stamp fields is still picked up.
    pub async fn check(&mut self) -> Result<ReloadOutcome, ConfigSourceError> {
        let current = match stamp(&self.path).await {
            Ok(current) => current,
            Err(source) => return Err(self.read_failed(source)),
        };
        if self.last_stamp == Some(current) {
            self.unchanged_polls += 1;
            if self.unchanged_polls < REHASH_EVERY_POLLS {
                return Ok(ReloadOutcome::Unchanged {
                    version: self.current_version(),
                });
            }
        }
        self.reload_with_stamp(Some(current)).await
    }

    /// Read, hash and parse the document now regardless of its file stamp
    pub async fn reload(&mut self) -> Result<ReloadOutcome, ConfigSourceError> {
        let current = stamp(&self.path).await.ok();
        self.reload_with_stamp(current).await
    }

    fn read_failed(&mut self, source: std::io::Error) -> ConfigSourceError {
        if !self.read_failing {
            warn!(
                path = %self.path.display(),
                error = %source,
                "Cannot read responses document, keeping current snapshot"
            );
            self.read_failing = true;
        }
        ConfigSourceError::Read {
            path: self.path.clone(),
            source,
        }
    }

    async fn reload_with_stamp(
        &mut self,
        current: Option<FileStamp>,
    ) -> Result<ReloadOutcome, ConfigSourceError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(source) => return Err(self.read_failed(source)),
        };
        self.read_failing = false;
        self.last_stamp = current;
        self.unchanged_polls = 0;

        let candidate = fingerprint(&content);
        if candidate == self.current_fingerprint {
            return Ok(ReloadOutcome::Unchanged {
                version: self.current_version(),
            });
        }

        match parse_document(&content) {
            Ok(store) => {
                let version = self.current_version() + 1;
                let entries = store.len();
                let store = store.stamped(version, candidate.clone());
                self.publisher.send_replace(Arc::new(store));
                self.current_fingerprint = candidate;
                self.rejected_fingerprint = None;
                info!(
                    path = %self.path.display(),
                    version,
                    entries,
                    "Published new response snapshot"
                );
                Ok(ReloadOutcome::Reloaded { version, entries })
            }
            Err(source) => {
                // Log once per distinct bad content, not once per poll
                if self.rejected_fingerprint.as_deref() != Some(candidate.as_str()) {
                    error!(
                        path = %self.path.display(),
                        error = %source,
                        version = self.current_version(),
                        "Rejected responses document, previous snapshot stays live"
                    );
                    self.rejected_fingerprint = Some(candidate);
                }
                Err(ConfigSourceError::Parse {
                    path: self.path.clone(),
                    source,
                })
            }
        }
    }

    /// Move the watcher into its background polling task
    pub fn spawn(mut self) -> WatcherHandle {
        let (commands, mut command_rx) = mpsc::channel::<WatcherCommand>(8);
        let (shutdown, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(
                path = %self.path.display(),
                poll_interval_ms = self.poll_interval.as_millis() as u64,
                "Config watcher started"
            );

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    command = command_rx.recv() => match command {
                        Some(WatcherCommand::Reload { reply }) => {
                            let _ = reply.send(self.reload().await);
                        }
                        None => break,
                    },
                    _ = interval.tick() => {
                        // Failures are logged inside and must not stop the loop
                        if let Ok(ReloadOutcome::Reloaded { version, .. }) = self.check().await {
                            debug!(version, "Picked up responses document change");
                        }
                    }
                }
            }

            info!(path = %self.path.display(), "Config watcher stopped");
        });

        WatcherHandle {
            commands,
            shutdown: Some(shutdown),
            task,
        }
    }
}

enum WatcherCommand {
    Reload {
        reply: oneshot::Sender<Result<ReloadOutcome, ConfigSourceError>>,
    },
}

/// Asks the running watcher task to reload immediately
#[derive(Clone)]
pub struct ReloadTrigger {
    commands: mpsc::Sender<WatcherCommand>,
}

impl ReloadTrigger {
    pub async fn reload(&self) -> Result<ReloadOutcome, ConfigSourceError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(WatcherCommand::Reload { reply })
            .await
            .map_err(|_| ConfigSourceError::WatcherStopped)?;
        response
            .await
            .map_err(|_| ConfigSourceError::WatcherStopped)?
    }
}

/// Owner handle of the background watcher task
pub struct WatcherHandle {
    commands: mpsc::Sender<WatcherCommand>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    pub fn trigger(&self) -> ReloadTrigger {
        ReloadTrigger {
            commands: self.commands.clone(),
        }
    }

    /// Stop polling and wait for the task to finish
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = (&mut self.task).await {
            warn!(error = %e, "Config watcher task ended abnormally");
        }
    }
}
