//! Reference-counted payload cache backed by the job runner.
//!
//! Entries are keyed by the reference string found in telemetry (a file path or URL).
//! Each entry counts the frames that currently want it; the load is cancelled and the
//! payload freed only when that count reaches zero.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use hashbrown::HashMap;
use log::{debug, warn};
use tokio_util::sync::CancellationToken;

use crate::config::FetchOptions;
use crate::error::{JobError, PrefetchError};
use crate::jobs::{JobHandle, JobRunner};

/// Loaded payload bytes, shared with every state that references them.
pub type Payload = Arc<[u8]>;

/// Source of out-of-band payloads.
pub trait PayloadLoader: Send + Sync {
    /// Start loading `key`. Implementations should watch `token` and settle early once it fires.
    fn load(
        &self,
        key: &str,
        options: &FetchOptions,
        token: CancellationToken,
    ) -> BoxFuture<'static, Result<Payload, JobError>>;

    /// Called when an in-flight load for `key` is cancelled.
    fn on_cancel(&self, _key: &str) {}
}

/// Reads payloads from disk, resolving relative keys against [`FetchOptions::base_dir`].
#[derive(Clone, Debug, Default)]
pub struct FilePayloadLoader;

impl FilePayloadLoader {
    pub fn resolve(key: &str, options: &FetchOptions) -> PathBuf {
        let path = Path::new(key);
        match &options.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl PayloadLoader for FilePayloadLoader {
    fn load(
        &self,
        key: &str,
        options: &FetchOptions,
        token: CancellationToken,
    ) -> BoxFuture<'static, Result<Payload, JobError>> {
        let path = Self::resolve(key, options);
        let timeout = options.timeout;
        async move {
            tokio::select! {
                _ = token.cancelled() => Err(JobError::Cancelled),
                bytes = read_file(&path, timeout) => bytes,
            }
        }
        .boxed()
    }
}

async fn read_file(path: &Path, timeout: Option<Duration>) -> Result<Payload, JobError> {
    let read = tokio::fs::read(path);
    let bytes = match timeout {
        Some(limit) => tokio::time::timeout(limit, read)
            .await
            .map_err(|_| JobError::Failed(format!("timed out reading {}", path.display())))?,
        None => read.await,
    };
    bytes
        .map(Payload::from)
        .map_err(|e| JobError::Failed(format!("{}: {e}", path.display())))
}

enum Status {
    Pending(JobHandle<Payload>),
    Ready(Payload),
    Failed,
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Pending(handle) => f.debug_tuple("Pending").field(&handle.id()).finish(),
            Status::Ready(payload) => f.debug_tuple("Ready").field(&payload.len()).finish(),
            Status::Failed => f.write_str("Failed"),
        }
    }
}

#[derive(Debug)]
struct Entry {
    ref_count: usize,
    status: Status,
}

/// Observable state of a cache entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadStatus {
    Pending,
    Ready,
    Failed,
}

pub struct PayloadCache {
    runner: JobRunner,
    loader: Arc<dyn PayloadLoader>,
    options: FetchOptions,
    entries: HashMap<String, Entry>,
}

impl fmt::Debug for PayloadCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadCache")
            .field("runner", &self.runner)
            .field("options", &self.options)
            .field("entries", &self.entries)
            .finish()
    }
}

impl PayloadCache {
    pub fn new(runner: JobRunner, loader: Arc<dyn PayloadLoader>, options: FetchOptions) -> Self {
        Self {
            runner,
            loader,
            options,
            entries: HashMap::new(),
        }
    }

    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }

    fn start_load(&self, key: &str) -> JobHandle<Payload> {
        let loader = Arc::clone(&self.loader);
        let cancel_loader = Arc::clone(&self.loader);
        let options = self.options.clone();
        let load_key = key.to_string();
        let cancel_key = key.to_string();
        debug!("payload '{key}' requested");
        self.runner.run(
            move |token| loader.load(&load_key, &options, token),
            Some(Box::new(move || cancel_loader.on_cancel(&cancel_key))),
        )
    }

    /// Register interest in `key`, starting a load if nothing is cached or in flight.
    /// A previously failed entry is retried.
    pub fn acquire(&mut self, key: &str) {
        let Some(entry) = self.entries.get_mut(key) else {
            let handle = self.start_load(key);
            self.entries.insert(
                key.to_string(),
                Entry {
                    ref_count: 1,
                    status: Status::Pending(handle),
                },
            );
            return;
        };
        entry.ref_count += 1;
        if !matches!(entry.status, Status::Failed) {
            return;
        }
        debug!("retrying failed payload '{key}'");
        let handle = self.start_load(key);
        if let Some(entry) = self.entries.get_mut(key) {
            entry.status = Status::Pending(handle);
        }
    }

    /// Drop one reference. At zero the entry is evicted and any in-flight load cancelled.
    pub fn release(&mut self, key: &str) -> Result<(), PrefetchError> {
        let Some(entry) = self.entries.get_mut(key) else {
            return Err(PrefetchError::RefCountUnderflow {
                key: key.to_string(),
            });
        };
        entry.ref_count -= 1;
        if entry.ref_count > 0 {
            return Ok(());
        }
        if let Some(entry) = self.entries.remove(key) {
            if let Status::Pending(handle) = entry.status {
                debug!("payload '{key}' no longer wanted, cancelling load");
                handle.cancel();
            }
        }
        Ok(())
    }

    /// Collect finished loads. Returns the keys that became ready during this call.
    pub fn poll(&mut self) -> Vec<String> {
        let mut ready = Vec::new();
        for (key, entry) in self.entries.iter_mut() {
            let Status::Pending(handle) = &mut entry.status else {
                continue;
            };
            match handle.try_take() {
                None => {}
                Some(Ok(payload)) => {
                    debug!("payload '{key}' ready ({} bytes)", payload.len());
                    entry.status = Status::Ready(payload);
                    ready.push(key.clone());
                }
                Some(Err(err)) => {
                    warn!("payload '{key}' failed to load: {err}");
                    entry.status = Status::Failed;
                }
            }
        }
        ready
    }

    pub fn payload(&self, key: &str) -> Option<Payload> {
        match &self.entries.get(key)?.status {
            Status::Ready(payload) => Some(Arc::clone(payload)),
            _ => None,
        }
    }

    pub fn status(&self, key: &str) -> Option<PayloadStatus> {
        Some(match self.entries.get(key)?.status {
            Status::Pending(_) => PayloadStatus::Pending,
            Status::Ready(_) => PayloadStatus::Ready,
            Status::Failed => PayloadStatus::Failed,
        })
    }

    /// Current reference count, 0 when the key is not cached.
    pub fn ref_count(&self, key: &str) -> usize {
        self.entries.get(key).map_or(0, |e| e.ref_count)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cancel everything in flight and drop all entries regardless of reference counts.
    pub fn clear(&mut self) {
        for (_, entry) in self.entries.drain() {
            if let Status::Pending(handle) = entry.status {
                handle.cancel();
            }
        }
    }
}
