//! Upload queue
//!
//! Holds the files a user has picked and drives them through
//! pending → uploading → success | error. All uploads of a batch run
//! concurrently and are awaited together; each item's outcome is recorded on
//! its own, so one failure never touches another item.

use super::preview::PreviewRegistry;
use super::progress::{ProgressTracker, ETA_CALCULATING};
use super::transport::{ProgressSink, UploadTransport};
use super::{FileHandle, QueueError, UploadItem, UploadStatus};
use crate::metrics;
use futures::future::join_all;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of one `upload_all` call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: Vec<String>,
    /// `(item id, error message)`
    pub failed: Vec<(String, String)>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Turn a partially failed batch into an error for the caller to surface
    pub fn into_result(self) -> Result<Self, QueueError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(QueueError::BatchFailed {
                failed: self.failed.len(),
                total: self.total,
            })
        }
    }
}

/// Clears the in-flight flag when a batch ends, however it ends
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// In-memory list of files being uploaded
#[derive(Default)]
pub struct UploadQueue {
    items: Arc<Mutex<Vec<UploadItem>>>,
    previews: Arc<PreviewRegistry>,
    in_flight: AtomicBool,
}

impl UploadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one file; returns its id
    pub fn add_file(&self, path: impl AsRef<Path>) -> Result<String, QueueError> {
        let mut ids = self.add_files([path])?;
        Ok(ids.remove(0))
    }

    /// Queue several files, all or nothing; returns their ids in order
    pub fn add_files<I, P>(&self, paths: I) -> Result<Vec<String>, QueueError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let handles = paths
            .into_iter()
            .map(FileHandle::open)
            .collect::<Result<Vec<_>, _>>()?;

        let new_items: Vec<UploadItem> = handles
            .into_iter()
            .map(|file| {
                let id = uuid::Uuid::new_v4().simple().to_string();
                let preview_url = self.previews.allocate(&id, &file.name);
                UploadItem {
                    id,
                    file,
                    preview_url,
                    progress: 0,
                    eta: String::new(),
                    status: UploadStatus::Pending,
                    remote_url: None,
                }
            })
            .collect();

        let ids = new_items.iter().map(|item| item.id.clone()).collect();
        self.items.lock().extend(new_items);
        Ok(ids)
    }

    /// Snapshot of every item
    pub fn items(&self) -> Vec<UploadItem> {
        self.items.lock().clone()
    }

    pub fn get(&self, id: &str) -> Option<UploadItem> {
        self.items.lock().iter().find(|item| item.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// True while a batch is running
    pub fn is_uploading(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Number of preview handles not yet released
    pub fn live_previews(&self) -> usize {
        self.previews.live_count()
    }

    /// Drop one item and release its preview
    pub fn remove(&self, id: &str) -> Result<UploadItem, QueueError> {
        if self.is_uploading() {
            return Err(QueueError::Busy);
        }
        let mut items = self.items.lock();
        let index = items
            .iter()
            .position(|item| item.id == id)
            .ok_or_else(|| QueueError::UnknownItem(id.to_string()))?;
        let item = items.remove(index);
        self.previews.revoke(&item.preview_url);
        Ok(item)
    }

    /// Drop every item and release all previews; returns how many were removed
    pub fn clear(&self) -> Result<usize, QueueError> {
        if self.is_uploading() {
            return Err(QueueError::Busy);
        }
        let removed = std::mem::take(&mut *self.items.lock()).len();
        self.previews.revoke_all();
        Ok(removed)
    }

    /// Upload every item that has not yet succeeded
    ///
    /// Items are marked uploading, sent concurrently through `transport`, and
    /// awaited together. Failed items end in `Error` with progress reset to 0;
    /// the report lists which ids failed and why. Nothing is retried.
    pub async fn upload_all(
        &self,
        transport: Arc<dyn UploadTransport>,
    ) -> Result<BatchReport, QueueError> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Err(QueueError::Busy);
        }
        let _guard = InFlightGuard(&self.in_flight);

        let batch: Vec<(String, FileHandle)> = self
            .items
            .lock()
            .iter_mut()
            .filter(|item| item.status != UploadStatus::Success)
            .map(|item| {
                item.status = UploadStatus::Uploading;
                item.progress = 0;
                item.eta = ETA_CALCULATING.to_string();
                item.remote_url = None;
                (item.id.clone(), item.file.clone())
            })
            .collect();

        let mut report = BatchReport {
            total: batch.len(),
            ..Default::default()
        };
        info!(
            files = report.total,
            transport = transport.name(),
            "Starting upload batch"
        );

        let uploads = batch.into_iter().map(|(id, file)| {
            let transport = Arc::clone(&transport);
            let sink = self.progress_sink(&id, file.size);
            async move {
                let result = transport.send(&file, sink).await;
                (id, result)
            }
        });
        let results = join_all(uploads).await;

        let mut items = self.items.lock();
        for (id, result) in results {
            let Some(item) = items.iter_mut().find(|item| item.id == id) else {
                continue;
            };
            match result {
                Ok(asset) => {
                    item.status = UploadStatus::Success;
                    item.progress = 100;
                    item.eta = String::new();
                    item.remote_url = Some(asset.url);
                    metrics::record_client_upload(transport.name(), true);
                    report.succeeded.push(id);
                }
                Err(e) => {
                    warn!(file = %item.file.name, "Upload failed: {}", e);
                    item.status = UploadStatus::Error;
                    item.progress = 0;
                    item.eta = String::new();
                    metrics::record_client_upload(transport.name(), false);
                    report.failed.push((id, e.to_string()));
                }
            }
        }

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "Upload batch finished"
        );
        Ok(report)
    }

    /// Progress callback for one item
    ///
    /// Updates are ignored once the item has left `Uploading`, and the
    /// percentage never moves backwards within an attempt.
    fn progress_sink(&self, id: &str, total_bytes: u64) -> ProgressSink {
        let items = Arc::clone(&self.items);
        let id = id.to_string();
        let tracker = ProgressTracker::new(total_bytes);

        Arc::new(move |sent| {
            let snapshot = tracker.observe(sent);
            let mut items = items.lock();
            if let Some(item) = items.iter_mut().find(|item| item.id == id) {
                if item.status == UploadStatus::Uploading {
                    item.progress = item.progress.max(snapshot.percent);
                    item.eta = snapshot.eta;
                }
            }
        })
    }
}

impl Drop for UploadQueue {
    fn drop(&mut self) {
        self.previews.revoke_all();
    }
}
