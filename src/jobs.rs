//! In-process job store for conversions driven by an outer service.
//!
//! Each job has an explicit lifecycle:
//!
//! ```text
//! create ─▶ Pending ─▶ Processing ─▶ Analyzing ─▶ Generating ─▶ Completed
//!                           │             │             │
//!                           └─────────────┴─────────────┴──▶ Error
//! ```
//!
//! and leaves the store only through [`JobStore::remove`] or TTL expiry
//! ([`JobStore::purge_expired`]). Both also delete the job's work directory.

use crate::config::ConversionConfig;
use crate::convert;
use crate::error::Pdf2PptxError;
use crate::output::ConversionOutput;
use crate::progress::{ConversionProgressCallback, ProgressCallback};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default time a job record is kept after creation.
pub const DEFAULT_JOB_TTL: Duration = Duration::from_secs(60 * 60);

/// Opaque job identifier (UUID v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Analyzing,
    Generating,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    fn from_progress(status: &str) -> Option<Self> {
        match status {
            "processing" => Some(JobStatus::Processing),
            "analyzing" => Some(JobStatus::Analyzing),
            "generating" => Some(JobStatus::Generating),
            "completed" => Some(JobStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct JobRecord {
    status: JobStatus,
    progress: u8,
    message: String,
    pages_done: usize,
    total_pages: usize,
    work_dir: PathBuf,
    output_path: Option<PathBuf>,
    created_at: Instant,
}

/// Serialisable view of a job at one instant.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub pages_done: usize,
    pub total_pages: usize,
    pub output_path: Option<PathBuf>,
}

/// Jobs keyed by [`JobId`], each with its own work directory under `root`.
pub struct JobStore {
    jobs: Mutex<HashMap<JobId, JobRecord>>,
    root: PathBuf,
    ttl: Duration,
}

impl JobStore {
    pub fn new(root: impl Into<PathBuf>, ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            jobs: Mutex::new(HashMap::new()),
            root: root.into(),
            ttl,
        })
    }

    /// Register a new `Pending` job and create its work directory.
    pub fn create(self: &Arc<Self>) -> Result<JobHandle, Pdf2PptxError> {
        let id = JobId::generate();
        let work_dir = self.root.join(id.to_string());
        std::fs::create_dir_all(&work_dir).map_err(|source| Pdf2PptxError::OutputWriteFailed {
            path: work_dir.clone(),
            source,
        })?;

        self.jobs.lock().insert(
            id,
            JobRecord {
                status: JobStatus::Pending,
                progress: 0,
                message: "Job created".to_string(),
                pages_done: 0,
                total_pages: 0,
                work_dir,
                output_path: None,
                created_at: Instant::now(),
            },
        );
        debug!("Created job {}", id);
        Ok(JobHandle {
            id,
            store: Arc::clone(self),
        })
    }

    /// Handle for an existing job.
    pub fn handle(self: &Arc<Self>, id: JobId) -> Option<JobHandle> {
        self.jobs.lock().contains_key(&id).then(|| JobHandle {
            id,
            store: Arc::clone(self),
        })
    }

    pub fn snapshot(&self, id: JobId) -> Option<JobSnapshot> {
        self.jobs.lock().get(&id).map(|r| JobSnapshot {
            id,
            status: r.status,
            progress: r.progress,
            message: r.message.clone(),
            pages_done: r.pages_done,
            total_pages: r.total_pages,
            output_path: r.output_path.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    /// Drop a job and delete its work directory.
    ///
    /// Returns `false` when the job did not exist.
    pub fn remove(&self, id: JobId) -> bool {
        let record = self.jobs.lock().remove(&id);
        match record {
            Some(record) => {
                remove_work_dir(&record.work_dir);
                debug!("Removed job {}", id);
                true
            }
            None => false,
        }
    }

    /// Remove every job created more than the TTL ago.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    /// [`purge_expired`](Self::purge_expired) against an explicit clock.
    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let expired: Vec<JobRecord> = {
            let mut jobs = self.jobs.lock();
            let ids: Vec<JobId> = jobs
                .iter()
                .filter(|(_, r)| now.saturating_duration_since(r.created_at) > self.ttl)
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| jobs.remove(id)).collect()
        };
        for record in &expired {
            remove_work_dir(&record.work_dir);
        }
        if !expired.is_empty() {
            info!("Purged {} expired jobs", expired.len());
        }
        expired.len()
    }

    /// Convert `input` into the job's work directory as `output_name`.
    ///
    /// Progress lands in the job record; any callback already on `config`
    /// still receives every event.
    pub async fn run(
        &self,
        handle: &JobHandle,
        input: &str,
        output_name: &str,
        config: &ConversionConfig,
    ) -> Result<ConversionOutput, Pdf2PptxError> {
        let work_dir = self
            .work_dir(handle.id)
            .ok_or_else(|| Pdf2PptxError::Internal(format!("Unknown job {}", handle.id)))?;
        let output_path = work_dir.join(output_name);

        let mut config = config.clone();
        let inner = config.progress_callback.take();
        config.progress_callback = Some(Arc::new(handle.clone().forwarding(inner)));

        self.update(handle.id, |r| {
            r.status = JobStatus::Processing;
            r.message = "Processing started".to_string();
        });

        match convert::convert(input, &output_path, &config).await {
            Ok(output) => {
                self.update(handle.id, |r| {
                    r.status = JobStatus::Completed;
                    r.progress = 100;
                    r.message = "Conversion completed".to_string();
                    r.output_path = output.output_path.clone();
                });
                Ok(output)
            }
            Err(e) => {
                warn!("Job {} failed: {}", handle.id, e);
                self.update(handle.id, |r| {
                    r.status = JobStatus::Error;
                    r.progress = 0;
                    r.message = e.to_string();
                });
                Err(e)
            }
        }
    }

    fn work_dir(&self, id: JobId) -> Option<PathBuf> {
        self.jobs.lock().get(&id).map(|r| r.work_dir.clone())
    }

    fn update(&self, id: JobId, f: impl FnOnce(&mut JobRecord)) {
        if let Some(record) = self.jobs.lock().get_mut(&id) {
            f(record);
        }
    }
}

fn remove_work_dir(dir: &Path) {
    if let Err(e) = std::fs::remove_dir_all(dir) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to delete {}: {}", dir.display(), e);
        }
    }
}

/// A job's view of the store; doubles as its progress callback.
#[derive(Clone)]
pub struct JobHandle {
    id: JobId,
    store: Arc<JobStore>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn snapshot(&self) -> Option<JobSnapshot> {
        self.store.snapshot(self.id)
    }

    fn forwarding(self, inner: Option<ProgressCallback>) -> ForwardingHandle {
        ForwardingHandle { job: self, inner }
    }
}

impl ConversionProgressCallback for JobHandle {
    fn on_conversion_start(&self, total_pages: usize) {
        self.store.update(self.id, |r| {
            r.total_pages = total_pages;
            r.message = format!("Converting {} pages", total_pages);
        });
    }

    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        self.store.update(self.id, |r| {
            r.message = format!("Analyzing page {}/{}", page_num, total_pages);
        });
    }

    fn on_page_complete(&self, _page_num: usize, _total: usize, _text: usize, _pics: usize) {
        self.store.update(self.id, |r| r.pages_done += 1);
    }

    fn on_progress(&self, percent: u8, status: &str) {
        self.store.update(self.id, |r| {
            if r.status.is_terminal() {
                return;
            }
            r.progress = r.progress.max(percent);
            if let Some(status) = JobStatus::from_progress(status) {
                r.status = status;
            }
            if r.status == JobStatus::Generating {
                r.message = "Generating PowerPoint".to_string();
            }
        });
    }
}

/// Updates the job and then passes the event on.
struct ForwardingHandle {
    job: JobHandle,
    inner: Option<ProgressCallback>,
}

impl ConversionProgressCallback for ForwardingHandle {
    fn on_conversion_start(&self, total_pages: usize) {
        self.job.on_conversion_start(total_pages);
        if let Some(cb) = &self.inner {
            cb.on_conversion_start(total_pages);
        }
    }

    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        self.job.on_page_start(page_num, total_pages);
        if let Some(cb) = &self.inner {
            cb.on_page_start(page_num, total_pages);
        }
    }

    fn on_page_complete(&self, page_num: usize, total: usize, text: usize, pics: usize) {
        self.job.on_page_complete(page_num, total, text, pics);
        if let Some(cb) = &self.inner {
            cb.on_page_complete(page_num, total, text, pics);
        }
    }

    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        if let Some(cb) = &self.inner {
            cb.on_page_error(page_num, total_pages, error);
        }
    }

    fn on_progress(&self, percent: u8, status: &str) {
        self.job.on_progress(percent, status);
        if let Some(cb) = &self.inner {
            cb.on_progress(percent, status);
        }
    }

    fn on_conversion_complete(&self, total_pages: usize, success_count: usize) {
        if let Some(cb) = &self.inner {
            cb.on_conversion_complete(total_pages, success_count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressTracker;

    fn store(ttl: Duration) -> (tempfile::TempDir, Arc<JobStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path(), ttl);
        (dir, store)
    }

    #[test]
    fn created_job_is_pending_with_work_dir() {
        let (dir, store) = store(DEFAULT_JOB_TTL);
        let job = store.create().unwrap();
        let snap = store.snapshot(job.id()).unwrap();
        assert_eq!(snap.status, JobStatus::Pending);
        assert_eq!(snap.progress, 0);
        assert!(dir.path().join(job.id().to_string()).is_dir());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn progress_drives_status() {
        let (_dir, store) = store(DEFAULT_JOB_TTL);
        let job = store.create().unwrap();
        let tracker = ProgressTracker::new(Arc::new(job.clone()), 2);

        job.on_conversion_start(2);
        tracker.opened();
        assert_eq!(job.snapshot().unwrap().status, JobStatus::Processing);

        job.on_page_start(1, 2);
        job.on_page_complete(1, 2, 3, 0);
        tracker.page_done(1);
        let snap = job.snapshot().unwrap();
        assert_eq!(snap.status, JobStatus::Analyzing);
        assert_eq!(snap.progress, 50);
        assert_eq!(snap.pages_done, 1);
        assert_eq!(snap.total_pages, 2);

        tracker.packaged();
        assert_eq!(job.snapshot().unwrap().status, JobStatus::Generating);
        tracker.completed();
        let snap = job.snapshot().unwrap();
        assert_eq!(snap.status, JobStatus::Completed);
        assert_eq!(snap.progress, 100);
    }

    #[test]
    fn terminal_status_is_sticky() {
        let (_dir, store) = store(DEFAULT_JOB_TTL);
        let job = store.create().unwrap();
        job.on_progress(100, "completed");
        job.on_progress(50, "analyzing");
        assert_eq!(job.snapshot().unwrap().status, JobStatus::Completed);
    }

    #[test]
    fn remove_deletes_record_and_directory() {
        let (dir, store) = store(DEFAULT_JOB_TTL);
        let job = store.create().unwrap();
        let work = dir.path().join(job.id().to_string());
        std::fs::write(work.join("deck.pptx"), b"x").unwrap();

        assert!(store.remove(job.id()));
        assert!(!work.exists());
        assert!(store.snapshot(job.id()).is_none());
        assert!(!store.remove(job.id()));
        assert!(store.handle(job.id()).is_none());
    }

    #[test]
    fn purge_respects_ttl() {
        let (_dir, store) = store(Duration::from_secs(60));
        let job = store.create().unwrap();
        assert_eq!(store.purge_expired_at(Instant::now()), 0);
        assert_eq!(
            store.purge_expired_at(Instant::now() + Duration::from_secs(61)),
            1
        );
        assert!(store.snapshot(job.id()).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn job_id_parses_back() {
        let id = JobId::generate();
        let parsed: JobId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<JobId>().is_err());
    }

    #[test]
    fn snapshot_serialises_lowercase_status() {
        let (_dir, store) = store(DEFAULT_JOB_TTL);
        let job = store.create().unwrap();
        let json = serde_json::to_value(job.snapshot().unwrap()).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["id"], job.id().to_string());
    }

    #[tokio::test]
    async fn failed_run_records_error() {
        let (_dir, store) = store(DEFAULT_JOB_TTL);
        let job = store.create().unwrap();
        let result = store
            .run(&job, "/no/such/file.pdf", "deck.pptx", &ConversionConfig::default())
            .await;
        assert!(result.is_err());
        let snap = job.snapshot().unwrap();
        assert_eq!(snap.status, JobStatus::Error);
        assert!(snap.message.contains("not found"));
    }
}
