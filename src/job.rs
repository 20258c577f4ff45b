// src/job.rs

//! One equation's per-viewport work unit.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::bounds::Bounds;
use crate::color::Color;
use crate::filter_mesh::FilterMesh;
use crate::function::FunctionPack;
use crate::seed::Seed;

/// Stable identifier assigned by the embedder when a job is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u64);

/// Lifecycle of a job: `Outdated -> Processing -> Complete`, with any edit,
/// bounds change, or settings change resetting to `Outdated` from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JobStatus {
    Outdated = 0,
    Processing = 1,
    Complete = 2,
}

impl JobStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => JobStatus::Outdated,
            1 => JobStatus::Processing,
            _ => JobStatus::Complete,
        }
    }
}

/// State only the polling thread touches for extended periods: the pass
/// snapshot inputs (bounds, evaluator pack) and the working vertex list.
/// External mutations reach it through the renderer's command queue, never by
/// locking it directly while a pass may be running.
pub(crate) struct JobInner {
    pub bounds: Bounds,
    pub funcs: FunctionPack,
    pub verts: Vec<f64>,
}

/// A job slot in the renderer's arena.
///
/// Status and validity are atomics so the UI thread can flip them without
/// taking any lock; `published` is the reader-visible contour, replaced
/// wholesale under a short lock only after a full pass completes, so a reader
/// never observes a torn write.
pub struct Job {
    pub id: JobId,
    status: AtomicU8,
    is_valid: AtomicBool,
    color: Mutex<Color>,
    published: Mutex<Arc<Vec<f64>>>,
    seeds: Mutex<Option<Arc<Vec<Seed>>>>,
    mesh: Mutex<Option<Arc<FilterMesh>>>,
    pub(crate) inner: Mutex<JobInner>,
}

impl Job {
    pub(crate) fn new(id: JobId, funcs: FunctionPack, bounds: Bounds) -> Self {
        let is_valid = funcs.is_valid();
        Job {
            id,
            status: AtomicU8::new(JobStatus::Outdated as u8),
            is_valid: AtomicBool::new(is_valid),
            color: Mutex::new(Color::default()),
            published: Mutex::new(Arc::new(Vec::new())),
            seeds: Mutex::new(None),
            mesh: Mutex::new(None),
            inner: Mutex::new(JobInner {
                bounds,
                funcs,
                verts: Vec::new(),
            }),
        }
    }

    pub fn status(&self) -> JobStatus {
        JobStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub(crate) fn set_status(&self, status: JobStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    /// Marks the job for reprocessing. Safe from any thread.
    pub fn mark_outdated(&self) {
        self.set_status(JobStatus::Outdated);
    }

    /// Transitions `Processing -> Complete`. Fails (and leaves the job
    /// outdated) when a concurrent edit kicked the job back mid-pass; the
    /// just-published result stays visible and the job is simply reprocessed.
    pub(crate) fn try_complete(&self) -> bool {
        self.status
            .compare_exchange(
                JobStatus::Processing as u8,
                JobStatus::Complete as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid.load(Ordering::Acquire)
    }

    pub(crate) fn set_valid(&self, valid: bool) {
        self.is_valid.store(valid, Ordering::Release);
    }

    pub fn color(&self) -> Color {
        *self.color.lock().unwrap()
    }

    pub fn set_color(&self, color: Color) {
        *self.color.lock().unwrap() = color;
    }

    /// The published contour: flat `x0, y0, x1, y1` endpoint coordinates.
    /// Cheap to call; the returned `Arc` is a complete, consistent snapshot.
    pub fn vertices(&self) -> Arc<Vec<f64>> {
        self.published.lock().unwrap().clone()
    }

    /// Atomically replaces the reader-visible contour.
    pub(crate) fn publish(&self, verts: &[f64]) {
        *self.published.lock().unwrap() = Arc::new(verts.to_vec());
    }

    pub fn seeds(&self) -> Option<Arc<Vec<Seed>>> {
        self.seeds.lock().unwrap().clone()
    }

    pub(crate) fn set_seeds(&self, seeds: Option<Arc<Vec<Seed>>>) {
        *self.seeds.lock().unwrap() = seeds;
    }

    pub fn filter_mesh(&self) -> Option<Arc<FilterMesh>> {
        self.mesh.lock().unwrap().clone()
    }

    pub(crate) fn set_filter_mesh(&self, mesh: Option<Arc<FilterMesh>>) {
        *self.mesh.lock().unwrap() = mesh;
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("status", &self.status())
            .field("is_valid", &self.is_valid())
            .finish()
    }
}
