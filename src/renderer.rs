// src/renderer.rs

//! The job scheduler: owns the job arena and the background polling loop.
//!
//! A single dedicated thread runs the polling loop. It blocks on a condition
//! variable until some mutating operation (new job, edit, delete, bounds or
//! settings change) raises the rescan flag, then drains the structural
//! command queue and scans the arena. The first outdated valid job found is
//! claimed, fully reprocessed (generator, filter mesh, and contour, which
//! are themselves internally parallel), published, and the loop rescans
//! from the start.
//! Resolving only one job per scan keeps edits and deletes serviced promptly
//! between heavy recomputations.
//!
//! The arena is mutated structurally only by the polling thread; external
//! callers enqueue commands instead of touching the collection, which avoids
//! iterator invalidation without fine-grained locking. Status flags are
//! atomics and may be flipped from any thread. Each job's published vertex
//! list is replaced under a short lock only after a complete pass, so the UI
//! reader always observes either the previous or the next full contour.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use log::{debug, trace, warn};

use crate::bounds::Bounds;
use crate::color::Color;
use crate::config::{
    RenderSettings, Strategy, FILTER_MESH_RES_RANGE, FINAL_MESH_RES_RANGE, SEED_NUM_RANGE,
};
use crate::contour::contour;
use crate::filter_mesh::FilterMesh;
use crate::function::{Compiler, FunctionPack};
use crate::generator::ProximalBracketingGenerator;
use crate::job::{Job, JobId, JobStatus};
use crate::seed::Seed;

/// Invoked whenever the job set transitions to "all complete", after a batch
/// of deletions is applied, or when a job is recolored; the embedder's cue
/// to redraw.
pub type RefreshCallback = Arc<dyn Fn() + Send + Sync>;

/// Structural mutations, applied by the polling thread between scans.
enum Command {
    Add(Arc<Job>),
    Edit { id: JobId, funcs: FunctionPack },
    SetBounds(Bounds),
    Delete(JobId),
}

struct State {
    jobs: Vec<Arc<Job>>,
    pending: Vec<Command>,
    settings: RenderSettings,
    rescan: bool,
    all_complete: bool,
    shutdown: bool,
}

impl State {
    /// Looks a job up in the arena or among not-yet-applied additions.
    fn find(&self, id: JobId) -> Option<Arc<Job>> {
        if let Some(job) = self.jobs.iter().find(|j| j.id == id) {
            return Some(job.clone());
        }
        self.pending.iter().find_map(|cmd| match cmd {
            Command::Add(job) if job.id == id => Some(job.clone()),
            _ => None,
        })
    }

    /// Flags a pending mutation: forces a rescan and re-arms the
    /// all-complete notification.
    fn mark_dirty(&mut self) {
        self.rescan = true;
        self.all_complete = false;
    }
}

struct Shared {
    state: Mutex<State>,
    wake: Condvar,
    refresh: RefreshCallback,
}

/// Thread-safe front end over the job arena and its polling loop.
///
/// All methods may be called from the UI thread; none of them blocks on an
/// in-flight resolution pass. Dropping the renderer shuts the polling thread
/// down and joins it.
pub struct Renderer {
    shared: Arc<Shared>,
    compiler: Compiler,
    threads: usize,
    poll_thread: Option<JoinHandle<()>>,
}

impl Renderer {
    /// Creates a renderer with default settings. The worker pool is sized to
    /// the available hardware parallelism minus one, reserving a core for
    /// the UI/render thread.
    pub fn new(compiler: Compiler, refresh: RefreshCallback) -> Result<Self> {
        Self::with_settings(compiler, refresh, RenderSettings::default())
    }

    pub fn with_settings(
        compiler: Compiler,
        refresh: RefreshCallback,
        settings: RenderSettings,
    ) -> Result<Self> {
        let threads = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2)
            .saturating_sub(1)
            .max(1);

        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                jobs: Vec::new(),
                pending: Vec::new(),
                settings,
                rescan: false,
                all_complete: false,
                shutdown: false,
            }),
            wake: Condvar::new(),
            refresh,
        });

        let loop_shared = shared.clone();
        let poll_thread = thread::Builder::new()
            .name("isocurve-poll".to_string())
            .spawn(move || poll_loop(loop_shared, threads))
            .context("Renderer: failed to spawn polling thread")?;

        Ok(Renderer {
            shared,
            compiler,
            threads,
            poll_thread: Some(poll_thread),
        })
    }

    /// Creates a job for `expr` over `bounds` under the caller-chosen `id`.
    ///
    /// Returns whether the expression compiled. An invalid job is retained
    /// (so the UI can keep showing the flagged entry) but never scheduled.
    /// A duplicate id is an embedder error.
    pub fn create_job(&self, expr: &str, bounds: Bounds, id: JobId) -> Result<bool> {
        let funcs = FunctionPack::new(&self.compiler, expr, self.threads + 1);
        let valid = funcs.is_valid();
        let job = Arc::new(Job::new(id, funcs, bounds));

        let mut st = self.shared.state.lock().unwrap();
        if st.find(id).is_some() {
            bail!("Renderer: job id {:?} already exists", id);
        }
        st.pending.push(Command::Add(job));
        st.mark_dirty();
        drop(st);
        self.shared.wake.notify_one();

        trace!("Renderer: created job {:?} (valid: {})", id, valid);
        Ok(valid)
    }

    /// Replaces a job's equation. Returns whether the new expression
    /// compiled; an invalid edit leaves the job unscheduled until the next
    /// successful edit.
    pub fn edit_job(&self, id: JobId, expr: &str) -> Result<bool> {
        let funcs = FunctionPack::new(&self.compiler, expr, self.threads + 1);
        let valid = funcs.is_valid();

        let mut st = self.shared.state.lock().unwrap();
        if st.find(id).is_none() {
            bail!("Renderer: edit for unknown job {:?}", id);
        }
        st.pending.push(Command::Edit { id, funcs });
        st.mark_dirty();
        drop(st);
        self.shared.wake.notify_one();

        trace!("Renderer: edited job {:?} (valid: {})", id, valid);
        Ok(valid)
    }

    /// Queues a job for deletion; applied between scans so the collection is
    /// never mutated while a pass may be iterating it.
    pub fn delete_job(&self, id: JobId) {
        let mut st = self.shared.state.lock().unwrap();
        st.pending.push(Command::Delete(id));
        st.mark_dirty();
        drop(st);
        self.shared.wake.notify_one();
    }

    /// Viewport pan/zoom: updates every job's bounds and reprocesses.
    pub fn set_bounds(&self, bounds: Bounds) {
        let mut st = self.shared.state.lock().unwrap();
        st.pending.push(Command::SetBounds(bounds));
        st.mark_dirty();
        drop(st);
        self.shared.wake.notify_one();
    }

    pub fn set_color(&self, id: JobId, color: Color) -> Result<()> {
        let job = self
            .find_job(id)
            .with_context(|| format!("Renderer: recolor for unknown job {:?}", id))?;
        job.set_color(color);
        (self.shared.refresh)();
        Ok(())
    }

    pub fn get_color(&self, id: JobId) -> Result<Color> {
        let job = self
            .find_job(id)
            .with_context(|| format!("Renderer: color query for unknown job {:?}", id))?;
        Ok(job.color())
    }

    /// The job's published contour, a complete consistent snapshot.
    pub fn vertices(&self, id: JobId) -> Option<Arc<Vec<f64>>> {
        self.find_job(id).map(|job| job.vertices())
    }

    /// The job's last seed set; `Some` only while seed retention is on.
    pub fn seeds(&self, id: JobId) -> Option<Arc<Vec<Seed>>> {
        self.find_job(id).and_then(|job| job.seeds())
    }

    /// The job's last filter mesh; `Some` only while mesh retention is on.
    pub fn filter_mesh(&self, id: JobId) -> Option<Arc<FilterMesh>> {
        self.find_job(id).and_then(|job| job.filter_mesh())
    }

    pub fn status(&self, id: JobId) -> Option<JobStatus> {
        self.find_job(id).map(|job| job.status())
    }

    pub fn settings(&self) -> RenderSettings {
        self.shared.state.lock().unwrap().settings
    }

    pub fn strategy(&self) -> Strategy {
        self.settings().strategy
    }

    pub fn set_strategy(&self, strategy: Strategy) {
        self.update_settings(|s| s.strategy = strategy);
    }

    pub fn seed_num(&self) -> usize {
        self.settings().seed_num
    }

    pub fn set_seed_num(&self, n: usize) {
        let clamped = n.clamp(SEED_NUM_RANGE.0, SEED_NUM_RANGE.1);
        if clamped != n {
            warn!("Renderer: seed_num {} out of range, clamped to {}", n, clamped);
        }
        self.update_settings(|s| s.seed_num = clamped);
    }

    pub fn filter_mesh_res(&self) -> u32 {
        self.settings().filter_mesh_res
    }

    pub fn set_filter_mesh_res(&self, res: u32) {
        let clamped = res.clamp(FILTER_MESH_RES_RANGE.0, FILTER_MESH_RES_RANGE.1);
        if clamped != res {
            warn!("Renderer: filter_mesh_res {} out of range, clamped to {}", res, clamped);
        }
        self.update_settings(|s| s.filter_mesh_res = clamped);
    }

    pub fn final_mesh_res(&self) -> u32 {
        self.settings().final_mesh_res
    }

    pub fn set_final_mesh_res(&self, res: u32) {
        let clamped = res.clamp(FINAL_MESH_RES_RANGE.0, FINAL_MESH_RES_RANGE.1);
        if clamped != res {
            warn!("Renderer: final_mesh_res {} out of range, clamped to {}", res, clamped);
        }
        self.update_settings(|s| s.final_mesh_res = clamped);
    }

    /// Retain each job's seed set for visualization. Turning retention off
    /// releases the cached sets immediately.
    pub fn keep_seeds(&self, keep: bool) {
        self.update_settings(|s| s.keep_seeds = keep);
        if !keep {
            for job in self.shared.state.lock().unwrap().jobs.iter() {
                job.set_seeds(None);
            }
        }
    }

    /// Retain each job's filter mesh for visualization.
    pub fn keep_mesh(&self, keep: bool) {
        self.update_settings(|s| s.keep_mesh = keep);
        if !keep {
            for job in self.shared.state.lock().unwrap().jobs.iter() {
                job.set_filter_mesh(None);
            }
        }
    }

    /// Applies a settings mutation, marks every job outdated, and wakes the
    /// polling loop, so displayed output always reflects one complete,
    /// consistent configuration.
    fn update_settings(&self, f: impl FnOnce(&mut RenderSettings)) {
        let mut st = self.shared.state.lock().unwrap();
        f(&mut st.settings);
        for job in &st.jobs {
            job.mark_outdated();
        }
        st.mark_dirty();
        drop(st);
        self.shared.wake.notify_one();
    }

    fn find_job(&self, id: JobId) -> Option<Arc<Job>> {
        self.shared.state.lock().unwrap().find(id)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        {
            let mut st = self.shared.state.lock().unwrap();
            st.shutdown = true;
        }
        self.shared.wake.notify_all();
        if let Some(handle) = self.poll_thread.take() {
            if handle.join().is_err() {
                log::error!("Renderer: polling thread panicked during shutdown");
            }
        }
    }
}

/// The background polling loop. Parks on the condition variable until a
/// mutation signals a rescan, drains structural commands, then resolves at
/// most one outdated job before re-checking for newly arrived work.
fn poll_loop(shared: Arc<Shared>, threads: usize) {
    debug!("Renderer: polling thread started ({} workers)", threads);

    loop {
        let (jobs, settings, deleted) = {
            let mut st = shared.state.lock().unwrap();
            while !st.rescan && !st.shutdown {
                st = shared.wake.wait(st).unwrap();
            }
            if st.shutdown {
                break;
            }
            st.rescan = false;
            let deleted = apply_commands(&mut st);
            (st.jobs.clone(), st.settings, deleted)
        };
        if deleted {
            (shared.refresh)();
        }

        let mut processed = false;
        for job in &jobs {
            if job.is_valid() && job.status() == JobStatus::Outdated {
                job.set_status(JobStatus::Processing);
                process_job(job, &settings, threads);
                if !job.try_complete() {
                    trace!(
                        "Renderer: job {:?} invalidated mid-pass; result published, requeued",
                        job.id
                    );
                }
                processed = true;
                break;
            }
        }

        let mut fire_all_complete = false;
        {
            let mut st = shared.state.lock().unwrap();
            if processed {
                // More outdated jobs may remain; rescan from the start.
                st.rescan = true;
            } else if !st.all_complete {
                st.all_complete = true;
                fire_all_complete = true;
            }
        }
        if fire_all_complete {
            trace!("Renderer: all jobs complete");
            (shared.refresh)();
        }
    }

    debug!("Renderer: polling thread exiting");
}

/// Drains the structural command queue. Returns whether any job was deleted
/// (the refresh callback fires once per delete batch).
fn apply_commands(st: &mut State) -> bool {
    let commands: Vec<Command> = st.pending.drain(..).collect();
    let mut deleted = false;

    for cmd in commands {
        match cmd {
            Command::Add(job) => {
                trace!("Renderer: adding job {:?}", job.id);
                st.jobs.push(job);
            }
            Command::Edit { id, funcs } => match st.jobs.iter().find(|j| j.id == id) {
                Some(job) => {
                    let valid = funcs.is_valid();
                    {
                        let mut inner = job.inner.lock().unwrap();
                        inner.funcs = funcs;
                    }
                    job.set_valid(valid);
                    job.mark_outdated();
                }
                None => warn!("Renderer: edit for job {:?} deleted before apply", id),
            },
            Command::SetBounds(bounds) => {
                for job in &st.jobs {
                    {
                        let mut inner = job.inner.lock().unwrap();
                        inner.bounds = bounds;
                    }
                    job.mark_outdated();
                }
            }
            Command::Delete(id) => {
                let before = st.jobs.len();
                st.jobs.retain(|j| j.id != id);
                if st.jobs.len() == before {
                    warn!("Renderer: delete for unknown job {:?}", id);
                } else {
                    deleted = true;
                }
            }
        }
    }
    deleted
}

/// Resolves one job against a settings snapshot: generator, filter mesh, and
/// contour march, then the atomic publish.
fn process_job(job: &Job, settings: &RenderSettings, threads: usize) {
    let pass_start = Instant::now();
    let mut inner = job.inner.lock().unwrap();
    let bounds = inner.bounds;

    // Fine resolution may never drop below the filter resolution.
    let final_res = settings.final_mesh_res.max(settings.filter_mesh_res);

    inner.verts.clear();
    let crate::job::JobInner { funcs, verts, .. } = &mut *inner;

    match settings.strategy {
        Strategy::Filtering => {
            let mut seeds = Vec::new();
            ProximalBracketingGenerator::generate(
                &mut seeds,
                funcs,
                bounds,
                settings.max_eval,
                settings.filter_mesh_res,
                settings.seed_num,
                threads,
            );

            let mut mesh = FilterMesh::new(settings.filter_mesh_res, bounds);
            mesh.insert_all(&seeds);

            *verts = contour(bounds, funcs, Some(&mesh), final_res, threads);

            job.set_seeds(settings.keep_seeds.then(|| Arc::new(seeds)));
            job.set_filter_mesh(settings.keep_mesh.then(|| Arc::new(mesh)));
        }
        Strategy::Direct => {
            *verts = contour(bounds, funcs, None, final_res, threads);
            job.set_seeds(None);
            job.set_filter_mesh(None);
        }
    }

    job.publish(verts);
    debug!(
        "Renderer: job {:?} resolved ({} segments in {:?})",
        job.id,
        verts.len() / 4,
        pass_start.elapsed()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::Function;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn test_compiler() -> Compiler {
        Arc::new(|expr: &str| -> Option<Box<dyn Function>> {
            match expr {
                "circle" => Some(Box::new(|x: f64, y: f64| x * x + y * y - 1.0)),
                "no_root" => Some(Box::new(|x: f64, y: f64| x * x + y * y + 1.0)),
                "line" => Some(Box::new(|x: f64, y: f64| x - y)),
                _ => None,
            }
        })
    }

    fn small_settings() -> RenderSettings {
        RenderSettings {
            seed_num: 512,
            filter_mesh_res: 4,
            final_mesh_res: 6,
            ..RenderSettings::default()
        }
    }

    fn wait_for_complete(renderer: &Renderer, id: JobId, timeout: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if renderer.status(id) == Some(JobStatus::Complete) {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test_log::test]
    fn valid_job_resolves_and_publishes() {
        let renderer = Renderer::with_settings(
            test_compiler(),
            Arc::new(|| {}),
            small_settings(),
        )
        .unwrap();
        let bounds = Bounds::new(-2.0, -2.0, 2.0, 2.0);

        assert!(renderer.create_job("circle", bounds, JobId(1)).unwrap());
        assert!(wait_for_complete(&renderer, JobId(1), Duration::from_secs(10)));

        let verts = renderer.vertices(JobId(1)).unwrap();
        assert!(!verts.is_empty());
        assert_eq!(verts.len() % 4, 0);
    }

    #[test_log::test]
    fn invalid_equation_is_flagged_and_never_scheduled() {
        let renderer = Renderer::with_settings(
            test_compiler(),
            Arc::new(|| {}),
            small_settings(),
        )
        .unwrap();
        let bounds = Bounds::new(-1.0, -1.0, 1.0, 1.0);

        assert!(!renderer.create_job("gibberish", bounds, JobId(1)).unwrap());
        thread::sleep(Duration::from_millis(50));
        assert_eq!(renderer.status(JobId(1)), Some(JobStatus::Outdated));
        assert!(renderer.vertices(JobId(1)).unwrap().is_empty());
    }

    #[test_log::test]
    fn duplicate_id_is_rejected() {
        let renderer = Renderer::with_settings(
            test_compiler(),
            Arc::new(|| {}),
            small_settings(),
        )
        .unwrap();
        let bounds = Bounds::new(-1.0, -1.0, 1.0, 1.0);
        renderer.create_job("circle", bounds, JobId(1)).unwrap();
        assert!(renderer.create_job("line", bounds, JobId(1)).is_err());
    }

    #[test_log::test]
    fn unknown_ids_are_errors_where_documented() {
        let renderer = Renderer::with_settings(
            test_compiler(),
            Arc::new(|| {}),
            small_settings(),
        )
        .unwrap();
        assert!(renderer.edit_job(JobId(9), "circle").is_err());
        assert!(renderer.get_color(JobId(9)).is_err());
        assert!(renderer.set_color(JobId(9), Color::new(1, 2, 3)).is_err());
        assert!(renderer.vertices(JobId(9)).is_none());
        assert!(renderer.status(JobId(9)).is_none());
    }

    #[test_log::test]
    fn colors_round_trip_and_fire_refresh() {
        let refreshes = Arc::new(AtomicUsize::new(0));
        let counter = refreshes.clone();
        let renderer = Renderer::with_settings(
            test_compiler(),
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            small_settings(),
        )
        .unwrap();

        let bounds = Bounds::new(-1.0, -1.0, 1.0, 1.0);
        renderer.create_job("circle", bounds, JobId(1)).unwrap();
        assert_eq!(renderer.get_color(JobId(1)).unwrap(), Color::default());

        let before = refreshes.load(Ordering::SeqCst);
        renderer.set_color(JobId(1), Color::new(200, 30, 30)).unwrap();
        assert_eq!(renderer.get_color(JobId(1)).unwrap(), Color::new(200, 30, 30));
        assert!(refreshes.load(Ordering::SeqCst) > before);
    }

    #[test_log::test]
    fn settings_mutators_clamp_out_of_range_values() {
        let renderer = Renderer::with_settings(
            test_compiler(),
            Arc::new(|| {}),
            small_settings(),
        )
        .unwrap();

        renderer.set_seed_num(10);
        assert_eq!(renderer.seed_num(), SEED_NUM_RANGE.0);
        renderer.set_seed_num(1_000_000);
        assert_eq!(renderer.seed_num(), SEED_NUM_RANGE.1);

        renderer.set_filter_mesh_res(0);
        assert_eq!(renderer.filter_mesh_res(), FILTER_MESH_RES_RANGE.0);
        renderer.set_final_mesh_res(99);
        assert_eq!(renderer.final_mesh_res(), FINAL_MESH_RES_RANGE.1);
    }

    #[test_log::test]
    fn delete_applies_between_scans_and_fires_refresh() {
        let refreshes = Arc::new(AtomicUsize::new(0));
        let counter = refreshes.clone();
        let renderer = Renderer::with_settings(
            test_compiler(),
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            small_settings(),
        )
        .unwrap();

        let bounds = Bounds::new(-2.0, -2.0, 2.0, 2.0);
        renderer.create_job("circle", bounds, JobId(1)).unwrap();
        assert!(wait_for_complete(&renderer, JobId(1), Duration::from_secs(10)));

        let before = refreshes.load(Ordering::SeqCst);
        renderer.delete_job(JobId(1));

        let start = Instant::now();
        while renderer.status(JobId(1)).is_some() && start.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(2));
        }
        assert!(renderer.status(JobId(1)).is_none());
        assert!(renderer.vertices(JobId(1)).is_none());
        assert!(refreshes.load(Ordering::SeqCst) > before);
    }
}
