// src/generator.rs

//! Seed generation by proximity bracketing.
//!
//! Finds points lying (approximately) on the zero-set of `f(x, y)` without
//! assuming continuity: random samples are thrown at a slightly expanded
//! viewport, pushed toward the curve with damped Newton sweeps when no sign
//! change shows up, paired into opposite-sign brackets by nearest-neighbor
//! search over a small sample window, and refined with a bracketed bisection
//! whose stopping rule is tied to the coarse filter-mesh cell size. Accuracy
//! finer than one filter box would be wasted, so refinement stops as soon as
//! both bracket ends map into the same box.

use log::{debug, trace};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use std::thread;

use crate::bounds::Bounds;
use crate::function::FunctionPack;
use crate::seed::{distance, Seed};

/// Bounds expansion for the random sampling phase, catching curve segments
/// that cross the viewport edge.
const EXPANSION: f64 = 1.1;
/// Relative forward-difference step for the Newton gradient estimate.
const Q: f64 = 1e-10;
/// Overshoot factor on the Newton step.
const NEWTON_DAMPING: f64 = 1.1;
/// Number of opposite-sign candidates examined when pairing a sample into a
/// bracket.
const SMPL_NUM: usize = 10;
/// Iteration cap on the bracketed refinement of a single bracket.
const MAX_REFINE_ITER: usize = 16;

/// Stateless seed generator; see the module docs for the algorithm.
pub struct ProximalBracketingGenerator;

impl ProximalBracketingGenerator {
    /// Appends up to `seed_num` on-curve seeds to `seeds`.
    ///
    /// Yields zero seeds when the equation has no visible sign change in the
    /// viewport; that is expected behavior, not an error. Samples that
    /// evaluate non-finite are abandoned individually and never abort the
    /// pass.
    ///
    /// # Arguments
    /// * `funcs` - evaluator pack; the initial sampling fans out across up to
    ///   `threads` instances, later phases use the first instance only.
    /// * `max_eval` - evaluation budget; at most `max_eval / 3` Newton sweeps.
    /// * `filter_mesh_res` - resolution of the filter mesh the seeds will be
    ///   inserted into; couples the refinement tolerance to the mesh.
    pub fn generate(
        seeds: &mut Vec<Seed>,
        funcs: &mut FunctionPack,
        bounds: Bounds,
        max_eval: usize,
        filter_mesh_res: u32,
        seed_num: usize,
        threads: usize,
    ) {
        if funcs.is_empty() {
            return;
        }

        let mut samples = sample_random(funcs, bounds, seed_num, threads);
        let (mut pos, mut neg) = count_signs(&samples);
        trace!(
            "Generator: {} finite samples ({} positive, {} negative)",
            samples.len(),
            pos,
            neg
        );

        let func = match funcs.first_mut() {
            Some(f) => f,
            None => return,
        };

        // Newton fallback: no sign change yet, push samples toward a root.
        let max_sweeps = max_eval / 3;
        let mut sweeps = 0;
        while pos.min(neg) < 1 && sweeps < max_sweeps {
            sweeps += 1;
            pos = 0;
            neg = 0;

            for s in samples.iter_mut() {
                if !s.active {
                    continue;
                }
                let fxn = func.eval(s.x + s.x * Q, s.y);
                let fyn = func.eval(s.x, s.y + s.y * Q);

                let dx = (fxn - s.fs) / (s.x * Q);
                let dy = (fyn - s.fs) / (s.y * Q);
                let norm_sq = dx * dx + dy * dy;

                s.x -= NEWTON_DAMPING * (s.fs * dx) / norm_sq;
                s.y -= NEWTON_DAMPING * (s.fs * dy) / norm_sq;

                s.fs = func.eval(s.x, s.y);
                if !s.fs.is_finite() {
                    s.active = false;
                    continue;
                }

                if s.fs > 0.0 {
                    pos += 1;
                } else if s.fs < 0.0 {
                    neg += 1;
                }
            }
        }

        if pos.min(neg) == 0 {
            debug!(
                "Generator: no sign change after {} Newton sweeps; zero seeds",
                sweeps
            );
            return;
        }

        // Partition by sign; seeds1 is the larger set.
        let mut seeds1: Vec<usize> = Vec::new();
        let mut seeds2: Vec<usize> = Vec::new();
        for (i, s) in samples.iter().enumerate() {
            if !s.active {
                continue;
            }
            if s.fs > 0.0 {
                seeds1.push(i);
            } else {
                seeds2.push(i);
            }
        }
        if seeds2.len() > seeds1.len() {
            std::mem::swap(&mut seeds1, &mut seeds2);
        }

        // Proximity bracketing: pair every sample with the nearest
        // opposite-sign sample within a fixed window, symmetrically so every
        // sample participates in at least one bracket.
        let mut brackets: Vec<(Seed, Seed)> = Vec::with_capacity(seeds1.len() + seeds2.len());
        for i in 0..seeds1.len() {
            let s1 = samples[seeds1[i]];
            let mut best = s1;
            let mut best_dist = f64::MAX;
            for si in 0..SMPL_NUM {
                let s = samples[seeds2[(i + si) % seeds2.len()]];
                let d = distance(&s1, &s);
                if d < best_dist {
                    best_dist = d;
                    best = s;
                }
            }
            brackets.push((s1, best));
        }
        for i in 0..seeds2.len() {
            let s2 = samples[seeds2[i]];
            let mut best = s2;
            let mut best_dist = f64::MAX;
            for si in 0..SMPL_NUM {
                let s = samples[seeds1[(i + SMPL_NUM + si) % seeds1.len()]];
                let d = distance(&s2, &s);
                if d < best_dist {
                    best_dist = d;
                    best = s;
                }
            }
            brackets.push((best, s2));
        }

        // Bracketed refinement along each segment, parameterized by t in [0,1].
        let bracket_num = brackets.len();
        let abs_tol = bounds.w().min(bounds.h()) / 1000.0;
        for (s1, s2) in brackets {
            let dx = s2.x - s1.x;
            let dy = s2.y - s1.y;
            let stop = StopCondition::new(s1.x, s1.y, dx, dy, abs_tol, filter_mesh_res, bounds);

            let (mut at, mut bt) = (0.0f64, 1.0f64);
            let mut fa = s1.fs;
            let mut iter = 0;
            while iter < MAX_REFINE_ITER && !stop.reached(at, bt) {
                let mt = 0.5 * (at + bt);
                let fm = func.eval(s1.x + dx * mt, s1.y + dy * mt);
                if !fm.is_finite() {
                    // Refinement hit a hole in the domain; emit what we have.
                    break;
                }
                if (fm > 0.0) == (fa > 0.0) {
                    at = mt;
                    fa = fm;
                } else {
                    bt = mt;
                }
                iter += 1;
            }

            let t = 0.5 * (at + bt);
            seeds.push(Seed::new(s1.x + dx * t, s1.y + dy * t));
        }

        debug!("Generator: emitted {} seeds from {} brackets", seeds.len(), bracket_num);
    }
}

/// Uniform random sampling over the expanded bounds, fanned out across the
/// evaluator pack. Non-finite samples are discarded. Each worker draws from
/// its own PCG stream.
fn sample_random(
    funcs: &mut FunctionPack,
    bounds: Bounds,
    seed_num: usize,
    threads: usize,
) -> Vec<Seed> {
    let workers = threads.clamp(1, funcs.len());
    let ex = bounds.expand(EXPANSION);

    let mut counts = vec![seed_num / workers; workers];
    for c in counts.iter_mut().take(seed_num % workers) {
        *c += 1;
    }

    let mut batches: Vec<Vec<Seed>> = (0..workers).map(|_| Vec::new()).collect();
    thread::scope(|s| {
        for ((batch, func), &count) in batches
            .iter_mut()
            .zip(funcs.funcs_mut())
            .zip(counts.iter())
        {
            s.spawn(move || {
                let mut rng = Pcg32::from_entropy();
                batch.reserve(count);
                for _ in 0..count {
                    let x = ex.xmin + rng.gen::<f64>() * ex.w();
                    let y = ex.ymin + rng.gen::<f64>() * ex.h();
                    let fs = func.eval(x, y);
                    if fs.is_finite() {
                        batch.push(Seed { x, y, fs, active: true });
                    }
                }
            });
        }
    });

    batches.into_iter().flatten().collect()
}

fn count_signs(samples: &[Seed]) -> (usize, usize) {
    let mut pos = 0;
    let mut neg = 0;
    for s in samples {
        if !s.active {
            continue;
        }
        if s.fs > 0.0 {
            pos += 1;
        } else if s.fs < 0.0 {
            neg += 1;
        }
    }
    (pos, neg)
}

/// Early-termination rule for the bracketed refinement.
///
/// Stops when the bracket length in parameter space drops below a tolerance
/// derived from `min(w, h) / 1000`, or when both bracket ends already map
/// into the same filter-mesh box (further refinement could not change which
/// box gets marked).
struct StopCondition {
    rel_tol: f64,
    box_x_scale: f64,
    box_x_offset: f64,
    box_y_scale: f64,
    box_y_offset: f64,
}

impl StopCondition {
    fn new(
        x0: f64,
        y0: f64,
        dx: f64,
        dy: f64,
        abs_tol: f64,
        filter_mesh_res: u32,
        bounds: Bounds,
    ) -> Self {
        let bracket_length = (dx * dx + dy * dy).sqrt();
        let filter_dim = (1u64 << filter_mesh_res) as f64;
        StopCondition {
            rel_tol: abs_tol / bracket_length,
            box_x_scale: dx * filter_dim / bounds.w(),
            box_x_offset: (x0 - bounds.xmin) * filter_dim / bounds.w(),
            box_y_scale: dy * filter_dim / bounds.h(),
            box_y_offset: (y0 - bounds.ymin) * filter_dim / bounds.h(),
        }
    }

    fn reached(&self, at: f64, bt: f64) -> bool {
        if (at - bt).abs() < self.rel_tol {
            return true;
        }

        let a_bx = (self.box_x_scale * at + self.box_x_offset).floor() as i64;
        let a_by = (self.box_y_scale * at + self.box_y_offset).floor() as i64;
        let b_bx = (self.box_x_scale * bt + self.box_x_offset).floor() as i64;
        let b_by = (self.box_y_scale * bt + self.box_y_offset).floor() as i64;

        a_bx == b_bx && a_by == b_by
    }
}
