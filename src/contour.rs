// src/contour.rs

//! Row-parallel marching squares over the fine grid.
//!
//! The fine grid (`2^final_mesh_res` cells per side) is partitioned into
//! contiguous horizontal row bands, one per worker. Before band work starts,
//! every band-boundary row (plus the grid's first and last rows) is computed
//! once by a short parallel pass; bands then read their shared rows from
//! those buffers, so neighboring bands agree bitwise on boundary values and
//! the output is invariant to the worker count.
//!
//! When a filter mesh is supplied, a fine sample is evaluated only if some
//! marked coarse box touches one of its adjacent fine cells; everything else
//! stays inactive and is skipped without an evaluator call. A cell is
//! contoured only when all four corner samples are active, which also
//! quarantines non-finite evaluations to their four adjacent cells.

use std::thread;

use crate::bounds::Bounds;
use crate::filter_mesh::FilterMesh;
use crate::function::{Function, FunctionPack};
use crate::value_buffer::ValueBuffer;

/// Edge indices crossed by the segments of each corner-sign pattern.
///
/// Corners are numbered `0 = (lx, ty)`, `1 = (rx, ty)`, `2 = (rx, by)`,
/// `3 = (lx, by)`; edge `e` joins corner `e` to corner `(e + 1) % 4`, so
/// `0` = top, `1` = right, `2` = bottom, `3` = left. Bit `i` of the pattern
/// is set when `vals[i] < 0`. The fixed diagonal choice in the two saddle
/// patterns (5 and 10) is part of the contract; do not re-derive it.
const EDGE_TABLE: [[usize; 4]; 16] = [
    [0, 0, 0, 0],
    [0, 3, 0, 0],
    [0, 1, 0, 0],
    [1, 3, 0, 0],
    [1, 2, 0, 0],
    [0, 1, 2, 3],
    [0, 2, 0, 0],
    [2, 3, 0, 0],
    [2, 3, 0, 0],
    [0, 2, 0, 0],
    [0, 3, 1, 2],
    [1, 2, 0, 0],
    [1, 3, 0, 0],
    [0, 1, 0, 0],
    [0, 3, 0, 0],
    [0, 0, 0, 0],
];

/// Segment count per corner-sign pattern (0, 1, or 2).
const SEGMENT_COUNTS: [usize; 16] = [0, 1, 1, 1, 1, 2, 1, 1, 1, 1, 2, 1, 1, 1, 1, 0];

/// Line segments extracted from one cell: `n` segments, endpoint `li` at
/// `(xs[li], ys[li])`.
#[derive(Debug, Clone, Copy, Default)]
struct TileLines {
    n: usize,
    xs: [f64; 4],
    ys: [f64; 4],
}

/// Marching-squares extraction for one cell.
///
/// Edge crossings are placed by linear interpolation of the signed corner
/// values: `x = (x1*v2 - v1*x2) / (v2 - v1)` along horizontal edges and
/// symmetrically in y along vertical edges.
fn tile_lines(xs: &[f64; 4], ys: &[f64; 4], vals: &[f64; 4]) -> TileLines {
    let mut case = 0usize;
    case |= (vals[0] < 0.0) as usize;
    case |= ((vals[1] < 0.0) as usize) << 1;
    case |= ((vals[2] < 0.0) as usize) << 2;
    case |= ((vals[3] < 0.0) as usize) << 3;

    let mut lines = TileLines {
        n: SEGMENT_COUNTS[case],
        ..TileLines::default()
    };

    for li in 0..lines.n * 2 {
        let e = EDGE_TABLE[case][li];
        let a = e;
        let b = (e + 1) % 4;
        let v1 = vals[a];
        let v2 = vals[b];

        if e % 2 == 1 {
            // Vertical edge: x fixed, interpolate y.
            lines.xs[li] = xs[a];
            lines.ys[li] = (ys[a] * v2 - v1 * ys[b]) / (v2 - v1);
        } else {
            // Horizontal edge: y fixed, interpolate x.
            lines.ys[li] = ys[a];
            lines.xs[li] = (xs[a] * v2 - v1 * xs[b]) / (v2 - v1);
        }
    }
    lines
}

/// Whether the fine sample at grid point `(x, y)` is needed, i.e. whether any
/// coarse box covering one of its adjacent fine cells is marked.
fn sample_needed(
    mesh: Option<&FilterMesh>,
    x: usize,
    y: usize,
    fine_dim: usize,
    ratio: usize,
) -> bool {
    let mesh = match mesh {
        Some(m) => m,
        None => return true,
    };
    let cx0 = x.saturating_sub(1) / ratio;
    let cx1 = x.min(fine_dim - 1) / ratio;
    let cy0 = y.saturating_sub(1) / ratio;
    let cy1 = y.min(fine_dim - 1) / ratio;

    mesh.is_marked(cx0, cy0)
        || mesh.is_marked(cx1, cy0)
        || mesh.is_marked(cx0, cy1)
        || mesh.is_marked(cx1, cy1)
}

/// Fills one scan line of `fine_dim + 1` samples at grid row `y`.
///
/// Every slot is rewritten: skipped and non-finite samples are deactivated,
/// so a buffer can be reused across rows without clearing.
fn fill_row(
    buf: &mut ValueBuffer,
    y: usize,
    bounds: Bounds,
    fine_dim: usize,
    mesh: Option<&FilterMesh>,
    ratio: usize,
    func: &mut dyn Function,
) {
    let world_y = bounds.ymin + bounds.h() * y as f64 / fine_dim as f64;
    for x in 0..=fine_dim {
        if !sample_needed(mesh, x, y, fine_dim, ratio) {
            buf.set_inactive(x);
            continue;
        }
        let world_x = bounds.xmin + bounds.w() * x as f64 / fine_dim as f64;
        let v = func.eval(world_x, world_y);
        if v.is_finite() {
            buf.set(x, v);
        } else {
            buf.set_inactive(x);
        }
    }
}

/// Marches the cells whose top row lies in `(start, end]`, swapping a pair of
/// row buffers as it descends. The first "below" row comes from the shared
/// `bottom` boundary buffer and the final row is read from `top`, never
/// recomputed.
#[allow(clippy::too_many_arguments)]
fn contour_band(
    verts: &mut Vec<f64>,
    start: usize,
    end: usize,
    bounds: Bounds,
    fine_dim: usize,
    mesh: Option<&FilterMesh>,
    ratio: usize,
    func: &mut dyn Function,
    bottom: &ValueBuffer,
    top: &ValueBuffer,
) {
    let square_w = bounds.w() / fine_dim as f64;
    let square_h = bounds.h() / fine_dim as f64;

    let mut down = bottom.clone();
    let mut up = ValueBuffer::new(fine_dim + 1);

    for y in (start + 1)..=end {
        if y < end {
            fill_row(&mut up, y, bounds, fine_dim, mesh, ratio, func);
        } else {
            up.clone_from(top);
        }

        let world_y = bounds.ymin + bounds.h() * y as f64 / fine_dim as f64;
        for x in 1..=fine_dim {
            if !(up.is_active(x - 1)
                && up.is_active(x)
                && down.is_active(x)
                && down.is_active(x - 1))
            {
                continue;
            }

            let rx = bounds.xmin + bounds.w() * x as f64 / fine_dim as f64;
            let lx = rx - square_w;
            let ty = world_y;
            let by = world_y - square_h;

            let xs = [lx, rx, rx, lx];
            let ys = [ty, ty, by, by];
            let vals = [up.get(x - 1), up.get(x), down.get(x), down.get(x - 1)];

            let lines = tile_lines(&xs, &ys, &vals);
            for li in 0..lines.n * 2 {
                verts.push(lines.xs[li]);
                verts.push(lines.ys[li]);
            }
        }

        std::mem::swap(&mut up, &mut down);
    }
}

/// Extracts the contour of `funcs`'s equation over `bounds` at fine
/// resolution `2^final_mesh_res`, using up to `threads` workers.
///
/// Returns flat segment endpoint coordinates (`x0, y0, x1, y1` repeated).
/// With `mesh = Some(..)`, cells outside every marked coarse box are skipped
/// without evaluator calls; with `None`, the full grid is marched.
pub fn contour(
    bounds: Bounds,
    funcs: &mut FunctionPack,
    mesh: Option<&FilterMesh>,
    final_mesh_res: u32,
    threads: usize,
) -> Vec<f64> {
    let fine_dim = 1usize << final_mesh_res;
    let band_num = threads.clamp(1, fine_dim);

    funcs.resize(band_num + 1);
    if funcs.is_empty() {
        return Vec::new();
    }

    let ratio = match mesh {
        Some(m) => (fine_dim / m.dim()).max(1),
        None => 1,
    };

    // Balanced contiguous row bands.
    let mut start_rows = vec![0usize; band_num];
    for (ti, row) in start_rows.iter_mut().enumerate() {
        *row = fine_dim * ti / band_num;
    }
    let mut end_rows = vec![fine_dim; band_num];
    for ti in 0..band_num - 1 {
        end_rows[ti] = start_rows[ti + 1];
    }

    // Compute every band-boundary row once, in parallel, so both bands
    // sharing a row see bitwise-identical values.
    let mut boundary_rows = start_rows.clone();
    boundary_rows.push(fine_dim);

    let mut boundaries: Vec<ValueBuffer> = (0..=band_num)
        .map(|_| ValueBuffer::new(fine_dim + 1))
        .collect();

    thread::scope(|s| {
        for ((buf, func), &row) in boundaries
            .iter_mut()
            .zip(funcs.funcs_mut())
            .zip(boundary_rows.iter())
        {
            s.spawn(move || {
                fill_row(buf, row, bounds, fine_dim, mesh, ratio, func.as_mut());
            });
        }
    });

    // Dispatch the bands.
    let mut band_verts: Vec<Vec<f64>> = vec![Vec::new(); band_num];
    thread::scope(|s| {
        let boundaries = &boundaries;
        for (ti, (verts, func)) in band_verts.iter_mut().zip(funcs.funcs_mut()).enumerate() {
            let (start, end) = (start_rows[ti], end_rows[ti]);
            let bottom = &boundaries[ti];
            let top = &boundaries[ti + 1];
            s.spawn(move || {
                contour_band(
                    verts,
                    start,
                    end,
                    bounds,
                    fine_dim,
                    mesh,
                    ratio,
                    func.as_mut(),
                    bottom,
                    top,
                );
            });
        }
    });

    // Concatenate in band order; row-major overall, so the result does not
    // depend on the band count.
    let total: usize = band_verts.iter().map(Vec::len).sum();
    let mut verts = Vec::with_capacity(total);
    for band in band_verts {
        verts.extend(band);
    }

    log::trace!(
        "Contour: {} segments at dim {} across {} bands",
        verts.len() / 4,
        fine_dim,
        band_num
    );
    verts
}
