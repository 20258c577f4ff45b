// src/lib.rs

//! Implicit-equation contouring engine.
//!
//! Turns an implicit equation `f(x, y) = 0` into line segments suitable for
//! rendering, via a three-stage pipeline per job:
//!
//! 1. A proximity-bracketing generator scatters random samples, pulls them
//!    toward the curve with damped Newton sweeps, pairs opposite-sign samples
//!    into brackets, and bisects each bracket down to a near-curve seed.
//! 2. The seeds populate a coarse [`FilterMesh`], an occupancy grid marking
//!    the boxes likely to contain the curve.
//! 3. A row-parallel marching-squares pass walks the fine grid, skipping
//!    cells whose coarse boxes are unmarked, and emits segment endpoints.
//!
//! The [`Renderer`] owns the job set and a background polling thread that
//! reprocesses outdated jobs one at a time; equation compilation is supplied
//! by the embedder as a [`Compiler`] callback.

pub mod bounds;
pub mod color;
pub mod config;
pub mod contour;
pub mod filter_mesh;
pub mod function;
pub mod generator;
pub mod job;
pub mod renderer;
pub mod seed;
pub mod value_buffer;

pub use bounds::Bounds;
pub use color::Color;
pub use config::{RenderSettings, Strategy};
pub use filter_mesh::FilterMesh;
pub use function::{Compiler, Function, FunctionPack};
pub use job::{JobId, JobStatus};
pub use renderer::{RefreshCallback, Renderer};
pub use seed::Seed;
