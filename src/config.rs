// src/config.rs

//! Tunable resolution settings for the contouring pipeline.
//!
//! These structs can be deserialized from a configuration file or mutated at
//! runtime through the `Renderer` accessors. Out-of-range values are clamped
//! at the mutation sites rather than rejected.

use serde::{Deserialize, Serialize};

/// Valid range for [`RenderSettings::seed_num`].
pub const SEED_NUM_RANGE: (usize, usize) = (512, 16000);
/// Valid range for [`RenderSettings::filter_mesh_res`].
pub const FILTER_MESH_RES_RANGE: (u32, u32) = (2, 8);
/// Valid range for [`RenderSettings::final_mesh_res`].
pub const FINAL_MESH_RES_RANGE: (u32, u32) = (3, 12);

/// Which contouring pipeline a job set runs.
///
/// `Filtering` is the two-phase pipeline (seed generation, coarse filter
/// mesh, filtered march); `Direct` marches the full fine grid with no
/// acceleration structure. The variants are interchangeable at the call
/// sites; `Direct` exists mainly as a reference path and for viewports so
/// small that prefiltering is not worth the seed pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Filtering,
    Direct,
}

/// Resolution and retention settings for one complete pipeline configuration.
///
/// A settings change marks every job outdated, so displayed output always
/// corresponds to a single consistent configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Pipeline selection.
    pub strategy: Strategy,
    /// Number of random samples thrown at the viewport per generation pass.
    pub seed_num: usize,
    /// Coarse filter mesh resolution; the mesh is `2^filter_mesh_res` boxes
    /// on a side.
    pub filter_mesh_res: u32,
    /// Fine marching resolution; the contour grid is `2^final_mesh_res`
    /// cells on a side. Must be at least `filter_mesh_res`.
    pub final_mesh_res: u32,
    /// Evaluation budget for the generator's Newton fallback; at most
    /// `max_eval / 3` sweeps are run when no sign change is found.
    pub max_eval: usize,
    /// Retain each job's seed set for visualization.
    pub keep_seeds: bool,
    /// Retain each job's filter mesh for visualization.
    pub keep_mesh: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        RenderSettings {
            strategy: Strategy::Filtering,
            seed_num: 2048,
            filter_mesh_res: 5,
            final_mesh_res: 9,
            max_eval: 48,
            keep_seeds: false,
            keep_mesh: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_in_range() {
        let s = RenderSettings::default();
        assert!(s.seed_num >= SEED_NUM_RANGE.0 && s.seed_num <= SEED_NUM_RANGE.1);
        assert!(s.filter_mesh_res >= FILTER_MESH_RES_RANGE.0);
        assert!(s.filter_mesh_res <= FILTER_MESH_RES_RANGE.1);
        assert!(s.final_mesh_res >= FINAL_MESH_RES_RANGE.0);
        assert!(s.final_mesh_res <= FINAL_MESH_RES_RANGE.1);
        assert!(s.final_mesh_res >= s.filter_mesh_res);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: RenderSettings =
            serde_json::from_str(r#"{"seed_num": 1024, "strategy": "direct"}"#).unwrap();
        assert_eq!(s.seed_num, 1024);
        assert_eq!(s.strategy, Strategy::Direct);
        assert_eq!(s.final_mesh_res, RenderSettings::default().final_mesh_res);
        assert_eq!(s.keep_seeds, false);
    }
}
