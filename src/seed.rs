// src/seed.rs

//! Candidate on-curve points produced by the generator.

/// A candidate point on (or near) the zero-set.
///
/// `fs` caches the most recent evaluation of `f(x, y)` at this position.
/// `active` is cleared when a Newton step drives the sample somewhere the
/// function evaluates non-finite; abandoned samples are skipped by every
/// later phase but never abort the pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Seed {
    pub x: f64,
    pub y: f64,
    pub fs: f64,
    pub active: bool,
}

impl Seed {
    pub fn new(x: f64, y: f64) -> Self {
        Seed { x, y, fs: 0.0, active: true }
    }
}

/// Euclidean distance between two seeds.
pub fn distance(a: &Seed, b: &Seed) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    (dx * dx + dy * dy).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_euclidean() {
        let a = Seed::new(0.0, 0.0);
        let b = Seed::new(3.0, 4.0);
        assert!((distance(&a, &b) - 5.0).abs() < 1e-12);
        assert_eq!(distance(&a, &a), 0.0);
    }
}
