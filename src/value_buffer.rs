// src/value_buffer.rs

//! One scan-line of function samples with an activity mask.

/// A row-scratch buffer of function values at full contouring resolution.
///
/// `active[i]` distinguishes "not evaluated" (skipped by the filter mesh, or
/// evaluated to a non-finite value) from "evaluated to a real number". A fine
/// cell is contourable only if all four of its corner slots are active, which
/// lets the marching pass skip filtered-out regions without ever calling the
/// evaluator there.
#[derive(Debug, Clone)]
pub struct ValueBuffer {
    vals: Vec<f64>,
    active: Vec<bool>,
}

impl ValueBuffer {
    pub fn new(len: usize) -> Self {
        ValueBuffer {
            vals: vec![0.0; len],
            active: vec![false; len],
        }
    }

    pub fn len(&self) -> usize {
        self.vals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vals.is_empty()
    }

    /// Stores a value and marks the slot active.
    pub fn set(&mut self, i: usize, v: f64) {
        self.vals[i] = v;
        self.active[i] = true;
    }

    /// Marks a slot inactive (skipped or non-finite sample). The stale value
    /// is left in place; readers must consult `is_active` first.
    pub fn set_inactive(&mut self, i: usize) {
        self.active[i] = false;
    }

    pub fn get(&self, i: usize) -> f64 {
        self.vals[i]
    }

    pub fn is_active(&self, i: usize) -> bool {
        self.active[i]
    }

    /// Sets the whole activity mask, preserving values. Used when a buffer is
    /// reused across rows or pre-filled from a shared boundary row.
    pub fn set_all_active(&mut self, val: bool) {
        self.active.fill(val);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_start_inactive() {
        let buf = ValueBuffer::new(8);
        assert_eq!(buf.len(), 8);
        for i in 0..8 {
            assert!(!buf.is_active(i));
        }
    }

    #[test]
    fn set_marks_active_and_partial_fill_is_visible() {
        let mut buf = ValueBuffer::new(4);
        buf.set(1, 2.5);
        buf.set(3, -1.0);
        assert!(buf.is_active(1) && buf.is_active(3));
        assert!(!buf.is_active(0) && !buf.is_active(2));
        assert_eq!(buf.get(1), 2.5);
        assert_eq!(buf.get(3), -1.0);
    }

    #[test]
    fn deactivation_keeps_value_but_hides_slot() {
        let mut buf = ValueBuffer::new(2);
        buf.set(0, 7.0);
        buf.set_inactive(0);
        assert!(!buf.is_active(0));

        buf.set_all_active(true);
        assert!(buf.is_active(0) && buf.is_active(1));
        assert_eq!(buf.get(0), 7.0);
    }
}
