// src/function.rs

//! The evaluator seam between this crate and the expression layer.
//!
//! Expression parsing lives outside this crate; the embedder hands us a
//! [`Compiler`] that turns equation text into an evaluator, or `None` when
//! the text does not parse. Evaluators may carry mutable scratch state (a
//! compiled expression's variable bindings, for instance), so concurrent use
//! is handled by replication: a [`FunctionPack`] owns N independent instances
//! cloned from one compiled description, and each worker thread borrows
//! exactly one of them for the duration of a pass.

use std::sync::Arc;

/// A per-thread evaluator for one equation's `f(x, y)`.
///
/// `eval` takes `&mut self` because implementations typically write `x` and
/// `y` into bound variables before evaluating a compiled expression tree.
/// Evaluations may return non-finite values; callers are expected to contain
/// those locally (the offending sample or cell is dropped, never the pass).
pub trait Function: Send {
    fn eval(&mut self, x: f64, y: f64) -> f64;

    /// Clones this evaluator into a fresh, independent instance.
    fn clone_box(&self) -> Box<dyn Function>;
}

/// Any cloneable closure is an evaluator. This is the path tests and simple
/// embedders use; expression-backed evaluators implement the trait directly.
impl<F> Function for F
where
    F: FnMut(f64, f64) -> f64 + Clone + Send + 'static,
{
    fn eval(&mut self, x: f64, y: f64) -> f64 {
        self(x, y)
    }

    fn clone_box(&self) -> Box<dyn Function> {
        Box::new(self.clone())
    }
}

/// Turns equation text into an evaluator; `None` reports a parse failure.
pub type Compiler = Arc<dyn Fn(&str) -> Option<Box<dyn Function>> + Send + Sync>;

/// N independent evaluator instances for one equation, so concurrent workers
/// never share evaluator state.
pub struct FunctionPack {
    expr: String,
    funcs: Vec<Box<dyn Function>>,
    is_valid: bool,
}

impl FunctionPack {
    /// Compiles `expr` once and replicates the result `size` times. A compile
    /// failure yields an empty, invalid pack; the owning job is retained but
    /// never scheduled.
    pub fn new(compiler: &Compiler, expr: &str, size: usize) -> Self {
        match compiler(expr) {
            Some(func) => {
                let mut funcs = Vec::with_capacity(size.max(1));
                for _ in 1..size.max(1) {
                    funcs.push(func.clone_box());
                }
                funcs.push(func);
                FunctionPack { expr: expr.to_string(), funcs, is_valid: true }
            }
            None => {
                log::debug!("FunctionPack: expression {:?} failed to compile", expr);
                FunctionPack { expr: expr.to_string(), funcs: Vec::new(), is_valid: false }
            }
        }
    }

    /// Builds a pack directly from an evaluator, bypassing compilation.
    pub fn from_function(func: Box<dyn Function>, expr: &str, size: usize) -> Self {
        let mut pack = FunctionPack {
            expr: expr.to_string(),
            funcs: vec![func],
            is_valid: true,
        };
        pack.resize(size);
        pack
    }

    /// Grows the pack to at least `size` instances by cloning. Never shrinks:
    /// existing instances may be borrowed by reference elsewhere, and keeping
    /// them is cheaper than re-cloning next pass.
    pub fn resize(&mut self, size: usize) {
        if !self.is_valid {
            return;
        }
        while self.funcs.len() < size {
            let clone = self.funcs[0].clone_box();
            self.funcs.push(clone);
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// Mutable access to the whole pack; workers split this slice so each
    /// thread owns exactly one instance.
    pub fn funcs_mut(&mut self) -> &mut [Box<dyn Function>] {
        &mut self.funcs
    }

    /// The designated instance for single-threaded phases.
    pub fn first_mut(&mut self) -> Option<&mut Box<dyn Function>> {
        self.funcs.first_mut()
    }
}

impl std::fmt::Debug for FunctionPack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionPack")
            .field("expr", &self.expr)
            .field("len", &self.funcs.len())
            .field("is_valid", &self.is_valid)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circle_compiler() -> Compiler {
        Arc::new(|expr: &str| {
            if expr == "bad" {
                None
            } else {
                Some(Box::new(|x: f64, y: f64| x * x + y * y - 1.0) as Box<dyn Function>)
            }
        })
    }

    #[test]
    fn pack_replicates_independent_instances() {
        let compiler = circle_compiler();
        let mut pack = FunctionPack::new(&compiler, "x^2 + y^2 - 1", 4);
        assert!(pack.is_valid());
        assert_eq!(pack.len(), 4);
        for f in pack.funcs_mut() {
            assert!((f.eval(1.0, 0.0)).abs() < 1e-12);
        }
    }

    #[test]
    fn compile_failure_yields_invalid_pack() {
        let compiler = circle_compiler();
        let mut pack = FunctionPack::new(&compiler, "bad", 4);
        assert!(!pack.is_valid());
        assert!(pack.is_empty());
        // Resizing an invalid pack is a no-op.
        pack.resize(8);
        assert!(pack.is_empty());
    }

    #[test]
    fn resize_grows_but_never_shrinks() {
        let compiler = circle_compiler();
        let mut pack = FunctionPack::new(&compiler, "x^2 + y^2 - 1", 2);
        pack.resize(5);
        assert_eq!(pack.len(), 5);
        pack.resize(3);
        assert_eq!(pack.len(), 5);
    }
}
