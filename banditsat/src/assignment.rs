//! Truth assignment and per-variable freeze state.
use rand::Rng;

use crate::{
    lit::{Lit, Var},
    tracking::Resize,
    vec_map::VecMap,
};

/// A complete truth assignment together with the best assignment found so far
/// and a mask of frozen variables.
///
/// Frozen variables are fixed by the tree path; local search may only flip
/// variables that are not frozen.
#[derive(Default)]
pub struct Assignment {
    values: VecMap<Var, bool>,
    best: VecMap<Var, bool>,
    frozen: VecMap<Var, bool>,
}

impl Assignment {
    /// Returns the current value of a variable.
    #[inline(always)]
    pub fn value(&self, var: Var) -> bool {
        self.values[var]
    }

    /// Returns `true` if the literal is true under the current assignment.
    #[inline(always)]
    pub fn is_true(&self, lit: Lit) -> bool {
        self.values[lit.var()] == lit.is_positive()
    }

    /// Sets the current value of a variable.
    #[inline(always)]
    pub fn set(&mut self, var: Var, value: bool) {
        self.values[var] = value;
    }

    /// Inverts the current value of a variable.
    #[inline(always)]
    pub fn flip(&mut self, var: Var) {
        self.values[var] = !self.values[var];
    }

    /// Returns `true` if local search may not flip the variable.
    #[inline(always)]
    pub fn is_frozen(&self, var: Var) -> bool {
        self.frozen[var]
    }

    /// Fixes a variable, excluding it from local search.
    #[inline(always)]
    pub fn freeze(&mut self, var: Var) {
        self.frozen[var] = true;
    }

    /// Makes every variable flippable again.
    pub fn thaw_all(&mut self) {
        self.frozen.fill(false);
    }

    /// Copies the best assignment into the current one for every variable
    /// that is not frozen.
    ///
    /// Frozen variables keep the values imposed by the tree path.
    pub fn seed_from_best(&mut self) {
        for index in 0..self.values.len() {
            if !self.frozen[index] {
                self.values[index] = self.best[index];
            }
        }
    }

    /// Records the current assignment as the best one.
    pub fn save_best(&mut self) {
        self.best.copy_from_slice(&self.values);
    }

    /// Replaces the best assignment with uniformly random values.
    pub fn randomize_best(&mut self, rng: &mut impl Rng) {
        for value in self.best.iter_mut() {
            *value = rng.gen();
        }
    }

    /// The best assignment recorded so far.
    pub fn best(&self) -> &VecMap<Var, bool> {
        &self.best
    }
}

impl Resize for Assignment {
    fn resize(&mut self, var_count: usize) {
        self.values.resize(var_count, false);
        self.best.resize(var_count, false);
        self.frozen.resize(var_count, false);
    }
}
