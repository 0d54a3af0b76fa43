//! Bounded local search playouts.
//!
//! A playout estimates the value of a frozen-variable prefix: starting from
//! the best known assignment it performs a bounded number of flips over the
//! free variables and reports the best total falsified weight it observed.
use rand::rngs::SmallRng;

use crate::{
    assignment::Assignment,
    formula::Formula,
    lit::Var,
    sls::picker::{PickResult, Picker},
    sls::state::SlsState,
    stats::Stats,
};

pub mod picker;
pub mod state;

/// Result of one playout.
#[derive(Copy, Clone, Debug)]
pub struct PlayoutOutcome {
    /// Best total falsified weight observed, including the weight of the
    /// clauses the frozen prefix falsifies outright.
    pub best_unsat_weight: u64,
    /// Whether the subformula behind the frozen prefix is decided, so the
    /// enclosing tree arm can be closed.
    pub closed: bool,
}

/// Best assignment found since the start of the current run.
#[derive(Debug)]
pub struct Incumbent {
    /// Total falsified weight of the best assignment.
    pub unsat_weight: u64,
}

impl Default for Incumbent {
    fn default() -> Self {
        Incumbent {
            unsat_weight: u64::MAX,
        }
    }
}

impl Incumbent {
    /// Records the current assignment when it strictly improves on the best
    /// one.
    pub fn offer(&mut self, unsat_weight: u64, asg: &mut Assignment) {
        if unsat_weight < self.unsat_weight {
            self.unsat_weight = unsat_weight;
            asg.save_best();
            tracing::trace!(unsat_weight, "improved incumbent");
        }
    }
}

/// Bounded local search over the free variables.
pub struct Playout {
    max_flips: u64,
    picker: Picker,
    /// Scratch space for the pickers.
    candidates: Vec<Var>,
}

impl Playout {
    /// Creates a playout engine with a flip budget and a selection strategy.
    pub fn new(max_flips: u64, picker: Picker) -> Self {
        Playout {
            max_flips,
            picker,
            candidates: vec![],
        }
    }

    /// The configured selection strategy.
    pub fn picker(&self) -> Picker {
        self.picker
    }

    /// The configured flip budget.
    pub fn max_flips(&self) -> u64 {
        self.max_flips
    }

    /// Runs one playout on a freshly [rebuilt][SlsState::rebuild] state.
    pub fn run(
        &mut self,
        formula: &Formula,
        asg: &mut Assignment,
        state: &mut SlsState,
        incumbent: &mut Incumbent,
        rng: &mut SmallRng,
        stats: &mut Stats,
    ) -> PlayoutOutcome {
        stats.playouts += 1;

        let mut best = state.total_unsat_weight();
        incumbent.offer(best, asg);

        for _ in 0..self.max_flips {
            let weight = state.total_unsat_weight();
            if weight < best {
                best = weight;
                incumbent.offer(weight, asg);
            }
            if state.unsat_weight() == 0 {
                return PlayoutOutcome {
                    best_unsat_weight: best,
                    closed: self.picker.closes_on_satisfied(),
                };
            }

            match self
                .picker
                .pick(formula, asg, state, &mut self.candidates, rng)
            {
                PickResult::Flip(var) => {
                    state.flip(formula, asg, var);
                    stats.flips += 1;
                }
                PickResult::Stuck => break,
            }
        }

        let weight = state.total_unsat_weight();
        if weight < best {
            best = weight;
            incumbent.offer(weight, asg);
        }
        // Closure is only ever observed before a pick; a playout that runs
        // out of flips leaves the arm open.
        PlayoutOutcome {
            best_unsat_weight: best,
            closed: false,
        }
    }
}
