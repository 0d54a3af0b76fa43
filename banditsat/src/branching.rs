//! Selection of the next variable to fix in the tree.
//!
//! Counts literal occurrences over the live clauses and picks a free
//! variable of maximum count, breaking ties uniformly at random.
use rand::{rngs::SmallRng, seq::SliceRandom};

use crate::{
    assignment::Assignment,
    formula::Formula,
    lit::Var,
    sls::state::SlsState,
    tracking::Resize,
    vec_map::VecMap,
};

/// Reusable buffers for branching-atom selection.
#[derive(Default)]
pub struct Branching {
    counts: VecMap<Var, u32>,
    best: Vec<Var>,
}

impl Resize for Branching {
    fn resize(&mut self, var_count: usize) {
        self.counts.resize(var_count, 0);
    }
}

impl Branching {
    /// Picks the most constrained free variable.
    ///
    /// Returns `None` when no free variable occurs in any live clause, which
    /// means the frozen prefix decides the remaining formula.
    pub fn pick(
        &mut self,
        formula: &Formula,
        asg: &Assignment,
        state: &SlsState,
        rng: &mut SmallRng,
    ) -> Option<Var> {
        self.counts.fill(0);
        for clause in formula.clauses() {
            if !state.is_live(clause) {
                continue;
            }
            for &lit in formula.lits(clause) {
                self.counts[lit.var()] += 1;
            }
        }

        self.best.clear();
        let mut best_count = 0;
        for var in formula.vars() {
            if asg.is_frozen(var) {
                continue;
            }
            let count = self.counts[var];
            if count > best_count {
                best_count = count;
                self.best.clear();
                self.best.push(var);
            } else if count == best_count && count > 0 {
                self.best.push(var);
            }
        }
        self.best.choose(rng).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn setup(input: &str) -> Result<(Formula, Assignment, SlsState, Branching)> {
        let formula = Formula::parse(input.as_bytes())?;
        let mut asg = Assignment::default();
        asg.resize(formula.var_count());
        let mut state = SlsState::default();
        state.resize(&formula);
        let mut branching = Branching::default();
        branching.resize(formula.var_count());
        Ok((formula, asg, state, branching))
    }

    #[test]
    fn picks_most_frequent_free_var() -> Result<()> {
        let (formula, mut asg, mut state, mut branching) =
            setup("p cnf 3 3\n1 2 0\n1 3 0\n-1 2 0\n")?;
        state.rebuild(&formula, &mut asg);
        let mut rng = SmallRng::seed_from_u64(0);
        assert_eq!(
            branching.pick(&formula, &asg, &state, &mut rng),
            Some(Var::from_dimacs(1))
        );
        Ok(())
    }

    #[test]
    fn frozen_vars_are_not_picked() -> Result<()> {
        let (formula, mut asg, mut state, mut branching) =
            setup("p cnf 2 2\n1 2 0\n1 -2 0\n")?;
        asg.freeze(Var::from_dimacs(1));
        asg.set(Var::from_dimacs(1), false);
        state.rebuild(&formula, &mut asg);
        let mut rng = SmallRng::seed_from_u64(0);
        assert_eq!(
            branching.pick(&formula, &asg, &state, &mut rng),
            Some(Var::from_dimacs(2))
        );
        Ok(())
    }

    #[test]
    fn returns_none_when_prefix_decides_everything() -> Result<()> {
        let (formula, mut asg, mut state, mut branching) = setup("p cnf 2 1\n1 2 0\n")?;
        asg.freeze(Var::from_dimacs(1));
        asg.set(Var::from_dimacs(1), true);
        state.rebuild(&formula, &mut asg);
        let mut rng = SmallRng::seed_from_u64(0);
        assert_eq!(branching.pick(&formula, &asg, &state, &mut rng), None);
        Ok(())
    }

    #[test]
    fn ties_are_broken_randomly() -> Result<()> {
        let (formula, mut asg, mut state, mut branching) =
            setup("p cnf 2 2\n1 2 0\n-1 -2 0\n")?;
        state.rebuild(&formula, &mut asg);
        let mut rng = SmallRng::seed_from_u64(42);
        let mut seen = HashSet::new();
        for _ in 0..64 {
            seen.insert(branching.pick(&formula, &asg, &state, &mut rng).unwrap());
        }
        assert_eq!(seen.len(), 2);
        Ok(())
    }
}
