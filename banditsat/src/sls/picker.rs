//! Flip-variable selection strategies.
//!
//! All three strategies share one contract: given the current search state,
//! return the next free variable to flip or report that none can be
//! produced. They only ever see falsified live clauses, which always contain
//! at least one free literal, so the fallback outcomes are defensive.
use rand::{rngs::SmallRng, seq::SliceRandom, Rng};

use crate::{
    assignment::Assignment,
    formula::Formula,
    lit::{Lit, Var},
    sls::state::SlsState,
};

/// Outcome of asking a picker for the next variable to flip.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PickResult {
    /// Flip this variable next.
    Flip(Var),
    /// The picker could not produce a free variable; the playout ends.
    Stuck,
}

/// Flip-variable selection strategy.
///
/// Each variant carries its noise parameter, a probability in `[0, 1)`.
#[derive(Copy, Clone, Debug)]
pub enum Picker {
    /// Configuration-checking selection: among free variables of falsified
    /// clauses whose configuration changed, flip one of maximum score.
    Ccls {
        /// Probability of a purely random flip from a random falsified
        /// clause.
        noise: f64,
    },
    /// WalkSAT: flip a minimum-breakcount literal of a random falsified
    /// clause.
    WalkSat {
        /// Probability of a random walk step when the best flip would break
        /// clauses.
        noise: f64,
    },
    /// Novelty: flip the best literal of a random falsified clause unless it
    /// is the most recently flipped one.
    Novelty {
        /// Probability of flipping the second best literal when the best is
        /// the most recently flipped.
        noise: f64,
    },
}

impl Picker {
    /// Whether a playout that leaves no falsified live clause closes the
    /// enclosing tree arm.
    ///
    /// The WalkSAT and Novelty strategies close: from their point of view
    /// nothing behind the frozen prefix is left to decide. CCLS treats it as
    /// a perfect playout and keeps the subtree open.
    pub fn closes_on_satisfied(&self) -> bool {
        !matches!(self, Picker::Ccls { .. })
    }

    /// Display name of the strategy.
    pub fn name(&self) -> &'static str {
        match self {
            Picker::Ccls { .. } => "CCLS",
            Picker::WalkSat { .. } => "WalkSAT",
            Picker::Novelty { .. } => "Novelty",
        }
    }

    /// Selects the next variable to flip.
    ///
    /// Requires at least one falsified live clause. `candidates` is scratch
    /// space reused across calls.
    pub fn pick(
        &self,
        formula: &Formula,
        asg: &Assignment,
        state: &SlsState,
        candidates: &mut Vec<Var>,
        rng: &mut SmallRng,
    ) -> PickResult {
        debug_assert!(!state.unsat_clauses().is_empty());
        match *self {
            Picker::Ccls { noise } => pick_ccls(formula, asg, state, noise, candidates, rng),
            Picker::WalkSat { noise } => pick_walksat(formula, asg, state, noise, candidates, rng),
            Picker::Novelty { noise } => pick_novelty(formula, asg, state, noise, rng),
        }
    }
}

/// Number of clauses a flip of `var` would newly falsify.
///
/// These are the live clauses in which `var`'s currently true literal is the
/// only satisfied one.
fn break_count(formula: &Formula, asg: &Assignment, state: &SlsState, var: Var) -> u32 {
    let true_lit = Lit::from_var(var, asg.value(var));
    formula
        .clauses_with(true_lit)
        .iter()
        .filter(|&&clause| state.is_live(clause) && state.sat_count(clause) == 1)
        .count() as u32
}

/// Number of clauses a flip of `var` would newly satisfy.
fn make_count(formula: &Formula, asg: &Assignment, state: &SlsState, var: Var) -> u32 {
    let false_lit = Lit::from_var(var, !asg.value(var));
    formula
        .clauses_with(false_lit)
        .iter()
        .filter(|&&clause| state.is_live(clause) && state.sat_count(clause) == 0)
        .count() as u32
}

/// Collects the free variables of a clause.
fn free_vars(
    formula: &Formula,
    asg: &Assignment,
    clause: crate::formula::ClauseIdx,
    candidates: &mut Vec<Var>,
) {
    candidates.clear();
    for &lit in formula.lits(clause) {
        if !asg.is_frozen(lit.var()) {
            candidates.push(lit.var());
        }
    }
}

fn pick_ccls(
    formula: &Formula,
    asg: &Assignment,
    state: &SlsState,
    noise: f64,
    candidates: &mut Vec<Var>,
    rng: &mut SmallRng,
) -> PickResult {
    if rng.gen::<f64>() < noise {
        let &clause = state.unsat_clauses().choose(rng).unwrap();
        free_vars(formula, asg, clause, candidates);
        return match candidates.choose(rng) {
            Some(&var) => PickResult::Flip(var),
            None => PickResult::Stuck,
        };
    }

    // Among free variables of falsified clauses whose configuration changed,
    // collect the maximum-score ones.
    candidates.clear();
    let mut best_score = i64::MIN;
    for &var in state.unsat_vars() {
        if !state.conf_change(var) {
            continue;
        }
        let score = state.score(var);
        if score >= best_score {
            if score > best_score {
                best_score = score;
                candidates.clear();
            }
            candidates.push(var);
        }
    }
    if let Some(&var) = candidates.choose(rng) {
        return PickResult::Flip(var);
    }

    // All candidates are configuration-suppressed: fall back to a random
    // free variable of a random falsified clause.
    let &clause = state.unsat_clauses().choose(rng).unwrap();
    free_vars(formula, asg, clause, candidates);
    match candidates.choose(rng) {
        Some(&var) => PickResult::Flip(var),
        None => PickResult::Stuck,
    }
}

fn pick_walksat(
    formula: &Formula,
    asg: &Assignment,
    state: &SlsState,
    noise: f64,
    candidates: &mut Vec<Var>,
    rng: &mut SmallRng,
) -> PickResult {
    let &clause = state.unsat_clauses().choose(rng).unwrap();

    candidates.clear();
    let mut best_break = u32::MAX;
    for &lit in formula.lits(clause) {
        let var = lit.var();
        if asg.is_frozen(var) {
            continue;
        }
        let breaks = break_count(formula, asg, state, var);
        if breaks <= best_break {
            if breaks < best_break {
                best_break = breaks;
                candidates.clear();
            }
            candidates.push(var);
        }
    }
    if candidates.is_empty() {
        return PickResult::Stuck;
    }

    // Only a worsening best flip justifies a random walk step.
    if best_break > 0 && rng.gen::<f64>() < noise {
        free_vars(formula, asg, clause, candidates);
    }
    PickResult::Flip(*candidates.choose(rng).unwrap())
}

fn pick_novelty(
    formula: &Formula,
    asg: &Assignment,
    state: &SlsState,
    noise: f64,
    rng: &mut SmallRng,
) -> PickResult {
    let &clause = state.unsat_clauses().choose(rng).unwrap();

    let mut youngest: Option<Var> = None;
    let mut best: Option<(Var, i64)> = None;
    let mut second: Option<(Var, i64)> = None;

    for &lit in formula.lits(clause) {
        let var = lit.var();
        if asg.is_frozen(var) {
            continue;
        }
        let score = break_count(formula, asg, state, var) as i64
            - make_count(formula, asg, state, var) as i64;

        if youngest.map_or(true, |y| state.last_change(var) > state.last_change(y)) {
            youngest = Some(var);
        }

        // Track best and second best, ties going to the least recently
        // flipped variable.
        let beats = |(other, other_score): (Var, i64)| {
            score < other_score
                || (score == other_score
                    && state.last_change(var) < state.last_change(other))
        };
        if best.map_or(true, beats) {
            second = best;
            best = Some((var, score));
        } else if second.map_or(true, beats) {
            second = Some((var, score));
        }
    }

    let Some((best_var, _)) = best else {
        return PickResult::Stuck;
    };

    match second {
        // Reconsider the best pick only when it is the clause's most
        // recently flipped variable.
        Some((second_var, _)) if youngest == Some(best_var) => {
            if rng.gen::<f64>() < noise {
                PickResult::Flip(second_var)
            } else {
                PickResult::Flip(best_var)
            }
        }
        _ => PickResult::Flip(best_var),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::Resize;
    use anyhow::Result;
    use rand::SeedableRng;

    fn setup(input: &str) -> Result<(Formula, Assignment, SlsState)> {
        let formula = Formula::parse(input.as_bytes())?;
        let mut asg = Assignment::default();
        asg.resize(formula.var_count());
        let mut state = SlsState::default();
        state.resize(&formula);
        Ok((formula, asg, state))
    }

    #[test]
    fn ccls_prefers_maximum_score() -> Result<()> {
        // With all variables false, (1) and (1 2) are falsified; flipping
        // variable 1 satisfies both, so its score dominates.
        let (formula, mut asg, mut state) = setup("p cnf 2 3\n1 0\n1 2 0\n-2 0\n")?;
        state.rebuild(&formula, &mut asg);

        let picker = Picker::Ccls { noise: 0.0 };
        let mut candidates = vec![];
        let mut rng = SmallRng::seed_from_u64(1);
        for _ in 0..10 {
            let result = picker.pick(&formula, &asg, &state, &mut candidates, &mut rng);
            assert_eq!(result, PickResult::Flip(Var::from_dimacs(1)));
        }
        Ok(())
    }

    #[test]
    fn ccls_skips_frozen_vars_in_noise_branch() -> Result<()> {
        let (formula, mut asg, mut state) = setup("p cnf 2 1\n1 2 0\n")?;
        asg.freeze(Var::from_dimacs(1));
        asg.set(Var::from_dimacs(1), false);
        state.rebuild(&formula, &mut asg);

        let picker = Picker::Ccls { noise: 1.0 };
        let mut candidates = vec![];
        let mut rng = SmallRng::seed_from_u64(2);
        for _ in 0..10 {
            let result = picker.pick(&formula, &asg, &state, &mut candidates, &mut rng);
            assert_eq!(result, PickResult::Flip(Var::from_dimacs(2)));
        }
        Ok(())
    }

    #[test]
    fn walksat_takes_break_free_flip() -> Result<()> {
        // All variables start false. The only falsified clause is (1 2);
        // flipping 2 breaks nothing while flipping 1 breaks (-1).
        let (formula, mut asg, mut state) = setup("p cnf 2 2\n1 2 0\n-1 0\n")?;
        state.rebuild(&formula, &mut asg);

        let picker = Picker::WalkSat { noise: 0.0 };
        let mut candidates = vec![];
        let mut rng = SmallRng::seed_from_u64(3);
        for _ in 0..10 {
            let result = picker.pick(&formula, &asg, &state, &mut candidates, &mut rng);
            assert_eq!(result, PickResult::Flip(Var::from_dimacs(2)));
        }
        Ok(())
    }

    #[test]
    fn novelty_picks_highest_improvement() -> Result<()> {
        // Flipping 1 makes two clauses, flipping 2 makes one; neither breaks
        // anything, so variable 1 has the better (lower) score.
        let (formula, mut asg, mut state) = setup("p cnf 2 3\n1 2 0\n1 0\n-1 -2 0\n")?;
        state.rebuild(&formula, &mut asg);

        let picker = Picker::Novelty { noise: 0.0 };
        let mut candidates = vec![];
        let mut rng = SmallRng::seed_from_u64(4);
        for _ in 0..10 {
            let result = picker.pick(&formula, &asg, &state, &mut candidates, &mut rng);
            assert_eq!(result, PickResult::Flip(Var::from_dimacs(1)));
        }
        Ok(())
    }

    #[test]
    fn break_and_make_counts() -> Result<()> {
        let (formula, mut asg, mut state) = setup("p cnf 3 3\n1 2 0\n-1 3 0\n-1 0\n")?;
        state.rebuild(&formula, &mut asg);
        // All variables false: flipping 1 satisfies (1 2) and falsifies
        // nothing that is critically satisfied by -1... both (-1 3) and (-1)
        // are satisfied solely by -1, so it breaks those two.
        let var = Var::from_dimacs(1);
        assert_eq!(make_count(&formula, &asg, &state, var), 1);
        assert_eq!(break_count(&formula, &asg, &state, var), 2);
        Ok(())
    }
}
