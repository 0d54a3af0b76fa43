//! Incremental bookkeeping for local search under a frozen-variable prefix.
//!
//! Rebuilt at the start of every playout: clauses forced true by the frozen
//! prefix are taken out of play, clauses falsified by it contribute a
//! constant weight, and only the remaining live clauses are tracked
//! incrementally while free variables flip.
use crate::{
    assignment::Assignment,
    formula::{ClauseIdx, Formula},
    lit::{Lit, Var},
    vec_map::VecMap,
};

/// Incremental local search state.
///
/// Outside of a single [`flip`][SlsState::flip] the following hold for every
/// live (non pre-sat) clause `c` and every free variable `v`:
///
/// - `sat_count[c]` is the number of literals of `c` that are true under the
///   current assignment, and `sat_var[c]` names the satisfying variable when
///   there is exactly one.
/// - `c` is on the unsat stack iff `sat_count[c] == 0`.
/// - `unsat_app[v]` is the number of live clauses with `sat_count == 0` that
///   mention `v`, and `v` is on the unsat-variable stack iff it is positive.
/// - `score[v]` is the decrease in falsified weight that flipping `v` would
///   produce.
#[derive(Default)]
pub struct SlsState {
    sat_count: VecMap<ClauseIdx, u32>,
    /// The satisfying variable of a clause with `sat_count == 1`.
    ///
    /// Unspecified for other sat counts.
    sat_var: VecMap<ClauseIdx, u32>,
    pre_sat: VecMap<ClauseIdx, bool>,

    unsat: Vec<ClauseIdx>,
    unsat_pos: VecMap<ClauseIdx, u32>,

    unsat_vars: Vec<Var>,
    unsat_var_pos: VecMap<Var, u32>,
    unsat_app: VecMap<Var, u32>,

    score: VecMap<Var, i64>,
    conf_change: VecMap<Var, bool>,
    last_change: VecMap<Var, u64>,
    step: u64,

    unsat_weight: u64,
    pre_falsified_weight: u64,
}

impl SlsState {
    /// Sizes the per-variable and per-clause storage for a formula.
    pub fn resize(&mut self, formula: &Formula) {
        let vars = formula.var_count();
        let clauses = formula.clause_count();
        self.sat_count.resize(clauses, 0);
        self.sat_var.resize(clauses, 0);
        self.pre_sat.resize(clauses, false);
        self.unsat_pos.resize(clauses, 0);
        self.unsat_var_pos.resize(vars, 0);
        self.unsat_app.resize(vars, 0);
        self.score.resize(vars, 0);
        self.conf_change.resize(vars, false);
        self.last_change.resize(vars, 0);
    }

    /// Rebuilds the state for a playout.
    ///
    /// Seeds the current assignment from the best one (frozen variables keep
    /// their path values), classifies every clause against the frozen prefix
    /// and recomputes all incremental data.
    ///
    /// Returns `true` when no live clause remains, i.e. the frozen prefix
    /// already decides the whole formula.
    pub fn rebuild(&mut self, formula: &Formula, asg: &mut Assignment) -> bool {
        asg.seed_from_best();

        self.unsat.clear();
        self.unsat_vars.clear();
        self.unsat_weight = 0;
        self.pre_falsified_weight = 0;
        self.step = 1;

        for var in formula.vars() {
            self.unsat_app[var] = 0;
            self.last_change[var] = 0;
            if !asg.is_frozen(var) {
                self.conf_change[var] = true;
            }
        }

        let mut closed = true;
        for clause in formula.clauses() {
            self.sat_count[clause] = 0;
            let mut any_free = false;
            let mut frozen_true = false;
            for &lit in formula.lits(clause) {
                if !asg.is_frozen(lit.var()) {
                    any_free = true;
                    if asg.is_true(lit) {
                        self.sat_count[clause] += 1;
                        self.sat_var[clause] = lit.index() as u32;
                    }
                } else if asg.is_true(lit) {
                    frozen_true = true;
                    break;
                }
            }

            if frozen_true {
                self.pre_sat[clause] = true;
            } else if !any_free {
                // Every literal is frozen and false: the prefix falsifies
                // the clause for the whole playout.
                self.pre_sat[clause] = true;
                self.pre_falsified_weight += formula.weight(clause);
            } else {
                self.pre_sat[clause] = false;
                closed = false;
                if self.sat_count[clause] == 0 {
                    self.make_unsat(formula, asg, clause);
                }
            }
        }

        for var in formula.vars() {
            self.score[var] = 0;
            if asg.is_frozen(var) {
                continue;
            }
            let mut score = 0i64;
            for positive in [false, true] {
                let lit = Lit::from_var(var, positive);
                for &clause in formula.clauses_with(lit) {
                    if self.pre_sat[clause] {
                        continue;
                    }
                    let weight = formula.weight(clause) as i64;
                    if self.sat_count[clause] == 0 {
                        score += weight;
                    } else if self.sat_count[clause] == 1 && asg.is_true(lit) {
                        score -= weight;
                    }
                }
            }
            self.score[var] = score;
        }

        closed
    }

    /// Flips a variable and updates all incremental data.
    ///
    /// Must only be called for variables that are not frozen.
    pub fn flip(&mut self, formula: &Formula, asg: &mut Assignment, var: Var) {
        debug_assert!(!asg.is_frozen(var));
        asg.flip(var);
        let now_true = Lit::from_var(var, asg.value(var));

        for &clause in formula.clauses_with(now_true) {
            if self.pre_sat[clause] {
                continue;
            }
            let weight = formula.weight(clause) as i64;
            self.sat_count[clause] += 1;
            match self.sat_count[clause] {
                1 => {
                    // The flipped variable becomes the sole satisfier and is
                    // debited once more than the rest of the clause.
                    self.sat_var[clause] = var.index() as u32;
                    self.score[var] -= weight;
                    for &lit in formula.lits(clause) {
                        self.score[lit.var()] -= weight;
                    }
                    self.make_sat(formula, asg, clause);
                }
                2 => {
                    let satisfier = self.sat_var[clause] as usize;
                    self.score[satisfier] += weight;
                }
                _ => {}
            }
        }

        for &clause in formula.clauses_with(!now_true) {
            if self.pre_sat[clause] {
                continue;
            }
            let weight = formula.weight(clause) as i64;
            self.sat_count[clause] -= 1;
            match self.sat_count[clause] {
                0 => {
                    for &lit in formula.lits(clause) {
                        self.score[lit.var()] += weight;
                    }
                    self.score[var] += weight;
                    self.make_unsat(formula, asg, clause);
                }
                1 => {
                    for &lit in formula.lits(clause) {
                        if asg.is_true(lit) {
                            self.score[lit.var()] -= weight;
                            self.sat_var[clause] = lit.index() as u32;
                            break;
                        }
                    }
                }
                _ => {}
            }
        }

        for &neighbor in formula.neighbors(var) {
            self.conf_change[neighbor] = true;
        }
        self.conf_change[var] = false;
        self.last_change[var] = self.step;
        self.step += 1;
    }

    /// Puts a clause on the unsat stack.
    fn make_unsat(&mut self, formula: &Formula, asg: &Assignment, clause: ClauseIdx) {
        self.unsat_pos[clause] = self.unsat.len() as u32;
        self.unsat.push(clause);
        self.unsat_weight += formula.weight(clause);

        for &lit in formula.lits(clause) {
            let var = lit.var();
            if asg.is_frozen(var) {
                continue;
            }
            self.unsat_app[var] += 1;
            if self.unsat_app[var] == 1 {
                self.unsat_var_pos[var] = self.unsat_vars.len() as u32;
                self.unsat_vars.push(var);
            }
        }
    }

    /// Removes a clause from the unsat stack by swapping in the topmost one.
    fn make_sat(&mut self, formula: &Formula, asg: &Assignment, clause: ClauseIdx) {
        let position = self.unsat_pos[clause] as usize;
        let last = self.unsat.pop().unwrap();
        if last != clause {
            self.unsat[position] = last;
            self.unsat_pos[last] = position as u32;
        }
        self.unsat_weight -= formula.weight(clause);

        for &lit in formula.lits(clause) {
            let var = lit.var();
            if asg.is_frozen(var) {
                continue;
            }
            self.unsat_app[var] -= 1;
            if self.unsat_app[var] == 0 {
                let position = self.unsat_var_pos[var] as usize;
                let last = self.unsat_vars.pop().unwrap();
                if last != var {
                    self.unsat_vars[position] = last;
                    self.unsat_var_pos[last] = position as u32;
                }
            }
        }
    }

    /// Total weight of the currently falsified live clauses.
    #[inline(always)]
    pub fn unsat_weight(&self) -> u64 {
        self.unsat_weight
    }

    /// Weight of the clauses falsified by the frozen prefix itself.
    #[inline(always)]
    pub fn pre_falsified_weight(&self) -> u64 {
        self.pre_falsified_weight
    }

    /// Total falsified weight of the current assignment, including the
    /// prefix-falsified constant.
    #[inline(always)]
    pub fn total_unsat_weight(&self) -> u64 {
        self.unsat_weight + self.pre_falsified_weight
    }

    /// Whether the clause's truth value is still undetermined by the prefix.
    #[inline(always)]
    pub fn is_live(&self, clause: ClauseIdx) -> bool {
        !self.pre_sat[clause]
    }

    /// Number of literals of the clause that are currently true.
    #[inline(always)]
    pub fn sat_count(&self, clause: ClauseIdx) -> u32 {
        self.sat_count[clause]
    }

    /// The currently falsified live clauses, in arbitrary order.
    #[inline(always)]
    pub fn unsat_clauses(&self) -> &[ClauseIdx] {
        &self.unsat
    }

    /// The free variables appearing in at least one falsified live clause.
    #[inline(always)]
    pub fn unsat_vars(&self) -> &[Var] {
        &self.unsat_vars
    }

    /// The score of a free variable.
    #[inline(always)]
    pub fn score(&self, var: Var) -> i64 {
        self.score[var]
    }

    /// Whether the variable's configuration changed since it was last
    /// flipped.
    #[inline(always)]
    pub fn conf_change(&self, var: Var) -> bool {
        self.conf_change[var]
    }

    /// The step at which the variable was last flipped, 0 if never.
    #[inline(always)]
    pub fn last_change(&self, var: Var) -> u64 {
        self.last_change[var]
    }

    /// Checks every documented invariant against a brute-force recompute.
    #[cfg(test)]
    pub fn assert_consistent(&self, formula: &Formula, asg: &Assignment) {
        let mut pre_falsified = 0;
        for clause in formula.clauses() {
            let frozen_true = formula
                .lits(clause)
                .iter()
                .any(|&lit| asg.is_frozen(lit.var()) && asg.is_true(lit));
            let any_free = formula
                .lits(clause)
                .iter()
                .any(|&lit| !asg.is_frozen(lit.var()));
            assert_eq!(
                self.pre_sat[clause],
                frozen_true || !any_free,
                "pre-sat flag of clause {clause:?}"
            );
            if !any_free && !frozen_true {
                pre_falsified += formula.weight(clause);
            }
            if self.pre_sat[clause] {
                continue;
            }

            let true_lits = formula
                .lits(clause)
                .iter()
                .filter(|&&lit| asg.is_true(lit))
                .count() as u32;
            assert_eq!(
                self.sat_count[clause], true_lits,
                "sat count of clause {clause:?}"
            );
            if true_lits == 1 {
                let satisfier = formula
                    .lits(clause)
                    .iter()
                    .find(|&&lit| asg.is_true(lit))
                    .unwrap()
                    .var();
                assert_eq!(self.sat_var[clause] as usize, satisfier.index());
            }

            let on_stack = self.unsat.contains(&clause);
            assert_eq!(on_stack, true_lits == 0, "stack membership of {clause:?}");
            if on_stack {
                assert_eq!(self.unsat[self.unsat_pos[clause] as usize], clause);
            }
        }
        assert_eq!(self.pre_falsified_weight, pre_falsified);

        let stack_weight: u64 = self.unsat.iter().map(|&c| formula.weight(c)).sum();
        assert_eq!(self.unsat_weight, stack_weight);

        for var in formula.vars() {
            if asg.is_frozen(var) {
                assert!(!self.unsat_vars.contains(&var));
                continue;
            }
            let appearances = formula
                .clauses()
                .filter(|&clause| {
                    self.is_live(clause)
                        && self.sat_count[clause] == 0
                        && formula.lits(clause).iter().any(|&lit| lit.var() == var)
                })
                .count() as u32;
            assert_eq!(self.unsat_app[var], appearances, "unsat count of {var:?}");
            let on_stack = self.unsat_vars.contains(&var);
            assert_eq!(on_stack, appearances > 0, "var stack membership of {var:?}");
            if on_stack {
                assert_eq!(self.unsat_vars[self.unsat_var_pos[var] as usize], var);
            }

            let mut score = 0i64;
            for clause in formula.clauses() {
                if !self.is_live(clause) {
                    continue;
                }
                let lits = formula.lits(clause);
                if !lits.iter().any(|&lit| lit.var() == var) {
                    continue;
                }
                let weight = formula.weight(clause) as i64;
                if self.sat_count[clause] == 0 {
                    score += weight;
                } else if self.sat_count[clause] == 1
                    && lits.iter().any(|&lit| lit.var() == var && asg.is_true(lit))
                {
                    score -= weight;
                }
            }
            assert_eq!(self.score[var], score, "score of {var:?}");
        }
    }
}
