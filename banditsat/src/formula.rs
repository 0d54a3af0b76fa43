//! Immutable formula store.
//!
//! Built once per process from a DIMACS CNF or WCNF file and never mutated
//! afterwards. Clause literals are stored in one flat buffer, with
//! per-literal occurrence lists and a per-variable neighbor relation built
//! after all clauses are added.
use std::io::{self, Read, Write};

use crate::{
    dimacs::cnf::{FormulaKind, ParseError, Parser},
    lit::{Lit, Var},
    vec_map::{VecMap, VecMapIndex},
};

/// Index of a clause in a [`Formula`].
///
/// Wrapper around `u32` for better type safety.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ClauseIdx(pub u32);

impl std::fmt::Debug for ClauseIdx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.0, f)
    }
}

impl VecMapIndex for ClauseIdx {
    #[inline(always)]
    fn vec_map_index(&self) -> usize {
        self.0 as usize
    }
}

/// Location of a clause's literals in the flat literal buffer.
#[derive(Copy, Clone)]
struct ClauseRange {
    start: u32,
    len: u32,
}

/// Immutable post-load representation of a formula.
pub struct Formula {
    var_count: usize,
    weighted: bool,
    lit_data: Vec<Lit>,
    ranges: VecMap<ClauseIdx, ClauseRange>,
    weights: VecMap<ClauseIdx, u64>,
    total_weight: u64,
    dropped_tautologies: usize,
    /// For every literal, the clauses containing it.
    occurrences: VecMap<Lit, Vec<ClauseIdx>>,
    /// For every variable, the other variables sharing a clause with it.
    neighbors: VecMap<Var, Vec<Var>>,
}

impl Formula {
    /// Reads a formula from DIMACS CNF or WCNF input.
    pub fn parse(read: impl Read) -> Result<Formula, ParseError> {
        let mut parser = Parser::from_read(read);
        let header = parser.header()?;
        let mut builder = FormulaBuilder::new(
            header.var_count,
            header.kind == FormulaKind::Wcnf,
        );
        while let Some(clause) = parser.next_clause()? {
            builder.add_clause(clause.lits, clause.weight);
        }
        Ok(builder.finish())
    }

    /// Starts building a formula with a known variable count.
    pub fn builder(var_count: usize, weighted: bool) -> FormulaBuilder {
        FormulaBuilder::new(var_count, weighted)
    }

    /// Number of variables of the formula.
    pub fn var_count(&self) -> usize {
        self.var_count
    }

    /// Number of stored clauses.
    ///
    /// Tautological input clauses are not stored and not counted.
    pub fn clause_count(&self) -> usize {
        self.ranges.len()
    }

    /// Whether the formula came from a weighted (WCNF) input.
    pub fn is_weighted(&self) -> bool {
        self.weighted
    }

    /// Iterates over all variables of the formula.
    pub fn vars(&self) -> impl Iterator<Item = Var> {
        (0..self.var_count).map(Var::from_index)
    }

    /// Iterates over all clause indices of the formula.
    pub fn clauses(&self) -> impl Iterator<Item = ClauseIdx> {
        (0..self.ranges.len() as u32).map(ClauseIdx)
    }

    /// The literals of a clause.
    pub fn lits(&self, clause: ClauseIdx) -> &[Lit] {
        let range = self.ranges[clause];
        &self.lit_data[range.start as usize..][..range.len as usize]
    }

    /// The weight of a clause.
    ///
    /// Always 1 for unweighted formulas.
    pub fn weight(&self, clause: ClauseIdx) -> u64 {
        self.weights[clause]
    }

    /// The sum of all stored clause weights.
    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    /// Number of input clauses dropped because they contained a literal and
    /// its negation.
    pub fn dropped_tautologies(&self) -> usize {
        self.dropped_tautologies
    }

    /// The clauses containing the given literal.
    pub fn clauses_with(&self, lit: Lit) -> &[ClauseIdx] {
        &self.occurrences[lit]
    }

    /// The variables sharing at least one clause with the given variable.
    ///
    /// The variable itself is excluded.
    pub fn neighbors(&self, var: Var) -> &[Var] {
        &self.neighbors[var]
    }

    /// Shortest and longest clause length, or `None` for an empty formula.
    pub fn clause_len_bounds(&self) -> Option<(usize, usize)> {
        let mut bounds = None;
        for range in &self.ranges {
            let len = range.len as usize;
            let (min, max) = bounds.get_or_insert((len, len));
            *min = len.min(*min);
            *max = len.max(*max);
        }
        bounds
    }

    /// Total weight of the clauses falsified by a complete assignment.
    ///
    /// Computed by brute force; used for verification and final reporting,
    /// not on the search's hot path.
    pub fn unsat_weight(&self, values: &VecMap<Var, bool>) -> u64 {
        self.clauses()
            .filter(|&clause| {
                !self
                    .lits(clause)
                    .iter()
                    .any(|&lit| values[lit.var()] == lit.is_positive())
            })
            .map(|clause| self.weight(clause))
            .sum()
    }

    /// Serializes the formula back to DIMACS.
    ///
    /// Weighted formulas are written as WCNF with per-clause weights.
    pub fn write_dimacs(&self, mut target: impl Write) -> io::Result<()> {
        if self.weighted {
            writeln!(target, "p wcnf {} {}", self.var_count, self.clause_count())?;
        } else {
            writeln!(target, "p cnf {} {}", self.var_count, self.clause_count())?;
        }
        for clause in self.clauses() {
            if self.weighted {
                write!(target, "{} ", self.weight(clause))?;
            }
            for &lit in self.lits(clause) {
                write!(target, "{} ", lit)?;
            }
            writeln!(target, "0")?;
        }
        Ok(())
    }
}

/// Incrementally constructs a [`Formula`].
pub struct FormulaBuilder {
    var_count: usize,
    weighted: bool,
    lit_data: Vec<Lit>,
    ranges: VecMap<ClauseIdx, ClauseRange>,
    weights: VecMap<ClauseIdx, u64>,
    total_weight: u64,
    dropped_tautologies: usize,
}

impl FormulaBuilder {
    fn new(var_count: usize, weighted: bool) -> Self {
        FormulaBuilder {
            var_count,
            weighted,
            lit_data: vec![],
            ranges: VecMap::default(),
            weights: VecMap::default(),
            total_weight: 0,
            dropped_tautologies: 0,
        }
    }

    /// Adds a clause.
    ///
    /// Duplicate literals are dropped. A clause containing a literal and its
    /// negation is dropped entirely and only counted in
    /// [`Formula::dropped_tautologies`].
    pub fn add_clause(&mut self, lits: &[Lit], weight: u64) {
        let start = self.lit_data.len();
        for (position, &lit) in lits.iter().enumerate() {
            let earlier = &lits[..position];
            if earlier.contains(&!lit) {
                self.lit_data.truncate(start);
                self.dropped_tautologies += 1;
                return;
            }
            if !earlier.contains(&lit) {
                self.lit_data.push(lit);
            }
        }
        self.ranges.push(ClauseRange {
            start: start as u32,
            len: (self.lit_data.len() - start) as u32,
        });
        self.weights.push(weight);
        self.total_weight += weight;
    }

    /// Finishes the formula, building the occurrence lists and the neighbor
    /// relation.
    pub fn finish(self) -> Formula {
        let mut formula = Formula {
            var_count: self.var_count,
            weighted: self.weighted,
            lit_data: self.lit_data,
            ranges: self.ranges,
            weights: self.weights,
            total_weight: self.total_weight,
            dropped_tautologies: self.dropped_tautologies,
            occurrences: vec![vec![]; self.var_count * 2].into(),
            neighbors: vec![vec![]; self.var_count].into(),
        };

        for clause in formula.clauses() {
            let range = formula.ranges[clause];
            for position in 0..range.len {
                let lit = formula.lit_data[(range.start + position) as usize];
                formula.occurrences[lit].push(clause);
            }
        }

        // Collect each variable's neighbors, deduplicated with a transient
        // flag array.
        let mut seen: VecMap<Var, bool> = vec![false; formula.var_count].into();
        for var in formula.vars() {
            seen[var] = true;
            let mut neighbors = std::mem::take(&mut formula.neighbors[var]);
            for positive in [false, true] {
                for &clause in formula.clauses_with(Lit::from_var(var, positive)) {
                    for &lit in formula.lits(clause) {
                        if !std::mem::replace(&mut seen[lit.var()], true) {
                            neighbors.push(lit.var());
                        }
                    }
                }
            }
            seen[var] = false;
            for &neighbor in &neighbors {
                seen[neighbor] = false;
            }
            formula.neighbors[var] = neighbors;
        }

        formula
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn lits(dimacs: &[isize]) -> Vec<Lit> {
        dimacs.iter().map(|&n| Lit::from_dimacs(n)).collect()
    }

    fn formula(input: &str) -> Result<Formula> {
        Ok(Formula::parse(input.as_bytes())?)
    }

    #[test]
    fn duplicate_literals_are_dropped() -> Result<()> {
        let formula = formula("p cnf 2 1\n1 1 -2 1 0\n")?;
        assert_eq!(formula.clause_count(), 1);
        assert_eq!(formula.lits(ClauseIdx(0)), lits(&[1, -2]));
        Ok(())
    }

    #[test]
    fn tautologies_are_dropped_entirely() -> Result<()> {
        let formula = formula("p cnf 2 2\n1 -1 2 0\n-2 0\n")?;
        assert_eq!(formula.clause_count(), 1);
        assert_eq!(formula.dropped_tautologies(), 1);
        assert_eq!(formula.lits(ClauseIdx(0)), lits(&[-2]));
        Ok(())
    }

    #[test]
    fn occurrence_lists() -> Result<()> {
        let formula = formula("p cnf 3 3\n1 2 0\n-1 3 0\n1 -3 0\n")?;
        assert_eq!(
            formula.clauses_with(Lit::from_dimacs(1)),
            &[ClauseIdx(0), ClauseIdx(2)]
        );
        assert_eq!(formula.clauses_with(Lit::from_dimacs(-1)), &[ClauseIdx(1)]);
        assert_eq!(formula.clauses_with(Lit::from_dimacs(-2)), &[]);
        Ok(())
    }

    #[test]
    fn neighbor_relation_excludes_self_and_dedups() -> Result<()> {
        let formula = formula("p cnf 4 3\n1 2 0\n-1 2 3 0\n4 0\n")?;
        let mut neighbors = formula.neighbors(Var::from_dimacs(1)).to_vec();
        neighbors.sort();
        assert_eq!(neighbors, vec![Var::from_dimacs(2), Var::from_dimacs(3)]);
        assert_eq!(formula.neighbors(Var::from_dimacs(4)), &[]);
        Ok(())
    }

    #[test]
    fn weights_and_total() -> Result<()> {
        let formula = formula("p wcnf 1 2\n5 1 0\n3 -1 0\n")?;
        assert!(formula.is_weighted());
        assert_eq!(formula.weight(ClauseIdx(0)), 5);
        assert_eq!(formula.weight(ClauseIdx(1)), 3);
        assert_eq!(formula.total_weight(), 8);
        Ok(())
    }

    #[test]
    fn brute_force_unsat_weight() -> Result<()> {
        let formula = formula("p wcnf 2 3\n5 1 0\n3 -1 0\n2 -1 -2 0\n")?;
        let values: VecMap<Var, bool> = vec![true, true].into();
        assert_eq!(formula.unsat_weight(&values), 5);
        let values: VecMap<Var, bool> = vec![false, true].into();
        assert_eq!(formula.unsat_weight(&values), 3);
        Ok(())
    }

    #[test]
    fn dimacs_round_trip() -> Result<()> {
        for input in [
            "p cnf 3 2\n1 2 -3 0\n-1 3 0\n",
            "p wcnf 2 2\n5 1 0\n3 -1 2 0\n",
        ] {
            let first = formula(input)?;
            let mut written = vec![];
            first.write_dimacs(&mut written)?;
            let second = Formula::parse(written.as_slice())?;
            assert_eq!(first.var_count(), second.var_count());
            assert_eq!(first.clause_count(), second.clause_count());
            for clause in first.clauses() {
                assert_eq!(first.lits(clause), second.lits(clause));
                assert_eq!(first.weight(clause), second.weight(clause));
            }
        }
        Ok(())
    }

    #[test]
    fn clause_len_bounds() -> Result<()> {
        assert_eq!(formula("p cnf 0 0\n")?.clause_len_bounds(), None);
        assert_eq!(
            formula("p cnf 3 2\n1 2 -3 0\n-1 0\n")?.clause_len_bounds(),
            Some((1, 3))
        );
        Ok(())
    }
}
