//! The run driver.
//!
//! Bundles the formula with every per-run component and performs independent
//! runs: each run seeds a random incumbent, grows a fresh tree and descends
//! it until the iteration budget, the deadline or full closure of the root
//! stops it.
use std::time::{Duration, Instant};

use rand::{rngs::SmallRng, SeedableRng};

use crate::{
    assignment::Assignment,
    branching::Branching,
    formula::Formula,
    lit::Var,
    sls::{picker::Picker, state::SlsState, Incumbent, Playout},
    stats::Stats,
    timeout::Deadline,
    tracking::Resize,
    tree::{DescentOps, Tree},
    vec_map::VecMap,
};

/// Local search strategy used for playouts.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SlsAlgorithm {
    /// Configuration-checking local search.
    Ccls,
    /// WalkSAT.
    WalkSat,
    /// Novelty.
    Novelty,
}

/// Solver configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of independent runs.
    pub runs: usize,
    /// Maximum tree descents per run.
    pub iterations: u64,
    /// UCB1 exploration constant.
    pub exploration: f64,
    /// Flip budget of each playout.
    pub max_flips: u64,
    /// Noise parameter of the playout strategy, in `[0, 1)`.
    pub noise: f64,
    /// Playout strategy.
    pub algorithm: SlsAlgorithm,
    /// Per-run wall clock limit, `None` for purely iteration-bounded runs.
    pub timeout: Option<Duration>,
    /// RNG seed; drawn from the system clock when absent.
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            runs: 10,
            iterations: 2000,
            exploration: 0.02,
            max_flips: 500,
            noise: 0.0,
            algorithm: SlsAlgorithm::Ccls,
            timeout: Some(Duration::from_secs(15)),
            seed: None,
        }
    }
}

/// Result of one run.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    /// Best reward of the run; the deadline snapshot for runs a deadline
    /// ended.
    pub best_reward: f64,
    /// Falsified-clause count derived from the best reward.
    pub num_unsat: u64,
    /// Number of tree descents performed.
    pub descents: u64,
    /// Wall clock duration of the run.
    pub duration: Duration,
}

/// An incomplete MaxSAT solver.
pub struct Solver {
    formula: Formula,
    config: Config,
    seed: u64,
    rng: SmallRng,
    asg: Assignment,
    state: SlsState,
    playout: Playout,
    branching: Branching,
    tree: Tree,
    incumbent: Incumbent,
    stats: Stats,
    /// Lowest falsified weight seen across all runs so far.
    best_weight: u64,
    /// The assignment achieving `best_weight`.
    best_values: VecMap<Var, bool>,
}

impl Solver {
    /// Creates a solver for a formula.
    pub fn new(formula: Formula, config: Config) -> Solver {
        let seed = config.seed.unwrap_or_else(|| {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|elapsed| elapsed.as_nanos() as u64)
                .unwrap_or(0)
        });
        tracing::debug!(seed, "seeding rng");

        let picker = match config.algorithm {
            SlsAlgorithm::Ccls => Picker::Ccls {
                noise: config.noise,
            },
            SlsAlgorithm::WalkSat => Picker::WalkSat {
                noise: config.noise,
            },
            SlsAlgorithm::Novelty => Picker::Novelty {
                noise: config.noise,
            },
        };

        let var_count = formula.var_count();
        let mut asg = Assignment::default();
        asg.resize(var_count);
        let mut state = SlsState::default();
        state.resize(&formula);
        let mut branching = Branching::default();
        branching.resize(var_count);
        let tree = Tree::new(config.exploration, var_count.saturating_sub(1));

        Solver {
            formula,
            rng: SmallRng::seed_from_u64(seed),
            seed,
            asg,
            state,
            playout: Playout::new(config.max_flips, picker),
            branching,
            tree,
            incumbent: Incumbent::default(),
            stats: Stats::default(),
            best_weight: u64::MAX,
            best_values: vec![false; var_count].into(),
            config,
        }
    }

    /// The formula being solved.
    pub fn formula(&self) -> &Formula {
        &self.formula
    }

    /// The configuration the solver was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The effective RNG seed.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// The playout strategy in use.
    pub fn picker(&self) -> Picker {
        self.playout.picker()
    }

    /// The best assignment found across all runs so far, with its falsified
    /// weight.
    pub fn best_solution(&self) -> Option<(u64, &VecMap<Var, bool>)> {
        (self.best_weight != u64::MAX).then_some((self.best_weight, &self.best_values))
    }

    /// Performs one independent run.
    pub fn run(&mut self) -> RunOutcome {
        let started = Instant::now();
        self.stats.runs += 1;

        self.asg.randomize_best(&mut self.rng);
        self.asg.thaw_all();
        self.incumbent = Incumbent::default();
        let mut best_reward = 0.0f64;

        // Classify the clauses with nothing frozen and pick the root's
        // branching atom.
        let decided = self.state.rebuild(&self.formula, &mut self.asg);
        let root_atom = if decided {
            None
        } else {
            self.branching
                .pick(&self.formula, &self.asg, &self.state, &mut self.rng)
        };

        let mut descents = 0;
        match root_atom {
            None => {
                // Nothing to branch on: the run is just the evaluation of
                // the seeded random assignment.
                self.incumbent
                    .offer(self.state.total_unsat_weight(), &mut self.asg);
                best_reward = self.reward_of(self.state.total_unsat_weight());
            }
            Some(atom) => {
                self.tree.reset(atom);
                let deadline = self.config.timeout.map(Deadline::start);

                for _ in 0..self.config.iterations {
                    if deadline.as_ref().map_or(false, Deadline::expired) {
                        break;
                    }
                    if self.tree.root_fully_closed() {
                        break;
                    }
                    self.asg.thaw_all();
                    self.tree.play(&mut DescentOps {
                        formula: &self.formula,
                        asg: &mut self.asg,
                        state: &mut self.state,
                        playout: &mut self.playout,
                        branching: &mut self.branching,
                        incumbent: &mut self.incumbent,
                        rng: &mut self.rng,
                        stats: &mut self.stats,
                        best_reward: &mut best_reward,
                        deadline: deadline.as_ref(),
                    });
                    descents += 1;
                }

                if let Some(deadline) = &deadline {
                    if deadline.expired() {
                        // Improvements made by the descent in flight when
                        // the deadline passed still count towards
                        // `best_reward`, but the run reports the snapshot.
                        best_reward = deadline.snapshot();
                    }
                }
            }
        }

        if self.incumbent.unsat_weight < self.best_weight {
            self.best_weight = self.incumbent.unsat_weight;
            self.best_values.copy_from_slice(self.asg.best());
            debug_assert_eq!(
                self.formula.unsat_weight(&self.best_values),
                self.best_weight
            );
        }

        let outcome = RunOutcome {
            best_reward,
            num_unsat: self.num_unsat(best_reward),
            descents,
            duration: started.elapsed(),
        };
        tracing::debug!(
            run = self.stats.runs,
            num_unsat = outcome.num_unsat,
            descents = outcome.descents,
            incumbent = self.incumbent.unsat_weight,
            "run finished"
        );
        outcome
    }

    /// Performs all configured runs.
    pub fn run_all(&mut self) -> Vec<RunOutcome> {
        (0..self.config.runs).map(|_| self.run()).collect()
    }

    /// The reward of a playout that left the given weight falsified.
    fn reward_of(&self, unsat_weight: u64) -> f64 {
        let clause_count = self.formula.clause_count() as f64;
        if clause_count == 0.0 {
            return 1.0;
        }
        ((clause_count - unsat_weight as f64) / clause_count).powi(2)
    }

    /// Inverts the reward definition back into a falsified-clause count.
    fn num_unsat(&self, reward: f64) -> u64 {
        let clause_count = self.formula.clause_count() as f64;
        (clause_count - clause_count * reward.sqrt()).round().max(0.0) as u64
    }
}
