//! Two-armed bandit search tree.
//!
//! Every node fixes one variable of the formula. Its left arm assigns
//! `false`, its right arm `true`; descending an arm freezes the variable for
//! all playouts below it. Arm values are backed up as running averages and
//! arms close once their subtree is exhausted.
use rand::{rngs::SmallRng, Rng};

use crate::{
    assignment::Assignment,
    branching::Branching,
    formula::Formula,
    lit::Var,
    sls::{state::SlsState, Incumbent, Playout},
    stats::Stats,
    timeout::Deadline,
};

/// The two decision arms of a node.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Arm {
    /// Assigns `false` to the node's variable.
    Left = 0,
    /// Assigns `true` to the node's variable.
    Right = 1,
}

impl Arm {
    const BOTH: [Arm; 2] = [Arm::Left, Arm::Right];

    #[inline(always)]
    fn index(self) -> usize {
        self as usize
    }

    /// The truth value this arm assigns to the branching variable.
    #[inline(always)]
    pub fn value(self) -> bool {
        self == Arm::Right
    }
}

/// Index of a node in the tree arena.
#[derive(Copy, Clone, PartialEq, Eq)]
#[repr(transparent)]
struct NodeId(u32);

impl std::fmt::Debug for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.0, f)
    }
}

/// A tree node.
///
/// `atom` is `None` only for a child allocated behind an already closed arm;
/// such a node is never descended into.
struct Node {
    /// Running-average reward of each arm.
    x: [f64; 2],
    /// Number of times each arm was played.
    n: [u32; 2],
    /// Whether each arm's subtree is exhausted.
    closed: [bool; 2],
    /// The variables the children will branch on.
    next_atom: [Option<Var>; 2],
    /// The variable this node branches on.
    atom: Option<Var>,
    /// Children, allocated on the first descent past this node.
    children: Option<[NodeId; 2]>,
}

impl Node {
    fn new(atom: Option<Var>) -> Node {
        Node {
            x: [0.0; 2],
            n: [0; 2],
            closed: [false; 2],
            next_atom: [None; 2],
            atom,
            children: None,
        }
    }

    /// Folds a new reward into the arm's running average.
    fn blend(&mut self, arm: Arm, reward: f64) {
        let arm = arm.index();
        self.x[arm] += (reward - self.x[arm]) / self.n[arm] as f64;
    }

    fn fully_closed(&self) -> bool {
        self.closed[0] && self.closed[1]
    }
}

/// Everything a tree descent needs besides the tree itself.
///
/// Borrows the solver's components for the duration of one descent.
pub struct DescentOps<'a> {
    /// The formula being solved.
    pub formula: &'a Formula,
    /// Current and best assignment plus the frozen mask.
    pub asg: &'a mut Assignment,
    /// Incremental local search state.
    pub state: &'a mut SlsState,
    /// The playout engine.
    pub playout: &'a mut Playout,
    /// Branching-atom selection buffers.
    pub branching: &'a mut Branching,
    /// Best assignment of the current run.
    pub incumbent: &'a mut Incumbent,
    /// The solver's random number generator.
    pub rng: &'a mut SmallRng,
    /// Counters.
    pub stats: &'a mut Stats,
    /// Best reward seen in the current run.
    pub best_reward: &'a mut f64,
    /// Deadline watcher of the current run, if any.
    pub deadline: Option<&'a Deadline>,
}

impl DescentOps<'_> {
    /// Estimates the value of the current frozen prefix with one playout.
    ///
    /// Returns the reward and the branching atom for the next depth, or
    /// `None` for the latter when the prefix decides the remaining formula.
    fn estimate(&mut self) -> (f64, Option<Var>) {
        let decided = self.state.rebuild(self.formula, self.asg);
        let outcome = self.playout.run(
            self.formula,
            self.asg,
            self.state,
            self.incumbent,
            self.rng,
            self.stats,
        );

        // The reward is the satisfied fraction of the clause count, squared
        // to sharpen the ranking between near-equal playouts.
        let clause_count = self.formula.clause_count() as f64;
        let reward = if clause_count == 0.0 {
            1.0
        } else {
            let satisfied = clause_count - outcome.best_unsat_weight as f64;
            (satisfied / clause_count).powi(2)
        };
        if reward > *self.best_reward {
            *self.best_reward = reward;
            if let Some(deadline) = self.deadline {
                deadline.record(reward);
            }
        }

        if decided || outcome.closed {
            return (reward, None);
        }
        let next = self
            .branching
            .pick(self.formula, self.asg, self.state, self.rng);
        (reward, next)
    }
}

/// Arena-allocated search tree.
pub struct Tree {
    nodes: Vec<Node>,
    /// UCB1 exploration constant.
    exploration: f64,
    /// Maximum node depth; arms of nodes at this depth close immediately.
    depth_limit: usize,
}

impl Tree {
    /// Creates an empty tree.
    pub fn new(exploration: f64, depth_limit: usize) -> Tree {
        Tree {
            nodes: vec![],
            exploration,
            depth_limit,
        }
    }

    /// Discards all nodes and installs a fresh root branching on `atom`.
    pub fn reset(&mut self, atom: Var) {
        self.nodes.clear();
        self.nodes.push(Node::new(Some(atom)));
    }

    /// Number of allocated nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether both arms of the root are closed.
    ///
    /// Also true for a tree without a root.
    pub fn root_fully_closed(&self) -> bool {
        self.nodes.first().map_or(true, Node::fully_closed)
    }

    /// Performs one descent from the root.
    ///
    /// The caller must have thawed all variables beforehand.
    pub fn play(&mut self, ops: &mut DescentOps) -> f64 {
        ops.stats.descents += 1;
        self.play_node(NodeId(0), 0, ops)
    }

    fn play_node(&mut self, id: NodeId, depth: usize, ops: &mut DescentOps) -> f64 {
        let Some(atom) = self.nodes[id.0 as usize].atom else {
            debug_assert!(false, "descended into an arm that was closed on arrival");
            return 0.0;
        };
        ops.asg.freeze(atom);

        // First visit: play both arms directly instead of recursing.
        if self.nodes[id.0 as usize].n[0] == 0 {
            self.nodes[id.0 as usize].n = [1, 1];
            for arm in Arm::BOTH {
                ops.asg.set(atom, arm.value());
                let (reward, next) = ops.estimate();
                let node = &mut self.nodes[id.0 as usize];
                node.x[arm.index()] = reward;
                match next {
                    None => node.closed[arm.index()] = true,
                    Some(var) => node.next_atom[arm.index()] = Some(var),
                }
            }
            let node = &mut self.nodes[id.0 as usize];
            if depth >= self.depth_limit {
                node.closed = [true, true];
            }
            return (node.x[0] + node.x[1]) / 2.0;
        }

        // Otherwise descend: into the one open arm if the other is closed,
        // else into the arm preferred by UCB1.
        let node = &self.nodes[id.0 as usize];
        let arm = if node.closed[Arm::Left.index()] {
            Arm::Right
        } else if node.closed[Arm::Right.index()] {
            Arm::Left
        } else {
            self.select_arm(id, ops.rng)
        };

        self.nodes[id.0 as usize].n[arm.index()] += 1;
        ops.asg.set(atom, arm.value());
        let child = self.ensure_children(id)[arm.index()];
        let reward = self.play_node(child, depth + 1, ops);
        self.nodes[id.0 as usize].blend(arm, reward);

        if self.nodes[child.0 as usize].fully_closed() {
            self.nodes[id.0 as usize].closed[arm.index()] = true;
        }
        reward
    }

    /// Picks the arm maximizing the UCB1 score, ties uniformly at random.
    fn select_arm(&self, id: NodeId, rng: &mut SmallRng) -> Arm {
        let node = &self.nodes[id.0 as usize];
        let total = (node.n[0] + node.n[1]) as f64;
        let score = |arm: usize| {
            node.x[arm] + self.exploration * (total.ln() / node.n[arm] as f64).sqrt()
        };
        let (left, right) = (score(0), score(1));
        if left == right {
            if rng.gen() {
                Arm::Right
            } else {
                Arm::Left
            }
        } else if right > left {
            Arm::Right
        } else {
            Arm::Left
        }
    }

    /// Returns the node's children, allocating the pair on first use.
    fn ensure_children(&mut self, id: NodeId) -> [NodeId; 2] {
        if let Some(children) = self.nodes[id.0 as usize].children {
            return children;
        }
        let next_atom = self.nodes[id.0 as usize].next_atom;
        let children = [self.push_node(next_atom[0]), self.push_node(next_atom[1])];
        self.nodes[id.0 as usize].children = Some(children);
        children
    }

    fn push_node(&mut self, atom: Option<Var>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(atom));
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::Resize;
    use anyhow::Result;
    use rand::SeedableRng;

    struct Fixture {
        formula: Formula,
        asg: Assignment,
        state: SlsState,
        playout: Playout,
        branching: Branching,
        incumbent: Incumbent,
        rng: SmallRng,
        stats: Stats,
        best_reward: f64,
    }

    impl Fixture {
        fn new(input: &str, seed: u64) -> Result<Fixture> {
            let formula = Formula::parse(input.as_bytes())?;
            let mut asg = Assignment::default();
            asg.resize(formula.var_count());
            let mut state = SlsState::default();
            state.resize(&formula);
            let mut branching = Branching::default();
            branching.resize(formula.var_count());
            Ok(Fixture {
                formula,
                asg,
                state,
                playout: Playout::new(50, crate::sls::picker::Picker::Ccls { noise: 0.0 }),
                branching,
                incumbent: Incumbent::default(),
                rng: SmallRng::seed_from_u64(seed),
                stats: Stats::default(),
                best_reward: 0.0,
            })
        }

        fn root_atom(&mut self) -> Option<Var> {
            self.state.rebuild(&self.formula, &mut self.asg);
            self.branching
                .pick(&self.formula, &self.asg, &self.state, &mut self.rng)
        }

        fn play(&mut self, tree: &mut Tree) -> f64 {
            self.asg.thaw_all();
            tree.play(&mut DescentOps {
                formula: &self.formula,
                asg: &mut self.asg,
                state: &mut self.state,
                playout: &mut self.playout,
                branching: &mut self.branching,
                incumbent: &mut self.incumbent,
                rng: &mut self.rng,
                stats: &mut self.stats,
                best_reward: &mut self.best_reward,
                deadline: None,
            })
        }
    }

    #[test]
    fn first_visit_plays_both_arms() -> Result<()> {
        // One variable and a contradiction: either arm leaves exactly one
        // clause falsified, for a reward of (1/2)^2 each.
        let mut fx = Fixture::new("p cnf 1 2\n1 0\n-1 0\n", 1)?;
        let atom = fx.root_atom().unwrap();
        let mut tree = Tree::new(0.02, 0);

        tree.reset(atom);
        let reward = fx.play(&mut tree);
        assert!((reward - 0.25).abs() < 1e-9);
        assert_eq!(fx.stats.playouts, 2);
        assert!(tree.root_fully_closed());
        assert_eq!(tree.node_count(), 1);
        Ok(())
    }

    #[test]
    fn two_var_tree_closes_within_four_descents() -> Result<()> {
        let mut fx = Fixture::new("p cnf 2 2\n1 2 0\n-1 2 0\n", 3)?;
        let atom = fx.root_atom().unwrap();
        let mut tree = Tree::new(0.02, 1);

        tree.reset(atom);
        let mut descents = 0;
        while !tree.root_fully_closed() {
            fx.play(&mut tree);
            descents += 1;
            assert!(descents <= 4, "tree failed to close");
        }
        assert!(tree.node_count() <= 7);
        Ok(())
    }

    #[test]
    fn closed_flags_are_monotone() -> Result<()> {
        let mut fx = Fixture::new("p cnf 2 2\n1 2 0\n-1 -2 0\n", 5)?;
        let atom = fx.root_atom().unwrap();
        let mut tree = Tree::new(0.02, 1);

        tree.reset(atom);
        let mut seen_closed: Vec<(usize, [bool; 2])> = vec![];
        for _ in 0..16 {
            if tree.root_fully_closed() {
                break;
            }
            fx.play(&mut tree);
            for &(node, closed) in &seen_closed {
                assert!(tree.nodes[node].closed[0] >= closed[0]);
                assert!(tree.nodes[node].closed[1] >= closed[1]);
            }
            seen_closed = tree
                .nodes
                .iter()
                .map(|node| node.closed)
                .enumerate()
                .collect();
        }
        Ok(())
    }

    #[test]
    fn ucb1_ties_pick_both_arms() -> Result<()> {
        // Both root arms are open with identical statistics after the first
        // descent, so the second descent draws its arm uniformly.
        let mut fx = Fixture::new("p cnf 2 2\n1 2 0\n-1 -2 0\n", 17)?;
        let atom = fx.root_atom().unwrap();

        let mut picked = [0u32; 2];
        for _ in 0..64 {
            let mut tree = Tree::new(0.02, 1);
            tree.reset(atom);
            fx.play(&mut tree);
            if tree.root_fully_closed() {
                continue;
            }
            fx.play(&mut tree);
            let root = &tree.nodes[0];
            for arm in Arm::BOTH {
                if root.n[arm.index()] == 2 {
                    picked[arm.index()] += 1;
                }
            }
        }
        assert!(picked[0] > 0, "left arm never selected on ties");
        assert!(picked[1] > 0, "right arm never selected on ties");
        Ok(())
    }

    #[test]
    fn blend_computes_the_running_mean() {
        let mut node = Node::new(None);
        node.n[Arm::Left.index()] = 1;
        node.x[Arm::Left.index()] = 0.5;
        let rewards = [0.25, 1.0, 0.0, 0.75];
        for (visit, &reward) in rewards.iter().enumerate() {
            node.n[Arm::Left.index()] = visit as u32 + 2;
            node.blend(Arm::Left, reward);
        }
        let mean = (0.5 + 0.25 + 1.0 + 0.0 + 0.75) / 5.0;
        assert!((node.x[Arm::Left.index()] - mean).abs() < 1e-9);
    }
}
