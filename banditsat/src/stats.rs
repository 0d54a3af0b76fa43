//! Solver statistics.

/// Counters accumulated across a solver's lifetime.
#[derive(Default, Debug)]
pub struct Stats {
    /// Total number of playouts performed.
    pub playouts: u64,
    /// Total number of variable flips across all playouts.
    pub flips: u64,
    /// Total number of tree descents.
    pub descents: u64,
    /// Number of completed runs.
    pub runs: u64,
}
