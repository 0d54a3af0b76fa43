use std::{fs::File, io::BufReader, path::PathBuf, time::Duration, time::Instant};

use anyhow::Context;
use clap::Parser;

use banditsat::{
    formula::Formula,
    solver::{Config, SlsAlgorithm, Solver},
};

#[derive(Parser)]
#[command(name = "banditsat", version, about = "Incomplete MaxSAT solver combining bandit tree search with local search playouts")]
struct Args {
    /// DIMACS CNF or WCNF formula file
    #[arg(short = 'f', long = "formula", value_name = "FILE")]
    formula: PathBuf,

    /// Number of independent runs
    #[arg(short = 'r', long, default_value_t = 10)]
    runs: usize,

    /// Maximum tree descents per run
    #[arg(short = 'i', long, default_value_t = 2000)]
    iterations: u64,

    /// UCB1 exploration constant
    #[arg(short = 'c', long, default_value_t = 0.02)]
    exploration: f64,

    /// Maximum flips per playout
    #[arg(short = 'm', long = "max-flips", default_value_t = 500)]
    max_flips: u64,

    /// Playout noise parameter in [0, 1)
    #[arg(short = 'n', long, default_value_t = 0.0)]
    noise: f64,

    /// Playout strategy: 0 = CCLS, 1 = WalkSAT, 2 = Novelty
    #[arg(short = 'a', long, default_value_t = 0)]
    algorithm: u8,

    /// Per-run wall clock limit in seconds, 0 to disable
    #[arg(short = 't', long, default_value_t = 15)]
    timeout: u64,

    /// RNG seed; taken from the clock when absent
    #[arg(short = 's', long)]
    seed: Option<u64>,

    /// Print the best assignment found as a DIMACS `v` line
    #[arg(long)]
    model: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .with_env_filter(tracing_subscriber::EnvFilter::new(
            std::env::var("BANDITSAT_LOG").as_deref().unwrap_or("info"),
        ))
        .init();

    let args = Args::parse();

    let algorithm = match args.algorithm {
        0 => SlsAlgorithm::Ccls,
        1 => SlsAlgorithm::WalkSat,
        2 => SlsAlgorithm::Novelty,
        other => anyhow::bail!("invalid playout strategy {other}, expected 0, 1 or 2"),
    };
    anyhow::ensure!(
        (0.0..1.0).contains(&args.noise),
        "noise must lie in [0, 1)"
    );

    let file = File::open(&args.formula)
        .with_context(|| format!("cannot open {}", args.formula.display()))?;
    let formula = Formula::parse(BufReader::new(file))
        .with_context(|| format!("cannot parse {}", args.formula.display()))?;

    tracing::info!(
        vars = formula.var_count(),
        clauses = formula.clause_count(),
        dropped_tautologies = formula.dropped_tautologies(),
        total_weight = formula.total_weight(),
        clause_len_bounds = ?formula.clause_len_bounds(),
        "formula loaded"
    );

    let config = Config {
        runs: args.runs,
        iterations: args.iterations,
        exploration: args.exploration,
        max_flips: args.max_flips,
        noise: args.noise,
        algorithm,
        timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
        seed: args.seed,
    };
    let mut solver = Solver::new(formula, config);

    println!("Instance: {}", args.formula.display());
    println!("Runs: {}", args.runs);
    println!("Iterations per run: {}", args.iterations);
    println!("Exploration constant: {}", args.exploration);
    println!("Branching heuristic: A0");
    println!("SLS algorithm: {}", solver.picker().name());
    println!("SLS max flips: {}", args.max_flips);
    println!("SLS noise: {}", args.noise);
    println!("Bandit policy: UCB1");
    if args.timeout > 0 {
        println!("Timeout: {}s", args.timeout);
    } else {
        println!("Timeout: none");
    }
    println!("Seed: {}", solver.seed());

    let started = Instant::now();
    for run in 0..args.runs {
        let outcome = solver.run();
        println!("Run {}: {}", run, outcome.num_unsat);
    }

    let stats = solver.stats();
    tracing::info!(
        elapsed = ?started.elapsed(),
        playouts = stats.playouts,
        flips = stats.flips,
        descents = stats.descents,
        "all runs finished"
    );

    if let Some((weight, values)) = solver.best_solution() {
        let verified = solver.formula().unsat_weight(values);
        tracing::info!(best_unsat_weight = weight, verified, "best assignment");
        if args.model {
            let mut line = String::from("v");
            for var in solver.formula().vars() {
                let number = var.dimacs() * if values[var] { 1 } else { -1 };
                line.push_str(&format!(" {number}"));
            }
            println!("{line}");
        }
    }

    Ok(())
}
