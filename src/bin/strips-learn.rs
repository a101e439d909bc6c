use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};
use simplelog::{CombinedLogger, ColorChoice, Config, LevelFilter, TermLogger, TerminalMode, WriteLogger};

use strips_learn::domain::{Domain, LOG_FILE, SOLUTION_FILE};
use strips_learn::error::{Error, Result};
use strips_learn::ground::GroundConfig;
use strips_learn::learn::{LearnConfig, Learner};
use strips_learn::solver::{Clingo, SolverConfig};
use strips_learn::verify::VerifierKind;

#[derive(Debug, Parser)]
#[command(author, version, about = "Learn a STRIPS action model from state graphs")]
struct Cli {
    /// ASP program encoding the learning task.
    #[arg(value_name = "SOLVER")]
    solver: PathBuf,

    /// Domain folder (with `train/` and `test/`) or `.zip` archive of one.
    #[arg(value_name = "DOMAIN")]
    domain: PathBuf,

    /// Maximum arity of learned actions.
    #[arg(long, value_name = "INT", default_value = "3")]
    max_action_arity: usize,

    /// Maximum number of learned predicates.
    #[arg(long, value_name = "INT", default_value = "12")]
    max_num_predicates: usize,

    /// Time limit per solver call, in seconds.
    #[arg(long, value_name = "SECONDS", default_value = "57600")]
    max_time: u64,

    /// Counterexample nodes injected per round (0 = all).
    #[arg(long, value_name = "INT", default_value = "5")]
    max_nodes_per_round: usize,

    /// Drop constants from learned models before grounding.
    #[arg(long)]
    ignore_constants: bool,

    /// Allow the same object to fill several parameters of an action.
    #[arg(long)]
    allow_repeated_args: bool,

    /// Only verify an existing `solution.lp`.
    #[arg(long)]
    verify_only: bool,

    /// Continue in an existing solve directory.
    #[arg(long = "continue")]
    resume: bool,

    /// Use the node-by-node verifier instead of the equivalence-class one.
    #[arg(long)]
    full_verifier: bool,

    /// Fail when no model is found instead of injecting class-mates of sink nodes.
    #[arg(long)]
    no_expand_sinks: bool,

    /// Extra fact file passed to every solver call.
    #[arg(long, value_name = "FILE")]
    include: Vec<PathBuf>,

    /// Folder for solve directories.
    #[arg(long, value_name = "DIR")]
    results: Option<PathBuf>,

    /// Seed for shuffling counterexamples.
    #[arg(long, value_name = "INT")]
    seed: Option<u64>,

    /// Give up after this many rounds (0 = never).
    #[arg(long, value_name = "INT", default_value = "0")]
    max_rounds: usize,

    /// The `clingo` executable.
    #[arg(long, value_name = "PATH", default_value = "clingo")]
    clingo: PathBuf,

    /// Solver threads.
    #[arg(long, value_name = "INT", default_value = "6")]
    threads: usize,

    /// Log debug output.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Cli::parse();

    let domain = match Domain::open(&args.domain) {
        Ok(domain) => domain,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(e.exit_code());
        }
    };
    let solve_dir = domain.solve_dir(
        args.results.as_deref(),
        &args.solver,
        args.max_action_arity,
        args.max_num_predicates,
    );

    if args.verify_only {
        if !solve_dir.join(SOLUTION_FILE).is_file() {
            eprintln!("No solution to verify in {}", solve_dir.display());
            std::process::exit(4);
        }
    } else if let Err(e) = domain.prepare(&solve_dir, &args.solver, args.resume) {
        eprintln!("{}", e);
        std::process::exit(e.exit_code());
    }

    init_logging(&solve_dir, args.verbose)?;
    info!("args = {:?}", args);
    info!("Domain {} in {}", domain.name, domain.root.display());

    let interrupt = Arc::new(AtomicBool::new(false));
    {
        let interrupt = interrupt.clone();
        ctrlc::set_handler(move || {
            warn!("Interrupt requested");
            interrupt.store(true, Ordering::SeqCst);
        })?;
    }

    let time_total = std::time::Instant::now();
    let code = match run(&args, &domain, &solve_dir, interrupt) {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            e.exit_code()
        }
    };
    info!("Done in {:.3} s", time_total.elapsed().as_secs_f64());

    log::logger().flush();
    std::process::exit(code);
}

fn init_logging(solve_dir: &Path, verbose: bool) -> color_eyre::Result<()> {
    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(solve_dir.join(LOG_FILE))?;
    CombinedLogger::init(vec![
        TermLogger::new(level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto),
        WriteLogger::new(level, Config::default(), log_file),
    ])?;
    Ok(())
}

fn run(args: &Cli, domain: &Domain, solve_dir: &Path, interrupt: Arc<AtomicBool>) -> Result<i32> {
    let solver_name = args
        .solver
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            Error::io(
                &args.solver,
                io::Error::new(io::ErrorKind::InvalidInput, "solver program is not a file"),
            )
        })?;

    let solver_config = SolverConfig {
        program: args.clingo.clone(),
        max_action_arity: args.max_action_arity,
        max_num_predicates: args.max_num_predicates,
        time_limit: args.max_time,
        threads: args.threads,
    };
    let clingo = Clingo::new(solve_dir.join(&solver_name), solver_config, interrupt.clone());

    let config = LearnConfig {
        verifier: if args.full_verifier {
            VerifierKind::Full
        } else {
            VerifierKind::EquivalenceClasses
        },
        ground: GroundConfig {
            allow_repeated_args: args.allow_repeated_args,
            ignore_constants: args.ignore_constants,
            ..GroundConfig::default()
        },
        max_nodes_per_round: args.max_nodes_per_round,
        seed: args.seed,
        expand_sinks: !args.no_expand_sinks,
        include: args.include.clone(),
        max_rounds: args.max_rounds,
    };

    let test_files = domain.test_files()?;
    info!("Test files: {:?}", test_files);
    let mut learner = Learner::new(clingo, solve_dir, &solver_name, test_files, config)?.with_interrupt(interrupt);

    if args.verify_only {
        return Ok(match learner.verify_solution()? {
            None => 0,
            Some(_) => 1,
        });
    }

    let outcome = learner.run()?;
    info!("Learned model:\n{}", outcome.model);
    Ok(0)
}
