//! Running the external model synthesizer.
//!
//! The synthesizer is an ASP program solved by `clingo`. Each call solves
//! the program over the current training facts and yields the best (last
//! reported) answer set as a [`LiftedModel`], or `None` if there is none.
//!
//! The child's standard output goes to a file in the solve directory, which
//! is parsed once the child exits. While it runs, the child is polled so that
//! an interrupt request can kill it.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write as IoWrite};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use wait_timeout::ChildExt;

use crate::error::{Error, Result};
use crate::facts::split_fields;
use crate::model::LiftedModel;

pub const BEST_MODEL_FILE: &str = "best_model.lp";
pub const READABLE_MODELS_FILE: &str = "readable_models.txt";
pub const SOLVER_OUTPUT_FILE: &str = "solver_output.txt";

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Anything that proposes a lifted model from the training facts.
pub trait Synthesizer {
    /// Solves over `files`, writing any artifacts into `solve_dir`.
    ///
    /// Returns `Ok(None)` if no model exists (or none was found in time).
    fn synthesize(&mut self, files: &[PathBuf], solve_dir: &Path) -> Result<Option<LiftedModel>>;

    /// Timing accumulated over all calls so far.
    fn stats(&self) -> SolverStats {
        SolverStats::default()
    }
}

#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// The `clingo` executable.
    pub program: PathBuf,
    pub max_action_arity: usize,
    pub max_num_predicates: usize,
    /// Time limit per call, in seconds.
    pub time_limit: u64,
    pub threads: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("clingo"),
            max_action_arity: 3,
            max_num_predicates: 12,
            time_limit: 57600,
            threads: 6,
        }
    }
}

/// Timings of a single solver call, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Timing {
    pub wall: Option<f64>,
    pub solving: Option<f64>,
    pub cpu: Option<f64>,
}

/// Timings accumulated over calls.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SolverStats {
    pub calls: usize,
    pub wall: f64,
    /// Wall time not spent solving, i.e. grounding the ASP program.
    pub ground: f64,
    pub cpu: f64,
}

impl SolverStats {
    pub fn record(&mut self, timing: &Timing) {
        self.calls += 1;
        if let Some(wall) = timing.wall {
            self.wall += wall;
            self.ground += wall - timing.solving.unwrap_or(0.0);
        }
        if let Some(cpu) = timing.cpu {
            self.cpu += cpu;
        }
    }
}

impl fmt::Display for SolverStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#calls={}, solve_wall_time={:.2}, solve_ground_time={:.2}, solve_cpu_time={:.2}",
            self.calls, self.wall, self.ground, self.cpu
        )
    }
}

/// One answer set reported by the solver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Answer {
    pub number: usize,
    /// Facts of the answer, without the trailing dot.
    pub facts: Vec<String>,
    pub optimization: Vec<i64>,
}

impl Answer {
    /// Facts that make up the lifted model, as a model file.
    pub fn model_text(&self) -> String {
        let mut out = String::new();
        for fact in &self.facts {
            if is_model_fact(fact) {
                out.push_str(fact);
                out.push_str(".\n");
            }
        }
        out
    }

    /// The model with solver-reported static predicates, for display.
    pub fn model(&self) -> Result<LiftedModel> {
        let mut text = self.model_text();
        for fact in self.facts.iter().filter(|f| f.starts_with("p_static(")) {
            text.push_str(fact);
            text.push_str(".\n");
        }
        LiftedModel::parse(&format!("answer {}", self.number), &text)
    }

    /// `object(I,O)` facts, rendered as `I/O`.
    pub fn objects(&self) -> Vec<String> {
        self.facts
            .iter()
            .filter_map(|f| f.strip_prefix("object(")?.strip_suffix(')'))
            .map(|body| split_fields(body).join("/"))
            .collect()
    }
}

fn is_model_fact(fact: &str) -> bool {
    ["constant(", "pred(", "a_arity(", "prec(", "eff("]
        .iter()
        .any(|p| fact.starts_with(p))
}

const KNOWN_FACTS: [&str; 12] = [
    "object(", "constant(", "pred(", "p_static(", "action(", "a_arity(", "appl(", "prec(", "-prec(", "eff(", "-eff(",
    "tlabelR(",
];

/// What the solver printed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolverOutput {
    pub answers: Vec<Answer>,
    pub timing: Timing,
}

impl SolverOutput {
    pub fn best(&self) -> Option<&Answer> {
        self.answers.last()
    }
}

/// Parses clingo's text output.
///
/// An `Answer: k` line is followed by the line of facts and, for
/// optimization problems, an `Optimization: ...` line. Timing comes from the
/// `Time` and `CPU Time` summary lines.
pub fn parse_output(text: &str) -> SolverOutput {
    let mut output = SolverOutput::default();
    let lines: Vec<&str> = text.lines().collect();

    for (i, line) in lines.iter().enumerate() {
        if let Some(rest) = line.strip_prefix("Answer:") {
            let facts: Vec<String> = lines
                .get(i + 1)
                .map(|l| l.split_whitespace().map(String::from).collect())
                .unwrap_or_default();
            for fact in &facts {
                let known = KNOWN_FACTS.iter().any(|p| fact.starts_with(p))
                    || fact.starts_with("repr(")
                    || fact == "verification"
                    || fact == "synthesis";
                if !known {
                    warn!("Unknown fact in answer: {}", fact);
                }
            }
            let optimization: Vec<i64> = lines
                .get(i + 2)
                .and_then(|l| l.strip_prefix("Optimization:"))
                .map(|o| o.split_whitespace().filter_map(|n| n.parse().ok()).collect())
                .unwrap_or_default();
            output.answers.push(Answer {
                number: rest.trim().parse().unwrap_or(output.answers.len() + 1),
                facts,
                optimization,
            });
        } else if line.starts_with("CPU Time") {
            let fields: Vec<&str> = line.split_whitespace().collect();
            output.timing.cpu = fields.get(3).and_then(|s| seconds(s));
        } else if line.starts_with("Time") {
            let fields: Vec<&str> = line.split_whitespace().collect();
            output.timing.wall = fields.get(2).and_then(|s| seconds(s));
            output.timing.solving = fields.get(4).and_then(|s| seconds(s));
        }
    }
    output
}

fn seconds(s: &str) -> Option<f64> {
    s.trim_end_matches(')').trim_end_matches('s').parse().ok()
}

/// Human-readable rendering of an answer, as appended to the readable log.
pub fn readable(answer: &Answer, model: &LiftedModel) -> String {
    let optimization: Vec<String> = answer.optimization.iter().map(|n| n.to_string()).collect();
    let objects = answer.objects();
    let mut out = String::new();
    out.push_str(&format!("Optimization: ({})\n", optimization.join(",")));
    out.push_str(&format!("{} object(s): {}\n", objects.len(), objects.join(", ")));
    out.push_str(&model.to_string());
    out
}

/// The `clingo` synthesizer.
pub struct Clingo {
    config: SolverConfig,
    /// The ASP program encoding the learning task.
    program: PathBuf,
    interrupt: Arc<AtomicBool>,
    stats: SolverStats,
}

impl Clingo {
    pub fn new(program: impl Into<PathBuf>, config: SolverConfig, interrupt: Arc<AtomicBool>) -> Self {
        Clingo {
            config,
            program: program.into(),
            interrupt,
            stats: SolverStats::default(),
        }
    }

    pub fn command(&self, files: &[PathBuf]) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.arg("-c")
            .arg(format!("max_action_arity={}", self.config.max_action_arity))
            .arg("-c")
            .arg(format!("num_predicates={}", self.config.max_num_predicates))
            .arg("--fast-exit")
            .arg(format!("-t{}", self.config.threads))
            .arg("--sat-prepro=2")
            .arg(format!("--time-limit={}", self.config.time_limit))
            .arg("--stats=0")
            .arg(&self.program)
            .args(files);
        cmd
    }

    /// Runs the command to completion with stdout and stderr in `output_path`.
    fn run(&self, files: &[PathBuf], output_path: &Path) -> Result<String> {
        let out = File::create(output_path).map_err(|e| Error::io(output_path, e))?;
        let err = out.try_clone().map_err(|e| Error::io(output_path, e))?;

        let mut cmd = self.command(files);
        cmd.stdin(Stdio::null()).stdout(out).stderr(err);
        debug!("Cmd={:?}", cmd);

        let program = self.config.program.display().to_string();
        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::SolverUnavailable(format!("`{}` not found", program)),
            _ => Error::SolverUnavailable(format!("cannot run `{}`: {}", program, e)),
        })?;

        let status = loop {
            if self.interrupt.load(Ordering::SeqCst) {
                warn!("Killing solver subprocess {}", child.id());
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::Interrupted);
            }
            match child.wait_timeout(POLL_INTERVAL).map_err(|e| Error::io(&program, e))? {
                Some(status) => break status,
                None => continue,
            }
        };

        let text = fs::read_to_string(output_path).map_err(|e| Error::io(output_path, e))?;
        // clingo exits with 10/20/30 (plus 1 if interrupted); 33 and up are errors.
        match status.code() {
            Some(code) if code < 33 => Ok(text),
            code => {
                let tail: Vec<&str> = text.lines().rev().take(5).collect();
                Err(Error::SolverUnavailable(format!(
                    "`{}` failed with exit status {:?}: {}",
                    program,
                    code,
                    tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
                )))
            }
        }
    }
}

impl Synthesizer for Clingo {
    fn synthesize(&mut self, files: &[PathBuf], solve_dir: &Path) -> Result<Option<LiftedModel>> {
        let best_path = solve_dir.join(BEST_MODEL_FILE);
        if best_path.exists() {
            fs::remove_file(&best_path).map_err(|e| Error::io(&best_path, e))?;
        }

        let text = self.run(files, &solve_dir.join(SOLVER_OUTPUT_FILE))?;
        for line in text.lines() {
            debug!("{}", line);
        }
        let output = parse_output(&text);
        self.stats.record(&output.timing);
        info!("Solver: {}, last call {:?}", self.stats, output.timing);

        let Some(best) = output.best() else {
            info!("No model found");
            return Ok(None);
        };

        let model = best.model()?;
        fs::write(&best_path, best.model_text()).map_err(|e| Error::io(&best_path, e))?;

        let readable_path = solve_dir.join(READABLE_MODELS_FILE);
        let mut readable_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&readable_path)
            .map_err(|e| Error::io(&readable_path, e))?;
        writeln!(readable_file, "\n{}", readable(best, &model)).map_err(|e| Error::io(&readable_path, e))?;

        info!("Best model (answer {}):\n{}", best.number, model);
        Ok(Some(model))
    }

    fn stats(&self) -> SolverStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    const OUTPUT: &str = "\
clingo version 5.6.2
Reading from solver.lp ...
Solving...
Answer: 1
object(1,a) object(1,b) pred(p) a_arity(act,1) prec(act,(p,(1,)),1) eff(act,(p,(1,)),0) synthesis
Optimization: 5 3
Answer: 2
object(1,a) object(1,b) pred(p) p_static(verum) a_arity(act,2) prec(act,(p,(1,)),1) eff(act,(p,(1,)),0) eff(act,(p,(2,)),1) -prec(act,(p,(2,)),1) synthesis
Optimization: 4 3
OPTIMUM FOUND

Models       : 2
  Optimum    : yes
Optimization : 4 3
Calls        : 1
Time         : 0.052s (Solving: 0.01s 1st Model: 0.00s Unsat: 0.00s)
CPU Time     : 0.050s
";

    #[test]
    fn test_parse_answers() {
        let out = parse_output(OUTPUT);
        assert_eq!(out.answers.len(), 2);
        let best = out.best().unwrap();
        assert_eq!(best.number, 2);
        assert_eq!(best.optimization, vec![4, 3]);
        assert_eq!(best.objects(), vec!["1/a".to_string(), "1/b".to_string()]);
    }

    #[test]
    fn test_parse_timing() {
        let out = parse_output(OUTPUT);
        assert_eq!(out.timing.wall, Some(0.052));
        assert_eq!(out.timing.solving, Some(0.01));
        assert_eq!(out.timing.cpu, Some(0.05));

        let mut stats = SolverStats::default();
        stats.record(&out.timing);
        stats.record(&Timing::default());
        assert_eq!(stats.calls, 2);
        assert!((stats.ground - 0.042).abs() < 1e-9);
    }

    #[test]
    fn test_best_model_text() {
        let out = parse_output(OUTPUT);
        let text = out.best().unwrap().model_text();
        assert_eq!(
            text,
            "pred(p).\na_arity(act,2).\nprec(act,(p,(1,)),1).\neff(act,(p,(1,)),0).\neff(act,(p,(2,)),1).\n"
        );
        let model = out.best().unwrap().model().unwrap();
        assert_eq!(model.action("act").unwrap().arity, Some(2));
        assert!(model.static_predicates.contains("verum"));
    }

    #[test]
    fn test_unsat_output_has_no_answer() {
        let out = parse_output("Solving...\nUNSATISFIABLE\n\nTime         : 0.001s (Solving: 0.00s 1st Model: 0.00s Unsat: 0.00s)\n");
        assert!(out.best().is_none());
        assert_eq!(out.timing.wall, Some(0.001));
        assert_eq!(out.timing.cpu, None);
    }

    #[test]
    fn test_readable() {
        let out = parse_output(OUTPUT);
        let best = out.best().unwrap();
        let text = readable(best, &best.model().unwrap());
        assert!(text.starts_with("Optimization: (4,3)\n2 object(s): 1/a, 1/b\n"));
        assert!(text.contains("act(1,2):"));
    }

    #[test]
    fn test_command_line() {
        let clingo = Clingo::new("solver.lp", SolverConfig::default(), Arc::new(AtomicBool::new(false)));
        let cmd = clingo.command(&[PathBuf::from("a.lp")]);
        let args: Vec<String> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "-c",
                "max_action_arity=3",
                "-c",
                "num_predicates=12",
                "--fast-exit",
                "-t6",
                "--sat-prepro=2",
                "--time-limit=57600",
                "--stats=0",
                "solver.lp",
                "a.lp"
            ]
        );
    }

    #[test]
    fn test_missing_program_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let config = SolverConfig {
            program: PathBuf::from("/nonexistent/clingo"),
            ..Default::default()
        };
        let mut clingo = Clingo::new("solver.lp", config, Arc::new(AtomicBool::new(false)));
        let err = clingo.synthesize(&[], dir.path()).unwrap_err();
        assert!(matches!(err, Error::SolverUnavailable(_)));
    }
}
