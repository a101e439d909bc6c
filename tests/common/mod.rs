#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use strips_learn::domain::{lp_files, sort_by_size};
use strips_learn::error::{Error, Result};
use strips_learn::model::LiftedModel;
use strips_learn::solver::Synthesizer;

/// Two nodes, `{p(a)}` and `{p(b)}`, with `act` edges both ways.
pub const SWAP: &str = "\
instance(1).
node(1,0). node(1,1).
tlabel(1,(0,1),act).
tlabel(1,(1,0),act).
feature(verum). f_arity(verum,1). f_static(1,verum).
feature(p). f_arity(p,1).
fval(1,(verum,(a,)),1).
fval(1,(verum,(b,)),1).
fval(1,(p,(a,)),0,1).
fval(1,(p,(b,)),0,0).
fval(1,(p,(a,)),1,0).
fval(1,(p,(b,)),1,1).
";

/// Node 0 moves to node 1; nodes 1 and 2 are sinks that differ on `q` only.
pub const TWO_SINKS: &str = "\
instance(2).
node(2,0). node(2,1). node(2,2).
tlabel(2,(0,1),act).
f_static(2,verum). fval(2,(verum,(a,)),1).
fval(2,(p,(a,)),0,1). fval(2,(q,(a,)),0,0).
fval(2,(p,(a,)),1,0). fval(2,(q,(a,)),1,0).
fval(2,(p,(a,)),2,0). fval(2,(q,(a,)),2,1).
";

/// Three objects in a row of `p` values, nodes written on one line. Only
/// nodes 0 and 1 swap.
pub const THREE_ROW: &str = "\
instance(3).
node(3,0). node(3,1). node(3,2).
tlabel(3,(0,1),act).
tlabel(3,(1,0),act).
f_static(3,verum). fval(3,(verum,(a,)),1). fval(3,(verum,(b,)),1). fval(3,(verum,(c,)),1).
fval(3,(p,(a,)),0,1). fval(3,(p,(b,)),0,0). fval(3,(p,(c,)),0,0).
fval(3,(p,(a,)),1,0). fval(3,(p,(b,)),1,1). fval(3,(p,(c,)),1,0).
fval(3,(p,(a,)),2,0). fval(3,(p,(b,)),2,0). fval(3,(p,(c,)),2,1).
";

/// `act(X)` deletes `p(X)`.
pub const DELETE_ONLY: &str = "\
pred(p).
a_arity(act,1).
prec(act,(p,(1,)),1).
eff(act,(p,(1,)),0).
";

/// `act(X,Y)` moves `p` from `X` to `Y`.
pub const MOVE: &str = "\
pred(p).
a_arity(act,2).
prec(act,(p,(1,)),1).
eff(act,(p,(1,)),0).
eff(act,(p,(2,)),1).
";

/// Like [`DELETE_ONLY`], but also observing `q`.
pub const DELETE_WITH_Q: &str = "\
pred(p).
pred(q).
a_arity(act,1).
prec(act,(p,(1,)),1).
eff(act,(p,(1,)),0).
";

pub fn model(text: &str) -> LiftedModel {
    LiftedModel::parse("model.lp", text).unwrap()
}

/// A synthesizer replaying canned answers, recording the files of each call.
#[derive(Clone)]
pub struct Scripted {
    answers: Rc<RefCell<VecDeque<Option<LiftedModel>>>>,
    pub calls: Rc<RefCell<Vec<Vec<PathBuf>>>>,
}

impl Scripted {
    pub fn new(answers: impl IntoIterator<Item = Option<&'static str>>) -> Self {
        Scripted {
            answers: Rc::new(RefCell::new(answers.into_iter().map(|a| a.map(model)).collect())),
            calls: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn file_names(&self, call: usize) -> Vec<String> {
        self.calls.borrow()[call]
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }
}

impl Synthesizer for Scripted {
    fn synthesize(&mut self, files: &[PathBuf], _solve_dir: &Path) -> Result<Option<LiftedModel>> {
        self.calls.borrow_mut().push(files.to_vec());
        self.answers
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| Error::SolverUnavailable("script exhausted".to_string()))
    }
}

/// A solve directory with one training graph and a solver program, and a
/// held-out folder with the given graphs.
pub struct Workspace {
    pub tmp: tempfile::TempDir,
    pub solve_dir: PathBuf,
    pub test_files: Vec<PathBuf>,
}

impl Workspace {
    pub fn new(tests: &[(&str, &str)]) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let solve_dir = tmp.path().join("solve");
        let test_dir = tmp.path().join("test");
        fs::create_dir_all(&solve_dir).unwrap();
        fs::create_dir_all(&test_dir).unwrap();
        fs::write(solve_dir.join("solver.lp"), "% learning program\n").unwrap();
        fs::write(solve_dir.join("train.lp"), SWAP).unwrap();

        let mut test_files = Vec::new();
        for (name, content) in tests {
            let path = test_dir.join(name);
            fs::write(&path, content).unwrap();
            test_files.push(path);
        }
        Workspace {
            tmp,
            solve_dir,
            test_files,
        }
    }

    /// The held-out files in scan order, smallest first.
    pub fn sorted_test_files(&self) -> Vec<PathBuf> {
        sort_by_size(lp_files(self.tmp.path().join("test"), &[]).unwrap()).unwrap()
    }

    pub fn in_solve_dir(&self, name: &str) -> bool {
        self.solve_dir.join(name).exists()
    }
}
