//! Error kinds shared by the whole pipeline.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::NodeId;

/// Everything that can go wrong between reading a fact file and accepting a
/// learned model.
#[derive(Debug, Error)]
pub enum Error {
    /// A record of a known kind could not be parsed.
    #[error("{file}:{line}: malformed record `{record}`: {reason}")]
    Format {
        file: String,
        line: usize,
        record: String,
        reason: String,
    },

    /// The lifted model does not fit the graph it is grounded on.
    #[error("grounding failed: {0}")]
    Grounding(String),

    /// The solver could not be run or returned no model.
    #[error("solver unavailable: {0}")]
    SolverUnavailable(String),

    /// The recorded graph itself violates a verification precondition.
    #[error("verification failed on {file}: nodes {first} and {second} have identical valuations")]
    VerificationFailed { file: String, first: NodeId, second: NodeId },

    /// Counterexamples of a round were all injected in earlier rounds.
    #[error("stalled on {file}: nodes {nodes:?} keep failing although already injected")]
    Stalled { file: String, nodes: Vec<NodeId> },

    /// The refinement loop hit its round cap without converging.
    #[error("no solution after {rounds} round(s)")]
    RoundLimit { rounds: usize },

    /// The run was interrupted by a signal.
    #[error("interrupted")]
    Interrupted,

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wraps an [`io::Error`] together with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for this error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::VerificationFailed { .. } => 1,
            Error::Stalled { .. } | Error::RoundLimit { .. } => 2,
            Error::SolverUnavailable(_) => 3,
            Error::Format { .. } | Error::Grounding(_) | Error::Io { .. } => 4,
            Error::Interrupted => 130,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let errors = [
            Error::VerificationFailed {
                file: "a.lp".into(),
                first: NodeId::new(0),
                second: NodeId::new(1),
            },
            Error::Stalled {
                file: "a.lp".into(),
                nodes: vec![NodeId::new(2)],
            },
            Error::SolverUnavailable("no model".into()),
            Error::Grounding("undeclared predicate".into()),
            Error::Interrupted,
        ];
        let mut codes: Vec<i32> = errors.iter().map(|e| e.exit_code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_format_message() {
        let e = Error::Format {
            file: "g.lp".into(),
            line: 3,
            record: "node(0,x).".into(),
            reason: "invalid integer `x`".into(),
        };
        assert_eq!(e.to_string(), "g.lp:3: malformed record `node(0,x).`: invalid integer `x`");
    }
}
