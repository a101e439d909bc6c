mod common;

use std::collections::BTreeSet;
use std::fs;

use test_log::test;

use strips_learn::domain::{PARTIAL_FILE, SOLUTION_FILE};
use strips_learn::error::Error;
use strips_learn::fragment::Fragment;
use strips_learn::learn::{LearnConfig, Learner};
use strips_learn::model::LiftedModel;
use strips_learn::types::NodeId;
use strips_learn::verify::VerifierKind;

use common::*;

fn nodes(ids: &[usize]) -> BTreeSet<NodeId> {
    ids.iter().map(|&i| NodeId::new(i)).collect()
}

fn learner(ws: &Workspace, synth: &Scripted, config: LearnConfig) -> Learner<Scripted> {
    Learner::new(synth.clone(), &ws.solve_dir, "solver.lp", ws.test_files.clone(), config).unwrap()
}

fn seeded() -> LearnConfig {
    LearnConfig {
        seed: Some(42),
        ..LearnConfig::default()
    }
}

#[test]
fn test_counterexamples_lead_to_solution() {
    let ws = Workspace::new(&[("swap.lp", SWAP)]);
    let synth = Scripted::new([Some(DELETE_ONLY), Some(MOVE)]);
    let mut learner = learner(&ws, &synth, seeded());

    let outcome = learner.run().unwrap();
    assert_eq!(outcome.stats.rounds, 2);
    assert_eq!(outcome.stats.added_files, vec!["swap.lp".to_string()]);
    assert_eq!(outcome.stats.added_nodes, vec![2]);
    assert_eq!(learner.injected()["swap.lp"], nodes(&[0, 1]));

    assert_eq!(synth.file_names(0), vec!["train.lp"]);
    assert_eq!(synth.file_names(1), vec![PARTIAL_FILE, "swap.lp", "train.lp"]);

    let solution = LiftedModel::load(ws.solve_dir.join(SOLUTION_FILE)).unwrap();
    assert_eq!(solution.action("act").unwrap().arity, Some(2));
}

#[test]
fn test_stall_is_detected() {
    let ws = Workspace::new(&[("swap.lp", SWAP)]);
    let synth = Scripted::new([Some(DELETE_ONLY), Some(DELETE_ONLY)]);
    let config = LearnConfig {
        max_nodes_per_round: 0,
        ..seeded()
    };
    let err = learner(&ws, &synth, config).run().unwrap_err();
    match err {
        Error::Stalled { file, nodes } => {
            assert_eq!(file, "swap.lp");
            assert_eq!(nodes, vec![NodeId::new(0), NodeId::new(1)]);
        }
        e => panic!("unexpected error: {}", e),
    }
    // No third call: the loop gave up instead of solving again.
    assert_eq!(synth.calls.borrow().len(), 2);
}

#[test]
fn test_cap_spreads_injection_over_rounds() {
    let ws = Workspace::new(&[("swap.lp", SWAP)]);
    let synth = Scripted::new([Some(DELETE_ONLY), Some(DELETE_ONLY), Some(DELETE_ONLY)]);
    let config = LearnConfig {
        max_nodes_per_round: 1,
        ..seeded()
    };
    let mut learner = learner(&ws, &synth, config);
    let err = learner.run().unwrap_err();
    assert!(matches!(err, Error::Stalled { .. }));
    assert_eq!(learner.stats().added_nodes, vec![1, 1]);
    assert_eq!(learner.injected()["swap.lp"], nodes(&[0, 1]));
}

#[test]
fn test_no_model_at_start() {
    let ws = Workspace::new(&[("swap.lp", SWAP)]);
    let synth = Scripted::new([None]);
    let err = learner(&ws, &synth, seeded()).run().unwrap_err();
    assert!(matches!(err, Error::SolverUnavailable(_)));
    assert_eq!(err.exit_code(), 3);
}

#[test]
fn test_sink_mates_are_injected_on_no_model() {
    let ws = Workspace::new(&[("sinks.lp", TWO_SINKS)]);
    let synth = Scripted::new([Some(DELETE_ONLY), None, Some(DELETE_WITH_Q)]);
    let config = LearnConfig {
        verifier: VerifierKind::Full,
        max_nodes_per_round: 1,
        ..seeded()
    };
    let mut learner = learner(&ws, &synth, config);

    let outcome = learner.run().unwrap();
    assert_eq!(outcome.stats.rounds, 3);
    assert_eq!(outcome.stats.added_nodes, vec![1, 1]);
    assert_eq!(learner.injected()["sinks.lp"], nodes(&[1, 2]));
}

#[test]
fn test_no_model_without_sink_expansion() {
    let ws = Workspace::new(&[("sinks.lp", TWO_SINKS)]);
    let synth = Scripted::new([Some(DELETE_ONLY), None, Some(DELETE_WITH_Q)]);
    let config = LearnConfig {
        verifier: VerifierKind::Full,
        max_nodes_per_round: 1,
        expand_sinks: false,
        ..seeded()
    };
    let err = learner(&ws, &synth, config).run().unwrap_err();
    assert!(matches!(err, Error::SolverUnavailable(_)));
    assert_eq!(synth.calls.borrow().len(), 2);
}

#[test]
fn test_round_limit() {
    let ws = Workspace::new(&[("swap.lp", SWAP)]);
    let synth = Scripted::new([Some(DELETE_ONLY), Some(MOVE)]);
    let config = LearnConfig {
        max_rounds: 1,
        ..seeded()
    };
    let err = learner(&ws, &synth, config).run().unwrap_err();
    assert!(matches!(err, Error::RoundLimit { rounds: 1 }));
    assert!(!ws.solve_dir.join(SOLUTION_FILE).exists());
}

#[test]
fn test_seed_fixes_injected_nodes() {
    let run = || {
        let ws = Workspace::new(&[("swap.lp", SWAP)]);
        let synth = Scripted::new([Some(DELETE_ONLY)]);
        let config = LearnConfig {
            max_nodes_per_round: 1,
            max_rounds: 1,
            ..seeded()
        };
        let mut learner = learner(&ws, &synth, config);
        assert!(learner.run().is_err());
        learner.injected()["swap.lp"].clone()
    };
    let first = run();
    assert_eq!(first.len(), 1);
    for _ in 0..3 {
        assert_eq!(run(), first);
    }
}

#[test]
fn test_continue_restores_injected_nodes() {
    let ws = Workspace::new(&[("swap.lp", SWAP)]);
    fs::copy(&ws.test_files[0], ws.solve_dir.join("swap.lp")).unwrap();
    Fragment::new(ws.solve_dir.join(PARTIAL_FILE))
        .append("swap.lp", 1, &[NodeId::new(1), NodeId::new(0)])
        .unwrap();

    let synth = Scripted::new([Some(DELETE_ONLY)]);
    let mut learner = learner(&ws, &synth, seeded());
    assert_eq!(learner.injected()["swap.lp"], nodes(&[0, 1]));

    // Everything the model fails on was injected in an earlier run.
    let err = learner.run().unwrap_err();
    assert!(matches!(err, Error::Stalled { .. }));
}

#[test]
fn test_verify_solution() {
    let ws = Workspace::new(&[("swap.lp", SWAP)]);
    let synth = Scripted::new(Vec::<Option<&'static str>>::new());

    fs::write(ws.solve_dir.join(SOLUTION_FILE), model(MOVE).to_lp_string()).unwrap();
    assert!(learner(&ws, &synth, seeded()).verify_solution().unwrap().is_none());

    fs::write(ws.solve_dir.join(SOLUTION_FILE), model(DELETE_ONLY).to_lp_string()).unwrap();
    let failure = learner(&ws, &synth, seeded()).verify_solution().unwrap().unwrap();
    assert_eq!(failure.unverified, nodes(&[0, 1]));

    // Nothing was injected or solved.
    assert!(!ws.solve_dir.join(PARTIAL_FILE).exists());
    assert!(synth.calls.borrow().is_empty());
}

fn two_held_out() -> (Workspace, LearnConfig) {
    // The larger file sorts first by name but must be scanned last.
    let ws = Workspace::new(&[("a_row.lp", THREE_ROW), ("b_swap.lp", SWAP)]);
    let config = LearnConfig {
        max_nodes_per_round: 0,
        max_rounds: 1,
        ..seeded()
    };
    (ws, config)
}

#[test]
fn test_held_out_files_scanned_smallest_first() {
    let (ws, config) = two_held_out();
    let sorted = ws.sorted_test_files();
    let names: Vec<String> = sorted
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["b_swap.lp", "a_row.lp"]);

    // Both files fail; only the first one scanned supplies counterexamples.
    let synth = Scripted::new([Some(DELETE_ONLY)]);
    let mut learner = Learner::new(synth.clone(), &ws.solve_dir, "solver.lp", sorted, config).unwrap();
    assert!(matches!(learner.run().unwrap_err(), Error::RoundLimit { .. }));
    assert_eq!(learner.stats().added_files, vec!["b_swap.lp".to_string()]);
    assert!(!learner.injected().contains_key("a_row.lp"));
    assert!(ws.in_solve_dir("b_swap.lp"));
    assert!(!ws.in_solve_dir("a_row.lp"));
}

#[test]
fn test_only_failing_held_out_file_is_injected() {
    let (ws, config) = two_held_out();
    // `act(X,Y)` explains the swap but sends node 0 of the row to node 2 too.
    let synth = Scripted::new([Some(MOVE)]);
    let mut learner = Learner::new(synth.clone(), &ws.solve_dir, "solver.lp", ws.sorted_test_files(), config).unwrap();
    assert!(matches!(learner.run().unwrap_err(), Error::RoundLimit { .. }));

    assert_eq!(learner.stats().added_files, vec!["a_row.lp".to_string()]);
    assert_eq!(learner.injected()["a_row.lp"], nodes(&[0, 1, 2]));
    assert!(!learner.injected().contains_key("b_swap.lp"));
    assert!(ws.in_solve_dir("a_row.lp"));
    assert!(!ws.in_solve_dir("b_swap.lp"));

    let partial = fs::read_to_string(ws.solve_dir.join(PARTIAL_FILE)).unwrap();
    assert!(partial.starts_with("filename(\"a_row.lp\").\npartial(3,\"a_row.lp\").\n"));
    assert!(!partial.contains("b_swap.lp"));
    for n in 0..3 {
        assert!(partial.contains(&format!("relevant(3,{}).", n)));
    }
}
