//! Path enumeration over routines supplied as front-end JSON
//!
//! Invariants:
//! 1. Every path ends at exactly one terminal node
//! 2. Enumeration order is deterministic and restartable
//! 3. The unroll bound caps loop iterations per loop entry

use pmetric_concolic::{ControlFlowGraph, NodeKind, PathExplorer};
use pmetric_core::Routine;
use pretty_assertions::assert_eq;

const GCD_JSON: &str = r#"{
    "name": "gcd",
    "inputs": [
        {"name": "a", "domain": {"type": "int", "min": 0, "max": 100}},
        {"name": "b", "domain": {"type": "int", "min": 0, "max": 100}}
    ],
    "body": [
        {"if": {
            "cond": {"binary": {"op": "lt", "lhs": {"var": "a"}, "rhs": {"int": 0}}},
            "then_branch": [{"raise": {"message": "negative input"}}]
        }},
        {"while": {
            "cond": {"binary": {"op": "ne", "lhs": {"var": "b"}, "rhs": {"int": 0}}},
            "body": [
                {"assign": {"target": "t", "value": {"binary": {"op": "rem", "lhs": {"var": "a"}, "rhs": {"var": "b"}}}}},
                {"assign": {"target": "a", "value": {"var": "b"}}},
                {"assign": {"target": "b", "value": {"var": "t"}}}
            ]
        }},
        {"return": {"value": {"var": "a"}}}
    ]
}"#;

fn gcd() -> Routine {
    serde_json::from_str(GCD_JSON).expect("routine JSON should parse")
}

#[test]
fn json_routine_builds_a_graph() {
    let cfg = ControlFlowGraph::build(&gcd()).unwrap();
    assert_eq!(cfg.routine_name(), "gcd");
    assert_eq!(cfg.inputs().len(), 2);
    assert_eq!(cfg.branch_count(), 2);

    let loop_headers = cfg
        .nodes()
        .iter()
        .filter(|n| matches!(n.kind, NodeKind::Branch { loop_header: true, .. }))
        .count();
    assert_eq!(loop_headers, 1);
}

#[test]
fn path_count_follows_unroll_bound() {
    let cfg = ControlFlowGraph::build(&gcd()).unwrap();
    // raise path + (bound + 1) loop iteration counts
    for bound in 0..5 {
        let count = PathExplorer::new(&cfg, bound).paths().count();
        assert_eq!(count, 1 + bound + 1, "bound {}", bound);
    }
}

#[test]
fn every_path_has_one_terminal() {
    let cfg = ControlFlowGraph::build(&gcd()).unwrap();
    for path in PathExplorer::new(&cfg, 3).paths() {
        let terminals = path
            .steps
            .iter()
            .filter(|n| cfg.node(**n).is_terminal())
            .count();
        assert_eq!(terminals, 1, "path {} has {} terminals", path.id, terminals);
        assert_eq!(path.steps.last(), Some(&path.terminal));
    }
}

#[test]
fn enumeration_is_restartable_and_ordered() {
    let cfg = ControlFlowGraph::build(&gcd()).unwrap();
    let explorer = PathExplorer::new(&cfg, 2);

    let first: Vec<_> = explorer.paths().collect();
    let second: Vec<_> = explorer.paths().collect();
    assert_eq!(first, second);

    let ids: Vec<usize> = first.iter().map(|p| p.id).collect();
    assert_eq!(ids, (0..first.len()).collect::<Vec<_>>());

    // The raise branch is the `true` edge of the first decision, so it comes first
    assert!(first[0].decisions[0].taken);
    assert!(matches!(cfg.node(first[0].terminal).kind, NodeKind::Raise { .. }));
}

#[test]
fn unknown_variables_are_rejected() {
    let json = r#"{
        "name": "broken",
        "inputs": [],
        "body": [{"return": {"value": {"var": "ghost"}}}]
    }"#;
    let routine: Routine = serde_json::from_str(json).unwrap();
    let err = ControlFlowGraph::build(&routine).unwrap_err();
    assert!(err.to_string().contains("ghost"));
}
