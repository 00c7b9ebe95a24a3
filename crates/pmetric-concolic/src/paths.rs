//! Bounded path enumeration
//!
//! Depth-first walk of the control-flow graph. At every branch the `true`
//! edge is explored before the `false` edge. A loop header's `true` edge is
//! followed at most `unroll_bound` times per loop entry; the counter resets
//! when the loop exits, so nested loops are unrolled independently and
//! enumeration always terminates.

use pmetric_core::Expr;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::cfg::{ControlFlowGraph, NodeId, NodeKind};

/// Sequential id of an enumerated path
pub type PathId = usize;

/// Default number of loop iterations explored per loop entry
pub const DEFAULT_UNROLL_BOUND: usize = 3;

/// One branch taken along a path
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BranchDecision {
    pub node: NodeId,
    pub condition: Expr,
    pub taken: bool,
}

/// Branch outcomes plus terminal node; identifies a path through the graph
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PathSignature {
    pub decisions: Vec<(NodeId, bool)>,
    /// `None` when execution stopped before a terminal node
    pub terminal: Option<NodeId>,
}

/// A complete entry-to-terminal path
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPath {
    pub id: PathId,
    /// Visited nodes in order, entry first, terminal last
    pub steps: Vec<NodeId>,
    pub decisions: Vec<BranchDecision>,
    pub terminal: NodeId,
}

impl ExecutionPath {
    pub fn signature(&self) -> PathSignature {
        PathSignature {
            decisions: self.decisions.iter().map(|d| (d.node, d.taken)).collect(),
            terminal: Some(self.terminal),
        }
    }
}

/// Enumerates the paths of a graph up to a loop unrolling bound
pub struct PathExplorer<'g> {
    cfg: &'g ControlFlowGraph,
    unroll_bound: usize,
}

impl<'g> PathExplorer<'g> {
    pub fn new(cfg: &'g ControlFlowGraph, unroll_bound: usize) -> Self {
        Self { cfg, unroll_bound }
    }

    pub fn unroll_bound(&self) -> usize {
        self.unroll_bound
    }

    /// A fresh, lazy enumeration starting from the entry node
    pub fn paths(&self) -> Paths<'g> {
        Paths {
            cfg: self.cfg,
            unroll_bound: self.unroll_bound,
            pending: vec![Pending {
                node: self.cfg.entry(),
                decide: None,
                steps_len: 0,
                decisions_len: 0,
                loop_counts: HashMap::new(),
            }],
            steps: Vec::new(),
            decisions: Vec::new(),
            next_id: 0,
        }
    }
}

/// A suspended alternative: resume at `node`, taking `decide` if it is a branch
struct Pending {
    node: NodeId,
    decide: Option<bool>,
    steps_len: usize,
    decisions_len: usize,
    loop_counts: HashMap<NodeId, usize>,
}

/// Iterator over the paths of a graph, in depth-first order
pub struct Paths<'g> {
    cfg: &'g ControlFlowGraph,
    unroll_bound: usize,
    pending: Vec<Pending>,
    steps: Vec<NodeId>,
    decisions: Vec<BranchDecision>,
    next_id: PathId,
}

impl Paths<'_> {
    /// Record a decision at `node` and return the successor it leads to
    fn take(&mut self, node: NodeId, taken: bool, loop_counts: &mut HashMap<NodeId, usize>) -> NodeId {
        let cfg = self.cfg;
        let NodeKind::Branch {
            cond,
            on_true,
            on_false,
            loop_header,
        } = &cfg.node(node).kind
        else {
            return node;
        };

        self.steps.push(node);
        self.decisions.push(BranchDecision {
            node,
            condition: cond.clone(),
            taken,
        });
        if *loop_header {
            if taken {
                *loop_counts.entry(node).or_insert(0) += 1;
            } else {
                loop_counts.remove(&node);
            }
        }
        if taken {
            *on_true
        } else {
            *on_false
        }
    }
}

impl Iterator for Paths<'_> {
    type Item = ExecutionPath;

    fn next(&mut self) -> Option<ExecutionPath> {
        let cfg = self.cfg;
        let frame = self.pending.pop()?;
        self.steps.truncate(frame.steps_len);
        self.decisions.truncate(frame.decisions_len);
        let mut loop_counts = frame.loop_counts;

        let mut node = match frame.decide {
            Some(taken) => self.take(frame.node, taken, &mut loop_counts),
            None => frame.node,
        };

        loop {
            match &cfg.node(node).kind {
                NodeKind::Entry { next } | NodeKind::Assign { next, .. } => {
                    self.steps.push(node);
                    node = *next;
                }
                NodeKind::Return { .. } | NodeKind::Raise { .. } => {
                    self.steps.push(node);
                    let id = self.next_id;
                    self.next_id += 1;
                    return Some(ExecutionPath {
                        id,
                        steps: self.steps.clone(),
                        decisions: self.decisions.clone(),
                        terminal: node,
                    });
                }
                NodeKind::Branch { loop_header, .. } => {
                    let iterations = loop_counts.get(&node).copied().unwrap_or(0);
                    let may_enter = !*loop_header || iterations < self.unroll_bound;
                    if may_enter {
                        self.pending.push(Pending {
                            node,
                            decide: Some(false),
                            steps_len: self.steps.len(),
                            decisions_len: self.decisions.len(),
                            loop_counts: loop_counts.clone(),
                        });
                        node = self.take(node, true, &mut loop_counts);
                    } else {
                        node = self.take(node, false, &mut loop_counts);
                    }
                }
            }
        }
    }
}
