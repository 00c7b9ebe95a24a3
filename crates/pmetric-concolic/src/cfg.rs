//! Control-flow graph construction
//!
//! Lowers a structured routine into a flat node arena. `If` becomes a
//! branch node, `While` a loop-header branch whose body flows back to the
//! header, and falling off the end of the body reaches an implicit
//! `return`. The graph is immutable once built and shared by the path
//! explorer, the symbolic executor and the interpreter.

use pmetric_core::{Expr, ExplorationError, InputDecl, Routine, Stmt};

/// Index of a node in the graph arena
pub type NodeId = usize;

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Entry {
        next: NodeId,
    },
    Assign {
        target: String,
        value: Expr,
        next: NodeId,
    },
    Branch {
        cond: Expr,
        on_true: NodeId,
        on_false: NodeId,
        /// Header of a `while` loop; `on_true` enters the body
        loop_header: bool,
    },
    Return {
        value: Option<Expr>,
    },
    Raise {
        message: String,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
}

impl Node {
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, NodeKind::Return { .. } | NodeKind::Raise { .. })
    }
}

/// Flattened control flow of one routine
#[derive(Clone, Debug)]
pub struct ControlFlowGraph {
    routine: String,
    inputs: Vec<InputDecl>,
    nodes: Vec<Node>,
    entry: NodeId,
}

impl ControlFlowGraph {
    /// Validate the routine and lower it into a graph
    pub fn build(routine: &Routine) -> Result<Self, ExplorationError> {
        let invalid = |reason: String| ExplorationError::InvalidRoutine {
            routine: routine.name.clone(),
            reason,
        };
        routine.validate().map_err(invalid)?;
        check_calls(&routine.body).map_err(invalid)?;

        let mut builder = Builder { nodes: Vec::new() };
        let implicit_return = builder.push(NodeKind::Return { value: None });
        let body = builder.lower_block(&routine.body, implicit_return);
        let entry = builder.push(NodeKind::Entry { next: body });

        Ok(Self {
            routine: routine.name.clone(),
            inputs: routine.inputs.clone(),
            nodes: builder.nodes,
            entry,
        })
    }

    pub fn routine_name(&self) -> &str {
        &self.routine
    }

    pub fn inputs(&self) -> &[InputDecl] {
        &self.inputs
    }

    pub fn entry(&self) -> NodeId {
        self.entry
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn successors(&self, id: NodeId) -> Vec<NodeId> {
        match &self.nodes[id].kind {
            NodeKind::Entry { next } | NodeKind::Assign { next, .. } => vec![*next],
            NodeKind::Branch {
                on_true, on_false, ..
            } => vec![*on_true, *on_false],
            NodeKind::Return { .. } | NodeKind::Raise { .. } => Vec::new(),
        }
    }

    /// Number of branch nodes (including loop headers)
    pub fn branch_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Branch { .. }))
            .count()
    }
}

struct Builder {
    nodes: Vec<Node>,
}

impl Builder {
    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node { id, kind });
        id
    }

    /// Lower `stmts` so that control falls through to `next`; returns the block's first node
    fn lower_block(&mut self, stmts: &[Stmt], next: NodeId) -> NodeId {
        // Statements after a terminator are unreachable
        let end = stmts
            .iter()
            .position(|s| matches!(s, Stmt::Return { .. } | Stmt::Raise { .. }))
            .map_or(stmts.len(), |i| i + 1);

        let mut next = next;
        for stmt in stmts[..end].iter().rev() {
            next = self.lower_stmt(stmt, next);
        }
        next
    }

    fn lower_stmt(&mut self, stmt: &Stmt, next: NodeId) -> NodeId {
        match stmt {
            Stmt::Assign { target, value } => self.push(NodeKind::Assign {
                target: target.clone(),
                value: value.clone(),
                next,
            }),
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let on_true = self.lower_block(then_branch, next);
                let on_false = self.lower_block(else_branch, next);
                self.push(NodeKind::Branch {
                    cond: cond.clone(),
                    on_true,
                    on_false,
                    loop_header: false,
                })
            }
            Stmt::While { cond, body } => {
                // The body needs the header id for its back edge, so patch after lowering
                let header = self.push(NodeKind::Branch {
                    cond: cond.clone(),
                    on_true: next,
                    on_false: next,
                    loop_header: true,
                });
                let body_start = self.lower_block(body, header);
                if let NodeKind::Branch { on_true, .. } = &mut self.nodes[header].kind {
                    *on_true = body_start;
                }
                header
            }
            Stmt::Return { value } => self.push(NodeKind::Return {
                value: value.clone(),
            }),
            Stmt::Raise { message } => self.push(NodeKind::Raise {
                message: message.clone(),
            }),
        }
    }
}

fn check_calls(stmts: &[Stmt]) -> Result<(), String> {
    fn check_expr(expr: &Expr) -> Result<(), String> {
        match expr {
            Expr::Int(_) | Expr::Bool(_) | Expr::Var(_) => Ok(()),
            Expr::Unary { operand, .. } => check_expr(operand),
            Expr::Binary { lhs, rhs, .. } => {
                check_expr(lhs)?;
                check_expr(rhs)
            }
            Expr::Call { function, args } => {
                if args.len() != function.arity() {
                    return Err(format!(
                        "{} expects {} argument(s), got {}",
                        function.name(),
                        function.arity(),
                        args.len()
                    ));
                }
                args.iter().try_for_each(check_expr)
            }
        }
    }

    for stmt in stmts {
        match stmt {
            Stmt::Assign { value, .. } => check_expr(value)?,
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                check_expr(cond)?;
                check_calls(then_branch)?;
                check_calls(else_branch)?;
            }
            Stmt::While { cond, body } => {
                check_expr(cond)?;
                check_calls(body)?;
            }
            Stmt::Return { value: Some(value) } => check_expr(value)?,
            Stmt::Return { value: None } | Stmt::Raise { .. } => {}
        }
    }
    Ok(())
}
