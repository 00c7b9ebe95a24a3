//! Target-routine description
//!
//! A routine is handed to the concolic engine by a static-analysis front end
//! as structured statements over typed inputs. The engine never sees source
//! text; this IR is the whole contract.
//!
//! # Example
//!
//! ```rust
//! use pmetric_core::{Domain, Expr, Routine, Stmt};
//!
//! let routine = Routine::new("classify")
//!     .input("x", Domain::int(-100, 100))
//!     .with_body(vec![
//!         Stmt::if_else(
//!             Expr::var("x").gt(Expr::int(0)),
//!             vec![Stmt::ret(Expr::int(1))],
//!             vec![Stmt::ret(Expr::int(-1))],
//!         ),
//!     ]);
//! assert!(routine.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ============================================================================
// Values and domains
// ============================================================================

/// A concrete input or result value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Bool(bool),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Declared domain of an input variable
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Domain {
    /// Inclusive integer range
    Int { min: i64, max: i64 },
    Bool,
}

impl Domain {
    pub const fn int(min: i64, max: i64) -> Self {
        Domain::Int { min, max }
    }

    pub fn contains(&self, value: &Value) -> bool {
        match (self, value) {
            (Domain::Int { min, max }, Value::Int(v)) => min <= v && v <= max,
            (Domain::Bool, Value::Bool(_)) => true,
            _ => false,
        }
    }

    /// Value used when nothing constrains the variable: zero clamped into range, or `false`
    pub fn default_value(&self) -> Value {
        match self {
            Domain::Int { min, max } => Value::Int(0.clamp(*min, (*max).max(*min))),
            Domain::Bool => Value::Bool(false),
        }
    }

    /// Number of values in the domain
    pub fn size(&self) -> u128 {
        match self {
            Domain::Int { min, max } if max >= min => (i128::from(*max) - i128::from(*min) + 1) as u128,
            Domain::Int { .. } => 0,
            Domain::Bool => 2,
        }
    }
}

/// An input variable of the routine
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputDecl {
    pub name: String,
    pub domain: Domain,
}

// ============================================================================
// Expressions
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

/// Operations the symbolic model treats as opaque.
///
/// The interpreter knows their semantics; the symbolic executor concretises
/// them, so branches depending on them are resolved by concrete replay.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpaqueFn {
    Abs,
    Min,
    Max,
    /// Deterministic integer mix into [0, 1000)
    Hash,
}

impl OpaqueFn {
    pub fn name(&self) -> &'static str {
        match self {
            OpaqueFn::Abs => "abs",
            OpaqueFn::Min => "min",
            OpaqueFn::Max => "max",
            OpaqueFn::Hash => "hash",
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            OpaqueFn::Abs | OpaqueFn::Hash => 1,
            OpaqueFn::Min | OpaqueFn::Max => 2,
        }
    }

    /// Evaluate on concrete arguments; `None` on arity mismatch or overflow
    pub fn apply(&self, args: &[i64]) -> Option<i64> {
        if args.len() != self.arity() {
            return None;
        }
        match self {
            OpaqueFn::Abs => args[0].checked_abs(),
            OpaqueFn::Min => Some(args[0].min(args[1])),
            OpaqueFn::Max => Some(args[0].max(args[1])),
            OpaqueFn::Hash => {
                let mixed = (args[0] as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
                Some(((mixed >> 32) % 1000) as i64)
            }
        }
    }
}

/// Expression over inputs and locals
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Int(i64),
    Bool(bool),
    Var(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        function: OpaqueFn,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn int(value: i64) -> Self {
        Expr::Int(value)
    }

    pub fn bool(value: bool) -> Self {
        Expr::Bool(value)
    }

    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn not(operand: Expr) -> Self {
        Expr::unary(UnaryOp::Not, operand)
    }

    pub fn neg(operand: Expr) -> Self {
        Expr::unary(UnaryOp::Neg, operand)
    }

    pub fn call(function: OpaqueFn, args: Vec<Expr>) -> Self {
        Expr::Call { function, args }
    }

    pub fn add(self, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Add, self, rhs)
    }

    pub fn sub(self, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Sub, self, rhs)
    }

    pub fn mul(self, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Mul, self, rhs)
    }

    pub fn div(self, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Div, self, rhs)
    }

    pub fn rem(self, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Rem, self, rhs)
    }

    pub fn equals(self, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Eq, self, rhs)
    }

    pub fn not_equals(self, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Ne, self, rhs)
    }

    pub fn lt(self, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Lt, self, rhs)
    }

    pub fn le(self, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Le, self, rhs)
    }

    pub fn gt(self, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Gt, self, rhs)
    }

    pub fn ge(self, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Ge, self, rhs)
    }

    pub fn and(self, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::And, self, rhs)
    }

    pub fn or(self, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Or, self, rhs)
    }

    /// Collect every variable name read by this expression
    pub fn collect_vars(&self, vars: &mut BTreeSet<String>) {
        match self {
            Expr::Int(_) | Expr::Bool(_) => {}
            Expr::Var(name) => {
                vars.insert(name.clone());
            }
            Expr::Unary { operand, .. } => operand.collect_vars(vars),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_vars(vars);
                rhs.collect_vars(vars);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_vars(vars);
                }
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Int(v) => write!(f, "{}", v),
            Expr::Bool(b) => write!(f, "{}", b),
            Expr::Var(name) => write!(f, "{}", name),
            Expr::Unary { op: UnaryOp::Neg, operand } => write!(f, "-{}", operand),
            Expr::Unary { op: UnaryOp::Not, operand } => write!(f, "!{}", operand),
            Expr::Binary { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
            Expr::Call { function, args } => {
                write!(f, "{}(", function.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

// ============================================================================
// Statements
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stmt {
    Assign {
        target: String,
        value: Expr,
    },
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        #[serde(default)]
        else_branch: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    Return {
        #[serde(default)]
        value: Option<Expr>,
    },
    Raise {
        message: String,
    },
}

impl Stmt {
    pub fn assign(target: impl Into<String>, value: Expr) -> Self {
        Stmt::Assign {
            target: target.into(),
            value,
        }
    }

    pub fn if_then(cond: Expr, then_branch: Vec<Stmt>) -> Self {
        Stmt::If {
            cond,
            then_branch,
            else_branch: Vec::new(),
        }
    }

    pub fn if_else(cond: Expr, then_branch: Vec<Stmt>, else_branch: Vec<Stmt>) -> Self {
        Stmt::If {
            cond,
            then_branch,
            else_branch,
        }
    }

    pub fn while_loop(cond: Expr, body: Vec<Stmt>) -> Self {
        Stmt::While { cond, body }
    }

    pub fn ret(value: Expr) -> Self {
        Stmt::Return { value: Some(value) }
    }

    pub fn ret_none() -> Self {
        Stmt::Return { value: None }
    }

    pub fn raise(message: impl Into<String>) -> Self {
        Stmt::Raise {
            message: message.into(),
        }
    }
}

// ============================================================================
// Routine
// ============================================================================

/// A routine under test: typed inputs plus a structured body
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Routine {
    pub name: String,
    /// Inputs in source declaration order
    pub inputs: Vec<InputDecl>,
    pub body: Vec<Stmt>,
}

impl Routine {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn input(mut self, name: impl Into<String>, domain: Domain) -> Self {
        self.inputs.push(InputDecl {
            name: name.into(),
            domain,
        });
        self
    }

    pub fn with_body(mut self, body: Vec<Stmt>) -> Self {
        self.body = body;
        self
    }

    pub fn input_decl(&self, name: &str) -> Option<&InputDecl> {
        self.inputs.iter().find(|i| i.name == name)
    }

    /// Check the description is well formed.
    ///
    /// Inputs must be uniquely named with non-empty domains, and every
    /// variable read must be an input or assigned somewhere in the body.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("routine name cannot be blank".into());
        }

        let mut declared = BTreeSet::new();
        for input in &self.inputs {
            if !declared.insert(input.name.clone()) {
                return Err(format!("input '{}' declared twice", input.name));
            }
            if input.domain.size() == 0 {
                return Err(format!("input '{}' has an empty domain", input.name));
            }
        }

        let mut assigned = BTreeSet::new();
        let mut read = BTreeSet::new();
        collect_stmt_vars(&self.body, &mut assigned, &mut read);

        if let Some(unknown) = read
            .iter()
            .find(|name| !declared.contains(*name) && !assigned.contains(*name))
        {
            return Err(format!("variable '{}' is never declared or assigned", unknown));
        }

        Ok(())
    }
}

fn collect_stmt_vars(stmts: &[Stmt], assigned: &mut BTreeSet<String>, read: &mut BTreeSet<String>) {
    for stmt in stmts {
        match stmt {
            Stmt::Assign { target, value } => {
                assigned.insert(target.clone());
                value.collect_vars(read);
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                cond.collect_vars(read);
                collect_stmt_vars(then_branch, assigned, read);
                collect_stmt_vars(else_branch, assigned, read);
            }
            Stmt::While { cond, body } => {
                cond.collect_vars(read);
                collect_stmt_vars(body, assigned, read);
            }
            Stmt::Return { value: Some(value) } => value.collect_vars(read),
            Stmt::Return { value: None } | Stmt::Raise { .. } => {}
        }
    }
}
