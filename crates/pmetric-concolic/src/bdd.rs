//! BDD-based propositional skeleton check
//!
//! Every distinct linear atom and boolean input of a constraint set becomes
//! one BDD variable, and the constraints are conjoined over those
//! variables. If the resulting BDD is `false` the path is infeasible for
//! purely propositional reasons (a condition and its negation, say) and no
//! solver call is needed.
//!
//! This is a cheap pre-filter using the biodivine-lib-bdd library; a
//! satisfiable skeleton says nothing about the arithmetic.

use biodivine_lib_bdd::{Bdd, BddVariable, BddVariableSet, BddVariableSetBuilder};
use pmetric_core::{Atom, Formula, PathConstraintSet};
use std::collections::HashMap;

/// Result of a skeleton check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkeletonCheck {
    /// False when the propositional skeleton alone is contradictory
    pub satisfiable: bool,
    pub stats: BddStats,
}

/// BDD operation statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BddStats {
    /// Number of BDD variables created
    pub variables: usize,
    /// Number of BDD nodes in final result
    pub nodes: usize,
}

/// Check the boolean skeleton of a constraint set
pub fn check_skeleton(constraints: &PathConstraintSet) -> SkeletonCheck {
    let formulas: Vec<&Formula> = constraints.constraints.iter().map(|c| &c.formula).collect();

    let mut atoms: Vec<&Atom> = Vec::new();
    let mut bools: Vec<&str> = Vec::new();
    for formula in &formulas {
        for atom in formula.atoms() {
            if !atoms.contains(&atom) {
                atoms.push(atom);
            }
        }
        for name in formula.bool_vars() {
            if !bools.contains(&name) {
                bools.push(name);
            }
        }
    }

    let mut builder = BddVariableSetBuilder::new();
    let atom_vars: Vec<BddVariable> = (0..atoms.len())
        .map(|i| builder.make_variable(&format!("a{}", i)))
        .collect();
    let bool_vars: HashMap<&str, BddVariable> = bools
        .iter()
        .enumerate()
        .map(|(i, name)| (*name, builder.make_variable(&format!("b{}", i))))
        .collect();
    let vars = builder.build();

    let encoder = Encoder {
        vars: &vars,
        atoms: &atoms,
        atom_vars: &atom_vars,
        bool_vars: &bool_vars,
    };

    let mut skeleton = vars.mk_true();
    for formula in &formulas {
        skeleton = skeleton.and(&encoder.encode(formula));
        if skeleton.is_false() {
            break;
        }
    }

    SkeletonCheck {
        satisfiable: !skeleton.is_false(),
        stats: BddStats {
            variables: atoms.len() + bools.len(),
            nodes: skeleton.size(),
        },
    }
}

struct Encoder<'a> {
    vars: &'a BddVariableSet,
    atoms: &'a [&'a Atom],
    atom_vars: &'a [BddVariable],
    bool_vars: &'a HashMap<&'a str, BddVariable>,
}

impl Encoder<'_> {
    fn encode(&self, formula: &Formula) -> Bdd {
        match formula {
            Formula::Const(true) => self.vars.mk_true(),
            Formula::Const(false) => self.vars.mk_false(),
            Formula::Var(name) => self
                .bool_vars
                .get(name.as_str())
                .map_or_else(|| self.vars.mk_true(), |v| self.vars.mk_var(*v)),
            Formula::Atom(atom) => self
                .atoms
                .iter()
                .position(|a| *a == atom)
                .map_or_else(|| self.vars.mk_true(), |i| self.vars.mk_var(self.atom_vars[i])),
            Formula::Not(inner) => self.encode(inner).not(),
            Formula::And(parts) => parts
                .iter()
                .fold(self.vars.mk_true(), |acc, p| acc.and(&self.encode(p))),
            Formula::Or(parts) => parts
                .iter()
                .fold(self.vars.mk_false(), |acc, p| acc.or(&self.encode(p))),
        }
    }
}
