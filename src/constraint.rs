use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use crate::ir::{CmpOp, Field};
use crate::pointer::PointerVariable;
use crate::term::{Term, VarTerm, Rewrite};
use crate::session::Session;


/// survives substitution, so an unsat answer can be traced back to the constraints that were added
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintId(pub u64);

impl std::fmt::Display for ConstraintId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "c{}", self.0)
    }
}


/// `lhs op rhs`
#[derive(Debug, Clone)]
pub struct AtomicConstraint {
    pub lhs:    Term,
    pub op:     CmpOp,
    pub rhs:    Term,
    pub id:     ConstraintId,
}

impl PartialEq for AtomicConstraint {
    fn eq(&self, other: &Self) -> bool {
        self.op == other.op && self.lhs == other.lhs && self.rhs == other.rhs
    }
}

impl Eq for AtomicConstraint {}

impl Hash for AtomicConstraint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.lhs.hash(state);
        self.op.hash(state);
        self.rhs.hash(state);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Substituted {
    Unchanged,
    Changed(AtomicConstraint),
    /// became constant and was evaluated
    Resolved(bool),
    /// can no longer be modeled
    Dropped,
}

impl AtomicConstraint {
    pub fn new(lhs: Term, op: CmpOp, rhs: Term, session: &Session) -> Self {
        Self {
            lhs,
            op,
            rhs,
            id: session.fresh_constraint_id(),
        }
    }

    pub fn substitute(&self, insert: &Term, replace: &VarTerm) -> Substituted {
        self.rebuild(
            self.lhs.substitute(insert, replace),
            self.rhs.substitute(insert, replace),
        )
    }

    pub fn heap_substitute(&self, insert: &Term, replace: &VarTerm) -> Substituted {
        self.rebuild(
            self.lhs.heap_substitute(insert, replace),
            self.rhs.heap_substitute(insert, replace),
        )
    }

    pub fn substitute_field_read(&self, insert: &Term, base: &PointerVariable, field: &Field) -> Substituted {
        self.rebuild(
            self.lhs.substitute_field_read(insert, base, field),
            self.rhs.substitute_field_read(insert, base, field),
        )
    }

    fn rebuild(&self, lhs: Rewrite, rhs: Rewrite) -> Substituted {
        let (lhs, rhs) = match (lhs, rhs) {
            (Rewrite::Unsupported, _) | (_, Rewrite::Unsupported) => return Substituted::Dropped,
            (Rewrite::Unchanged, Rewrite::Unchanged) => return Substituted::Unchanged,
            (lhs, rhs) => (
                match lhs { Rewrite::Changed(t) => t, _ => self.lhs.clone() },
                match rhs { Rewrite::Changed(t) => t, _ => self.rhs.clone() },
            ),
        };
        Self {
            lhs,
            op: self.op,
            rhs,
            id: self.id,
        }.settle()
    }

    /// evaluate if constant
    pub fn settle(self) -> Substituted {
        if !self.is_constant() {
            return Substituted::Changed(self);
        }
        match self.evaluate() {
            Some(v) => Substituted::Resolved(v),
            None    => Substituted::Dropped,
        }
    }

    /// both sides literal, or a literal compared for equality with a heap location
    pub fn is_constant(&self) -> bool {
        if self.lhs.is_constant() && self.rhs.is_constant() {
            return true;
        }
        match self.op {
            CmpOp::Eq | CmpOp::Ne => {
                (self.lhs.is_constant() && self.rhs.is_heap_location())
                    || (self.lhs.is_heap_location() && self.rhs.is_constant())
            }
            _ => false,
        }
    }

    /// None if not constant or if folding a side overflows
    pub fn evaluate(&self) -> Option<bool> {
        if self.lhs.is_constant() && self.rhs.is_constant() {
            return Some(self.op.apply(self.lhs.evaluate()?, self.rhs.evaluate()?));
        }
        if !self.is_constant() {
            return None;
        }
        // a heap location is never null and never equal to a literal
        match self.op {
            CmpOp::Eq => Some(false),
            CmpOp::Ne => Some(true),
            _ => None,
        }
    }

    pub fn negate(&self) -> Self {
        Self {
            lhs:    self.lhs.clone(),
            op:     self.op.negate(),
            rhs:    self.rhs.clone(),
            id:     self.id,
        }
    }

    pub fn mentions(&self, var: &PointerVariable) -> bool {
        self.lhs.mentions(var) || self.rhs.mentions(var)
    }

    pub fn roots(&self) -> BTreeSet<PointerVariable> {
        let mut r = self.lhs.roots();
        r.extend(self.rhs.roots());
        r
    }

    pub fn vars(&self) -> Vec<&VarTerm> {
        let mut r = self.lhs.vars();
        r.extend(self.rhs.vars());
        r
    }

    pub fn to_smt(&self) -> String {
        format!("({} {} {})", self.op.smt(), self.lhs.to_smt(), self.rhs.to_smt())
    }
}

impl std::fmt::Display for AtomicConstraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.lhs, self.op, self.rhs)
    }
}
