use std::rc::Rc;
use std::collections::BTreeSet;
use std::convert::TryFrom;
use crate::ir::{Field, BinaryOp};
use crate::pointer::PointerVariable;


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    /// exact `lhs - rhs`, the sign of a three-way compare
    Diff,
}

const INT_MIN : i64 = i32::MIN as i64;

impl ArithOp {
    /// bitwise and shift operators have no model
    pub fn from_binary(op: BinaryOp) -> Option<Self> {
        match op {
            BinaryOp::Add => Some(ArithOp::Add),
            BinaryOp::Sub => Some(ArithOp::Sub),
            BinaryOp::Mul => Some(ArithOp::Mul),
            BinaryOp::Div => Some(ArithOp::Div),
            BinaryOp::Rem => Some(ArithOp::Rem),
            BinaryOp::And | BinaryOp::Or | BinaryOp::Xor
                | BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Ushr => None,
        }
    }

    /// java `int` arithmetic: wraps at 32 bits, truncating division.
    /// None on division by zero or an operand outside the `int` range
    pub fn apply(self, lhs: i64, rhs: i64) -> Option<i64> {
        if self == ArithOp::Diff {
            return lhs.checked_sub(rhs);
        }
        let l = i32::try_from(lhs).ok()?;
        let r = i32::try_from(rhs).ok()?;
        if r == 0 && matches!(self, ArithOp::Div | ArithOp::Rem) {
            return None;
        }
        let v = match self {
            ArithOp::Add  => l.wrapping_add(r),
            ArithOp::Sub  => l.wrapping_sub(r),
            ArithOp::Mul  => l.wrapping_mul(r),
            ArithOp::Div  => l.wrapping_div(r),
            ArithOp::Rem  => l.wrapping_rem(r),
            ArithOp::Diff => l.wrapping_sub(r),
        };
        Some(v as i64)
    }

    /// same semantics as `apply`, over unbounded solver integers
    pub fn to_smt(self, lhs: &str, rhs: &str) -> String {
        match self {
            ArithOp::Diff => format!("(- {} {})", lhs, rhs),
            ArithOp::Add  => wrap(&format!("(+ {} {})", lhs, rhs)),
            ArithOp::Sub  => wrap(&format!("(- {} {})", lhs, rhs)),
            ArithOp::Mul  => wrap(&format!("(* {} {})", lhs, rhs)),
            ArithOp::Div  => wrap(&tdiv(lhs, rhs)),
            ArithOp::Rem  => format!("(- {} (* {} {}))", lhs, rhs, tdiv(lhs, rhs)),
        }
    }
}

/// reduce into the `int` range the way two's complement overflow does
fn wrap(v: &str) -> String {
    format!("(- (mod (+ {} {}) {}) {})", v, -INT_MIN, 1i64 << 32, -INT_MIN)
}

/// division rounding toward zero. smt `div` rounds so the remainder is non negative
fn tdiv(lhs: &str, rhs: &str) -> String {
    format!("(ite (>= {l} 0) (div {l} {r}) (- (div (- {l}) {r})))", l = lhs, r = rhs)
}

impl std::fmt::Display for ArithOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Rem => "%",
            ArithOp::Diff => "-",
        })
    }
}


/// a pointer variable, optionally read through a chain of fields
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VarTerm {
    pub base:   PointerVariable,
    pub fields: Vec<Field>,
}

impl VarTerm {
    pub fn new(base: PointerVariable) -> Self {
        Self {
            base,
            fields: Vec::new(),
        }
    }

    pub fn read(base: PointerVariable, field: Field) -> Self {
        Self {
            base,
            fields: vec![field],
        }
    }

    /// `self` is `other` or a read through `other`
    fn rest_after(&self, other: &VarTerm) -> Option<&[Field]> {
        if self.base != other.base || !self.fields.starts_with(&other.fields) {
            return None;
        }
        Some(&self.fields[other.fields.len()..])
    }

    /// identifier the solver sees. symbolic variables are named by id only
    pub fn smt_name(&self) -> String {
        let mut name = match &self.base {
            PointerVariable::Symbolic{id, ..} => format!("_sym{}", id),
            PointerVariable::Concrete(i) => i.to_string(),
        };
        for f in &self.fields {
            name.push('.');
            name.push_str(&f.to_string());
        }
        format!("|{}|", name.replace(|c: char| c == '|' || c == '\\', "_"))
    }
}

impl std::fmt::Display for VarTerm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.base)?;
        for field in &self.fields {
            write!(f, ".{}", field)?;
        }
        Ok(())
    }
}


/// symbolic scalar expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    Const(i64),
    Var(VarTerm),
    BinOp(Rc<Term>, ArithOp, Rc<Term>),
}

/// outcome of a rewrite. `Unsupported` means the result has no model and the
/// constraint holding this term must go
#[derive(Debug, Clone, PartialEq)]
pub enum Rewrite {
    Unchanged,
    Changed(Term),
    Unsupported,
}

impl Term {
    pub fn var(base: PointerVariable) -> Self {
        Term::Var(VarTerm::new(base))
    }

    pub fn read(base: PointerVariable, field: Field) -> Self {
        Term::Var(VarTerm::read(base, field))
    }

    pub fn binop(lhs: Term, op: ArithOp, rhs: Term) -> Self {
        Term::BinOp(Rc::new(lhs), op, Rc::new(rhs))
    }

    /// plain substitution. a chain hanging off the replaced variable is only
    /// carried over when `insert` is a bare variable
    pub fn substitute(&self, insert: &Term, replace: &VarTerm) -> Rewrite {
        self.rewrite(&mut |v| {
            let rest = v.rest_after(replace)?;
            Some(if rest.is_empty() {
                Rewrite::Changed(insert.clone())
            } else {
                match insert {
                    Term::Var(iv) if iv.fields.is_empty() => Rewrite::Changed(Term::Var(VarTerm{
                        base:   iv.base.clone(),
                        fields: rest.to_vec(),
                    })),
                    _ => Rewrite::Unsupported,
                }
            })
        })
    }

    /// substitution where `insert` may itself be a heap read. chains are concatenated
    pub fn heap_substitute(&self, insert: &Term, replace: &VarTerm) -> Rewrite {
        self.rewrite(&mut |v| {
            let rest = v.rest_after(replace)?;
            Some(splice(insert, rest))
        })
    }

    /// replace the one level read `base.field` with `insert`
    pub fn substitute_field_read(&self, insert: &Term, base: &PointerVariable, field: &Field) -> Rewrite {
        self.rewrite(&mut |v| {
            if &v.base != base || v.fields.first() != Some(field) {
                return None;
            }
            Some(splice(insert, &v.fields[1..]))
        })
    }

    fn rewrite<F>(&self, f: &mut F) -> Rewrite
        where F: FnMut(&VarTerm) -> Option<Rewrite>
    {
        match self {
            Term::Const(_) => Rewrite::Unchanged,
            Term::Var(v) => f(v).unwrap_or(Rewrite::Unchanged),
            Term::BinOp(lhs, op, rhs) => {
                let l = lhs.rewrite(f);
                let r = rhs.rewrite(f);
                match (l, r) {
                    (Rewrite::Unsupported, _) | (_, Rewrite::Unsupported) => Rewrite::Unsupported,
                    (Rewrite::Unchanged, Rewrite::Unchanged) => Rewrite::Unchanged,
                    (l, r) => {
                        let l = match l { Rewrite::Changed(t) => Rc::new(t), _ => lhs.clone() };
                        let r = match r { Rewrite::Changed(t) => Rc::new(t), _ => rhs.clone() };
                        Rewrite::Changed(Term::BinOp(l, *op, r))
                    }
                }
            }
        }
    }

    /// fold a fully constant term
    pub fn evaluate(&self) -> Option<i64> {
        match self {
            Term::Const(v) => Some(*v),
            Term::Var(_) => None,
            Term::BinOp(lhs, op, rhs) => op.apply(lhs.evaluate()?, rhs.evaluate()?),
        }
    }

    pub fn is_constant(&self) -> bool {
        match self {
            Term::Const(_) => true,
            Term::Var(_) => false,
            Term::BinOp(lhs, _, rhs) => lhs.is_constant() && rhs.is_constant(),
        }
    }

    /// a bare reference to allocated objects. never null
    pub fn is_heap_location(&self) -> bool {
        match self {
            Term::Var(v) => v.fields.is_empty() && v.base.is_heap_location(),
            _ => false,
        }
    }

    pub fn vars(&self) -> Vec<&VarTerm> {
        let mut r = Vec::new();
        self.collect_vars(&mut r);
        r
    }

    fn collect_vars<'a>(&'a self, into: &mut Vec<&'a VarTerm>) {
        match self {
            Term::Const(_) => (),
            Term::Var(v) => into.push(v),
            Term::BinOp(lhs, _, rhs) => {
                lhs.collect_vars(into);
                rhs.collect_vars(into);
            }
        }
    }

    pub fn roots(&self) -> BTreeSet<PointerVariable> {
        self.vars().into_iter().map(|v|v.base.clone()).collect()
    }

    pub fn mentions(&self, var: &PointerVariable) -> bool {
        self.vars().into_iter().any(|v| &v.base == var)
    }

    pub fn to_smt(&self) -> String {
        match self {
            Term::Const(v) if *v < 0 => format!("(- {})", v.unsigned_abs()),
            Term::Const(v) => v.to_string(),
            Term::Var(v) => v.smt_name(),
            Term::BinOp(lhs, op, rhs) => op.to_smt(&lhs.to_smt(), &rhs.to_smt()),
        }
    }
}

fn splice(insert: &Term, rest: &[Field]) -> Rewrite {
    if rest.is_empty() {
        return Rewrite::Changed(insert.clone());
    }
    match insert {
        Term::Var(iv) => {
            let mut fields = iv.fields.clone();
            fields.extend_from_slice(rest);
            Rewrite::Changed(Term::Var(VarTerm{
                base: iv.base.clone(),
                fields,
            }))
        }
        _ => Rewrite::Unsupported,
    }
}

impl std::fmt::Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Term::Const(v)              => write!(f, "{}", v),
            Term::Var(v)                => write!(f, "{}", v),
            Term::BinOp(lhs, op, rhs)   => write!(f, "({} {} {})", lhs, op, rhs),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::MethodId;

    fn local(n: u32) -> PointerVariable {
        PointerVariable::local(MethodId(1), n)
    }

    fn f() -> Field {
        Field::named("A", "f")
    }

    #[test]
    fn substitute_without_occurrence_is_unchanged() {
        let t = Term::binop(Term::var(local(1)), ArithOp::Add, Term::Const(3));
        assert_eq!(t.substitute(&Term::Const(9), &VarTerm::new(local(2))), Rewrite::Unchanged);
        assert_eq!(t.heap_substitute(&Term::Const(9), &VarTerm::new(local(2))), Rewrite::Unchanged);
        assert_eq!(t.substitute_field_read(&Term::Const(9), &local(1), &f()), Rewrite::Unchanged);
    }

    #[test]
    fn substitute_inside_binop() {
        let t = Term::binop(Term::var(local(1)), ArithOp::Add, Term::Const(3));
        match t.substitute(&Term::Const(4), &VarTerm::new(local(1))) {
            Rewrite::Changed(t) => assert_eq!(t.evaluate(), Some(7)),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn chains_only_hang_off_variables() {
        let t = Term::read(local(1), f());
        assert_eq!(t.substitute(&Term::Const(0), &VarTerm::new(local(1))), Rewrite::Unsupported);
        assert_eq!(
            t.substitute(&Term::var(local(2)), &VarTerm::new(local(1))),
            Rewrite::Changed(Term::read(local(2), f()))
        );
        assert_eq!(
            t.substitute(&Term::read(local(2), f()), &VarTerm::new(local(1))),
            Rewrite::Unsupported
        );
    }

    #[test]
    fn heap_substitute_concatenates_chains() {
        let g = Field::named("B", "g");
        let t = Term::read(local(1), g.clone());
        let r = t.heap_substitute(&Term::read(local(2), f()), &VarTerm::new(local(1)));
        assert_eq!(r, Rewrite::Changed(Term::Var(VarTerm{
            base:   local(2),
            fields: vec![f(), g],
        })));
    }

    #[test]
    fn field_read_substitution() {
        let t = Term::read(local(1), f());
        assert_eq!(t.substitute_field_read(&Term::Const(5), &local(1), &f()), Rewrite::Changed(Term::Const(5)));
        assert_eq!(t.substitute_field_read(&Term::Const(5), &local(1), &Field::named("A", "g")), Rewrite::Unchanged);
        assert_eq!(Term::var(local(1)).substitute_field_read(&Term::Const(5), &local(1), &f()), Rewrite::Unchanged);
    }

    #[test]
    fn evaluation_refuses_overflow_and_zero_division() {
        assert_eq!(Term::binop(Term::Const(7), ArithOp::Rem, Term::Const(3)).evaluate(), Some(1));
        assert_eq!(Term::binop(Term::Const(7), ArithOp::Div, Term::Const(0)).evaluate(), None);
        assert_eq!(Term::binop(Term::Const(i64::MAX), ArithOp::Add, Term::Const(1)).evaluate(), None);
        assert_eq!(ArithOp::from_binary(BinaryOp::Xor), None);
    }

    #[test]
    fn int_arithmetic_wraps() {
        let max = i32::MAX as i64;
        assert_eq!(ArithOp::Add.apply(max, 1), Some(INT_MIN));
        assert_eq!(ArithOp::Sub.apply(INT_MIN, 1), Some(max));
        assert_eq!(ArithOp::Mul.apply(65536, 65536), Some(0));
        assert_eq!(ArithOp::Div.apply(INT_MIN, -1), Some(INT_MIN));
        assert_eq!(ArithOp::Rem.apply(INT_MIN, -1), Some(0));
        assert_eq!(ArithOp::Div.apply(-7, 2), Some(-3));
        assert_eq!(ArithOp::Rem.apply(-7, 2), Some(-1));
        assert_eq!(ArithOp::Rem.apply(7, 0), None);
        assert_eq!(ArithOp::Diff.apply(max, -1), Some(max + 1));
    }

    #[test]
    fn smt_rendering() {
        let t = Term::binop(Term::var(local(1)), ArithOp::Diff, Term::Const(-2));
        assert_eq!(t.to_smt(), "(- |v1@m1| (- 2))");
        let t = Term::binop(Term::var(local(1)), ArithOp::Add, Term::Const(1));
        assert_eq!(t.to_smt(), "(- (mod (+ (+ |v1@m1| 1) 2147483648) 4294967296) 2147483648)");
    }
}
