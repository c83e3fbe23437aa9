//! the scalar half of a query: a conjunction of atomic constraints over the
//! values the explored path still has to produce.

use std::collections::BTreeSet;
use std::rc::Rc;
use crate::constraint::{AtomicConstraint, Substituted};
use crate::error::{Refutation, Visit};
use crate::heap::HeapModel;
use crate::ir::{Instruction, Operand, Site, Local, Field, CmpOp, NumType, SwitchLabel, MethodKind, MethodId, UnaryOp};
use crate::pointer::{Instance, PointerVariable};
use crate::session::Session;
use crate::smt::{self, SatResult};
use crate::term::{Term, VarTerm, ArithOp};


pub(crate) fn local(site: &Site, l: Local) -> PointerVariable {
    PointerVariable::local(site.method, l)
}

pub(crate) fn operand(site: &Site, op: &Operand) -> Term {
    match op {
        Operand::Local(l)   => Term::var(local(site, *l)),
        Operand::Const(v)   => Term::Const(*v),
        Operand::Null       => Term::Const(0),
    }
}

fn integral(ty: NumType) -> bool {
    match ty {
        NumType::Int | NumType::Long => true,
        NumType::Float | NumType::Double => false,
    }
}


#[derive(Clone)]
pub struct PathQuery {
    constraints:    Vec<AtomicConstraint>,
    path_vars:      BTreeSet<PointerVariable>,
    encoding:       String,
    ints:           Vec<String>,
    checked:        bool,
    feasible:       bool,
    session:        Rc<Session>,
}

impl PathQuery {
    pub fn new(session: Rc<Session>) -> Self {
        Self {
            constraints:    Vec::new(),
            path_vars:      BTreeSet::new(),
            encoding:       smt::and(&[]),
            ints:           Vec::new(),
            checked:        true,
            feasible:       true,
            session,
        }
    }

    pub fn with_constraint(session: Rc<Session>, c: AtomicConstraint) -> Result<Self, Refutation> {
        let mut q = Self::new(session);
        q.add_constraint(c)?;
        Ok(q)
    }

    pub fn constraints(&self) -> &[AtomicConstraint] {
        &self.constraints
    }

    pub fn path_vars(&self) -> &BTreeSet<PointerVariable> {
        &self.path_vars
    }

    /// the conjunction as the solver sees it
    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn is_relevant(&self, v: &PointerVariable) -> bool {
        self.path_vars.contains(v)
    }

    pub fn is_refuted(&self) -> bool {
        !self.feasible
    }

    /// the store holds `v == 0`
    pub fn requires_null(&self, v: &PointerVariable) -> bool {
        let bare = Term::var(v.clone());
        let zero = Term::Const(0);
        self.constraints.iter().any(|c| {
            c.op == CmpOp::Eq && ((c.lhs == bare && c.rhs == zero) || (c.lhs == zero && c.rhs == bare))
        })
    }

    fn refute(&mut self, r: Refutation) -> Refutation {
        debug!("path refuted: {}", r);
        self.feasible = false;
        r
    }

    fn rebuild(&mut self) {
        let mut parts       = Vec::new();
        let mut ints        = BTreeSet::new();
        let mut heaplocs    = BTreeSet::new();
        let mut path_vars   = BTreeSet::new();
        for c in &self.constraints {
            parts.push(c.to_smt());
            for v in c.vars() {
                let name = v.smt_name();
                if v.fields.is_empty() && v.base.is_heap_location() {
                    heaplocs.insert(name.clone());
                }
                ints.insert(name);
                path_vars.insert(v.base.clone());
            }
        }
        for h in heaplocs {
            parts.push(format!("(distinct {} 0)", h));
        }
        self.encoding   = smt::and(&parts);
        self.ints       = ints.into_iter().collect();
        self.path_vars  = path_vars;
        self.checked    = false;
    }

    /// constant constraints are decided here. anything beyond the configured cap is refused
    pub fn add_constraint(&mut self, c: AtomicConstraint) -> Result<(), Refutation> {
        if !self.feasible {
            return Err(Refutation::AlreadyRefuted);
        }
        let id   = c.id;
        let text = c.to_string();
        match c.settle() {
            Substituted::Unchanged | Substituted::Resolved(true) => Ok(()),
            Substituted::Resolved(false) => {
                Err(self.refute(Refutation::Contradiction{constraint: id, text}))
            }
            Substituted::Dropped => {
                debug!("not adding unfoldable {}", text);
                Ok(())
            }
            Substituted::Changed(c) => {
                if self.constraints.contains(&c) {
                    return Ok(());
                }
                if self.constraints.len() >= self.session.options.max_path_constraints {
                    warn!("path store holds {} constraints, refusing {}", self.constraints.len(), c);
                    return Ok(());
                }
                debug!("path += {}", c);
                self.constraints.push(c);
                self.rebuild();
                Ok(())
            }
        }
    }

    fn update<F>(&mut self, f: F) -> Result<bool, Refutation>
        where F: Fn(&AtomicConstraint) -> Substituted
    {
        if !self.feasible {
            return Err(Refutation::AlreadyRefuted);
        }
        let mut changed         = false;
        let mut contradiction   = None;
        let mut next : Vec<AtomicConstraint> = Vec::with_capacity(self.constraints.len());
        for c in &self.constraints {
            let n = match f(c) {
                Substituted::Unchanged => c.clone(),
                Substituted::Changed(n) => {
                    debug!("{} => {}", c, n);
                    changed = true;
                    n
                }
                Substituted::Resolved(true) => {
                    debug!("{} => true", c);
                    changed = true;
                    continue;
                }
                Substituted::Resolved(false) => {
                    contradiction = Some(Refutation::Contradiction{constraint: c.id, text: c.to_string()});
                    break;
                }
                Substituted::Dropped => {
                    debug!("dropping {}", c);
                    changed = true;
                    continue;
                }
            };
            if !next.contains(&n) {
                next.push(n);
            }
        }
        if let Some(r) = contradiction {
            return Err(self.refute(r));
        }
        if changed {
            self.constraints = next;
            self.rebuild();
        }
        Ok(changed)
    }

    pub fn substitute(&mut self, insert: &Term, replace: &VarTerm) -> Result<bool, Refutation> {
        self.update(|c|c.substitute(insert, replace))
    }

    pub fn heap_substitute(&mut self, insert: &Term, replace: &VarTerm) -> Result<bool, Refutation> {
        self.update(|c|c.heap_substitute(insert, replace))
    }

    pub fn substitute_field_read(&mut self, insert: &Term, base: &PointerVariable, field: &Field) -> Result<bool, Refutation> {
        self.update(|c|c.substitute_field_read(insert, base, field))
    }

    /// replace a pointer variable everywhere, including under field chains
    pub fn rename(&mut self, from: &PointerVariable, to: &PointerVariable) -> Result<bool, Refutation> {
        if !self.is_relevant(from) {
            return Ok(false);
        }
        self.substitute(&Term::var(to.clone()), &VarTerm::new(from.clone()))
    }

    fn drop_where<F>(&mut self, f: F) -> bool
        where F: Fn(&AtomicConstraint) -> bool
    {
        let before = self.constraints.len();
        self.constraints.retain(|c| {
            if f(c) {
                debug!("dropping {}", c);
                false
            } else {
                true
            }
        });
        if self.constraints.len() == before {
            return false;
        }
        self.rebuild();
        true
    }

    pub fn drop_constraints_mentioning(&mut self, v: &PointerVariable) -> bool {
        if !self.is_relevant(v) {
            return false;
        }
        self.drop_where(|c|c.mentions(v))
    }

    /// first level fields read through `base`
    fn fields_read_through(&self, base: &PointerVariable) -> BTreeSet<Field> {
        self.constraints.iter()
            .flat_map(|c|c.vars())
            .filter(|v| &v.base == base)
            .filter_map(|v| v.fields.first().cloned())
            .collect()
    }

    fn reads_field(&self, field: &Field) -> bool {
        self.constraints.iter()
            .flat_map(|c|c.vars())
            .any(|v| v.fields.first() == Some(field))
    }

    /// `def` now holds `value`. None means the value has no model
    fn define(&mut self, def: PointerVariable, value: Option<Term>) -> Result<(), Refutation> {
        if !self.is_relevant(&def) {
            return Ok(());
        }
        match value {
            Some(t) => {
                let t = match t.evaluate() {
                    Some(v) => Term::Const(v),
                    None    => t,
                };
                self.substitute(&t, &VarTerm::new(def))?;
            }
            None => {
                self.drop_constraints_mentioning(&def);
            }
        }
        Ok(())
    }

    /// `def` is compared against zero and nothing else
    fn only_sign_tests(&self, def: &PointerVariable) -> bool {
        let bare = Term::var(def.clone());
        self.constraints.iter().filter(|c|c.mentions(def)).all(|c| {
            (c.lhs == bare && c.rhs == Term::Const(0)) || (c.lhs == Term::Const(0) && c.rhs == bare)
        })
    }

    fn split<F>(&mut self, alternatives: usize, mut f: F) -> Visit<Self>
        where F: FnMut(usize, &mut Self) -> Result<(), Refutation>
    {
        let mut live        = Vec::new();
        let mut first_err   = None;
        for n in 0..alternatives {
            let mut q = self.clone();
            match f(n, &mut q) {
                Ok(())  => live.push(q),
                Err(e)  => {
                    first_err.get_or_insert(e);
                }
            }
        }
        let mut live = live.into_iter();
        match live.next() {
            Some(q) => {
                *self = q;
                Ok(live.collect())
            }
            None => {
                let e = first_err.unwrap_or(Refutation::AlreadyRefuted);
                Err(self.refute(e))
            }
        }
    }

    pub fn visit(&mut self, instr: &Instruction, site: &Site, heap: &dyn HeapModel) -> Visit<Self> {
        if !self.feasible {
            return Err(Refutation::AlreadyRefuted);
        }
        match instr {
            Instruction::Assign{def, value} | Instruction::CheckCast{def, value} => {
                let d = local(site, *def);
                if self.is_relevant(&d) {
                    self.substitute(&operand(site, value), &VarTerm::new(d))?;
                }
            }
            Instruction::New{def, site: alloc} => {
                self.allocate(local(site, *def), PointerVariable::alloc(alloc.clone()), None)?;
            }
            Instruction::NewArray{def, site: alloc, length} => {
                self.allocate(local(site, *def), PointerVariable::alloc(alloc.clone()), Some(operand(site, length)))?;
            }
            Instruction::Load{def, base, field} => {
                let d = local(site, *def);
                if self.is_relevant(&d) {
                    self.heap_substitute(&Term::read(local(site, *base), field.clone()), &VarTerm::new(d))?;
                }
            }
            Instruction::StaticLoad{def, field} => {
                let d = local(site, *def);
                if self.is_relevant(&d) {
                    let root = PointerVariable::Concrete(Instance::Static(field.clone()));
                    self.heap_substitute(&Term::var(root), &VarTerm::new(d))?;
                }
            }
            Instruction::Store{base, field, value} => {
                self.store(local(site, *base), field, operand(site, value), heap)?;
            }
            Instruction::StaticStore{field, value} => {
                let root = PointerVariable::Concrete(Instance::Static(field.clone()));
                if self.is_relevant(&root) {
                    self.substitute(&operand(site, value), &VarTerm::new(root))?;
                }
            }
            Instruction::ArrayLoad{def, array, index} => {
                self.array_load(site, *def, *array, index)?;
            }
            Instruction::ArrayStore{array, index, value} => {
                return self.array_store(site, *array, index, value, heap);
            }
            Instruction::ArrayLength{def, array} => {
                let d = local(site, *def);
                if self.is_relevant(&d) {
                    self.heap_substitute(&Term::read(local(site, *array), Field::ArrayLength), &VarTerm::new(d))?;
                }
            }
            Instruction::Binary{def, op, lhs, rhs, ty} => {
                let value = match (ArithOp::from_binary(*op), ty) {
                    (Some(op), NumType::Int) => Some(Term::binop(operand(site, lhs), op, operand(site, rhs))),
                    _ => None,
                };
                self.define(local(site, *def), value)?;
            }
            Instruction::Unary{def, op: UnaryOp::Neg, value, ty} => {
                let value = match ty {
                    NumType::Int => Some(Term::binop(Term::Const(0), ArithOp::Sub, operand(site, value))),
                    _ => None,
                };
                self.define(local(site, *def), value)?;
            }
            Instruction::Compare{def, lhs, rhs, ty} => {
                let d = local(site, *def);
                let (l, r) = (operand(site, lhs), operand(site, rhs));
                let value = match (l.evaluate(), r.evaluate()) {
                    (Some(a), Some(b)) => Some(Term::Const(a.cmp(&b) as i64)),
                    _ if integral(*ty) && self.only_sign_tests(&d) => Some(Term::binop(l, ArithOp::Diff, r)),
                    _ => None,
                };
                self.define(d, value)?;
            }
            Instruction::Conversion{def, value, from, to} => {
                let value = match (from, to) {
                    (NumType::Int, NumType::Int)
                    | (NumType::Int, NumType::Long)
                    | (NumType::Long, NumType::Long) => Some(operand(site, value)),
                    _ => None,
                };
                self.define(local(site, *def), value)?;
            }
            Instruction::InstanceOf{def, ..} | Instruction::Metadata{def} => {
                self.define(local(site, *def), None)?;
            }
            Instruction::Branch{op, lhs, rhs, taken} => {
                let op = if *taken { *op } else { op.negate() };
                let c = AtomicConstraint::new(operand(site, lhs), op, operand(site, rhs), &self.session);
                self.add_constraint(c)?;
            }
            Instruction::Switch{scrutinee, cases, label} => {
                let s = operand(site, scrutinee);
                match label {
                    SwitchLabel::Default => {
                        for v in cases {
                            let c = AtomicConstraint::new(s.clone(), CmpOp::Ne, Term::Const(*v), &self.session);
                            self.add_constraint(c)?;
                        }
                    }
                    SwitchLabel::Cases(values) => {
                        if values.is_empty() {
                            return Ok(Vec::new());
                        }
                        let session = self.session.clone();
                        return self.split(values.len(), |n, q| {
                            q.add_constraint(AtomicConstraint::new(s.clone(), CmpOp::Eq, Term::Const(values[n]), &session))
                        });
                    }
                }
            }
            Instruction::Return{value} => {
                let ret = PointerVariable::Concrete(Instance::Return(site.method));
                if let Some(value) = value {
                    if self.is_relevant(&ret) {
                        self.substitute(&operand(site, value), &VarTerm::new(ret))?;
                    }
                }
            }
            Instruction::Invoke{..} | Instruction::Nop => (),
        }
        Ok(Vec::new())
    }

    /// reads through the fresh object see default values
    fn allocate(&mut self, def: PointerVariable, object: PointerVariable, length: Option<Term>) -> Result<(), Refutation> {
        if !self.is_relevant(&def) {
            return Ok(());
        }
        if let Some(length) = length {
            self.substitute_field_read(&length, &def, &Field::ArrayLength)?;
        }
        for f in self.fields_read_through(&def) {
            self.substitute_field_read(&Term::Const(0), &def, &f)?;
        }
        self.substitute(&Term::var(object), &VarTerm::new(def))?;
        Ok(())
    }

    fn store(&mut self, base: PointerVariable, field: &Field, value: Term, heap: &dyn HeapModel) -> Result<(), Refutation> {
        if !self.reads_field(field) {
            return Ok(());
        }
        self.substitute_field_read(&value, &base, field)?;
        self.drop_where(|c| c.vars().iter().any(|v| {
            v.base != base && v.fields.first() == Some(field) && heap.may_alias(&v.base, &base)
        }));
        Ok(())
    }

    fn array_load(&mut self, site: &Site, def: Local, array: Local, index: &Operand) -> Result<(), Refutation> {
        let d = local(site, def);
        if !self.is_relevant(&d) {
            return Ok(());
        }
        if !self.session.options.index_sensitivity {
            self.drop_constraints_mentioning(&d);
            return Ok(());
        }
        let n = self.session.fresh_id();
        let element = Term::Var(VarTerm{
            base:   local(site, array),
            fields: vec![Field::ArrayElement(n)],
        });
        self.heap_substitute(&element, &VarTerm::new(d))?;
        let c = AtomicConstraint::new(
            Term::var(PointerVariable::Concrete(Instance::Index(n))),
            CmpOp::Eq,
            operand(site, index),
            &self.session,
        );
        self.add_constraint(c)
    }

    /// every element read through the stored-to array either is this slot or is not
    fn array_store(&mut self, site: &Site, array: Local, index: &Operand, value: &Operand, heap: &dyn HeapModel) -> Visit<Self> {
        let a = local(site, array);
        let is_element = |f: Option<&Field>| match f {
            Some(Field::ArrayElement(_)) => true,
            _ => false,
        };

        if !self.session.options.index_sensitivity {
            self.drop_where(|c| c.vars().iter().any(|v| is_element(v.fields.first()) && heap.may_alias(&v.base, &a)));
            return Ok(Vec::new());
        }

        self.drop_where(|c| c.vars().iter().any(|v| {
            v.base != a && is_element(v.fields.first()) && heap.may_alias(&v.base, &a)
        }));

        let slots : Vec<u64> = self.fields_read_through(&a).into_iter().filter_map(|f| match f {
            Field::ArrayElement(n) => Some(n),
            _ => None,
        }).collect();
        if slots.is_empty() {
            return Ok(Vec::new());
        }

        let value   = operand(site, value);
        let index   = operand(site, index);
        let session = self.session.clone();
        let mut branches = vec![self.clone()];
        let mut first_err = None;
        for n in slots {
            let idx = Term::var(PointerVariable::Concrete(Instance::Index(n)));
            let mut next = Vec::new();
            for q in branches {
                let mut same = q.clone();
                let r = same.substitute_field_read(&value, &a, &Field::ArrayElement(n))
                    .and_then(|_| same.add_constraint(AtomicConstraint::new(idx.clone(), CmpOp::Eq, index.clone(), &session)));
                match r {
                    Ok(())  => next.push(same),
                    Err(e)  => { first_err.get_or_insert(e); }
                }

                let mut other = q;
                match other.add_constraint(AtomicConstraint::new(idx.clone(), CmpOp::Ne, index.clone(), &session)) {
                    Ok(())  => next.push(other),
                    Err(e)  => { first_err.get_or_insert(e); }
                }
            }
            branches = next;
        }

        let mut live = branches.into_iter();
        match live.next() {
            Some(q) => {
                *self = q;
                Ok(live.collect())
            }
            None => {
                let e = first_err.unwrap_or(Refutation::AlreadyRefuted);
                Err(self.refute(e))
            }
        }
    }

    /// the call result is whatever the callee returns
    pub fn enter_callee(&mut self, call: &Instruction, caller: &Site, callee: MethodId) -> Result<(), Refutation> {
        let def = match call {
            Instruction::Invoke{def, ..} => *def,
            _ => panic!("ICE: entering a callee from {:?}", call),
        };
        if let Some(def) = def {
            let d = local(caller, def);
            if self.is_relevant(&d) {
                let ret = PointerVariable::Concrete(Instance::Return(callee));
                self.substitute(&Term::var(ret), &VarTerm::new(d))?;
            }
        }
        Ok(())
    }

    /// leave the callee through its entry: formals become actuals
    pub fn return_to_caller(&mut self, call: &Instruction, caller: &Site) -> Result<(), Refutation> {
        let (callee, args) = match call {
            Instruction::Invoke{callee, args, ..} => (callee, args),
            _ => panic!("ICE: returning to a caller through {:?}", call),
        };
        let frame = Site::new(callee.id);

        match callee.kind {
            MethodKind::Constructor => {
                if let Some(this) = callee.params.first() {
                    let this = local(&frame, *this);
                    for f in self.fields_read_through(&this) {
                        self.substitute_field_read(&Term::Const(0), &this, &f)?;
                    }
                }
            }
            MethodKind::ClassInit => {
                let statics : Vec<PointerVariable> = self.path_vars.iter().filter(|v| match v {
                    PointerVariable::Concrete(Instance::Static(f)) => f.declaring_class() == Some(callee.class.as_str()),
                    _ => false,
                }).cloned().collect();
                for s in statics {
                    self.substitute(&Term::Const(0), &VarTerm::new(s))?;
                }
            }
            MethodKind::Normal => (),
        }

        for (formal, actual) in callee.params.iter().zip(args) {
            self.substitute(&operand(caller, actual), &VarTerm::new(local(&frame, *formal)))?;
        }

        if caller.method != callee.id {
            let m = callee.id;
            self.drop_where(|c| c.roots().iter().any(|v| v.method() == Some(m)));
        }
        Ok(())
    }

    /// the callee is not explored. its result and everything it may write are unknown
    pub fn skip_call(&mut self, call: &Instruction, caller: &Site) -> Result<(), Refutation> {
        let (def, callee) = match call {
            Instruction::Invoke{def, callee, ..} => (def, callee),
            _ => panic!("ICE: skipping a call through {:?}", call),
        };
        if let Some(def) = def {
            self.drop_constraints_mentioning(&local(caller, *def));
        }
        let modifies = &callee.modifies;
        if !modifies.is_empty() {
            self.drop_where(|c| c.vars().iter().any(|v| {
                v.fields.iter().any(|f|modifies.contains(f)) || match &v.base {
                    PointerVariable::Concrete(Instance::Static(f)) => modifies.contains(f),
                    _ => false,
                }
            }));
        }
        Ok(())
    }

    /// ask the solver, unless this exact conjunction was already answered
    pub fn check(&mut self) -> Result<(), Refutation> {
        if !self.feasible {
            return Err(Refutation::AlreadyRefuted);
        }
        if self.constraints.is_empty() || self.checked {
            return Ok(());
        }
        let r = self.session.check(&self.encoding, &self.ints);
        self.checked = true;
        match r {
            SatResult::Unsat => {
                let constraints = self.constraints.iter().map(|c|c.id).collect();
                Err(self.refute(Refutation::Unsat{constraints}))
            }
            SatResult::Sat | SatResult::Unknown => Ok(()),
        }
    }

    pub fn is_feasible(&mut self) -> bool {
        self.check().is_ok()
    }

    pub fn found_witness(&self) -> bool {
        self.feasible && self.constraints.is_empty()
    }

    /// removes `local.f == location` constraints and returns them as `(local, f, location)`
    pub(crate) fn take_heap_equalities(&mut self) -> Vec<(PointerVariable, Field, PointerVariable)> {
        let mut found = Vec::new();
        let mut keep  = Vec::new();
        for c in std::mem::replace(&mut self.constraints, Vec::new()) {
            let hit = match (&c.lhs, c.op, &c.rhs) {
                (Term::Var(v), CmpOp::Eq, loc) | (loc, CmpOp::Eq, Term::Var(v))
                    if loc.is_heap_location() && v.fields.len() == 1 && v.base.is_local() && !v.fields[0].is_pseudo() =>
                {
                    match loc {
                        Term::Var(l) => Some((v.base.clone(), v.fields[0].clone(), l.base.clone())),
                        _ => None,
                    }
                }
                _ => None,
            };
            match hit {
                Some(h) => {
                    debug!("promoting {} to the heap store", c);
                    found.push(h);
                }
                None => keep.push(c),
            }
        }
        self.constraints = keep;
        if !found.is_empty() {
            self.rebuild();
        }
        found
    }
}

impl std::fmt::Display for PathQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.feasible {
            return write!(f, "refuted");
        }
        if self.constraints.is_empty() {
            return write!(f, "true");
        }
        let parts : Vec<String> = self.constraints.iter().map(|c|c.to_string()).collect();
        write!(f, "{}", parts.join(" && "))
    }
}
