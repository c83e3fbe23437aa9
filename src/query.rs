//! a path store and a heap store explored together.
//!
//! both halves see every instruction. the heap half may split into several
//! bindings, the path half into several cases; the result is every pairing of the two,
//! with the heap's variable renames replayed on the path side.

use std::rc::Rc;
use crate::constraint::AtomicConstraint;
use crate::edge::PointsToEdge;
use crate::error::{Refutation, Visit};
use crate::heap::HeapModel;
use crate::ir::{Instruction, Site, MethodId};
use crate::path::PathQuery;
use crate::pointer::PointerVariable;
use crate::pointsto::PointsToQuery;
use crate::rules::RuleSource;
use crate::session::Session;


#[derive(Clone)]
pub struct CombinedQuery {
    heap:       PointsToQuery,
    path:       PathQuery,
    optimistic: bool,
    feasible:   bool,
    session:    Rc<Session>,
}

impl CombinedQuery {
    pub fn new(session: Rc<Session>) -> Self {
        Self {
            heap:       PointsToQuery::new(session.clone()),
            path:       PathQuery::new(session.clone()),
            optimistic: false,
            feasible:   true,
            session,
        }
    }

    pub fn from_edge(session: Rc<Session>, edge: PointsToEdge) -> Result<Self, Refutation> {
        let mut q = Self::new(session);
        q.heap.add_edge(edge)?;
        Ok(q)
    }

    pub fn from_constraint(session: Rc<Session>, c: AtomicConstraint) -> Result<Self, Refutation> {
        let mut q = Self::new(session);
        q.path.add_constraint(c)?;
        Ok(q)
    }

    pub fn heap(&self) -> &PointsToQuery {
        &self.heap
    }

    pub fn path(&self) -> &PathQuery {
        &self.path
    }

    fn refute(&mut self, r: Refutation) -> Refutation {
        self.feasible = false;
        r
    }

    fn alive(&self) -> Result<(), Refutation> {
        if self.feasible && !self.heap.is_refuted() && !self.path.is_refuted() {
            Ok(())
        } else {
            Err(Refutation::AlreadyRefuted)
        }
    }

    /// a local that must point somewhere cannot also be required to be null
    fn null_conflict(&mut self) -> Result<(), Refutation> {
        let clash = self.heap.to_produce().iter()
            .filter(|e| e.is_root() && e.source.is_local())
            .find(|e| self.path.requires_null(&e.source))
            .map(|e|e.source.to_string());
        match clash {
            Some(local) => Err(self.refute(Refutation::NullConflict{local})),
            None => Ok(()),
        }
    }

    fn replay(&mut self, renames: Vec<(PointerVariable, PointerVariable)>) -> Result<(), Refutation> {
        for (from, to) in renames {
            self.path.rename(&from, &to)?;
        }
        Ok(())
    }

    /// `local.f == location` in the path store is a points-to fact and moves to the heap store
    fn promote(&mut self, heap: &dyn HeapModel) -> Result<(), Refutation> {
        for (l, f, loc) in self.path.take_heap_equalities() {
            let mut b = match PointerVariable::from_candidates(&self.session, heap.instances_of(&l)) {
                Some(b) => b,
                None => {
                    let r = Refutation::Narrowed{edge: format!("{} -> _", l)};
                    return Err(self.refute(r));
                }
            };
            let mut loc = loc;
            for (from, to) in self.heap.add_edge(PointsToEdge::root(l, b.clone()))? {
                if b == from {
                    b = to.clone();
                }
                if loc == from {
                    loc = to.clone();
                }
                self.path.rename(&from, &to)?;
            }
            let renames = self.heap.add_edge(PointsToEdge::field(b, f, loc))?;
            self.replay(renames)?;
        }
        let renames = self.heap.take_renames();
        self.replay(renames)
    }

    fn settle(&mut self, heap: &dyn HeapModel) -> Result<(), Refutation> {
        let renames = self.heap.take_renames();
        self.replay(renames)?;
        self.promote(heap)?;
        self.null_conflict()
    }

    pub fn visit(&mut self, instr: &Instruction, site: &Site, rules: &dyn RuleSource, heap: &dyn HeapModel) -> Visit<Self> {
        self.alive()?;
        self.null_conflict()?;

        let mut relevant = Vec::new();
        let mut shown_null = None;
        for r in rules.rules_for(instr, site, &self.session) {
            if r.shown.is_root() && r.shown.source.is_local() && self.path.requires_null(&r.shown.source) {
                shown_null.get_or_insert(r.shown.source.to_string());
            }
            if self.heap.is_rule_relevant(&r) {
                relevant.push(r);
            } else if self.path.is_relevant(&r.shown.source) && !site.in_loop {
                // the path store consumes this fact, remember it as produced
                self.heap.log_produced(r.shown);
            }
        }

        let path_siblings = match self.path.visit(instr, site, heap) {
            Ok(v) => v,
            Err(e) => return Err(self.refute(e)),
        };
        // the instruction makes a local non-null that the path needs to be null
        if let Some(local) = shown_null {
            return Err(self.refute(Refutation::NullConflict{local}));
        }
        let heap_siblings = match self.heap.visit(instr, site, &relevant, heap) {
            Ok(v) => v,
            Err(e) => return Err(self.refute(e)),
        };

        let mut paths = vec![self.path.clone()];
        paths.extend(path_siblings);
        let mut heaps = vec![self.heap.clone()];
        heaps.extend(heap_siblings);

        let mut live      = Vec::new();
        let mut first_err = None;
        for h in heaps {
            for p in &paths {
                let mut q = Self {
                    heap:       h.clone(),
                    path:       p.clone(),
                    optimistic: self.optimistic,
                    feasible:   true,
                    session:    self.session.clone(),
                };
                match q.settle(heap) {
                    Ok(()) => live.push(q),
                    Err(e) => {
                        first_err.get_or_insert(e);
                    }
                }
            }
        }
        if live.len() > 1 {
            debug!("{} splits into {} cases", instr_name(instr), live.len());
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

    pub fn enter_callee(&mut self, call: &Instruction, caller: &Site, callee: MethodId) -> Result<(), Refutation> {
        self.alive()?;
        let r = self.path.enter_callee(call, caller, callee)
            .and_then(|_| self.heap.enter_callee(call, caller, callee));
        r.map_err(|e| self.refute(e))
    }

    pub fn return_to_caller(&mut self, call: &Instruction, caller: &Site) -> Result<(), Refutation> {
        self.alive()?;
        let mut r = self.path.return_to_caller(call, caller)
            .and_then(|_| self.heap.return_to_caller(call, caller));
        if r.is_ok() {
            let renames = self.heap.take_renames();
            r = self.replay(renames).and_then(|_| self.null_conflict());
        }
        r.map_err(|e| self.refute(e))
    }

    pub fn skip_call(&mut self, call: &Instruction, caller: &Site) -> Result<(), Refutation> {
        self.alive()?;
        let r = self.path.skip_call(call, caller)
            .and_then(|_| self.heap.skip_call(call, caller));
        r.map_err(|e| self.refute(e))
    }

    /// the walker gives up on this path and reports it as reachable
    pub fn declare_witness(&mut self) {
        if !self.optimistic {
            info!("declaring an optimistic witness: {}", self);
            self.optimistic = true;
            self.session.note_optimistic_witness();
        }
    }

    pub fn is_optimistic(&self) -> bool {
        self.optimistic
    }

    pub fn check(&mut self) -> Result<(), Refutation> {
        self.alive()?;
        let r = self.heap.check().and_then(|_| self.path.check());
        r.map_err(|e| self.refute(e))
    }

    /// the heap half is checked first; the solver only runs if it survives
    pub fn is_feasible(&mut self) -> bool {
        self.feasible = self.feasible && self.heap.is_feasible() && self.path.is_feasible();
        self.feasible
    }

    pub fn found_witness(&self) -> bool {
        self.feasible && self.heap.found_witness() && self.path.found_witness()
    }
}

fn instr_name(instr: &Instruction) -> String {
    let s = format!("{:?}", instr);
    s.split(|c: char| !c.is_alphanumeric()).next().unwrap_or("").to_string()
}

impl std::fmt::Display for CombinedQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.feasible {
            return write!(f, "refuted");
        }
        write!(f, "{} | {}", self.heap, self.path)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Options;
    use crate::heap::HeapGraph;
    use crate::ir::{AllocSite, CmpOp, Field, Operand};
    use crate::pointer::Instance;
    use crate::rules::{DependencyRule, HeapRules};
    use crate::term::Term;

    fn m() -> Site {
        Site::new(MethodId(1))
    }

    fn alloc(id: u32) -> Instance {
        Instance::Alloc(AllocSite{id, class: "A".to_string(), method: MethodId(1)})
    }

    fn v(l: u32) -> PointerVariable {
        PointerVariable::local(MethodId(1), l)
    }

    #[test]
    fn field_equality_moves_to_the_heap() {
        let s = Session::offline(Options::default());
        let f = Field::named("A", "f");
        let mut heap = HeapGraph::new();
        heap.root(Instance::Local{method: MethodId(1), local: 1}, vec![alloc(9)])
            .edge(alloc(9), f.clone(), alloc(1));

        let c = AtomicConstraint::new(Term::var(v(2)), CmpOp::Eq, Term::var(PointerVariable::Concrete(alloc(1))), &s);
        let mut q = CombinedQuery::from_constraint(s.clone(), c).unwrap();
        let instr = Instruction::Load{def: 2, base: 1, field: f.clone()};
        let siblings = q.visit(&instr, &m(), &HeapRules::new(&heap), &heap).unwrap();
        assert!(siblings.is_empty());

        assert!(q.path().is_empty());
        let owed : Vec<PointsToEdge> = q.heap().to_produce().iter().cloned().collect();
        assert_eq!(owed, vec![
            PointsToEdge::root(v(1), PointerVariable::Concrete(alloc(9))),
            PointsToEdge::field(PointerVariable::Concrete(alloc(9)), f, PointerVariable::Concrete(alloc(1))),
        ]);
        assert!(!q.found_witness());
    }

    #[test]
    fn null_requirement_conflicts_with_an_obligation() {
        let s = Session::offline(Options::default());
        let c = AtomicConstraint::new(Term::var(v(1)), CmpOp::Eq, Term::Const(0), &s);
        let mut q = CombinedQuery::from_constraint(s.clone(), c).unwrap();
        q.heap.add_edge(PointsToEdge::root(v(1), PointerVariable::Concrete(alloc(1)))).unwrap();
        let heap = HeapGraph::new();
        match q.visit(&Instruction::Nop, &m(), &Vec::<DependencyRule>::new(), &heap) {
            Err(Refutation::NullConflict{..}) => (),
            other => panic!("{:?}", other.map(|v|v.len())),
        }
        assert!(!q.is_feasible());
    }

    #[test]
    fn rule_showing_a_null_local_refutes() {
        let s = Session::offline(Options::default());
        let f = Field::named("A", "f");
        let mut heap = HeapGraph::new();
        heap.root(Instance::Local{method: MethodId(1), local: 2}, vec![alloc(9)])
            .edge(alloc(9), f.clone(), alloc(1));

        let c = AtomicConstraint::new(Term::var(v(1)), CmpOp::Eq, Term::Const(0), &s);
        let mut q = CombinedQuery::from_constraint(s.clone(), c).unwrap();
        let instr = Instruction::Load{def: 1, base: 2, field: f};
        match q.visit(&instr, &m(), &HeapRules::new(&heap), &heap) {
            Err(Refutation::NullConflict{local}) => assert_eq!(local, v(1).to_string()),
            other => panic!("{:?}", other.map(|v|v.len())),
        }
        assert!(!q.is_feasible());
    }

    #[test]
    fn either_half_refuting_refutes_the_query() {
        let s = Session::offline(Options::default());
        let heap = HeapGraph::new();
        let mut q = CombinedQuery::from_edge(s.clone(), PointsToEdge::root(v(1), PointerVariable::Concrete(alloc(1)))).unwrap();
        assert!(q.is_feasible());

        let mut branch = q.clone();
        let taken = Instruction::Branch{op: CmpOp::Lt, lhs: Operand::Const(1), rhs: Operand::Const(0), taken: true};
        assert!(branch.visit(&taken, &m(), &Vec::<DependencyRule>::new(), &heap).is_err());
        assert!(!branch.is_feasible());

        let null = Instruction::Assign{def: 1, value: Operand::Null};
        assert!(q.visit(&null, &m(), &HeapRules::new(&heap), &heap).is_err());
        assert!(!q.is_feasible());
    }

    #[test]
    fn witness_needs_both_halves_empty() {
        let s = Session::offline(Options::default());
        let heap = HeapGraph::new();
        let site = AllocSite{id: 1, class: "A".to_string(), method: MethodId(1)};
        let mut q = CombinedQuery::from_edge(s.clone(), PointsToEdge::root(v(1), PointerVariable::Concrete(alloc(1)))).unwrap();
        q.path.add_constraint(AtomicConstraint::new(Term::var(v(3)), CmpOp::Gt, Term::Const(0), &s)).unwrap();

        q.visit(&Instruction::New{def: 1, site}, &m(), &HeapRules::new(&heap), &heap).unwrap();
        assert!(q.heap().found_witness());
        assert!(!q.found_witness());

        q.visit(&Instruction::Assign{def: 3, value: Operand::Const(4)}, &m(), &HeapRules::new(&heap), &heap).unwrap();
        assert!(q.found_witness());
    }

    #[test]
    fn optimistic_witnesses_are_counted_once() {
        let s = Session::offline(Options::default());
        let mut q = CombinedQuery::new(s.clone());
        q.declare_witness();
        q.declare_witness();
        assert!(q.is_optimistic());
        assert_eq!(s.optimistic_witnesses(), 1);
    }
}
