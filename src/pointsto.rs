//! the heap half of a query.
//!
//! `to_produce` holds the points-to facts the explored path still owes. they are
//! discharged by dependency rules: a rule that shows an open edge replaces it with
//! its own preconditions. `produced` logs what was discharged, so later rules can
//! be checked against bindings that are already fixed.

use std::collections::BTreeSet;
use std::rc::Rc;
use crate::edge::PointsToEdge;
use crate::error::{Refutation, Visit};
use crate::heap::HeapModel;
use crate::ir::{Instruction, Operand, Site, MethodId};
use crate::path::local;
use crate::pointer::{Instance, PointerVariable, Narrowed};
use crate::rules::DependencyRule;
use crate::session::Session;


/// how a rule could discharge one open edge
#[derive(Debug, Clone)]
struct Binding {
    obligation: PointsToEdge,
    source:     PointerVariable,
    sink:       PointerVariable,
}

enum Classified {
    Consistent(Vec<Binding>),
    Inconsistent,
    Inapplicable,
}


#[derive(Clone)]
pub struct PointsToQuery {
    to_produce: BTreeSet<PointsToEdge>,
    produced:   Vec<PointsToEdge>,
    /// variable replacements the path store has not seen yet
    renames:    Vec<(PointerVariable, PointerVariable)>,
    feasible:   bool,
    session:    Rc<Session>,
}

impl PointsToQuery {
    pub fn new(session: Rc<Session>) -> Self {
        Self {
            to_produce: BTreeSet::new(),
            produced:   Vec::new(),
            renames:    Vec::new(),
            feasible:   true,
            session,
        }
    }

    pub fn with_edge(session: Rc<Session>, edge: PointsToEdge) -> Result<Self, Refutation> {
        let mut q = Self::new(session);
        q.add_edge(edge)?;
        Ok(q)
    }

    pub fn to_produce(&self) -> &BTreeSet<PointsToEdge> {
        &self.to_produce
    }

    pub fn produced(&self) -> &[PointsToEdge] {
        &self.produced
    }

    pub fn is_refuted(&self) -> bool {
        !self.feasible
    }

    pub(crate) fn take_renames(&mut self) -> Vec<(PointerVariable, PointerVariable)> {
        std::mem::replace(&mut self.renames, Vec::new())
    }

    fn narrowing(&self) -> bool {
        self.session.options.narrow_from_constraints
    }

    fn refute(&mut self, r: Refutation) -> Refutation {
        debug!("heap refuted: {}", r);
        self.feasible = false;
        r
    }

    /// replace a variable everywhere without telling the path store
    fn replace(&mut self, from: &PointerVariable, to: &PointerVariable) {
        if from == to {
            return;
        }
        let swap = |e: &PointsToEdge| e.substitute(from, to).unwrap_or_else(||e.clone());
        self.to_produce = self.to_produce.iter().map(swap).collect();
        self.produced   = self.produced.iter().map(swap).collect();
    }

    fn rename(&mut self, from: &PointerVariable, to: &PointerVariable) {
        if from == to {
            return;
        }
        debug!("{} := {}", from, to);
        self.replace(from, to);
        self.renames.push((from.clone(), to.clone()));
    }

    pub(crate) fn log_produced(&mut self, edge: PointsToEdge) {
        if !self.produced.contains(&edge) {
            self.produced.push(edge);
        }
    }

    /// add an obligation. a uniquely identified source can only be bound once, so a
    /// second obligation on it merges into the first. returns the renames it caused
    pub fn add_edge(&mut self, edge: PointsToEdge) -> Result<Vec<(PointerVariable, PointerVariable)>, Refutation> {
        if !self.feasible {
            return Err(Refutation::AlreadyRefuted);
        }
        edge.source.check();
        edge.sink.check();

        let existing = if edge.source.is_unique() {
            self.to_produce.iter().find(|e| e.source == edge.source && e.field == edge.field).cloned()
        } else {
            None
        };
        let existing = match existing {
            Some(v) => v,
            None => {
                debug!("heap += {}", edge);
                self.to_produce.insert(edge);
                return Ok(Vec::new());
            }
        };

        let merged = match existing.sink.merge(&edge.sink, &self.session, self.narrowing()) {
            Some(v) => v,
            None => {
                let r = Refutation::EmptyIntersection{edge: format!("{} and {}", existing, edge)};
                return Err(self.refute(r));
            }
        };
        let mut renames = Vec::new();
        for old in &[existing.sink, edge.sink] {
            if old != &merged && old.is_symbolic() {
                self.rename(old, &merged);
                renames.push((old.clone(), merged.clone()));
            }
        }
        Ok(renames)
    }

    /// the rule's shown edge touches something this store talks about
    pub fn is_rule_relevant(&self, rule: &DependencyRule) -> bool {
        let ends = [&rule.shown.source, &rule.shown.sink];
        self.to_produce.iter().chain(self.produced.iter()).any(|e| {
            ends.iter().any(|v| v.overlaps(&e.source) || v.overlaps(&e.sink))
        })
    }

    fn classify(&self, rule: &DependencyRule) -> Classified {
        let shown   = &rule.shown;
        let narrow  = self.narrowing();

        // a uniquely identified root that was already produced with something else
        if shown.source.is_unique() {
            let clash = self.produced.iter().any(|e| {
                e.field == shown.field
                    && e.source == shown.source
                    && e.sink.merge(&shown.sink, &self.session, narrow).is_none()
            });
            if clash {
                return Classified::Inconsistent;
            }
        }

        let mut inconsistent = false;
        let mut bindings     = Vec::new();
        for o in &self.to_produce {
            if o.field != shown.field {
                continue;
            }
            let source = match o.source.merge(&shown.source, &self.session, narrow) {
                Some(v) => v,
                None    => continue,
            };
            let sink = match o.sink.merge(&shown.sink, &self.session, narrow) {
                Some(v) => v,
                None => {
                    if source.is_unique() {
                        inconsistent = true;
                    }
                    continue;
                }
            };
            let b = Binding {
                obligation: o.clone(),
                source,
                sink,
            };
            if self.preconditions_agree(rule, &b) {
                bindings.push(b);
            } else {
                inconsistent = true;
            }
        }

        if !bindings.is_empty() {
            Classified::Consistent(bindings)
        } else if inconsistent {
            Classified::Inconsistent
        } else {
            Classified::Inapplicable
        }
    }

    /// preconditions on uniquely identified roots must be compatible with what is already bound
    fn preconditions_agree(&self, rule: &DependencyRule, b: &Binding) -> bool {
        let narrow = self.narrowing();
        let rule = rule
            .rename(&rule.shown.source, &b.source)
            .rename(&rule.shown.sink, &b.sink);
        let rebind = |e: &PointsToEdge| {
            let e = e.substitute(&b.obligation.source, &b.source).unwrap_or_else(||e.clone());
            e.substitute(&b.obligation.sink, &b.sink).unwrap_or(e)
        };
        let bound : Vec<PointsToEdge> = self.to_produce.iter()
            .filter(|e| *e != &b.obligation)
            .chain(self.produced.iter())
            .map(rebind)
            .collect();

        rule.to_show.iter().filter(|pre| pre.source.is_unique()).all(|pre| {
            bound.iter()
                .filter(|e| e.source == pre.source && e.field == pre.field)
                .all(|e| e.sink.merge(&pre.sink, &self.session, narrow).is_some())
        })
    }

    fn apply(&mut self, rule: &DependencyRule, b: Binding, site: &Site, heap: &dyn HeapModel) -> Result<(), Refutation> {
        debug!("applying {} to {}", rule, b.obligation);
        self.to_produce.remove(&b.obligation);
        self.rename(&b.obligation.source, &b.source);
        self.rename(&b.obligation.sink, &b.sink);

        let rule = rule
            .rename(&rule.shown.source, &b.source)
            .rename(&rule.shown.sink, &b.sink);

        let mut pending : Vec<PointsToEdge> = rule.to_show.into_iter().rev().collect();
        while let Some(pre) = pending.pop() {
            for (from, to) in self.add_edge(pre)? {
                pending = pending.iter().map(|e| e.substitute(&from, &to).unwrap_or_else(||e.clone())).collect();
            }
        }

        if !site.in_loop {
            self.log_produced(rule.shown);
        }
        self.narrow(heap)
    }

    /// intersect the ends of every field edge with what the heap model allows
    pub fn narrow(&mut self, heap: &dyn HeapModel) -> Result<(), Refutation> {
        if !self.narrowing() {
            return Ok(());
        }
        loop {
            let mut step = None;
            for e in &self.to_produce {
                let field = match &e.field {
                    Some(f) if !f.is_pseudo() => f,
                    _ => continue,
                };

                let sources = heap.instances_of(&e.source);
                if !sources.is_empty() {
                    let allowed : BTreeSet<Instance> = sources.iter().flat_map(|s|heap.points_to(s, field)).collect();
                    match e.sink.narrow(&allowed, &self.session) {
                        Narrowed::Same  => (),
                        Narrowed::Empty => {
                            step = Some(Err(Refutation::Narrowed{edge: e.to_string()}));
                            break;
                        }
                        Narrowed::To(v) => {
                            step = Some(Ok((e.sink.clone(), v)));
                            break;
                        }
                    }
                }

                if e.source.is_local() {
                    continue;
                }
                let sinks = heap.instances_of(&e.sink);
                if sinks.is_empty() {
                    continue;
                }
                let allowed : BTreeSet<Instance> = sinks.iter().flat_map(|t|heap.points_at(t, field)).collect();
                match e.source.narrow(&allowed, &self.session) {
                    Narrowed::Same  => (),
                    Narrowed::Empty => {
                        step = Some(Err(Refutation::Narrowed{edge: e.to_string()}));
                        break;
                    }
                    Narrowed::To(v) => {
                        step = Some(Ok((e.source.clone(), v)));
                        break;
                    }
                }
            }
            match step {
                None => return Ok(()),
                Some(Err(r)) => return Err(self.refute(r)),
                Some(Ok((from, to))) => self.rename(&from, &to),
            }
        }
    }

    /// the heap model does not know what runtime metadata points to
    fn forget_roots(&mut self, def: &PointerVariable) {
        let unknown : Vec<PointsToEdge> = self.to_produce.iter()
            .filter(|e| e.is_root() && &e.source == def)
            .cloned()
            .collect();
        for e in unknown {
            debug!("no model for {}, dropping it", e);
            self.to_produce.remove(&e);
        }
    }

    /// an open obligation on the local this instruction defines, if no rule can produce it
    fn unproduced_def(&self, instr: &Instruction, site: &Site) -> Option<PointsToEdge> {
        if let Instruction::Invoke{..} | Instruction::Metadata{..} = instr {
            return None;
        }
        let d = local(site, instr.def()?);
        self.to_produce.iter().find(|e| e.is_root() && e.source == d).cloned()
    }

    pub fn visit(&mut self, instr: &Instruction, site: &Site, rules: &[DependencyRule], heap: &dyn HeapModel) -> Visit<Self> {
        if !self.feasible {
            return Err(Refutation::AlreadyRefuted);
        }
        if let Instruction::Return{value} = instr {
            self.visit_return(site, value.as_ref())?;
            return Ok(Vec::new());
        }
        let relevant : Vec<DependencyRule> = rules.iter().filter(|r|self.is_rule_relevant(r)).cloned().collect();
        self.dispatch(instr, site, relevant, heap)
    }

    /// classify the relevant rules and branch once per way to apply one
    pub(crate) fn dispatch(&mut self, instr: &Instruction, site: &Site, rules: Vec<DependencyRule>, heap: &dyn HeapModel) -> Visit<Self> {
        if !self.feasible {
            return Err(Refutation::AlreadyRefuted);
        }

        let mut applications   = Vec::new();
        let mut inconsistent   = 0;
        let mut keep_unapplied = false;
        for rule in rules {
            match self.classify(&rule) {
                Classified::Consistent(bindings) => {
                    if !rule.shown.source.is_unique() {
                        keep_unapplied = true;
                    }
                    for b in bindings {
                        applications.push((rule.clone(), b));
                    }
                }
                Classified::Inconsistent => {
                    debug!("inconsistent: {}", rule);
                    inconsistent += 1;
                }
                Classified::Inapplicable => (),
            }
        }

        if applications.is_empty() {
            if inconsistent > 0 {
                return Err(self.refute(Refutation::NoConsistentRule{inconsistent}));
            }
            if let Some(e) = self.unproduced_def(instr, site) {
                return Err(self.refute(Refutation::NullBinding{edge: e.to_string()}));
            }
            if let Instruction::Metadata{def} = instr {
                self.forget_roots(&local(site, *def));
            }
            return Ok(Vec::new());
        }

        let mut live      = Vec::new();
        let mut first_err = None;
        for (rule, b) in applications {
            let mut q = self.clone();
            match q.apply(&rule, b, site, heap) {
                Ok(())  => live.push(q),
                Err(e)  => {
                    first_err.get_or_insert(e);
                }
            }
        }
        if keep_unapplied {
            live.push(self.clone());
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

    /// obligations on the return slot move to the returned local
    fn visit_return(&mut self, site: &Site, value: Option<&Operand>) -> Result<(), Refutation> {
        let ret = PointerVariable::Concrete(Instance::Return(site.method));
        let moving : Vec<PointsToEdge> = self.to_produce.iter().filter(|e|e.source == ret).cloned().collect();
        if moving.is_empty() {
            return Ok(());
        }
        let v = match value {
            Some(Operand::Local(l)) => local(site, *l),
            _ => return Err(self.refute(Refutation::NullBinding{edge: moving[0].to_string()})),
        };
        for e in moving {
            self.to_produce.remove(&e);
            if let Some(e) = e.substitute(&ret, &v) {
                self.add_edge(e)?;
            }
        }
        Ok(())
    }

    /// obligations on the call result move to the callee's return slot
    pub fn enter_callee(&mut self, call: &Instruction, caller: &Site, callee: MethodId) -> Result<(), Refutation> {
        if !self.feasible {
            return Err(Refutation::AlreadyRefuted);
        }
        let def = match call {
            Instruction::Invoke{def, ..} => *def,
            _ => panic!("ICE: entering a callee from {:?}", call),
        };
        if let Some(def) = def {
            let ret = PointerVariable::Concrete(Instance::Return(callee));
            self.replace(&local(caller, def), &ret);
        }
        Ok(())
    }

    /// leave the callee through its entry: formals become actuals, and nothing else
    /// of the callee frame may still be owed
    pub fn return_to_caller(&mut self, call: &Instruction, caller: &Site) -> Result<(), Refutation> {
        if !self.feasible {
            return Err(Refutation::AlreadyRefuted);
        }
        let (callee, args) = match call {
            Instruction::Invoke{callee, args, ..} => (callee, args),
            _ => panic!("ICE: returning to a caller through {:?}", call),
        };
        let frame = Site::new(callee.id);

        let mut moving = Vec::new();
        for (formal, actual) in callee.params.iter().zip(args) {
            let f = local(&frame, *formal);
            let on_formal : Vec<PointsToEdge> = self.to_produce.iter().filter(|e|e.source == f).cloned().collect();
            for e in on_formal {
                self.to_produce.remove(&e);
                match actual {
                    Operand::Local(a) => {
                        if let Some(e) = e.substitute(&f, &local(caller, *a)) {
                            moving.push(e);
                        }
                    }
                    Operand::Const(_) | Operand::Null => {
                        return Err(self.refute(Refutation::NullBinding{edge: e.to_string()}));
                    }
                }
            }
        }
        // formals sharing an actual merge here
        for e in moving {
            self.add_edge(e)?;
        }

        if caller.method == callee.id {
            return Ok(());
        }
        let m = callee.id;
        if let Some(e) = self.to_produce.iter().find(|e| e.source.method() == Some(m)).cloned() {
            return Err(self.refute(Refutation::Unproducible{edge: e.to_string()}));
        }
        self.produced.retain(|e| e.source.method() != Some(m) && e.sink.method() != Some(m));
        Ok(())
    }

    /// the callee is not explored. obligations it could have produced are given up
    pub fn skip_call(&mut self, call: &Instruction, caller: &Site) -> Result<(), Refutation> {
        if !self.feasible {
            return Err(Refutation::AlreadyRefuted);
        }
        let (def, callee) = match call {
            Instruction::Invoke{def, callee, ..} => (def, callee),
            _ => panic!("ICE: skipping a call through {:?}", call),
        };
        let d = (*def).map(|d|local(caller, d));
        let modifies = &callee.modifies;
        self.to_produce = std::mem::replace(&mut self.to_produce, BTreeSet::new()).into_iter().filter(|e| {
            let havoc = Some(&e.source) == d.as_ref()
                || e.field.as_ref().map(|f|modifies.contains(f)).unwrap_or(false)
                || match &e.source {
                    PointerVariable::Concrete(Instance::Static(f)) => modifies.contains(f),
                    _ => false,
                };
            if havoc {
                debug!("giving up {}", e);
            }
            !havoc
        }).collect();
        Ok(())
    }

    pub fn check(&self) -> Result<(), Refutation> {
        if self.feasible {
            Ok(())
        } else {
            Err(Refutation::AlreadyRefuted)
        }
    }

    pub fn is_feasible(&self) -> bool {
        self.feasible
    }

    pub fn found_witness(&self) -> bool {
        self.feasible && self.to_produce.is_empty()
    }
}

impl std::fmt::Display for PointsToQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.feasible {
            return write!(f, "refuted");
        }
        if self.to_produce.is_empty() {
            return write!(f, "emp");
        }
        let parts : Vec<String> = self.to_produce.iter().map(|e|e.to_string()).collect();
        write!(f, "{}", parts.join(" * "))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Options;
    use crate::heap::HeapGraph;
    use crate::ir::{AllocSite, Field, Method, MethodKind};
    use crate::rules::{HeapRules, RuleSource};

    fn m() -> Site {
        Site::new(MethodId(1))
    }

    fn alloc(id: u32) -> Instance {
        Instance::Alloc(AllocSite{id, class: "A".to_string(), method: MethodId(1)})
    }

    fn a(id: u32) -> PointerVariable {
        PointerVariable::Concrete(alloc(id))
    }

    fn v(l: u32) -> PointerVariable {
        PointerVariable::local(MethodId(1), l)
    }

    fn f() -> Field {
        Field::named("A", "f")
    }

    fn sym(s: &Session, ids: &[u32]) -> PointerVariable {
        PointerVariable::from_candidates(s, ids.iter().map(|i|alloc(*i)).collect()).unwrap()
    }

    #[test]
    fn disjoint_rule_on_a_unique_source_refutes() {
        let s = Session::offline(Options::default());
        let heap = HeapGraph::new();
        let mut q = PointsToQuery::with_edge(s.clone(), PointsToEdge::field(v(1), f(), a(1))).unwrap();
        let rule = DependencyRule::new(PointsToEdge::field(v(1), f(), a(2)), vec![], MethodId(1));
        assert!(q.is_rule_relevant(&rule));
        match q.visit(&Instruction::Nop, &m(), &[rule], &heap) {
            Err(Refutation::NoConsistentRule{inconsistent: 1}) => (),
            other => panic!("{:?}", other.map(|v|v.len())),
        }
        assert!(q.is_refuted());
    }

    #[test]
    fn narrowing_pins_a_symbolic_sink() {
        let s = Session::offline(Options::default());
        let mut heap = HeapGraph::new();
        heap.edge(alloc(9), f(), alloc(1));

        let target = sym(&s, &[1, 2]);
        let mut q = PointsToQuery::with_edge(s.clone(), PointsToEdge::field(a(9), f(), target.clone())).unwrap();
        q.narrow(&heap).unwrap();
        assert_eq!(q.to_produce().iter().cloned().collect::<Vec<_>>(), vec![PointsToEdge::field(a(9), f(), a(1))]);
        assert_eq!(q.take_renames(), vec![(target, a(1))]);
    }

    #[test]
    fn narrowing_to_nothing_refutes() {
        let s = Session::offline(Options::default());
        let mut heap = HeapGraph::new();
        heap.edge(alloc(9), f(), alloc(3));
        let mut q = PointsToQuery::with_edge(s.clone(), PointsToEdge::field(a(9), f(), sym(&s, &[1, 2]))).unwrap();
        assert!(q.narrow(&heap).is_err());
    }

    #[test]
    fn narrowing_can_be_turned_off() {
        let mut options = Options::default();
        options.narrow_from_constraints = false;
        let s = Session::offline(options);
        let mut heap = HeapGraph::new();
        heap.edge(alloc(9), f(), alloc(3));
        let mut q = PointsToQuery::with_edge(s.clone(), PointsToEdge::field(a(9), f(), sym(&s, &[1, 2]))).unwrap();
        q.narrow(&heap).unwrap();
        assert!(!q.is_refuted());
    }

    #[test]
    fn same_root_obligations_merge() {
        let s = Session::offline(Options::default());
        let mut q = PointsToQuery::with_edge(s.clone(), PointsToEdge::root(v(1), sym(&s, &[1, 2, 3]))).unwrap();
        q.add_edge(PointsToEdge::root(v(1), sym(&s, &[2, 3, 4]))).unwrap();
        assert_eq!(q.to_produce().len(), 1);
        let e = q.to_produce().iter().next().unwrap();
        assert_eq!(e.sink.candidates(), [alloc(2), alloc(3)].iter().cloned().collect());

        assert!(q.add_edge(PointsToEdge::root(v(1), a(7))).is_err());
        assert!(q.is_refuted());
    }

    #[test]
    fn allocation_discharges_a_root() {
        let s = Session::offline(Options::default());
        let heap = HeapGraph::new();
        let site = AllocSite{id: 1, class: "A".to_string(), method: MethodId(1)};
        let mut q = PointsToQuery::with_edge(s.clone(), PointsToEdge::root(v(1), sym(&s, &[1, 2]))).unwrap();
        let instr = Instruction::New{def: 1, site};
        let rules = HeapRules::new(&heap).rules_for(&instr, &m(), &s);
        let siblings = q.visit(&instr, &m(), &rules, &heap).unwrap();
        assert!(siblings.is_empty());
        assert!(q.found_witness());
        assert_eq!(q.produced(), &[PointsToEdge::root(v(1), a(1))]);
    }

    #[test]
    fn null_assignment_refutes() {
        let s = Session::offline(Options::default());
        let heap = HeapGraph::new();
        let mut q = PointsToQuery::with_edge(s.clone(), PointsToEdge::root(v(1), a(1))).unwrap();
        let instr = Instruction::Assign{def: 1, value: Operand::Null};
        let rules = HeapRules::new(&heap).rules_for(&instr, &m(), &s);
        match q.visit(&instr, &m(), &rules, &heap) {
            Err(Refutation::NullBinding{..}) => (),
            other => panic!("{:?}", other.map(|v|v.len())),
        }
    }

    #[test]
    fn class_literal_forgets_what_it_cannot_model() {
        let s = Session::offline(Options::default());
        let mut heap = HeapGraph::new();
        heap.root(Instance::Local{method: MethodId(1), local: 1}, vec![alloc(5)]);
        let mut q = PointsToQuery::with_edge(s.clone(), PointsToEdge::root(v(1), a(5))).unwrap();
        let instr = Instruction::Metadata{def: 1};
        let rules = HeapRules::new(&heap).rules_for(&instr, &m(), &s);
        let siblings = q.visit(&instr, &m(), &rules, &heap).unwrap();
        assert!(siblings.is_empty());
        assert!(!q.is_refuted());
        assert!(q.to_produce().is_empty());
    }

    #[test]
    fn store_splits_and_keeps_an_unapplied_branch() {
        let s = Session::offline(Options::default());
        let mut heap = HeapGraph::new();
        heap.root(Instance::Local{method: MethodId(1), local: 1}, vec![alloc(1)])
            .root(Instance::Local{method: MethodId(1), local: 2}, vec![alloc(5)])
            .edge(alloc(1), f(), alloc(5));

        let mut q = PointsToQuery::with_edge(s.clone(), PointsToEdge::field(a(1), f(), a(5))).unwrap();
        let instr = Instruction::Store{base: 1, field: f(), value: Operand::Local(2)};
        let rules = HeapRules::new(&heap).rules_for(&instr, &m(), &s);
        let siblings = q.visit(&instr, &m(), &rules, &heap).unwrap();

        // applied: the store now owes v1 -> A#1 and v2 -> A#5
        let owed : Vec<PointsToEdge> = q.to_produce().iter().cloned().collect();
        assert_eq!(owed, vec![PointsToEdge::root(v(1), a(1)), PointsToEdge::root(v(2), a(5))]);
        // not applied: the abstract location may be another object
        assert_eq!(siblings.len(), 1);
        assert_eq!(siblings[0].to_produce().iter().cloned().collect::<Vec<_>>(), vec![PointsToEdge::field(a(1), f(), a(5))]);
    }

    #[test]
    fn loops_do_not_log_produced_edges() {
        let s = Session::offline(Options::default());
        let heap = HeapGraph::new();
        let site = AllocSite{id: 1, class: "A".to_string(), method: MethodId(1)};
        let mut q = PointsToQuery::with_edge(s.clone(), PointsToEdge::root(v(1), a(1))).unwrap();
        let instr = Instruction::New{def: 1, site};
        let in_loop = Site{method: MethodId(1), in_loop: true};
        let rules = HeapRules::new(&heap).rules_for(&instr, &in_loop, &s);
        q.visit(&instr, &in_loop, &rules, &heap).unwrap();
        assert!(q.found_witness());
        assert!(q.produced().is_empty());
    }

    #[test]
    fn formals_sharing_an_actual_must_agree() {
        let s = Session::offline(Options::default());
        let callee = Method{
            id:         MethodId(2),
            class:      "A".to_string(),
            name:       "pair".to_string(),
            params:     vec![0, 1],
            kind:       MethodKind::Normal,
            modifies:   vec![],
        };
        let p0 = PointerVariable::local(MethodId(2), 0);
        let p1 = PointerVariable::local(MethodId(2), 1);
        let call = Instruction::Invoke{def: None, callee, args: vec![Operand::Local(7), Operand::Local(7)]};

        let mut q = PointsToQuery::with_edge(s.clone(), PointsToEdge::root(p0.clone(), a(1))).unwrap();
        q.add_edge(PointsToEdge::root(p1.clone(), a(2))).unwrap();
        assert!(q.clone().return_to_caller(&call, &m()).is_err());

        let mut q = PointsToQuery::with_edge(s.clone(), PointsToEdge::root(p0, a(1))).unwrap();
        q.add_edge(PointsToEdge::root(p1, sym(&s, &[1, 2]))).unwrap();
        q.return_to_caller(&call, &m()).unwrap();
        assert_eq!(q.to_produce().iter().cloned().collect::<Vec<_>>(), vec![PointsToEdge::root(v(7), a(1))]);
    }

    #[test]
    fn callee_locals_cannot_survive_the_entry() {
        let s = Session::offline(Options::default());
        let callee = Method{
            id:         MethodId(2),
            class:      "A".to_string(),
            name:       "get".to_string(),
            params:     vec![],
            kind:       MethodKind::Normal,
            modifies:   vec![],
        };
        let call = Instruction::Invoke{def: Some(3), callee, args: vec![]};
        let mut q = PointsToQuery::with_edge(s.clone(), PointsToEdge::root(v(3), a(1))).unwrap();
        q.enter_callee(&call, &m(), MethodId(2)).unwrap();
        let inner = Site::new(MethodId(2));
        q.visit(&Instruction::Return{value: Some(Operand::Local(4))}, &inner, &[], &HeapGraph::new()).unwrap();
        assert_eq!(q.to_string(), "v4@m2 -> new A#1");
        match q.return_to_caller(&call, &m()) {
            Err(Refutation::Unproducible{..}) => (),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn copies_are_independent() {
        let s = Session::offline(Options::default());
        let original = PointsToQuery::with_edge(s.clone(), PointsToEdge::root(v(1), a(1))).unwrap();
        let mut copy = original.clone();
        assert!(copy.add_edge(PointsToEdge::root(v(1), a(2))).is_err());
        assert!(copy.is_refuted());
        assert!(original.is_feasible());
        assert_eq!(original.to_produce().len(), 1);
    }
}
