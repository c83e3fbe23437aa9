mod common;

use std::collections::BTreeSet;
use backsym::config::Options;
use backsym::constraint::AtomicConstraint;
use backsym::edge::PointsToEdge;
use backsym::heap::HeapGraph;
use backsym::ir::{AllocSite, CmpOp, Field, Instruction, MethodId, Operand, Site, SwitchLabel};
use backsym::pointer::{Instance, PointerVariable};
use backsym::pointsto::PointsToQuery;
use backsym::rules::{DependencyRule, HeapRules};
use backsym::session::Session;
use backsym::smt::SatResult;
use backsym::term::Term;
use backsym::{CombinedQuery, Refutation};
use test_log::test;

fn m() -> Site {
    Site::new(MethodId(1))
}

fn local(l: u32) -> PointerVariable {
    PointerVariable::local(MethodId(1), l)
}

fn site(id: u32, class: &str) -> AllocSite {
    AllocSite{id, class: class.to_string(), method: MethodId(1)}
}

fn alloc(id: u32) -> Instance {
    Instance::Alloc(site(id, "A"))
}

fn no_rules() -> Vec<DependencyRule> {
    Vec::new()
}

#[test]
fn allocation_satisfies_a_non_null_requirement() {
    let s = Session::offline(Options::default());
    let heap = HeapGraph::new();
    let c = AtomicConstraint::new(Term::var(local(1)), CmpOp::Ne, Term::Const(0), &s);
    let mut q = CombinedQuery::from_constraint(s.clone(), c).unwrap();

    let instr = Instruction::New{def: 1, site: site(1, "Foo")};
    let siblings = q.visit(&instr, &m(), &HeapRules::new(&heap), &heap).unwrap();
    assert!(siblings.is_empty());
    assert!(q.path().is_empty());
    assert!(q.found_witness());
}

#[test]
fn allocation_refutes_a_null_requirement() {
    let s = Session::offline(Options::default());
    let heap = HeapGraph::new();
    let c = AtomicConstraint::new(Term::var(local(1)), CmpOp::Eq, Term::Const(0), &s);
    let mut q = CombinedQuery::from_constraint(s.clone(), c).unwrap();

    let instr = Instruction::New{def: 1, site: site(1, "Foo")};
    match q.visit(&instr, &m(), &HeapRules::new(&heap), &heap) {
        Err(Refutation::Contradiction{..}) => (),
        other => panic!("{:?}", other.map(|v|v.len())),
    }
    assert!(!q.is_feasible());
}

#[test]
fn sibling_stores_are_checked_independently() {
    let (s, log) = common::scripted(vec![SatResult::Sat, SatResult::Unsat]);
    let heap = HeapGraph::new();
    let y = Term::var(local(2));
    let c = AtomicConstraint::new(y.clone(), CmpOp::Eq, Term::Const(5), &s);
    let mut q = CombinedQuery::from_constraint(s.clone(), c).unwrap();

    // the default edge of `switch (y) { case 5: ... }`
    let mut sibling = q.clone();
    let switch = Instruction::Switch{scrutinee: Operand::Local(2), cases: vec![5], label: SwitchLabel::Default};
    sibling.visit(&switch, &m(), &no_rules(), &heap).unwrap();
    assert_eq!(sibling.path().constraints().len(), 2);
    assert_eq!(q.path().constraints().len(), 1);

    assert!(q.is_feasible());
    assert!(!sibling.is_feasible());
    assert_eq!(log.borrow().checks, 2);
    assert!(log.borrow().asserted.iter().any(|a| a.contains("(distinct |v2@m1| 5)")));

    // answers are cached per conjunction
    assert!(q.is_feasible());
    assert_eq!(log.borrow().checks, 2);
}

#[test]
fn disagreeing_rule_refutes_a_concrete_edge() {
    let s = Session::offline(Options::default());
    let heap = HeapGraph::new();
    let f = Field::named("A", "f");
    let a = PointerVariable::Concrete(alloc(1));
    let b = PointerVariable::Concrete(alloc(2));
    let mut q = CombinedQuery::from_edge(s.clone(), PointsToEdge::field(local(1), f.clone(), a)).unwrap();

    let rules = vec![DependencyRule::new(PointsToEdge::field(local(1), f, b), vec![], MethodId(1))];
    match q.visit(&Instruction::Nop, &m(), &rules, &heap) {
        Err(Refutation::NoConsistentRule{inconsistent: 1}) => (),
        other => panic!("{:?}", other.map(|v|v.len())),
    }
    assert!(!q.is_feasible());
}

#[test]
fn narrowing_replaces_a_symbolic_sink_everywhere() {
    let s = Session::offline(Options::default());
    let f = Field::named("P", "f");
    let g = Field::named("A", "g");
    let p = Instance::Local{method: MethodId(1), local: 1};
    let j = Instance::Alloc(site(7, "J"));
    let mut heap = HeapGraph::new();
    heap.root(p.clone(), vec![Instance::Alloc(site(9, "P"))])
        .edge(Instance::Alloc(site(9, "P")), f.clone(), alloc(1))
        .edge(alloc(1), g.clone(), j.clone());

    let both : BTreeSet<Instance> = vec![alloc(1), alloc(2)].into_iter().collect();
    let sym = PointerVariable::from_candidates(&s, both).unwrap();
    let mut q = PointsToQuery::with_edge(s.clone(), PointsToEdge::field(local(1), f.clone(), sym.clone())).unwrap();
    q.add_edge(PointsToEdge::field(sym, g.clone(), PointerVariable::Concrete(j.clone()))).unwrap();

    q.narrow(&heap).unwrap();
    let i1 = PointerVariable::Concrete(alloc(1));
    let owed : Vec<PointsToEdge> = q.to_produce().iter().cloned().collect();
    assert_eq!(owed, vec![
        PointsToEdge::field(local(1), f, i1.clone()),
        PointsToEdge::field(i1, g, PointerVariable::Concrete(j)),
    ]);
}

#[test]
fn feasibility_is_the_conjunction_of_both_halves() {
    let heap = HeapGraph::new();
    let x = Term::var(local(3));

    // heap fine, path unsat
    let (s, _) = common::scripted(vec![SatResult::Unsat]);
    let mut q = CombinedQuery::from_edge(s.clone(), PointsToEdge::root(local(1), PointerVariable::Concrete(alloc(1)))).unwrap();
    let branch = Instruction::Branch{op: CmpOp::Gt, lhs: Operand::Local(3), rhs: Operand::Const(0), taken: true};
    q.visit(&branch, &m(), &no_rules(), &heap).unwrap();
    assert!(q.heap().is_feasible());
    assert!(!q.is_feasible());

    // heap refuted: the solver is never asked
    let (s, log) = common::scripted(vec![]);
    let c = AtomicConstraint::new(x, CmpOp::Gt, Term::Const(0), &s);
    let mut q = CombinedQuery::from_constraint(s.clone(), c).unwrap();
    let null = Instruction::Assign{def: 1, value: Operand::Null};
    let mut with_edge = CombinedQuery::from_edge(s.clone(), PointsToEdge::root(local(1), PointerVariable::Concrete(alloc(1)))).unwrap();
    assert!(with_edge.visit(&null, &m(), &HeapRules::new(&heap), &heap).is_err());
    assert!(!with_edge.is_feasible());
    assert_eq!(log.borrow().checks, 0);

    // both fine
    assert!(q.is_feasible());
    assert_eq!(log.borrow().checks, 1);
}

#[test]
fn copies_do_not_share_state() {
    let s = Session::offline(Options::default());
    let heap = HeapGraph::new();
    let c = AtomicConstraint::new(Term::var(local(1)), CmpOp::Gt, Term::Const(0), &s);
    let original = CombinedQuery::from_constraint(s.clone(), c).unwrap();

    let mut copy = original.clone();
    let assign = Instruction::Assign{def: 1, value: Operand::Const(-1)};
    assert!(copy.visit(&assign, &m(), &no_rules(), &heap).is_err());

    let mut original = original;
    assert!(original.is_feasible());
    assert_eq!(original.path().constraints().len(), 1);
}

#[test]
fn solver_giving_up_is_sticky() {
    let (s, log) = common::scripted(vec![SatResult::Unknown, SatResult::Unsat]);
    let heap = HeapGraph::new();
    let c = AtomicConstraint::new(Term::var(local(1)), CmpOp::Gt, Term::Const(0), &s);
    let mut q = CombinedQuery::from_constraint(s.clone(), c).unwrap();
    assert!(q.is_feasible());
    assert!(s.solver_disabled());

    let branch = Instruction::Branch{op: CmpOp::Lt, lhs: Operand::Local(1), rhs: Operand::Const(0), taken: true};
    q.visit(&branch, &m(), &no_rules(), &heap).unwrap();
    assert!(q.is_feasible());
    assert_eq!(log.borrow().checks, 1);
}
