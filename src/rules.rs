use std::collections::BTreeSet;
use crate::edge::PointsToEdge;
use crate::heap::HeapModel;
use crate::ir::{Instruction, Operand, Site, Field, MethodId};
use crate::pointer::{Instance, PointerVariable};
use crate::session::Session;


/// "this instruction produces `shown`, provided `to_show` holds before it"
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyRule {
    pub shown:      PointsToEdge,
    pub to_show:    Vec<PointsToEdge>,
    pub method:     MethodId,
}

impl DependencyRule {
    pub fn new(shown: PointsToEdge, to_show: Vec<PointsToEdge>, method: MethodId) -> Self {
        Self {
            shown,
            to_show,
            method,
        }
    }

    pub fn rename(&self, from: &PointerVariable, to: &PointerVariable) -> Self {
        let swap = |e: &PointsToEdge| e.substitute(from, to).unwrap_or_else(||e.clone());
        Self {
            shown:      swap(&self.shown),
            to_show:    self.to_show.iter().map(swap).collect(),
            method:     self.method,
        }
    }
}

impl std::fmt::Display for DependencyRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.shown)?;
        if !self.to_show.is_empty() {
            let pre : Vec<String> = self.to_show.iter().map(|e|e.to_string()).collect();
            write!(f, " <= {}", pre.join(", "))?;
        }
        Ok(())
    }
}


pub trait RuleSource {
    fn rules_for(&self, instr: &Instruction, site: &Site, session: &Session) -> Vec<DependencyRule>;
}

/// fixed rules, as written in a scenario
impl RuleSource for Vec<DependencyRule> {
    fn rules_for(&self, _: &Instruction, _: &Site, _: &Session) -> Vec<DependencyRule> {
        self.clone()
    }
}


/// derives rules for heap-touching instructions from a points-to model
pub struct HeapRules<'a, H: HeapModel + ?Sized> {
    heap: &'a H,
}

impl<'a, H: HeapModel + ?Sized> HeapRules<'a, H> {
    pub fn new(heap: &'a H) -> Self {
        Self{heap}
    }

    fn local_pts(&self, site: &Site, local: u32) -> BTreeSet<Instance> {
        self.heap.points_to_var(&Instance::Local{method: site.method, local})
    }

    fn field_pts(&self, bases: &BTreeSet<Instance>, field: &Field) -> BTreeSet<Instance> {
        bases.iter().flat_map(|b|self.heap.points_to(b, field)).collect()
    }

    fn load(&self, site: &Site, session: &Session, def: u32, base: u32, field: Field) -> Option<DependencyRule> {
        let bases   = self.local_pts(site, base);
        let sinks   = self.field_pts(&bases, &field);
        let b       = PointerVariable::from_candidates(session, bases)?;
        let x       = PointerVariable::from_candidates(session, sinks)?;
        Some(DependencyRule::new(
            PointsToEdge::root(PointerVariable::local(site.method, def), x.clone()),
            vec![
                PointsToEdge::root(PointerVariable::local(site.method, base), b.clone()),
                PointsToEdge::field(b, field, x),
            ],
            site.method,
        ))
    }

    fn store(&self, site: &Site, session: &Session, base: u32, field: Field, value: &Operand) -> Option<DependencyRule> {
        let value   = value.as_local()?;
        let b       = PointerVariable::from_candidates(session, self.local_pts(site, base))?;
        let v       = PointerVariable::from_candidates(session, self.local_pts(site, value))?;
        Some(DependencyRule::new(
            PointsToEdge::field(b.clone(), field, v.clone()),
            vec![
                PointsToEdge::root(PointerVariable::local(site.method, base), b),
                PointsToEdge::root(PointerVariable::local(site.method, value), v),
            ],
            site.method,
        ))
    }
}

impl<'a, H: HeapModel + ?Sized> RuleSource for HeapRules<'a, H> {
    fn rules_for(&self, instr: &Instruction, site: &Site, session: &Session) -> Vec<DependencyRule> {
        let rule = match instr {
            Instruction::New{def, site: alloc} | Instruction::NewArray{def, site: alloc, ..} => {
                Some(DependencyRule::new(
                    PointsToEdge::root(PointerVariable::local(site.method, *def), PointerVariable::alloc(alloc.clone())),
                    Vec::new(),
                    site.method,
                ))
            }
            Instruction::Assign{def, value} | Instruction::CheckCast{def, value} => {
                value.as_local().and_then(|value| {
                    let v = PointerVariable::from_candidates(session, self.local_pts(site, value))?;
                    Some(DependencyRule::new(
                        PointsToEdge::root(PointerVariable::local(site.method, *def), v.clone()),
                        vec![PointsToEdge::root(PointerVariable::local(site.method, value), v)],
                        site.method,
                    ))
                })
            }
            Instruction::Load{def, base, field} => {
                self.load(site, session, *def, *base, field.clone())
            }
            Instruction::ArrayLoad{def, array, ..} => {
                self.load(site, session, *def, *array, Field::ArrayContents)
            }
            Instruction::StaticLoad{def, field} => {
                let root = Instance::Static(field.clone());
                PointerVariable::from_candidates(session, self.heap.points_to_var(&root)).map(|x| {
                    DependencyRule::new(
                        PointsToEdge::root(PointerVariable::local(site.method, *def), x.clone()),
                        vec![PointsToEdge::root(PointerVariable::Concrete(root), x)],
                        site.method,
                    )
                })
            }
            Instruction::Store{base, field, value} => {
                self.store(site, session, *base, field.clone(), value)
            }
            Instruction::ArrayStore{array, value, ..} => {
                self.store(site, session, *array, Field::ArrayContents, value)
            }
            Instruction::StaticStore{field, value} => {
                value.as_local().and_then(|value| {
                    let v = PointerVariable::from_candidates(session, self.local_pts(site, value))?;
                    Some(DependencyRule::new(
                        PointsToEdge::root(PointerVariable::Concrete(Instance::Static(field.clone())), v.clone()),
                        vec![PointsToEdge::root(PointerVariable::local(site.method, value), v)],
                        site.method,
                    ))
                })
            }
            Instruction::ArrayLength{..}
            | Instruction::Binary{..}
            | Instruction::Unary{..}
            | Instruction::Compare{..}
            | Instruction::Conversion{..}
            | Instruction::InstanceOf{..}
            | Instruction::Metadata{..}
            | Instruction::Branch{..}
            | Instruction::Switch{..}
            | Instruction::Invoke{..}
            | Instruction::Return{..}
            | Instruction::Nop => None,
        };
        rule.into_iter().collect()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Options;
    use crate::heap::HeapGraph;
    use crate::ir::AllocSite;

    fn alloc(id: u32) -> Instance {
        Instance::Alloc(AllocSite{id, class: "A".to_string(), method: MethodId(0)})
    }

    fn local(l: u32) -> Instance {
        Instance::Local{method: MethodId(0), local: l}
    }

    #[test]
    fn load_rule_shares_variables_between_shown_and_preconditions() {
        let s = Session::offline(Options::default());
        let f = Field::named("A", "f");
        let mut g = HeapGraph::new();
        g.root(local(1), vec![alloc(1), alloc(2)])
            .edge(alloc(1), f.clone(), alloc(3))
            .edge(alloc(2), f.clone(), alloc(4));

        let rules = HeapRules::new(&g).rules_for(
            &Instruction::Load{def: 2, base: 1, field: f.clone()},
            &Site::new(MethodId(0)),
            &s,
        );
        assert_eq!(rules.len(), 1);
        let r = &rules[0];
        assert_eq!(r.shown.source, PointerVariable::Concrete(local(2)));
        assert_eq!(r.to_show.len(), 2);
        assert_eq!(r.to_show[0].sink, r.to_show[1].source);
        assert_eq!(r.to_show[1].sink, r.shown.sink);
        assert_eq!(r.shown.sink.candidates().len(), 2);
    }

    #[test]
    fn nothing_to_point_at_means_no_rule() {
        let s = Session::offline(Options::default());
        let g = HeapGraph::new();
        let rules = HeapRules::new(&g).rules_for(
            &Instruction::Assign{def: 2, value: Operand::Local(1)},
            &Site::new(MethodId(0)),
            &s,
        );
        assert!(rules.is_empty());

        let rules = HeapRules::new(&g).rules_for(
            &Instruction::Store{base: 1, field: Field::named("A", "f"), value: Operand::Null},
            &Site::new(MethodId(0)),
            &s,
        );
        assert!(rules.is_empty());
    }

    #[test]
    fn allocation_rule() {
        let s = Session::offline(Options::default());
        let g = HeapGraph::new();
        let site = AllocSite{id: 9, class: "Foo".into(), method: MethodId(0)};
        let rules = HeapRules::new(&g).rules_for(
            &Instruction::New{def: 3, site: site.clone()},
            &Site::new(MethodId(0)),
            &s,
        );
        assert_eq!(rules, vec![DependencyRule::new(
            PointsToEdge::root(PointerVariable::local(MethodId(0), 3), PointerVariable::alloc(site)),
            vec![],
            MethodId(0),
        )]);
    }
}
