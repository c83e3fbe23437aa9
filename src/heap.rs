//! the points-to facts the query core consults.
//!
//! the analysis that computes them is somebody else's problem. [`HeapGraph`] is a
//! plain in-memory table of its results, which is what scenario files carry.

use std::collections::BTreeSet;
use serde::{Serialize, Deserialize};
use crate::ir::Field;
use crate::pointer::{Instance, PointerVariable};


pub trait HeapModel {
    /// instances a root (local, return slot, static field) may point to
    fn points_to_var(&self, root: &Instance) -> BTreeSet<Instance>;

    /// instances `source.field` may point to
    fn points_to(&self, source: &Instance, field: &Field) -> BTreeSet<Instance>;

    /// instances whose `field` may point to `sink`
    fn points_at(&self, sink: &Instance, field: &Field) -> BTreeSet<Instance>;

    fn field(&self, class: &str, name: &str) -> Option<Field>;

    /// the heap locations a variable may denote. roots are looked up, index names denote none
    fn instances_of(&self, v: &PointerVariable) -> BTreeSet<Instance> {
        let mut r = BTreeSet::new();
        for i in v.candidates() {
            match &i {
                Instance::Alloc(_) => {
                    r.insert(i);
                }
                Instance::Index(_) => (),
                Instance::Local{..} | Instance::Return(_) | Instance::Static(_) => {
                    r.extend(self.points_to_var(&i));
                }
            }
        }
        r
    }

    fn may_alias(&self, a: &PointerVariable, b: &PointerVariable) -> bool {
        if a == b {
            return true;
        }
        let a = self.instances_of(a);
        self.instances_of(b).iter().any(|i|a.contains(i))
    }
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootFact {
    pub root:       Instance,
    pub points_to:  Vec<Instance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldFact {
    pub source:     Instance,
    pub field:      Field,
    pub sink:       Instance,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeapGraph {
    #[serde(default)]
    pub roots:  Vec<RootFact>,
    #[serde(default)]
    pub edges:  Vec<FieldFact>,
    /// declared fields, for resolving names
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl HeapGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&mut self, root: Instance, points_to: impl IntoIterator<Item = Instance>) -> &mut Self {
        let points_to : Vec<Instance> = points_to.into_iter().collect();
        match self.roots.iter_mut().find(|r|r.root == root) {
            Some(r) => r.points_to.extend(points_to),
            None    => self.roots.push(RootFact{root, points_to}),
        }
        self
    }

    pub fn edge(&mut self, source: Instance, field: Field, sink: Instance) -> &mut Self {
        if !self.fields.contains(&field) {
            self.fields.push(field.clone());
        }
        self.edges.push(FieldFact{source, field, sink});
        self
    }
}

impl HeapModel for HeapGraph {
    fn points_to_var(&self, root: &Instance) -> BTreeSet<Instance> {
        self.roots.iter()
            .filter(|r|&r.root == root)
            .flat_map(|r|r.points_to.iter().cloned())
            .collect()
    }

    fn points_to(&self, source: &Instance, field: &Field) -> BTreeSet<Instance> {
        self.edges.iter()
            .filter(|e|&e.source == source && &e.field == field)
            .map(|e|e.sink.clone())
            .collect()
    }

    fn points_at(&self, sink: &Instance, field: &Field) -> BTreeSet<Instance> {
        self.edges.iter()
            .filter(|e|&e.sink == sink && &e.field == field)
            .map(|e|e.source.clone())
            .collect()
    }

    fn field(&self, class: &str, name: &str) -> Option<Field> {
        self.fields.iter().find(|f| match f {
            Field::Named{class: c, name: n} => c == class && n == name,
            _ => false,
        }).cloned()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{AllocSite, MethodId};

    fn alloc(id: u32) -> Instance {
        Instance::Alloc(AllocSite{id, class: "A".to_string(), method: MethodId(0)})
    }

    #[test]
    fn lookups() {
        let f = Field::named("A", "f");
        let x = Instance::Local{method: MethodId(0), local: 1};
        let mut g = HeapGraph::new();
        g.root(x.clone(), vec![alloc(1), alloc(2)])
            .edge(alloc(1), f.clone(), alloc(3))
            .edge(alloc(2), f.clone(), alloc(3));

        assert_eq!(g.points_to_var(&x).len(), 2);
        assert_eq!(g.points_to(&alloc(1), &f).into_iter().collect::<Vec<_>>(), vec![alloc(3)]);
        assert_eq!(g.points_at(&alloc(3), &f).len(), 2);
        assert_eq!(g.field("A", "f"), Some(f));
        assert_eq!(g.field("A", "g"), None);
    }

    #[test]
    fn aliasing_goes_through_roots() {
        let x = Instance::Local{method: MethodId(0), local: 1};
        let y = Instance::Local{method: MethodId(0), local: 2};
        let z = Instance::Local{method: MethodId(0), local: 3};
        let mut g = HeapGraph::new();
        g.root(x.clone(), vec![alloc(1)])
            .root(y.clone(), vec![alloc(1), alloc(2)])
            .root(z.clone(), vec![alloc(3)]);

        let v = |i: &Instance| PointerVariable::Concrete(i.clone());
        assert!(g.may_alias(&v(&x), &v(&y)));
        assert!(!g.may_alias(&v(&x), &v(&z)));
        assert!(g.may_alias(&v(&x), &PointerVariable::Concrete(alloc(1))));
    }

    #[test]
    fn reads_from_json() {
        let g : HeapGraph = serde_json::from_str(r#"{
            "roots": [
                {"root": {"local": {"method": 0, "local": 1}},
                 "points_to": [{"alloc": {"id": 4, "class": "A", "method": 0}}]}
            ]
        }"#).unwrap();
        assert_eq!(g.points_to_var(&Instance::Local{method: MethodId(0), local: 1}).len(), 1);
    }
}
