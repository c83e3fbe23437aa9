use crate::ir::Field;
use crate::pointer::PointerVariable;


/// `source.field -> sink`, or `source -> sink` for a root without a field
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointsToEdge {
    pub source: PointerVariable,
    pub field:  Option<Field>,
    pub sink:   PointerVariable,
}

impl PointsToEdge {
    pub fn root(source: PointerVariable, sink: PointerVariable) -> Self {
        Self {
            source,
            field: None,
            sink,
        }
    }

    pub fn field(source: PointerVariable, field: Field, sink: PointerVariable) -> Self {
        Self {
            source,
            field: Some(field),
            sink,
        }
    }

    pub fn is_root(&self) -> bool {
        self.field.is_none()
    }

    pub fn mentions(&self, v: &PointerVariable) -> bool {
        &self.source == v || &self.sink == v
    }

    /// None if `from` does not occur
    pub fn substitute(&self, from: &PointerVariable, to: &PointerVariable) -> Option<Self> {
        if !self.mentions(from) {
            return None;
        }
        let swap = |v: &PointerVariable| if v == from { to.clone() } else { v.clone() };
        Some(Self {
            source: swap(&self.source),
            field:  self.field.clone(),
            sink:   swap(&self.sink),
        })
    }

    /// same field and both ends may denote the same thing
    pub fn overlaps(&self, other: &Self) -> bool {
        self.field == other.field
            && self.source.overlaps(&other.source)
            && self.sink.overlaps(&other.sink)
    }
}

impl std::fmt::Display for PointsToEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}.{} -> {}", self.source, field, self.sink),
            None        => write!(f, "{} -> {}", self.source, self.sink),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{MethodId, AllocSite};

    #[test]
    fn substitution() {
        let x = PointerVariable::local(MethodId(0), 1);
        let y = PointerVariable::local(MethodId(0), 2);
        let a = PointerVariable::alloc(AllocSite{id: 1, class: "A".into(), method: MethodId(0)});
        let e = PointsToEdge::root(x.clone(), a.clone());
        assert_eq!(e.substitute(&y, &x), None);
        assert_eq!(e.substitute(&x, &y), Some(PointsToEdge::root(y, a)));
        assert_eq!(e.to_string(), "v1@m0 -> new A#1");
    }
}
