use std::collections::BTreeSet;
use std::rc::Rc;
use serde::{Serialize, Deserialize};
use crate::ir::{Field, AllocSite, MethodId, Local};
use crate::session::Session;


/// one runtime identity the core can talk about
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Instance {
    #[serde(rename = "local")]
    Local {
        method: MethodId,
        local:  Local,
    },
    /// the value a method returns
    #[serde(rename = "return")]
    Return(MethodId),
    /// a static field, which is a root like a local
    #[serde(rename = "static")]
    Static(Field),
    /// abstract heap location
    #[serde(rename = "alloc")]
    Alloc(AllocSite),
    /// fresh name for an array index
    #[serde(rename = "index")]
    Index(u64),
}

impl Instance {
    /// true unless this may stand for more than one runtime object
    pub fn is_unique(&self) -> bool {
        match self {
            Instance::Alloc(_) => false,
            _ => true,
        }
    }

    pub fn is_heap_location(&self) -> bool {
        match self {
            Instance::Alloc(_) => true,
            _ => false,
        }
    }

    /// roots live in a method frame and are rebound across calls
    pub fn method(&self) -> Option<MethodId> {
        match self {
            Instance::Local{method, ..} => Some(*method),
            Instance::Return(method)    => Some(*method),
            _ => None,
        }
    }

    pub fn is_local(&self) -> bool {
        self.method().is_some()
    }
}

impl std::fmt::Display for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instance::Local{method, local}  => write!(f, "v{}@{}", local, method),
            Instance::Return(method)        => write!(f, "ret@{}", method),
            Instance::Static(field)         => write!(f, "static {}", field),
            Instance::Alloc(site)           => write!(f, "{}", site),
            Instance::Index(n)              => write!(f, "idx{}", n),
        }
    }
}


/// a heap reference that is either pinned to one instance or ranges over a finite set.
///
/// two symbolic variables with the same candidates are still different unknowns,
/// so symbolic variables carry an id handed out by the session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PointerVariable {
    Concrete(Instance),
    Symbolic {
        id:         u64,
        candidates: Rc<BTreeSet<Instance>>,
    },
}

/// result of intersecting a variable with a candidate set
#[derive(Debug, Clone, PartialEq)]
pub enum Narrowed {
    Same,
    Empty,
    To(PointerVariable),
}

impl PointerVariable {
    pub fn local(method: MethodId, local: Local) -> Self {
        PointerVariable::Concrete(Instance::Local{method, local})
    }

    pub fn alloc(site: AllocSite) -> Self {
        PointerVariable::Concrete(Instance::Alloc(site))
    }

    /// the only way to build a symbolic variable. a single candidate becomes concrete,
    /// no candidates at all means nothing can be bound
    pub fn from_candidates(session: &Session, candidates: BTreeSet<Instance>) -> Option<Self> {
        match candidates.len() {
            0 => None,
            1 => candidates.into_iter().next().map(PointerVariable::Concrete),
            _ => Some(PointerVariable::Symbolic {
                id:         session.fresh_id(),
                candidates: Rc::new(candidates),
            }),
        }
    }

    pub fn is_symbolic(&self) -> bool {
        match self {
            PointerVariable::Symbolic{..} => true,
            PointerVariable::Concrete(_) => false,
        }
    }

    pub fn as_concrete(&self) -> Option<&Instance> {
        match self {
            PointerVariable::Concrete(i) => Some(i),
            PointerVariable::Symbolic{..} => None,
        }
    }

    pub fn candidates(&self) -> BTreeSet<Instance> {
        match self {
            PointerVariable::Concrete(i) => {
                let mut s = BTreeSet::new();
                s.insert(i.clone());
                s
            }
            PointerVariable::Symbolic{candidates, ..} => (**candidates).clone(),
        }
    }

    pub fn contains(&self, instance: &Instance) -> bool {
        match self {
            PointerVariable::Concrete(i) => i == instance,
            PointerVariable::Symbolic{candidates, ..} => candidates.contains(instance),
        }
    }

    /// locals and statics are uniquely identified. a symbolic variable never is
    pub fn is_unique(&self) -> bool {
        match self {
            PointerVariable::Concrete(i) => i.is_unique(),
            PointerVariable::Symbolic{..} => false,
        }
    }

    pub fn is_local(&self) -> bool {
        match self {
            PointerVariable::Concrete(i) => i.is_local(),
            PointerVariable::Symbolic{..} => false,
        }
    }

    /// every candidate is an allocation, so the value is never null
    pub fn is_heap_location(&self) -> bool {
        match self {
            PointerVariable::Concrete(i) => i.is_heap_location(),
            PointerVariable::Symbolic{candidates, ..} => candidates.iter().all(|i|i.is_heap_location()),
        }
    }

    pub fn method(&self) -> Option<MethodId> {
        self.as_concrete().and_then(|i|i.method())
    }

    pub fn overlaps(&self, other: &Self) -> bool {
        match (self, other) {
            (PointerVariable::Concrete(a), PointerVariable::Concrete(b)) => a == b,
            (PointerVariable::Concrete(a), s) | (s, PointerVariable::Concrete(a)) => s.contains(a),
            (PointerVariable::Symbolic{id: ia, candidates: a}, PointerVariable::Symbolic{id: ib, candidates: b}) => {
                ia == ib || a.iter().any(|i|b.contains(i))
            }
        }
    }

    /// the variable both `self` and `other` can be at once, or None if they are disjoint.
    ///
    /// with `narrow` off two symbolic variables are never intersected; the wider
    /// one survives, which can only lose precision.
    pub fn merge(&self, other: &Self, session: &Session, narrow: bool) -> Option<Self> {
        if self == other {
            return Some(self.clone());
        }
        match (self, other) {
            (PointerVariable::Concrete(a), PointerVariable::Concrete(b)) => {
                if a == b { Some(self.clone()) } else { None }
            }
            (PointerVariable::Concrete(a), s) | (s, PointerVariable::Concrete(a)) => {
                if s.contains(a) {
                    Some(PointerVariable::Concrete(a.clone()))
                } else {
                    None
                }
            }
            (PointerVariable::Symbolic{candidates: a, ..}, PointerVariable::Symbolic{candidates: b, ..}) => {
                let both : BTreeSet<Instance> = a.intersection(b).cloned().collect();
                if both.is_empty() {
                    return None;
                }
                if !narrow {
                    return Some(if a.len() >= b.len() { self.clone() } else { other.clone() });
                }
                if both.len() == a.len() {
                    Some(self.clone())
                } else if both.len() == b.len() {
                    Some(other.clone())
                } else {
                    PointerVariable::from_candidates(session, both)
                }
            }
        }
    }

    /// intersect with a set supplied by the heap model
    pub fn narrow(&self, allowed: &BTreeSet<Instance>, session: &Session) -> Narrowed {
        match self {
            PointerVariable::Concrete(i) => {
                if allowed.contains(i) { Narrowed::Same } else { Narrowed::Empty }
            }
            PointerVariable::Symbolic{candidates, ..} => {
                let both : BTreeSet<Instance> = candidates.intersection(allowed).cloned().collect();
                if both.is_empty() {
                    Narrowed::Empty
                } else if both.len() == candidates.len() {
                    Narrowed::Same
                } else {
                    match PointerVariable::from_candidates(session, both) {
                        Some(v) => Narrowed::To(v),
                        None    => Narrowed::Empty,
                    }
                }
            }
        }
    }

    /// panics on a symbolic variable that should have been concrete
    pub fn check(&self) {
        if let PointerVariable::Symbolic{candidates, id} = self {
            if candidates.len() < 2 {
                panic!("ICE: symbolic variable _sym{} with {} candidates", id, candidates.len());
            }
        }
    }
}

impl std::fmt::Display for PointerVariable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PointerVariable::Concrete(i) => write!(f, "{}", i),
            PointerVariable::Symbolic{id, candidates} => {
                write!(f, "_sym{}{{", id)?;
                for (n, c) in candidates.iter().enumerate() {
                    if n > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", c)?;
                }
                write!(f, "}}")
            }
        }
    }
}
