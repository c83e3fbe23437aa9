use std::path::PathBuf;
use crate::constraint::ConstraintId;


/// operational failures. refutation is not one of these, see [`Refutation`]
#[derive(Debug)]
pub enum Error {
    Io {
        path:       PathBuf,
        source:     std::io::Error,
    },
    Config {
        path:       PathBuf,
        message:    String,
    },
    Scenario {
        path:       PathBuf,
        message:    String,
    },
    Solver(String),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io{path, source}         => write!(f, "{}: {}", path.display(), source),
            Error::Config{path, message}    => write!(f, "{}: invalid config: {}", path.display(), message),
            Error::Scenario{path, message}  => write!(f, "{}: invalid scenario: {}", path.display(), message),
            Error::Solver(message)          => write!(f, "smt solver: {}", message),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io{source, ..} => Some(source),
            _ => None,
        }
    }
}


/// why a store became permanently infeasible.
/// this is the expected outcome of most queries and travels as a value
#[derive(Clone, Debug, PartialEq)]
pub enum Refutation {
    /// a constraint became constant and evaluated to false
    Contradiction {
        constraint: ConstraintId,
        text:       String,
    },
    /// the solver proved the conjunction unsatisfiable
    Unsat {
        constraints: Vec<ConstraintId>,
    },
    /// every relevant dependency rule disagrees with an existing binding
    NoConsistentRule {
        inconsistent: usize,
    },
    /// two bindings of the same root share no instance
    EmptyIntersection {
        edge: String,
    },
    /// the heap model cannot produce this edge at all
    Narrowed {
        edge: String,
    },
    /// a points-to obligation on a value that is null or not a reference
    NullBinding {
        edge: String,
    },
    /// an obligation on a callee local survived to the callee entry
    Unproducible {
        edge: String,
    },
    /// the path store requires `local == null` but an instruction binds it to an object
    NullConflict {
        local: String,
    },
    /// the store was refuted earlier
    AlreadyRefuted,
}

impl std::fmt::Display for Refutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Refutation::Contradiction{constraint, text} =>
                write!(f, "constraint {} evaluates to false: {}", constraint, text),
            Refutation::Unsat{constraints} => {
                let ids : Vec<String> = constraints.iter().map(|c|c.to_string()).collect();
                write!(f, "unsatisfiable conjunction of [{}]", ids.join(", "))
            }
            Refutation::NoConsistentRule{inconsistent} =>
                write!(f, "all {} relevant rules are inconsistent", inconsistent),
            Refutation::EmptyIntersection{edge} =>
                write!(f, "no instance satisfies both bindings of {}", edge),
            Refutation::Narrowed{edge} =>
                write!(f, "heap model cannot produce {}", edge),
            Refutation::NullBinding{edge} =>
                write!(f, "{} requires a null value to point somewhere", edge),
            Refutation::Unproducible{edge} =>
                write!(f, "nothing in the callee can produce {}", edge),
            Refutation::NullConflict{local} =>
                write!(f, "{} is required to be null but is bound to an object", local),
            Refutation::AlreadyRefuted =>
                write!(f, "refuted earlier"),
        }
    }
}

/// outcome of visiting one instruction. `Ok(siblings)` leaves the visited store
/// updated in place as the first branch; every sibling is an independent alternative
pub type Visit<Q> = Result<Vec<Q>, Refutation>;
