//! replaying a recorded walk.
//!
//! a scenario is what a walker would have fed the query core: a goal, the
//! points-to facts of the program, and the instructions of one backward path in
//! the order they are visited. every live branch is advanced over every step.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use serde::{Serialize, Deserialize};
use crate::config::Options;
use crate::constraint::AtomicConstraint;
use crate::edge::PointsToEdge;
use crate::error::Error;
use crate::heap::HeapGraph;
use crate::ir::{CmpOp, Field, Instruction, MethodId, Site};
use crate::pointer::{Instance, PointerVariable};
use crate::query::CombinedQuery;
use crate::rules::{DependencyRule, HeapRules};
use crate::session::Session;
use crate::term::{Term, VarTerm};


#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Witness,
    Refuted,
    Open,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", match self {
            Verdict::Witness => "witness",
            Verdict::Refuted => "refuted",
            Verdict::Open    => "open",
        })
    }
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TermSpec {
    #[serde(rename = "const")]
    Const(i64),
    #[serde(rename = "var")]
    Var {
        base:   Instance,
        #[serde(default)]
        fields: Vec<Field>,
    },
}

impl TermSpec {
    fn build(&self) -> Term {
        match self {
            TermSpec::Const(v) => Term::Const(*v),
            TermSpec::Var{base, fields} => Term::Var(VarTerm {
                base:   PointerVariable::Concrete(base.clone()),
                fields: fields.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    /// `source.field -> sink`, where the sink may be any of the listed instances
    Edge {
        source: Instance,
        #[serde(default)]
        field:  Option<Field>,
        sink:   Vec<Instance>,
    },
    Constraint {
        lhs:    TermSpec,
        op:     CmpOp,
        rhs:    TermSpec,
    },
}

/// an edge in a hand written rule. each end is a candidate set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub source: Vec<Instance>,
    #[serde(default)]
    pub field:  Option<Field>,
    pub sink:   Vec<Instance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub shown:      EdgeSpec,
    #[serde(default)]
    pub to_show:    Vec<EdgeSpec>,
}

impl RuleSpec {
    /// equal candidate sets within one rule denote the same variable
    fn build(&self, session: &Session, method: MethodId) -> Result<DependencyRule, String> {
        let mut vars : BTreeMap<BTreeSet<Instance>, PointerVariable> = BTreeMap::new();
        let mut var = |set: &[Instance]| -> Result<PointerVariable, String> {
            let set : BTreeSet<Instance> = set.iter().cloned().collect();
            if let Some(v) = vars.get(&set) {
                return Ok(v.clone());
            }
            let v = PointerVariable::from_candidates(session, set.clone())
                .ok_or_else(||"rule edge with an empty candidate set".to_string())?;
            vars.insert(set, v.clone());
            Ok(v)
        };
        let mut edge = |e: &EdgeSpec| -> Result<PointsToEdge, String> {
            Ok(PointsToEdge {
                source: var(&e.source)?,
                field:  e.field.clone(),
                sink:   var(&e.sink)?,
            })
        };
        let shown = edge(&self.shown)?;
        let to_show = self.to_show.iter().map(|e|edge(e)).collect::<Result<Vec<_>, _>>()?;
        Ok(DependencyRule::new(shown, to_show, method))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    Visit {
        site:   Site,
        instr:  Instruction,
        /// replaces the rules derived from the heap graph
        #[serde(default)]
        rules:  Option<Vec<RuleSpec>>,
    },
    EnterCallee {
        site:   Site,
        call:   Instruction,
        callee: MethodId,
    },
    ReturnToCaller {
        site:   Site,
        call:   Instruction,
    },
    SkipCall {
        site:   Site,
        call:   Instruction,
    },
    DeclareWitness,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name:   String,
    #[serde(default)]
    pub heap:   HeapGraph,
    pub goal:   Goal,
    #[serde(default)]
    pub trace:  Vec<Step>,
    #[serde(default)]
    pub expect: Option<Verdict>,
}

#[derive(Debug, Clone)]
pub struct Report {
    pub name:           String,
    pub verdict:        Verdict,
    pub expected:       Option<Verdict>,
    /// branches still alive at the end
    pub branches:       usize,
    pub refutations:    Vec<String>,
    pub optimistic:     usize,
}

impl Report {
    pub fn matches(&self) -> bool {
        self.expected.map(|e| e == self.verdict).unwrap_or(true)
    }
}

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({} live, {} refuted", self.name, self.verdict, self.branches, self.refutations.len())?;
        if self.optimistic > 0 {
            write!(f, ", {} optimistic", self.optimistic)?;
        }
        write!(f, ")")?;
        if let Some(e) = self.expected {
            if e != self.verdict {
                write!(f, " expected {}", e)?;
            }
        }
        Ok(())
    }
}


pub fn load(path: &Path) -> Result<Scenario, Error> {
    let s = std::fs::read_to_string(path).map_err(|e|Error::io(path, e))?;
    let mut scenario : Scenario = serde_json::from_str(&s).map_err(|e|Error::Scenario{
        path:       path.into(),
        message:    e.to_string(),
    })?;
    if scenario.name.is_empty() {
        scenario.name = path.file_stem().map(|s|s.to_string_lossy().into_owned()).unwrap_or_default();
    }
    Ok(scenario)
}

pub fn run(scenario: &Scenario, options: &Options) -> Result<Report, Error> {
    let session = Session::new(options.clone())?;
    run_with(scenario, session)
}

fn invalid(scenario: &Scenario, message: String) -> Error {
    Error::Scenario {
        path: PathBuf::from(&scenario.name),
        message,
    }
}

fn start(scenario: &Scenario, session: &Rc<Session>) -> Result<Result<CombinedQuery, String>, Error> {
    let q = match &scenario.goal {
        Goal::Edge{source, field, sink} => {
            let sink = PointerVariable::from_candidates(session, sink.iter().cloned().collect())
                .ok_or_else(||invalid(scenario, "goal edge has no sink".to_string()))?;
            let edge = PointsToEdge {
                source: PointerVariable::Concrete(source.clone()),
                field:  field.clone(),
                sink,
            };
            CombinedQuery::from_edge(session.clone(), edge)
        }
        Goal::Constraint{lhs, op, rhs} => {
            let c = AtomicConstraint::new(lhs.build(), *op, rhs.build(), session);
            CombinedQuery::from_constraint(session.clone(), c)
        }
    };
    Ok(q.map_err(|e|e.to_string()))
}

/// replay on an existing session, e.g. one with a scripted solver
pub fn run_with(scenario: &Scenario, session: Rc<Session>) -> Result<Report, Error> {
    let mut refutations = Vec::new();
    let mut live = match start(scenario, &session)? {
        Ok(q) => vec![q],
        Err(e) => {
            refutations.push(format!("goal: {}", e));
            Vec::new()
        }
    };

    for (n, step) in scenario.trace.iter().enumerate() {
        if live.iter().any(|q| q.found_witness() || q.is_optimistic()) {
            debug!("{}: witness before step {}", scenario.name, n);
            break;
        }
        if live.is_empty() {
            break;
        }

        let fixed = match step {
            Step::Visit{site, rules: Some(specs), ..} => {
                let rules = specs.iter()
                    .map(|r| r.build(&session, site.method))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|m|invalid(scenario, format!("step {}: {}", n, m)))?;
                Some(rules)
            }
            _ => None,
        };
        let derived = HeapRules::new(&scenario.heap);

        let mut next = Vec::new();
        for mut q in live.drain(..) {
            let mut siblings = Vec::new();
            let r = match step {
                Step::Visit{site, instr, ..} => {
                    let r = match &fixed {
                        Some(rules) => q.visit(instr, site, rules, &scenario.heap),
                        None        => q.visit(instr, site, &derived, &scenario.heap),
                    };
                    r.map(|more| {
                        siblings = more;
                    })
                }
                Step::EnterCallee{site, call, callee} => q.enter_callee(call, site, *callee),
                Step::ReturnToCaller{site, call}      => q.return_to_caller(call, site),
                Step::SkipCall{site, call}            => q.skip_call(call, site),
                Step::DeclareWitness => {
                    q.declare_witness();
                    Ok(())
                }
            };
            match r {
                Ok(()) => {
                    next.push(q);
                    next.extend(siblings);
                }
                Err(e) => refutations.push(format!("step {}: {}", n, e)),
            }
        }

        for mut q in next {
            match q.check() {
                Ok(())  => live.push(q),
                Err(e)  => refutations.push(format!("step {}: {}", n, e)),
            }
        }
        debug!("{}: {} live after step {}", scenario.name, live.len(), n);
    }

    let verdict = if live.iter().any(|q| q.found_witness() || q.is_optimistic()) {
        Verdict::Witness
    } else if live.is_empty() {
        Verdict::Refuted
    } else {
        Verdict::Open
    };

    Ok(Report {
        name:           scenario.name.clone(),
        verdict,
        expected:       scenario.expect,
        branches:       live.len(),
        refutations,
        optimistic:     session.optimistic_witnesses(),
    })
}

/// load and run every file. reports come back in input order
pub fn replay(paths: &[PathBuf], options: &Options, slow: bool) -> Vec<Result<Report, Error>> {
    use rayon::prelude::*;

    let one = |path: &PathBuf| -> Result<Report, Error> {
        let scenario = load(path)?;
        run(&scenario, options)
    };
    if slow {
        paths.iter().map(one).collect()
    } else {
        paths.par_iter().map(one).collect()
    }
}
