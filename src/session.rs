use std::cell::{Cell, RefCell};
use std::rc::Rc;
use crate::config::{Options, SolverKind};
use crate::constraint::ConstraintId;
use crate::error::Error;
use crate::smt::{self, Backend, SatResult};


/// state shared by every store copy of one search.
///
/// hands out fresh names, owns the solver, and carries the sticky flag that is set
/// once the solver could not decide a query. stores hold it behind an `Rc`, so the
/// solver process lives until the last branch is dropped.
pub struct Session {
    pub options:        Options,
    ids:                Cell<u64>,
    constraint_ids:     Cell<u64>,
    solver_disabled:    Cell<bool>,
    optimistic:         Cell<usize>,
    solver:             RefCell<Option<smt::Solver>>,
}

impl Session {
    /// spawn the solver named in `options`
    pub fn new(options: Options) -> Result<Rc<Self>, Error> {
        match options.solver {
            SolverKind::Z3 => {
                let backend = smt::Z3Process::spawn(options.smt_timeout)?;
                Self::with_backend(options, Box::new(backend))
            }
            SolverKind::None => Ok(Self::offline(options)),
        }
    }

    pub fn with_backend(options: Options, backend: Box<dyn Backend>) -> Result<Rc<Self>, Error> {
        let mut solver = smt::Solver::new(backend);
        if let Some(path) = &options.smt_transcript {
            solver = solver.with_transcript(path)?;
        }
        let session = Self::build(options, Some(solver));
        Ok(Rc::new(session))
    }

    /// no solver at all. feasibility is decided by constant evaluation
    pub fn offline(options: Options) -> Rc<Self> {
        Rc::new(Self::build(options, None))
    }

    fn build(options: Options, solver: Option<smt::Solver>) -> Self {
        Self {
            options,
            ids:                Cell::new(0),
            constraint_ids:     Cell::new(0),
            solver_disabled:    Cell::new(false),
            optimistic:         Cell::new(0),
            solver:             RefCell::new(solver),
        }
    }

    /// ids for symbolic variables and array index names
    pub fn fresh_id(&self) -> u64 {
        let id = self.ids.get();
        self.ids.set(id + 1);
        id
    }

    pub fn fresh_constraint_id(&self) -> ConstraintId {
        let id = self.constraint_ids.get();
        self.constraint_ids.set(id + 1);
        ConstraintId(id)
    }

    pub fn has_solver(&self) -> bool {
        self.solver.borrow().is_some()
    }

    pub fn solver_disabled(&self) -> bool {
        self.solver_disabled.get()
    }

    pub fn note_optimistic_witness(&self) {
        self.optimistic.set(self.optimistic.get() + 1);
    }

    pub fn optimistic_witnesses(&self) -> usize {
        self.optimistic.get()
    }

    /// Unknown when there is no solver, the solver gave up earlier, or it gives up now
    pub fn check(&self, formula: &str, ints: &[String]) -> SatResult {
        if self.solver_disabled.get() {
            return SatResult::Unknown;
        }
        let mut solver = self.solver.borrow_mut();
        let solver = match solver.as_mut() {
            Some(v) => v,
            None    => return SatResult::Unknown,
        };
        match solver.check(formula, ints) {
            Ok(SatResult::Unknown) => {
                warn!("smt solver could not decide a path, assuming feasible from here on. \
                       you can increase the timeout with --smt-timeout");
                self.solver_disabled.set(true);
                SatResult::Unknown
            }
            Ok(r) => r,
            Err(e) => {
                warn!("{}, assuming feasible from here on", e);
                self.solver_disabled.set(true);
                SatResult::Unknown
            }
        }
    }
}
