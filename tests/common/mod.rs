use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use backsym::config::Options;
use backsym::error::Error;
use backsym::session::Session;
use backsym::smt::{Backend, SatResult};

#[derive(Default, Debug)]
pub struct Log {
    pub declared:   Vec<String>,
    pub asserted:   Vec<String>,
    pub checks:     usize,
}

/// answers check-sat from a script. once the script runs out everything is sat
pub struct ScriptedSolver {
    log:        Rc<RefCell<Log>>,
    answers:    VecDeque<SatResult>,
}

impl Backend for ScriptedSolver {
    fn declare_int(&mut self, name: &str) -> Result<(), Error> {
        self.log.borrow_mut().declared.push(name.to_string());
        Ok(())
    }

    fn declare_bool(&mut self, name: &str) -> Result<(), Error> {
        self.log.borrow_mut().declared.push(name.to_string());
        Ok(())
    }

    fn assert(&mut self, formula: &str) -> Result<(), Error> {
        self.log.borrow_mut().asserted.push(formula.to_string());
        Ok(())
    }

    fn check_assuming(&mut self, _: &[String]) -> Result<SatResult, Error> {
        self.log.borrow_mut().checks += 1;
        Ok(self.answers.pop_front().unwrap_or(SatResult::Sat))
    }
}

pub fn scripted(answers: Vec<SatResult>) -> (Rc<Session>, Rc<RefCell<Log>>) {
    let log = Rc::new(RefCell::new(Log::default()));
    let solver = ScriptedSolver {
        log:        log.clone(),
        answers:    answers.into_iter().collect(),
    };
    let session = Session::with_backend(Options::default(), Box::new(solver)).unwrap();
    (session, log)
}
