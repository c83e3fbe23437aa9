use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use crate::error::Error;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SatResult {
    Sat,
    Unsat,
    Unknown,
}

/// the query protocol the core needs from an smt solver.
/// formulas are SMT-LIB 2 text over Int and Bool
pub trait Backend {
    fn declare_int(&mut self, name: &str) -> Result<(), Error>;
    fn declare_bool(&mut self, name: &str) -> Result<(), Error>;
    fn assert(&mut self, formula: &str) -> Result<(), Error>;
    fn check_assuming(&mut self, assumptions: &[String]) -> Result<SatResult, Error>;
}


pub fn int(v: i64) -> String {
    if v < 0 {
        format!("(- {})", v.unsigned_abs())
    } else {
        v.to_string()
    }
}

pub fn and(parts: &[String]) -> String {
    match parts.len() {
        0 => "true".to_string(),
        1 => parts[0].clone(),
        _ => format!("(and {})", parts.join(" ")),
    }
}

pub fn implies(lhs: &str, rhs: &str) -> String {
    format!("(=> {} {})", lhs, rhs)
}

pub fn not(v: &str) -> String {
    format!("(not {})", v)
}


/// z3 running as a child process, spoken to through rsmt2
pub struct Z3Process {
    solver: rsmt2::Solver<()>,
}

impl Z3Process {
    pub fn spawn(timeout_ms: u64) -> Result<Self, Error> {
        let mut conf = rsmt2::SmtConf::default_z3();
        conf.option(format!("-t:{}", timeout_ms));
        let solver = rsmt2::Solver::new(conf, ()).map_err(|e|Error::Solver(e.to_string()))?;
        Ok(Self{solver})
    }
}

impl Backend for Z3Process {
    fn declare_int(&mut self, name: &str) -> Result<(), Error> {
        self.solver.declare_const(&name.to_string(), &"Int".to_string())
            .map_err(|e|Error::Solver(e.to_string()))
    }

    fn declare_bool(&mut self, name: &str) -> Result<(), Error> {
        self.solver.declare_const(&name.to_string(), &"Bool".to_string())
            .map_err(|e|Error::Solver(e.to_string()))
    }

    fn assert(&mut self, formula: &str) -> Result<(), Error> {
        self.solver.assert(&formula.to_string())
            .map_err(|e|Error::Solver(e.to_string()))
    }

    fn check_assuming(&mut self, assumptions: &[String]) -> Result<SatResult, Error> {
        match self.solver.check_sat_assuming_or_unk::<String, _>(assumptions.iter()) {
            Ok(Some(true))  => Ok(SatResult::Sat),
            Ok(Some(false)) => Ok(SatResult::Unsat),
            Ok(None)        => Ok(SatResult::Unknown),
            Err(e)          => Err(Error::Solver(e.to_string())),
        }
    }
}


/// one incremental solver context shared by every store of a session.
///
/// each check asserts `(=> mN formula)` under a fresh marker and assumes only that
/// marker, so earlier checks never constrain later ones.
pub struct Solver {
    backend:    Box<dyn Backend>,
    declared:   HashSet<String>,
    markers:    u64,
    debug:      Option<File>,
}

impl Solver {
    pub fn new(backend: Box<dyn Backend>) -> Self {
        Self {
            backend,
            declared:   HashSet::new(),
            markers:    0,
            debug:      None,
        }
    }

    /// append everything sent to the backend to `path`
    pub fn with_transcript(mut self, path: &Path) -> Result<Self, Error> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e|Error::io(parent, e))?;
            }
        }
        let f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e|Error::io(path, e))?;
        self.debug = Some(f);
        Ok(self)
    }

    fn transcript(&mut self, line: &str) {
        if let Some(f) = &mut self.debug {
            if let Err(e) = writeln!(f, "{}", line) {
                warn!("smt transcript: {}", e);
                self.debug = None;
            }
        }
    }

    fn declare(&mut self, name: &str, bool_sort: bool) -> Result<(), Error> {
        if !self.declared.insert(name.to_string()) {
            return Ok(());
        }
        self.transcript(&format!("(declare-const {} {})", name, if bool_sort {"Bool"} else {"Int"}));
        if bool_sort {
            self.backend.declare_bool(name)
        } else {
            self.backend.declare_int(name)
        }
    }

    pub fn check(&mut self, formula: &str, ints: &[String]) -> Result<SatResult, Error> {
        for v in ints {
            self.declare(v, false)?;
        }

        self.markers += 1;
        let marker = format!("m{}", self.markers);
        self.declare(&marker, true)?;

        let assertion = implies(&marker, formula);
        self.transcript(&format!("(assert {})", assertion));
        self.backend.assert(&assertion)?;

        self.transcript(&format!("(check-sat-assuming ({}))", marker));
        let r = self.backend.check_assuming(&[marker])?;
        self.transcript(&format!("; {:?}", r));
        Ok(r)
    }
}
