use serde::{Serialize, Deserialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use crate::error::Error;


#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum SolverKind {
    #[serde(rename = "z3")]
    Z3,
    /// feasibility is decided by constant evaluation alone
    #[serde(rename = "none")]
    None,
}

impl Default for SolverKind {
    fn default() -> Self {
        SolverKind::Z3
    }
}


/// toggles consumed by the query core
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Options {
    /// model array indices through fresh index names instead of dropping array constraints
    #[serde(default = "default_true")]
    pub index_sensitivity:          bool,

    /// allow intersecting symbolic candidate sets. when off, merges only ever widen
    #[serde(default = "default_true")]
    pub narrow_from_constraints:    bool,

    /// constraints beyond this are refused by the path store
    #[serde(default = "default_max_path_constraints")]
    pub max_path_constraints:       usize,

    #[serde(default)]
    pub solver:                     SolverKind,

    /// milliseconds
    #[serde(default = "default_smt_timeout")]
    pub smt_timeout:                u64,

    #[serde(default)]
    pub smt_transcript:             Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_max_path_constraints() -> usize {
    16
}

fn default_smt_timeout() -> u64 {
    5000
}

impl Default for Options {
    fn default() -> Self {
        Self {
            index_sensitivity:          true,
            narrow_from_constraints:    true,
            max_path_constraints:       default_max_path_constraints(),
            solver:                     SolverKind::Z3,
            smt_timeout:                default_smt_timeout(),
            smt_transcript:             None,
        }
    }
}


#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub query:  Options,
}

pub const CONFIG_FILE: &str = "backsym.toml";

pub fn load(path: &Path) -> Result<Config, Error> {
    let mut f = File::open(path).map_err(|e|Error::io(path, e))?;
    let mut s = String::new();
    f.read_to_string(&mut s).map_err(|e|Error::io(path, e))?;
    parse(path, &s)
}

pub fn parse(path: &Path, s: &str) -> Result<Config, Error> {
    let c : Config = toml::from_str(s).map_err(|e|Error::Config{
        path:       path.into(),
        message:    e.to_string(),
    })?;

    if c.query.max_path_constraints == 0 {
        return Err(Error::Config{
            path:       path.into(),
            message:    "max_path_constraints must be at least 1".to_string(),
        });
    }
    Ok(c)
}

/// search for backsym.toml in the current directory and its parents
pub fn load_cwd() -> Result<Config, Error> {
    let cwd = std::env::current_dir().map_err(|e|Error::io(".", e))?;
    let mut search : &Path = &cwd;
    loop {
        let candidate = search.join(CONFIG_FILE);
        if candidate.exists() {
            debug!("using config {:?}", candidate);
            return load(&candidate);
        }
        search = match search.parent() {
            Some(v) => v,
            None    => return Ok(Config::default()),
        };
    }
}
