use std::path::{Path, PathBuf};
use backsym::config::{self, Options, SolverKind};
use backsym::scenario::{self, Verdict};
use test_log::test;

fn demos() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("demos")
}

fn offline() -> Options {
    let mut o = Options::default();
    o.solver = SolverKind::None;
    o
}

fn scenario_files() -> Vec<PathBuf> {
    let mut files : Vec<PathBuf> = std::fs::read_dir(demos()).unwrap()
        .map(|e|e.unwrap().path())
        .filter(|p| p.extension().map(|e|e == "json").unwrap_or(false))
        .collect();
    files.sort();
    files
}

#[test]
fn every_demo_meets_its_expectation() {
    let files = scenario_files();
    assert!(files.len() >= 4);
    for path in &files {
        let s = scenario::load(path).unwrap();
        let report = scenario::run(&s, &offline()).unwrap();
        assert!(report.matches(), "{}", report);
    }
}

#[test]
fn parallel_replay_keeps_input_order() {
    let files = scenario_files();
    let reports = scenario::replay(&files, &offline(), false);
    assert_eq!(reports.len(), files.len());
    for (path, report) in files.iter().zip(reports) {
        let s = scenario::load(path).unwrap();
        assert_eq!(report.unwrap().name, s.name);
    }
}

#[test]
fn specific_verdicts() {
    let load = |name: &str| scenario::load(&demos().join(name)).unwrap();
    let r = scenario::run(&load("store_then_load.json"), &offline()).unwrap();
    assert_eq!(r.verdict, Verdict::Witness);
    let r = scenario::run(&load("constant_folding.json"), &offline()).unwrap();
    assert_eq!(r.verdict, Verdict::Refuted);
    assert!(r.refutations[0].contains("step 1"));
}

#[test]
fn missing_scenario_is_an_error() {
    assert!(scenario::load(&demos().join("nope.json")).is_err());
    let reports = scenario::replay(&[demos().join("nope.json")], &offline(), true);
    assert!(reports[0].is_err());
}

#[test]
fn demo_config_parses() {
    let c = config::load(&demos().join("backsym.toml")).unwrap();
    assert_eq!(c.query.solver, SolverKind::Z3);
    assert_eq!(c.query.max_path_constraints, 16);
    assert!(c.query.smt_transcript.is_none());
}
