#[macro_use] extern crate log;

use clap::{App, AppSettings, Arg, SubCommand};
use std::path::{Path, PathBuf};
use backsym::config::{self, SolverKind};
use backsym::scenario;

fn main() {
    backsym::init_logging();

    let matches = App::new("backsym")
        .version(clap::crate_version!())
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("replay")
                .about("replay recorded walks against the query core")
                .arg(Arg::with_name("config")
                     .takes_value(true)
                     .required(false)
                     .long("config")
                     .help("config file instead of searching for backsym.toml"))
                .arg(Arg::with_name("no-solver")
                     .long("no-solver")
                     .help("decide feasibility by constant evaluation only"))
                .arg(Arg::with_name("smt-timeout")
                     .takes_value(true)
                     .long("smt-timeout")
                     .help("solver timeout in milliseconds"))
                .arg(Arg::with_name("smt-transcript")
                     .takes_value(true)
                     .long("smt-transcript")
                     .help("append everything sent to the solver to this file"))
                .arg(Arg::with_name("slow")
                     .long("slow")
                     .help("run scenarios one after another"))
                .arg(Arg::with_name("scenarios")
                     .multiple(true)
                     .required(true)
                     .help("scenario json files"))
        )
        .get_matches();

    if let ("replay", Some(submatches)) = matches.subcommand() {
        let loaded = match submatches.value_of("config") {
            Some(path) => config::load(Path::new(path)),
            None       => config::load_cwd(),
        };
        let mut options = match loaded {
            Ok(c) => c.query,
            Err(e) => {
                error!("{}", e);
                std::process::exit(9);
            }
        };

        if submatches.is_present("no-solver") {
            options.solver = SolverKind::None;
        }
        if let Some(ms) = submatches.value_of("smt-timeout") {
            options.smt_timeout = match ms.parse() {
                Ok(v) => v,
                Err(_) => {
                    error!("--smt-timeout: not a number: {}", ms);
                    std::process::exit(9);
                }
            };
        }
        if let Some(path) = submatches.value_of("smt-transcript") {
            options.smt_transcript = Some(PathBuf::from(path));
        }

        let paths : Vec<PathBuf> = submatches.values_of("scenarios")
            .map(|v| v.map(PathBuf::from).collect())
            .unwrap_or_default();

        let mut failed = false;
        for (path, report) in paths.iter().zip(scenario::replay(&paths, &options, submatches.is_present("slow"))) {
            match report {
                Ok(report) => {
                    if report.matches() {
                        info!("{}", report);
                    } else {
                        error!("{}", report);
                        failed = true;
                    }
                    for r in &report.refutations {
                        debug!("  {}", r);
                    }
                }
                Err(e) => {
                    error!("{}: {}", path.display(), e);
                    failed = true;
                }
            }
        }
        if failed {
            std::process::exit(1);
        }
    }
}
