#[macro_use] extern crate log;
extern crate rayon;

pub mod config;
pub mod constraint;
pub mod edge;
pub mod error;
pub mod heap;
pub mod ir;
pub mod path;
pub mod pointer;
pub mod pointsto;
pub mod query;
pub mod rules;
pub mod scenario;
pub mod session;
pub mod smt;
pub mod term;

pub use error::{Error, Refutation, Visit};
pub use query::CombinedQuery;


/// RUST_LOG defaults to info
pub fn init_logging() {
    if let Err(_) = std::env::var("RUST_LOG") {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::builder()
        .format_timestamp(None)
        .format_module_path(false)
        .init();
}
