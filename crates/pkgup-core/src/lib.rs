#![deny(clippy::all, warnings)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod check;
pub mod environment;
pub mod harness;
pub mod lazy;
pub mod makevars;
pub mod nursery;
pub mod pkgdb;
pub mod report;
pub mod summary_io;
pub mod xargs_fold;

pub use check::{
    check_installed_packages, latest_pkgnames_from_binary, latest_pkgnames_from_source,
    pkgpaths_to_check, run_check, CheckOptions, CheckReport, MissingPayload, ReportPayload,
};
pub use environment::{process_vars, Environment};
pub use harness::{Harness, HarnessError, StderrAction, Termination};
pub use lazy::Lazy;
pub use nursery::{CancelToken, Nursery};
pub use report::Reporter;
