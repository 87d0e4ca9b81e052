//! Long-running and one-shot election commands.

mod once;
mod run;

pub use once::{try_once, OnceOutcome};
pub use run::run_electors;
