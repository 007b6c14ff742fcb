mod config;
mod ops;
mod run;
mod teardown;

pub use dnsrouted_cli::Cli;
pub use run::{run, run_with_args};
