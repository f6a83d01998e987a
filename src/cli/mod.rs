//! Command line interface
//!
//! Argument parsing and the runner that drives one invocation of the
//! `container-tags` binary.

pub mod args;
pub mod runner;

pub use args::Args;
pub use runner::Runner;
