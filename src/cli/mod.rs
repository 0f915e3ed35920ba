//! Command-line interface for synth-forge.
//!
//! Provides commands for running the pipeline, resuming pending questions,
//! inspecting stage counts and preparing the database.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands, QuestionFile};
