//! CLI command handlers

pub mod commands;
pub mod input;

pub use commands::{aggregate, audit, correct, evaluate, extract, validate};
