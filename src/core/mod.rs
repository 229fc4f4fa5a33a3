//! Core formula engine: extraction, validation, evaluation and aggregation

pub mod aggregate;
pub mod dates;
pub mod engine;
pub mod formula;
pub mod graph;
pub mod references;
pub mod validator;

pub use engine::FormulaEngine;
pub use graph::dependency_order;
pub use references::extract_field_references;
