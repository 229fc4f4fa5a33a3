//! fieldcalc - computed-field formula engine
//!
//! Lets operators define named formulas over dynamically shaped records,
//! checks and corrects their field references, evaluates them in a sandboxed
//! interpreter and aggregates the results into chart points.
//!
//! # Features
//!
//! - JavaScript-flavoured expressions with `Math.*`, date and aggregate builtins
//! - Fuzzy correction of mistyped field names (`createdAt` -> `created_at`)
//! - Formulas referencing other formulas, with cycle detection
//! - Count / sum / average chart aggregation over record sets
//!
//! # Example
//!
//! ```
//! use fieldcalc::{evaluate_formula, Record, Scalar};
//!
//! let mut record = Record::new();
//! record.insert("won".to_string(), Scalar::Number(3.0));
//! record.insert("total".to_string(), Scalar::Number(4.0));
//!
//! let result = evaluate_formula("won / total * 100", &record, &[]);
//! assert_eq!(result.value, Some(Scalar::Number(75.0)));
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::EngineConfig;
pub use crate::core::engine::{
    aggregate, correct_formula, evaluate_field, evaluate_formula, validate_formula,
};
pub use crate::core::{dependency_order, extract_field_references, FormulaEngine};
pub use error::{CalcError, CalcResult, ErrorKind, FormulaError, FormulaResult};
pub use types::{
    AggregatedPoint, Aggregation, ChartPoints, ChartSpec, EvaluationResult, FormulaField, Record,
    ResultType, Scalar, ValidationResult,
};
