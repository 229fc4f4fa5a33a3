//! Expression language: tokenizer, parser, builtins and interpreter

pub mod builtins;
pub mod evaluator;
pub mod parser;
pub mod tokenizer;

pub use evaluator::{Evaluator, Scope};
pub use parser::{parse_formula, Expr};
