//! Formula evaluator
//!
//! Tree-walking interpreter over the closed AST. The only names a formula
//! can read are the record's fields, sibling formulas (evaluated lazily and
//! cycle-guarded) and the builtins in [`super::builtins`].
//!
//! A formula that is exactly `fieldA - fieldB` over date-like values is
//! answered directly as the absolute difference in whole seconds.

use super::builtins::{self, numeric};
use super::parser::{parse_formula, Expr};
use crate::core::dates::as_date;
use crate::core::references::{extract_field_references, is_builtin, is_reserved};
use crate::error::{FormulaError, FormulaResult};
use crate::types::{FormulaField, Record, Scalar};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

/// `fieldA - fieldB` and nothing else
static DATE_DIFFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*-\s*([A-Za-z_][A-Za-z0-9_]*)\s*$")
        .expect("date difference pattern is a valid regex")
});

/// Read-only inputs of one evaluation
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub record: &'a Record,
    pub siblings: &'a [FormulaField],
    pub now: DateTime<Utc>,
    pub max_steps: usize,
    pub max_nesting: usize,
}

/// Evaluation state: the chain of formulas currently being evaluated, a memo
/// of sibling values and the node-visit budget.
pub struct Evaluator<'a> {
    scope: Scope<'a>,
    in_progress: Vec<&'a str>,
    memo: HashMap<(&'a str, Vec<&'a str>), Scalar>,
    steps: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(scope: Scope<'a>) -> Self {
        Self {
            scope,
            in_progress: Vec::new(),
            memo: HashMap::new(),
            steps: 0,
        }
    }

    /// Evaluate formula text. `owner` is the id of the formula field the
    /// text belongs to; it stays invisible to everything the text reaches.
    pub fn run(&mut self, formula: &str, owner: Option<&'a str>) -> FormulaResult<Scalar> {
        if let Some(id) = owner {
            self.in_progress.push(id);
        }
        let result = self.run_in_scope(formula);
        if owner.is_some() {
            self.in_progress.pop();
        }
        result
    }

    fn run_in_scope(&mut self, formula: &str) -> FormulaResult<Scalar> {
        if let Some(seconds) = self.date_difference(formula)? {
            return Ok(seconds);
        }

        let expr = parse_formula(formula, self.scope.max_nesting)?;

        for name in extract_field_references(formula) {
            self.check_reference(&name)?;
        }

        let value = self.evaluate(&expr)?;
        ensure_finite(value)
    }

    /// `Ok(None)` hands the formula to the general path: the pattern does
    /// not match, an operand is a visible sibling or builtin, or neither
    /// value is date-like (plain numeric subtraction).
    fn date_difference(&mut self, formula: &str) -> FormulaResult<Option<Scalar>> {
        let Some(caps) = DATE_DIFFERENCE.captures(formula) else {
            return Ok(None);
        };
        let (a, b) = (&caps[1], &caps[2]);

        let plain_field = |name: &str| {
            let visible_sibling = self.sibling(name).is_some() && !self.is_in_progress(name);
            !is_reserved(name) && !is_builtin(name) && !visible_sibling
        };
        if !plain_field(a) || !plain_field(b) {
            return Ok(None);
        }

        let record = self.scope.record;
        let (left, right) = (record.get(a), record.get(b));
        if !left.into_iter().chain(right).any(|v| as_date(v).is_some()) {
            return Ok(None);
        }

        self.tick()?;
        let start = field_date(a, left)?;
        let end = field_date(b, right)?;
        Ok(Some(Scalar::Number((start - end).num_seconds().abs() as f64)))
    }

    fn sibling(&self, name: &str) -> Option<&'a FormulaField> {
        let siblings: &'a [FormulaField] = self.scope.siblings;
        siblings.iter().find(|f| f.id == name)
    }

    fn is_in_progress(&self, name: &str) -> bool {
        self.in_progress.iter().any(|id| *id == name)
    }

    fn circular(&self, name: &str) -> FormulaError {
        let mut chain: Vec<&str> = self.in_progress.clone();
        chain.push(name);
        FormulaError::CircularReference(chain.join(" -> "))
    }

    /// Every candidate must resolve before anything is evaluated
    fn check_reference(&self, name: &str) -> FormulaResult<()> {
        let visible_sibling = self.sibling(name).is_some() && !self.is_in_progress(name);
        if visible_sibling || self.scope.record.contains_key(name) {
            Ok(())
        } else if self.is_in_progress(name) {
            Err(self.circular(name))
        } else {
            Err(FormulaError::MissingField(name.to_string()))
        }
    }

    /// Resolve a bare identifier: constants, then visible siblings, then
    /// record fields
    fn lookup(&mut self, name: &str) -> FormulaResult<Scalar> {
        if let Some(value) = builtins::constant(name, self.scope.now) {
            return Ok(value);
        }

        if !self.is_in_progress(name) {
            if let Some(field) = self.sibling(name) {
                return self.sibling_value(field);
            }
        }

        if let Some(value) = self.scope.record.get(name) {
            return Ok(value.clone());
        }

        if self.is_in_progress(name) {
            Err(self.circular(name))
        } else if is_builtin(name) {
            Err(FormulaError::runtime(format!(
                "'{}' is a builtin and cannot be used as a value",
                name
            )))
        } else {
            Err(FormulaError::MissingField(name.to_string()))
        }
    }

    fn sibling_value(&mut self, field: &'a FormulaField) -> FormulaResult<Scalar> {
        let key = (field.id.as_str(), self.in_progress.clone());
        if let Some(value) = self.memo.get(&key) {
            return Ok(value.clone());
        }

        debug!(formula = %field.id, depth = self.in_progress.len(), "evaluating sibling formula");
        let value = self.run(&field.formula, Some(field.id.as_str()))?;
        self.memo.insert(key, value.clone());
        Ok(value)
    }

    fn tick(&mut self) -> FormulaResult<()> {
        self.steps += 1;
        if self.steps > self.scope.max_steps {
            return Err(FormulaError::runtime(format!(
                "Evaluation exceeded the budget of {} steps",
                self.scope.max_steps
            )));
        }
        Ok(())
    }

    /// Evaluate an expression node
    pub fn evaluate(&mut self, expr: &Expr) -> FormulaResult<Scalar> {
        self.tick()?;

        match expr {
            Expr::Number(n) => Ok(Scalar::Number(*n)),

            Expr::Text(s) => Ok(Scalar::Text(s.clone())),

            Expr::Boolean(b) => Ok(Scalar::Bool(*b)),

            Expr::Null => Ok(Scalar::Null),

            Expr::Identifier(name) => self.lookup(name),

            Expr::Member { object, property } => self.evaluate_member(expr, object, property),

            Expr::Call { callee, args } => {
                let path = callee
                    .path()
                    .ok_or_else(|| FormulaError::runtime("Only named builtins can be called"))?;
                let values = args
                    .iter()
                    .map(|arg| self.evaluate(arg))
                    .collect::<FormulaResult<Vec<_>>>()?;

                match builtins::call(&path, &values, self.scope.now) {
                    Some(result) => result,
                    None => Err(FormulaError::runtime(format!("'{}' is not a function", path))),
                }
            }

            Expr::UnaryOp { op, operand } => {
                let value = self.evaluate(operand)?;
                evaluate_unary_op(op, &value)
            }

            Expr::BinaryOp { op, left, right } => match op.as_str() {
                "&&" => {
                    let l = self.evaluate(left)?;
                    if l.is_truthy() {
                        self.evaluate(right)
                    } else {
                        Ok(l)
                    }
                }
                "||" => {
                    let l = self.evaluate(left)?;
                    if l.is_truthy() {
                        Ok(l)
                    } else {
                        self.evaluate(right)
                    }
                }
                "??" => {
                    let l = self.evaluate(left)?;
                    if l.is_null() {
                        self.evaluate(right)
                    } else {
                        Ok(l)
                    }
                }
                _ => {
                    let l = self.evaluate(left)?;
                    let r = self.evaluate(right)?;
                    evaluate_binary_op(op, &l, &r)
                }
            },

            Expr::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.evaluate(then_branch)
                } else {
                    self.evaluate(else_branch)
                }
            }
        }
    }

    fn evaluate_member(&mut self, expr: &Expr, object: &Expr, property: &str) -> FormulaResult<Scalar> {
        if let Some(path) = expr.path() {
            if let Some(value) = builtins::constant(&path, self.scope.now) {
                return Ok(value);
            }
            if matches!(object, Expr::Identifier(ns) if ns == "Math" || ns == "Date") {
                return Err(FormulaError::runtime(format!(
                    "'{}' is not a value (call it as a function)",
                    path
                )));
            }
        }

        match (self.evaluate(object)?, property) {
            (Scalar::Text(s), "length") => Ok(Scalar::Number(s.chars().count() as f64)),
            (value, _) => Err(FormulaError::runtime(format!(
                "Cannot read property '{}' of {}",
                property,
                value.type_name()
            ))),
        }
    }
}

fn field_date(field: &str, value: Option<&Scalar>) -> FormulaResult<DateTime<Utc>> {
    let value = value.ok_or_else(|| FormulaError::MissingField(field.to_string()))?;
    as_date(value).ok_or_else(|| FormulaError::InvalidDate {
        field: field.to_string(),
        raw: value.to_string(),
    })
}

/// NaN and infinities never escape as results
fn ensure_finite(value: Scalar) -> FormulaResult<Scalar> {
    match value {
        Scalar::Number(n) if !n.is_finite() => Err(FormulaError::runtime(format!(
            "Result is not a finite number ({})",
            n
        ))),
        other => Ok(other),
    }
}

fn evaluate_unary_op(op: &str, operand: &Scalar) -> FormulaResult<Scalar> {
    match op {
        "-" => Ok(Scalar::Number(-numeric("unary '-'", operand)?)),
        "+" => Ok(Scalar::Number(numeric("unary '+'", operand)?)),
        "!" => Ok(Scalar::Bool(!operand.is_truthy())),
        "typeof" => Ok(Scalar::text(match operand {
            Scalar::Null | Scalar::Date(_) => "object",
            other => other.type_name(),
        })),
        _ => Err(FormulaError::runtime(format!("Unknown unary operator: {}", op))),
    }
}

fn evaluate_binary_op(op: &str, left: &Scalar, right: &Scalar) -> FormulaResult<Scalar> {
    let context = format!("operator '{}'", op);

    match op {
        "+" => {
            if matches!(left, Scalar::Text(_)) || matches!(right, Scalar::Text(_)) {
                Ok(Scalar::Text(format!("{}{}", left, right)))
            } else {
                Ok(Scalar::Number(left.to_number() + right.to_number()))
            }
        }
        "-" => Ok(Scalar::Number(
            numeric(&context, left)? - numeric(&context, right)?,
        )),
        "*" => Ok(Scalar::Number(
            numeric(&context, left)? * numeric(&context, right)?,
        )),
        "/" => {
            let l = numeric(&context, left)?;
            let r = numeric(&context, right)?;
            if r == 0.0 {
                Err(FormulaError::runtime("Division by zero"))
            } else {
                Ok(Scalar::Number(l / r))
            }
        }
        "%" => {
            let l = numeric(&context, left)?;
            let r = numeric(&context, right)?;
            if r == 0.0 {
                Err(FormulaError::runtime("Modulo by zero"))
            } else {
                Ok(Scalar::Number(l % r))
            }
        }
        "**" => Ok(Scalar::Number(
            numeric(&context, left)?.powf(numeric(&context, right)?),
        )),

        "==" => Ok(Scalar::Bool(loose_equals(left, right))),
        "!=" => Ok(Scalar::Bool(!loose_equals(left, right))),
        "===" => Ok(Scalar::Bool(strict_equals(left, right))),
        "!==" => Ok(Scalar::Bool(!strict_equals(left, right))),

        "<" => Ok(Scalar::Bool(compare(left, right) == Some(Ordering::Less))),
        ">" => Ok(Scalar::Bool(compare(left, right) == Some(Ordering::Greater))),
        "<=" => Ok(Scalar::Bool(matches!(
            compare(left, right),
            Some(Ordering::Less | Ordering::Equal)
        ))),
        ">=" => Ok(Scalar::Bool(matches!(
            compare(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        ))),

        _ => Err(FormulaError::runtime(format!("Unknown operator: {}", op))),
    }
}

fn strict_equals(left: &Scalar, right: &Scalar) -> bool {
    match (left, right) {
        (Scalar::Date(l), Scalar::Date(r)) => l == r,
        _ => left == right,
    }
}

/// `==`: like `===`, but numbers, numeric text, booleans and dates compare
/// by numeric value
fn loose_equals(left: &Scalar, right: &Scalar) -> bool {
    match (left, right) {
        (Scalar::Null, Scalar::Null) => true,
        (Scalar::Null, _) | (_, Scalar::Null) => false,
        (Scalar::Text(l), Scalar::Text(r)) => l == r,
        _ => {
            let (l, r) = (left.to_number(), right.to_number());
            !l.is_nan() && l == r
        }
    }
}

/// Text compares lexicographically with text; everything else numerically.
/// `None` means unordered (NaN involved).
fn compare(left: &Scalar, right: &Scalar) -> Option<Ordering> {
    match (left, right) {
        (Scalar::Text(l), Scalar::Text(r)) => Some(l.cmp(r)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    }
}
