//! Formula engine
//!
//! Entry point tying the extractor, validator, corrector, evaluator and
//! aggregation pipeline to one [`EngineConfig`]. The free functions at the
//! bottom use the default configuration.

use super::aggregate;
use super::dates::format_duration;
use super::formula::builtins::numeric;
use super::formula::{Evaluator, Scope};
use super::references::extract_field_references;
use super::validator;
use crate::config::EngineConfig;
use crate::error::FormulaResult;
use crate::types::{
    ChartPoints, ChartSpec, EvaluationResult, FormulaField, Record, ResultType, Scalar,
    ValidationResult,
};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct FormulaEngine {
    config: EngineConfig,
}

impl FormulaEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn extract(&self, formula: &str) -> Vec<String> {
        extract_field_references(formula)
    }

    /// Check a formula's references against a sample record
    pub fn validate(&self, formula: &str, record: &Record) -> ValidationResult {
        self.validate_with_siblings(formula, record, &[])
    }

    /// Like [`Self::validate`], with sibling formula ids counted as fields
    pub fn validate_with_siblings(
        &self,
        formula: &str,
        record: &Record,
        siblings: &[FormulaField],
    ) -> ValidationResult {
        let names = available_names(record, siblings);
        validator::validate(
            formula,
            &names,
            self.config.min_substring_match,
            self.config.max_nesting,
        )
    }

    /// Rewrite unresolved identifiers with their suggested fields
    pub fn correct(&self, formula: &str, record: &Record) -> String {
        self.correct_with_siblings(formula, record, &[])
    }

    pub fn correct_with_siblings(
        &self,
        formula: &str,
        record: &Record,
        siblings: &[FormulaField],
    ) -> String {
        let result = self.validate_with_siblings(formula, record, siblings);
        let corrected = validator::correct(formula, &result);
        if corrected != formula {
            debug!(original = formula, corrected = %corrected, "applied formula correction");
        }
        corrected
    }

    /// Evaluate formula text against one record
    pub fn evaluate_formula(
        &self,
        formula: &str,
        record: &Record,
        siblings: &[FormulaField],
    ) -> EvaluationResult {
        self.compute(formula, None, record, siblings).into()
    }

    /// Evaluate a formula field and map the value to its result type
    pub fn evaluate_field(
        &self,
        field: &FormulaField,
        record: &Record,
        siblings: &[FormulaField],
    ) -> EvaluationResult {
        self.compute(&field.formula, Some(field.id.as_str()), record, siblings)
            .and_then(|value| map_result_type(value, field.result_type))
            .into()
    }

    /// Chart points for every chart over the record set
    pub fn aggregate(
        &self,
        records: &[Record],
        formulas: &[FormulaField],
        charts: &[ChartSpec],
    ) -> Vec<ChartPoints> {
        aggregate::aggregate_with(self, records, formulas, charts)
    }

    fn compute<'a>(
        &self,
        formula: &str,
        owner: Option<&'a str>,
        record: &'a Record,
        siblings: &'a [FormulaField],
    ) -> FormulaResult<Scalar> {
        let scope = Scope {
            record,
            siblings,
            now: self.config.now(),
            max_steps: self.config.max_steps,
            max_nesting: self.config.max_nesting,
        };
        Evaluator::new(scope).run(formula, owner)
    }
}

/// Record fields first, then sibling ids not already present
fn available_names<'a>(record: &'a Record, siblings: &'a [FormulaField]) -> Vec<&'a str> {
    let mut names: Vec<&str> = record.keys().map(String::as_str).collect();
    for field in siblings {
        if !names.contains(&field.id.as_str()) {
            names.push(field.id.as_str());
        }
    }
    names
}

/// Apply a declared result type. Only `duration` transforms the value
/// (seconds to text); the other types pass through.
pub fn map_result_type(value: Scalar, result_type: ResultType) -> FormulaResult<Scalar> {
    match result_type {
        ResultType::Duration => {
            let seconds = numeric("duration result", &value)?;
            Ok(Scalar::Text(format_duration(seconds)))
        }
        ResultType::Number | ResultType::String | ResultType::Date | ResultType::Boolean => {
            Ok(value)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Default-configured operations
// ═══════════════════════════════════════════════════════════════════════════

pub fn validate_formula(formula: &str, record: &Record) -> ValidationResult {
    FormulaEngine::default().validate(formula, record)
}

pub fn correct_formula(formula: &str, record: &Record) -> String {
    FormulaEngine::default().correct(formula, record)
}

pub fn evaluate_formula(formula: &str, record: &Record, siblings: &[FormulaField]) -> EvaluationResult {
    FormulaEngine::default().evaluate_formula(formula, record, siblings)
}

pub fn evaluate_field(field: &FormulaField, record: &Record, siblings: &[FormulaField]) -> EvaluationResult {
    FormulaEngine::default().evaluate_field(field, record, siblings)
}

pub fn aggregate(records: &[Record], formulas: &[FormulaField], charts: &[ChartSpec]) -> Vec<ChartPoints> {
    FormulaEngine::default().aggregate(records, formulas, charts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, FormulaError};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn record(pairs: &[(&str, Scalar)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn date(y: i32, m: u32, d: u32) -> Scalar {
        Scalar::Date(Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap())
    }

    #[test]
    fn test_date_difference_one_day() {
        let rec = record(&[
            ("created_at", date(2024, 1, 1)),
            ("converted_at", date(2024, 1, 2)),
        ]);
        let result = evaluate_formula("converted_at - created_at", &rec, &[]);
        assert_eq!(result.value, Some(Scalar::Number(86400.0)));
        assert!(result.error.is_none());

        // Order does not matter
        let result = evaluate_formula("created_at - converted_at", &rec, &[]);
        assert_eq!(result.value, Some(Scalar::Number(86400.0)));
    }

    #[test]
    fn test_date_difference_accepts_date_text() {
        let rec = record(&[
            ("start", Scalar::text("2024-03-01 08:00:00")),
            ("end", Scalar::text("2024-03-01T08:01:30Z")),
        ]);
        let result = evaluate_formula("end - start", &rec, &[]);
        assert_eq!(result.value, Some(Scalar::Number(90.0)));
    }

    #[test]
    fn test_date_difference_invalid_date() {
        let rec = record(&[
            ("created_at", date(2024, 1, 1)),
            ("closed_at", Scalar::text("not a date")),
        ]);
        let result = evaluate_formula("closed_at - created_at", &rec, &[]);
        assert!(result.value.is_none());
        assert_eq!(
            result.error,
            Some(FormulaError::InvalidDate {
                field: "closed_at".to_string(),
                raw: "not a date".to_string(),
            })
        );
    }

    #[test]
    fn test_date_difference_missing_field() {
        let rec = record(&[("created_at", date(2024, 1, 1))]);
        let result = evaluate_formula("closed_at - created_at", &rec, &[]);
        assert_eq!(result.error_kind(), Some(ErrorKind::MissingFieldError));
    }

    #[test]
    fn test_numeric_subtraction_uses_general_path() {
        let rec = record(&[("revenue", Scalar::Number(100.0)), ("cost", Scalar::Number(40.0))]);
        let result = evaluate_formula("revenue - cost", &rec, &[]);
        assert_eq!(result.value, Some(Scalar::Number(60.0)));
    }

    #[test]
    fn test_syntax_error_never_yields_a_value() {
        let rec = record(&[("a", Scalar::Number(1.0)), ("b", Scalar::Number(2.0))]);
        let result = evaluate_formula("(a + b", &rec, &[]);
        assert!(result.value.is_none());
        assert_eq!(result.error_kind(), Some(ErrorKind::SyntaxError));
    }

    #[test]
    fn test_duration_result_type() {
        let rec = record(&[
            ("created_at", date(2024, 1, 1)),
            ("converted_at", date(2024, 1, 3)),
        ]);
        let field = FormulaField::new(
            "time_to_convert",
            "Time to convert",
            "converted_at - created_at",
            ResultType::Duration,
        );
        let result = evaluate_field(&field, &rec, &[]);
        assert_eq!(result.value, Some(Scalar::text("2 days")));
    }

    #[test]
    fn test_map_result_type() {
        assert_eq!(
            map_result_type(Scalar::Number(45.0), ResultType::Duration).unwrap(),
            Scalar::text("45 seconds")
        );
        assert_eq!(
            map_result_type(Scalar::Number(7200.0), ResultType::Duration).unwrap(),
            Scalar::text("2 hours")
        );
        assert_eq!(
            map_result_type(Scalar::text("x"), ResultType::String).unwrap(),
            Scalar::text("x")
        );
        assert!(map_result_type(Scalar::text("x"), ResultType::Duration).is_err());
    }

    #[test]
    fn test_field_references_sibling() {
        let rec = record(&[("won", Scalar::Number(3.0)), ("lost", Scalar::Number(1.0))]);
        let siblings = vec![
            FormulaField::new("total", "Total", "won + lost", ResultType::Number),
            FormulaField::new("win_rate", "Win rate", "won / total * 100", ResultType::Number),
        ];
        let result = evaluate_field(&siblings[1], &rec, &siblings);
        assert_eq!(result.value, Some(Scalar::Number(75.0)));
    }

    #[test]
    fn test_mutual_recursion() {
        let siblings = vec![
            FormulaField::new("a", "A", "b * 2", ResultType::Number),
            FormulaField::new("b", "B", "a / 2", ResultType::Number),
        ];
        let result = evaluate_field(&siblings[0], &Record::new(), &siblings);
        assert_eq!(result.error_kind(), Some(ErrorKind::CircularReferenceError));
        assert!(result.value.is_none());
    }

    #[test]
    fn test_fixed_clock_from_config() {
        let config = EngineConfig {
            now: Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()),
            ..EngineConfig::default()
        };
        let engine = FormulaEngine::new(config);
        let rec = record(&[("created_at", date(2024, 5, 1))]);
        let result = engine.evaluate_formula("daysBetween(CURRENT_TIMESTAMP, created_at)", &rec, &[]);
        assert_eq!(result.value, Some(Scalar::Number(31.0)));
    }

    #[test]
    fn test_validate_counts_sibling_ids() {
        let rec = record(&[("won", Scalar::Number(3.0))]);
        let siblings = vec![FormulaField::new("total", "Total", "won + 1", ResultType::Number)];
        let engine = FormulaEngine::default();
        assert!(!engine.validate("won / total", &rec).is_valid);
        assert!(engine.validate_with_siblings("won / total", &rec, &siblings).is_valid);
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_public_types_are_send_sync() {
        assert_send_sync::<FormulaEngine>();
        assert_send_sync::<EngineConfig>();
        assert_send_sync::<FormulaField>();
        assert_send_sync::<Record>();
        assert_send_sync::<Scalar>();
        assert_send_sync::<EvaluationResult>();
        assert_send_sync::<ValidationResult>();
        assert_send_sync::<ChartSpec>();
        assert_send_sync::<ChartPoints>();
        assert_send_sync::<FormulaError>();
    }

    #[test]
    fn test_engine_shared_across_threads() {
        let engine = FormulaEngine::default();
        let records: Vec<Record> = (1..=4)
            .map(|n| record(&[("n", Scalar::Number(n as f64))]))
            .collect();
        let values: Vec<Option<Scalar>> = std::thread::scope(|s| {
            let handles: Vec<_> = records
                .iter()
                .map(|rec| {
                    let engine = &engine;
                    s.spawn(move || engine.evaluate_formula("n * 10", rec, &[]).value)
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(
            values,
            vec![
                Some(Scalar::Number(10.0)),
                Some(Scalar::Number(20.0)),
                Some(Scalar::Number(30.0)),
                Some(Scalar::Number(40.0)),
            ]
        );
    }

    #[test]
    fn test_correct_then_evaluate() {
        let rec = record(&[
            ("created_at", date(2024, 1, 1)),
            ("converted_at", date(2024, 1, 2)),
        ]);
        let corrected = correct_formula("convertedAt - createdAt", &rec);
        assert_eq!(corrected, "converted_at - created_at");
        assert_eq!(
            evaluate_formula(&corrected, &rec, &[]).value,
            Some(Scalar::Number(86400.0))
        );
    }
}
