//! Error handling tests

use fieldcalc::{
    evaluate_formula, CalcError, EngineConfig, ErrorKind, EvaluationResult, FormulaError, Record,
    Scalar,
};
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_error_kind_names() {
    let cases = [
        (FormulaError::syntax("Unexpected token", 3), "SyntaxError"),
        (FormulaError::MissingField("x".into()), "MissingFieldError"),
        (
            FormulaError::InvalidDate {
                field: "d".into(),
                raw: "soon".into(),
            },
            "InvalidDateError",
        ),
        (
            FormulaError::CircularReference("a -> a".into()),
            "CircularReferenceError",
        ),
        (FormulaError::runtime("boom"), "EvaluationRuntimeError"),
    ];
    for (error, name) in cases {
        assert_eq!(error.kind().to_string(), name);
    }
}

#[test]
fn test_error_messages() {
    assert_eq!(
        FormulaError::syntax("Unbalanced parentheses", 0).to_string(),
        "Syntax error at position 0: Unbalanced parentheses"
    );
    assert_eq!(
        FormulaError::MissingField("tax_rate".into()).to_string(),
        "Missing field: 'tax_rate' is not present in the record"
    );
    assert_eq!(
        FormulaError::InvalidDate {
            field: "closed_at".into(),
            raw: "soon".into(),
        }
        .to_string(),
        "Invalid date in field 'closed_at': \"soon\" cannot be parsed as a date"
    );
    assert_eq!(
        FormulaError::CircularReference("a -> b -> a".into()).to_string(),
        "Circular reference detected: a -> b -> a"
    );
}

#[test]
fn test_evaluation_result_serialization() {
    let ok = EvaluationResult::ok(Scalar::Number(86400.0));
    let json = serde_json::to_value(&ok).unwrap();
    assert_eq!(json["value"], 86400.0);
    assert!(json["error"].is_null());
    assert!(json["errorKind"].is_null());

    let failed = EvaluationResult::err(FormulaError::MissingField("x".into()));
    let json = serde_json::to_value(&failed).unwrap();
    assert!(json["value"].is_null());
    assert_eq!(json["errorKind"], "MissingFieldError");
    assert!(json["error"].as_str().unwrap().contains("'x'"));
}

#[test]
fn test_errors_are_values_not_panics() {
    let record: Record = serde_json::from_str(r#"{"a": "text", "b": 0}"#).unwrap();
    for formula in [
        "(", ")", "a +", "a ** b ** ", "1 / b", "a * 2", "unknown()", "Math.nope(1)",
        "a.b.c", "'unterminated", "a = 1", "1..2", "?", "b ? : 1",
    ] {
        let result = evaluate_formula(formula, &record, &[]);
        assert!(result.error.is_some(), "{} should fail", formula);
        assert!(result.value.is_none(), "{} should not yield a value", formula);
    }
}

#[test]
fn test_calc_error_wraps_formula_error() {
    let err: CalcError = FormulaError::MissingField("x".into()).into();
    assert!(matches!(err, CalcError::Formula(FormulaError::MissingField(_))));
    // Transparent: same message as the wrapped error
    assert_eq!(
        err.to_string(),
        "Missing field: 'x' is not present in the record"
    );
}

#[test]
fn test_config_errors() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "max_nesting: 0").unwrap();
    let err = EngineConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, CalcError::Config(_)));

    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "max_steps: [not, a, number]").unwrap();
    let err = EngineConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, CalcError::Yaml(_)));
}

#[test]
fn test_error_kind_serializes_as_name() {
    assert_eq!(
        serde_json::to_string(&ErrorKind::CircularReferenceError).unwrap(),
        "\"CircularReferenceError\""
    );
}
