use crate::error::{ErrorKind, FormulaError, FormulaResult};
use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

//==============================================================================
// Records
//==============================================================================

/// A single dynamically-typed record value.
///
/// Variant order matters for deserialization: RFC 3339 strings become
/// `Date`, every other string stays `Text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(f64),
    Date(DateTime<Utc>),
    Text(String),
}

impl Scalar {
    pub fn text(s: impl Into<String>) -> Self {
        Scalar::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Numeric view used by arithmetic (dates become epoch milliseconds).
    /// Text that does not parse as a number yields NaN.
    pub fn to_number(&self) -> f64 {
        match self {
            Scalar::Null => 0.0,
            Scalar::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Scalar::Number(n) => *n,
            Scalar::Date(d) => d.timestamp_millis() as f64,
            Scalar::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
        }
    }

    /// Strict numeric view: only numbers and numeric text count
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            Scalar::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Scalar::Null => false,
            Scalar::Bool(b) => *b,
            Scalar::Number(n) => *n != 0.0 && !n.is_nan(),
            Scalar::Date(_) => true,
            Scalar::Text(s) => !s.is_empty(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Null => "null",
            Scalar::Bool(_) => "boolean",
            Scalar::Number(_) => "number",
            Scalar::Date(_) => "date",
            Scalar::Text(_) => "string",
        }
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Scalar::Date(d) => f.write_str(&d.to_rfc3339_opts(SecondsFormat::Secs, true)),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Scalar {
    fn from(n: f64) -> Self {
        Scalar::Number(n)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

impl From<DateTime<Utc>> for Scalar {
    fn from(d: DateTime<Utc>) -> Self {
        Scalar::Date(d)
    }
}

/// One data row: field name -> value, in source order
pub type Record = IndexMap<String, Scalar>;

//==============================================================================
// Formula definitions
//==============================================================================

/// Declared type of a formula's result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    #[default]
    Number,
    String,
    Date,
    Boolean,
    Duration,
}

impl std::str::FromStr for ResultType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "number" => Ok(ResultType::Number),
            "string" => Ok(ResultType::String),
            "date" => Ok(ResultType::Date),
            "boolean" => Ok(ResultType::Boolean),
            "duration" => Ok(ResultType::Duration),
            other => Err(format!(
                "unknown result type '{}' (expected number, string, date, boolean or duration)",
                other
            )),
        }
    }
}

/// A persisted computed-field definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaField {
    pub id: String,
    pub name: String,
    pub formula: String,
    #[serde(default)]
    pub result_type: ResultType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl FormulaField {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        formula: impl Into<String>,
        result_type: ResultType,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            formula: formula.into(),
            result_type,
            description: None,
            format: None,
        }
    }
}

//==============================================================================
// Validation and evaluation results
//==============================================================================

/// Outcome of checking a formula's field references against a record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub missing_fields: Vec<String>,
    pub suggestions: IndexMap<String, String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub syntax_error: Option<String>,
}

/// Outcome of evaluating a formula against one record.
/// `value` is always `None` when `error` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    pub value: Option<Scalar>,
    pub error: Option<FormulaError>,
}

impl EvaluationResult {
    pub fn ok(value: Scalar) -> Self {
        Self {
            value: Some(value),
            error: None,
        }
    }

    pub fn err(error: FormulaError) -> Self {
        Self {
            value: None,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(FormulaError::kind)
    }

    pub fn into_result(self) -> FormulaResult<Scalar> {
        match (self.value, self.error) {
            (_, Some(e)) => Err(e),
            (Some(v), None) => Ok(v),
            (None, None) => Ok(Scalar::Null),
        }
    }
}

impl From<FormulaResult<Scalar>> for EvaluationResult {
    fn from(result: FormulaResult<Scalar>) -> Self {
        match result {
            Ok(v) => EvaluationResult::ok(v),
            Err(e) => EvaluationResult::err(e),
        }
    }
}

impl Serialize for EvaluationResult {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Wire<'a> {
            value: &'a Option<Scalar>,
            error: Option<String>,
            error_kind: Option<ErrorKind>,
        }

        Wire {
            value: &self.value,
            error: self.error.as_ref().map(|e| e.to_string()),
            error_kind: self.error_kind(),
        }
        .serialize(serializer)
    }
}

//==============================================================================
// Charts
//==============================================================================

/// Reduction applied per category when building chart points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Direct,
    #[default]
    Count,
    Sum,
    Avg,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    #[serde(default)]
    pub x_field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_field: Option<String>,
    #[serde(default)]
    pub aggregation: Aggregation,
}

impl ChartSpec {
    pub fn new(x_field: impl Into<String>, y_field: Option<&str>, aggregation: Aggregation) -> Self {
        Self {
            x_field: x_field.into(),
            y_field: y_field.map(str::to_string),
            aggregation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedPoint {
    pub category: Scalar,
    pub value: f64,
}

/// Points computed for one chart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoints {
    pub chart: ChartSpec,
    pub points: Vec<AggregatedPoint>,
}
