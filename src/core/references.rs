//! Field reference extraction
//!
//! Finds the identifiers in formula text that may name record fields. String
//! literals, numeric literals and property names after `.` are skipped.
//! Extraction never fails: malformed text simply yields fewer candidates.

use std::ops::Range;

/// Words of the expression language that are never field names
pub const RESERVED_WORDS: &[&str] = &[
    "if",
    "else",
    "return",
    "true",
    "false",
    "null",
    "undefined",
    "var",
    "let",
    "const",
    "function",
    "typeof",
];

/// Builtin functions, constants and namespaces available in every scope
pub const BUILTIN_NAMES: &[&str] = &[
    "SUM",
    "AVG",
    "MIN",
    "MAX",
    "ROUND",
    "ABS",
    "COUNT",
    "Math",
    "Date",
    "parseFloat",
    "parseInt",
    "CURRENT_TIMESTAMP",
    "now",
    "dateObj",
    "daysBetween",
];

pub fn is_reserved(word: &str) -> bool {
    RESERVED_WORDS.contains(&word)
}

pub fn is_builtin(word: &str) -> bool {
    BUILTIN_NAMES.contains(&word)
}

/// Candidate field identifiers, deduplicated, in first-occurrence order
pub fn extract_field_references(formula: &str) -> Vec<String> {
    let mut refs: Vec<String> = Vec::new();

    for span in identifier_spans(formula) {
        let word = &formula[span];
        if is_reserved(word) || is_builtin(word) {
            continue;
        }
        if !refs.iter().any(|r| r == word) {
            refs.push(word.to_string());
        }
    }

    refs
}

/// Byte ranges of every identifier token that is not a property name.
/// Reserved words and builtins are included; callers filter as needed.
pub(crate) fn identifier_spans(formula: &str) -> Vec<Range<usize>> {
    let bytes = formula.as_bytes();
    let mut spans = Vec::new();
    let mut after_dot = false;
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        match c {
            b'"' | b'\'' => {
                i = skip_string(bytes, i);
                after_dot = false;
            }
            b'0'..=b'9' => {
                // Numeric literal, including exponents and stray suffixes (1e5, 2.5x)
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'.') {
                    i += 1;
                }
                after_dot = false;
            }
            b'.' => {
                after_dot = true;
                i += 1;
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                if !after_dot {
                    spans.push(start..i);
                }
                after_dot = false;
            }
            c if c.is_ascii_whitespace() => i += 1,
            _ => {
                after_dot = false;
                i += 1;
            }
        }
    }

    spans
}

/// Index just past the closing quote (or the end of input if unterminated)
fn skip_string(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_simple_references() {
        assert_eq!(
            extract_field_references("revenue - cost"),
            vec!["revenue", "cost"]
        );
    }

    #[test]
    fn test_extract_dedups_in_first_occurrence_order() {
        assert_eq!(
            extract_field_references("b + a * b - a + c"),
            vec!["b", "a", "c"]
        );
    }

    #[test]
    fn test_extract_filters_reserved_and_builtins() {
        let refs = extract_field_references(
            "won ? ROUND(SUM(amount, fee), 2) : daysBetween(now(), CURRENT_TIMESTAMP) + typeof x",
        );
        assert_eq!(refs, vec!["won", "amount", "fee", "x"]);
    }

    #[test]
    fn test_extract_skips_property_names() {
        assert_eq!(
            extract_field_references("Math.floor(total / Math.PI) + name.length"),
            vec!["total", "name"]
        );
    }

    #[test]
    fn test_extract_skips_string_literals() {
        assert_eq!(
            extract_field_references(r#"status == "won" ? 'closed \' deal' : stage"#),
            vec!["status", "stage"]
        );
    }

    #[test]
    fn test_extract_skips_numeric_literals() {
        assert_eq!(extract_field_references("1e5 * rate + 2.5"), vec!["rate"]);
    }

    #[test]
    fn test_extract_empty_formula() {
        assert!(extract_field_references("").is_empty());
        assert!(extract_field_references("   ").is_empty());
    }

    #[test]
    fn test_extract_single_identifier_round_trip() {
        for field in ["created_at", "_private", "x1", "camelCase"] {
            assert_eq!(extract_field_references(field), vec![field.to_string()]);
        }
    }

    #[test]
    fn test_extract_tolerates_malformed_text() {
        assert_eq!(extract_field_references("(a + #b"), vec!["a", "b"]);
        assert_eq!(extract_field_references("x + \"unterminated y"), vec!["x"]);
    }

    #[test]
    fn test_identifier_spans_include_builtins() {
        let formula = "ABS(delta)";
        let words: Vec<&str> = identifier_spans(formula)
            .into_iter()
            .map(|r| &formula[r])
            .collect();
        assert_eq!(words, vec!["ABS", "delta"]);
    }
}
