//! Field resolution, suggestions and formula correction
//!
//! Checks the candidate identifiers of a formula against the fields of a
//! record and proposes a replacement for each unresolved one.

use super::formula::parse_formula;
use super::references::{extract_field_references, identifier_spans};
use crate::types::ValidationResult;
use indexmap::IndexMap;

/// Check a formula against the available field names.
/// Syntax problems are reported alongside missing fields.
pub fn validate(
    formula: &str,
    fields: &[&str],
    min_substring_match: usize,
    max_nesting: usize,
) -> ValidationResult {
    let syntax_error = if formula.trim().is_empty() {
        None
    } else {
        parse_formula(formula, max_nesting).err().map(|e| e.to_string())
    };

    let mut missing_fields = Vec::new();
    let mut suggestions = IndexMap::new();

    for candidate in extract_field_references(formula) {
        if fields.contains(&candidate.as_str()) {
            continue;
        }
        if let Some(suggested) = suggest_field(&candidate, fields, min_substring_match) {
            suggestions.insert(candidate.clone(), suggested);
        }
        missing_fields.push(candidate);
    }

    let is_valid = missing_fields.is_empty() && syntax_error.is_none();
    let message = build_message(&missing_fields, &suggestions, syntax_error.as_deref());

    ValidationResult {
        is_valid,
        missing_fields,
        suggestions,
        message,
        syntax_error,
    }
}

/// Rewrite every suggested identifier. Returns the input unchanged when the
/// formula is valid or nothing could be matched.
pub fn correct(formula: &str, result: &ValidationResult) -> String {
    if result.suggestions.is_empty() {
        return formula.to_string();
    }
    apply_suggestions(formula, &result.suggestions)
}

/// Replace whole identifiers only; string literals and property names are
/// left alone
pub fn apply_suggestions(formula: &str, suggestions: &IndexMap<String, String>) -> String {
    let mut corrected = String::with_capacity(formula.len());
    let mut last = 0;

    for span in identifier_spans(formula) {
        if let Some(replacement) = suggestions.get(&formula[span.clone()]) {
            corrected.push_str(&formula[last..span.start]);
            corrected.push_str(replacement);
            last = span.end;
        }
    }

    corrected.push_str(&formula[last..]);
    corrected
}

/// Best existing field for an unresolved identifier:
/// 1. case-insensitive match
/// 2. snake_case <-> camelCase conversion
/// 3. substring containment either way, closest length wins
pub fn suggest_field(candidate: &str, fields: &[&str], min_substring_match: usize) -> Option<String> {
    if let Some(field) = fields.iter().find(|f| f.eq_ignore_ascii_case(candidate)) {
        return Some(field.to_string());
    }

    let snake = to_snake_case(candidate);
    let camel = to_camel_case(candidate);
    if let Some(field) = fields
        .iter()
        .find(|f| (**f == snake || **f == camel) && **f != candidate)
    {
        return Some(field.to_string());
    }

    let needle = candidate.to_lowercase();
    fields
        .iter()
        .filter(|f| {
            let hay = f.to_lowercase();
            let shorter = hay.len().min(needle.len());
            shorter >= min_substring_match.max(1)
                && (hay.contains(&needle) || needle.contains(&hay))
        })
        .min_by_key(|f| f.len().abs_diff(candidate.len()))
        .map(|f| f.to_string())
}

/// `createdAt` -> `created_at`
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// `created_at` -> `createdAt` (leading underscores are kept)
pub fn to_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '_' && !out.trim_start_matches('_').is_empty() {
            upper_next = true;
        } else if upper_next {
            out.push(c.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn build_message(
    missing: &[String],
    suggestions: &IndexMap<String, String>,
    syntax_error: Option<&str>,
) -> String {
    let mut parts = Vec::new();

    if let Some(err) = syntax_error {
        parts.push(err.to_string());
    }

    if !missing.is_empty() {
        parts.push(format!("Missing fields: {}", missing.join(", ")));
        if !suggestions.is_empty() {
            let proposals: Vec<String> = suggestions
                .iter()
                .map(|(from, to)| format!("{} → {}", from, to))
                .collect();
            parts.push(format!("Suggested replacements: {}", proposals.join(", ")));
        }
    }

    if parts.is_empty() {
        "All field references are valid".to_string()
    } else {
        parts.join(". ")
    }
}
