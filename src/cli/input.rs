//! Input file loading
//!
//! Records, formula fields and chart specs are read from JSON or YAML,
//! chosen by file extension. Unknown extensions are read as YAML, which also
//! accepts JSON documents.

use crate::error::{CalcError, CalcResult};
use crate::types::{ChartSpec, FormulaField, Record};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

pub fn load_file<T: DeserializeOwned>(path: &Path) -> CalcResult<T> {
    let content = fs::read_to_string(path)?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        Ok(serde_json::from_str(&content)?)
    } else {
        Ok(serde_yaml::from_str(&content)?)
    }
}

pub fn load_record(path: &Path) -> CalcResult<Record> {
    load_file(path)
}

pub fn load_records(path: &Path) -> CalcResult<Vec<Record>> {
    load_file(path)
}

/// Formula fields; ids must be unique
pub fn load_formulas(path: &Path) -> CalcResult<Vec<FormulaField>> {
    let formulas: Vec<FormulaField> = load_file(path)?;

    for (i, field) in formulas.iter().enumerate() {
        if field.id.trim().is_empty() {
            return Err(CalcError::Validation(format!(
                "Formula #{} in {} has an empty id",
                i + 1,
                path.display()
            )));
        }
        if formulas[..i].iter().any(|f| f.id == field.id) {
            return Err(CalcError::Validation(format!(
                "Duplicate formula id '{}' in {}",
                field.id,
                path.display()
            )));
        }
    }

    Ok(formulas)
}

pub fn load_charts(path: &Path) -> CalcResult<Vec<ChartSpec>> {
    load_file(path)
}
