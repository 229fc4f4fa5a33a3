use super::input::{load_charts, load_formulas, load_record, load_records};
use crate::core::engine::map_result_type;
use crate::core::{dependency_order, FormulaEngine};
use crate::error::{CalcError, CalcResult};
use crate::types::{EvaluationResult, FormulaField, ResultType, Scalar, ValidationResult};
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Format a number for display, removing unnecessary decimal places
fn format_number(n: f64) -> String {
    // Round to 6 decimal places for display
    let rounded = (n * 1e6).round() / 1e6;
    format!("{:.6}", rounded)
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

fn format_scalar(value: &Scalar) -> String {
    match value {
        Scalar::Number(n) => format_number(*n),
        Scalar::Text(s) => format!("{:?}", s),
        other => other.to_string(),
    }
}

fn print_json<T: Serialize>(value: &T) -> CalcResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_siblings(formulas: Option<&Path>) -> CalcResult<Vec<FormulaField>> {
    match formulas {
        Some(path) => load_formulas(path),
        None => Ok(Vec::new()),
    }
}

/// Execute the extract command
pub fn extract(engine: &FormulaEngine, formula: &str, json: bool) -> CalcResult<()> {
    let references = engine.extract(formula);

    if json {
        return print_json(&references);
    }

    println!("{}", "🔎 Field references".bold().green());
    println!("   Formula: {}\n", formula.bright_yellow());
    if references.is_empty() {
        println!("   No field references (literal formula)");
    } else {
        for name in &references {
            println!("   • {}", name.bright_blue());
        }
    }
    Ok(())
}

/// Execute the validate command. Fails when the formula is invalid.
pub fn validate(
    engine: &FormulaEngine,
    formula: &str,
    record: PathBuf,
    formulas: Option<PathBuf>,
    json: bool,
) -> CalcResult<()> {
    let sample = load_record(&record)?;
    let siblings = load_siblings(formulas.as_deref())?;
    let result = engine.validate_with_siblings(formula, &sample, &siblings);

    if json {
        print_json(&result)?;
    } else {
        print_validation(formula, &record, &result);
    }

    if result.is_valid {
        Ok(())
    } else {
        Err(CalcError::Validation(result.message))
    }
}

fn print_validation(formula: &str, record: &Path, result: &ValidationResult) {
    println!("{}", "✅ Validating formula".bold().green());
    println!("   Formula: {}", formula.bright_yellow());
    println!("   Record:  {}\n", record.display());

    if result.is_valid {
        println!("{}", "✅ All field references are valid!".bold().green());
        return;
    }

    if let Some(err) = &result.syntax_error {
        println!("{}", format!("❌ {}", err).bold().red());
    }

    if !result.missing_fields.is_empty() {
        println!(
            "{}",
            format!("❌ {} missing field(s)", result.missing_fields.len())
                .bold()
                .red()
        );
        for name in &result.missing_fields {
            match result.suggestions.get(name) {
                Some(suggested) => println!(
                    "   {} → {}",
                    name.red(),
                    suggested.bright_blue().bold()
                ),
                None => println!("   {} (no match)", name.red()),
            }
        }
        if !result.suggestions.is_empty() {
            println!(
                "\n{}",
                "💡 Run 'fieldcalc correct' to apply the suggestions"
                    .bold()
                    .yellow()
            );
        }
    }
}

#[derive(Serialize)]
struct CorrectOutput<'a> {
    formula: &'a str,
    corrected: &'a str,
    changed: bool,
}

/// Execute the correct command
pub fn correct(
    engine: &FormulaEngine,
    formula: &str,
    record: PathBuf,
    formulas: Option<PathBuf>,
    json: bool,
) -> CalcResult<()> {
    let sample = load_record(&record)?;
    let siblings = load_siblings(formulas.as_deref())?;
    let corrected = engine.correct_with_siblings(formula, &sample, &siblings);
    let changed = corrected != formula;

    if json {
        return print_json(&CorrectOutput {
            formula,
            corrected: &corrected,
            changed,
        });
    }

    if changed {
        println!("{}", "🔧 Corrected formula".bold().green());
        println!("   Before: {}", formula.red());
        println!("   After:  {}", corrected.bright_green().bold());
    } else {
        println!("{}", "✅ Nothing to correct".bold().green());
        println!("   {}", formula.bright_yellow());
    }
    Ok(())
}

#[derive(Serialize)]
struct EvaluateOutput<'a> {
    formula: &'a str,
    #[serde(flatten)]
    result: &'a EvaluationResult,
}

/// Execute the evaluate command. Fails when evaluation yields an error.
pub fn evaluate(
    engine: &FormulaEngine,
    formula: &str,
    record: PathBuf,
    formulas: Option<PathBuf>,
    result_type: Option<ResultType>,
    no_correct: bool,
    json: bool,
) -> CalcResult<()> {
    let sample = load_record(&record)?;
    let siblings = load_siblings(formulas.as_deref())?;

    let effective = if no_correct {
        formula.to_string()
    } else {
        engine.correct_with_siblings(formula, &sample, &siblings)
    };
    if effective != formula {
        info!(original = formula, corrected = %effective, "evaluating corrected formula");
    }

    let mut result = engine.evaluate_formula(&effective, &sample, &siblings);
    if let Some(result_type) = result_type {
        result = result
            .into_result()
            .and_then(|value| map_result_type(value, result_type))
            .into();
    }

    if json {
        print_json(&EvaluateOutput {
            formula: &effective,
            result: &result,
        })?;
    } else {
        println!("{}", "🧮 Evaluating formula".bold().green());
        if effective != formula {
            println!("   Formula: {} → {}", formula.red(), effective.bright_yellow());
        } else {
            println!("   Formula: {}", effective.bright_yellow());
        }
        println!("   Record:  {}\n", record.display());

        if let Some(value) = &result.value {
            println!("   Result: {}", format_scalar(value).bold().green());
        }
    }

    match result.error {
        Some(error) => {
            if !json {
                println!(
                    "{}",
                    format!("❌ {}: {}", error.kind(), error).bold().red()
                );
            }
            Err(error.into())
        }
        None => Ok(()),
    }
}

/// Execute the aggregate command
pub fn aggregate(
    engine: &FormulaEngine,
    records: PathBuf,
    formulas: PathBuf,
    charts: PathBuf,
    json: bool,
) -> CalcResult<()> {
    let records = load_records(&records)?;
    let formulas = load_formulas(&formulas)?;
    let charts = load_charts(&charts)?;

    let results = engine.aggregate(&records, &formulas, &charts);

    if json {
        return print_json(&results);
    }

    println!("{}", "📊 Chart aggregation".bold().green());
    println!(
        "   {} records, {} formulas, {} charts\n",
        records.len(),
        formulas.len(),
        charts.len()
    );

    for (i, chart) in results.iter().enumerate() {
        let y = chart.chart.y_field.as_deref().unwrap_or("-");
        println!(
            "   {} {} by {} (y: {})",
            format!("#{}", i + 1).bold(),
            format!("{:?}", chart.chart.aggregation).to_lowercase().cyan(),
            chart.chart.x_field.bright_blue().bold(),
            y
        );
        if chart.points.is_empty() {
            println!("      (no points)");
        }
        for point in &chart.points {
            println!(
                "      {} = {}",
                point.category.to_string().bright_blue(),
                format_number(point.value).bold()
            );
        }
        println!();
    }
    Ok(())
}

#[derive(Serialize)]
struct AuditOutput<'a> {
    order: &'a [String],
}

/// Execute the audit command - show the evaluation order of formula fields
pub fn audit(formulas: PathBuf, json: bool) -> CalcResult<()> {
    let fields = load_formulas(&formulas)?;

    let order = match dependency_order(&fields) {
        Ok(order) => order,
        Err(e) => {
            if !json {
                println!("{}", format!("❌ {}", e).bold().red());
            }
            return Err(e.into());
        }
    };

    if json {
        return print_json(&AuditOutput { order: &order });
    }

    println!("{}", "🔍 Formula dependency order".bold().green());
    println!("   File: {}\n", formulas.display());
    for (i, id) in order.iter().enumerate() {
        let formula = fields
            .iter()
            .find(|f| &f.id == id)
            .map(|f| f.formula.as_str())
            .unwrap_or_default();
        println!("   {}. {} = {}", i + 1, id.bright_blue().bold(), formula.bright_yellow());
    }
    println!();
    println!("{}", "✅ No circular references".bold().green());
    Ok(())
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;
