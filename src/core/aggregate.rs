//! Chart aggregation pipeline
//!
//! Evaluates every formula field per record, groups records by the chart's
//! x-field and reduces the y-field per group.

use super::engine::FormulaEngine;
use super::graph::dependency_order;
use crate::types::{
    AggregatedPoint, Aggregation, ChartPoints, ChartSpec, FormulaField, Record, Scalar,
};
use indexmap::IndexMap;
use tracing::{debug, warn};

const UNKNOWN_CATEGORY: &str = "Unknown";

struct Group {
    category: Scalar,
    count: usize,
    sum: f64,
}

/// Points for each chart, in chart order
pub fn aggregate_with(
    engine: &FormulaEngine,
    records: &[Record],
    formulas: &[FormulaField],
    charts: &[ChartSpec],
) -> Vec<ChartPoints> {
    if let Err(e) = dependency_order(formulas) {
        warn!(error = %e, "formula fields contain a cycle; affected fields aggregate as null");
    }

    let needs_formulas = charts
        .iter()
        .any(|c| !c.x_field.is_empty() && c.aggregation != Aggregation::Direct);
    let enriched: Vec<Record> = if needs_formulas {
        records
            .iter()
            .map(|record| enrich(engine, record, formulas))
            .collect()
    } else {
        Vec::new()
    };

    charts
        .iter()
        .map(|chart| {
            let points = if chart.x_field.is_empty() {
                Vec::new()
            } else if chart.aggregation == Aggregation::Direct {
                direct_points(chart, records)
            } else {
                grouped_points(chart, &enriched)
            };
            ChartPoints {
                chart: chart.clone(),
                points,
            }
        })
        .collect()
}

/// The record plus one entry per formula id. Failed formulas contribute null.
fn enrich(engine: &FormulaEngine, record: &Record, formulas: &[FormulaField]) -> Record {
    let mut enriched = record.clone();
    for field in formulas {
        let result = engine.evaluate_field(field, record, formulas);
        if let Some(error) = &result.error {
            debug!(formula = %field.id, error = %error, "formula evaluation failed during aggregation");
        }
        enriched.insert(field.id.clone(), result.value.unwrap_or(Scalar::Null));
    }
    enriched
}

fn direct_points(chart: &ChartSpec, records: &[Record]) -> Vec<AggregatedPoint> {
    records
        .iter()
        .map(|record| AggregatedPoint {
            category: category_of(record, &chart.x_field),
            value: chart
                .y_field
                .as_deref()
                .map_or(0.0, |y| numeric_or_zero(record.get(y))),
        })
        .collect()
}

fn grouped_points(chart: &ChartSpec, records: &[Record]) -> Vec<AggregatedPoint> {
    let mut groups: IndexMap<String, Group> = IndexMap::new();

    for record in records {
        let category = category_of(record, &chart.x_field);
        let group = groups.entry(category.to_string()).or_insert_with(|| Group {
            category,
            count: 0,
            sum: 0.0,
        });
        group.count += 1;
        if let Some(y) = chart.y_field.as_deref() {
            group.sum += numeric_or_zero(record.get(y));
        }
    }

    groups
        .into_values()
        .map(|group| {
            let value = match chart.aggregation {
                Aggregation::Sum => group.sum,
                Aggregation::Avg => group.sum / group.count as f64,
                Aggregation::Count | Aggregation::Direct => group.count as f64,
            };
            AggregatedPoint {
                category: group.category,
                value,
            }
        })
        .collect()
}

fn category_of(record: &Record, x_field: &str) -> Scalar {
    match record.get(x_field) {
        None | Some(Scalar::Null) => Scalar::text(UNKNOWN_CATEGORY),
        Some(value) => value.clone(),
    }
}

/// Numbers and numeric text count; everything else is 0
fn numeric_or_zero(value: Option<&Scalar>) -> f64 {
    value
        .and_then(Scalar::as_number)
        .filter(|n| n.is_finite())
        .unwrap_or(0.0)
}
