//! Dependency ordering of formula fields
//!
//! Formulas may reference each other by id. This builds the reference graph
//! and returns an order in which every formula comes after the formulas it
//! reads, or the cycle that prevents one.

use super::references::extract_field_references;
use crate::error::{FormulaError, FormulaResult};
use crate::types::FormulaField;
use indexmap::IndexMap;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};

/// Topological order of formula ids (dependencies first).
///
/// A formula that names its own id is not a dependency on itself: while it
/// is being evaluated that name resolves to the record field of the same
/// name. Duplicate ids keep the first definition.
pub fn dependency_order(formulas: &[FormulaField]) -> FormulaResult<Vec<String>> {
    let graph = build_dependency_graph(formulas);

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(|idx| graph[idx].clone()).collect()),
        Err(cycle) => Err(FormulaError::CircularReference(describe_cycle(
            &graph,
            cycle.node_id(),
        ))),
    }
}

fn build_dependency_graph(formulas: &[FormulaField]) -> DiGraph<String, ()> {
    let mut graph = DiGraph::new();
    let mut definitions: IndexMap<&str, (NodeIndex, &FormulaField)> = IndexMap::new();

    for field in formulas {
        if !definitions.contains_key(field.id.as_str()) {
            let idx = graph.add_node(field.id.clone());
            definitions.insert(field.id.as_str(), (idx, field));
        }
    }

    for (id, (to_idx, field)) in &definitions {
        for dep in extract_field_references(&field.formula) {
            if dep == *id {
                continue;
            }
            if let Some((from_idx, _)) = definitions.get(dep.as_str()) {
                graph.update_edge(*from_idx, *to_idx, ());
            }
        }
    }

    graph
}

/// Members of the strongly connected component containing `start`, in
/// definition order: "a -> b -> a"
fn describe_cycle(graph: &DiGraph<String, ()>, start: NodeIndex) -> String {
    let mut members = tarjan_scc(graph)
        .into_iter()
        .find(|scc| scc.contains(&start))
        .unwrap_or_else(|| vec![start]);
    members.sort_by_key(|idx| idx.index());

    let mut chain: Vec<&str> = members.iter().map(|idx| graph[*idx].as_str()).collect();
    chain.push(graph[members[0]].as_str());
    chain.join(" -> ")
}
