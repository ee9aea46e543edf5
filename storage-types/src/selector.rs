// SPDX-License-Identifier: GPL-3.0-only

//! Node selector evaluation.
//!
//! Terms are ORed, requirements within a term are ANDed. A term without any
//! requirement matches nothing; an absent selector matches every node.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{NodeSelector, NodeSelectorRequirement, NodeSelectorTerm};

use crate::TypesError;

const NODE_NAME_FIELD: &str = "metadata.name";

pub fn node_matches(
    selector: Option<&NodeSelector>,
    node_name: &str,
    node_labels: &BTreeMap<String, String>,
) -> Result<bool, TypesError> {
    let Some(selector) = selector else {
        return Ok(true);
    };

    for term in &selector.node_selector_terms {
        if term_matches(term, node_name, node_labels)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn term_matches(
    term: &NodeSelectorTerm,
    node_name: &str,
    node_labels: &BTreeMap<String, String>,
) -> Result<bool, TypesError> {
    let expressions = term.match_expressions.as_deref().unwrap_or_default();
    let fields = term.match_fields.as_deref().unwrap_or_default();
    if expressions.is_empty() && fields.is_empty() {
        return Ok(false);
    }

    for requirement in expressions {
        if !requirement_matches(requirement, node_labels.get(&requirement.key).map(String::as_str))? {
            return Ok(false);
        }
    }

    for requirement in fields {
        if requirement.key != NODE_NAME_FIELD {
            return Err(TypesError::InvalidSelector(format!(
                "unsupported field selector key {}",
                requirement.key
            )));
        }
        if !requirement_matches(requirement, Some(node_name))? {
            return Ok(false);
        }
    }

    Ok(true)
}

fn requirement_matches(
    requirement: &NodeSelectorRequirement,
    value: Option<&str>,
) -> Result<bool, TypesError> {
    let values = requirement.values.as_deref().unwrap_or_default();
    match requirement.operator.as_str() {
        "In" => Ok(value.is_some_and(|value| values.iter().any(|v| v == value))),
        "NotIn" => Ok(!value.is_some_and(|value| values.iter().any(|v| v == value))),
        "Exists" => Ok(value.is_some()),
        "DoesNotExist" => Ok(value.is_none()),
        "Gt" | "Lt" => {
            let [bound] = values else {
                return Err(TypesError::InvalidSelector(format!(
                    "operator {} on {} needs exactly one value",
                    requirement.operator, requirement.key
                )));
            };
            let bound: i64 = bound.parse().map_err(|_| {
                TypesError::InvalidSelector(format!("non-integer bound {bound:?} for {}", requirement.key))
            })?;
            let Some(actual) = value.and_then(|value| value.parse::<i64>().ok()) else {
                return Ok(false);
            };
            Ok(if requirement.operator == "Gt" {
                actual > bound
            } else {
                actual < bound
            })
        }
        other => Err(TypesError::InvalidSelector(format!("unknown operator {other}"))),
    }
}
