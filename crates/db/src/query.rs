//! Filters and aggregation stages understood by every store backend, together
//! with their in-process evaluation.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::{json, Value};

use crate::{Document, ID_FIELD};

/// Predicate over a single document
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document
    All,
    /// Matches when every inner filter matches
    And(Vec<Filter>),
    /// Substring match on a string field
    Contains {
        field: String,
        needle: String,
        case_insensitive: bool,
    },
    /// Inclusive numeric range; an absent bound is open
    Range {
        field: String,
        min: Option<f64>,
        max: Option<f64>,
    },
}

impl Filter {
    /// Case-insensitive substring filter
    pub fn contains(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Filter::Contains {
            field: field.into(),
            needle: needle.into(),
            case_insensitive: true,
        }
    }

    pub fn range(field: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        Filter::Range {
            field: field.into(),
            min,
            max,
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Filter::Contains {
                field,
                needle,
                case_insensitive,
            } => match doc.get(field).and_then(Value::as_str) {
                Some(haystack) if *case_insensitive => haystack
                    .to_lowercase()
                    .contains(&needle.to_lowercase()),
                Some(haystack) => haystack.contains(needle.as_str()),
                None => false,
            },
            Filter::Range { field, min, max } => match doc.get(field).and_then(Value::as_f64) {
                Some(n) => min.map_or(true, |lo| n >= lo) && max.map_or(true, |hi| n <= hi),
                None => false,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// One step of an aggregation pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Group by the value of `by`, emitting `{"_id": key, <count_field>: n}`
    /// per group in order of first appearance
    Group { by: String, count_field: String },
    /// Stable sort on a field; missing and null values sort lowest
    Sort { field: String, order: SortOrder },
    Limit(usize),
}

impl Stage {
    pub fn sort_desc(field: impl Into<String>) -> Self {
        Stage::Sort {
            field: field.into(),
            order: SortOrder::Descending,
        }
    }

    pub fn group_count(by: impl Into<String>, count_field: impl Into<String>) -> Self {
        Stage::Group {
            by: by.into(),
            count_field: count_field.into(),
        }
    }

    fn apply(&self, docs: Vec<Document>) -> Vec<Document> {
        match self {
            Stage::Group { by, count_field } => {
                // Serialized key -> slot in `groups`, which keeps first-appearance order.
                let mut index: HashMap<String, usize> = HashMap::new();
                let mut groups: Vec<(Value, u64)> = Vec::new();
                for doc in &docs {
                    let key = doc.get(by).cloned().unwrap_or(Value::Null);
                    match index.get(&key.to_string()) {
                        Some(&slot) => groups[slot].1 += 1,
                        None => {
                            index.insert(key.to_string(), groups.len());
                            groups.push((key, 1));
                        }
                    }
                }
                groups
                    .into_iter()
                    .map(|(key, n)| {
                        let mut out = Document::new();
                        out.insert(ID_FIELD.to_string(), key);
                        out.insert(count_field.clone(), json!(n));
                        out
                    })
                    .collect()
            }
            Stage::Sort { field, order } => {
                let mut docs = docs;
                docs.sort_by(|a, b| {
                    let ord = compare_values(a.get(field), b.get(field));
                    match order {
                        SortOrder::Ascending => ord,
                        SortOrder::Descending => ord.reverse(),
                    }
                });
                docs
            }
            Stage::Limit(n) => docs.into_iter().take(*n).collect(),
        }
    }
}

/// Run `pipeline` over `docs`, one stage after another.
pub fn run_pipeline(docs: Vec<Document>, pipeline: &[Stage]) -> Vec<Document> {
    pipeline
        .iter()
        .fold(docs, |acc, stage| stage.apply(acc))
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

/// Total order over optional JSON values: values of different kinds order by
/// kind, numbers numerically, strings lexicographically.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}
