use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::types::CategoryId;

/// Aggregate balance metrics for per-label record counts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabelSkew {
    pub total: usize,
    pub labels: usize,
    pub min: usize,
    pub max: usize,
    pub mean: f64,
    pub max_share: f64,
    pub min_share: f64,
    /// `max / min`; `None` when some label has zero records.
    pub ratio: Option<f64>,
    pub per_label: Vec<LabelShare>,
}

/// Per-label share of a collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabelShare {
    pub label: CategoryId,
    pub count: usize,
    pub share: f64,
}

/// Compute skew metrics from per-label counts.
pub fn label_skew(counts: &IndexMap<CategoryId, usize>) -> Option<LabelSkew> {
    let min = *counts.values().min()?;
    let max = *counts.values().max()?;
    let total: usize = counts.values().sum();
    let labels = counts.len();
    let share = |count: usize| {
        if total == 0 {
            0.0
        } else {
            count as f64 / total as f64
        }
    };
    let ratio = if min == 0 {
        None
    } else {
        Some(max as f64 / min as f64)
    };
    let mut per_label: Vec<LabelShare> = counts
        .iter()
        .map(|(label, count)| LabelShare {
            label: label.clone(),
            count: *count,
            share: share(*count),
        })
        .collect();
    per_label.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    Some(LabelSkew {
        total,
        labels,
        min,
        max,
        mean: total as f64 / labels as f64,
        max_share: share(max),
        min_share: share(min),
        ratio,
        per_label,
    })
}
