//! Seeded subsampling of validated collections.

use clap::ValueEnum;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::constants::sampling::ALL_LABELS;
use crate::data::Collection;
use crate::errors::PipelineError;
use crate::metrics::{LabelSkew, label_skew};
use crate::rng::DeterministicRng;
use crate::types::CategoryId;

/// How [`sample`] reduces a collection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SamplingStrategy {
    /// Independent per-record inclusion with probability `fraction`.
    #[default]
    Uniform,
    /// Each label sampled to `round(fraction * n)` records.
    ClassBalanced,
    /// Exactly `floor(fraction * N)` records drawn without replacement.
    Exact,
}

/// Realized counts for one label (or `*` for whole-collection strategies).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassSample {
    pub label: CategoryId,
    pub available: usize,
    pub target: usize,
    pub retained: usize,
    /// Class was too small for the fraction and kept whole.
    pub whole_class_retained: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampleReport {
    pub strategy: SamplingStrategy,
    pub fraction: f64,
    pub seed: u64,
    pub input: usize,
    pub retained: usize,
    pub classes: Vec<ClassSample>,
    /// Warning-level entries (undersized classes).
    pub warnings: Vec<String>,
    /// Label balance of the retained records.
    pub skew: Option<LabelSkew>,
}

#[derive(Clone, Debug)]
pub struct SampleOutcome {
    pub collection: Collection,
    pub report: SampleReport,
}

/// Reduce `collection` to roughly `fraction` of its size.
///
/// Retained records keep their input order. The same seed and input order
/// always select the same subset. Call only on validated collections.
pub fn sample(
    collection: &Collection,
    fraction: f64,
    strategy: SamplingStrategy,
    seed: u64,
) -> Result<SampleOutcome, PipelineError> {
    if !(0.0..=1.0).contains(&fraction) {
        return Err(PipelineError::Config(format!(
            "sample fraction must be within [0, 1], got {fraction}"
        )));
    }

    let total = collection.len();
    let mut keep = vec![false; total];
    let mut classes = Vec::new();
    let mut warnings = Vec::new();

    match strategy {
        SamplingStrategy::Uniform => {
            let mut rng = DeterministicRng::new(seed);
            for slot in keep.iter_mut() {
                *slot = rng.next_unit() < fraction;
            }
            classes.push(ClassSample {
                label: ALL_LABELS.to_string(),
                available: total,
                target: (fraction * total as f64).round() as usize,
                retained: keep.iter().filter(|kept| **kept).count(),
                whole_class_retained: false,
            });
        }
        SamplingStrategy::Exact => {
            let target = (fraction * total as f64).floor() as usize;
            let mut rng = DeterministicRng::new(seed);
            for idx in rng.permutation(total).into_iter().take(target) {
                keep[idx] = true;
            }
            classes.push(ClassSample {
                label: ALL_LABELS.to_string(),
                available: total,
                target,
                retained: target,
                whole_class_retained: false,
            });
        }
        SamplingStrategy::ClassBalanced => {
            let mut groups: IndexMap<&str, Vec<usize>> = IndexMap::new();
            for (idx, record) in collection.records.iter().enumerate() {
                groups.entry(record.label.as_str()).or_default().push(idx);
            }
            for (label, members) in groups {
                let available = members.len();
                let target = (fraction * available as f64).round() as usize;
                let undersized = fraction > 0.0 && target == 0;
                let chosen: Vec<usize> = if undersized {
                    members
                } else {
                    let mut rng = DeterministicRng::for_scope(seed, label);
                    rng.permutation(available)
                        .into_iter()
                        .take(target)
                        .map(|pos| members[pos])
                        .collect()
                };
                for idx in &chosen {
                    keep[*idx] = true;
                }
                if undersized {
                    let message = format!(
                        "class '{label}' has {available} records, too few for fraction \
                         {fraction}; retained whole class"
                    );
                    warn!(source = %collection.source, "{message}");
                    warnings.push(message);
                }
                classes.push(ClassSample {
                    label: label.to_string(),
                    available,
                    target,
                    retained: chosen.len(),
                    whole_class_retained: undersized,
                });
            }
        }
    }

    let records = collection
        .records
        .iter()
        .zip(&keep)
        .filter(|(_, kept)| **kept)
        .map(|(record, _)| record.clone())
        .collect();
    let sampled = collection.derive(records);

    info!(
        source = %collection.source,
        ?strategy,
        fraction,
        input = total,
        retained = sampled.len(),
        "sampled collection"
    );

    let report = SampleReport {
        strategy,
        fraction,
        seed,
        input: total,
        retained: sampled.len(),
        classes,
        warnings,
        skew: label_skew(&sampled.label_counts()),
    };
    Ok(SampleOutcome {
        collection: sampled,
        report,
    })
}
