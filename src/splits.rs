use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::info;

use crate::constants::splits::{ALL_SPLITS, RATIO_SUM_TOLERANCE};
use crate::data::{Collection, Record};
use crate::errors::PipelineError;
use crate::hash::checksum_ids;
use crate::manifest::{PartitionEntry, PartitionManifest};
use crate::rng::DeterministicRng;
use crate::types::{RecordId, SourceId};

/// Logical dataset partitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitLabel {
    /// Training split.
    Train,
    /// Validation split.
    Validation,
    /// Test split.
    Test,
}

impl SplitLabel {
    /// Name used for annotation files and image folders.
    pub const fn as_str(&self) -> &'static str {
        match self {
            SplitLabel::Train => "train",
            SplitLabel::Validation => "validation",
            SplitLabel::Test => "test",
        }
    }
}

impl fmt::Display for SplitLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ratio configuration for train/validation/test assignment.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplitRatios {
    /// Fraction assigned to train.
    pub train: f64,
    /// Fraction assigned to validation.
    pub validation: f64,
    /// Fraction assigned to test.
    pub test: f64,
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: 0.7,
            validation: 0.15,
            test: 0.15,
        }
    }
}

impl SplitRatios {
    pub fn new(train: f64, validation: f64, test: f64) -> Self {
        Self {
            train,
            validation,
            test,
        }
    }

    /// Everything to test; used for domains that are evaluation-only.
    pub fn test_only() -> Self {
        Self::new(0.0, 0.0, 1.0)
    }

    /// Validate that ratios are non-negative and sum to `1.0` (within epsilon).
    pub fn normalized(self) -> Result<Self, PipelineError> {
        let parts = [self.train, self.validation, self.test];
        if parts.iter().any(|part| !part.is_finite() || *part < 0.0) {
            return Err(PipelineError::Config(format!(
                "split ratios must be non-negative (train={}, validation={}, test={})",
                self.train, self.validation, self.test
            )));
        }
        let sum: f64 = parts.iter().sum();
        if (sum - 1.0).abs() > RATIO_SUM_TOLERANCE {
            return Err(PipelineError::Config(format!(
                "split ratios must sum to 1.0, got {sum:.6} (train={}, validation={}, test={})",
                self.train, self.validation, self.test
            )));
        }
        Ok(self)
    }

    pub fn get(&self, label: SplitLabel) -> f64 {
        match label {
            SplitLabel::Train => self.train,
            SplitLabel::Validation => self.validation,
            SplitLabel::Test => self.test,
        }
    }
}

/// Partition sizes for `total` records: the first two are rounded, test takes the rest.
pub fn partition_sizes(total: usize, ratios: SplitRatios) -> [(SplitLabel, usize); 3] {
    let train = ((total as f64) * ratios.train).round() as usize;
    let train = train.min(total);
    let validation = ((total as f64) * ratios.validation).round() as usize;
    let validation = validation.min(total - train);
    let test = total - train - validation;
    [
        (SplitLabel::Train, train),
        (SplitLabel::Validation, validation),
        (SplitLabel::Test, test),
    ]
}

/// Record id → partition mapping produced by [`split`].
///
/// Ids are held in shuffled order, grouped into three contiguous ranges.
#[derive(Clone, Debug, PartialEq)]
pub struct PartitionAssignment {
    source: SourceId,
    seed: u64,
    ratios: SplitRatios,
    labels: IndexMap<RecordId, SplitLabel>,
}

impl PartitionAssignment {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn ratios(&self) -> SplitRatios {
        self.ratios
    }

    pub fn total(&self) -> usize {
        self.labels.len()
    }

    pub fn label_for(&self, id: &str) -> Option<SplitLabel> {
        self.labels.get(id).copied()
    }

    /// Ids assigned to `label`, in shuffled order.
    pub fn ids(&self, label: SplitLabel) -> impl Iterator<Item = &str> {
        self.labels
            .iter()
            .filter(move |(_, assigned)| **assigned == label)
            .map(|(id, _)| id.as_str())
    }

    pub fn len(&self, label: SplitLabel) -> usize {
        self.ids(label).count()
    }

    pub fn sizes(&self) -> [(SplitLabel, usize); 3] {
        ALL_SPLITS.map(|label| (label, self.len(label)))
    }

    /// Materialize the three partitions from the collection that was split.
    pub fn partition(&self, collection: &Collection) -> Result<Partitions, PipelineError> {
        if collection.len() != self.total() {
            return Err(PipelineError::Config(format!(
                "assignment for '{}' covers {} records but collection '{}' has {}",
                self.source,
                self.total(),
                collection.source,
                collection.len()
            )));
        }
        let by_id: HashMap<&str, &Record> = collection
            .records
            .iter()
            .map(|record| (record.id.as_str(), record))
            .collect();
        let take = |label: SplitLabel| -> Result<Collection, PipelineError> {
            let records = self
                .ids(label)
                .map(|id| {
                    by_id.get(id).map(|record| (*record).clone()).ok_or_else(|| {
                        PipelineError::Config(format!(
                            "record '{id}' is not part of collection '{}'",
                            collection.source
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(collection.derive(records))
        };
        Ok(Partitions {
            train: take(SplitLabel::Train)?,
            validation: take(SplitLabel::Validation)?,
            test: take(SplitLabel::Test)?,
        })
    }

    /// Byte-stable description of the assignment (no timestamps).
    pub fn manifest(&self) -> PartitionManifest {
        let partitions = ALL_SPLITS
            .iter()
            .map(|label| {
                let ids: Vec<RecordId> = self.ids(*label).map(str::to_string).collect();
                PartitionEntry {
                    label: *label,
                    count: ids.len(),
                    checksum: format!("{:016x}", checksum_ids(ids.iter().map(String::as_str))),
                    ids,
                }
            })
            .collect();
        PartitionManifest {
            source: self.source.clone(),
            seed: self.seed,
            ratios: self.ratios,
            total: self.total(),
            partitions,
        }
    }
}

/// The three disjoint sub-collections of one split.
#[derive(Clone, Debug, PartialEq)]
pub struct Partitions {
    pub train: Collection,
    pub validation: Collection,
    pub test: Collection,
}

impl Partitions {
    pub fn get(&self, label: SplitLabel) -> &Collection {
        match label {
            SplitLabel::Train => &self.train,
            SplitLabel::Validation => &self.validation,
            SplitLabel::Test => &self.test,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (SplitLabel, &Collection)> {
        ALL_SPLITS.into_iter().map(|label| (label, self.get(label)))
    }

    pub fn total(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }
}

/// Deterministically assign every record to exactly one partition.
///
/// Ratios are checked before anything else. Records are permuted with a
/// seeded Fisher–Yates shuffle and sliced into contiguous ranges sized by
/// [`partition_sizes`], so sizes always sum to the input length.
pub fn split(
    collection: &Collection,
    ratios: SplitRatios,
    seed: u64,
) -> Result<PartitionAssignment, PipelineError> {
    let ratios = ratios.normalized()?;
    if let Some(record_id) = collection.first_duplicate_id() {
        return Err(PipelineError::DuplicateRecord {
            source_id: collection.source.clone(),
            record_id: record_id.clone(),
        });
    }

    let total = collection.len();
    let order = DeterministicRng::new(seed).permutation(total);
    let sizes = partition_sizes(total, ratios);
    let mut labels = IndexMap::with_capacity(total);
    let mut cursor = order.into_iter();
    for (label, size) in sizes {
        for idx in cursor.by_ref().take(size) {
            labels.insert(collection.records[idx].id.clone(), label);
        }
    }

    info!(
        source = %collection.source,
        seed,
        train = sizes[0].1,
        validation = sizes[1].1,
        test = sizes[2].1,
        "split collection"
    );

    Ok(PartitionAssignment {
        source: collection.source.clone(),
        seed,
        ratios,
        labels,
    })
}
