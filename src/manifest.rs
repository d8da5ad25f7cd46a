//! Partition manifests and provenance reports.
//!
//! A [`PartitionManifest`] depends only on the assignment, so the same input
//! order and seed always serialize to identical bytes. The
//! [`ProvenanceReport`] written next to the partitions wraps it with run
//! metadata (timestamps, discard and sample accounting).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::layout::MANIFEST_VERSION;
use crate::errors::PipelineError;
use crate::sampling::SampleReport;
use crate::schema::ValidationReport;
use crate::splits::{SplitLabel, SplitRatios};
use crate::types::{PathString, RecordId, SourceId};

/// Ids and checksum for one partition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartitionEntry {
    pub label: SplitLabel,
    pub count: usize,
    /// Order-sensitive checksum of `ids`, hex encoded.
    pub checksum: String,
    pub ids: Vec<RecordId>,
}

/// Deterministic description of a partition assignment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartitionManifest {
    pub source: SourceId,
    pub seed: u64,
    pub ratios: SplitRatios,
    pub total: usize,
    pub partitions: Vec<PartitionEntry>,
}

impl PartitionManifest {
    pub fn entry(&self, label: SplitLabel) -> Option<&PartitionEntry> {
        self.partitions.iter().find(|entry| entry.label == label)
    }

    /// Pretty JSON bytes; identical assignments give identical bytes.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, PipelineError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

/// Run metadata supplied by the caller of `persist::save`.
#[derive(Clone, Debug, PartialEq)]
pub struct ProvenanceInput {
    pub schema_version: Option<String>,
    /// One report per validation pass, in pipeline order.
    pub validation: Vec<ValidationReport>,
    pub sample: Option<SampleReport>,
    pub started_at: DateTime<Utc>,
}

impl ProvenanceInput {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            schema_version: None,
            validation: Vec::new(),
            sample: None,
            started_at,
        }
    }

    pub fn with_validation(mut self, report: ValidationReport) -> Self {
        self.schema_version = Some(report.schema_version.clone());
        self.validation.push(report);
        self
    }

    pub fn with_sample(mut self, report: SampleReport) -> Self {
        self.sample = Some(report);
        self
    }

    /// Records discarded across every validation pass.
    pub fn discarded(&self) -> usize {
        self.validation.iter().map(|report| report.discarded).sum()
    }
}

/// Files written for one partition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartitionFiles {
    pub label: SplitLabel,
    pub count: usize,
    pub checksum: String,
    /// Annotation file, relative to the destination root.
    pub annotations: PathString,
    /// Image folder, relative to the destination root.
    pub images: PathString,
    pub images_written: usize,
}

/// Contents of `manifest.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceReport {
    pub manifest_version: u32,
    pub tool_version: String,
    pub source: SourceId,
    pub schema_version: Option<String>,
    pub seed: u64,
    pub ratios: SplitRatios,
    pub discarded: usize,
    pub validation: Vec<ValidationReport>,
    pub sample: Option<SampleReport>,
    pub files: Vec<PartitionFiles>,
    pub assignment: PartitionManifest,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ProvenanceReport {
    pub fn new(
        input: &ProvenanceInput,
        assignment: PartitionManifest,
        files: Vec<PartitionFiles>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            manifest_version: MANIFEST_VERSION,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            source: assignment.source.clone(),
            schema_version: input.schema_version.clone(),
            seed: assignment.seed,
            ratios: assignment.ratios,
            discarded: input.discarded(),
            validation: input.validation.clone(),
            sample: input.sample.clone(),
            files,
            assignment,
            started_at: input.started_at,
            finished_at,
        }
    }

    pub fn count(&self, label: SplitLabel) -> usize {
        self.assignment.entry(label).map_or(0, |entry| entry.count)
    }
}
