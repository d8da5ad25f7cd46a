#![doc = include_str!("../README.md")]

/// CLI runner behind the `spv2-coco` binary.
pub mod app;
/// Zip archiving of the output root.
pub mod archive;
/// Camera intrinsics and their rescaling for resized images.
pub mod camera;
/// COCO keypoint document types.
pub mod coco;
/// Command builders for the renderer, reconstruction, and translation tools.
pub mod collaborators;
/// Conversion configuration.
pub mod config;
/// Centralized constants used across loading, splitting, and persistence.
pub mod constants;
/// Record and collection types.
pub mod data;
/// Subprocess execution with deadlines and cancellation.
pub mod external;
mod hash;
/// Partition manifests and provenance reports.
pub mod manifest;
/// Label balance metrics.
pub mod metrics;
/// Persistence of partitions to a destination layout.
pub mod persist;
/// End-to-end domain conversion.
pub mod pipeline;
mod rng;
/// Seeded subsampling.
pub mod sampling;
/// Required-field schemas and validation.
pub mod schema;
/// Annotation file loaders.
pub mod source;
/// Deterministic train/validation/test partitioning.
pub mod splits;
/// Filesystem helpers (filesystem today; object stores later).
pub mod transport;
/// Unpaired image-translation dataset builder.
pub mod translation;
/// Shared type aliases.
pub mod types;

mod errors;

pub use coco::CocoDocument;
pub use config::ConvertConfig;
pub use data::{Collection, Payload, Record};
pub use errors::PipelineError;
pub use external::{
    CancelToken, ExternalCommand, ExternalJob, ExternalResult, run_external,
    run_external_batch, run_external_with_cancel,
};
pub use manifest::{PartitionManifest, ProvenanceInput, ProvenanceReport};
pub use persist::{DestinationLayout, save};
pub use pipeline::{PipelineSummary, run};
pub use rng::DeterministicRng;
pub use sampling::{SampleOutcome, SampleReport, SamplingStrategy, sample};
pub use schema::{
    FieldShape, FieldSpec, RecordSchema, ValidationOutcome, ValidationReport, validate,
};
pub use source::{load, load_domain};
pub use splits::{PartitionAssignment, Partitions, SplitLabel, SplitRatios, split};
pub use translation::{
    TranslationDatasetConfig, TranslationDatasetReport, build_translation_dataset,
};
pub use types::{CategoryId, DiscardReason, FieldKey, PathString, RecordId, SourceId};
