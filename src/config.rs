use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::collaborators::{ReconstructionConfig, RendererConfig, TranslationConfig};
use crate::constants::config::{
    DEFAULT_IMAGE_SIZE, DEFAULT_OUTPUT_ROOT, DEFAULT_SAMPLE_SIZE, DEFAULT_SEED,
    DEFAULT_SOURCE_ROOT, KNOWN_DOMAINS,
};
use crate::errors::PipelineError;
use crate::sampling::SamplingStrategy;
use crate::splits::SplitRatios;
use crate::translation::TranslationDatasetConfig;
use crate::transport::fs::read_json;

/// Conversion settings, read from JSON. Every field has a default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConvertConfig {
    /// Acquisition domains to convert, each a directory under `source_root`.
    pub data_types: Vec<String>,
    /// Fraction of each domain kept by sampling.
    pub sample_size: f64,
    pub sampling: SamplingStrategy,
    pub train_ratio: f64,
    pub val_ratio: f64,
    pub test_ratio: f64,
    /// Domains split three ways; every other domain goes entirely to `test`.
    pub split_domains: Vec<String>,
    /// Output image size `[height, width]`.
    pub image_size: [u32; 2],
    pub resize_images: bool,
    /// Archive the output root into `<output_root>.zip` and remove the directory.
    pub zip_output: bool,
    pub seed: u64,
    /// Domains processed concurrently.
    pub workers: usize,
    pub source_root: PathBuf,
    pub output_root: PathBuf,
    /// Keypoint definition copied to `<output_root>/keypoints.json`.
    pub keypoints_file: Option<PathBuf>,
    /// Renders COCO keypoint annotations for sampled poses when set.
    pub renderer: Option<RendererConfig>,
    pub reconstruction: Option<ReconstructionConfig>,
    /// Runs on the built translation dataset when one is configured,
    /// otherwise on each converted domain's raw images.
    pub translation: Option<TranslationConfig>,
    /// Builds an unpaired translation dataset next to `output_root`.
    pub translation_dataset: Option<TranslationDatasetConfig>,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            data_types: KNOWN_DOMAINS.iter().map(|d| d.to_string()).collect(),
            sample_size: DEFAULT_SAMPLE_SIZE,
            sampling: SamplingStrategy::Exact,
            train_ratio: 0.7,
            val_ratio: 0.15,
            test_ratio: 0.15,
            split_domains: vec!["synthetic".to_string()],
            image_size: DEFAULT_IMAGE_SIZE,
            resize_images: true,
            zip_output: false,
            seed: DEFAULT_SEED,
            workers: 1,
            source_root: PathBuf::from(DEFAULT_SOURCE_ROOT),
            output_root: PathBuf::from(DEFAULT_OUTPUT_ROOT),
            keypoints_file: None,
            renderer: None,
            reconstruction: None,
            translation: None,
            translation_dataset: None,
        }
    }
}

impl ConvertConfig {
    /// Read a config file. A missing file yields the defaults unless `required`.
    pub fn load(path: &Path, required: bool) -> Result<Self, PipelineError> {
        match read_json::<Self>(path) {
            Ok(config) => {
                info!(path = %path.display(), "loaded configuration");
                Ok(config)
            }
            Err(PipelineError::NotFound { .. }) if !required => {
                info!(path = %path.display(), "no configuration file; using defaults");
                Ok(Self::default())
            }
            Err(PipelineError::NotFound { path }) => Err(PipelineError::Config(format!(
                "configuration file '{}' not found",
                path.display()
            ))),
            Err(PipelineError::Parse { path, reason }) => Err(PipelineError::Config(format!(
                "invalid configuration '{}': {reason}",
                path.display()
            ))),
            Err(other) => Err(other),
        }
    }

    pub fn split_ratios(&self) -> SplitRatios {
        SplitRatios::new(self.train_ratio, self.val_ratio, self.test_ratio)
    }

    /// Ratios applied to `domain`.
    pub fn ratios_for(&self, domain: &str) -> SplitRatios {
        if self.split_domains.iter().any(|d| d == domain) {
            self.split_ratios()
        } else {
            SplitRatios::test_only()
        }
    }

    /// Reject settings that would fail later; runs before any I/O.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.split_ratios().normalized()?;
        if !(0.0..=1.0).contains(&self.sample_size) {
            return Err(PipelineError::Config(format!(
                "sample_size must be within [0, 1], got {}",
                self.sample_size
            )));
        }
        if self.data_types.is_empty() {
            return Err(PipelineError::Config("data_types must not be empty".into()));
        }
        let mut seen = HashSet::new();
        for domain in &self.data_types {
            if domain.is_empty() || domain.contains(['/', '\\']) || domain == ".." {
                return Err(PipelineError::Config(format!(
                    "invalid domain name '{domain}'"
                )));
            }
            if !seen.insert(domain.as_str()) {
                return Err(PipelineError::Config(format!(
                    "domain '{domain}' listed twice in data_types"
                )));
            }
            if !KNOWN_DOMAINS.contains(&domain.as_str()) {
                warn!(domain = %domain, "domain is not a SPEED+ v2 domain");
            }
        }
        for domain in &self.split_domains {
            if !seen.contains(domain.as_str()) {
                warn!(domain = %domain, "split domain is not in data_types");
            }
        }
        if self.image_size.contains(&0) {
            return Err(PipelineError::Config(format!(
                "image_size must be positive, got {:?}",
                self.image_size
            )));
        }
        if self.workers == 0 {
            return Err(PipelineError::Config("workers must be at least 1".into()));
        }
        if let Some(dataset) = &self.translation_dataset {
            dataset.validate()?;
            if dataset.dataset_dir(&self.output_root) == self.output_root {
                return Err(PipelineError::Config(format!(
                    "translation dataset '{}' would overwrite the output root",
                    dataset.name
                )));
            }
        }
        Ok(())
    }
}
