//! Unpaired image-translation dataset built from two acquisition domains.
//!
//! Layout under the dataset directory:
//! `train_A/`, `test_A/` (source domain), `train_B/`, `test_B/` (target
//! domain), `fixed_prompt_a.txt`, `fixed_prompt_b.txt`, and `README.md`.
//! Train and test folders hold the same images.

use image::ImageFormat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::archive::archive_dir;
use crate::constants::layout::{README_FILENAME, SOURCE_IMAGES_DIR};
use crate::constants::translation::{
    DEFAULT_DATASET_NAME, DEFAULT_IMAGE_COUNT, DEFAULT_IMAGE_SIZE, NETWORK_CREDIT, PROMPT_FILES,
    TEST_A_DIR, TEST_B_DIR, TRAIN_A_DIR, TRAIN_B_DIR,
};
use crate::errors::PipelineError;
use crate::persist::resize_image;
use crate::transport::fs::{copy_atomic, ensure_dir, write_atomic};

/// Settings for [`build_translation_dataset`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TranslationDatasetConfig {
    /// Directory name, created next to the conversion output root.
    pub name: String,
    /// Domain translated from (`*_A` folders).
    pub source_domain: String,
    /// Domain translated to (`*_B` folders).
    pub target_domain: String,
    /// Images taken from each domain, first in file-name order.
    pub image_count: usize,
    /// Output image size `[height, width]`.
    pub image_size: [u32; 2],
    /// Also write `<name>.zip`; the directory is kept.
    pub zip_output: bool,
}

impl Default for TranslationDatasetConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_DATASET_NAME.to_string(),
            source_domain: "synthetic".to_string(),
            target_domain: "sunlamp".to_string(),
            image_count: DEFAULT_IMAGE_COUNT,
            image_size: DEFAULT_IMAGE_SIZE,
            zip_output: false,
        }
    }
}

impl TranslationDatasetConfig {
    /// `<parent of output_root>/<name>`.
    pub fn dataset_dir(&self, output_root: &Path) -> PathBuf {
        output_root
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(&self.name)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let plain_name = |value: &str| {
            !value.is_empty() && !value.contains(['/', '\\']) && value != "." && value != ".."
        };
        if !plain_name(&self.name) {
            return Err(PipelineError::Config(format!(
                "invalid translation dataset name '{}'",
                self.name
            )));
        }
        for domain in [&self.source_domain, &self.target_domain] {
            if !plain_name(domain) {
                return Err(PipelineError::Config(format!(
                    "invalid translation domain '{domain}'"
                )));
            }
        }
        if self.source_domain == self.target_domain {
            return Err(PipelineError::Config(format!(
                "translation source and target are both '{}'",
                self.source_domain
            )));
        }
        if self.image_count == 0 {
            return Err(PipelineError::Config(
                "translation image_count must be at least 1".into(),
            ));
        }
        if self.image_size.contains(&0) {
            return Err(PipelineError::Config(format!(
                "translation image_size must be positive, got {:?}",
                self.image_size
            )));
        }
        Ok(())
    }
}

/// What [`build_translation_dataset`] wrote.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TranslationDatasetReport {
    pub root: PathBuf,
    /// Images in each of `train_A` and `test_A`.
    pub source_images: usize,
    /// Images in each of `train_B` and `test_B`.
    pub target_images: usize,
    pub archive: Option<PathBuf>,
}

/// Resize the first `image_count` images of both domains into `dataset_dir`.
///
/// Images come from `<source_root>/<domain>/images`. A domain with fewer
/// images contributes what it has; a domain with none is an error.
pub fn build_translation_dataset(
    config: &TranslationDatasetConfig,
    source_root: &Path,
    dataset_dir: &Path,
) -> Result<TranslationDatasetReport, PipelineError> {
    config.validate()?;
    ensure_dir(dataset_dir)?;

    let source_images = write_domain(
        config,
        &config.source_domain,
        source_root,
        [dataset_dir.join(TRAIN_A_DIR), dataset_dir.join(TEST_A_DIR)],
    )?;
    let target_images = write_domain(
        config,
        &config.target_domain,
        source_root,
        [dataset_dir.join(TRAIN_B_DIR), dataset_dir.join(TEST_B_DIR)],
    )?;
    for (file_name, prompt) in PROMPT_FILES {
        write_atomic(&dataset_dir.join(file_name), prompt.as_bytes())?;
    }
    write_atomic(
        &dataset_dir.join(README_FILENAME),
        readme(config, source_images, target_images).as_bytes(),
    )?;

    let archive = if config.zip_output {
        Some(archive_dir(dataset_dir)?)
    } else {
        None
    };
    info!(
        dataset = %dataset_dir.display(),
        source = %config.source_domain,
        target = %config.target_domain,
        source_images,
        target_images,
        "built translation dataset"
    );
    Ok(TranslationDatasetReport {
        root: dataset_dir.to_path_buf(),
        source_images,
        target_images,
        archive,
    })
}

fn write_domain(
    config: &TranslationDatasetConfig,
    domain: &str,
    source_root: &Path,
    [train_dir, test_dir]: [PathBuf; 2],
) -> Result<usize, PipelineError> {
    let images_dir = source_root.join(domain).join(SOURCE_IMAGES_DIR);
    let images = select_images(&images_dir, config.image_count)?;
    if images.is_empty() {
        return Err(PipelineError::EmptyCollection {
            source_id: domain.to_string(),
            discarded: 0,
        });
    }
    if images.len() < config.image_count {
        warn!(
            domain,
            requested = config.image_count,
            available = images.len(),
            "domain has fewer images than requested"
        );
    }
    ensure_dir(&train_dir)?;
    ensure_dir(&test_dir)?;
    images.par_iter().try_for_each(|source| {
        let file_name = source.file_name().ok_or_else(|| PipelineError::NotFound {
            path: source.clone(),
        })?;
        let train = train_dir.join(file_name);
        resize_image(source, &train, config.image_size)?;
        copy_atomic(&train, &test_dir.join(file_name)).map(|_| ())
    })?;
    debug!(domain, images = images.len(), "wrote translation images");
    Ok(images.len())
}

/// First `count` decodable-looking image files directly in `dir`, by name.
fn select_images(dir: &Path, count: usize) -> Result<Vec<PathBuf>, PipelineError> {
    if !dir.is_dir() {
        return Err(PipelineError::NotFound {
            path: dir.to_path_buf(),
        });
    }
    Ok(WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| {
            entry.file_type().is_file() && ImageFormat::from_path(entry.path()).is_ok()
        })
        .map(|entry| entry.into_path())
        .take(count)
        .collect())
}

fn readme(config: &TranslationDatasetConfig, source_images: usize, target_images: usize) -> String {
    let [height, width] = config.image_size;
    format!(
        "# {name}\n\n\
         This dataset contains {source_images} {source} images (A) and {target_images} \
         {target} images (B).\n\
         The images are {height}x{width} pixels.\n\
         {NETWORK_CREDIT}\n",
        name = config.name,
        source = config.source_domain,
        target = config.target_domain,
    )
}
