//! End-to-end conversion: every configured domain runs
//! load → validate → sample → (render → validate) → split → save,
//! then shared root files, the optional translation dataset, collaborator
//! jobs, and the archive.

use chrono::Utc;
use rayon::prelude::*;
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::archive::archive_and_remove;
use crate::camera::CameraParams;
use crate::collaborators::RendererConfig;
use crate::config::ConvertConfig;
use crate::constants::external::{RENDER_INPUT_FILENAME, RENDER_OUTPUT_FILENAME};
use crate::constants::layout::{
    CAMERA_FILENAME, KEYPOINTS_FILENAME, README_FILENAME, SOURCE_IMAGES_DIR,
};
use crate::constants::speedplus::{SOURCE_IMAGE_HEIGHT, SOURCE_IMAGE_WIDTH};
use crate::constants::translation::{TEST_A_DIR, TRANSLATED_DIR};
use crate::data::Collection;
use crate::errors::PipelineError;
use crate::external::{ExternalJob, ExternalResult, run_external, run_external_batch};
use crate::manifest::{ProvenanceInput, ProvenanceReport};
use crate::persist::{DestinationLayout, save};
use crate::sampling::sample;
use crate::schema::{RecordSchema, ValidationReport, validate};
use crate::source::{load, load_domain, speedplus::record_to_pose_entry};
use crate::splits::split;
use crate::translation::{TranslationDatasetReport, build_translation_dataset};
use crate::transport::fs::{ensure_dir, read_json, write_atomic, write_json_atomic};

/// Result of converting one domain.
#[derive(Debug)]
pub struct DomainOutcome {
    pub domain: String,
    pub result: Result<ProvenanceReport, PipelineError>,
}

/// Everything a run produced.
#[derive(Debug, Default)]
pub struct PipelineSummary {
    /// One entry per configured domain, in configuration order.
    pub domains: Vec<DomainOutcome>,
    /// Set when a translation dataset was configured.
    pub translation_dataset: Option<Result<TranslationDatasetReport, PipelineError>>,
    /// Reconstruction and translation jobs, in submission order.
    pub collaborators: Vec<Result<ExternalResult, PipelineError>>,
    pub archive: Option<PathBuf>,
}

impl PipelineSummary {
    pub fn failed_domains(&self) -> impl Iterator<Item = &DomainOutcome> {
        self.domains.iter().filter(|outcome| outcome.result.is_err())
    }

    pub fn is_success(&self) -> bool {
        self.failed_domains().next().is_none()
            && self.translation_dataset.as_ref().is_none_or(Result::is_ok)
            && self.collaborators.iter().all(Result::is_ok)
    }
}

/// Run a full conversion.
///
/// Configuration errors abort before any I/O. A failing domain is recorded in
/// the summary and does not stop the other domains.
pub fn run(config: &ConvertConfig) -> Result<PipelineSummary, PipelineError> {
    config.validate()?;
    ensure_dir(&config.output_root)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers)
        .build()
        .map_err(|err| PipelineError::Config(format!("failed to build worker pool: {err}")))?;
    let domains: Vec<DomainOutcome> = pool.install(|| {
        config
            .data_types
            .par_iter()
            .map(|domain| DomainOutcome {
                domain: domain.clone(),
                result: convert_domain(config, domain),
            })
            .collect()
    });
    for outcome in &domains {
        if let Err(err) = &outcome.result {
            error!(domain = %outcome.domain, error = %err, "domain conversion failed");
        }
    }

    write_root_files(config)?;

    let translation_dataset = config.translation_dataset.as_ref().map(|dataset| {
        let dataset_dir = dataset.dataset_dir(&config.output_root);
        let built =
            pool.install(|| build_translation_dataset(dataset, &config.source_root, &dataset_dir));
        if let Err(err) = &built {
            error!(dataset = %dataset.name, error = %err, "translation dataset failed");
        }
        built
    });

    let built = translation_dataset.as_ref().and_then(|built| built.as_ref().ok());
    let jobs = collaborator_jobs(config, &domains, built);
    let collaborators = if jobs.is_empty() {
        Vec::new()
    } else {
        run_external_batch(&jobs, config.workers)?
    };

    let archive = if config.zip_output {
        Some(archive_and_remove(&config.output_root)?)
    } else {
        None
    };

    let summary = PipelineSummary {
        domains,
        translation_dataset,
        collaborators,
        archive,
    };
    info!(
        domains = summary.domains.len(),
        failed = summary.failed_domains().count(),
        "conversion finished"
    );
    Ok(summary)
}

/// Convert one domain directory into `<output_root>/<domain>`.
pub fn convert_domain(
    config: &ConvertConfig,
    domain: &str,
) -> Result<ProvenanceReport, PipelineError> {
    let started_at = Utc::now();
    let source_dir = config.source_root.join(domain);
    let output_dir = config.output_root.join(domain);

    let raw = load_domain(&source_dir, domain)?;
    let (poses, pose_report) = validate(&raw, &RecordSchema::speedplus_pose())?.into_non_empty()?;
    let sampled = sample(&poses, config.sample_size, config.sampling, config.seed)?;
    let mut provenance = ProvenanceInput::new(started_at)
        .with_validation(pose_report)
        .with_sample(sampled.report);

    let records = match &config.renderer {
        Some(_) if sampled.collection.is_empty() => sampled.collection,
        Some(renderer) => {
            let (rendered, report) = render(
                renderer,
                &sampled.collection,
                &output_dir,
                config.image_size,
            )?;
            provenance = provenance.with_validation(report);
            rendered
        }
        None => sampled.collection,
    };

    let assignment = split(&records, config.ratios_for(domain), config.seed)?;
    let partitions = assignment.partition(&records)?;
    let layout = DestinationLayout::new(&output_dir)
        .with_source_images(source_dir.join(SOURCE_IMAGES_DIR))
        .with_image_size(config.image_size, config.resize_images);
    save(&partitions, &assignment, &layout, &provenance)
}

/// Hand sampled poses to the renderer and load its COCO output.
fn render(
    renderer: &RendererConfig,
    poses: &Collection,
    work_dir: &Path,
    image_size: [u32; 2],
) -> Result<(Collection, ValidationReport), PipelineError> {
    ensure_dir(work_dir)?;
    let input = work_dir.join(RENDER_INPUT_FILENAME);
    let output = work_dir.join(RENDER_OUTPUT_FILENAME);
    let entries: Vec<Value> = poses.records.iter().map(record_to_pose_entry).collect();
    write_json_atomic(&input, &entries)?;

    let result = run_external(
        &renderer.command(&input, &output, image_size),
        renderer.timeout(),
    );
    remove_scratch(&input);
    result?;

    let rendered = load(&output, &poses.source);
    remove_scratch(&output);
    let rendered = rendered?;
    info!(
        source = %poses.source,
        poses = poses.len(),
        annotations = rendered.len(),
        "renderer produced annotations"
    );
    validate(&rendered, &RecordSchema::coco_keypoints(Some(image_size)))?.into_non_empty()
}

fn remove_scratch(path: &Path) {
    if let Err(err) = fs::remove_file(path)
        && err.kind() != io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %err, "failed to remove renderer scratch file");
    }
}

fn write_root_files(config: &ConvertConfig) -> Result<(), PipelineError> {
    let camera_source = config.source_root.join(CAMERA_FILENAME);
    if camera_source.is_file() {
        let camera = CameraParams::load(&camera_source)?;
        let camera = if config.resize_images {
            camera.rescaled(config.image_size)
        } else {
            camera
        };
        write_json_atomic(&config.output_root.join(CAMERA_FILENAME), &camera)?;
    } else {
        warn!(path = %camera_source.display(), "camera parameters not found; skipped");
    }

    if let Some(keypoints) = &config.keypoints_file {
        let definition: Value = read_json(keypoints)?;
        write_json_atomic(&config.output_root.join(KEYPOINTS_FILENAME), &definition)?;
    }

    write_atomic(
        &config.output_root.join(README_FILENAME),
        readme(config).as_bytes(),
    )
}

fn readme(config: &ConvertConfig) -> String {
    let [height, width] = config.image_size;
    let images = if config.resize_images {
        format!(
            "Images have been resized from {SOURCE_IMAGE_HEIGHT}x{SOURCE_IMAGE_WIDTH} to \
             {height}x{width} px.\n"
        )
    } else {
        "Images are copied at their original size.\n".to_string()
    };
    let camera = if config.resize_images {
        format!(
            "Camera parameters have been adjusted for the resized images: {height}x{width} px.\n"
        )
    } else {
        "Camera parameters are unchanged.\n".to_string()
    };
    format!(
        "This directory contains the processed dataset.\n\
         Domains: {domains}. Split domains: {split}. Seed: {seed}. Sample size: {size}.\n\
         ## Camera Parameters\n{camera}\
         ## Image Parameters\n{images}\
         ## Keypoints Parameters\nExpressed in pixels [px].\n",
        domains = config.data_types.join(", "),
        split = config.split_domains.join(", "),
        seed = config.seed,
        size = config.sample_size,
    )
}

/// Reconstruction per converted domain. Translation runs once on the built
/// dataset's `test_A` when a dataset is configured, else per converted domain.
fn collaborator_jobs(
    config: &ConvertConfig,
    domains: &[DomainOutcome],
    dataset: Option<&TranslationDatasetReport>,
) -> Vec<ExternalJob> {
    let mut jobs = Vec::new();
    for outcome in domains.iter().filter(|outcome| outcome.result.is_ok()) {
        let image_dir = config
            .source_root
            .join(&outcome.domain)
            .join(SOURCE_IMAGES_DIR);
        let domain_out = config.output_root.join(&outcome.domain);
        if let Some(reconstruction) = &config.reconstruction {
            jobs.push(reconstruction.job(&image_dir, &domain_out.join("reconstruction")));
        }
        if let Some(translation) = &config.translation
            && config.translation_dataset.is_none()
        {
            let translated = domain_out.join(TRANSLATED_DIR);
            jobs.push(translation.job(&image_dir, &outcome.domain, &translated));
        }
    }
    if let (Some(translation), Some(settings), Some(built)) =
        (&config.translation, &config.translation_dataset, dataset)
    {
        jobs.push(translation.job(
            &built.root.join(TEST_A_DIR),
            &settings.source_domain,
            &built.root.join(TRANSLATED_DIR),
        ));
    }
    jobs
}
