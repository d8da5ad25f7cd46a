//! Writing partitions, images, and provenance to a destination layout.

use chrono::Utc;
use image::imageops::FilterType;
use image::{ImageFormat, ImageReader};
use std::collections::HashSet;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::coco::{CocoDocument, partition_image_path};
use crate::constants::layout::{ANNOTATIONS_DIR, IMAGES_DIR, JSON_EXTENSION, MANIFEST_FILENAME};
use crate::data::Collection;
use crate::errors::PipelineError;
use crate::manifest::{PartitionFiles, ProvenanceInput, ProvenanceReport};
use crate::splits::{PartitionAssignment, Partitions, SplitLabel};
use crate::transport::fs::{copy_atomic, ensure_dir, write_atomic, write_json_atomic};

/// Where and how one collection's partitions are written.
#[derive(Clone, Debug, PartialEq)]
pub struct DestinationLayout {
    /// Output directory for this collection.
    pub root: PathBuf,
    /// Directory holding the source images referenced by `Record::image`.
    /// Images are not copied when unset.
    pub source_images: Option<PathBuf>,
    /// Target `[height, width]` of written images.
    pub image_size: Option<[u32; 2]>,
    /// Resize images to `image_size` instead of copying them verbatim.
    pub resize_images: bool,
}

impl DestinationLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            source_images: None,
            image_size: None,
            resize_images: false,
        }
    }

    pub fn with_source_images(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source_images = Some(dir.into());
        self
    }

    pub fn with_image_size(mut self, image_size: [u32; 2], resize_images: bool) -> Self {
        self.image_size = Some(image_size);
        self.resize_images = resize_images;
        self
    }

    pub fn annotations_path(&self, label: SplitLabel) -> PathBuf {
        self.root
            .join(ANNOTATIONS_DIR)
            .join(format!("{}.{JSON_EXTENSION}", label.as_str()))
    }

    pub fn images_dir(&self, label: SplitLabel) -> PathBuf {
        self.root.join(IMAGES_DIR).join(label.as_str())
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILENAME)
    }

    fn resize_target(&self) -> Option<[u32; 2]> {
        self.image_size.filter(|_| self.resize_images)
    }
}

/// Persist every partition plus `manifest.json`.
///
/// Each file lands through a temp file and rename, so a failed save leaves
/// either the previous file or nothing at each path. The partitions are
/// borrowed and can be saved again after a failure.
pub fn save(
    partitions: &Partitions,
    assignment: &PartitionAssignment,
    layout: &DestinationLayout,
    provenance: &ProvenanceInput,
) -> Result<ProvenanceReport, PipelineError> {
    if partitions.total() != assignment.total() {
        return Err(PipelineError::Config(format!(
            "partitions hold {} records but the assignment covers {}",
            partitions.total(),
            assignment.total()
        )));
    }
    ensure_dir(&layout.root)?;

    let manifest = assignment.manifest();
    let mut files = Vec::with_capacity(3);
    for (label, collection) in partitions.iter() {
        let annotations = layout.annotations_path(label);
        let document = CocoDocument::from_collection(collection, layout.resize_target())?;
        write_json_atomic(&annotations, &document)?;

        let images_written = match &layout.source_images {
            Some(source_dir) => {
                write_images(collection, source_dir, &layout.images_dir(label), layout)?
            }
            None => 0,
        };
        debug!(
            source = %collection.source,
            partition = %label,
            records = collection.len(),
            images_written,
            "wrote partition"
        );

        let checksum = manifest
            .entry(label)
            .map(|entry| entry.checksum.clone())
            .unwrap_or_default();
        files.push(PartitionFiles {
            label,
            count: collection.len(),
            checksum,
            annotations: relative_display(&layout.root, &annotations),
            images: relative_display(&layout.root, &layout.images_dir(label)),
            images_written,
        });
    }

    let report = ProvenanceReport::new(provenance, manifest, files, Utc::now());
    write_json_atomic(&layout.manifest_path(), &report)?;
    info!(
        source = %report.source,
        root = %layout.root.display(),
        train = report.count(SplitLabel::Train),
        validation = report.count(SplitLabel::Validation),
        test = report.count(SplitLabel::Test),
        "saved partitions"
    );
    Ok(report)
}

fn write_images(
    collection: &Collection,
    source_dir: &Path,
    target_dir: &Path,
    layout: &DestinationLayout,
) -> Result<usize, PipelineError> {
    ensure_dir(target_dir)?;
    let mut written = HashSet::new();
    for record in &collection.records {
        let relative = partition_image_path(record)?;
        let target = target_dir.join(&relative);
        if !written.insert(relative) {
            continue;
        }
        let source = source_dir.join(&record.image);
        match layout.resize_target() {
            Some(size) => resize_image(&source, &target, size)?,
            None => {
                copy_atomic(&source, &target)?;
            }
        }
    }
    Ok(written.len())
}

/// Decode `source`, resize to exactly `[height, width]`, and write `target`
/// in the format implied by its extension.
pub fn resize_image(source: &Path, target: &Path, size: [u32; 2]) -> Result<(), PipelineError> {
    let image_error = |path: &Path, reason: String| PipelineError::Image {
        path: path.to_path_buf(),
        reason,
    };
    let reader = ImageReader::open(source).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => PipelineError::NotFound {
            path: source.to_path_buf(),
        },
        _ => PipelineError::Io(err),
    })?;
    let decoded = reader
        .with_guessed_format()
        .map_err(PipelineError::Io)?
        .decode()
        .map_err(|err| image_error(source, err.to_string()))?;
    let [height, width] = size;
    let resized = decoded.resize_exact(width, height, FilterType::Triangle);
    let format = ImageFormat::from_path(target)
        .map_err(|err| image_error(target, err.to_string()))?;
    let mut encoded = Cursor::new(Vec::new());
    resized
        .write_to(&mut encoded, format)
        .map_err(|err| image_error(target, err.to_string()))?;
    write_atomic(target, encoded.get_ref())
}

fn relative_display(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
