//! COCO keypoint documents: assembly from partitions and decoding back into records.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Component, Path};
use tracing::debug;

use crate::constants::coco::{
    DATASET_DESCRIPTION, DATASET_VERSION, IMAGE_RECORD_ID_FIELD, LICENSE_NAME,
    SHADOWED_FIELDS_KEY, SUPERCATEGORY,
};
use crate::constants::speedplus::KEYPOINT_NAMES;
use crate::data::{Collection, Payload, Record};
use crate::errors::PipelineError;

/// Payload keys that would collide with the annotation envelope. They are
/// nested under [`SHADOWED_FIELDS_KEY`] on write and restored on read.
const RESERVED_ANNOTATION_KEYS: [&str; 4] = ["id", "image_id", "category_id", SHADOWED_FIELDS_KEY];

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CocoInfo {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CocoLicense {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CocoImage {
    pub id: u64,
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(flatten)]
    pub extra: Payload,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CocoAnnotation {
    pub id: u64,
    pub image_id: u64,
    pub category_id: u64,
    /// Keypoints, bbox, pose, and any other per-annotation field.
    #[serde(flatten)]
    pub fields: Payload,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CocoCategory {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub supercategory: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keypoints: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skeleton: Vec<[u32; 2]>,
}

/// A COCO document. Only `images`, `annotations`, and `categories` are required
/// when decoding.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CocoDocument {
    #[serde(default)]
    pub info: CocoInfo,
    #[serde(default)]
    pub licenses: Vec<CocoLicense>,
    pub images: Vec<CocoImage>,
    pub annotations: Vec<CocoAnnotation>,
    pub categories: Vec<CocoCategory>,
}

impl CocoDocument {
    /// One image and one annotation per record; one category per label.
    ///
    /// `image_size` (`[h, w]`) is stamped on every image when known. Fails on
    /// an image reference that would escape the partition folder.
    pub fn from_collection(
        collection: &Collection,
        image_size: Option<[u32; 2]>,
    ) -> Result<Self, PipelineError> {
        let mut category_ids: IndexMap<&str, u64> = IndexMap::new();
        for record in &collection.records {
            let next = category_ids.len() as u64 + 1;
            category_ids.entry(record.label.as_str()).or_insert(next);
        }
        let categories = category_ids
            .iter()
            .map(|(name, id)| CocoCategory {
                id: *id,
                name: (*name).to_string(),
                supercategory: SUPERCATEGORY.to_string(),
                keypoints: KEYPOINT_NAMES.iter().map(|name| name.to_string()).collect(),
                skeleton: Vec::new(),
            })
            .collect();

        let mut images = Vec::with_capacity(collection.len());
        let mut annotations = Vec::with_capacity(collection.len());
        for (idx, record) in collection.records.iter().enumerate() {
            let id = idx as u64 + 1;
            let mut extra = Payload::new();
            extra.insert(
                IMAGE_RECORD_ID_FIELD.to_string(),
                Value::String(record.id.clone()),
            );
            images.push(CocoImage {
                id,
                file_name: partition_image_path(record)?,
                height: image_size.map(|[h, _]| h),
                width: image_size.map(|[_, w]| w),
                extra,
            });
            let mut fields = Payload::new();
            let mut shadowed = Payload::new();
            for (key, value) in &record.payload {
                if RESERVED_ANNOTATION_KEYS.contains(&key.as_str()) {
                    shadowed.insert(key.clone(), value.clone());
                } else {
                    fields.insert(key.clone(), value.clone());
                }
            }
            if !shadowed.is_empty() {
                fields.insert(SHADOWED_FIELDS_KEY.to_string(), Value::Object(shadowed));
            }
            annotations.push(CocoAnnotation {
                id,
                image_id: id,
                category_id: category_ids[record.label.as_str()],
                fields,
            });
        }

        Ok(Self {
            info: CocoInfo {
                description: DATASET_DESCRIPTION.to_string(),
                version: DATASET_VERSION.to_string(),
            },
            licenses: vec![CocoLicense {
                id: 1,
                name: LICENSE_NAME.to_string(),
                url: String::new(),
            }],
            images,
            annotations,
            categories,
        })
    }

    /// Decode annotations into records, one per annotation in document order.
    ///
    /// Record ids come from the image's `record_id` field, falling back to its
    /// file name; further annotations on the same image get a `#n` suffix.
    /// Images without annotations are skipped.
    pub fn into_records(self, origin: &Path) -> Result<Vec<Record>, PipelineError> {
        let images: HashMap<u64, &CocoImage> =
            self.images.iter().map(|image| (image.id, image)).collect();
        let categories: HashMap<u64, &str> = self
            .categories
            .iter()
            .map(|category| (category.id, category.name.as_str()))
            .collect();

        let mut per_image: HashMap<u64, usize> = HashMap::new();
        let mut records = Vec::with_capacity(self.annotations.len());
        for annotation in &self.annotations {
            let image = images.get(&annotation.image_id).ok_or_else(|| PipelineError::Parse {
                path: origin.to_path_buf(),
                reason: format!(
                    "annotation {} references unknown image {}",
                    annotation.id, annotation.image_id
                ),
            })?;
            let label = categories
                .get(&annotation.category_id)
                .ok_or_else(|| PipelineError::Parse {
                    path: origin.to_path_buf(),
                    reason: format!(
                        "annotation {} references unknown category {}",
                        annotation.id, annotation.category_id
                    ),
                })?;
            let base_id = image
                .extra
                .get(IMAGE_RECORD_ID_FIELD)
                .and_then(Value::as_str)
                .unwrap_or(&image.file_name);
            let seen = per_image.entry(image.id).or_insert(0);
            let id = if *seen == 0 {
                base_id.to_string()
            } else {
                format!("{base_id}#{seen}")
            };
            *seen += 1;
            let mut payload = annotation.fields.clone();
            if let Some(Value::Object(shadowed)) = payload.remove(SHADOWED_FIELDS_KEY) {
                payload.extend(shadowed);
            }
            records.push(Record {
                id,
                image: image.file_name.clone(),
                label: (*label).to_string(),
                payload,
            });
        }
        let skipped = self.images.len().saturating_sub(per_image.len());
        if skipped > 0 {
            debug!(path = %origin.display(), skipped, "images without annotations skipped");
        }
        Ok(records)
    }
}

/// Path of a record's image inside a partition folder, `/`-separated.
///
/// Subdirectories are kept so `a/img.jpg` and `b/img.jpg` stay distinct.
/// `.` segments are dropped; absolute paths and `..` are rejected.
pub fn partition_image_path(record: &Record) -> Result<String, PipelineError> {
    let invalid = || PipelineError::InvalidImagePath {
        record_id: record.id.clone(),
        image: record.image.clone(),
    };
    let mut parts = Vec::new();
    for component in Path::new(&record.image).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(invalid());
            }
        }
    }
    if parts.is_empty() {
        return Err(invalid());
    }
    Ok(parts.join("/"))
}
