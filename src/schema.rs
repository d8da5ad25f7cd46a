//! Required-field contracts and record validation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

use crate::constants::speedplus::{
    FIELD_AREA, FIELD_BBOX, FIELD_ISCROWD, FIELD_KEYPOINTS, FIELD_NUM_KEYPOINTS,
    FIELD_POSE_QUATERNION, FIELD_POSE_TRANSLATION, FIELD_QUATERNION, FIELD_TRANSLATION,
    KEYPOINT_NAMES, QUATERNION_NORM_TOLERANCE,
};
use crate::data::{Collection, Record};
use crate::errors::PipelineError;
use crate::types::{DiscardReason, FieldKey};

/// Expected shape of one payload field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldShape {
    /// Non-empty string.
    String,
    /// Finite number inside optional inclusive bounds.
    Number {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    /// Array of finite numbers with optional fixed length and element bounds.
    NumberArray {
        #[serde(default)]
        len: Option<usize>,
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    /// Three finite numbers.
    Vector3,
    /// Four finite numbers with unit norm.
    Quaternion,
    /// `count` COCO keypoint triplets `[x, y, v]`, `v ∈ {0, 1, 2}`.
    ///
    /// When `width`/`height` are set, labeled points must lie inside the image.
    Keypoints {
        count: usize,
        #[serde(default)]
        width: Option<f64>,
        #[serde(default)]
        height: Option<f64>,
    },
    /// COCO `[x, y, w, h]` box with non-negative extent, optionally inside the image.
    BoundingBox {
        #[serde(default)]
        width: Option<f64>,
        #[serde(default)]
        height: Option<f64>,
    },
}

/// A required payload key and its expected shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub key: FieldKey,
    pub shape: FieldShape,
}

impl FieldSpec {
    pub fn new(key: impl Into<FieldKey>, shape: FieldShape) -> Self {
        Self {
            key: key.into(),
            shape,
        }
    }
}

/// Required-field contract applied by [`validate`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordSchema {
    /// Version string recorded in manifests.
    pub version: String,
    pub fields: Vec<FieldSpec>,
}

impl RecordSchema {
    pub fn new(version: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self {
            version: version.into(),
            fields,
        }
    }

    /// Contract for raw SPEED+ v2 pose entries.
    pub fn speedplus_pose() -> Self {
        Self::new(
            "speedplus-pose/1",
            vec![
                FieldSpec::new(FIELD_QUATERNION, FieldShape::Quaternion),
                FieldSpec::new(FIELD_TRANSLATION, FieldShape::Vector3),
            ],
        )
    }

    /// Contract for rendered COCO keypoint annotations at `image_size` (`[h, w]`).
    pub fn coco_keypoints(image_size: Option<[u32; 2]>) -> Self {
        let (height, width) = match image_size {
            Some([h, w]) => (Some(f64::from(h)), Some(f64::from(w))),
            None => (None, None),
        };
        Self::new(
            "coco-keypoints/1",
            vec![
                FieldSpec::new(
                    FIELD_KEYPOINTS,
                    FieldShape::Keypoints {
                        count: KEYPOINT_NAMES.len(),
                        width,
                        height,
                    },
                ),
                FieldSpec::new(FIELD_BBOX, FieldShape::BoundingBox { width, height }),
                FieldSpec::new(
                    FIELD_NUM_KEYPOINTS,
                    FieldShape::Number {
                        min: Some(0.0),
                        max: Some(KEYPOINT_NAMES.len() as f64),
                    },
                ),
                FieldSpec::new(
                    FIELD_AREA,
                    FieldShape::Number {
                        min: Some(0.0),
                        max: None,
                    },
                ),
                FieldSpec::new(
                    FIELD_ISCROWD,
                    FieldShape::Number {
                        min: Some(0.0),
                        max: Some(1.0),
                    },
                ),
                FieldSpec::new(FIELD_POSE_QUATERNION, FieldShape::Quaternion),
                FieldSpec::new(FIELD_POSE_TRANSLATION, FieldShape::Vector3),
            ],
        )
    }

    /// Check one record; returns the first failing reason.
    pub fn check(&self, record: &Record) -> Result<(), DiscardReason> {
        if record.id.trim().is_empty() {
            return Err("empty id".to_string());
        }
        if record.image.trim().is_empty() {
            return Err("empty image reference".to_string());
        }
        for spec in &self.fields {
            let value = record
                .field(&spec.key)
                .ok_or_else(|| format!("missing field '{}'", spec.key))?;
            check_shape(&spec.shape, value)
                .map_err(|problem| format!("{}: {problem}", spec.key))?;
        }
        Ok(())
    }
}

/// Discard accounting for one validation pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub schema_version: String,
    pub total: usize,
    pub retained: usize,
    pub discarded: usize,
    /// Discard counts keyed by reason.
    pub reasons: BTreeMap<DiscardReason, usize>,
}

/// Retained records plus the discard report.
#[derive(Clone, Debug)]
pub struct ValidationOutcome {
    pub collection: Collection,
    pub report: ValidationReport,
}

impl ValidationOutcome {
    pub fn discarded(&self) -> usize {
        self.report.discarded
    }

    /// Reject the collection when nothing survived validation.
    pub fn into_non_empty(self) -> Result<(Collection, ValidationReport), PipelineError> {
        if self.collection.is_empty() {
            return Err(PipelineError::EmptyCollection {
                source_id: self.collection.source,
                discarded: self.report.discarded,
            });
        }
        Ok((self.collection, self.report))
    }
}

/// Keep every record satisfying `schema`; count the rest.
///
/// Individual bad records never raise. A repeated id keeps its first occurrence.
/// Only an empty schema is an error.
pub fn validate(
    collection: &Collection,
    schema: &RecordSchema,
) -> Result<ValidationOutcome, PipelineError> {
    if schema.fields.is_empty() {
        return Err(PipelineError::Config(format!(
            "schema '{}' declares no required fields",
            schema.version
        )));
    }

    let mut seen: HashSet<&str> = HashSet::with_capacity(collection.len());
    let mut retained = Vec::with_capacity(collection.len());
    let mut reasons: BTreeMap<DiscardReason, usize> = BTreeMap::new();

    for record in &collection.records {
        let verdict = schema.check(record).and_then(|()| {
            if seen.insert(record.id.as_str()) {
                Ok(())
            } else {
                Err("duplicate id".to_string())
            }
        });
        match verdict {
            Ok(()) => retained.push(record.clone()),
            Err(reason) => *reasons.entry(reason).or_insert(0) += 1,
        }
    }

    let discarded = collection.len() - retained.len();
    let report = ValidationReport {
        schema_version: schema.version.clone(),
        total: collection.len(),
        retained: retained.len(),
        discarded,
        reasons,
    };
    if discarded > 0 {
        warn!(
            source = %collection.source,
            schema = %schema.version,
            discarded,
            total = report.total,
            reasons = ?report.reasons,
            "discarded records failing validation"
        );
    } else {
        debug!(source = %collection.source, total = report.total, "all records valid");
    }

    Ok(ValidationOutcome {
        collection: collection.derive(retained),
        report,
    })
}

fn check_shape(shape: &FieldShape, value: &Value) -> Result<(), String> {
    match shape {
        FieldShape::String => match value.as_str() {
            Some(text) if !text.trim().is_empty() => Ok(()),
            Some(_) => Err("empty string".into()),
            None => Err("expected string".into()),
        },
        FieldShape::Number { min, max } => {
            let number = finite_number(value)?;
            check_bounds(number, *min, *max)
        }
        FieldShape::NumberArray { len, min, max } => {
            let numbers = number_array(value, *len)?;
            numbers
                .iter()
                .try_for_each(|number| check_bounds(*number, *min, *max))
        }
        FieldShape::Vector3 => number_array(value, Some(3)).map(|_| ()),
        FieldShape::Quaternion => {
            let q = number_array(value, Some(4))?;
            let norm = q.iter().map(|c| c * c).sum::<f64>().sqrt();
            if (norm - 1.0).abs() > QUATERNION_NORM_TOLERANCE {
                return Err("quaternion is not unit length".into());
            }
            Ok(())
        }
        FieldShape::Keypoints {
            count,
            width,
            height,
        } => {
            let values = number_array(value, Some(count * 3))?;
            for triplet in values.chunks_exact(3) {
                let (x, y, v) = (triplet[0], triplet[1], triplet[2]);
                if !(v == 0.0 || v == 1.0 || v == 2.0) {
                    return Err("visibility flag outside {0, 1, 2}".into());
                }
                if v > 0.0 {
                    check_bounds(x, Some(0.0), *width)
                        .map_err(|_| "keypoint outside image".to_string())?;
                    check_bounds(y, Some(0.0), *height)
                        .map_err(|_| "keypoint outside image".to_string())?;
                }
            }
            Ok(())
        }
        FieldShape::BoundingBox { width, height } => {
            let bbox = number_array(value, Some(4))?;
            let (x, y, w, h) = (bbox[0], bbox[1], bbox[2], bbox[3]);
            if w < 0.0 || h < 0.0 {
                return Err("negative box extent".into());
            }
            if x < 0.0 || y < 0.0 {
                return Err("box outside image".into());
            }
            if width.is_some_and(|limit| x + w > limit) || height.is_some_and(|limit| y + h > limit)
            {
                return Err("box outside image".into());
            }
            Ok(())
        }
    }
}

fn finite_number(value: &Value) -> Result<f64, String> {
    match value.as_f64() {
        Some(number) if number.is_finite() => Ok(number),
        _ => Err("expected finite number".into()),
    }
}

fn number_array(value: &Value, len: Option<usize>) -> Result<Vec<f64>, String> {
    let items = value.as_array().ok_or_else(|| "expected array".to_string())?;
    if let Some(expected) = len
        && items.len() != expected
    {
        return Err(format!("expected {expected} values"));
    }
    items.iter().map(finite_number).collect()
}

fn check_bounds(number: f64, min: Option<f64>, max: Option<f64>) -> Result<(), String> {
    if min.is_some_and(|min| number < min) || max.is_some_and(|max| number > max) {
        return Err("value out of bounds".into());
    }
    Ok(())
}
