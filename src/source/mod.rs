//! Loading raw annotation files into collections.
//!
//! Three JSON layouts are accepted and detected from content:
//! - SPEED+ pose arrays (`filename`, `q_vbs2tango_true`, `r_Vo2To_vbs_true`)
//! - native record arrays (`id`, `image`, `label`, `payload`)
//! - COCO documents (`images`, `annotations`, `categories`)

use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

use crate::coco::CocoDocument;
use crate::constants::speedplus::FIELD_FILENAME;
use crate::data::{Collection, Record};
use crate::errors::PipelineError;
use crate::transport::fs::{json_files_in, read_json};

/// Conversion of raw SPEED+ pose entries.
pub mod speedplus;

/// Layout detected in an annotation file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceFormat {
    SpeedplusPose,
    Records,
    Coco,
}

impl SourceFormat {
    /// Detect the layout of a decoded document. Empty arrays read as records.
    pub fn detect(document: &Value) -> Option<Self> {
        match document {
            Value::Object(object)
                if object.contains_key("images") && object.contains_key("annotations") =>
            {
                Some(SourceFormat::Coco)
            }
            Value::Array(items) => match items.first() {
                None => Some(SourceFormat::Records),
                Some(Value::Object(first)) if first.contains_key(FIELD_FILENAME) => {
                    Some(SourceFormat::SpeedplusPose)
                }
                Some(Value::Object(first)) if first.contains_key("id") => {
                    Some(SourceFormat::Records)
                }
                _ => None,
            },
            _ => None,
        }
    }
}

/// Parse one annotation file into a collection tagged `source_id`.
pub fn load(path: &Path, source_id: &str) -> Result<Collection, PipelineError> {
    let document: Value = read_json(path)?;
    let format = SourceFormat::detect(&document).ok_or_else(|| PipelineError::Parse {
        path: path.to_path_buf(),
        reason: "unrecognized annotation layout".to_string(),
    })?;
    let records = decode(document, format, path, source_id)?;
    debug!(
        path = %path.display(),
        source = source_id,
        ?format,
        records = records.len(),
        "loaded annotation file"
    );
    Ok(Collection::new(source_id, records))
}

/// Combine every `*.json` file directly inside `dir`, in sorted path order.
pub fn load_domain(dir: &Path, source_id: &str) -> Result<Collection, PipelineError> {
    let files = json_files_in(dir)?;
    if files.is_empty() {
        return Err(PipelineError::NotFound {
            path: dir.join("*.json"),
        });
    }
    let parts = files
        .iter()
        .map(|file| load(file, source_id))
        .collect::<Result<Vec<_>, _>>()?;
    let collection = Collection::concat(source_id, parts);
    info!(
        dir = %dir.display(),
        source = source_id,
        files = files.len(),
        records = collection.len(),
        "loaded domain"
    );
    Ok(collection)
}

fn decode(
    document: Value,
    format: SourceFormat,
    path: &Path,
    source_id: &str,
) -> Result<Vec<Record>, PipelineError> {
    let parse_error = |err: serde_json::Error| PipelineError::Parse {
        path: path.to_path_buf(),
        reason: err.to_string(),
    };
    match format {
        SourceFormat::SpeedplusPose => match document {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, entry)| {
                    speedplus::pose_entry_to_record(entry, source_id, path, index)
                })
                .collect(),
            _ => Err(PipelineError::Parse {
                path: path.to_path_buf(),
                reason: "pose annotations must be an array".to_string(),
            }),
        },
        SourceFormat::Records => serde_json::from_value(document).map_err(parse_error),
        SourceFormat::Coco => {
            let coco: CocoDocument = serde_json::from_value(document).map_err(parse_error)?;
            coco.into_records(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    fn write(path: &Path, value: &Value) {
        fs::write(path, serde_json::to_vec(value).unwrap()).unwrap();
    }

    #[test]
    fn detects_each_layout() {
        assert_eq!(
            SourceFormat::detect(&json!([{"filename": "a.jpg"}])),
            Some(SourceFormat::SpeedplusPose)
        );
        assert_eq!(
            SourceFormat::detect(&json!([{"id": "a", "image": "a.jpg", "label": "x"}])),
            Some(SourceFormat::Records)
        );
        assert_eq!(
            SourceFormat::detect(&json!({"images": [], "annotations": [], "categories": []})),
            Some(SourceFormat::Coco)
        );
        assert_eq!(SourceFormat::detect(&json!({"rows": []})), None);
        assert_eq!(SourceFormat::detect(&json!([1, 2])), None);
    }

    #[test]
    fn missing_file_is_not_found_and_garbage_is_parse() {
        let temp = tempdir().unwrap();
        let missing = load(&temp.path().join("train.json"), "synthetic").unwrap_err();
        assert!(matches!(missing, PipelineError::NotFound { .. }));

        let odd = temp.path().join("odd.json");
        write(&odd, &json!({"rows": []}));
        let err = load(&odd, "synthetic").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Parse { ref reason, .. } if reason.contains("layout")
        ));
    }

    #[test]
    fn native_records_missing_fields_are_parse_errors() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("records.json");
        write(&path, &json!([{"id": "a"}]));
        assert!(matches!(load(&path, "s"), Err(PipelineError::Parse { .. })));
    }

    #[test]
    fn domain_files_are_combined_in_sorted_order() {
        let temp = tempdir().unwrap();
        let dir = temp.path();
        write(
            &dir.join("validation.json"),
            &json!([{"filename": "v1.jpg", "q_vbs2tango_true": [1, 0, 0, 0]}]),
        );
        write(
            &dir.join("train.json"),
            &json!([{"filename": "t1.jpg"}, {"filename": "t2.jpg"}]),
        );
        fs::write(dir.join("README.txt"), b"ignored").unwrap();

        let collection = load_domain(dir, "synthetic").unwrap();
        assert_eq!(collection.source, "synthetic");
        assert_eq!(
            collection.ids().collect::<Vec<_>>(),
            vec!["t1.jpg", "t2.jpg", "v1.jpg"]
        );
        assert!(collection.records.iter().all(|r| r.label == "synthetic"));
    }

    #[test]
    fn empty_domain_directory_is_not_found() {
        let temp = tempdir().unwrap();
        let err = load_domain(temp.path(), "sunlamp").unwrap_err();
        assert!(matches!(err, PipelineError::NotFound { .. }));
    }
}
