use serde_json::Value;
use std::path::Path;

use crate::constants::speedplus::FIELD_FILENAME;
use crate::data::{Payload, Record};
use crate::errors::PipelineError;

/// Convert one raw SPEED+ pose entry into a record.
///
/// The image file name doubles as the record id; every other field is kept
/// as payload. A missing file name yields an empty id, which validation
/// discards.
pub fn pose_entry_to_record(
    entry: &Value,
    source_id: &str,
    origin: &Path,
    index: usize,
) -> Result<Record, PipelineError> {
    let object = entry.as_object().ok_or_else(|| PipelineError::Parse {
        path: origin.to_path_buf(),
        reason: format!("pose entry {index} is not an object"),
    })?;
    let filename = object
        .get(FIELD_FILENAME)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let payload: Payload = object
        .iter()
        .filter(|(key, _)| key.as_str() != FIELD_FILENAME)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Ok(Record {
        id: filename.clone(),
        image: filename,
        label: source_id.to_string(),
        payload,
    })
}

/// Inverse of [`pose_entry_to_record`], used for renderer input files.
pub fn record_to_pose_entry(record: &Record) -> Value {
    let mut object = Payload::new();
    object.insert(FIELD_FILENAME.to_string(), Value::String(record.image.clone()));
    for (key, value) in &record.payload {
        object.insert(key.clone(), value.clone());
    }
    Value::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::speedplus::{FIELD_QUATERNION, FIELD_TRANSLATION};
    use serde_json::json;

    #[test]
    fn filename_becomes_id_and_image() {
        let entry = json!({
            "filename": "img000001.jpg",
            FIELD_QUATERNION: [1.0, 0.0, 0.0, 0.0],
            FIELD_TRANSLATION: [0.0, 0.0, 5.0]
        });
        let record = pose_entry_to_record(&entry, "lightbox", Path::new("t.json"), 0).unwrap();
        assert_eq!(record.id, "img000001.jpg");
        assert_eq!(record.label, "lightbox");
        assert_eq!(record.payload.len(), 2);
        assert_eq!(record_to_pose_entry(&record), entry);
    }

    #[test]
    fn non_object_entries_fail_to_parse() {
        let err = pose_entry_to_record(&json!(3), "s", Path::new("t.json"), 4).unwrap_err();
        assert!(matches!(err, PipelineError::Parse { ref reason, .. } if reason.contains('4')));
    }
}
