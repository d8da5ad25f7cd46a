use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

pub use crate::types::{CategoryId, PathString, RecordId, SourceId};

/// Variable-length geometric payload (keypoints, bounding box, pose).
pub type Payload = serde_json::Map<String, Value>;

/// One annotation unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Identifier, unique within its collection.
    pub id: RecordId,
    /// Source image reference, relative to the domain image directory.
    pub image: PathString,
    /// Class tag used for class-balanced sampling and COCO categories.
    pub label: CategoryId,
    /// Payload fields checked against a `RecordSchema` before acceptance.
    #[serde(default)]
    pub payload: Payload,
}

impl Record {
    pub fn new(
        id: impl Into<RecordId>,
        image: impl Into<PathString>,
        label: impl Into<CategoryId>,
    ) -> Self {
        Self {
            id: id.into(),
            image: image.into(),
            label: label.into(),
            payload: Payload::new(),
        }
    }

    /// Builder-style payload insertion.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}

/// Ordered records sharing one source identity (acquisition domain).
///
/// Stages never mutate a collection in place; each returns a derived view
/// built with [`Collection::derive`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub source: SourceId,
    pub records: Vec<Record>,
}

impl Collection {
    pub fn new(source: impl Into<SourceId>, records: Vec<Record>) -> Self {
        Self {
            source: source.into(),
            records,
        }
    }

    /// Concatenate several collections in order under a single source id.
    pub fn concat(
        source: impl Into<SourceId>,
        parts: impl IntoIterator<Item = Collection>,
    ) -> Self {
        let records = parts.into_iter().flat_map(|part| part.records).collect();
        Self::new(source, records)
    }

    /// New collection with the same source identity and different records.
    pub fn derive(&self, records: Vec<Record>) -> Self {
        Self {
            source: self.source.clone(),
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|record| record.id.as_str())
    }

    /// Per-label record counts in first-appearance order.
    pub fn label_counts(&self) -> IndexMap<CategoryId, usize> {
        let mut counts = IndexMap::new();
        for record in &self.records {
            *counts.entry(record.label.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// First record id that appears more than once, if any.
    pub fn first_duplicate_id(&self) -> Option<&RecordId> {
        let mut seen = HashSet::with_capacity(self.records.len());
        self.records
            .iter()
            .map(|record| &record.id)
            .find(|id| !seen.insert(id.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, label: &str) -> Record {
        Record::new(id, format!("{id}.jpg"), label)
    }

    #[test]
    fn label_counts_keep_first_appearance_order() {
        let collection = Collection::new(
            "synthetic",
            vec![record("a", "sun"), record("b", "box"), record("c", "sun")],
        );
        let counts = collection.label_counts();
        let labels: Vec<_> = counts.keys().cloned().collect();
        assert_eq!(labels, vec!["sun".to_string(), "box".to_string()]);
        assert_eq!(counts["sun"], 2);
    }

    #[test]
    fn duplicate_ids_are_detected() {
        let collection = Collection::new(
            "s",
            vec![record("a", "x"), record("b", "x"), record("a", "y")],
        );
        assert_eq!(collection.first_duplicate_id().map(String::as_str), Some("a"));
        let unique = collection.derive(collection.records[..2].to_vec());
        assert!(unique.first_duplicate_id().is_none());
        assert_eq!(unique.source, "s");
    }

    #[test]
    fn concat_preserves_part_order() {
        let joined = Collection::concat(
            "synthetic",
            [
                Collection::new("train", vec![record("a", "x")]),
                Collection::new("validation", vec![record("b", "x")]),
            ],
        );
        assert_eq!(joined.ids().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(joined.source, "synthetic");
    }
}
