use std::collections::HashSet;

use chrono::Utc;
use serde_json::json;
use tempfile::tempdir;

use spv2_coco::constants::speedplus::{FIELD_QUATERNION, FIELD_TRANSLATION};
use spv2_coco::{
    Collection, ConvertConfig, DestinationLayout, PipelineError, ProvenanceInput, Record,
    RecordSchema, SamplingStrategy, SplitLabel, SplitRatios, run, sample, save, split, validate,
};

fn pose_record(id: String) -> Record {
    Record::new(id.clone(), id, "synthetic")
        .with_field(FIELD_QUATERNION, json!([1.0, 0.0, 0.0, 0.0]))
        .with_field(FIELD_TRANSLATION, json!([0.0, 0.0, 9.5]))
}

fn hundred_records() -> Collection {
    Collection::new(
        "synthetic",
        (0..100).map(|i| pose_record(format!("img{i:06}.jpg"))).collect(),
    )
}

#[test]
fn hundred_records_split_70_15_15_and_manifests_are_byte_identical() {
    let input = hundred_records();
    let ratios = SplitRatios::new(0.7, 0.15, 0.15);

    let first = split(&input, ratios, 42).unwrap();
    let second = split(&input, ratios, 42).unwrap();
    assert_eq!(first.len(SplitLabel::Train), 70);
    assert_eq!(first.len(SplitLabel::Validation), 15);
    assert_eq!(first.len(SplitLabel::Test), 15);

    let partitions = first.partition(&input).unwrap();
    let mut seen = HashSet::new();
    for (_, part) in partitions.iter() {
        for id in part.ids() {
            assert!(seen.insert(id.to_string()));
        }
    }
    assert_eq!(seen.len(), 100);

    assert_eq!(
        first.manifest().to_json_bytes().unwrap(),
        second.manifest().to_json_bytes().unwrap()
    );

    // The assignment section of two saved manifests matches byte for byte too.
    let temp = tempdir().unwrap();
    let provenance = ProvenanceInput::new(Utc::now());
    let a = save(
        &partitions,
        &first,
        &DestinationLayout::new(temp.path().join("a")),
        &provenance,
    )
    .unwrap();
    let b = save(
        &second.partition(&input).unwrap(),
        &second,
        &DestinationLayout::new(temp.path().join("b")),
        &provenance,
    )
    .unwrap();
    assert_eq!(
        serde_json::to_vec(&a.assignment).unwrap(),
        serde_json::to_vec(&b.assignment).unwrap()
    );
}

#[test]
fn ninety_five_valid_and_five_missing_bbox_keeps_ninety_five() {
    let schema = RecordSchema::coco_keypoints(None);
    let keypoints: Vec<f64> = (0..11).flat_map(|i| [i as f64, i as f64, 2.0]).collect();
    let annotated = |i: usize, with_bbox: bool| {
        let mut record = Record::new(format!("r{i}"), format!("r{i}.jpg"), "tango")
            .with_field("keypoints", json!(keypoints))
            .with_field("num_keypoints", json!(11))
            .with_field("area", json!(200.0))
            .with_field("iscrowd", json!(0))
            .with_field("pose_quaternion", json!([0.0, 1.0, 0.0, 0.0]))
            .with_field("pose_translation", json!([0.1, 0.2, 7.0]));
        if with_bbox {
            record = record.with_field("bbox", json!([1.0, 1.0, 20.0, 10.0]));
        }
        record
    };
    let records = (0..100).map(|i| annotated(i, i % 20 != 0)).collect();
    let outcome = validate(&Collection::new("synthetic", records), &schema).unwrap();

    assert_eq!(outcome.collection.len(), 95);
    assert_eq!(outcome.discarded(), 5);
    assert_eq!(outcome.report.reasons.get("missing field 'bbox'"), Some(&5));
}

#[test]
fn fully_invalid_collection_is_rejected_with_discard_count() {
    let records = (0..4)
        .map(|i| Record::new(format!("r{i}"), format!("r{i}.jpg"), "lightbox"))
        .collect();
    let outcome = validate(
        &Collection::new("lightbox", records),
        &RecordSchema::speedplus_pose(),
    )
    .unwrap();
    let err = outcome.into_non_empty().unwrap_err();
    assert!(matches!(
        err,
        PipelineError::EmptyCollection { ref source_id, discarded: 4 } if source_id == "lightbox"
    ));
}

#[test]
fn invalid_ratios_fail_before_any_output_is_written() {
    let temp = tempdir().unwrap();
    let source_root = temp.path().join("speedplusv2");
    let domain = source_root.join("synthetic");
    std::fs::create_dir_all(domain.join("images")).unwrap();
    let entries = json!([{
        "filename": "img000000.jpg",
        "q_vbs2tango_true": [1.0, 0.0, 0.0, 0.0],
        "r_Vo2To_vbs_true": [0.0, 0.0, 9.5]
    }]);
    std::fs::write(domain.join("train.json"), entries.to_string()).unwrap();

    let output_root = temp.path().join("out");
    let config = ConvertConfig {
        data_types: vec!["synthetic".into()],
        train_ratio: 0.6,
        val_ratio: 0.3,
        test_ratio: 0.3,
        source_root,
        output_root: output_root.clone(),
        ..ConvertConfig::default()
    };
    let err = run(&config).unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
    assert!(!output_root.exists());
    let names: Vec<_> = std::fs::read_dir(temp.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(names, vec!["speedplusv2"]);

    let err = split(&hundred_records(), SplitRatios::new(0.6, 0.3, 0.3), 42).unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
}

#[test]
fn sampling_then_splitting_is_reproducible_end_to_end() {
    let input = hundred_records();
    let run = || {
        let sampled = sample(&input, 0.4, SamplingStrategy::Uniform, 5).unwrap();
        split(&sampled.collection, SplitRatios::default(), 5)
            .unwrap()
            .manifest()
    };
    assert_eq!(run(), run());
}

#[test]
fn class_balanced_sampling_keeps_each_class_share() {
    let mut records = Vec::new();
    for (label, count) in [("tango", 80), ("tango_panel", 20), ("rare", 1)] {
        for i in 0..count {
            let id = format!("{label}{i:03}.jpg");
            records.push(Record::new(id.clone(), id, label));
        }
    }
    let input = Collection::new("synthetic", records);

    let outcome = sample(&input, 0.5, SamplingStrategy::ClassBalanced, 42).unwrap();
    let counts = outcome.collection.label_counts();
    assert_eq!(counts.get("tango"), Some(&40));
    assert_eq!(counts.get("tango_panel"), Some(&10));
    // 0.5 * 1 rounds to 1, so the single-record class is sampled normally.
    assert_eq!(counts.get("rare"), Some(&1));
    assert!(outcome.report.warnings.is_empty());

    let tiny = sample(&input, 0.01, SamplingStrategy::ClassBalanced, 42).unwrap();
    let rare = tiny
        .report
        .classes
        .iter()
        .find(|class| class.label == "rare")
        .unwrap();
    assert!(rare.whole_class_retained);
    assert_eq!(tiny.collection.label_counts().get("rare"), Some(&1));
    // tango_panel (20 * 0.01 rounds to 0) is kept whole as well; tango keeps 1.
    assert_eq!(tiny.report.warnings.len(), 2);
    assert_eq!(tiny.collection.label_counts().get("tango_panel"), Some(&20));
    assert_eq!(tiny.collection.label_counts().get("tango"), Some(&1));
}
