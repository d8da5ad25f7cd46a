use std::fs;
use std::path::Path;

use image::{Rgb, RgbImage};
use serde_json::{Value, json};
use tempfile::tempdir;

use spv2_coco::camera::CameraParams;
use spv2_coco::splits::SplitLabel;
use spv2_coco::{ConvertConfig, TranslationDatasetConfig, load, run};

fn write_domain(source_root: &Path, domain: &str, count: usize) {
    let dir = source_root.join(domain);
    let images = dir.join("images");
    fs::create_dir_all(&images).unwrap();
    let entries: Vec<Value> = (0..count)
        .map(|i| {
            let filename = format!("img{i:06}.jpg");
            RgbImage::from_fn(48, 30, |x, y| Rgb([(x * 5) as u8, (y * 8) as u8, i as u8]))
                .save(images.join(&filename))
                .unwrap();
            json!({
                "filename": filename,
                "q_vbs2tango_true": [0.0, 0.0, 0.0, 1.0],
                "r_Vo2To_vbs_true": [0.2, -0.1, 7.5]
            })
        })
        .collect();
    fs::write(dir.join("train.json"), serde_json::to_vec(&entries).unwrap()).unwrap();
}

fn write_camera(source_root: &Path) {
    let camera = json!({
        "Nu": 1920, "Nv": 1200,
        "ppx": 5.86e-6, "ppy": 5.86e-6,
        "fx": 0.017513075965220335, "fy": 0.017511673079266703,
        "ccx": 960, "ccy": 600,
        "cameraMatrix": [[2988.58, 0, 960], [0, 2988.34, 600], [0, 0, 1]],
        "distCoeffs": [-0.2238, 0.5141, -0.0007, -0.0002, -0.1312]
    });
    fs::write(source_root.join("camera.json"), camera.to_string()).unwrap();
}

fn base_config(root: &Path) -> ConvertConfig {
    ConvertConfig {
        data_types: vec!["synthetic".into(), "sunlamp".into()],
        sample_size: 1.0,
        image_size: [10, 16],
        resize_images: true,
        source_root: root.join("speedplusv2"),
        output_root: root.join("spv2_coco"),
        ..ConvertConfig::default()
    }
}

#[test]
fn converts_domains_with_resized_images_and_rescaled_camera() {
    let temp = tempdir().unwrap();
    let keypoints = temp.path().join("keypoints.json");
    fs::write(&keypoints, r#"{"keypoints": [[0.1, 0.2, 0.3]]}"#).unwrap();
    let config = ConvertConfig {
        keypoints_file: Some(keypoints),
        ..base_config(temp.path())
    };
    write_domain(&config.source_root, "synthetic", 20);
    write_domain(&config.source_root, "sunlamp", 4);
    write_camera(&config.source_root);

    let summary = run(&config).unwrap();
    assert!(summary.is_success());

    let synthetic = summary.domains[0].result.as_ref().unwrap();
    assert_eq!(synthetic.count(SplitLabel::Train), 14);
    let sunlamp = summary.domains[1].result.as_ref().unwrap();
    assert_eq!(sunlamp.count(SplitLabel::Test), 4);

    let out = &config.output_root;
    let train = load(&out.join("synthetic/annotations/train.json"), "synthetic").unwrap();
    assert_eq!(train.len(), 14);
    for record in &train.records {
        let written = out.join("synthetic/images/train").join(&record.image);
        assert_eq!(image::image_dimensions(&written).unwrap(), (16, 10));
    }

    let camera: CameraParams =
        serde_json::from_slice(&fs::read(out.join("camera.json")).unwrap()).unwrap();
    assert_eq!((camera.nu, camera.nv), (16.0, 10.0));
    assert!((camera.ccx - 8.0).abs() < 1e-9);
    assert!((camera.ccy - 5.0).abs() < 1e-9);

    let copied: Value =
        serde_json::from_slice(&fs::read(out.join("keypoints.json")).unwrap()).unwrap();
    assert_eq!(copied["keypoints"][0][2], json!(0.3));
    assert!(out.join("README.md").is_file());
}

#[test]
fn zip_output_replaces_the_directory_with_an_archive() {
    let temp = tempdir().unwrap();
    let config = ConvertConfig {
        data_types: vec!["synthetic".into()],
        zip_output: true,
        ..base_config(temp.path())
    };
    write_domain(&config.source_root, "synthetic", 6);

    let summary = run(&config).unwrap();
    let archive = summary.archive.unwrap();
    assert_eq!(archive, temp.path().join("spv2_coco.zip"));
    assert!(!config.output_root.exists());

    let mut zip = zip::ZipArchive::new(fs::File::open(&archive).unwrap()).unwrap();
    let names: Vec<String> = zip.file_names().map(str::to_string).collect();
    assert!(names.contains(&"spv2_coco/synthetic/manifest.json".to_string()));
    assert!(names.contains(&"spv2_coco/synthetic/annotations/train.json".to_string()));
    assert!(zip.by_name("spv2_coco/README.md").is_ok());
}

#[test]
fn reruns_produce_identical_annotation_files() {
    let temp = tempdir().unwrap();
    let first = ConvertConfig {
        data_types: vec!["synthetic".into()],
        sample_size: 0.5,
        resize_images: false,
        ..base_config(temp.path())
    };
    write_domain(&first.source_root, "synthetic", 30);
    let second = ConvertConfig {
        output_root: temp.path().join("again"),
        ..first.clone()
    };

    run(&first).unwrap();
    run(&second).unwrap();
    for label in ["train", "validation", "test"] {
        let relative = format!("synthetic/annotations/{label}.json");
        assert_eq!(
            fs::read(first.output_root.join(&relative)).unwrap(),
            fs::read(second.output_root.join(&relative)).unwrap(),
            "{label}"
        );
    }
}

fn sy2su_dataset(image_count: usize) -> TranslationDatasetConfig {
    TranslationDatasetConfig {
        name: "sy2su".into(),
        image_count,
        image_size: [10, 16],
        ..TranslationDatasetConfig::default()
    }
}

#[test]
fn translation_dataset_is_built_next_to_the_output() {
    let temp = tempdir().unwrap();
    let config = ConvertConfig {
        data_types: vec!["synthetic".into()],
        translation_dataset: Some(sy2su_dataset(2)),
        ..base_config(temp.path())
    };
    write_domain(&config.source_root, "synthetic", 4);
    write_domain(&config.source_root, "sunlamp", 3);

    let summary = run(&config).unwrap();
    assert!(summary.is_success());
    let report = summary.translation_dataset.unwrap().unwrap();
    assert_eq!(report.root, temp.path().join("sy2su"));
    assert_eq!((report.source_images, report.target_images), (2, 2));
    for folder in ["train_A", "test_A", "train_B", "test_B"] {
        let written = report.root.join(folder).join("img000001.jpg");
        assert_eq!(image::image_dimensions(&written).unwrap(), (16, 10), "{folder}");
    }
    assert!(report.root.join("fixed_prompt_b.txt").is_file());
}

#[test]
fn failed_translation_dataset_marks_the_run_unsuccessful() {
    let temp = tempdir().unwrap();
    let config = ConvertConfig {
        data_types: vec!["synthetic".into()],
        translation_dataset: Some(sy2su_dataset(2)),
        ..base_config(temp.path())
    };
    write_domain(&config.source_root, "synthetic", 4);

    let summary = run(&config).unwrap();
    assert!(summary.domains[0].result.is_ok());
    assert!(matches!(summary.translation_dataset, Some(Err(_))));
    assert!(!summary.is_success());
}

#[cfg(unix)]
mod unix {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    use spv2_coco::collaborators::{ReconstructionConfig, RendererConfig, TranslationConfig};

    /// COCO output a renderer would produce for `count` poses at 10x16 px;
    /// the last annotation lacks a bounding box.
    fn rendered_fixture(count: usize) -> Value {
        let keypoints: Vec<f64> = (0..11).flat_map(|k| [k as f64, 4.0, 2.0]).collect();
        let images: Vec<Value> = (0..count)
            .map(|i| json!({"id": i + 1, "file_name": format!("img{i:06}.jpg")}))
            .collect();
        let annotations: Vec<Value> = (0..count)
            .map(|i| {
                let mut annotation = json!({
                    "id": i + 1,
                    "image_id": i + 1,
                    "category_id": 1,
                    "keypoints": keypoints,
                    "num_keypoints": 11,
                    "area": 72.0,
                    "iscrowd": 0,
                    "pose_quaternion": [0.0, 0.0, 0.0, 1.0],
                    "pose_translation": [0.2, -0.1, 7.5]
                });
                if i + 1 < count {
                    annotation["bbox"] = json!([1.0, 1.0, 12.0, 6.0]);
                }
                annotation
            })
            .collect();
        json!({
            "images": images,
            "annotations": annotations,
            "categories": [{"id": 1, "name": "tango", "supercategory": "spacecraft"}]
        })
    }

    fn fake_renderer(dir: &Path, fixture: &Path) -> std::path::PathBuf {
        let script = dir.join("fake-blender");
        let body = format!(
            "#!/bin/sh\n\
             out=\"\"\n\
             while [ $# -gt 0 ]; do\n\
             \x20 if [ \"$1\" = \"--output-file\" ]; then out=\"$2\"; fi\n\
             \x20 shift\n\
             done\n\
             cat '{}' > \"$out\"\n",
            fixture.display()
        );
        fs::write(&script, body).unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[test]
    fn renderer_output_is_validated_then_split() {
        let temp = tempdir().unwrap();
        let fixture = temp.path().join("rendered.json");
        fs::write(&fixture, rendered_fixture(10).to_string()).unwrap();
        let config = ConvertConfig {
            data_types: vec!["synthetic".into()],
            renderer: Some(RendererConfig {
                executable: fake_renderer(temp.path(), &fixture),
                timeout_secs: 30,
                ..RendererConfig::default()
            }),
            ..base_config(temp.path())
        };
        write_domain(&config.source_root, "synthetic", 10);

        let summary = run(&config).unwrap();
        let report = summary.domains[0].result.as_ref().unwrap();
        assert_eq!(report.validation.len(), 2);
        assert_eq!(report.validation[1].discarded, 1);
        assert_eq!(report.schema_version.as_deref(), Some("coco-keypoints/1"));
        assert_eq!(report.count(SplitLabel::Train), 6);
        assert_eq!(report.count(SplitLabel::Validation), 1);
        assert_eq!(report.count(SplitLabel::Test), 2);

        let out = config.output_root.join("synthetic");
        assert!(!out.join("render_input.json").exists());
        assert!(!out.join("render_output.json").exists());
        let train = load(&out.join("annotations/train.json"), "synthetic").unwrap();
        assert!(train.records.iter().all(|record| record.label == "tango"));
    }

    #[test]
    fn failing_renderer_fails_only_its_domain() {
        let temp = tempdir().unwrap();
        let config = ConvertConfig {
            data_types: vec!["synthetic".into(), "sunlamp".into()],
            renderer: Some(RendererConfig {
                executable: "false".into(),
                timeout_secs: 30,
                ..RendererConfig::default()
            }),
            split_domains: vec![],
            ..base_config(temp.path())
        };
        write_domain(&config.source_root, "synthetic", 3);

        let summary = run(&config).unwrap();
        assert_eq!(summary.failed_domains().count(), 2);
        assert!(config.output_root.join("README.md").is_file());
    }

    #[test]
    fn reconstruction_jobs_run_per_converted_domain() {
        let temp = tempdir().unwrap();
        let config = ConvertConfig {
            data_types: vec!["synthetic".into()],
            resize_images: false,
            reconstruction: Some(ReconstructionConfig {
                executable: "sh".into(),
                leading_args: vec![
                    "-c".into(),
                    "mkdir -p \"$2\" && ls \"$1\" > \"$2/images.txt\" && echo \"$3\"".into(),
                    "sfm".into(),
                ],
                ..ReconstructionConfig::default()
            }),
            ..base_config(temp.path())
        };
        write_domain(&config.source_root, "synthetic", 3);

        let summary = run(&config).unwrap();
        assert!(summary.is_success());
        assert_eq!(summary.collaborators.len(), 1);
        let done = summary.collaborators[0].as_ref().unwrap();
        assert_eq!(done.stdout.trim(), "2988.46");
        let listing = fs::read_to_string(
            config
                .output_root
                .join("synthetic/reconstruction/images.txt"),
        )
        .unwrap();
        assert_eq!(listing.lines().count(), 3);
    }

    #[test]
    fn translator_reads_the_built_dataset_instead_of_raw_domains() {
        let temp = tempdir().unwrap();
        let config = ConvertConfig {
            data_types: vec!["synthetic".into(), "sunlamp".into()],
            translation_dataset: Some(sy2su_dataset(3)),
            translation: Some(TranslationConfig {
                executable: "sh".into(),
                leading_args: vec![
                    "-c".into(),
                    "mkdir -p \"$4\" && ls \"$2\" > \"$4/listing.txt\"".into(),
                    "translate".into(),
                ],
                ..TranslationConfig::default()
            }),
            ..base_config(temp.path())
        };
        write_domain(&config.source_root, "synthetic", 5);
        write_domain(&config.source_root, "sunlamp", 5);

        let summary = run(&config).unwrap();
        assert!(summary.is_success());
        assert_eq!(summary.collaborators.len(), 1);
        let listing =
            fs::read_to_string(temp.path().join("sy2su/translated/synthetic/listing.txt"))
                .unwrap();
        assert_eq!(listing.lines().count(), 3);
        assert!(!config.output_root.join("synthetic/translated").exists());
    }
}
