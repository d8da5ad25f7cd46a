use crate::splits::SplitLabel;

/// Constants used by split ratio checks and partition ordering.
pub mod splits {
    use super::SplitLabel;

    /// Allowed deviation of the ratio sum from `1.0`.
    pub const RATIO_SUM_TOLERANCE: f64 = 1e-6;
    /// Canonical partition order used when writing or iterating all partitions.
    pub const ALL_SPLITS: [SplitLabel; 3] =
        [SplitLabel::Train, SplitLabel::Validation, SplitLabel::Test];
}

/// Constants used by sampling.
pub mod sampling {
    /// Salt mixed into per-scope RNG seed derivation.
    pub const SEED_SALT: u64 = 0xB4C3_5EED;
    /// Report key used when uniform sampling aggregates every label.
    pub const ALL_LABELS: &str = "*";
}

/// Constants describing the SPEED+ v2 pose files and COCO keypoint layout.
pub mod speedplus {
    /// Image file field of a raw pose entry.
    pub const FIELD_FILENAME: &str = "filename";
    /// Target orientation quaternion (scalar first).
    pub const FIELD_QUATERNION: &str = "q_vbs2tango_true";
    /// Target position in the camera frame, metres.
    pub const FIELD_TRANSLATION: &str = "r_Vo2To_vbs_true";
    /// Annotation field names written by the renderer.
    pub const FIELD_POSE_QUATERNION: &str = "pose_quaternion";
    pub const FIELD_POSE_TRANSLATION: &str = "pose_translation";
    pub const FIELD_KEYPOINTS: &str = "keypoints";
    pub const FIELD_NUM_KEYPOINTS: &str = "num_keypoints";
    pub const FIELD_BBOX: &str = "bbox";
    pub const FIELD_AREA: &str = "area";
    pub const FIELD_ISCROWD: &str = "iscrowd";
    /// Named keypoints on the spacecraft model, in annotation order.
    pub const KEYPOINT_NAMES: [&str; 11] = [
        "body_keypoint_1",
        "body_keypoint_2",
        "body_keypoint_3",
        "body_keypoint_4",
        "panel_keypoint_1",
        "panel_keypoint_2",
        "panel_keypoint_3",
        "panel_keypoint_4",
        "antenna_keypoint_1",
        "antenna_keypoint_2",
        "antenna_keypoint_3",
    ];
    /// Original SPEED+ v2 image height, pixels.
    pub const SOURCE_IMAGE_HEIGHT: u32 = 1200;
    /// Original SPEED+ v2 image width, pixels.
    pub const SOURCE_IMAGE_WIDTH: u32 = 1920;
    /// Tolerance applied to the unit-norm quaternion check.
    pub const QUATERNION_NORM_TOLERANCE: f64 = 1e-3;
}

/// Constants used by COCO document assembly.
pub mod coco {
    /// Category name/supercategory for the single target object.
    pub const SUPERCATEGORY: &str = "spacecraft";
    /// Extra image field carrying the originating record id.
    pub const IMAGE_RECORD_ID_FIELD: &str = "record_id";
    /// Annotation field holding payload entries whose keys the envelope owns.
    pub const SHADOWED_FIELDS_KEY: &str = "record_fields";
    /// Text written to the `info` block of every annotation file.
    pub const DATASET_DESCRIPTION: &str = "SPEED+ v2 spacecraft pose annotations";
    pub const DATASET_VERSION: &str = "1.0";
    pub const LICENSE_NAME: &str = "All Rights Reserved";
}

/// Constants used by the on-disk output layout.
pub mod layout {
    /// Directory holding per-partition annotation files.
    pub const ANNOTATIONS_DIR: &str = "annotations";
    /// Directory holding per-partition image folders.
    pub const IMAGES_DIR: &str = "images";
    /// Source image directory name inside a domain directory.
    pub const SOURCE_IMAGES_DIR: &str = "images";
    /// Provenance manifest filename.
    pub const MANIFEST_FILENAME: &str = "manifest.json";
    /// Camera parameters filename (input root and output root).
    pub const CAMERA_FILENAME: &str = "camera.json";
    /// Keypoint definition filename in the output root.
    pub const KEYPOINTS_FILENAME: &str = "keypoints.json";
    /// Generated description of the output dataset.
    pub const README_FILENAME: &str = "README.md";
    /// Extension of annotation files scanned in a domain directory.
    pub const JSON_EXTENSION: &str = "json";
    /// Version tag stored in every manifest.
    pub const MANIFEST_VERSION: u32 = 1;
}

/// Constants used by external collaborator invocations.
pub mod external {
    use std::time::Duration;

    /// Poll interval while waiting for a child process.
    pub const POLL_INTERVAL: Duration = Duration::from_millis(20);
    /// How long output readers may keep draining after the process group is gone.
    pub const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(250);
    /// Default deadline for renderer invocations.
    pub const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 6 * 60 * 60;
    /// Default deadline for reconstruction and translation invocations.
    pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 12 * 60 * 60;
    /// Renderer input file written next to the domain output.
    pub const RENDER_INPUT_FILENAME: &str = "render_input.json";
    /// Renderer output file read back after rendering.
    pub const RENDER_OUTPUT_FILENAME: &str = "render_output.json";
}

/// Constants used by the unpaired translation dataset builder.
pub mod translation {
    /// Source-domain images for training and testing.
    pub const TRAIN_A_DIR: &str = "train_A";
    pub const TEST_A_DIR: &str = "test_A";
    /// Target-domain images for training and testing.
    pub const TRAIN_B_DIR: &str = "train_B";
    pub const TEST_B_DIR: &str = "test_B";
    /// Fixed text prompts read by the translation network, one per domain.
    pub const PROMPT_FILES: [(&str, &str); 2] =
        [("fixed_prompt_a.txt", "A"), ("fixed_prompt_b.txt", "B")];
    /// Translator output directory inside the dataset.
    pub const TRANSLATED_DIR: &str = "translated";
    pub const DEFAULT_DATASET_NAME: &str = "cycleGAN-sy2su-300";
    pub const DEFAULT_IMAGE_COUNT: usize = 300;
    pub const DEFAULT_IMAGE_SIZE: [u32; 2] = [200, 320];
    pub const NETWORK_CREDIT: &str = "CycleGAN-turbo network provided by \
        [GaParmar](https://github.com/GaParmar/img2img-turbo)";
}

/// Defaults for the conversion configuration.
pub mod config {
    /// Configuration file read when no `--config` is given.
    pub const DEFAULT_CONFIG_FILE: &str = "spv2_coco.json";
    pub const DEFAULT_SOURCE_ROOT: &str = "data/src/speedplusv2";
    pub const DEFAULT_OUTPUT_ROOT: &str = "data/exp/spv2_coco";
    pub const DEFAULT_SEED: u64 = 42;
    pub const DEFAULT_SAMPLE_SIZE: f64 = 0.25;
    pub const DEFAULT_IMAGE_SIZE: [u32; 2] = [400, 640];
    /// Acquisition domains understood by the converter.
    pub const KNOWN_DOMAINS: [&str; 3] = ["synthetic", "lightbox", "sunlamp"];
}
