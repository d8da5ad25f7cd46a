//! Command builders for the external tools the pipeline drives.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::external::{DEFAULT_RENDER_TIMEOUT_SECS, DEFAULT_TOOL_TIMEOUT_SECS};
use crate::external::{ExternalCommand, ExternalJob};

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Blender renderer producing COCO keypoint annotations from pose files.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub executable: PathBuf,
    /// `.blend` scene holding the spacecraft model.
    pub scene: PathBuf,
    /// Annotation script run inside the scene.
    pub script: PathBuf,
    /// Passed to the script as `--root`.
    pub root: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("blender"),
            scene: PathBuf::from("blender/3D_model_scene.blend"),
            script: PathBuf::from("blender/coco_annotations.py"),
            root: None,
            timeout_secs: DEFAULT_RENDER_TIMEOUT_SECS,
        }
    }
}

impl RendererConfig {
    /// `<exe> -b <scene> -P <script> -- --root .. --input-file .. --output-file ..
    /// --image-height .. --image-width ..`
    pub fn command(
        &self,
        input_file: &Path,
        output_file: &Path,
        image_size: [u32; 2],
    ) -> ExternalCommand {
        let root = self
            .root
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        let [height, width] = image_size;
        ExternalCommand::new(&self.executable)
            .arg("-b")
            .arg(path_arg(&self.scene))
            .arg("-P")
            .arg(path_arg(&self.script))
            .arg("--")
            .arg("--root")
            .arg(path_arg(&root))
            .arg("--input-file")
            .arg(path_arg(input_file))
            .arg("--output-file")
            .arg(path_arg(output_file))
            .arg("--image-height")
            .arg(height.to_string())
            .arg("--image-width")
            .arg(width.to_string())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn job(&self, input_file: &Path, output_file: &Path, image_size: [u32; 2]) -> ExternalJob {
        ExternalJob {
            command: self.command(input_file, output_file, image_size),
            timeout: self.timeout(),
        }
    }
}

/// Structure-from-motion toolchain: image directory in, reconstruction out.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    pub executable: PathBuf,
    /// Arguments placed before the image and output paths (e.g. a pipeline script).
    pub leading_args: Vec<String>,
    /// Focal length in pixels handed to the intrinsics analysis.
    pub focal_length: f64,
    pub working_dir: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("python3"),
            leading_args: vec!["sfm_global_pipeline.py".to_string()],
            focal_length: 2988.46,
            working_dir: None,
            timeout_secs: DEFAULT_TOOL_TIMEOUT_SECS,
        }
    }
}

impl ReconstructionConfig {
    pub fn command(&self, image_dir: &Path, output_dir: &Path) -> ExternalCommand {
        let mut command = ExternalCommand::new(&self.executable)
            .args(self.leading_args.iter().cloned())
            .arg(path_arg(image_dir))
            .arg(path_arg(output_dir))
            .arg(self.focal_length.to_string());
        if let Some(dir) = &self.working_dir {
            command = command.current_dir(dir);
        }
        command
    }

    pub fn job(&self, image_dir: &Path, output_dir: &Path) -> ExternalJob {
        ExternalJob {
            command: self.command(image_dir, output_dir),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Unpaired image-to-image translation between acquisition domains.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    pub executable: PathBuf,
    pub leading_args: Vec<String>,
    pub model_name: Option<String>,
    pub model_path: Option<PathBuf>,
    /// `a2b` or `b2a` for custom models.
    pub direction: Option<String>,
    pub image_prep: String,
    pub timeout_secs: u64,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("python3"),
            leading_args: vec!["dir_inference_unpaired.py".to_string()],
            model_name: None,
            model_path: None,
            direction: None,
            image_prep: "resize_512x512".to_string(),
            timeout_secs: DEFAULT_TOOL_TIMEOUT_SECS,
        }
    }
}

impl TranslationConfig {
    /// Translated images land in `<output_dir>/<domain>`.
    pub fn command(&self, image_dir: &Path, domain: &str, output_dir: &Path) -> ExternalCommand {
        let mut command = ExternalCommand::new(&self.executable)
            .args(self.leading_args.iter().cloned())
            .arg("--image_dir")
            .arg(path_arg(image_dir))
            .arg("--output_dir")
            .arg(path_arg(&output_dir.join(domain)))
            .arg("--image_prep")
            .arg(self.image_prep.clone());
        if let Some(name) = &self.model_name {
            command = command.arg("--model_name").arg(name.clone());
        }
        if let Some(path) = &self.model_path {
            command = command.arg("--model_path").arg(path_arg(path));
        }
        if let Some(direction) = &self.direction {
            command = command.arg("--direction").arg(direction.clone());
        }
        command
    }

    pub fn job(&self, image_dir: &Path, domain: &str, output_dir: &Path) -> ExternalJob {
        ExternalJob {
            command: self.command(image_dir, domain, output_dir),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}
