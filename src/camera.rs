use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::PipelineError;
use crate::transport::fs::read_json;

/// Pinhole camera intrinsics in the SPEED+ `camera.json` layout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraParams {
    /// Image width, pixels.
    #[serde(rename = "Nu")]
    pub nu: f64,
    /// Image height, pixels.
    #[serde(rename = "Nv")]
    pub nv: f64,
    /// Pixel pitch, metres.
    pub ppx: f64,
    pub ppy: f64,
    /// Focal lengths, metres.
    pub fx: f64,
    pub fy: f64,
    /// Principal point, pixels.
    pub ccx: f64,
    pub ccy: f64,
    #[serde(rename = "cameraMatrix")]
    pub camera_matrix: [[f64; 3]; 3],
    #[serde(rename = "distCoeffs")]
    pub dist_coeffs: Vec<f64>,
}

impl CameraParams {
    /// Read `camera.json`; image dimensions must be positive and finite.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let camera: Self = read_json(path)?;
        for (name, value) in [("Nu", camera.nu), ("Nv", camera.nv)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(PipelineError::Parse {
                    path: path.to_path_buf(),
                    reason: format!("{name} must be a positive image dimension, got {value}"),
                });
            }
        }
        Ok(camera)
    }

    /// Intrinsics for the same camera with images resized to `[height, width]`.
    ///
    /// Focal lengths, principal point, and the camera matrix scale per axis;
    /// pixel pitch and distortion are unchanged.
    pub fn rescaled(&self, image_size: [u32; 2]) -> Self {
        let [height, width] = image_size.map(f64::from);
        let scale_x = width / self.nu;
        let scale_y = height / self.nv;
        let ccx = self.ccx * scale_x;
        let ccy = self.ccy * scale_y;
        Self {
            nu: width,
            nv: height,
            ppx: self.ppx,
            ppy: self.ppy,
            fx: self.fx * scale_x,
            fy: self.fy * scale_y,
            ccx,
            ccy,
            camera_matrix: [
                [self.camera_matrix[0][0] * scale_x, 0.0, ccx],
                [0.0, self.camera_matrix[1][1] * scale_y, ccy],
                [0.0, 0.0, 1.0],
            ],
            dist_coeffs: self.dist_coeffs.clone(),
        }
    }
}
