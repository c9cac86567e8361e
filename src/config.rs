use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{
    error::{HarnessError, HarnessResult},
    scene::SceneConfig,
    sim::SimConfig,
};

/// Where rendered frames are written. `None` in [`HarnessConfig::output`] disables writing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub prefix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            prefix: "out_".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Library to load; `"environment"` defers to `SCENE_STRESS_LIBRARY`.
    pub library: String,
    pub device_subtype: String,
    pub frame_count: u32,
    pub output: Option<OutputConfig>,
    pub image_size: [u32; 2],
    pub scene: SceneConfig,
    /// Extension the extension poller looks for.
    pub extension_name: String,
    pub sim: SimConfig,
    pub log_level: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            library: "environment".to_string(),
            device_subtype: "default".to_string(),
            frame_count: 10,
            output: Some(OutputConfig::default()),
            image_size: [1024, 1024],
            scene: SceneConfig::default(),
            extension_name: "ANARI_KHR_CAMERA_PERSPECTIVE".to_string(),
            sim: SimConfig::default(),
            log_level: "warn".to_string(),
        }
    }
}

impl HarnessConfig {
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config '{}'", path.display()))?;
        let cfg = serde_json::from_str(&text)
            .with_context(|| format!("parse config '{}'", path.display()))?;
        Ok(cfg)
    }

    pub fn validate(&self) -> HarnessResult<()> {
        if self.frame_count == 0 {
            return Err(HarnessError::validation("frame_count must be >= 1"));
        }
        if self.image_size[0] == 0 || self.image_size[1] == 0 {
            return Err(HarnessError::validation(format!(
                "image_size must be non-zero, got {}x{}",
                self.image_size[0], self.image_size[1]
            )));
        }
        let scene = &self.scene;
        if scene.sample_count == 0 {
            return Err(HarnessError::validation("scene.sample_count must be >= 1"));
        }
        if !scene.std_dev.is_finite() || scene.std_dev <= 0.0 {
            return Err(HarnessError::validation(
                "scene.std_dev must be finite and > 0",
            ));
        }
        if !scene.radius.is_finite() || scene.radius <= 0.0 {
            return Err(HarnessError::validation(
                "scene.radius must be finite and > 0",
            ));
        }
        if self.extension_name.trim().is_empty() {
            return Err(HarnessError::validation("extension_name must be non-empty"));
        }
        if let Some(out) = &self.output {
            if out.prefix.is_empty() {
                return Err(HarnessError::validation("output.prefix must be non-empty"));
            }
            if out.prefix.contains(['/', '\\']) {
                return Err(HarnessError::validation(format!(
                    "output.prefix '{}' must not contain a path separator",
                    out.prefix
                )));
            }
        }
        Ok(())
    }

    /// Path of frame `index`, or `None` when output is disabled.
    pub fn output_path(&self, index: u32) -> Option<PathBuf> {
        self.output.as_ref().map(|o| {
            o.dir
                .join(crate::encode_png::output_file_name(&o.prefix, index))
        })
    }
}
