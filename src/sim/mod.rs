//! In-process reference implementation of the collaborator interface.
//!
//! `sim` behaves like a well-formed scene device: a thread-safe object table with reference
//! counting and a commit protocol, asynchronously available world bounds, and a render
//! operation that waits for the frame's dependencies to be committed. Knobs in [`SimConfig`]
//! inject delays, hidden extensions and fatal faults.

mod device;
mod raster;
mod store;

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{
    client::{Device, Library, ObjectKind, StatusCallback},
    error::{HarnessError, HarnessResult},
};

pub use device::{ReleaseEvent, ReleaseTarget, SimDevice};

/// Extensions advertised for the `"default"` subtype.
pub const SIM_EXTENSIONS: &[&str] = &[
    "ANARI_KHR_CAMERA_PERSPECTIVE",
    "ANARI_KHR_GEOMETRY_SPHERE",
    "ANARI_KHR_MATERIAL_MATTE",
    "ANARI_KHR_SAMPLER_IMAGE1D",
    "ANARI_KHR_LIGHT_DIRECTIONAL",
    "ANARI_KHR_FRAME_CHANNEL_COLOR",
];

const DEFAULT_SUBTYPE: &str = "default";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Extra time every render takes.
    pub render_delay_ms: u64,
    /// Time between a world commit and its bounds becoming available.
    pub bounds_delay_ms: u64,
    /// Whether `render` waits for the frame and its world/renderer/camera to be committed.
    pub render_waits_for_commit: bool,
    /// Report a fatal status when an object of this kind is committed.
    pub fatal_on_commit: Option<ObjectKind>,
    /// Extensions removed from the advertised list.
    pub hidden_extensions: Vec<String>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            render_delay_ms: 0,
            bounds_delay_ms: 0,
            render_waits_for_commit: true,
            fatal_on_commit: None,
            hidden_extensions: Vec::new(),
        }
    }
}

pub struct SimLibrary {
    name: String,
    status: StatusCallback,
    config: SimConfig,
    extensions: Vec<String>,
    devices: Mutex<Vec<Arc<SimDevice>>>,
    unloaded: AtomicBool,
}

impl SimLibrary {
    pub fn load(name: &str, status: StatusCallback, config: SimConfig) -> Self {
        let extensions = SIM_EXTENSIONS
            .iter()
            .filter(|e| !config.hidden_extensions.iter().any(|h| h == *e))
            .map(|e| e.to_string())
            .collect();
        Self {
            name: name.to_string(),
            status,
            config,
            extensions,
            devices: Mutex::new(Vec::new()),
            unloaded: AtomicBool::new(false),
        }
    }

    /// Every device created so far, in creation order.
    pub fn devices(&self) -> Vec<Arc<SimDevice>> {
        self.devices.lock().clone()
    }

    pub fn is_unloaded(&self) -> bool {
        self.unloaded.load(Ordering::Acquire)
    }
}

impl Library for SimLibrary {
    fn name(&self) -> &str {
        &self.name
    }

    fn device_extensions(&self, subtype: &str) -> &[String] {
        if subtype == DEFAULT_SUBTYPE {
            &self.extensions
        } else {
            &[]
        }
    }

    fn new_device(&self, subtype: &str) -> HarnessResult<Arc<dyn Device>> {
        if subtype != DEFAULT_SUBTYPE {
            return Err(HarnessError::library(format!(
                "library '{}' has no device subtype '{subtype}'",
                self.name
            )));
        }
        if self.is_unloaded() {
            return Err(HarnessError::library(format!(
                "library '{}' is unloaded",
                self.name
            )));
        }
        let device = Arc::new(SimDevice::new(
            Arc::clone(&self.status),
            self.config.clone(),
        ));
        self.devices.lock().push(Arc::clone(&device));
        Ok(device)
    }

    fn unload(&self) {
        if self.unloaded.swap(true, Ordering::AcqRel) {
            tracing::warn!(library = %self.name, "library unloaded twice");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{StatusLog, device_has_extension};

    #[test]
    fn default_subtype_advertises_perspective_camera() {
        let lib = SimLibrary::load("sim", StatusLog::new().callback(), SimConfig::default());
        assert!(device_has_extension(
            &lib,
            "default",
            "ANARI_KHR_CAMERA_PERSPECTIVE"
        ));
        assert!(lib.device_extensions("helide").is_empty());
    }

    #[test]
    fn hidden_extensions_are_not_advertised() {
        let cfg = SimConfig {
            hidden_extensions: vec!["ANARI_KHR_CAMERA_PERSPECTIVE".to_string()],
            ..SimConfig::default()
        };
        let lib = SimLibrary::load("sim", StatusLog::new().callback(), cfg);
        assert!(!device_has_extension(
            &lib,
            "default",
            "ANARI_KHR_CAMERA_PERSPECTIVE"
        ));
        assert_eq!(lib.device_extensions("default").len(), SIM_EXTENSIONS.len() - 1);
    }

    #[test]
    fn unknown_subtype_has_no_device() {
        let lib = SimLibrary::load("sim", StatusLog::new().callback(), SimConfig::default());
        assert!(lib.new_device("helide").is_err());
        assert!(lib.new_device("default").is_ok());
        assert_eq!(lib.devices().len(), 1);
    }

    #[test]
    fn sim_config_defaults_from_empty_json() {
        let cfg: SimConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, SimConfig::default());
        let cfg: SimConfig =
            serde_json::from_str(r#"{"fatal_on_commit":"camera","render_delay_ms":5}"#).unwrap();
        assert_eq!(cfg.fatal_on_commit, Some(ObjectKind::Camera));
        assert_eq!(cfg.render_delay_ms, 5);
    }
}
