#![forbid(unsafe_code)]

pub mod client;
pub mod config;
pub mod encode_png;
pub mod error;
pub mod harness;
pub mod scene;
pub mod sim;

pub use client::{Device, Handle, Library, ObjectKind, StatusCallback, StatusSeverity};
pub use config::{HarnessConfig, OutputConfig};
pub use error::{HarnessError, HarnessResult};
pub use harness::{RunReport, ThreadRole, run, run_configured};
pub use scene::{SceneConfig, SphereSamples, generate_samples};
pub use sim::{SimConfig, SimLibrary};
