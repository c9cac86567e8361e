use std::sync::Arc;

use super::{Library, StatusCallback};
use crate::{
    error::{HarnessError, HarnessResult},
    sim::{SimConfig, SimLibrary},
};

/// Selects the library when the requested name is `"environment"`.
pub const LIBRARY_ENV_VAR: &str = "SCENE_STRESS_LIBRARY";

const ENVIRONMENT: &str = "environment";
const FALLBACK_LIBRARY: &str = "sim";

/// Resolve `"environment"` through [`LIBRARY_ENV_VAR`]; other names pass through.
pub fn resolve_library_name(requested: &str) -> String {
    resolve_with_env(requested, std::env::var(LIBRARY_ENV_VAR).ok().as_deref())
}

fn resolve_with_env(requested: &str, env_value: Option<&str>) -> String {
    if requested != ENVIRONMENT {
        return requested.to_string();
    }
    match env_value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => FALLBACK_LIBRARY.to_string(),
    }
}

/// Load a library by name. Only the in-process `"sim"` library is built in.
pub fn load_library(
    requested: &str,
    status: StatusCallback,
    sim: &SimConfig,
) -> HarnessResult<Arc<dyn Library>> {
    let name = resolve_library_name(requested);
    tracing::info!(requested, resolved = %name, "loading library");
    match name.as_str() {
        "sim" => Ok(Arc::new(SimLibrary::load(&name, status, sim.clone()))),
        other => Err(HarnessError::library(format!(
            "unknown library '{other}' (available: sim)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::StatusLog;

    #[test]
    fn environment_falls_back_to_sim() {
        assert_eq!(resolve_with_env("environment", None), "sim");
        assert_eq!(resolve_with_env("environment", Some("  ")), "sim");
        assert_eq!(resolve_with_env("environment", Some("helide")), "helide");
        assert_eq!(resolve_with_env("sim", Some("helide")), "sim");
    }

    #[test]
    fn unknown_library_is_an_error() {
        let log = StatusLog::new();
        let err = load_library("no-such-lib", log.callback(), &SimConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, HarnessError::Library(_)));
        assert!(err.to_string().contains("no-such-lib"));
    }

    #[test]
    fn sim_library_loads() {
        let log = StatusLog::new();
        let lib = load_library("sim", log.callback(), &SimConfig::default()).unwrap();
        assert_eq!(lib.name(), "sim");
    }
}
