//! Unbounded polling loops and the flags that stop them.
//!
//! The loops spin without sleeping or yielding. Each iteration queries first and checks its
//! flag second, so a loop always runs at least once and exits on the first iteration that
//! observes the flag.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::client::{Device, Handle, Library, PropertyMut, WaitMode, device_has_extension};

/// Bounds value meaning "nothing was written".
pub const BOUNDS_SENTINEL: [f32; 6] = [1e30, 1e30, 1e30, -1e30, -1e30, -1e30];

/// Single-writer stop signal. Once raised it stays raised.
#[derive(Debug, Default)]
pub struct StopFlag(AtomicBool);

impl StopFlag {
    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// One flag per poller.
#[derive(Debug, Default)]
pub struct StopSignals {
    pub extension: StopFlag,
    pub bounds_no_wait: StopFlag,
    pub bounds_wait: StopFlag,
}

impl StopSignals {
    pub fn raise_all(&self) {
        self.extension.raise();
        self.bounds_no_wait.raise();
        self.bounds_wait.raise();
    }

    pub fn all_raised(&self) -> bool {
        self.extension.is_raised()
            && self.bounds_no_wait.is_raised()
            && self.bounds_wait.is_raised()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExtensionPollStats {
    pub iterations: u64,
    /// Iterations that did not find the extension.
    pub misses: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundsPollStats {
    pub iterations: u64,
    pub finite_reads: u64,
    /// Iterations that left the sentinel in place.
    pub sentinel_reads: u64,
    pub last: Option<[f32; 6]>,
}

pub fn is_sentinel(bounds: &[f32; 6]) -> bool {
    bounds == &BOUNDS_SENTINEL
}

/// Query `ext_name` for `subtype` until `stop` is raised. Absence is logged, never fatal.
pub fn poll_extension(
    library: &dyn Library,
    subtype: &str,
    ext_name: &str,
    stop: &StopFlag,
) -> ExtensionPollStats {
    let mut stats = ExtensionPollStats::default();
    loop {
        stats.iterations += 1;
        if !device_has_extension(library, subtype, ext_name) {
            stats.misses += 1;
            eprintln!("extension not found");
        }
        if stop.is_raised() {
            break;
        }
    }
    if stats.misses > 0 {
        tracing::warn!(ext_name, misses = stats.misses, "extension missing");
    }
    stats
}

/// Query the world's `"bounds"` in `mode` until `stop` is raised. Never mutates `world`.
pub fn poll_bounds(
    device: &dyn Device,
    world: Handle,
    mode: WaitMode,
    stop: &StopFlag,
) -> BoundsPollStats {
    let mut stats = BoundsPollStats::default();
    loop {
        let mut bounds = BOUNDS_SENTINEL;
        device.get_property(world, "bounds", PropertyMut::Bounds(&mut bounds), mode);
        stats.iterations += 1;
        if is_sentinel(&bounds) {
            stats.sentinel_reads += 1;
        } else {
            stats.finite_reads += 1;
            stats.last = Some(bounds);
        }
        if stop.is_raised() {
            break;
        }
    }
    tracing::debug!(
        ?mode,
        iterations = stats.iterations,
        finite = stats.finite_reads,
        "bounds poll done"
    );
    stats
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Arc,
        time::{Duration, Instant},
    };

    use super::*;
    use crate::{
        client::{ObjectKind, StatusLog},
        harness::init::initialize_world,
        scene::SceneConfig,
        sim::{SimConfig, SimDevice, SimLibrary},
    };

    fn sim(config: SimConfig) -> (SimLibrary, Arc<SimDevice>) {
        let lib = SimLibrary::load("sim", StatusLog::new().callback(), config);
        lib.new_device("default").unwrap();
        let device = lib.devices().remove(0);
        (lib, device)
    }

    #[test]
    fn stop_flag_is_monotonic() {
        let flag = StopFlag::default();
        assert!(!flag.is_raised());
        flag.raise();
        assert!(flag.is_raised());
        flag.raise();
        assert!(flag.is_raised());

        let signals = StopSignals::default();
        signals.bounds_wait.raise();
        assert!(!signals.all_raised());
        assert!(!signals.extension.is_raised());
        signals.raise_all();
        assert!(signals.all_raised());
    }

    #[test]
    fn pre_raised_flag_runs_exactly_one_iteration() {
        let (lib, device) = sim(SimConfig::default());
        let flag = StopFlag::default();
        flag.raise();

        let ext = poll_extension(&lib, "default", "ANARI_KHR_CAMERA_PERSPECTIVE", &flag);
        assert_eq!(ext, ExtensionPollStats { iterations: 1, misses: 0 });

        let world = device.new_object(ObjectKind::World, None);
        let b = poll_bounds(&*device, world, WaitMode::NoWait, &flag);
        assert_eq!(b.iterations, 1);
        assert_eq!(b.sentinel_reads, 1);
        assert_eq!(b.last, None);
    }

    #[test]
    fn hidden_extension_is_counted_as_misses() {
        let (lib, _device) = sim(SimConfig {
            hidden_extensions: vec!["ANARI_KHR_CAMERA_PERSPECTIVE".to_string()],
            ..SimConfig::default()
        });
        let flag = StopFlag::default();
        flag.raise();
        let stats = poll_extension(&lib, "default", "ANARI_KHR_CAMERA_PERSPECTIVE", &flag);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn no_wait_poller_spins_on_the_sentinel_until_stopped() {
        let (_lib, device) = sim(SimConfig::default());
        let world = device.new_object(ObjectKind::World, None);
        let flag = StopFlag::default();

        let stats = std::thread::scope(|s| {
            let h = s.spawn(|| poll_bounds(&*device, world, WaitMode::NoWait, &flag));
            std::thread::sleep(Duration::from_millis(20));
            let raised = Instant::now();
            flag.raise();
            let stats = h.join().unwrap();
            assert!(raised.elapsed() < Duration::from_secs(1));
            stats
        });
        assert!(stats.iterations > 1);
        assert_eq!(stats.finite_reads, 0);
        assert_eq!(stats.sentinel_reads, stats.iterations);
    }

    #[test]
    fn wait_poller_reads_finite_bounds_once_world_commits() {
        let (_lib, device) = sim(SimConfig::default());
        let world = device.new_object(ObjectKind::World, None);
        let flag = StopFlag::default();
        let scene = SceneConfig {
            sample_count: 32,
            ..SceneConfig::default()
        };

        let stats = std::thread::scope(|s| {
            let h = s.spawn(|| poll_bounds(&*device, world, WaitMode::Wait, &flag));
            initialize_world(&*device, world, &scene);
            flag.raise();
            h.join().unwrap()
        });
        let last = stats.last.unwrap();
        assert!(last.iter().all(|v| v.is_finite()));
        assert!(stats.finite_reads >= 1);
        // a WAIT query only returns once bounds exist
        assert_eq!(stats.sentinel_reads, 0);
    }
}
