//! Concurrent initialization, polling and rendering against one shared device.
//!
//! Handles are allocated before any thread starts and released only after every thread has
//! joined. There is deliberately no barrier between the initializers and the render loop: the
//! device's `render` is what has to wait for committed state.

pub mod context;
pub mod init;
pub mod poll;
pub mod render_loop;
pub mod shutdown;

use std::{fmt, sync::Arc, thread, time::Instant};

use crate::{
    client::{self, Library, StatusCallback, WaitMode},
    config::HarnessConfig,
    error::{HarnessError, HarnessResult},
};

pub use context::SharedContext;
pub use poll::{BoundsPollStats, ExtensionPollStats, StopFlag, StopSignals};
pub use render_loop::FrameRecord;
pub use shutdown::{JOIN_ORDER, JoinRecord, SpawnedThreads};

/// The eight harness threads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ThreadRole {
    World,
    Renderer,
    Camera,
    Frame,
    Extension,
    BoundsNoWait,
    BoundsWait,
    Render,
}

impl ThreadRole {
    /// OS thread name.
    pub fn thread_name(self) -> &'static str {
        match self {
            Self::World => "init-world",
            Self::Renderer => "init-renderer",
            Self::Camera => "init-camera",
            Self::Frame => "init-frame",
            Self::Extension => "poll-extension",
            Self::BoundsNoWait => "poll-bounds-nowait",
            Self::BoundsWait => "poll-bounds-wait",
            Self::Render => "render",
        }
    }
}

impl fmt::Display for ThreadRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::World => "world initialization",
            Self::Renderer => "renderer initialization",
            Self::Camera => "camera initialization",
            Self::Frame => "frame initialization",
            Self::Extension => "extension query",
            Self::BoundsNoWait => "bounds query (no wait)",
            Self::BoundsWait => "bounds query (wait)",
            Self::Render => "render",
        })
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub frames: Vec<FrameRecord>,
    /// Joins in the order they happened.
    pub joins: Vec<JoinRecord>,
    pub extension: ExtensionPollStats,
    pub bounds_no_wait: BoundsPollStats,
    pub bounds_wait: BoundsPollStats,
    /// When the last handle, the device and the library were released.
    pub released_at: Instant,
}

/// What a harness thread hands back to the coordinator.
#[derive(Debug)]
pub(crate) enum ThreadOutput {
    Initialized,
    Extension(ExtensionPollStats),
    Bounds(BoundsPollStats),
    Render(HarnessResult<Vec<FrameRecord>>),
}

/// Resolve and load `cfg.library`, then [`run`] against it.
pub fn run_configured(cfg: &HarnessConfig, status: StatusCallback) -> HarnessResult<RunReport> {
    cfg.validate()?;
    let library = client::load_library(&cfg.library, status, &cfg.sim)?;
    run(cfg, library)
}

/// Allocate, fork the eight threads, join them in [`JOIN_ORDER`], then release everything.
///
/// Takes over `library`: it is unloaded before this returns, on success and on error.
pub fn run(cfg: &HarnessConfig, library: Arc<dyn Library>) -> HarnessResult<RunReport> {
    if let Err(e) = cfg.validate() {
        library.unload();
        return Err(e);
    }
    tracing::info!(
        library = library.name(),
        subtype = %cfg.device_subtype,
        frames = cfg.frame_count,
        output = ?cfg.output.as_ref().map(|o| &o.dir),
        "starting harness"
    );

    let ctx = SharedContext::create(library, &cfg.device_subtype)?;
    let signals = StopSignals::default();

    let (spawned, joined) = thread::scope(|s| {
        let mut threads = SpawnedThreads::default();
        let spawned = spawn_all(s, &mut threads, &ctx, cfg, &signals);
        if let Err(e) = &spawned {
            tracing::error!(error = %e, "thread spawn failed, stopping pollers");
            signals.raise_all();
        }
        (spawned, threads.join_all())
    });

    let released_at = ctx.release();

    spawned?;
    if let Some(role) = joined.panicked.first() {
        return Err(HarnessError::ThreadPanicked(*role));
    }

    let mut report = RunReport {
        frames: Vec::new(),
        joins: joined.joins,
        extension: ExtensionPollStats::default(),
        bounds_no_wait: BoundsPollStats::default(),
        bounds_wait: BoundsPollStats::default(),
        released_at,
    };
    for (role, output) in joined.outputs {
        match output {
            ThreadOutput::Initialized => {}
            ThreadOutput::Extension(stats) => report.extension = stats,
            ThreadOutput::Bounds(stats) if role == ThreadRole::BoundsWait => {
                report.bounds_wait = stats
            }
            ThreadOutput::Bounds(stats) => report.bounds_no_wait = stats,
            ThreadOutput::Render(frames) => report.frames = frames?,
        }
    }
    tracing::info!(frames = report.frames.len(), "harness finished");
    Ok(report)
}

fn spawn_all<'scope>(
    s: &'scope thread::Scope<'scope, '_>,
    threads: &mut SpawnedThreads<'scope>,
    ctx: &'scope SharedContext,
    cfg: &'scope HarnessConfig,
    signals: &'scope StopSignals,
) -> HarnessResult<()> {
    let device = &*ctx.device;
    let library = &*ctx.library;
    let (world, renderer, camera, frame) = (ctx.world, ctx.renderer, ctx.camera, ctx.frame);

    threads.spawn(s, ThreadRole::World, move || {
        init::initialize_world(device, world, &cfg.scene);
        ThreadOutput::Initialized
    })?;
    threads.spawn(s, ThreadRole::Renderer, move || {
        init::initialize_renderer(device, renderer);
        ThreadOutput::Initialized
    })?;
    threads.spawn(s, ThreadRole::Camera, move || {
        init::initialize_camera(device, camera);
        ThreadOutput::Initialized
    })?;
    threads.spawn(s, ThreadRole::Frame, move || {
        init::initialize_frame(device, frame, cfg.image_size, world, renderer, camera);
        ThreadOutput::Initialized
    })?;

    threads.spawn(s, ThreadRole::Extension, move || {
        ThreadOutput::Extension(poll::poll_extension(
            library,
            &cfg.device_subtype,
            &cfg.extension_name,
            &signals.extension,
        ))
    })?;
    threads.spawn(s, ThreadRole::BoundsNoWait, move || {
        ThreadOutput::Bounds(poll::poll_bounds(
            device,
            world,
            WaitMode::NoWait,
            &signals.bounds_no_wait,
        ))
    })?;
    threads.spawn(s, ThreadRole::BoundsWait, move || {
        ThreadOutput::Bounds(poll::poll_bounds(
            device,
            world,
            WaitMode::Wait,
            &signals.bounds_wait,
        ))
    })?;

    threads.spawn(s, ThreadRole::Render, move || {
        ThreadOutput::Render(render_loop::run_render_loop(device, frame, cfg, signals))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_print_their_thread_names() {
        assert_eq!(
            format!("{} thread finished", ThreadRole::World),
            "world initialization thread finished"
        );
        assert_eq!(ThreadRole::BoundsNoWait.to_string(), "bounds query (no wait)");
        assert_eq!(ThreadRole::Extension.to_string(), "extension query");
        assert_eq!(ThreadRole::Render.thread_name(), "render");
    }

    #[test]
    fn invalid_config_unloads_the_library() {
        use crate::{client::StatusLog, sim::SimLibrary};

        let sim = Arc::new(SimLibrary::load(
            "sim",
            StatusLog::new().callback(),
            Default::default(),
        ));
        let cfg = HarnessConfig {
            frame_count: 0,
            ..HarnessConfig::default()
        };
        let err = run(&cfg, sim.clone()).unwrap_err();
        assert!(matches!(err, HarnessError::Validation(_)));
        assert!(sim.is_unloaded());
        assert!(sim.devices().is_empty());
    }
}
