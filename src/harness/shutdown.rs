use std::{
    thread::{self, Scope, ScopedJoinHandle},
    time::Instant,
};

use super::{ThreadOutput, ThreadRole};
use crate::error::{HarnessError, HarnessResult};

/// Join order: the render loop first since it stops the pollers, then the pollers, then the
/// initializers.
pub const JOIN_ORDER: [ThreadRole; 8] = [
    ThreadRole::Render,
    ThreadRole::BoundsWait,
    ThreadRole::BoundsNoWait,
    ThreadRole::Extension,
    ThreadRole::World,
    ThreadRole::Renderer,
    ThreadRole::Camera,
    ThreadRole::Frame,
];

#[derive(Clone, Copy, Debug)]
pub struct JoinRecord {
    pub role: ThreadRole,
    pub at: Instant,
    pub panicked: bool,
}

pub(crate) struct Joined {
    pub joins: Vec<JoinRecord>,
    pub outputs: Vec<(ThreadRole, ThreadOutput)>,
    /// Roles whose thread panicked, in join order.
    pub panicked: Vec<ThreadRole>,
}

/// Named scoped threads, at most one per role.
pub struct SpawnedThreads<'scope> {
    handles: Vec<(ThreadRole, ScopedJoinHandle<'scope, ThreadOutput>)>,
}

impl Default for SpawnedThreads<'_> {
    fn default() -> Self {
        Self {
            handles: Vec::with_capacity(JOIN_ORDER.len()),
        }
    }
}

impl<'scope> SpawnedThreads<'scope> {
    /// Spawn `body` as `role`'s thread. Prints `"<role> thread finished"` when `body` returns.
    pub(crate) fn spawn<'env, F>(
        &mut self,
        scope: &'scope Scope<'scope, 'env>,
        role: ThreadRole,
        body: F,
    ) -> HarnessResult<()>
    where
        F: FnOnce() -> ThreadOutput + Send + 'scope,
    {
        let handle = thread::Builder::new()
            .name(role.thread_name().to_string())
            .spawn_scoped(scope, move || {
                tracing::debug!(%role, "thread started");
                let out = body();
                println!("{role} thread finished");
                tracing::debug!(%role, "thread finished");
                out
            })
            .map_err(|source| HarnessError::ThreadSpawn { role, source })?;
        self.handles.push((role, handle));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Join every spawned thread once, in [`JOIN_ORDER`]. Roles never spawned are skipped.
    pub(crate) fn join_all(mut self) -> Joined {
        let mut joined = Joined {
            joins: Vec::with_capacity(self.handles.len()),
            outputs: Vec::with_capacity(self.handles.len()),
            panicked: Vec::new(),
        };
        for role in JOIN_ORDER {
            let Some(pos) = self.handles.iter().position(|(r, _)| *r == role) else {
                continue;
            };
            let (_, handle) = self.handles.swap_remove(pos);
            let result = handle.join();
            let panicked = result.is_err();
            joined.joins.push(JoinRecord {
                role,
                at: Instant::now(),
                panicked,
            });
            match result {
                Ok(out) => joined.outputs.push((role, out)),
                Err(_) => {
                    tracing::error!(%role, "thread panicked");
                    joined.panicked.push(role);
                }
            }
        }
        joined
    }
}
