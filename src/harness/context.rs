use std::{sync::Arc, time::Instant};

use crate::{
    client::{Device, Handle, Library, ObjectKind},
    error::HarnessResult,
};

/// The library, the device, and the four top-level handles every harness thread shares.
pub struct SharedContext {
    pub library: Arc<dyn Library>,
    pub device: Arc<dyn Device>,
    pub world: Handle,
    pub renderer: Handle,
    pub camera: Handle,
    pub frame: Handle,
}

impl SharedContext {
    /// Create the device and allocate the uncommitted top-level objects.
    ///
    /// The library is unloaded if no device can be created.
    pub fn create(library: Arc<dyn Library>, subtype: &str) -> HarnessResult<Self> {
        let device = match library.new_device(subtype) {
            Ok(d) => d,
            Err(e) => {
                library.unload();
                return Err(e);
            }
        };
        let world = device.new_object(ObjectKind::World, None);
        let renderer = device.new_object(ObjectKind::Renderer, Some("default"));
        let camera = device.new_object(ObjectKind::Camera, Some("perspective"));
        let frame = device.new_object(ObjectKind::Frame, None);
        tracing::debug!(%world, %renderer, %camera, %frame, "allocated top-level objects");
        Ok(Self {
            library,
            device,
            world,
            renderer,
            camera,
            frame,
        })
    }

    /// Release camera, renderer, world and frame, then the device, then unload the library.
    ///
    /// Only valid once every thread holding a reference into this context has joined.
    pub fn release(self) -> Instant {
        for h in [self.camera, self.renderer, self.world, self.frame] {
            self.device.release(h);
        }
        self.device.release_device();
        self.library.unload();
        tracing::debug!(library = self.library.name(), "released shared context");
        Instant::now()
    }
}
