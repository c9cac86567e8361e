use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

use glam::Vec3;
use parking_lot::Mutex;

use super::{
    SimConfig,
    raster::{self, CameraInputs, RenderInputs, SurfaceColor, SurfaceInputs},
    store::{Fault, Store, Table},
};
use crate::client::{
    ArrayData, DataType, Device, Handle, MappedFrame, ObjectKind, ParamValue, PropertyMut,
    StatusCallback, StatusReport, StatusSeverity, WaitMode,
};

const COLOR_CHANNEL: &str = "channel.color";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReleaseTarget {
    Object(Handle),
    Device,
}

/// One successful `release` or `release_device` call.
#[derive(Clone, Copy, Debug)]
pub struct ReleaseEvent {
    pub target: ReleaseTarget,
    pub at: Instant,
    /// References left after this release.
    pub remaining: u32,
}

pub struct SimDevice {
    status: StatusCallback,
    config: SimConfig,
    store: Store,
    releases: Mutex<Vec<ReleaseEvent>>,
    released: AtomicBool,
}

struct Gathered {
    /// `None` when the frame itself is not committed.
    inputs: Option<RenderInputs>,
    uncommitted: Vec<Handle>,
}

impl SimDevice {
    pub(crate) fn new(status: StatusCallback, config: SimConfig) -> Self {
        Self {
            status,
            config,
            store: Store::default(),
            releases: Mutex::new(Vec::new()),
            released: AtomicBool::new(false),
        }
    }

    pub fn release_log(&self) -> Vec<ReleaseEvent> {
        self.releases.lock().clone()
    }

    /// Objects currently alive in the device.
    pub fn live_objects(&self) -> usize {
        self.store.lock().live_count()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    fn report(&self, severity: StatusSeverity, source: Option<Handle>, message: impl Into<String>) {
        (self.status)(&StatusReport::new(severity, source, message));
    }

    fn fault(&self, f: Fault) {
        self.report(StatusSeverity::Error, f.source, f.message);
    }

    fn check_live(&self, source: Option<Handle>) -> bool {
        if self.is_released() {
            self.report(StatusSeverity::Error, source, "device used after release");
            return false;
        }
        true
    }

    fn query_bounds(&self, world: Handle, out: &mut [f32; 6], mode: WaitMode) -> bool {
        if world.kind != ObjectKind::World {
            self.report(
                StatusSeverity::Warning,
                Some(world),
                "'bounds' is only provided by worlds",
            );
            return false;
        }
        let mut g = self.store.lock();
        loop {
            let state = match g.get(world).map(|o| o.bounds) {
                Ok(state) => state,
                Err(f) => {
                    drop(g);
                    self.fault(f);
                    return false;
                }
            };
            match (state, mode) {
                (Some(b), _) if Instant::now() >= b.ready_at => {
                    return match b.value {
                        Some(v) => {
                            *out = v;
                            true
                        }
                        None => false,
                    };
                }
                (_, WaitMode::NoWait) => return false,
                (Some(b), WaitMode::Wait) => self.store.wait_until(&mut g, b.ready_at),
                (None, WaitMode::Wait) => self.store.wait(&mut g),
            }
        }
    }

    fn query_duration(&self, frame: Handle, out: &mut f32) -> bool {
        let res = self
            .store
            .lock()
            .get(frame)
            .map(|o| o.frame.as_ref().and_then(|f| f.duration));
        match res {
            Ok(Some(d)) => {
                *out = d;
                true
            }
            Ok(None) => false,
            Err(f) => {
                self.fault(f);
                false
            }
        }
    }

    fn gather(t: &Table, frame: Handle) -> Result<Gathered, Fault> {
        let obj = t.get(frame)?;
        if !obj.is_committed() {
            return Ok(Gathered {
                inputs: None,
                uncommitted: vec![frame],
            });
        }
        let size = match obj.committed_param("size") {
            Some(ParamValue::UInt2(s)) => *s,
            _ => return Err(Fault::new(Some(frame), "frame has no committed 'size'")),
        };
        let dep = |name: &str| -> Result<Handle, Fault> {
            obj.committed_param(name)
                .and_then(ParamValue::as_object)
                .ok_or_else(|| Fault::new(Some(frame), format!("frame has no '{name}'")))
        };
        let (world, renderer, camera) = (dep("world")?, dep("renderer")?, dep("camera")?);

        let mut uncommitted = Vec::new();
        for h in [world, renderer, camera] {
            if !t.get(h)?.is_committed() {
                uncommitted.push(h);
            }
        }

        let vec3 = |h: Handle, name: &str| match t.get(h).ok()?.committed_param(name)? {
            ParamValue::Vec3(v) => Some(Vec3::from_array(*v)),
            _ => None,
        };

        let background = match t.get(renderer)?.committed_param("background") {
            Some(ParamValue::Vec4(c)) => *c,
            _ => [0.0, 0.0, 0.0, 1.0],
        };

        let defaults = CameraInputs::default();
        let camera_inputs = CameraInputs {
            position: vec3(camera, "position").unwrap_or(defaults.position),
            direction: vec3(camera, "direction").unwrap_or(defaults.direction),
            up: vec3(camera, "up").unwrap_or(defaults.up),
            fovy: t.committed_float(camera, "fovy").unwrap_or(defaults.fovy),
        };

        let light_direction = t
            .committed_array_objects(world, "light")
            .first()
            .and_then(|l| vec3(*l, "direction"))
            .unwrap_or(Vec3::NEG_Z);

        let mut surfaces = Vec::new();
        for surface in t.committed_array_objects(world, "surface") {
            let child = |name: &str| {
                t.get(surface)
                    .ok()
                    .and_then(|s| s.committed_param(name))
                    .and_then(ParamValue::as_object)
            };
            let Some(geom) = child("geometry").filter(|g| t.is_sphere_geometry(*g)) else {
                continue;
            };
            let Some(ArrayData::Float32Vec3(positions)) =
                t.committed_array_data(geom, "vertex.position")
            else {
                continue;
            };
            let indices = match t.committed_array_data(geom, "primitive.index") {
                Some(ArrayData::UInt32(ix)) => Some(ix),
                _ => None,
            };
            let attributes = match t.committed_array_data(geom, "vertex.attribute0") {
                Some(ArrayData::Float32(a)) => Some(a),
                _ => None,
            };
            let color = match child("material").and_then(|m| {
                t.get(m)
                    .ok()
                    .and_then(|m| m.committed_param("color").cloned())
            }) {
                Some(ParamValue::Vec3(c)) => SurfaceColor::Constant(Vec3::from_array(c)),
                Some(ParamValue::Object(sampler)) => {
                    match t.committed_array_data(sampler, "image") {
                        Some(ArrayData::Float32Vec3(texels)) => SurfaceColor::Ramp(
                            texels.into_iter().map(Vec3::from_array).collect(),
                        ),
                        _ => SurfaceColor::Constant(Vec3::splat(0.8)),
                    }
                }
                _ => SurfaceColor::Constant(Vec3::splat(0.8)),
            };
            surfaces.push(SurfaceInputs {
                positions,
                indices,
                attributes,
                radius: t.committed_float(geom, "radius").unwrap_or(0.01),
                color,
            });
        }

        Ok(Gathered {
            inputs: Some(RenderInputs {
                width: size[0],
                height: size[1],
                background,
                camera: camera_inputs,
                light_direction,
                surfaces,
            }),
            uncommitted,
        })
    }
}

impl Device for SimDevice {
    fn new_object(&self, kind: ObjectKind, subtype: Option<&str>) -> Handle {
        if !self.check_live(None) {
            return Handle::new(0, kind);
        }
        let h = self.store.lock().create(kind, subtype);
        tracing::trace!(handle = %h, ?subtype, "new object");
        h
    }

    fn new_array1d(&self, elem: DataType, count: usize) -> Handle {
        if !self.check_live(None) {
            return Handle::new(0, ObjectKind::Array1D);
        }
        let res = self.store.lock().create_array(elem, count);
        res.unwrap_or_else(|f| {
            self.fault(f);
            Handle::new(0, ObjectKind::Array1D)
        })
    }

    fn map_array(&self, array: Handle) -> Option<ArrayData> {
        let res = self.store.lock().map_array(array);
        res.map_err(|f| self.fault(f)).ok()
    }

    fn unmap_array(&self, array: Handle, data: ArrayData) {
        let res = self.store.lock().unmap_array(array, data);
        if let Err(f) = res {
            self.fault(f);
        }
    }

    fn set_parameter(&self, object: Handle, name: &str, value: ParamValue) {
        let res = self.store.lock().set_param(object, name, value);
        if let Err(f) = res {
            self.fault(f);
        }
    }

    fn set_parameter_array1d(&self, object: Handle, name: &str, data: ArrayData) {
        let res = {
            let mut t = self.store.lock();
            (|| {
                let arr = t.create_array(data.element_type(), data.len())?;
                t.map_array(arr)?;
                t.unmap_array(arr, data)?;
                t.set_param(object, name, ParamValue::Object(arr))?;
                t.release(arr).map(|_| ())
            })()
        };
        if let Err(f) = res {
            self.fault(f);
        }
    }

    #[tracing::instrument(skip_all, fields(object = %object))]
    fn commit_parameters(&self, object: Handle) {
        if self.config.fatal_on_commit == Some(object.kind) {
            self.report(
                StatusSeverity::FatalError,
                Some(object),
                format!("injected fatal fault while committing {object}"),
            );
            return;
        }
        let delay = Duration::from_millis(self.config.bounds_delay_ms);
        let res = self.store.lock().commit(object, delay);
        self.store.notify();
        if let Err(f) = res {
            self.fault(f);
        }
    }

    fn get_property(
        &self,
        object: Handle,
        name: &str,
        out: PropertyMut<'_>,
        mode: WaitMode,
    ) -> bool {
        match (name, out) {
            ("bounds", PropertyMut::Bounds(b)) => self.query_bounds(object, b, mode),
            ("duration", PropertyMut::Float32(d)) if object.kind == ObjectKind::Frame => {
                self.query_duration(object, d)
            }
            (other, _) => {
                self.report(
                    StatusSeverity::Warning,
                    Some(object),
                    format!("unknown property '{other}' or mismatched destination"),
                );
                false
            }
        }
    }

    #[tracing::instrument(skip_all, fields(frame = %frame))]
    fn render(&self, frame: Handle) {
        if !self.check_live(Some(frame)) {
            return;
        }
        let gathered = {
            let mut g = self.store.lock();
            loop {
                match Self::gather(&g, frame) {
                    Err(f) => break Err(f),
                    Ok(gathered) => {
                        if gathered.uncommitted.is_empty() || !self.config.render_waits_for_commit
                        {
                            break Ok(gathered);
                        }
                        self.store.wait(&mut g);
                    }
                }
            }
        };
        let gathered = match gathered {
            Ok(g) => g,
            Err(f) => {
                self.fault(f);
                return;
            }
        };
        for h in &gathered.uncommitted {
            self.report(
                StatusSeverity::Error,
                Some(*h),
                "rendering with an uncommitted object",
            );
        }
        let Some(inputs) = gathered.inputs else {
            return;
        };

        let start = Instant::now();
        let pixels = raster::rasterize(&inputs);
        if self.config.render_delay_ms > 0 {
            std::thread::sleep(Duration::from_millis(self.config.render_delay_ms));
        }
        let duration = start.elapsed().as_secs_f32();

        let mapped = {
            let mut g = self.store.lock();
            match g.get_mut(frame) {
                Ok(o) => o.frame.as_mut().map(|fs| {
                    fs.width = inputs.width;
                    fs.height = inputs.height;
                    fs.color = Some(pixels.into());
                    fs.duration = Some(duration);
                    fs.mapped
                }),
                Err(_) => None,
            }
        };
        self.store.notify();
        if mapped == Some(true) {
            self.report(
                StatusSeverity::Warning,
                Some(frame),
                "frame rendered while its color channel was mapped",
            );
        }
    }

    fn wait(&self, frame: Handle) {
        let res = self.store.lock().get(frame).map(|_| ());
        if let Err(f) = res {
            self.fault(f);
        }
    }

    fn map_frame(&self, frame: Handle, channel: &str) -> Option<MappedFrame> {
        if channel != COLOR_CHANNEL {
            self.report(
                StatusSeverity::Error,
                Some(frame),
                format!("unknown frame channel '{channel}'"),
            );
            return None;
        }
        let res = {
            let mut g = self.store.lock();
            g.get_mut(frame).and_then(|o| {
                let has_channel = matches!(
                    o.committed_param(COLOR_CHANNEL),
                    Some(ParamValue::DataType(DataType::UFixed8RgbaSrgb))
                );
                let fs = o
                    .frame
                    .as_mut()
                    .ok_or_else(|| Fault::new(Some(frame), "not a frame"))?;
                if !has_channel {
                    return Err(Fault::new(Some(frame), "frame has no color channel"));
                }
                if fs.mapped {
                    return Err(Fault::new(Some(frame), "color channel is already mapped"));
                }
                let pixels = fs
                    .color
                    .clone()
                    .ok_or_else(|| Fault::new(Some(frame), "frame has not been rendered"))?;
                fs.mapped = true;
                Ok(MappedFrame {
                    width: fs.width,
                    height: fs.height,
                    row_stride: fs.width as usize * 4,
                    pixels,
                })
            })
        };
        res.map_err(|f| self.fault(f)).ok()
    }

    fn unmap_frame(&self, frame: Handle, channel: &str) {
        let res = {
            let mut g = self.store.lock();
            g.get_mut(frame).map(|o| match o.frame.as_mut() {
                Some(fs) if channel == COLOR_CHANNEL && fs.mapped => {
                    fs.mapped = false;
                    true
                }
                _ => false,
            })
        };
        match res {
            Ok(true) => {}
            Ok(false) => self.report(
                StatusSeverity::Warning,
                Some(frame),
                format!("unmap of '{channel}' which is not mapped"),
            ),
            Err(f) => self.fault(f),
        }
    }

    fn release(&self, object: Handle) {
        let res = self.store.lock().release(object);
        self.store.notify();
        match res {
            Ok(r) => {
                tracing::debug!(handle = %object, remaining = r.remaining, "released");
                self.releases.lock().push(ReleaseEvent {
                    target: ReleaseTarget::Object(object),
                    at: Instant::now(),
                    remaining: r.remaining,
                });
            }
            Err(f) => self.fault(f),
        }
    }

    fn release_device(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            self.report(StatusSeverity::Error, None, "device released twice");
            return;
        }
        let live = self.live_objects();
        if live > 0 {
            self.report(
                StatusSeverity::Warning,
                None,
                format!("device released with {live} live objects"),
            );
        }
        tracing::debug!("device released");
        self.releases.lock().push(ReleaseEvent {
            target: ReleaseTarget::Device,
            at: Instant::now(),
            remaining: 0,
        });
        self.store.notify();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::client::StatusLog;

    fn device(config: SimConfig) -> (Arc<SimDevice>, StatusLog) {
        let log = StatusLog::new();
        (Arc::new(SimDevice::new(log.callback(), config)), log)
    }

    fn sentinel() -> [f32; 6] {
        [1e30, 1e30, 1e30, -1e30, -1e30, -1e30]
    }

    fn committed_sphere_world(d: &SimDevice) -> Handle {
        let positions = d.new_array1d(DataType::Float32Vec3, 1);
        let mut data = d.map_array(positions).unwrap();
        data.as_vec3_mut().unwrap()[0] = [1.0, 2.0, 3.0];
        d.unmap_array(positions, data);

        let geom = d.new_object(ObjectKind::Geometry, Some("sphere"));
        d.set_and_release_parameter(geom, "vertex.position", positions);
        d.set_parameter(geom, "radius", 1.0f32.into());
        d.commit_parameters(geom);

        let surface = d.new_object(ObjectKind::Surface, None);
        d.set_and_release_parameter(surface, "geometry", geom);
        d.commit_parameters(surface);

        let world = d.new_object(ObjectKind::World, None);
        d.set_parameter_array1d(
            world,
            "surface",
            ArrayData::Objects(DataType::Surface, vec![surface]),
        );
        d.release(surface);
        d.commit_parameters(world);
        world
    }

    #[test]
    fn no_wait_on_uncommitted_world_returns_immediately() {
        let (d, _log) = device(SimConfig::default());
        let world = d.new_object(ObjectKind::World, None);
        let mut b = sentinel();
        let start = Instant::now();
        assert!(!d.get_property(world, "bounds", PropertyMut::Bounds(&mut b), WaitMode::NoWait));
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(b, sentinel());
    }

    #[test]
    fn wait_blocks_until_world_commit() {
        let (d, log) = device(SimConfig::default());
        let world = d.new_object(ObjectKind::World, None);
        // an empty world is built on another thread while this one waits
        let bounds = std::thread::scope(|s| {
            let waiter = s.spawn(|| {
                let mut b = sentinel();
                let got = d.get_property(world, "bounds", PropertyMut::Bounds(&mut b), WaitMode::Wait);
                (got, b)
            });
            std::thread::sleep(Duration::from_millis(20));
            d.commit_parameters(world);
            waiter.join().unwrap()
        });
        assert_eq!(bounds, (false, sentinel()));
        assert_eq!(log.count(StatusSeverity::Error), 0);
    }

    #[test]
    fn wait_returns_finite_bounds_after_commit() {
        let (d, _log) = device(SimConfig::default());
        let world = committed_sphere_world(&d);
        let mut b = sentinel();
        assert!(d.get_property(world, "bounds", PropertyMut::Bounds(&mut b), WaitMode::Wait));
        assert_eq!(b, [0.0, 1.0, 2.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn bounds_delay_keeps_no_wait_on_sentinel() {
        let (d, _log) = device(SimConfig {
            bounds_delay_ms: 60_000,
            ..SimConfig::default()
        });
        let world = committed_sphere_world(&d);
        let mut b = sentinel();
        assert!(!d.get_property(world, "bounds", PropertyMut::Bounds(&mut b), WaitMode::NoWait));
        assert_eq!(b, sentinel());
    }

    #[test]
    fn release_destroys_children_and_logs() {
        let (d, log) = device(SimConfig::default());
        let world = committed_sphere_world(&d);
        assert!(d.live_objects() > 1);
        d.release(world);
        assert_eq!(d.live_objects(), 0);
        d.release(world);
        assert_eq!(log.count(StatusSeverity::Error), 1);

        let top: Vec<_> = d
            .release_log()
            .into_iter()
            .filter(|e| e.target == ReleaseTarget::Object(world))
            .collect();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].remaining, 0);
    }

    #[test]
    fn device_release_is_logged_once() {
        let (d, log) = device(SimConfig::default());
        d.release_device();
        d.release_device();
        assert!(d.is_released());
        assert_eq!(log.count(StatusSeverity::Error), 1);
        let n = d
            .release_log()
            .iter()
            .filter(|e| e.target == ReleaseTarget::Device)
            .count();
        assert_eq!(n, 1);
    }

    #[test]
    fn fatal_on_commit_reports_and_skips_commit() {
        let (d, log) = device(SimConfig {
            fatal_on_commit: Some(ObjectKind::Camera),
            ..SimConfig::default()
        });
        let cam = d.new_object(ObjectKind::Camera, Some("perspective"));
        d.commit_parameters(cam);
        assert_eq!(log.count(StatusSeverity::FatalError), 1);
        assert!(!d.store.lock().get(cam).unwrap().is_committed());
    }

    #[test]
    fn render_without_waiting_reports_uncommitted_dependencies() {
        let (d, log) = device(SimConfig {
            render_waits_for_commit: false,
            ..SimConfig::default()
        });
        let world = d.new_object(ObjectKind::World, None);
        let renderer = d.new_object(ObjectKind::Renderer, Some("default"));
        let camera = d.new_object(ObjectKind::Camera, Some("perspective"));
        let frame = d.new_object(ObjectKind::Frame, None);
        d.set_parameter(frame, "size", [4u32, 4].into());
        d.set_parameter(frame, COLOR_CHANNEL, DataType::UFixed8RgbaSrgb.into());
        d.set_parameter(frame, "world", world.into());
        d.set_parameter(frame, "renderer", renderer.into());
        d.set_parameter(frame, "camera", camera.into());
        d.commit_parameters(frame);

        d.render(frame);
        d.wait(frame);
        assert_eq!(log.count(StatusSeverity::Error), 3);

        let mut duration = -1.0f32;
        assert!(d.get_property(
            frame,
            "duration",
            PropertyMut::Float32(&mut duration),
            WaitMode::NoWait
        ));
        assert!(duration >= 0.0);

        let fb = d.map_frame(frame, COLOR_CHANNEL).unwrap();
        assert_eq!((fb.width, fb.height, fb.row_stride), (4, 4, 16));
        assert_eq!(fb.pixels.len(), 64);
        assert!(d.map_frame(frame, COLOR_CHANNEL).is_none());
        d.unmap_frame(frame, COLOR_CHANNEL);
        assert_eq!(log.count(StatusSeverity::Warning), 0);
    }

    #[test]
    fn duration_unavailable_before_first_render() {
        let (d, _log) = device(SimConfig::default());
        let frame = d.new_object(ObjectKind::Frame, None);
        let mut duration = -1.0f32;
        assert!(!d.get_property(
            frame,
            "duration",
            PropertyMut::Float32(&mut duration),
            WaitMode::NoWait
        ));
        assert_eq!(duration, -1.0);
    }
}
