use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::client::{ArrayData, DataType, Handle, ObjectKind, ParamValue};

/// Problem found while operating on the table; reported as a status by the device.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Fault {
    pub source: Option<Handle>,
    pub message: String,
}

impl Fault {
    pub fn new(source: Option<Handle>, message: impl Into<String>) -> Self {
        Self {
            source,
            message: message.into(),
        }
    }
}

pub(crate) type Params = HashMap<String, ParamValue>;

#[derive(Debug)]
pub(crate) struct ArrayState {
    pub elem: DataType,
    pub count: usize,
    /// `None` while mapped.
    pub data: Option<ArrayData>,
    /// Objects retained by the current contents.
    pub held: Vec<Handle>,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct BoundsState {
    pub ready_at: Instant,
    /// `None` when the world can never produce bounds.
    pub value: Option<[f32; 6]>,
}

#[derive(Debug, Default)]
pub(crate) struct FrameState {
    pub width: u32,
    pub height: u32,
    pub color: Option<Arc<[u8]>>,
    pub duration: Option<f32>,
    pub mapped: bool,
}

#[derive(Debug)]
pub(crate) struct Object {
    pub kind: ObjectKind,
    pub subtype: Option<String>,
    pub refs: u32,
    pub pending: Params,
    /// `None` until the first commit.
    pub committed: Option<Params>,
    pub array: Option<ArrayState>,
    pub bounds: Option<BoundsState>,
    pub frame: Option<FrameState>,
}

impl Object {
    fn new(kind: ObjectKind, subtype: Option<&str>) -> Self {
        Self {
            kind,
            subtype: subtype.map(str::to_string),
            refs: 1,
            pending: Params::new(),
            committed: None,
            array: None,
            bounds: None,
            frame: (kind == ObjectKind::Frame).then(FrameState::default),
        }
    }

    pub fn has_subtype(&self, name: &str) -> bool {
        self.subtype.as_deref() == Some(name)
    }

    pub fn is_committed(&self) -> bool {
        self.committed.is_some()
    }

    pub fn committed_param(&self, name: &str) -> Option<&ParamValue> {
        self.committed.as_ref().and_then(|p| p.get(name))
    }

    fn owned_refs(&self) -> Vec<Handle> {
        let mut out: Vec<Handle> = self.pending.values().filter_map(ParamValue::as_object).collect();
        if let Some(c) = &self.committed {
            out.extend(c.values().filter_map(ParamValue::as_object));
        }
        if let Some(a) = &self.array {
            out.extend_from_slice(&a.held);
        }
        out
    }
}

/// Result of dropping one reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Released {
    pub remaining: u32,
}

/// Object table guarded by one mutex; `changed` is signalled on commit, release and render.
#[derive(Debug, Default)]
pub(crate) struct Store {
    table: Mutex<Table>,
    changed: Condvar,
}

#[derive(Debug, Default)]
pub(crate) struct Table {
    next_id: u64,
    objects: HashMap<u64, Object>,
}

impl Store {
    pub fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock()
    }

    pub fn wait(&self, guard: &mut MutexGuard<'_, Table>) {
        self.changed.wait(guard);
    }

    pub fn wait_until(&self, guard: &mut MutexGuard<'_, Table>, deadline: Instant) {
        let _ = self.changed.wait_until(guard, deadline);
    }

    pub fn notify(&self) {
        self.changed.notify_all();
    }
}

impl Table {
    pub fn get(&self, h: Handle) -> Result<&Object, Fault> {
        match self.objects.get(&h.id) {
            Some(o) if o.kind == h.kind => Ok(o),
            Some(o) => Err(Fault::new(
                Some(h),
                format!("handle kind mismatch: object is a {}", o.kind.name()),
            )),
            None => Err(Fault::new(Some(h), "use of released or unknown handle")),
        }
    }

    pub fn get_mut(&mut self, h: Handle) -> Result<&mut Object, Fault> {
        match self.objects.get_mut(&h.id) {
            Some(o) if o.kind == h.kind => Ok(o),
            Some(o) => Err(Fault::new(
                Some(h),
                format!("handle kind mismatch: object is a {}", o.kind.name()),
            )),
            None => Err(Fault::new(Some(h), "use of released or unknown handle")),
        }
    }

    pub fn live_count(&self) -> usize {
        self.objects.len()
    }

    pub fn create(&mut self, kind: ObjectKind, subtype: Option<&str>) -> Handle {
        self.next_id += 1;
        let id = self.next_id;
        self.objects.insert(id, Object::new(kind, subtype));
        Handle::new(id, kind)
    }

    pub fn create_array(&mut self, elem: DataType, count: usize) -> Result<Handle, Fault> {
        let data = ArrayData::zeroed(elem, count).ok_or_else(|| {
            Fault::new(None, format!("{elem:?} is not a valid array element type"))
        })?;
        let h = self.create(ObjectKind::Array1D, None);
        if let Ok(o) = self.get_mut(h) {
            o.array = Some(ArrayState {
                elem,
                count,
                data: Some(data),
                held: Vec::new(),
            });
        }
        Ok(h)
    }

    fn retain(&mut self, h: Handle) -> Result<(), Fault> {
        self.get_mut(h)?.refs += 1;
        Ok(())
    }

    /// Drop a reference held by the table itself; silently ignores dead children.
    fn release_held(&mut self, h: Handle) {
        let _ = self.release(h);
    }

    /// Drop one reference to `h`, destroying it and cascading into its children at zero.
    pub fn release(&mut self, h: Handle) -> Result<Released, Fault> {
        let obj = self.get_mut(h)?;
        obj.refs -= 1;
        let remaining = obj.refs;
        if remaining == 0 {
            let mut work = vec![h];
            while let Some(next) = work.pop() {
                let Some(dead) = self.objects.remove(&next.id) else {
                    continue;
                };
                for child in dead.owned_refs() {
                    if let Some(c) = self.objects.get_mut(&child.id) {
                        c.refs -= 1;
                        if c.refs == 0 {
                            work.push(child);
                        }
                    }
                }
            }
        }
        Ok(Released { remaining })
    }

    pub fn set_param(&mut self, h: Handle, name: &str, value: ParamValue) -> Result<(), Fault> {
        self.get(h)?;
        if let Some(child) = value.as_object() {
            self.retain(child)?;
        }
        let obj = self.get_mut(h)?;
        let old = obj.pending.insert(name.to_string(), value);
        if let Some(old_child) = old.as_ref().and_then(ParamValue::as_object) {
            self.release_held(old_child);
        }
        Ok(())
    }

    pub fn map_array(&mut self, h: Handle) -> Result<ArrayData, Fault> {
        let state = self
            .get_mut(h)?
            .array
            .as_mut()
            .ok_or_else(|| Fault::new(Some(h), "object is not an array"))?;
        state
            .data
            .take()
            .ok_or_else(|| Fault::new(Some(h), "array is already mapped"))
    }

    pub fn unmap_array(&mut self, h: Handle, data: ArrayData) -> Result<(), Fault> {
        let state = self
            .get(h)?
            .array
            .as_ref()
            .ok_or_else(|| Fault::new(Some(h), "object is not an array"))?;
        if state.data.is_some() {
            return Err(Fault::new(Some(h), "unmap of an array that is not mapped"));
        }
        let (elem, count) = (state.elem, state.count);

        let problem = if data.element_type() != elem {
            Some(format!(
                "unmapped data is {:?}, array holds {elem:?}",
                data.element_type()
            ))
        } else if elem.object_kind().is_some() && data.len() > count {
            Some(format!("{} handles written to an array of {count}", data.len()))
        } else if elem.object_kind().is_none() && data.len() != count {
            Some(format!("array resized from {count} to {}", data.len()))
        } else {
            None
        };
        if let Some(message) = problem {
            if let Some(state) = self.get_mut(h)?.array.as_mut() {
                state.data = ArrayData::zeroed(elem, count);
            }
            return Err(Fault::new(Some(h), message));
        }

        let refs = data.object_refs().to_vec();
        for r in &refs {
            self.retain(*r)?;
        }
        let old_held = match self.get_mut(h)?.array.as_mut() {
            Some(state) => {
                state.data = Some(data);
                std::mem::replace(&mut state.held, refs)
            }
            None => Vec::new(),
        };
        for r in old_held {
            self.release_held(r);
        }
        Ok(())
    }

    /// Snapshot pending parameters into the committed set.
    pub fn commit(&mut self, h: Handle, bounds_delay: Duration) -> Result<(), Fault> {
        let snapshot = self.get(h)?.pending.clone();
        for child in snapshot.values().filter_map(ParamValue::as_object) {
            self.retain(child)?;
        }
        let obj = self.get_mut(h)?;
        let old = obj.committed.replace(snapshot);
        for child in old.iter().flat_map(|p| p.values().filter_map(ParamValue::as_object)) {
            self.release_held(child);
        }

        match h.kind {
            ObjectKind::World => {
                let value = self.world_bounds(h);
                self.get_mut(h)?.bounds = Some(BoundsState {
                    ready_at: Instant::now() + bounds_delay,
                    value,
                });
            }
            ObjectKind::Frame => {
                let size = match self.get(h)?.committed_param("size") {
                    Some(ParamValue::UInt2(s)) => *s,
                    _ => return Err(Fault::new(Some(h), "frame committed without 'size'")),
                };
                if let Some(f) = self.get_mut(h)?.frame.as_mut() {
                    f.width = size[0];
                    f.height = size[1];
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Object handles stored in a committed array parameter of `h`.
    pub fn committed_array_objects(&self, h: Handle, name: &str) -> Vec<Handle> {
        let Ok(obj) = self.get(h) else {
            return Vec::new();
        };
        let Some(arr) = obj.committed_param(name).and_then(ParamValue::as_object) else {
            return Vec::new();
        };
        self.get(arr)
            .ok()
            .and_then(|a| a.array.as_ref())
            .and_then(|s| s.data.as_ref())
            .map(|d| d.object_refs().to_vec())
            .unwrap_or_default()
    }

    /// Clone of a committed array parameter's data.
    pub fn committed_array_data(&self, h: Handle, name: &str) -> Option<ArrayData> {
        let arr = self.get(h).ok()?.committed_param(name)?.as_object()?;
        self.get(arr).ok()?.array.as_ref()?.data.clone()
    }

    pub fn committed_float(&self, h: Handle, name: &str) -> Option<f32> {
        match self.get(h).ok()?.committed_param(name)? {
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Only `"sphere"` geometry is drawn or bounded; other subtypes are ignored.
    pub fn is_sphere_geometry(&self, geom: Handle) -> bool {
        self.get(geom).is_ok_and(|g| g.has_subtype("sphere"))
    }

    fn world_bounds(&self, world: Handle) -> Option<[f32; 6]> {
        let mut acc: Option<[f32; 6]> = None;
        for surface in self.committed_array_objects(world, "surface") {
            let Some(geom) = self
                .get(surface)
                .ok()
                .and_then(|s| s.committed_param("geometry"))
                .and_then(ParamValue::as_object)
                .filter(|g| self.is_sphere_geometry(*g))
            else {
                continue;
            };
            let radius = self.committed_float(geom, "radius").unwrap_or(0.0);
            let Some(ArrayData::Float32Vec3(positions)) =
                self.committed_array_data(geom, "vertex.position")
            else {
                continue;
            };
            for p in positions {
                let b = acc.get_or_insert([f32::MAX, f32::MAX, f32::MAX, f32::MIN, f32::MIN, f32::MIN]);
                for axis in 0..3 {
                    b[axis] = b[axis].min(p[axis] - radius);
                    b[axis + 3] = b[axis + 3].max(p[axis] + radius);
                }
            }
        }
        acc
    }
}
