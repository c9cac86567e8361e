use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

/// Object categories a device can allocate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    World,
    Renderer,
    Camera,
    Frame,
    Geometry,
    Material,
    Sampler,
    Surface,
    Light,
    Array1D,
}

impl ObjectKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::World => "World",
            Self::Renderer => "Renderer",
            Self::Camera => "Camera",
            Self::Frame => "Frame",
            Self::Geometry => "Geometry",
            Self::Material => "Material",
            Self::Sampler => "Sampler",
            Self::Surface => "Surface",
            Self::Light => "Light",
            Self::Array1D => "Array1D",
        }
    }
}

/// Opaque, reference-counted object identifier. Counting lives on the device side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle {
    pub id: u64,
    pub kind: ObjectKind,
}

impl Handle {
    pub fn new(id: u64, kind: ObjectKind) -> Self {
        Self { id, kind }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind.name(), self.id)
    }
}

/// Element and parameter data types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    UInt32,
    Float32,
    Float32Vec3,
    Surface,
    Light,
    UFixed8RgbaSrgb,
}

impl DataType {
    /// Object kind stored by object-array element types.
    pub fn object_kind(self) -> Option<ObjectKind> {
        match self {
            Self::Surface => Some(ObjectKind::Surface),
            Self::Light => Some(ObjectKind::Light),
            _ => None,
        }
    }
}

/// Typed 1D array storage, moved out by `map_array` and back in by `unmap_array`.
#[derive(Clone, Debug, PartialEq)]
pub enum ArrayData {
    UInt32(Vec<u32>),
    Float32(Vec<f32>),
    Float32Vec3(Vec<[f32; 3]>),
    Objects(DataType, Vec<Handle>),
}

impl ArrayData {
    /// Zero-initialized storage for `count` elements of `elem`.
    pub fn zeroed(elem: DataType, count: usize) -> Option<Self> {
        match elem {
            DataType::UInt32 => Some(Self::UInt32(vec![0; count])),
            DataType::Float32 => Some(Self::Float32(vec![0.0; count])),
            DataType::Float32Vec3 => Some(Self::Float32Vec3(vec![[0.0; 3]; count])),
            DataType::Surface | DataType::Light => {
                Some(Self::Objects(elem, Vec::with_capacity(count)))
            }
            DataType::UFixed8RgbaSrgb => None,
        }
    }

    pub fn element_type(&self) -> DataType {
        match self {
            Self::UInt32(_) => DataType::UInt32,
            Self::Float32(_) => DataType::Float32,
            Self::Float32Vec3(_) => DataType::Float32Vec3,
            Self::Objects(t, _) => *t,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::UInt32(v) => v.len(),
            Self::Float32(v) => v.len(),
            Self::Float32Vec3(v) => v.len(),
            Self::Objects(_, v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_u32_mut(&mut self) -> Option<&mut Vec<u32>> {
        match self {
            Self::UInt32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f32_mut(&mut self) -> Option<&mut Vec<f32>> {
        match self {
            Self::Float32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_vec3_mut(&mut self) -> Option<&mut Vec<[f32; 3]>> {
        match self {
            Self::Float32Vec3(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_objects_mut(&mut self) -> Option<&mut Vec<Handle>> {
        match self {
            Self::Objects(_, v) => Some(v),
            _ => None,
        }
    }

    /// Handles referenced by an object array; empty for plain data.
    pub fn object_refs(&self) -> &[Handle] {
        match self {
            Self::Objects(_, v) => v,
            _ => &[],
        }
    }
}

/// A single parameter value.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Int(i32),
    Float(f32),
    UInt2([u32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Str(String),
    Object(Handle),
    DataType(DataType),
}

impl ParamValue {
    pub fn as_object(&self) -> Option<Handle> {
        match self {
            Self::Object(h) => Some(*h),
            _ => None,
        }
    }
}

impl From<f32> for ParamValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<[u32; 2]> for ParamValue {
    fn from(v: [u32; 2]) -> Self {
        Self::UInt2(v)
    }
}

impl From<[f32; 3]> for ParamValue {
    fn from(v: [f32; 3]) -> Self {
        Self::Vec3(v)
    }
}

impl From<[f32; 4]> for ParamValue {
    fn from(v: [f32; 4]) -> Self {
        Self::Vec4(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<Handle> for ParamValue {
    fn from(v: Handle) -> Self {
        Self::Object(v)
    }
}

impl From<DataType> for ParamValue {
    fn from(v: DataType) -> Self {
        Self::DataType(v)
    }
}

/// Property query mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitMode {
    /// Return immediately with whatever is available.
    NoWait,
    /// Block until the value is available or known never to be.
    Wait,
}

/// Destination of a property query. Left untouched when the value is unavailable.
#[derive(Debug)]
pub enum PropertyMut<'a> {
    Bounds(&'a mut [f32; 6]),
    Float32(&'a mut f32),
}

/// Read-only view of a mapped frame channel.
///
/// Row 0 is the bottom row of the image.
#[derive(Clone, Debug)]
pub struct MappedFrame {
    pub width: u32,
    pub height: u32,
    /// Bytes per row.
    pub row_stride: usize,
    pub pixels: Arc<[u8]>,
}
