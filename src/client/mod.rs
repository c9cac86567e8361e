//! Interface to a handle-based scene/rendering library.
//!
//! The harness only talks to the collaborator through [`Library`] and [`Device`]. Device
//! operations never return errors: failures are delivered to the [`StatusCallback`] the library
//! was loaded with, and the harness does not recover from them.

pub mod registry;
pub mod status;
pub mod types;

use std::sync::Arc;

use crate::error::HarnessResult;

pub use registry::{LIBRARY_ENV_VAR, load_library, resolve_library_name};
pub use status::{
    FatalAction, StatusCallback, StatusClass, StatusLog, StatusReport, StatusSeverity,
    format_status, stderr_status_callback,
};
pub use types::{
    ArrayData, DataType, Handle, MappedFrame, ObjectKind, ParamValue, PropertyMut, WaitMode,
};

/// A loaded implementation library.
pub trait Library: Send + Sync {
    fn name(&self) -> &str;

    /// Extension names supported by devices of `subtype`. Empty for unknown subtypes.
    fn device_extensions(&self, subtype: &str) -> &[String];

    fn new_device(&self, subtype: &str) -> HarnessResult<Arc<dyn Device>>;

    fn unload(&self);
}

/// A device session. Shared by every harness thread at once; any locking is internal.
pub trait Device: Send + Sync {
    /// Allocate an uncommitted object.
    fn new_object(&self, kind: ObjectKind, subtype: Option<&str>) -> Handle;

    /// Allocate an array of `count` elements.
    fn new_array1d(&self, elem: DataType, count: usize) -> Handle;

    /// Move the array's storage out for exclusive writing.
    fn map_array(&self, array: Handle) -> Option<ArrayData>;

    /// Hand storage taken by [`Device::map_array`] back to the array.
    fn unmap_array(&self, array: Handle, data: ArrayData);

    fn set_parameter(&self, object: Handle, name: &str, value: ParamValue);

    /// Set an object-valued parameter and drop the caller's reference to `value`.
    fn set_and_release_parameter(&self, object: Handle, name: &str, value: Handle) {
        self.set_parameter(object, name, ParamValue::Object(value));
        self.release(value);
    }

    /// Create an array from `data` and bind it as `name`.
    fn set_parameter_array1d(&self, object: Handle, name: &str, data: ArrayData);

    /// Make pending parameters visible to readers and renders.
    fn commit_parameters(&self, object: Handle);

    /// Query a property into `out`. Returns whether `out` was written.
    fn get_property(&self, object: Handle, name: &str, out: PropertyMut<'_>, mode: WaitMode)
    -> bool;

    fn render(&self, frame: Handle);

    /// Block until the last render of `frame` completed.
    fn wait(&self, frame: Handle);

    fn map_frame(&self, frame: Handle, channel: &str) -> Option<MappedFrame>;

    fn unmap_frame(&self, frame: Handle, channel: &str);

    /// Drop one reference. The object is destroyed at zero.
    fn release(&self, object: Handle);

    fn release_device(&self);
}

/// Whether `library` advertises `ext_name` for devices of `subtype`.
pub fn device_has_extension(library: &dyn Library, subtype: &str, ext_name: &str) -> bool {
    library
        .device_extensions(subtype)
        .iter()
        .any(|e| e == ext_name)
}
