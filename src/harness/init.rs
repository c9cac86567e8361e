//! The four object initializers. Each touches only its own top-level handle and ends with one
//! commit of it.

use crate::{
    client::{ArrayData, DataType, Device, Handle, ObjectKind, ParamValue},
    scene::{COLOR_RAMP, SceneConfig, generate_samples},
};

/// Map `array`, let `fill` write into it, and unmap. Skipped if the map failed.
fn fill_array(device: &dyn Device, array: Handle, fill: impl FnOnce(&mut ArrayData)) {
    if let Some(mut data) = device.map_array(array) {
        fill(&mut data);
        device.unmap_array(array, data);
    }
}

fn copy_into<T: Copy>(dst: Option<&mut Vec<T>>, src: &[T]) {
    if let Some(dst) = dst {
        for (d, s) in dst.iter_mut().zip(src) {
            *d = *s;
        }
    }
}

/// Build the sphere cloud, its colour ramp, material, surface and light, and commit `world`.
pub fn initialize_world(device: &dyn Device, world: Handle, scene: &SceneConfig) {
    let samples = generate_samples(scene);
    let n = samples.positions.len();

    let indices = device.new_array1d(DataType::UInt32, n);
    let positions = device.new_array1d(DataType::Float32Vec3, n);
    let distances = device.new_array1d(DataType::Float32, n);
    fill_array(device, positions, |d| copy_into(d.as_vec3_mut(), &samples.positions));
    fill_array(device, distances, |d| copy_into(d.as_f32_mut(), &samples.attributes));
    fill_array(device, indices, |d| copy_into(d.as_u32_mut(), &samples.indices));

    let geometry = device.new_object(ObjectKind::Geometry, Some("sphere"));
    device.set_and_release_parameter(geometry, "primitive.index", indices);
    device.set_and_release_parameter(geometry, "vertex.position", positions);
    device.set_and_release_parameter(geometry, "vertex.attribute0", distances);
    device.set_parameter(geometry, "radius", scene.radius.into());
    device.commit_parameters(geometry);

    let texels = device.new_array1d(DataType::Float32Vec3, COLOR_RAMP.len());
    fill_array(device, texels, |d| copy_into(d.as_vec3_mut(), &COLOR_RAMP));

    let sampler = device.new_object(ObjectKind::Sampler, Some("image1D"));
    device.set_and_release_parameter(sampler, "image", texels);
    device.set_parameter(sampler, "filter", "linear".into());
    device.commit_parameters(sampler);

    let material = device.new_object(ObjectKind::Material, Some("matte"));
    device.set_and_release_parameter(material, "color", sampler);
    device.commit_parameters(material);

    let surface = device.new_object(ObjectKind::Surface, None);
    device.set_and_release_parameter(surface, "geometry", geometry);
    device.set_and_release_parameter(surface, "material", material);
    device.commit_parameters(surface);

    let surfaces = device.new_array1d(DataType::Surface, 1);
    fill_array(device, surfaces, |d| {
        if let Some(handles) = d.as_objects_mut() {
            handles.push(surface);
        }
    });
    device.set_and_release_parameter(world, "surface", surfaces);
    device.release(surface);

    let light = device.new_object(ObjectKind::Light, Some("directional"));
    device.set_parameter_array1d(
        world,
        "light",
        ArrayData::Objects(DataType::Light, vec![light]),
    );
    device.release(light);

    device.commit_parameters(world);
    tracing::debug!(%world, spheres = n, "world committed");
}

pub fn initialize_renderer(device: &dyn Device, renderer: Handle) {
    device.set_parameter(renderer, "background", [0.1f32, 0.1, 0.1, 1.0].into());
    device.set_parameter(renderer, "pixelSamples", 1i32.into());
    device.commit_parameters(renderer);
}

pub fn initialize_camera(device: &dyn Device, camera: Handle) {
    device.set_parameter(camera, "position", [1.5f32, 1.68, 1.5].into());
    device.set_parameter(camera, "direction", [0.0f32, 0.0, -1.0].into());
    device.set_parameter(camera, "up", [0.0f32, 1.0, 0.0].into());
    device.commit_parameters(camera);
}

/// `world`, `renderer` and `camera` only need to exist here, not to be committed.
pub fn initialize_frame(
    device: &dyn Device,
    frame: Handle,
    size: [u32; 2],
    world: Handle,
    renderer: Handle,
    camera: Handle,
) {
    device.set_parameter(frame, "size", size.into());
    device.set_parameter(
        frame,
        "channel.color",
        ParamValue::DataType(DataType::UFixed8RgbaSrgb),
    );
    device.set_parameter(frame, "world", world.into());
    device.set_parameter(frame, "renderer", renderer.into());
    device.set_parameter(frame, "camera", camera.into());
    device.commit_parameters(frame);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        client::{Library as _, PropertyMut, StatusLog, WaitMode},
        sim::{SimConfig, SimDevice, SimLibrary},
    };

    fn sim_device() -> (Arc<SimLibrary>, Arc<SimDevice>, StatusLog) {
        let log = StatusLog::new();
        let lib = Arc::new(SimLibrary::load("sim", log.callback(), SimConfig::default()));
        lib.new_device("default").unwrap();
        let device = lib.devices().remove(0);
        (lib, device, log)
    }

    fn small_scene() -> SceneConfig {
        SceneConfig {
            sample_count: 64,
            ..SceneConfig::default()
        }
    }

    #[test]
    fn committed_world_reports_finite_bounds_around_the_cloud() {
        let (_lib, d, log) = sim_device();
        let world = d.new_object(ObjectKind::World, None);
        initialize_world(&*d, world, &small_scene());

        let mut b = [1e30, 1e30, 1e30, -1e30, -1e30, -1e30];
        assert!(d.get_property(world, "bounds", PropertyMut::Bounds(&mut b), WaitMode::Wait));
        assert!(b.iter().all(|v| v.is_finite() && v.abs() < 10.0), "{b:?}");
        assert!(b[0] < 1.5 && b[3] > 1.5);
        assert!(b[1] < 1.5 && b[4] > 1.5);
        assert!(log.reports().is_empty(), "{:?}", log.reports());

        // only the world itself is still referenced by the caller
        d.release(world);
        assert_eq!(d.live_objects(), 0);
    }

    #[test]
    fn all_initializers_let_a_frame_render() {
        let (_lib, d, log) = sim_device();
        let world = d.new_object(ObjectKind::World, None);
        let renderer = d.new_object(ObjectKind::Renderer, Some("default"));
        let camera = d.new_object(ObjectKind::Camera, Some("perspective"));
        let frame = d.new_object(ObjectKind::Frame, None);

        initialize_frame(&*d, frame, [64, 32], world, renderer, camera);
        initialize_camera(&*d, camera);
        initialize_renderer(&*d, renderer);
        initialize_world(&*d, world, &small_scene());

        d.render(frame);
        d.wait(frame);
        let mapped = d.map_frame(frame, "channel.color").unwrap();
        assert_eq!((mapped.width, mapped.height), (64, 32));
        assert_eq!(mapped.pixels.len(), 64 * 32 * 4);
        d.unmap_frame(frame, "channel.color");
        assert!(log.reports().is_empty(), "{:?}", log.reports());
    }
}
