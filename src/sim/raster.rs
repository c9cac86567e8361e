//! Splat rasterizer backing the simulated device's `render`.
//!
//! Spheres are projected through a pinhole camera, sorted far to near and drawn as shaded discs.
//! Row 0 of the output is the bottom row.

use glam::{Vec3, Vec4};
use rayon::prelude::*;

#[derive(Clone, Debug)]
pub(crate) struct CameraInputs {
    pub position: Vec3,
    pub direction: Vec3,
    pub up: Vec3,
    /// Vertical field of view in radians.
    pub fovy: f32,
}

impl Default for CameraInputs {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            direction: Vec3::NEG_Z,
            up: Vec3::Y,
            fovy: std::f32::consts::FRAC_PI_3,
        }
    }
}

/// Base colour source of a surface's material.
#[derive(Clone, Debug)]
pub(crate) enum SurfaceColor {
    Constant(Vec3),
    /// Linear ramp sampled by the per-sphere attribute.
    Ramp(Vec<Vec3>),
}

impl SurfaceColor {
    fn sample(&self, t: Option<f32>) -> Vec3 {
        match self {
            Self::Constant(c) => *c,
            Self::Ramp(texels) => sample_ramp(texels, t.unwrap_or(0.0)),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct SurfaceInputs {
    pub positions: Vec<[f32; 3]>,
    pub indices: Option<Vec<u32>>,
    pub attributes: Option<Vec<f32>>,
    pub radius: f32,
    pub color: SurfaceColor,
}

#[derive(Clone, Debug)]
pub(crate) struct RenderInputs {
    pub width: u32,
    pub height: u32,
    /// Linear RGBA.
    pub background: [f32; 4],
    pub camera: CameraInputs,
    /// Direction light travels in.
    pub light_direction: Vec3,
    pub surfaces: Vec<SurfaceInputs>,
}

#[derive(Clone, Copy, Debug)]
struct Splat {
    cx: f32,
    cy: f32,
    radius_px: f32,
    depth: f32,
    color: Vec3,
}

/// Linear interpolation over `texels`, `t` clamped to `[0, 1]`.
pub(crate) fn sample_ramp(texels: &[Vec3], t: f32) -> Vec3 {
    match texels.len() {
        0 => Vec3::ONE,
        1 => texels[0],
        n => {
            let x = t.clamp(0.0, 1.0) * (n - 1) as f32;
            let i = (x.floor() as usize).min(n - 2);
            let f = x - i as f32;
            texels[i].lerp(texels[i + 1], f)
        }
    }
}

pub(crate) fn linear_to_srgb8(c: f32) -> u8 {
    let c = c.clamp(0.0, 1.0);
    let s = if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    };
    (s * 255.0 + 0.5) as u8
}

/// Render to sRGB-encoded RGBA8.
pub(crate) fn rasterize(inputs: &RenderInputs) -> Vec<u8> {
    let (w, h) = (inputs.width as usize, inputs.height as usize);
    let mut color = vec![Vec4::from_array(inputs.background); w * h];

    let mut splats = project(inputs);
    splats.par_sort_unstable_by(|a, b| b.depth.total_cmp(&a.depth));

    let forward = inputs.camera.direction.normalize_or(Vec3::NEG_Z);
    let right = forward.cross(inputs.camera.up).normalize_or(Vec3::X);
    let up = right.cross(forward);
    let l = inputs.light_direction.normalize_or(Vec3::NEG_Z);
    // light direction in camera space (x right, y up, z toward the viewer)
    let to_light = -Vec3::new(l.dot(right), l.dot(up), -l.dot(forward));

    for s in &splats {
        let x0 = (s.cx - s.radius_px).floor().max(0.0) as usize;
        let y0 = (s.cy - s.radius_px).floor().max(0.0) as usize;
        let x1 = ((s.cx + s.radius_px).ceil() as usize).min(w);
        let y1 = ((s.cy + s.radius_px).ceil() as usize).min(h);
        for y in y0..y1 {
            for x in x0..x1 {
                let dx = (x as f32 + 0.5 - s.cx) / s.radius_px;
                let dy = (y as f32 + 0.5 - s.cy) / s.radius_px;
                let d2 = dx * dx + dy * dy;
                if d2 > 1.0 {
                    continue;
                }
                let normal = Vec3::new(dx, dy, (1.0 - d2).sqrt());
                let lambert = normal.dot(to_light).max(0.0);
                color[y * w + x] = (s.color * (0.2 + 0.8 * lambert)).extend(1.0);
            }
        }
    }

    let mut out = Vec::with_capacity(w * h * 4);
    for c in color {
        out.extend_from_slice(&[
            linear_to_srgb8(c.x),
            linear_to_srgb8(c.y),
            linear_to_srgb8(c.z),
            (c.w.clamp(0.0, 1.0) * 255.0 + 0.5) as u8,
        ]);
    }
    out
}

fn project(inputs: &RenderInputs) -> Vec<Splat> {
    let cam = &inputs.camera;
    let forward = cam.direction.normalize_or(Vec3::NEG_Z);
    let right = forward.cross(cam.up).normalize_or(Vec3::X);
    let up = right.cross(forward);
    let (w, h) = (inputs.width as f32, inputs.height as f32);
    let tan_half = (cam.fovy * 0.5).tan();
    let aspect = w / h;

    inputs
        .surfaces
        .par_iter()
        .flat_map(move |surface| {
            let count = surface
                .indices
                .as_ref()
                .map_or(surface.positions.len(), Vec::len);
            (0..count).into_par_iter().filter_map(move |i| {
                let idx = match &surface.indices {
                    Some(ix) => ix[i] as usize,
                    None => i,
                };
                let p = Vec3::from_array(*surface.positions.get(idx)?);
                let rel = p - cam.position;
                let z = rel.dot(forward);
                if z <= 1e-4 {
                    return None;
                }
                let ndc_x = rel.dot(right) / (z * tan_half * aspect);
                let ndc_y = rel.dot(up) / (z * tan_half);
                let radius_px = surface.radius / (z * tan_half) * h * 0.5;
                let cx = (ndc_x * 0.5 + 0.5) * w;
                let cy = (ndc_y * 0.5 + 0.5) * h;
                if cx + radius_px < 0.0
                    || cy + radius_px < 0.0
                    || cx - radius_px > w
                    || cy - radius_px > h
                {
                    return None;
                }
                let attr = surface.attributes.as_ref().and_then(|a| a.get(idx).copied());
                Some(Splat {
                    cx,
                    cy,
                    radius_px: radius_px.max(0.5),
                    depth: z,
                    color: surface.color.sample(attr),
                })
            })
        })
        .collect()
}
