use std::path::PathBuf;

use crate::{
    client::{Device, Handle, PropertyMut, WaitMode},
    config::HarnessConfig,
    encode_png,
    error::HarnessResult,
};

use super::poll::StopSignals;

const COLOR_CHANNEL: &str = "channel.color";

#[derive(Clone, Debug, PartialEq)]
pub struct FrameRecord {
    pub index: u32,
    /// Reported `"duration"` property; 0 if the device did not report one.
    pub duration_secs: f32,
    /// File written for this frame.
    pub output: Option<PathBuf>,
}

/// Raises every stop flag when dropped, so the pollers end even if the loop fails or panics.
struct RaiseOnDrop<'a>(&'a StopSignals);

impl Drop for RaiseOnDrop<'_> {
    fn drop(&mut self) {
        self.0.raise_all();
    }
}

/// Render `cfg.frame_count` frames of `frame`, writing each one when output is enabled.
pub fn run_render_loop(
    device: &dyn Device,
    frame: Handle,
    cfg: &HarnessConfig,
    signals: &StopSignals,
) -> HarnessResult<Vec<FrameRecord>> {
    let _stop = RaiseOnDrop(signals);
    let mut frames = Vec::with_capacity(cfg.frame_count as usize);
    for index in 0..cfg.frame_count {
        frames.push(render_one(device, frame, index, cfg)?);
    }
    Ok(frames)
}

fn render_one(
    device: &dyn Device,
    frame: Handle,
    index: u32,
    cfg: &HarnessConfig,
) -> HarnessResult<FrameRecord> {
    device.render(frame);
    device.wait(frame);

    let mut duration_secs = 0.0f32;
    device.get_property(
        frame,
        "duration",
        PropertyMut::Float32(&mut duration_secs),
        WaitMode::NoWait,
    );
    println!("rendered frame in {:.6}ms", duration_secs * 1000.0);
    tracing::debug!(index, duration_secs, "frame rendered");

    let Some(path) = cfg.output_path(index) else {
        return Ok(FrameRecord {
            index,
            duration_secs,
            output: None,
        });
    };

    let Some(mapped) = device.map_frame(frame, COLOR_CHANNEL) else {
        tracing::warn!(index, "color channel could not be mapped, frame not written");
        return Ok(FrameRecord {
            index,
            duration_secs,
            output: None,
        });
    };
    let written = encode_png::write_rgba8_png(
        &path,
        mapped.width,
        mapped.height,
        &mapped.pixels,
        mapped.row_stride,
        true,
    );
    drop(mapped);
    device.unmap_frame(frame, COLOR_CHANNEL);
    written?;

    println!("Output: {}", path.display());
    Ok(FrameRecord {
        index,
        duration_secs,
        output: Some(path),
    })
}
