use std::path::Path;

use crate::error::{HarnessError, HarnessResult};

/// File name of frame `index`: `"{prefix}{index}.png"`.
pub fn output_file_name(prefix: &str, index: u32) -> String {
    format!("{prefix}{index}.png")
}

pub fn ensure_parent_dir(path: &Path) -> HarnessResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            HarnessError::encode(format!(
                "failed to create output directory '{}': {e}",
                parent.display()
            ))
        })?;
    }
    Ok(())
}

/// Write an RGBA8 buffer with `row_stride` bytes per row as a PNG.
///
/// With `flip_vertically` the last source row becomes the top row of the image.
pub fn write_rgba8_png(
    path: &Path,
    width: u32,
    height: u32,
    pixels: &[u8],
    row_stride: usize,
    flip_vertically: bool,
) -> HarnessResult<()> {
    if width == 0 || height == 0 {
        return Err(HarnessError::encode(format!(
            "cannot encode an empty {width}x{height} image"
        )));
    }
    let row_bytes = width as usize * 4;
    if row_stride < row_bytes {
        return Err(HarnessError::encode(format!(
            "row stride {row_stride} is smaller than {row_bytes} bytes per row"
        )));
    }
    let needed = row_stride * (height as usize - 1) + row_bytes;
    if pixels.len() < needed {
        return Err(HarnessError::encode(format!(
            "pixel buffer has {} bytes, {width}x{height} with stride {row_stride} needs {needed}",
            pixels.len()
        )));
    }

    let mut packed = Vec::with_capacity(row_bytes * height as usize);
    for y in 0..height as usize {
        let src_row = if flip_vertically {
            height as usize - 1 - y
        } else {
            y
        };
        let start = src_row * row_stride;
        packed.extend_from_slice(&pixels[start..start + row_bytes]);
    }

    ensure_parent_dir(path)?;
    image::save_buffer_with_format(
        path,
        &packed,
        width,
        height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .map_err(|e| HarnessError::encode(format!("write png '{}': {e}", path.display())))
}
