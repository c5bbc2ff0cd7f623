use anyhow::{anyhow, Result};

use crate::frame::PixelFormat;

/// Buffer length a frame of the given size and format must have.
pub(crate) fn expected_len(width: u32, height: u32, format: PixelFormat) -> Result<usize> {
    let pixels = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| anyhow!("{:?} frame dimensions overflow", format))?;
    let len = match format {
        PixelFormat::Rgb24 => pixels.checked_mul(3),
        PixelFormat::Nv12 => pixels.checked_add(pixels / 2),
    };
    len.ok_or_else(|| anyhow!("{:?} frame dimensions overflow", format))
}

pub(crate) fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    let expected = expected_len(width, height, format)?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "{:?} frame length mismatch: expected {}, got {}",
            format,
            expected,
            pixels.len()
        ));
    }
    match format {
        PixelFormat::Rgb24 => Ok(pixels.to_vec()),
        PixelFormat::Nv12 => Ok(nv12_to_rgb(pixels, width as usize, height as usize)),
    }
}

/// Convert a full-range NV12 buffer whose length has already been checked.
fn nv12_to_rgb(pixels: &[u8], w: usize, h: usize) -> Vec<u8> {
    let y_plane = w * h;
    let mut rgb = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i] as f32;
            let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
            let u = pixels[uv_index] as f32 - 128.0;
            let v = pixels[uv_index + 1] as f32 - 128.0;

            let r = y + 1.402_f32 * v;
            let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
            let b = y + 1.772_f32 * u;

            let offset = (j * w + i) * 3;
            rgb[offset] = clamp_to_u8(r);
            rgb[offset + 1] = clamp_to_u8(g);
            rgb[offset + 2] = clamp_to_u8(b);
        }
    }
    rgb
}

/// Convert packed RGB to NV12. Used by the synthetic camera to emit native-format frames.
pub(crate) fn rgb_to_nv12(rgb: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    if w % 2 != 0 || h % 2 != 0 {
        return Err(anyhow!("NV12 requires even dimensions, got {}x{}", w, h));
    }
    let expected = expected_len(width, height, PixelFormat::Rgb24)?;
    if rgb.len() != expected {
        return Err(anyhow!(
            "RGB frame length mismatch: expected {}, got {}",
            expected,
            rgb.len()
        ));
    }

    let y_plane = w * h;
    let mut out = vec![0u8; y_plane + y_plane / 2];
    for j in 0..h {
        for i in 0..w {
            let offset = (j * w + i) * 3;
            let (r, g, b) = (
                rgb[offset] as f32,
                rgb[offset + 1] as f32,
                rgb[offset + 2] as f32,
            );
            out[j * w + i] = clamp_to_u8(0.299 * r + 0.587 * g + 0.114 * b);
            if j % 2 == 0 && i % 2 == 0 {
                let uv_index = y_plane + (j / 2) * w + i;
                out[uv_index] = clamp_to_u8(-0.168_736 * r - 0.331_264 * g + 0.5 * b + 128.0);
                out[uv_index + 1] = clamp_to_u8(0.5 * r - 0.418_688 * g - 0.081_312 * b + 128.0);
            }
        }
    }
    Ok(out)
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nv12_conversion_produces_gray() -> Result<()> {
        let y_plane = vec![128u8; 4];
        let uv_plane = vec![128u8; 2];
        let nv12 = [y_plane, uv_plane].concat();

        let rgb = normalize_to_rgb(&nv12, 2, 2, PixelFormat::Nv12)?;
        assert_eq!(rgb, vec![128u8; 12]);

        Ok(())
    }

    #[test]
    fn rgb_pass_through_validates_length() -> Result<()> {
        let pixels = vec![1u8; 9];
        let rgb = normalize_to_rgb(&pixels, 1, 3, PixelFormat::Rgb24)?;
        assert_eq!(rgb, pixels);
        assert!(normalize_to_rgb(&pixels, 2, 3, PixelFormat::Rgb24).is_err());
        Ok(())
    }

    #[test]
    fn gray_survives_nv12_encoding() -> Result<()> {
        let rgb = vec![200u8; 4 * 2 * 3];
        let nv12 = rgb_to_nv12(&rgb, 4, 2)?;
        assert_eq!(nv12.len(), 12);
        let back = normalize_to_rgb(&nv12, 4, 2, PixelFormat::Nv12)?;
        assert!(back.iter().all(|&p| (p as i16 - 200).abs() <= 1));
        Ok(())
    }

    #[test]
    fn odd_dimensions_cannot_be_nv12() {
        assert!(rgb_to_nv12(&[0u8; 9], 3, 1).is_err());
    }
}
