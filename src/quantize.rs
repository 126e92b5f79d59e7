use std::collections::HashSet;

use image::{Rgba, RgbaImage};
use imagequant::{Attributes, RGBA};

use crate::error::Result;

/// Fixed so repeated runs pick the same palette.
const QUANTIZE_SPEED: i32 = 4;

/// Maps `image` onto a palette of at most `colors` entries.
///
/// Fully transparent input pixels come out as `[0, 0, 0, 0]` regardless of
/// which palette slot they were remapped to. No dithering is applied, which
/// keeps flat pixel-art regions flat.
pub fn quantize(image: &RgbaImage, colors: u32) -> Result<RgbaImage> {
    let (width, height) = image.dimensions();
    let pixels: Vec<RGBA> = image
        .pixels()
        .map(|pixel| {
            let [r, g, b, a] = pixel.0;
            if a == 0 {
                RGBA::new(0, 0, 0, 0)
            } else {
                RGBA::new(r, g, b, a)
            }
        })
        .collect();

    let mut attributes = Attributes::new();
    attributes.set_max_colors(colors)?;
    attributes.set_speed(QUANTIZE_SPEED)?;

    let mut source = attributes.new_image(pixels, width as usize, height as usize, 0.0)?;
    let mut result = attributes.quantize(&mut source)?;
    result.set_dithering_level(0.0)?;
    let (palette, indexed) = result.remapped(&mut source)?;

    let mut output = RgbaImage::new(width, height);
    for ((pixel, original), &slot) in output.pixels_mut().zip(image.pixels()).zip(&indexed) {
        *pixel = if original[3] == 0 {
            Rgba([0, 0, 0, 0])
        } else {
            let entry = palette[usize::from(slot)];
            Rgba([entry.r, entry.g, entry.b, entry.a])
        };
    }

    Ok(output)
}

/// Distinct colours among pixels that are not fully transparent.
pub fn opaque_palette_size(image: &RgbaImage) -> usize {
    image
        .pixels()
        .filter(|pixel| pixel[3] != 0)
        .map(|pixel| pixel.0)
        .collect::<HashSet<_>>()
        .len()
}
