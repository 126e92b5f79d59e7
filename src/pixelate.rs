use image::RgbaImage;
use image::imageops::{self, FilterType};

use crate::error::{AppError, Result};

/// `round(dim / factor)` for both axes; a zero-sized result is an error.
pub fn target_dimensions(width: u32, height: u32, factor: f64) -> Result<(u32, u32)> {
    // Also rejects NaN.
    if !(factor >= 1.0) || !factor.is_finite() {
        return Err(AppError::InvalidConfig(format!(
            "downscale factor must be at least 1, got {factor}"
        )));
    }

    let scale = |dim: u32| (f64::from(dim) / factor).round() as u32;
    let (target_width, target_height) = (scale(width), scale(height));

    if target_width == 0 || target_height == 0 {
        return Err(AppError::ZeroSizedFrame {
            width,
            height,
            factor,
        });
    }

    Ok((target_width, target_height))
}

/// Nearest-neighbour downscale so pixel edges stay hard.
pub fn pixelate(image: &RgbaImage, factor: f64) -> Result<RgbaImage> {
    let (width, height) = target_dimensions(image.width(), image.height(), factor)?;
    if (width, height) == image.dimensions() {
        return Ok(image.clone());
    }
    Ok(imageops::resize(image, width, height, FilterType::Nearest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn downscales_by_rounded_factor() {
        assert_eq!(target_dimensions(64, 64, 4.0).unwrap(), (16, 16));
        assert_eq!(target_dimensions(100, 50, 8.0).unwrap(), (13, 6));
        assert_eq!(target_dimensions(10, 10, 1.5).unwrap(), (7, 7));
    }

    #[test]
    fn rejects_factors_below_one() {
        for factor in [0.0, -2.0, 0.5, f64::NAN, f64::INFINITY] {
            let err = target_dimensions(64, 64, factor).unwrap_err();
            assert!(matches!(err, AppError::InvalidConfig(_)), "factor {factor}");
        }
        assert!(pixelate(&RgbaImage::new(8, 8), 0.0).is_err());
    }

    #[test]
    fn factor_one_is_identity() {
        let image = RgbaImage::from_fn(5, 3, |x, y| Rgba([x as u8, y as u8, 7, 255]));
        let output = pixelate(&image, 1.0).expect("pixelate");
        assert_eq!(output, image);
    }

    #[test]
    fn zero_sized_result_fails() {
        let err = pixelate(&RgbaImage::new(3, 40), 8.0).unwrap_err();
        assert!(matches!(err, AppError::ZeroSizedFrame { width: 3, .. }));
    }

    #[test]
    fn nearest_neighbour_introduces_no_new_colors() {
        let image = RgbaImage::from_fn(16, 16, |x, _| {
            if x < 8 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 0])
            }
        });

        let output = pixelate(&image, 4.0).expect("pixelate");
        assert_eq!(output.dimensions(), (4, 4));
        for pixel in output.pixels() {
            assert!(*pixel == Rgba([255, 0, 0, 255]) || *pixel == Rgba([0, 0, 255, 0]));
        }
    }
}
