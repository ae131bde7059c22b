use image::RgbImage;
use ndarray::ArrayView3;

use crate::{
    error::{MaeError, Result},
    preprocess::{IMAGENET_MEAN, IMAGENET_STD, RGB_CHANNELS},
};


/// Inverts the ImageNet normalization of an HWC array into an 8-bit image.
pub fn to_rgb_image(array: ArrayView3<'_, f32>) -> Result<RgbImage> {
    let (height, width, channels) = array.dim();
    if channels != RGB_CHANNELS {
        return Err(MaeError::ChannelCount {
            expected: RGB_CHANNELS,
            actual: channels,
        });
    }

    Ok(RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let pixel = array.slice(ndarray::s![y as usize, x as usize, ..]);
        image::Rgb([
            denormalize(pixel[0], 0),
            denormalize(pixel[1], 1),
            denormalize(pixel[2], 2),
        ])
    }))
}

/// `clamp((value * std + mean) * 255, 0, 255)`, truncated.
pub fn denormalize(value: f32, channel: usize) -> u8 {
    ((value * IMAGENET_STD[channel] + IMAGENET_MEAN[channel]) * 255.0).clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use image::{DynamicImage, Rgb};
    use ndarray::Array3;

    use super::*;
    use crate::preprocess::{normalize, preprocess};

    #[test]
    fn round_trips_pixels_within_one_level() {
        for channel in 0..3 {
            for value in 0..=255u8 {
                let restored = denormalize(normalize(value, channel), channel);
                assert!(
                    (restored as i16 - value as i16).abs() <= 1,
                    "channel {channel}: {value} -> {restored}"
                );
            }
        }
    }

    #[test]
    fn clamps_out_of_range_values() {
        assert_eq!(denormalize(100.0, 0), 255);
        assert_eq!(denormalize(-100.0, 2), 0);
    }

    #[test]
    fn restores_a_preprocessed_image() {
        let source = image::RgbImage::from_fn(8, 8, |x, y| Rgb([x as u8 * 30, y as u8 * 30, 200]));
        let array = preprocess(&DynamicImage::ImageRgb8(source.clone()), 8).unwrap();

        let restored = to_rgb_image(array.view()).unwrap();

        assert_eq!(restored.dimensions(), (8, 8));
        for (lhs, rhs) in restored.pixels().zip(source.pixels()) {
            for c in 0..3 {
                assert!((lhs[c] as i16 - rhs[c] as i16).abs() <= 1);
            }
        }
    }

    #[test]
    fn rejects_non_rgb_arrays() {
        let array = Array3::<f32>::zeros((4, 4, 4));
        assert!(matches!(
            to_rgb_image(array.view()),
            Err(MaeError::ChannelCount { actual: 4, .. })
        ));
    }
}
