use image::{imageops::FilterType, DynamicImage};
use ndarray::Array3;

use crate::error::{MaeError, Result};

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

pub const RGB_CHANNELS: usize = 3;


/// Resizes `image` to `image_size` x `image_size` and normalizes it with the
/// ImageNet statistics.
///
/// Returns an HWC array. Images that do not carry exactly three color channels
/// after resizing (RGBA, grayscale) are rejected.
pub fn preprocess(image: &DynamicImage, image_size: usize) -> Result<Array3<f32>> {
    let size = image_size as u32;
    let resized = image.resize_exact(size, size, FilterType::CatmullRom);

    let channels = resized.color().channel_count() as usize;
    if channels != RGB_CHANNELS {
        return Err(MaeError::ChannelCount {
            expected: RGB_CHANNELS,
            actual: channels,
        });
    }

    let rgb = resized.to_rgb8();
    let (width, height) = rgb.dimensions();

    Ok(Array3::from_shape_fn(
        (height as usize, width as usize, RGB_CHANNELS),
        |(y, x, c)| normalize(rgb.get_pixel(x as u32, y as u32)[c], c),
    ))
}

pub fn normalize(value: u8, channel: usize) -> f32 {
    (value as f32 / 255.0 - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel]
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage, RgbaImage};

    use super::*;

    #[test]
    fn any_size_lands_on_the_working_resolution() {
        for (width, height) in [(500, 333), (224, 224), (17, 640), (1, 1)] {
            let image = DynamicImage::ImageRgb8(RgbImage::new(width, height));
            let array = preprocess(&image, 224).unwrap();

            assert_eq!(array.shape(), &[224, 224, 3]);
        }
    }

    #[test]
    fn rgba_is_rejected() {
        let image = DynamicImage::ImageRgba8(RgbaImage::new(32, 32));

        let err = preprocess(&image, 224).unwrap_err();
        assert!(matches!(
            err,
            MaeError::ChannelCount {
                expected: 3,
                actual: 4
            }
        ));
    }

    #[test]
    fn grayscale_is_rejected() {
        let image = DynamicImage::ImageLuma8(image::GrayImage::new(8, 8));

        assert!(matches!(
            preprocess(&image, 224),
            Err(MaeError::ChannelCount { actual: 1, .. })
        ));
    }

    #[test]
    fn normalizes_per_channel() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([255, 0, 128])));
        let array = preprocess(&image, 4).unwrap();

        assert!((array[[0, 0, 0]] - (1.0 - 0.485) / 0.229).abs() < 1e-5);
        assert!((array[[0, 0, 1]] - (0.0 - 0.456) / 0.224).abs() < 1e-5);
        assert!((array[[3, 3, 2]] - (128.0 / 255.0 - 0.406) / 0.225).abs() < 1e-5);
    }
}
