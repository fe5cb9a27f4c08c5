use std::borrow::Cow;
use std::io::Cursor;

use candle_core::{DType, Device, Tensor};
use image::{imageops::FilterType, DynamicImage, ImageReader, RgbImage};

use crate::error::VqaError;

/// Configuration of the pixel preprocessing applied before the vision tower.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImagePreprocessConfig {
    /// Side of the square input image expected by the model.
    pub image_size: u32,
    /// Factor mapping the u8 range to [0, 1].
    pub rescale_factor: f64,
    /// Mean subtracted after rescaling, shared by all channels.
    pub image_mean: f64,
    /// Standard deviation divided after the mean subtraction, shared by all channels.
    pub image_std: f64,
}

impl ImagePreprocessConfig {
    /// Scale and offset of the affine map equivalent to rescale then normalize.
    fn affine_coefficients(&self) -> (f64, f64) {
        (
            self.rescale_factor / self.image_std,
            -self.image_mean / self.image_std,
        )
    }
}

/// Decode an in-memory encoded image, guessing the format from its content.
///
/// # Arguments
///
/// * `bytes` - The raw bytes of a png, jpeg, gif, webp or bmp file.
///
/// # Returns
///
/// The decoded image in whatever color layout the file stores.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, VqaError> {
    let image = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()?;
    Ok(image)
}

/// Make sure the image is 8-bit rgb, converting it otherwise.
///
/// Images that are already rgb8 are returned as is without copying the pixels.
pub fn ensure_rgb(image: DynamicImage) -> RgbImage {
    match image {
        DynamicImage::ImageRgb8(rgb) => rgb,
        other => {
            log::debug!("Converting {:?} image to rgb8", other.color());
            other.to_rgb8()
        }
    }
}

/// Convert an rgb image into the normalized pixel tensor of shape [1, 3, S, S].
///
/// # Arguments
///
/// * `image` - The rgb8 image with shape [H, W, 3].
/// * `config` - The preprocessing configuration of the model.
/// * `dtype` - The dtype of the model weights.
/// * `device` - The device the model lives on.
pub fn to_pixel_values(
    image: &RgbImage,
    config: &ImagePreprocessConfig,
    dtype: DType,
    device: &Device,
) -> Result<Tensor, VqaError> {
    let size = config.image_size;

    let resized = if image.dimensions() == (size, size) {
        Cow::Borrowed(image)
    } else {
        Cow::Owned(image::imageops::resize(
            image,
            size,
            size,
            FilterType::Triangle,
        ))
    };

    let (scale, offset) = config.affine_coefficients();

    // convert to tensor with shape [1, 3, S, S]
    let pixel_values = Tensor::from_raw_buffer(
        resized.as_raw(),
        DType::U8,
        &[size as usize, size as usize, 3],
        device,
    )?
    .to_dtype(dtype)?
    .permute((2, 0, 1))?
    .affine(scale, offset)?
    .unsqueeze(0)?;

    Ok(pixel_values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageBuffer, ImageFormat, Luma, Rgb, Rgba, RgbaImage};

    const CONFIG: ImagePreprocessConfig = ImagePreprocessConfig {
        image_size: 4,
        rescale_factor: 1.0 / 255.0,
        image_mean: 0.5,
        image_std: 0.5,
    };

    fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    #[test]
    fn decode_png_and_jpeg() -> Result<(), VqaError> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 6, Rgb([10, 20, 30])));

        let png = decode_image(&encode(&image, ImageFormat::Png))?;
        assert_eq!((png.width(), png.height()), (8, 6));

        let jpeg = decode_image(&encode(&image, ImageFormat::Jpeg))?;
        assert_eq!((jpeg.width(), jpeg.height()), (8, 6));
        Ok(())
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(decode_image(&[]), Err(VqaError::ImageDecode(_))));
        assert!(matches!(
            decode_image(b"definitely not an image"),
            Err(VqaError::ImageDecode(_))
        ));

        // a png signature followed by nothing useful
        let truncated = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0];
        assert!(decode_image(&truncated).is_err());
    }

    #[test]
    fn ensure_rgb_converts_gray_rgba_and_16_bit() {
        let gray = DynamicImage::ImageLuma8(GrayImage::from_pixel(3, 2, Luma([7])));
        let rgb = ensure_rgb(gray);
        assert_eq!(rgb.dimensions(), (3, 2));
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([7, 7, 7]));

        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 0])));
        let rgb = ensure_rgb(rgba);
        assert_eq!(rgb.get_pixel(1, 1), &Rgb([1, 2, 3]));

        let rgb16: ImageBuffer<Rgb<u16>, Vec<u16>> =
            ImageBuffer::from_pixel(3, 3, Rgb([u16::MAX, 0, 32896]));
        let rgb = ensure_rgb(DynamicImage::ImageRgb16(rgb16));
        assert_eq!(rgb.dimensions(), (3, 3));
        assert_eq!(rgb.get_pixel(2, 2), &Rgb([255, 0, 128]));
    }

    #[test]
    fn ensure_rgb_passes_rgb_through() {
        let mut original = RgbImage::new(2, 2);
        original.put_pixel(1, 0, Rgb([200, 100, 50]));
        let rgb = ensure_rgb(DynamicImage::ImageRgb8(original.clone()));
        assert_eq!(rgb, original);
    }

    #[test]
    fn pixel_values_shape_and_range() -> Result<(), VqaError> {
        let mut image = RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]));
        image.put_pixel(0, 0, Rgb([255, 255, 255]));

        let pixel_values = to_pixel_values(&image, &CONFIG, DType::F32, &Device::Cpu)?;
        assert_eq!(pixel_values.dims(), &[1, 3, 4, 4]);

        let values = pixel_values.flatten_all()?.to_vec1::<f32>()?;
        assert!((values[0] - 1.0).abs() < 1e-6);
        assert!((values[1] + 1.0).abs() < 1e-6);
        assert!(values.iter().all(|v| (-1.0..=1.0).contains(v)));
        Ok(())
    }

    #[test]
    fn pixel_values_resize_to_square() -> Result<(), VqaError> {
        let image = RgbImage::from_pixel(13, 7, Rgb([128, 64, 32]));
        let pixel_values = to_pixel_values(&image, &CONFIG, DType::F32, &Device::Cpu)?;
        assert_eq!(pixel_values.dims(), &[1, 3, 4, 4]);
        Ok(())
    }
}
