//! Frame type and image processing — decoding, grayscale conversion, bilinear resize.

use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, RgbImage};
use std::path::Path;

/// Channel count of every decoded frame (8-bit RGB, alpha dropped, gray expanded).
pub const FRAME_CHANNELS: u8 = 3;

// ITU-R BT.601 luma weights in 14-bit fixed point (sum = 1 << 14).
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;
const LUMA_SHIFT: u32 = 14;

/// A decoded colour image.
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
}

impl Frame {
    /// Decode an image file, sniffing the format from its content.
    ///
    /// Pixels are returned as stored; any EXIF orientation tag is ignored.
    pub fn load(path: &Path) -> Result<Self, FrameError> {
        Self::decode(path, false)
    }

    /// Decode an image file and turn it upright according to its EXIF
    /// orientation tag, so width and height are the displayed ones.
    pub fn load_oriented(path: &Path) -> Result<Self, FrameError> {
        Self::decode(path, true)
    }

    fn decode(path: &Path, apply_orientation: bool) -> Result<Self, FrameError> {
        let display = path.display().to_string();
        let decode_err = |source| FrameError::Decode { path: display.clone(), source };

        let reader = image::ImageReader::open(path)
            .map_err(|source| FrameError::Unreadable { path: display.clone(), source })?
            .with_guessed_format()
            .map_err(|source| FrameError::Unreadable { path: display.clone(), source })?;

        let mut decoder = reader.into_decoder().map_err(decode_err)?;
        let orientation = if apply_orientation {
            decoder.orientation().map_err(decode_err)?
        } else {
            Orientation::NoTransforms
        };
        let mut decoded = DynamicImage::from_decoder(decoder).map_err(decode_err)?;
        decoded.apply_orientation(orientation);

        let frame = Self::from_rgb(decoded.to_rgb8())?;
        tracing::debug!(
            path = %path.display(),
            width = frame.width(),
            height = frame.height(),
            ?orientation,
            "decoded image"
        );
        Ok(frame)
    }

    /// Wrap an already-decoded RGB buffer.
    pub fn from_rgb(image: RgbImage) -> Result<Self, FrameError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(FrameError::ZeroDimensions);
        }
        Ok(Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn channels(&self) -> u8 {
        FRAME_CHANNELS
    }

    /// Single-channel luma plane, row-major, `width * height` bytes.
    pub fn to_grayscale(&self) -> Vec<u8> {
        rgb_to_grayscale(self.image.as_raw())
    }
}

/// Convert packed RGB triplets to BT.601 luma, rounding to nearest.
pub fn rgb_to_grayscale(rgb: &[u8]) -> Vec<u8> {
    rgb.chunks_exact(3)
        .map(|px| {
            let y = px[0] as u32 * LUMA_R
                + px[1] as u32 * LUMA_G
                + px[2] as u32 * LUMA_B
                + (1 << (LUMA_SHIFT - 1));
            (y >> LUMA_SHIFT) as u8
        })
        .collect()
}

/// Resize a grayscale plane with bilinear interpolation on pixel centres.
pub fn resize_bilinear(
    src: &[u8],
    width: usize,
    height: usize,
    new_w: usize,
    new_h: usize,
) -> Vec<u8> {
    let mut resized = vec![0u8; new_w * new_h];
    if width == 0 || height == 0 || new_w == 0 || new_h == 0 {
        return resized;
    }

    let scale_x = width as f32 / new_w as f32;
    let scale_y = height as f32 / new_h as f32;

    for y in 0..new_h {
        let src_y = ((y as f32 + 0.5) * scale_y - 0.5).max(0.0);
        let y0 = (src_y.floor() as usize).min(height - 1);
        let y1 = (y0 + 1).min(height - 1);
        let fy = (src_y - y0 as f32).clamp(0.0, 1.0);

        for x in 0..new_w {
            let src_x = ((x as f32 + 0.5) * scale_x - 0.5).max(0.0);
            let x0 = (src_x.floor() as usize).min(width - 1);
            let x1 = (x0 + 1).min(width - 1);
            let fx = (src_x - x0 as f32).clamp(0.0, 1.0);

            let tl = src[y0 * width + x0] as f32;
            let tr = src[y0 * width + x1] as f32;
            let bl = src[y1 * width + x0] as f32;
            let br = src[y1 * width + x1] as f32;

            let val = tl * (1.0 - fx) * (1.0 - fy)
                + tr * fx * (1.0 - fy)
                + bl * (1.0 - fx) * fy
                + br * fx * fy;

            resized[y * new_w + x] = val.round().clamp(0.0, 255.0) as u8;
        }
    }

    resized
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("failed to read image {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode image {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("image dimensions are zero")]
    ZeroDimensions,
}
