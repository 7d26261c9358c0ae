//! ResNet-18 image embedder via ONNX Runtime.
//!
//! Expects an ONNX export of torchvision's ResNet-18 cut after global average
//! pooling, so the first output holds 512 pooled activations per image.

use crate::device::Device;
use crate::frame::Frame;
use crate::types::Embedding;
use image::imageops::FilterType;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants (ImageNet preprocessing) ---
const RESNET_INPUT_SIZE: u32 = 224;
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];
pub const RESNET18_EMBEDDING_DIM: usize = 512;
/// Inference stays on the calling thread's budget: one intra-op thread.
const INTRA_THREADS: usize = 1;

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("model file not found: {0} (export ResNet-18 pooled features to ONNX and place it there)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// ResNet-18 feature extractor.
pub struct ImageEmbedder {
    session: Session,
    device: Device,
}

impl ImageEmbedder {
    /// Load the ONNX model and bind it to `device`.
    ///
    /// Building the session loads the weights and sets up the device
    /// context, which is the expensive part of a first request.
    pub fn load(model_path: &Path, device: Device) -> Result<Self, EmbedderError> {
        if !model_path.exists() {
            return Err(EmbedderError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(INTRA_THREADS)?
            .with_execution_providers(device.execution_providers())?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            %device,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ResNet-18 embedding model"
        );

        Ok(Self { session, device })
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Extract the pooled feature vector for a decoded image.
    ///
    /// The output is flattened in the model's native order and always has
    /// [`RESNET18_EMBEDDING_DIM`] values, whatever the input size.
    pub fn embed(&mut self, frame: &Frame) -> Result<Embedding, EmbedderError> {
        let input = Self::preprocess(frame);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("feature extraction: {e}")))?;

        if raw_data.len() != RESNET18_EMBEDDING_DIM {
            return Err(EmbedderError::InferenceFailed(format!(
                "expected {RESNET18_EMBEDDING_DIM}-dim embedding, got {}",
                raw_data.len()
            )));
        }

        Ok(Embedding {
            values: raw_data.to_vec(),
        })
    }

    /// Resize to 224×224 (aspect ratio not kept) and normalise into a NCHW tensor.
    fn preprocess(frame: &Frame) -> Array4<f32> {
        let size = RESNET_INPUT_SIZE as usize;
        let resized = image::imageops::resize(
            &frame.image,
            RESNET_INPUT_SIZE,
            RESNET_INPUT_SIZE,
            FilterType::Triangle,
        );

        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                let value = pixel[c] as f32 / 255.0;
                tensor[[0, c, y as usize, x as usize]] = (value - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            }
        }

        tensor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    /// ONNX graph: mean over H and W, then a fixed 3×512 projection.
    const MEAN_RGB_MODEL: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/mean_rgb_512.onnx");

    fn fixture_weight(c: usize, j: usize) -> f32 {
        (((c * 512 + j * 5) % 17) as f32 - 8.0) / 8.0
    }

    fn fixture_embedder() -> ImageEmbedder {
        ImageEmbedder::load(Path::new(MEAN_RGB_MODEL), Device::Cpu).unwrap()
    }

    fn textured(width: u32, height: u32) -> RgbImage {
        let mut img = RgbImage::new(width, height);
        for (x, y, p) in img.enumerate_pixels_mut() {
            *p = Rgb([(x * 7 % 256) as u8, (y * 3 % 256) as u8, ((x ^ y) % 256) as u8]);
        }
        img
    }

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
        Frame::from_rgb(RgbImage::from_pixel(width, height, Rgb(rgb))).unwrap()
    }

    #[test]
    fn test_preprocess_output_shape_independent_of_input() {
        let size = RESNET_INPUT_SIZE as usize;
        for (w, h) in [(224, 224), (640, 480), (17, 301)] {
            let tensor = ImageEmbedder::preprocess(&solid(w, h, [10, 20, 30]));
            assert_eq!(tensor.shape(), &[1, 3, size, size]);
        }
    }

    #[test]
    fn test_preprocess_imagenet_normalization() {
        let tensor = ImageEmbedder::preprocess(&solid(50, 40, [255, 0, 255]));
        let expected = [
            (1.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0],
            (0.0 - IMAGENET_MEAN[1]) / IMAGENET_STD[1],
            (1.0 - IMAGENET_MEAN[2]) / IMAGENET_STD[2],
        ];
        for c in 0..3 {
            let val = tensor[[0, c, 100, 100]];
            // One 8-bit step of tolerance for resampling.
            let tol = 1.0 / 255.0 / IMAGENET_STD[c] + 1e-5;
            assert!((val - expected[c]).abs() <= tol, "channel {c}: got {val}, expected {}", expected[c]);
        }
    }

    #[test]
    fn test_preprocess_keeps_channel_order() {
        let tensor = ImageEmbedder::preprocess(&solid(224, 224, [200, 100, 0]));
        let (r, g, b) = (tensor[[0, 0, 5, 5]], tensor[[0, 1, 5, 5]], tensor[[0, 2, 5, 5]]);
        assert!(r > g && g > b, "r={r} g={g} b={b}");
    }

    #[test]
    fn test_preprocess_is_deterministic() {
        let mut img = RgbImage::new(97, 61);
        for (x, y, p) in img.enumerate_pixels_mut() {
            *p = Rgb([(x * 3) as u8, (y * 4) as u8, ((x + y) % 256) as u8]);
        }
        let frame = Frame::from_rgb(img).unwrap();
        assert_eq!(ImageEmbedder::preprocess(&frame), ImageEmbedder::preprocess(&frame));
    }

    #[test]
    fn test_load_missing_model() {
        let err = ImageEmbedder::load(Path::new("/nonexistent/resnet18.onnx"), Device::Cpu)
            .err()
            .unwrap();
        assert!(matches!(err, EmbedderError::ModelNotFound(_)));
    }

    #[test]
    fn test_embed_has_512_values_for_any_size() {
        let mut embedder = fixture_embedder();
        assert_eq!(embedder.device(), Device::Cpu);
        for (w, h) in [(224, 224), (640, 480), (17, 301)] {
            let frame = Frame::from_rgb(textured(w, h)).unwrap();
            let embedding = embedder.embed(&frame).unwrap();
            assert_eq!(embedding.len(), RESNET18_EMBEDDING_DIM, "{w}x{h}");
        }
    }

    #[test]
    fn test_embed_solid_image_values() {
        let rgb = [200u8, 90, 30];
        let mut embedder = fixture_embedder();
        let embedding = embedder.embed(&solid(120, 80, rgb)).unwrap();

        let pooled: Vec<f32> = (0..3)
            .map(|c| (rgb[c] as f32 / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c])
            .collect();
        for (j, &got) in embedding.values.iter().enumerate() {
            let expected: f32 = (0..3).map(|c| pooled[c] * fixture_weight(c, j)).sum();
            assert!((got - expected).abs() < 1e-3, "value {j}: got {got}, expected {expected}");
        }
    }

    #[test]
    fn test_embed_is_deterministic() {
        let mut embedder = fixture_embedder();
        let frame = Frame::from_rgb(textured(97, 61)).unwrap();
        assert_eq!(embedder.embed(&frame).unwrap(), embedder.embed(&frame).unwrap());
    }

    #[test]
    fn test_preprocess_ignores_container_format() {
        let dir = tempfile::tempdir().unwrap();
        let img = textured(75, 50);
        let png = dir.path().join("pixels.png");
        let bmp = dir.path().join("pixels.bmp");
        img.save(&png).unwrap();
        img.save(&bmp).unwrap();

        let from_png = ImageEmbedder::preprocess(&Frame::load(&png).unwrap());
        let from_bmp = ImageEmbedder::preprocess(&Frame::load(&bmp).unwrap());
        assert_eq!(from_png, from_bmp);
    }
}
