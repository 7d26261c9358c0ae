//! imgprobe-core — Face-box detection and image embedding engine.
//!
//! Detects faces with a boosted Haar cascade read from OpenCV classifier
//! files, and extracts ResNet-18 image embeddings via ONNX Runtime.

pub mod cascade;
pub mod detector;
pub mod device;
pub mod embedder;
pub mod frame;
pub mod grouping;
pub mod integral;
pub mod types;

pub use detector::{CascadeDetector, DetectParams};
pub use device::Device;
pub use embedder::ImageEmbedder;
pub use frame::Frame;
pub use types::{DetectionResult, Embedding, Rect};
