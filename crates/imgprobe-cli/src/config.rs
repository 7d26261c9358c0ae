use std::path::{Path, PathBuf};

/// Classifier used when the caller names none.
pub const DEFAULT_CASCADE: &str = "haarcascade_frontalface_default.xml";
/// Embedding model filename inside the model directory.
pub const DEFAULT_EMBED_MODEL: &str = "resnet18.onnx";

/// Where distribution OpenCV packages install their stock cascades.
const CASCADE_DIR_CANDIDATES: [&str; 3] = [
    "/usr/share/opencv4/haarcascades",
    "/usr/local/share/opencv4/haarcascades",
    "/usr/share/opencv/haarcascades",
];

/// Tool configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory classifier filenames are resolved against.
    pub cascade_dir: PathBuf,
    /// Directory containing the ONNX embedding model.
    pub model_dir: PathBuf,
    /// Embedding model filename (or absolute path).
    pub embed_model: String,
    /// Whether to probe for a hardware accelerator.
    pub allow_accelerator: bool,
}

impl Config {
    /// Load configuration from `IMGPROBE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let cascade_dir = var("IMGPROBE_CASCADE_DIR")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| default_cascade_dir(|p| p.is_dir()));

        let model_dir = var("IMGPROBE_MODEL_DIR")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                var("XDG_DATA_HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| {
                        let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
                        PathBuf::from(home).join(".local/share")
                    })
                    .join("imgprobe/models")
            });

        Self {
            cascade_dir,
            model_dir,
            embed_model: var("IMGPROBE_EMBED_MODEL")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_EMBED_MODEL.to_string()),
            allow_accelerator: var("IMGPROBE_FORCE_CPU")
                .map(|v| v == "0")
                .unwrap_or(true),
        }
    }

    /// Path of the classifier to load; an empty or missing name means the default.
    pub fn cascade_path(&self, classifier: Option<&str>) -> PathBuf {
        let name = classifier.filter(|c| !c.is_empty()).unwrap_or(DEFAULT_CASCADE);
        self.cascade_dir.join(name)
    }

    /// Path to the ResNet-18 embedding model.
    pub fn embed_model_path(&self) -> PathBuf {
        self.model_dir.join(&self.embed_model)
    }
}

fn default_cascade_dir(exists: impl Fn(&Path) -> bool) -> PathBuf {
    CASCADE_DIR_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|p| exists(p.as_path()))
        .unwrap_or_else(|| PathBuf::from(CASCADE_DIR_CANDIDATES[0]))
}
