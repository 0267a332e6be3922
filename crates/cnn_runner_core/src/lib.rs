//! # cnn_runner_core
//!
//! Shared trait and types for the classifier inference runners.
//! Backend crates (`cnn_runner_tract`) implement the [`Runner`] trait defined
//! here, and the server only talks to a model through [`ModelHolder`].

use std::path::{Path, PathBuf};

use anyhow::Result;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

mod holder;

pub use holder::{Loader, ModelHolder};

/// Well-known root for model-container artifacts.
pub const ML_PREFIX: &str = "/opt/ml/";

/// File name of the serialized classifier under `<prefix>/model/`.
pub const MODEL_FILE_NAME: &str = "kaggle_dogs_cats.onnx";

/// NHWC input shape of the classifier: a batch of one 150x150 color image.
pub const DEFAULT_INPUT_SHAPE: [usize; 4] = [1, 150, 150, 3];

/// Default location of the model artifact, `/opt/ml/model/kaggle_dogs_cats.onnx`.
pub fn default_model_path() -> PathBuf {
    model_path_under(ML_PREFIX)
}

/// Model artifact location below an arbitrary prefix.
pub fn model_path_under(prefix: impl AsRef<Path>) -> PathBuf {
    prefix.as_ref().join("model").join(MODEL_FILE_NAME)
}

/// Metadata describing a loaded model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Human-readable name of the model.
    pub name: String,
    /// Backend used for inference (e.g. "tract").
    pub backend: String,
    /// Expected input shape (e.g. `[1, 150, 150, 3]`).
    pub input_shape: Vec<usize>,
    /// Output shape, empty if the graph does not fix it.
    pub output_shape: Vec<usize>,
}

/// Configuration for loading a runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Path to the model file.
    pub model_path: PathBuf,
    /// Expected input shape.
    pub input_shape: Vec<usize>,
    /// Whether to apply backend-specific optimizations.
    pub optimize: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            input_shape: DEFAULT_INPUT_SHAPE.to_vec(),
            optimize: true,
        }
    }
}

/// The core trait that all inference backends must implement.
///
/// A runner is an opaque forward pass: fixed-shape `f32` tensor in,
/// fixed-shape `f32` tensor out.
///
/// # Example
/// ```ignore
/// let runner = TractRunner::from_config(&RunnerConfig::default())?;
/// let input = ndarray::ArrayD::<f32>::zeros(IxDyn(&[1, 150, 150, 3]));
/// let output = runner.run(&input)?;
/// println!("Output shape: {:?}", output.shape());
/// ```
pub trait Runner: Send + Sync {
    /// Create a runner from a configuration.
    fn from_config(config: &RunnerConfig) -> Result<Self>
    where
        Self: Sized;

    /// Run inference on the given input tensor.
    fn run(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>>;

    /// Return metadata about the loaded model.
    fn info(&self) -> ModelInfo;
}

/// First element of the first batch row, i.e. `output[0][0]` for a `[1, N]` output.
pub fn first_score(output: &ArrayD<f32>) -> Option<f32> {
    output.iter().next().copied()
}
