//! # cnn_runner_tract
//!
//! ONNX inference runner using the pure-Rust `tract` runtime. CPU only.

use anyhow::{Context, Result};
use cnn_runner_core::{ModelInfo, Runner, RunnerConfig};
use ndarray::{ArrayD, IxDyn};
use tract_onnx::prelude::*;
use tracing::debug;

/// A runner backed by tract (ONNX models).
pub struct TractRunner {
    model: TypedRunnableModel<TypedModel>,
    config: RunnerConfig,
    output_shape: Vec<usize>,
}

impl TractRunner {
    /// Wraps an already typed graph, recording its output shape when the graph fixes it.
    fn from_typed(model: TypedModel, config: &RunnerConfig) -> Result<Self> {
        let output_shape = model
            .output_fact(0)?
            .shape
            .as_concrete()
            .map(<[usize]>::to_vec)
            .unwrap_or_default();
        debug!("Model output shape: {output_shape:?}");

        Ok(Self {
            model: model.into_runnable()?,
            config: config.clone(),
            output_shape,
        })
    }
}

impl Runner for TractRunner {
    fn from_config(config: &RunnerConfig) -> Result<Self> {
        let path = &config.model_path;
        let model = tract_onnx::onnx()
            .model_for_path(path)
            .with_context(|| format!("Failed to read ONNX model: {}", path.display()))?
            .with_input_fact(0, f32::fact(config.input_shape.clone()).into())?;

        let model = if config.optimize {
            model.into_optimized()?
        } else {
            model.into_typed()?
        };
        Self::from_typed(model, config)
    }

    fn run(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let flat: Vec<f32> = input.iter().copied().collect();
        let input = Tensor::from_shape(input.shape(), &flat)?;

        let result = self.model.run(tvec!(input.into()))?;
        let output = result
            .first()
            .context("Model produced no outputs")?
            .to_array_view::<f32>()?;

        let out_shape = output.shape().to_vec();
        let out_vec: Vec<f32> = output.iter().copied().collect();
        Ok(ArrayD::from_shape_vec(IxDyn(&out_shape), out_vec)?)
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            name: self
                .config
                .model_path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default(),
            backend: "tract".to_string(),
            input_shape: self.config.input_shape.clone(),
            output_shape: self.output_shape.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use cnn_runner_core::first_score;

    use super::*;

    /// Single-input graph whose output is its input.
    fn identity_runner() -> TractRunner {
        let config = RunnerConfig::default();
        let mut model = TypedModel::default();
        let source = model
            .add_source("image", f32::fact(config.input_shape.clone()))
            .unwrap();
        model.set_output_outlets(&[source]).unwrap();
        TractRunner::from_typed(model, &config).unwrap()
    }

    #[test]
    fn test_forward_pass_round_trip() {
        let runner = identity_runner();
        let mut input = ArrayD::<f32>::zeros(IxDyn(&[1, 150, 150, 3]));
        input[[0, 0, 0, 0]] = 0.75;
        input[[0, 149, 149, 2]] = 0.25;

        let output = runner.run(&input).unwrap();

        assert_eq!(output.shape(), &[1, 150, 150, 3]);
        assert_eq!(first_score(&output), Some(0.75));
        assert_eq!(output[[0, 149, 149, 2]], 0.25);
    }

    #[test]
    fn test_info_reports_shapes() {
        let info = identity_runner().info();
        assert_eq!(info.name, "kaggle_dogs_cats");
        assert_eq!(info.backend, "tract");
        assert_eq!(info.input_shape, vec![1, 150, 150, 3]);
        assert_eq!(info.output_shape, vec![1, 150, 150, 3]);
    }

    #[test]
    fn test_missing_model_file() {
        let config = RunnerConfig {
            model_path: "/nonexistent/kaggle_dogs_cats.onnx".into(),
            ..RunnerConfig::default()
        };
        let err = TractRunner::from_config(&config).err().unwrap();
        assert!(format!("{err:#}").contains("/nonexistent/kaggle_dogs_cats.onnx"));
    }

    #[test]
    fn test_corrupt_model_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"definitely not a protobuf graph").unwrap();

        let config = RunnerConfig {
            model_path: file.path().to_path_buf(),
            ..RunnerConfig::default()
        };
        assert!(TractRunner::from_config(&config).is_err());
    }
}
