//! Command-line and environment configuration.

use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use clap::Parser;
use cnn_runner_core::{default_model_path, RunnerConfig};

use crate::preprocess::{ChannelOrder, ImageSpec};

/// Largest accepted request body, in bytes.
pub const DEFAULT_MAX_BODY_BYTES: usize = 6 * 1024 * 1024;

#[derive(Parser, Debug)]
#[clap(author, version, about = "JPEG binary classifier inference server")]
pub struct Args {
    /// Path to the ONNX model file
    #[clap(short, long, env = "MODEL_PATH", default_value_os_t = default_model_path())]
    pub model: PathBuf,

    /// Address to bind
    #[clap(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[clap(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Number of HTTP worker threads (defaults to the number of CPUs)
    #[clap(long, env = "WORKERS")]
    pub workers: Option<usize>,

    /// Model input shape as comma-separated NHWC values
    #[clap(long, env = "INPUT_SHAPE", default_value = "1,150,150,3")]
    pub input_shape: String,

    /// Channel order of the model input
    #[clap(long, env = "CHANNEL_ORDER", value_enum, default_value_t = ChannelOrder::Bgr)]
    pub channel_order: ChannelOrder,

    /// Multiplier applied to 0-255 pixel values
    #[clap(long, env = "PIXEL_SCALE", default_value_t = 1.0)]
    pub pixel_scale: f32,

    /// Resize images to the model input size instead of rejecting them
    #[clap(long, env = "RESIZE")]
    pub resize: bool,

    /// Maximum request body size in bytes
    #[clap(long, env = "MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,

    /// Skip graph optimization when loading the model
    #[clap(long)]
    pub no_optimize: bool,

    /// Load the model before accepting requests
    #[clap(long, env = "PRELOAD")]
    pub preload: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[clap(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Parses and validates `--input-shape`: `[1, height, width, 3]`.
    pub fn parsed_input_shape(&self) -> Result<Vec<usize>> {
        let shape = parse_shape(&self.input_shape)?;
        ensure!(
            shape.len() == 4,
            "input shape {shape:?} must have 4 dimensions (NHWC)"
        );
        ensure!(shape[0] == 1, "input shape {shape:?} must have batch size 1");
        ensure!(shape[3] == 3, "input shape {shape:?} must have 3 channels");
        ensure!(
            shape[1] > 0 && shape[2] > 0,
            "input shape {shape:?} must have a non-empty image"
        );
        Ok(shape)
    }

    pub fn runner_config(&self) -> Result<RunnerConfig> {
        Ok(RunnerConfig {
            model_path: self.model.clone(),
            input_shape: self.parsed_input_shape()?,
            optimize: !self.no_optimize,
        })
    }

    pub fn image_spec(&self) -> Result<ImageSpec> {
        let shape = self.parsed_input_shape()?;
        Ok(ImageSpec {
            height: u32::try_from(shape[1]).context("image height out of range")?,
            width: u32::try_from(shape[2]).context("image width out of range")?,
            channel_order: self.channel_order,
            pixel_scale: self.pixel_scale,
            resize: self.resize,
        })
    }
}

fn parse_shape(raw: &str) -> Result<Vec<usize>> {
    raw.split(',')
        .map(|dim| {
            dim.trim()
                .parse::<usize>()
                .with_context(|| format!("Invalid input shape dimension {dim:?}"))
        })
        .collect()
}
