//! Lazily-loaded, process-wide model handle.

use std::time::Instant;

use anyhow::{bail, Context, Result};
use ndarray::ArrayD;
use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::{first_score, Runner, RunnerConfig};

/// Builds a runner from its configuration. Called at most once per successful load.
pub type Loader = Box<dyn Fn(&RunnerConfig) -> Result<Box<dyn Runner>> + Send + Sync>;

/// Holds a single classifier behind a one-time initialization guard.
///
/// The holder starts unloaded. The first successful [`ModelHolder::get_model`]
/// stores the runner, and every later call returns that same instance.
/// Concurrent first callers block on the single initializer, so the loader
/// runs once. A failed load leaves the holder unloaded.
pub struct ModelHolder {
    config: RunnerConfig,
    loader: Loader,
    model: OnceCell<Box<dyn Runner>>,
}

impl ModelHolder {
    /// Creates an unloaded holder with a custom loader.
    #[must_use]
    pub fn new(config: RunnerConfig, loader: Loader) -> Self {
        Self {
            config,
            loader,
            model: OnceCell::new(),
        }
    }

    /// Creates an unloaded holder that loads through `R::from_config`.
    #[must_use]
    pub fn for_runner<R: Runner + 'static>(config: RunnerConfig) -> Self {
        Self::new(
            config,
            Box::new(|config: &RunnerConfig| -> Result<Box<dyn Runner>> {
                Ok(Box::new(R::from_config(config)?))
            }),
        )
    }

    /// Gets the model, loading it if necessary.
    ///
    /// # Errors
    ///
    /// Returns the loader's error if the artifact is missing or invalid.
    pub fn get_model(&self) -> Result<&dyn Runner> {
        let model = self.model.get_or_try_init(|| {
            let path = self.config.model_path.display();
            info!("Loading model from {path}");
            let started = Instant::now();
            let runner = (self.loader)(&self.config)?;
            info!(
                "Model loaded from {path} in {:.2?} ({})",
                started.elapsed(),
                runner.info().backend
            );
            Ok::<_, anyhow::Error>(runner)
        })?;
        Ok(&**model)
    }

    /// Returns true if the model has been loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.model.get().is_some()
    }

    /// Runs a forward pass and returns the first scalar of the output.
    ///
    /// Returns `Ok(None)` when the model cannot be loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if `batch` does not match the configured input shape,
    /// the forward pass fails, or the output is empty.
    pub fn predict(&self, batch: &ArrayD<f32>) -> Result<Option<f32>> {
        if batch.shape() != self.config.input_shape.as_slice() {
            bail!(
                "input shape {:?} does not match model input shape {:?}",
                batch.shape(),
                self.config.input_shape
            );
        }

        let model = match self.get_model() {
            Ok(model) => model,
            Err(e) => {
                warn!("Model unavailable: {e:#}");
                return Ok(None);
            }
        };

        let output = model.run(batch)?;
        debug!("Forward pass produced output of shape {:?}", output.shape());
        let score = first_score(&output).context("model produced an empty output")?;
        Ok(Some(score))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    use ndarray::IxDyn;

    use super::*;
    use crate::ModelInfo;

    /// Scores an image by its first pixel intensity.
    struct PixelRunner;

    impl Runner for PixelRunner {
        fn from_config(_config: &RunnerConfig) -> Result<Self> {
            Ok(Self)
        }

        fn run(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>> {
            let pixel = input.iter().next().copied().unwrap_or(0.0) / 255.0;
            Ok(ArrayD::from_shape_vec(IxDyn(&[1, 1]), vec![pixel])?)
        }

        fn info(&self) -> ModelInfo {
            ModelInfo {
                name: "pixel".to_string(),
                backend: "mock".to_string(),
                input_shape: vec![1, 150, 150, 3],
                output_shape: vec![1, 1],
            }
        }
    }

    fn counting_holder(loads: Arc<AtomicUsize>) -> ModelHolder {
        ModelHolder::new(
            RunnerConfig::default(),
            Box::new(move |_config: &RunnerConfig| -> Result<Box<dyn Runner>> {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(PixelRunner))
            }),
        )
    }

    fn failing_holder(attempts: Arc<AtomicUsize>) -> ModelHolder {
        ModelHolder::new(
            RunnerConfig::default(),
            Box::new(move |config: &RunnerConfig| -> Result<Box<dyn Runner>> {
                attempts.fetch_add(1, Ordering::SeqCst);
                bail!("no model at {}", config.model_path.display())
            }),
        )
    }

    fn batch(value: f32) -> ArrayD<f32> {
        ArrayD::from_elem(IxDyn(&[1, 150, 150, 3]), value)
    }

    #[test]
    fn test_holder_starts_unloaded() {
        let holder = counting_holder(Arc::new(AtomicUsize::new(0)));
        assert!(!holder.is_loaded());
    }

    #[test]
    fn test_get_model_loads_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let holder = counting_holder(Arc::clone(&loads));

        for _ in 0..5 {
            assert!(holder.get_model().is_ok());
        }
        holder.predict(&batch(0.0)).unwrap();

        assert!(holder.is_loaded());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_first_access_loads_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let holder = Arc::new(counting_holder(Arc::clone(&loads)));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let holder = Arc::clone(&holder);
                thread::spawn(move || holder.get_model().is_ok())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_load_is_not_cached() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let holder = failing_holder(Arc::clone(&attempts));

        let err = holder.get_model().err().unwrap();
        assert!(err.to_string().contains("kaggle_dogs_cats.onnx"));
        assert!(holder.get_model().is_err());

        assert!(!holder.is_loaded());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_predict_returns_first_score() {
        let holder = counting_holder(Arc::new(AtomicUsize::new(0)));
        let score = holder.predict(&batch(255.0)).unwrap();
        assert_eq!(score, Some(1.0));
    }

    #[test]
    fn test_predict_is_deterministic() {
        let holder = counting_holder(Arc::new(AtomicUsize::new(0)));
        let first = holder.predict(&batch(42.0)).unwrap();
        let second = holder.predict(&batch(42.0)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_predict_without_model_is_none() {
        let holder = failing_holder(Arc::new(AtomicUsize::new(0)));
        assert_eq!(holder.predict(&batch(0.0)).unwrap(), None);
    }

    #[test]
    fn test_predict_rejects_wrong_shape() {
        let loads = Arc::new(AtomicUsize::new(0));
        let holder = counting_holder(Arc::clone(&loads));
        let wrong = ArrayD::<f32>::zeros(IxDyn(&[1, 3, 150, 150]));

        assert!(holder.predict(&wrong).is_err());
        assert_eq!(loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_for_runner_uses_from_config() {
        let holder = ModelHolder::for_runner::<PixelRunner>(RunnerConfig::default());
        assert_eq!(holder.get_model().unwrap().info().backend, "mock");
    }
}
