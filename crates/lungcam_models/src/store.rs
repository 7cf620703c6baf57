//! Load-once model handle.
//!
//! [`ModelStore`] owns the artifact location and a [`OnceLock`] holding the
//! loaded classifier. [`ModelStore::ensure_loaded`] is idempotent: the first
//! successful call loads and validates the model, later calls return the
//! cached handle.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use burn::prelude::*;
use tracing::{debug, info, warn};

use lungcam_core::config::{MODEL_FILE, N_CLASSES, TARGET_LAYER};
use lungcam_core::{CoreError, ImageShape, Prediction, Preprocessor};

use crate::checkpoint::load_model;
use crate::error::{ModelError, Result};
use crate::resnet::LungResNet;
use crate::traits::{LayeredClassifier, OutputArity};

/// A classifier together with the output arity resolved when it was loaded.
#[derive(Debug)]
pub struct LoadedClassifier<B: Backend, M = LungResNet<B>> {
    model: M,
    arity: OutputArity,
    device: B::Device,
}

impl<B: Backend, M: LayeredClassifier<B>> LoadedClassifier<B, M> {
    /// Wrap a model, probing it once with a blank input to resolve its
    /// output arity and class count.
    pub fn new(model: M, device: &B::Device) -> Result<Self> {
        let probe = Tensor::<B, 4>::zeros(ImageShape::model_input().as_array(), device);
        let output = model.forward(probe);
        let arity = OutputArity::resolve(&output)?;

        let [_, n_classes] = arity.select(output)?.dims();
        if n_classes != N_CLASSES {
            return Err(ModelError::InvalidConfig(format!(
                "model outputs {n_classes} classes, label set has {N_CLASSES}"
            )));
        }

        debug!(?arity, "Resolved model output arity");
        Ok(Self {
            model,
            arity,
            device: device.clone(),
        })
    }

    /// The wrapped model.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Output arity resolved at load time.
    pub fn arity(&self) -> OutputArity {
        self.arity
    }

    /// Device the model lives on.
    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Class probabilities for a single preprocessed input.
    pub fn probabilities(&self, input: Tensor<B, 4>) -> Result<Vec<f32>> {
        Preprocessor::validate(&input)?;
        let probs = self.arity.select(self.model.forward(input))?;
        let [_, n_classes] = probs.dims();

        let values = probs
            .slice([0..1, 0..n_classes])
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| CoreError::TensorData(format!("{e:?}")))?;
        Ok(values)
    }

    /// Predicted label and confidence for a single preprocessed input.
    pub fn predict(&self, input: Tensor<B, 4>) -> Result<Prediction> {
        Ok(Prediction::from_probabilities(self.probabilities(input)?)?)
    }
}

/// Default artifact location: next to the running executable.
pub fn default_model_path() -> Result<PathBuf> {
    let exe = std::env::current_exe().map_err(|e| ModelError::Load {
        path: PathBuf::from(MODEL_FILE),
        reason: format!("cannot locate executable: {e}"),
    })?;
    let dir = exe.parent().unwrap_or_else(|| Path::new("."));
    Ok(dir.join(MODEL_FILE))
}

/// Owner of the model artifact and its cached, loaded classifier.
pub struct ModelStore<B: Backend> {
    path: PathBuf,
    device: B::Device,
    target_layer: String,
    handle: OnceLock<LoadedClassifier<B>>,
}

impl<B: Backend> ModelStore<B> {
    /// Store for the artifact at `path`.
    pub fn new(path: impl Into<PathBuf>, device: B::Device) -> Self {
        Self {
            path: path.into(),
            device,
            target_layer: TARGET_LAYER.to_string(),
            handle: OnceLock::new(),
        }
    }

    /// Store for the artifact next to the running executable.
    pub fn beside_executable(device: B::Device) -> Result<Self> {
        Ok(Self::new(default_model_path()?, device))
    }

    /// Require a different layer to exist when loading.
    #[must_use]
    pub fn with_target_layer(mut self, layer: impl Into<String>) -> Self {
        self.target_layer = layer.into();
        self
    }

    /// Path of the weights file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Device models are loaded onto.
    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Layer the loaded model is required to expose.
    pub fn target_layer(&self) -> &str {
        &self.target_layer
    }

    /// Whether the model has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.handle.get().is_some()
    }

    /// Load the model on first use; return the cached handle afterwards.
    pub fn ensure_loaded(&self) -> Result<&LoadedClassifier<B>> {
        if let Some(loaded) = self.handle.get() {
            return Ok(loaded);
        }
        let loaded = self.load()?;
        Ok(self.handle.get_or_init(|| loaded))
    }

    fn load(&self) -> Result<LoadedClassifier<B>> {
        info!(path = %self.path.display(), "Loading model");
        let (model, metadata) = load_model::<B>(&self.path, &self.device)?;

        if !model.has_layer(&self.target_layer) {
            return Err(ModelError::LayerNotFound {
                layer: self.target_layer.clone(),
                available: model.layer_names(),
            });
        }

        if metadata.target_layer != self.target_layer {
            warn!(
                recorded = %metadata.target_layer,
                requested = %self.target_layer,
                "Explaining a different layer than the artifact records"
            );
        }

        let loaded = LoadedClassifier::new(model.no_grad(), &self.device)?;
        info!(
            arch = %metadata.arch,
            blocks = ?metadata.config.stage_blocks,
            target_layer = %self.target_layer,
            "Model loaded"
        );
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{save_model, ModelMetadata};
    use crate::resnet::LungResNetConfig;
    use lungcam_core::backend::NdArray;

    type TestBackend = NdArray;

    fn config(stage_blocks: Vec<usize>) -> LungResNetConfig {
        LungResNetConfig {
            stem_filters: 4,
            stage_filters: vec![2; stage_blocks.len()],
            stage_blocks,
            expansion: 2,
            ..Default::default()
        }
    }

    fn write_model(name: &str, config: LungResNetConfig) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lungcam-store-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let model = config.init::<TestBackend>(&Default::default()).unwrap();
        save_model(&model, &ModelMetadata::new(config), &path).unwrap();
        path
    }

    #[test]
    fn test_ensure_loaded_is_idempotent() {
        let path = write_model("once.mpk", config(vec![1, 1, 1, 3]));
        let store = ModelStore::<TestBackend>::new(&path, Default::default());
        assert!(!store.is_loaded());

        let first = store.ensure_loaded().unwrap() as *const _;
        assert!(store.is_loaded());
        let second = store.ensure_loaded().unwrap() as *const _;
        assert!(std::ptr::eq(first, second));
        assert_eq!(store.ensure_loaded().unwrap().arity(), OutputArity::Single);
    }

    #[test]
    fn test_missing_artifact() {
        let store = ModelStore::<TestBackend>::new("/nonexistent/lung_disease_model.mpk", Default::default());
        assert!(matches!(store.ensure_loaded(), Err(ModelError::Load { .. })));
        assert!(!store.is_loaded());
    }

    #[test]
    fn test_target_layer_must_exist() {
        let path = write_model("shallow.mpk", config(vec![1, 1]));
        let store = ModelStore::<TestBackend>::new(&path, Default::default());
        match store.ensure_loaded() {
            Err(ModelError::LayerNotFound { layer, .. }) => assert_eq!(layer, "conv5_block3_out"),
            other => panic!("expected LayerNotFound, got {:?}", other.err()),
        }

        let store = store.with_target_layer("conv3_block1_out");
        assert!(store.ensure_loaded().is_ok());
    }

    #[test]
    fn test_predict() {
        let path = write_model("predict.mpk", config(vec![1, 1, 1, 3]));
        let store = ModelStore::<TestBackend>::new(&path, Default::default());
        let classifier = store.ensure_loaded().unwrap();

        let input = Tensor::<TestBackend, 4>::ones([1, 256, 256, 3], classifier.device()) * 0.5;
        let prediction = classifier.predict(input).unwrap();
        assert!(prediction.class_index < 4);
        assert!((0.0..=100.0).contains(&prediction.confidence()));

        let bad = Tensor::<TestBackend, 4>::ones([1, 128, 128, 3], classifier.device());
        assert!(matches!(classifier.predict(bad), Err(ModelError::Core(_))));
    }

    #[test]
    fn test_default_path_is_beside_executable() {
        let path = default_model_path().unwrap();
        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some(MODEL_FILE));
        let exe_dir = std::env::current_exe().unwrap().parent().unwrap().to_path_buf();
        assert_eq!(path.parent().unwrap(), exe_dir);
    }
}
