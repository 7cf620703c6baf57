//! Model artifact serialization.
//!
//! An artifact is two files side by side:
//!
//! - **Weights** (`*.mpk`): named MessagePack record written by Burn's recorder
//! - **Metadata** (`*.json`): architecture config and label set
//!
//! # Example
//!
//! ```rust,ignore
//! use lungcam_models::{load_model, save_model, LungResNetConfig, ModelMetadata};
//!
//! let config = LungResNetConfig::default();
//! let model = config.init::<NdArray>(&device)?;
//!
//! save_model(&model, &ModelMetadata::new(config), "lung_disease_model.mpk")?;
//! let (loaded, metadata) = load_model::<NdArray>("lung_disease_model.mpk", &device)?;
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use lungcam_core::config::{CLASS_NAMES, INPUT_SIZE, TARGET_LAYER};

use crate::error::{ModelError, Result};
use crate::resnet::{LungResNet, LungResNetConfig};

/// Architecture name recorded in the metadata.
pub const ARCH: &str = "LungResNet";

/// Extension of the weights file.
pub const WEIGHTS_EXTENSION: &str = "mpk";

/// Resolve the weights file a path refers to.
///
/// A path without an extension gets `.mpk`; any extension other than `.mpk`
/// is rejected, since the recorder always reads and writes `.mpk` files.
pub fn weights_path(path: &Path) -> std::result::Result<PathBuf, String> {
    match path.extension().and_then(|e| e.to_str()) {
        None => Ok(path.with_extension(WEIGHTS_EXTENSION)),
        Some(WEIGHTS_EXTENSION) => Ok(path.to_path_buf()),
        Some(other) => Err(format!(
            "expected a .{WEIGHTS_EXTENSION} weights file, got .{other}"
        )),
    }
}

/// Path of the metadata sidecar for a weights file.
#[must_use]
pub fn metadata_path(weights: &Path) -> PathBuf {
    weights.with_extension("json")
}

/// Model artifact metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Model architecture name.
    pub arch: String,
    /// Architecture configuration.
    pub config: LungResNetConfig,
    /// Labels the model was trained on, in output order.
    pub class_names: Vec<String>,
    /// Layer the model is meant to be explained at.
    pub target_layer: String,
    /// Side length of the square input.
    pub input_size: usize,
    /// Additional metadata.
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl ModelMetadata {
    /// Create metadata for a model built from `config`.
    ///
    /// The recorded target layer is the last block output, `conv5_block3_out`
    /// for the default layout.
    pub fn new(config: LungResNetConfig) -> Self {
        let target_layer = config
            .layer_names()
            .pop()
            .unwrap_or_else(|| TARGET_LAYER.to_string());
        Self {
            arch: ARCH.to_string(),
            config,
            class_names: CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
            target_layer,
            input_size: INPUT_SIZE,
            extra: HashMap::new(),
        }
    }

    /// Add extra metadata.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Check the metadata against the fixed label set, the input size and
    /// its own architecture config.
    pub fn validate(&self) -> Result<()> {
        if self.arch != ARCH {
            return Err(ModelError::InvalidConfig(format!(
                "unsupported architecture '{}', expected '{ARCH}'",
                self.arch
            )));
        }
        if self.class_names != CLASS_NAMES || self.config.n_classes != CLASS_NAMES.len() {
            return Err(ModelError::InvalidConfig(format!(
                "model labels {:?} ({} outputs) do not match {:?}",
                self.class_names, self.config.n_classes, CLASS_NAMES
            )));
        }
        if self.input_size != INPUT_SIZE {
            return Err(ModelError::InvalidConfig(format!(
                "model expects {0}x{0} input, preprocessing produces {INPUT_SIZE}x{INPUT_SIZE}",
                self.input_size
            )));
        }
        self.config.validate()?;
        if !self.config.layer_names().contains(&self.target_layer) {
            return Err(ModelError::InvalidConfig(format!(
                "target layer '{}' is not a layer of the configured model",
                self.target_layer
            )));
        }
        Ok(())
    }

    /// Save metadata to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let save_err = |reason: String| ModelError::Save {
            path: path.to_path_buf(),
            reason,
        };
        let json = serde_json::to_string_pretty(self).map_err(|e| save_err(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| save_err(e.to_string()))
    }

    /// Load metadata from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let load_err = |reason: String| ModelError::Load {
            path: path.to_path_buf(),
            reason,
        };
        let json = std::fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
        serde_json::from_str(&json).map_err(|e| load_err(e.to_string()))
    }
}

/// Save weights to `path` and metadata next to it.
///
/// `path` follows the rules of [`weights_path`].
pub fn save_model<B: Backend>(
    model: &LungResNet<B>,
    metadata: &ModelMetadata,
    path: impl AsRef<Path>,
) -> Result<()> {
    let path = weights_path(path.as_ref()).map_err(|reason| ModelError::Save {
        path: path.as_ref().to_path_buf(),
        reason,
    })?;
    metadata.save(metadata_path(&path))?;

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    model
        .clone()
        .save_file(path.clone(), &recorder)
        .map_err(|e| ModelError::Save {
            path: path.clone(),
            reason: e.to_string(),
        })?;

    debug!(path = %path.display(), "Saved model");
    Ok(())
}

/// Load metadata and weights written by [`save_model`].
///
/// `path` follows the rules of [`weights_path`]; the file checked, the
/// sidecar and the file read are all derived from the same resolved path.
pub fn load_model<B: Backend>(
    path: impl AsRef<Path>,
    device: &B::Device,
) -> Result<(LungResNet<B>, ModelMetadata)> {
    let path = weights_path(path.as_ref()).map_err(|reason| ModelError::Load {
        path: path.as_ref().to_path_buf(),
        reason,
    })?;
    let load_err = |reason: String| ModelError::Load {
        path: path.clone(),
        reason,
    };

    if !path.is_file() {
        return Err(load_err("file not found".to_string()));
    }

    let metadata = ModelMetadata::load(metadata_path(&path))?;
    metadata.validate().map_err(|e| load_err(e.to_string()))?;

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let model = metadata
        .config
        .init::<B>(device)?
        .load_file(path.clone(), &recorder, device)
        .map_err(|e| load_err(e.to_string()))?;

    Ok((model, metadata))
}
