//! Gradient-weighted Class Activation Mapping (Grad-CAM).
//!
//! Reference: Selvaraju et al., "Grad-CAM: Visual Explanations from Deep
//! Networks via Gradient-based Localization", ICCV 2017.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use tracing::{debug, warn};

use lungcam_core::argmax;
use lungcam_core::config::{HEATMAP_EPSILON, TARGET_LAYER};
use lungcam_core::Preprocessor;
use lungcam_models::{LayeredClassifier, LoadedClassifier};

use crate::error::{ExplainError, Result};
use crate::heatmap::Heatmap;

/// Compute a normalized Grad-CAM map from a layer's activations and the
/// gradients of the class score with respect to them.
///
/// # Arguments
///
/// * `activations` - Target layer activations (1, channels, height, width)
/// * `gradients` - Gradients w.r.t. the activations, same shape
///
/// # Returns
///
/// Heatmap of shape (height, width) with values in [0, 1]. All-zero
/// gradients give an all-zero map.
pub fn compute_heatmap<B: Backend>(
    activations: Tensor<B, 4>,
    gradients: Tensor<B, 4>,
) -> Result<Heatmap> {
    let dims = activations.dims();
    if dims != gradients.dims() {
        return Err(ExplainError::ShapeMismatch(format!(
            "activations {:?} != gradients {:?}",
            dims,
            gradients.dims()
        )));
    }
    let [batch, _, height, width] = dims;
    if batch != 1 {
        return Err(ExplainError::ShapeMismatch(format!(
            "expected a single image, got a batch of {batch}"
        )));
    }

    // Global average pool the gradients: (1, C, H, W) -> (1, C, 1, 1)
    let weights = gradients.mean_dim(3).mean_dim(2);

    // Weight the activations and sum across channels: -> (1, 1, H, W)
    let cam = (activations * weights).sum_dim(1);

    // ReLU
    let cam = cam.clamp_min(0.0);

    let max: f32 = cam.clone().max().into_scalar().elem();
    let denominator = if max > 0.0 { max } else { HEATMAP_EPSILON };

    let values = (cam / denominator)
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| ExplainError::TensorData(format!("{e:?}")))?;
    Heatmap::from_shape_vec(height, width, values)
}

/// Result of explaining one prediction.
#[derive(Debug, Clone)]
pub struct Explanation {
    /// Normalized map at the target layer's resolution.
    pub heatmap: Heatmap,
    /// Class the heatmap explains (argmax of `probabilities`).
    pub class_index: usize,
    /// Class probabilities from the explained forward pass.
    pub probabilities: Vec<f32>,
}

/// Grad-CAM engine for one target layer.
#[derive(Debug, Clone)]
pub struct GradCam {
    target_layer: String,
}

impl Default for GradCam {
    fn default() -> Self {
        Self::new(TARGET_LAYER)
    }
}

impl GradCam {
    /// Engine explaining `target_layer`.
    pub fn new(target_layer: impl Into<String>) -> Self {
        Self {
            target_layer: target_layer.into(),
        }
    }

    /// Name of the explained layer.
    pub fn target_layer(&self) -> &str {
        &self.target_layer
    }

    /// Explain the predicted class for a preprocessed `(1, 256, 256, 3)` input.
    ///
    /// The activation of the target layer is re-rooted as a gradient-tracked
    /// leaf, the remaining layers run from it, and the predicted class
    /// probability is backpropagated to it.
    ///
    /// # Errors
    ///
    /// [`ExplainError::LayerNotFound`] when the classifier has no such layer.
    pub fn explain<B, M>(
        &self,
        classifier: &LoadedClassifier<B, M>,
        input: Tensor<B, 4>,
    ) -> Result<Explanation>
    where
        B: AutodiffBackend,
        M: LayeredClassifier<B>,
    {
        let model = classifier.model();
        if !model.has_layer(&self.target_layer) {
            return Err(ExplainError::LayerNotFound {
                layer: self.target_layer.clone(),
                available: model.layer_names(),
            });
        }
        Preprocessor::validate(&input)?;

        let activation = model
            .forward_to(input, &self.target_layer)?
            .detach()
            .require_grad();
        let output = model.forward_from(activation.clone(), &self.target_layer)?;
        let probs = classifier.arity().select(output)?;

        let [_, n_classes] = probs.dims();
        let probabilities = probs
            .clone()
            .slice([0..1, 0..n_classes])
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| ExplainError::TensorData(format!("{e:?}")))?;
        let class_index = argmax(&probabilities).ok_or_else(|| {
            ExplainError::ShapeMismatch("classifier returned no probabilities".to_string())
        })?;

        let score = probs.slice([0..1, class_index..class_index + 1]).sum();
        let grads = score.backward();
        let gradients = activation
            .grad(&grads)
            .ok_or_else(|| ExplainError::MissingGradient(self.target_layer.clone()))?;

        let heatmap = compute_heatmap(activation.inner(), gradients)?;
        if heatmap.is_degenerate() {
            warn!(layer = %self.target_layer, "No positive activation for predicted class");
        }
        debug!(
            layer = %self.target_layer,
            class_index,
            dims = ?heatmap.dims(),
            "Computed Grad-CAM heatmap"
        );

        Ok(Explanation {
            heatmap,
            class_index,
            probabilities,
        })
    }
}
