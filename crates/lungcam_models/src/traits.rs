//! Classifier interface used by the Grad-CAM engine.

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Output of a classifier forward pass.
#[derive(Debug, Clone)]
pub enum ModelOutput<B: Backend> {
    /// One probability tensor of shape `(batch, n_classes)`.
    Single(Tensor<B, 2>),
    /// Several heads; the first is the class probabilities.
    Heads(Vec<Tensor<B, 2>>),
}

impl<B: Backend> ModelOutput<B> {
    /// Arity of this output.
    pub fn arity(&self) -> OutputArity {
        match self {
            Self::Single(_) => OutputArity::Single,
            Self::Heads(heads) => OutputArity::FirstOfHeads { heads: heads.len() },
        }
    }
}

/// How a model's output is turned into class probabilities.
///
/// Resolved once when the model is loaded; every request then selects with
/// the same rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputArity {
    /// The model returns a single tensor.
    Single,
    /// The model returns `heads` tensors; the first one is used.
    FirstOfHeads {
        /// Number of heads.
        heads: usize,
    },
}

impl OutputArity {
    /// Resolve the arity from a probe output.
    pub fn resolve<B: Backend>(output: &ModelOutput<B>) -> Result<Self> {
        match output.arity() {
            Self::FirstOfHeads { heads: 0 } => Err(ModelError::InvalidConfig(
                "model produced no output tensors".to_string(),
            )),
            arity => Ok(arity),
        }
    }

    /// Pick the class-probability tensor out of a model output.
    pub fn select<B: Backend>(&self, output: ModelOutput<B>) -> Result<Tensor<B, 2>> {
        let got = output.arity();
        if got != *self {
            return Err(ModelError::OutputMismatch {
                expected: *self,
                got,
            });
        }
        match output {
            ModelOutput::Single(probs) => Ok(probs),
            ModelOutput::Heads(heads) => heads.into_iter().next().ok_or(ModelError::OutputMismatch {
                expected: *self,
                got,
            }),
        }
    }
}

/// A classifier whose forward pass can be split at a named layer.
///
/// Activations are channels-first `(N, C, H, W)`; inputs are channels-last
/// `(N, H, W, C)` as produced by the preprocessor.
pub trait LayeredClassifier<B: Backend> {
    /// Names of the layers that can be probed, in forward order.
    fn layer_names(&self) -> Vec<String>;

    /// Whether `layer` can be probed.
    fn has_layer(&self, layer: &str) -> bool {
        self.layer_names().iter().any(|name| name == layer)
    }

    /// Run the network up to and including `layer`, returning its activation.
    fn forward_to(&self, x: Tensor<B, 4>, layer: &str) -> Result<Tensor<B, 4>>;

    /// Run the rest of the network starting from the activation of `layer`.
    fn forward_from(&self, activation: Tensor<B, 4>, layer: &str) -> Result<ModelOutput<B>>;

    /// Full forward pass.
    fn forward(&self, x: Tensor<B, 4>) -> ModelOutput<B>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use lungcam_core::backend::NdArray;

    type TestBackend = NdArray;

    fn probs() -> Tensor<TestBackend, 2> {
        Tensor::from_floats([[0.1, 0.2, 0.3, 0.4]], &Default::default())
    }

    #[test]
    fn test_single_output_arity() {
        let output = ModelOutput::Single(probs());
        let arity = OutputArity::resolve(&output).unwrap();
        assert_eq!(arity, OutputArity::Single);
        assert_eq!(arity.select(output).unwrap().dims(), [1, 4]);
    }

    #[test]
    fn test_first_head_is_selected() {
        let second = Tensor::<TestBackend, 2>::zeros([1, 2], &Default::default());
        let output = ModelOutput::Heads(vec![probs(), second]);
        let arity = OutputArity::resolve(&output).unwrap();
        assert_eq!(arity, OutputArity::FirstOfHeads { heads: 2 });

        let selected = arity.select(output).unwrap();
        assert_eq!(selected.dims(), [1, 4]);
    }

    #[test]
    fn test_empty_heads_rejected() {
        let output = ModelOutput::<TestBackend>::Heads(Vec::new());
        assert!(matches!(
            OutputArity::resolve(&output),
            Err(ModelError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_arity_mismatch() {
        let err = OutputArity::Single
            .select(ModelOutput::Heads(vec![probs()]))
            .unwrap_err();
        assert!(matches!(err, ModelError::OutputMismatch { .. }));
    }
}
