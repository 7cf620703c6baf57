//! Predicted class and confidence.

use serde::Serialize;

use crate::config::CLASS_NAMES;
use crate::error::{CoreError, Result};

/// Index of the largest value; the first one wins on ties.
///
/// Returns `None` for an empty slice.
pub fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
            Some((_, b)) if v <= b => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// A single classification result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// Index into the class label set.
    pub class_index: usize,
    /// Human-readable label.
    pub label: &'static str,
    /// Probability of the predicted class.
    pub probability: f32,
    /// Full probability vector.
    pub probabilities: Vec<f32>,
}

impl Prediction {
    /// Build a prediction from the classifier's probability vector.
    ///
    /// # Errors
    ///
    /// Fails when the vector length differs from the label set.
    pub fn from_probabilities(probabilities: Vec<f32>) -> Result<Self> {
        if probabilities.len() != CLASS_NAMES.len() {
            return Err(CoreError::LabelMismatch {
                expected: CLASS_NAMES.len(),
                got: probabilities.len(),
            });
        }
        let class_index = argmax(&probabilities).ok_or(CoreError::LabelMismatch {
            expected: CLASS_NAMES.len(),
            got: 0,
        })?;

        Ok(Self {
            class_index,
            label: CLASS_NAMES[class_index],
            probability: probabilities[class_index],
            probabilities,
        })
    }

    /// Confidence as a percentage in `[0, 100]`.
    #[must_use]
    pub fn confidence(&self) -> f32 {
        (self.probability * 100.0).clamp(0.0, 100.0)
    }

    /// Confidence formatted with two decimals, e.g. `"87.25%"`.
    #[must_use]
    pub fn confidence_display(&self) -> String {
        format!("{:.2}%", self.confidence())
    }
}

impl std::fmt::Display for Prediction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.label, self.confidence_display())
    }
}
