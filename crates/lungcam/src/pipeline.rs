//! Single-request diagnosis: decode, preprocess, predict, explain, render.

use std::path::Path;

use burn::tensor::backend::AutodiffBackend;
use image::{DynamicImage, GenericImageView, RgbImage};
use serde::Serialize;
use tracing::{debug, info};

use lungcam_core::{Prediction, Preprocessor};
use lungcam_explain::{render, GradCam, Heatmap};
use lungcam_models::{LayeredClassifier, ModelStore};

use crate::error::Result;

/// Result of diagnosing one image.
#[derive(Debug, Clone)]
pub struct Diagnosis {
    /// Predicted label and confidence.
    pub prediction: Prediction,
    /// Grad-CAM map at the target layer's resolution.
    pub heatmap: Heatmap,
    /// The decoded input image.
    pub original: DynamicImage,
    /// Heatmap blended over the original, same dimensions as the original.
    pub overlay: RgbImage,
}

/// Serializable summary of a [`Diagnosis`].
///
/// `prediction` and `confidence` use the keys of a `/predict` style response.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosisReport {
    /// Source of the image, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Predicted label.
    pub prediction: String,
    /// Confidence percentage with two decimals.
    pub confidence: String,
    /// Index of the predicted class.
    pub class_index: usize,
    /// Probability per class, in label order.
    pub probabilities: Vec<f32>,
    /// `[height, width]` of the raw heatmap.
    pub heatmap_shape: [usize; 2],
    /// Where the overlay was written, when it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay: Option<String>,
}

impl Diagnosis {
    /// Summary suitable for JSON output.
    pub fn report(&self) -> DiagnosisReport {
        let (height, width) = self.heatmap.dims();
        DiagnosisReport {
            image: None,
            prediction: self.prediction.label.to_string(),
            confidence: format!("{:.2}", self.prediction.confidence()),
            class_index: self.prediction.class_index,
            probabilities: self.prediction.probabilities.clone(),
            heatmap_shape: [height, width],
            overlay: None,
        }
    }

    /// Write the overlay as an image file; the format follows the extension.
    pub fn save_overlay(&self, path: impl AsRef<Path>) -> Result<()> {
        self.overlay.save(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "Saved overlay");
        Ok(())
    }
}

/// Runs the diagnosis flow against a lazily loaded classifier.
///
/// The model is loaded on the first request and reused afterwards; a failed
/// request leaves the cached model untouched.
pub struct Diagnoser<B: AutodiffBackend> {
    store: ModelStore<B>,
    preprocessor: Preprocessor,
    engine: GradCam,
}

impl<B: AutodiffBackend> Diagnoser<B> {
    /// Diagnoser explaining the store's target layer.
    pub fn new(store: ModelStore<B>) -> Self {
        let engine = GradCam::new(store.target_layer());
        Self {
            store,
            preprocessor: Preprocessor::default(),
            engine,
        }
    }

    /// Model store backing this diagnoser.
    pub fn store(&self) -> &ModelStore<B> {
        &self.store
    }

    /// Grad-CAM engine in use.
    pub fn engine(&self) -> &GradCam {
        &self.engine
    }

    /// Layer names the loaded classifier exposes.
    pub fn layer_names(&self) -> Result<Vec<String>> {
        Ok(self.store.ensure_loaded()?.model().layer_names())
    }

    /// Diagnose encoded image bytes.
    pub fn diagnose(&self, bytes: &[u8]) -> Result<Diagnosis> {
        let image = Preprocessor::decode(bytes)?;
        self.diagnose_image(image)
    }

    /// Diagnose an image file.
    pub fn diagnose_file(&self, path: impl AsRef<Path>) -> Result<Diagnosis> {
        let image = Preprocessor::open(path)?;
        self.diagnose_image(image)
    }

    /// Diagnose an already decoded image.
    pub fn diagnose_image(&self, image: DynamicImage) -> Result<Diagnosis> {
        let classifier = self.store.ensure_loaded()?;
        let input = self
            .preprocessor
            .to_tensor::<B>(&image, classifier.device())?;

        let prediction = classifier.predict(input.clone())?;
        let explanation = self.engine.explain(classifier, input)?;
        let overlay = render::overlay(&image, &explanation.heatmap)?;

        let (width, height) = image.dimensions();
        info!(
            label = prediction.label,
            confidence = %prediction.confidence_display(),
            width,
            height,
            "Diagnosis complete"
        );

        Ok(Diagnosis {
            prediction,
            heatmap: explanation.heatmap,
            original: image,
            overlay,
        })
    }
}
