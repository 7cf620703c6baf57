//! Integration tests for the diagnosis pipeline.
//!
//! These tests save a small randomly initialized classifier to a temporary
//! directory and run the full decode -> predict -> explain -> render flow.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use burn::prelude::*;
use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};

use lungcam::core::config::CLASS_NAMES;
use lungcam::models::{save_model, LungResNetConfig, ModelMetadata, ModelStore};
use lungcam::{Diagnoser, ErrorKind};

type DiagnosisBackend = Autodiff<NdArray>;

/// Write a small ResNet checkpoint and return the weights path.
fn write_model(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("lungcam-pipeline-{}-{name}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("Failed to create temp dir");
    let path = dir.join("lung_disease_model.mpk");

    let config = LungResNetConfig {
        stem_filters: 8,
        stage_blocks: vec![1, 1, 1, 3],
        stage_filters: vec![4, 4, 8, 8],
        expansion: 2,
        ..Default::default()
    };
    let device = Default::default();
    <NdArray as Backend>::seed(42);
    let model = config.init::<NdArray>(&device).expect("Failed to build model");
    save_model(&model, &ModelMetadata::new(config), &path).expect("Failed to save model");
    path
}

fn diagnoser(path: &Path) -> Diagnoser<DiagnosisBackend> {
    Diagnoser::new(ModelStore::new(path, Default::default()))
}

fn png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb(rgb)));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("Failed to encode PNG");
    bytes
}

#[test]
fn test_gray_image_end_to_end() {
    let path = write_model("gray");
    let diagnoser = diagnoser(&path);

    let diagnosis = diagnoser
        .diagnose(&png(256, 256, [128, 128, 128]))
        .expect("Diagnosis failed");

    assert!(CLASS_NAMES.contains(&diagnosis.prediction.label));
    let confidence = diagnosis.prediction.confidence();
    assert!((0.0..=100.0).contains(&confidence));

    assert_eq!(diagnosis.heatmap.dims(), (8, 8));
    assert!(diagnosis.heatmap.min() >= 0.0);
    assert!(diagnosis.heatmap.max() <= 1.0);
    assert_eq!(diagnosis.overlay.dimensions(), (256, 256));
}

#[test]
fn test_overlay_matches_original_resolution() {
    let path = write_model("resolution");
    let diagnoser = diagnoser(&path);

    let diagnosis = diagnoser
        .diagnose(&png(317, 211, [30, 90, 200]))
        .expect("Diagnosis failed");
    assert_eq!(diagnosis.overlay.dimensions(), (317, 211));
    assert_eq!(diagnosis.heatmap.dims(), (8, 8));
}

#[test]
fn test_report_keys() {
    let path = write_model("report");
    let diagnoser = diagnoser(&path);

    let diagnosis = diagnoser
        .diagnose(&png(64, 64, [200, 200, 200]))
        .expect("Diagnosis failed");
    let json = serde_json::to_value(diagnosis.report()).expect("Failed to serialize report");

    assert_eq!(json["prediction"], diagnosis.prediction.label);
    let confidence = json["confidence"].as_str().expect("confidence is a string");
    assert_eq!(confidence.split('.').nth(1).map(str::len), Some(2));
    assert_eq!(json["heatmap_shape"], serde_json::json!([8, 8]));
    assert!(json.get("image").is_none());
}

#[test]
fn test_failed_request_keeps_model() {
    let path = write_model("recover");
    let diagnoser = diagnoser(&path);

    let first = diagnoser
        .diagnose(&png(256, 256, [128, 128, 128]))
        .expect("Diagnosis failed");

    let err = diagnoser.diagnose(b"definitely not an image").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Input);
    assert!(diagnoser.store().is_loaded());

    let second = diagnoser
        .diagnose(&png(256, 256, [128, 128, 128]))
        .expect("Diagnosis failed after a bad request");
    assert_eq!(first.prediction.label, second.prediction.label);
    for (a, b) in first.heatmap.values().iter().zip(second.heatmap.values()) {
        assert!((a - b).abs() < 1e-5);
    }
}

#[test]
fn test_missing_model() {
    let path = std::env::temp_dir().join("lungcam-does-not-exist").join("model.mpk");
    let diagnoser = diagnoser(&path);

    let err = diagnoser
        .diagnose(&png(16, 16, [0, 0, 0]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ModelLoad);
    assert!(err.hint().is_some());
    assert!(!diagnoser.store().is_loaded());
}

#[test]
fn test_unknown_target_layer() {
    let path = write_model("layer");
    let store = ModelStore::<DiagnosisBackend>::new(&path, Default::default())
        .with_target_layer("not_a_real_layer");
    let diagnoser = Diagnoser::new(store);

    let err = diagnoser
        .diagnose(&png(16, 16, [0, 0, 0]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn test_layer_names() {
    let path = write_model("names");
    let diagnoser = diagnoser(&path);

    let names = diagnoser.layer_names().expect("Failed to load model");
    assert_eq!(names.first().map(String::as_str), Some("conv1_relu"));
    assert_eq!(names.last().map(String::as_str), Some("conv5_block3_out"));
}

#[test]
fn test_save_overlay() {
    let path = write_model("save");
    let diagnoser = diagnoser(&path);

    let diagnosis = diagnoser
        .diagnose(&png(100, 80, [128, 0, 64]))
        .expect("Diagnosis failed");
    let out = path.with_file_name("scan_gradcam.png");
    diagnosis.save_overlay(&out).expect("Failed to save overlay");

    let written = image::open(&out).expect("Failed to reopen overlay");
    assert_eq!((written.width(), written.height()), (100, 80));
}
