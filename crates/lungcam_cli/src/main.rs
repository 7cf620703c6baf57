//! lungcam CLI: classify chest X-rays and write Grad-CAM overlays.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lungcam::prelude::*;

#[derive(Parser)]
#[command(name = "lungcam")]
#[command(author, version)]
#[command(about = "Chest X-ray classification with Grad-CAM heatmaps")]
#[command(long_about = "lungcam: classify chest X-rays as Covid-19, Normal, Viral Pneumonia or
Bacterial Pneumonia and show which regions drove the prediction.

EXAMPLES:
  # Diagnose one image, overlay written to ./chest_gradcam.png
  lungcam diagnose chest.png

  # Several images, JSON report, overlays into a directory
  lungcam diagnose a.jpg b.png --out overlays --json

  # Use a model that is not next to the executable
  lungcam diagnose chest.png --model /models/lung_disease_model.mpk

  # List layers a heatmap can be computed for
  lungcam layers")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify images and write Grad-CAM overlays
    Diagnose {
        /// Image files (JPEG, PNG)
        #[arg(required = true, value_name = "IMAGE")]
        images: Vec<PathBuf>,

        /// Model weights (default: lung_disease_model.mpk next to the executable)
        #[arg(long, value_name = "PATH")]
        model: Option<PathBuf>,

        /// Directory for overlay images
        #[arg(long, default_value = ".", value_name = "DIR")]
        out: PathBuf,

        /// Print a JSON report instead of text
        #[arg(long, default_value = "false")]
        json: bool,
    },
    /// List the layers of the model
    Layers {
        /// Model weights (default: lung_disease_model.mpk next to the executable)
        #[arg(long, value_name = "PATH")]
        model: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .init();

    match cli.command {
        Commands::Diagnose {
            images,
            model,
            out,
            json,
        } => handle_diagnose(images, model, out, json),
        Commands::Layers { model } => handle_layers(model),
    }
}

fn open_store(model: Option<PathBuf>) -> Result<ModelStore<DiagnosisBackend>> {
    let device = Default::default();
    match model {
        Some(path) => Ok(ModelStore::new(path, device)),
        None => ModelStore::beside_executable(device)
            .context("Failed to locate the default model path"),
    }
}

/// Load the model up front; without it no request can succeed.
fn load(diagnoser: &Diagnoser<DiagnosisBackend>) -> Result<()> {
    diagnoser
        .store()
        .ensure_loaded()
        .map(|_| ())
        .map_err(|e| anyhow::anyhow!(describe(&DiagnosisError::from(e))))
}

fn describe(err: &DiagnosisError) -> String {
    match err.hint() {
        Some(hint) => format!("{} ({})\n  hint: {}", err, err.kind(), hint),
        None => format!("{} ({})", err, err.kind()),
    }
}

fn overlay_path(out: &Path, image: &Path) -> PathBuf {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    out.join(format!("{stem}_gradcam.png"))
}

fn diagnose_one(
    diagnoser: &Diagnoser<DiagnosisBackend>,
    image: &Path,
    out: &Path,
) -> lungcam::Result<DiagnosisReport> {
    let diagnosis = diagnoser.diagnose_file(image)?;
    let overlay = overlay_path(out, image);
    diagnosis.save_overlay(&overlay)?;

    let mut report = diagnosis.report();
    report.image = Some(image.display().to_string());
    report.overlay = Some(overlay.display().to_string());
    Ok(report)
}

fn print_report(report: &DiagnosisReport) {
    println!("{}", report.image.as_deref().unwrap_or("<image>"));
    println!("  Prediction: {}", report.prediction);
    println!("  Confidence: {}%", report.confidence);
    if let Some(overlay) = &report.overlay {
        println!("  Overlay:    {overlay}");
    }
}

fn handle_diagnose(
    images: Vec<PathBuf>,
    model: Option<PathBuf>,
    out: PathBuf,
    json: bool,
) -> Result<()> {
    std::fs::create_dir_all(&out)
        .with_context(|| format!("Failed to create output directory {}", out.display()))?;

    let diagnoser = Diagnoser::new(open_store(model)?);
    load(&diagnoser)?;
    info!(images = images.len(), out = %out.display(), "Diagnosing");

    let mut reports = Vec::with_capacity(images.len());
    let mut failed = 0usize;
    for image in &images {
        match diagnose_one(&diagnoser, image, &out) {
            Ok(report) => {
                if !json {
                    print_report(&report);
                }
                reports.push(report);
            }
            Err(err) => {
                failed += 1;
                debug!(error = ?err, "Request failed");
                eprintln!("{}: {}", image.display(), describe(&err));
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }

    if failed > 0 {
        bail!("{} of {} images failed", failed, images.len());
    }
    Ok(())
}

fn handle_layers(model: Option<PathBuf>) -> Result<()> {
    let diagnoser = Diagnoser::new(open_store(model)?);
    load(&diagnoser)?;

    let target = diagnoser.engine().target_layer();
    let names = diagnoser
        .layer_names()
        .map_err(|e| anyhow::anyhow!(describe(&e)))?;

    println!("Layers of {}:", diagnoser.store().path().display());
    for name in names {
        let marker = if name == target { "  (Grad-CAM target)" } else { "" };
        println!("  {name}{marker}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lungcam::models::ModelError;

    #[test]
    fn test_cli_parses_diagnose() {
        let cli = Cli::try_parse_from(["lungcam", "-vv", "diagnose", "a.png", "b.jpg", "--json"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Diagnose {
                images, out, json, model,
            } => {
                assert_eq!(images.len(), 2);
                assert_eq!(out, PathBuf::from("."));
                assert!(json);
                assert!(model.is_none());
            }
            Commands::Layers { .. } => panic!("expected diagnose"),
        }
    }

    #[test]
    fn test_diagnose_requires_images() {
        assert!(Cli::try_parse_from(["lungcam", "diagnose"]).is_err());
    }

    #[test]
    fn test_overlay_path() {
        let path = overlay_path(Path::new("out"), Path::new("scans/chest.jpeg"));
        assert_eq!(path, PathBuf::from("out/chest_gradcam.png"));
    }

    #[test]
    fn test_describe_includes_hint() {
        let err = DiagnosisError::from(ModelError::Load {
            path: PathBuf::from("lung_disease_model.mpk"),
            reason: "file not found".to_string(),
        });
        let text = describe(&err);
        assert!(text.contains("model load error"));
        assert!(text.contains("hint:"));
    }
}
