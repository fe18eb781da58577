//! Portable export for mobile inference runtimes.
//!
//! The export is a single JSON document: an image input description, the
//! network as a list of layers with base64 little-endian `f32` blobs, and the
//! class labels. [`ExportedModel`] reads it back and runs it.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::GrayImage;
use log::info;
use serde::{Deserialize, Serialize};

use super::classifier::{argmax, image_features, DrawingClassifier, Parameters};
use super::entities::*;
use super::error::{Error, Result};
use super::rasterizer::to_bitmap_size;

const EXPORT_FORMAT: &str = "drawing_classifier_portable";
const EXPORT_VERSION: u32 = 1;

/// Description of the image the exported network expects.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ImageInput {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub color_space: String,
    // Multiplier applied to 0..255 pixel values
    pub scale: f32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Layer {
    InnerProduct {
        input_channels: usize,
        output_channels: usize,
        weights: String,
        bias: String,
    },
    Softmax,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct ExportDocument {
    format: String,
    version: u32,
    short_description: String,
    input: ImageInput,
    class_label_output: String,
    probability_output: String,
    class_labels: Vec<Label>,
    layers: Vec<Layer>,
}

fn encode_f32s(values: &[f32]) -> String {
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    STANDARD.encode(bytes)
}

fn decode_f32s(blob: &str, expected: usize) -> Result<Vec<f32>> {
    let bytes = STANDARD
        .decode(blob)
        .map_err(|e| Error::IncompatibleModel(format!("weight blob is not base64: {}", e)))?;
    if bytes.len() != expected * 4 {
        return Err(Error::IncompatibleModel(format!(
            "weight blob holds {} bytes, expected {}",
            bytes.len(),
            expected * 4
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

impl DrawingClassifier {
    /// Writes the portable inference file to `path`.
    pub fn export<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let num_classes = self.classes.len();
        let document = ExportDocument {
            format: EXPORT_FORMAT.to_string(),
            version: EXPORT_VERSION,
            short_description: format!(
                "Drawing classifier with {} classes, trained on {} examples",
                num_classes, self.stats.num_examples
            ),
            input: ImageInput {
                name: self.feature.clone(),
                width: BITMAP_WIDTH,
                height: BITMAP_HEIGHT,
                color_space: "GRAYSCALE".to_string(),
                scale: 1.0 / 255.0,
            },
            class_label_output: "classLabel".to_string(),
            probability_output: "labelProbability".to_string(),
            class_labels: self.classes.clone(),
            layers: vec![
                Layer::InnerProduct {
                    input_channels: NUM_FEATURES,
                    output_channels: num_classes,
                    weights: encode_f32s(&self.params.weights),
                    bias: encode_f32s(&self.params.bias),
                },
                Layer::Softmax,
            ],
        };
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer(&mut writer, &document)?;
        writer.flush()?;
        info!("Exported drawing classifier to {}", path.as_ref().display());
        Ok(())
    }
}

/// Prediction of an exported model for one bitmap.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportPrediction {
    pub class_label: Label,
    pub label_probability: Vec<(Label, f32)>,
}

/// An export file loaded back for inference.
#[derive(Debug, Clone)]
pub struct ExportedModel {
    document: ExportDocument,
    params: Parameters,
}

impl ExportedModel {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<ExportedModel> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let document: ExportDocument = serde_json::from_reader(reader)?;
        if document.format != EXPORT_FORMAT || document.version > EXPORT_VERSION {
            return Err(Error::IncompatibleModel(format!(
                "unsupported export `{}` version {}",
                document.format, document.version
            )));
        }
        if (document.input.width, document.input.height) != (BITMAP_WIDTH, BITMAP_HEIGHT) {
            return Err(Error::IncompatibleModel(format!(
                "export expects {}x{} input",
                document.input.width, document.input.height
            )));
        }
        let num_classes = document.class_labels.len();
        if num_classes == 0 {
            return Err(Error::IncompatibleModel("export has no class labels".into()));
        }
        let params = match document.layers.as_slice() {
            [Layer::InnerProduct {
                input_channels,
                output_channels,
                weights,
                bias,
            }, Layer::Softmax]
                if *input_channels == NUM_FEATURES && *output_channels == num_classes =>
            {
                Parameters {
                    weights: decode_f32s(weights, num_classes * NUM_FEATURES)?,
                    bias: decode_f32s(bias, num_classes)?,
                }
            }
            _ => {
                return Err(Error::IncompatibleModel(
                    "expected an inner product layer followed by softmax".into(),
                ))
            }
        };
        Ok(ExportedModel { document, params })
    }

    pub fn input(&self) -> &ImageInput {
        &self.document.input
    }

    pub fn class_labels(&self) -> &[Label] {
        &self.document.class_labels
    }

    pub fn class_label_output(&self) -> &str {
        &self.document.class_label_output
    }

    pub fn probability_output(&self) -> &str {
        &self.document.probability_output
    }

    /// Runs the network on one bitmap, resized to the input size if needed.
    pub fn predict(&self, image: &GrayImage) -> ExportPrediction {
        let probs = self.params.probabilities(&image_features(&to_bitmap_size(image)));
        let labels = &self.document.class_labels;
        ExportPrediction {
            class_label: labels[argmax(&probs)].clone(),
            label_probability: labels.iter().cloned().zip(probs).collect(),
        }
    }
}
