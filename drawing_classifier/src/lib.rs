//! Drawing classifier toolkit.
//!
//! Validates stroke-based drawings, rasterizes them into 28x28 single-channel
//! bitmaps, and trains, evaluates, saves and exports a small classifier over
//! those bitmaps.

mod classifier;
mod entities;
mod error;
mod evaluation;
mod export;
mod match_collector;
mod persistence;
mod rasterizer;
mod table;
mod validation;

use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

pub use classifier::{create, CreateOptions, DrawingClassifier, TrainingStats, WarmStart};
pub use entities::*;
pub use error::{Error, Result};
pub use evaluation::{ConfusionEntry, Evaluation, Metric, MetricValue, RocPoint};
pub use export::{ExportPrediction, ExportedModel, ImageInput};
pub use image::GrayImage;
pub use persistence::load_model;
pub use rasterizer::{draw_strokes, draw_strokes_column, to_bitmap_size, DrawStrokes};
pub use table::{Column, ColumnKind, DrawingTable};
pub use validation::{validate, validate_dataset, validate_drawing, validate_strokes};

/// Rasterizes one drawing handed over from JavaScript.
///
/// Input is an array of strokes, each an array of `{x, y}` objects; output is
/// the 28x28 bitmap as row-major luma bytes.
#[wasm_bindgen]
pub fn draw_strokes_js(input: &JsValue) -> std::result::Result<Vec<u8>, JsValue> {
    #[allow(deprecated)]
    let raw: RawDrawing = input
        .into_serde()
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    let drawing = validate_drawing(&raw).map_err(|e| JsValue::from_str(&e.to_string()))?;
    Ok(draw_strokes(&drawing).into_raw())
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Stroke {
    pub points: Vec<Point>,
}

/// A validated stroke drawing. May hold no strokes, and strokes may hold no points.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Drawing {
    pub strokes: Vec<Stroke>,
}

impl Drawing {
    pub fn new(strokes: Vec<Stroke>) -> Drawing {
        Drawing { strokes }
    }

    pub fn num_points(&self) -> usize {
        self.strokes.iter().map(|s| s.points.len()).sum()
    }
}

/// One entry of a top-k prediction.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Match {
    pub label: Label,
    pub score: f32,
}
