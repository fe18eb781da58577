use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use image::GrayImage;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::entities::*;
use super::error::{Error, Result};
use super::evaluation::{self, Evaluation, Metric};
use super::match_collector::MatchCollector;
use super::persistence::load_model;
use super::rasterizer::draw_strokes_column;
use super::table::{Column, DrawingTable};
use super::validation::{feature_column, validate_dataset};
use super::Match;

// Feature column used when none is given and the table has more than one candidate
const DEFAULT_FEATURE: &str = "drawing";

/// Where the initial weights come from.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum WarmStart {
    /// All weights start at zero.
    #[default]
    Scratch,
    /// Start from a model saved with [`DrawingClassifier::save`]. Weights are
    /// copied for every class the saved model knows; other classes start at zero.
    Pretrained(PathBuf),
}

/// Options for [`create`].
#[derive(Debug, Clone, PartialEq)]
pub struct CreateOptions {
    /// Drawing column; inferred when `None`.
    pub feature: Option<String>,
    /// Number of mini-batch steps.
    pub max_iterations: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    pub warm_start: WarmStart,
    /// Seed of the shuffling RNG; the same seed and data give the same model.
    pub seed: u64,
}

impl Default for CreateOptions {
    fn default() -> Self {
        CreateOptions {
            feature: None,
            max_iterations: 500,
            batch_size: 32,
            learning_rate: 0.5,
            warm_start: WarmStart::Scratch,
            seed: 42,
        }
    }
}

impl CreateOptions {
    pub fn with_feature(mut self, feature: &str) -> Self {
        self.feature = Some(feature.to_string());
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_warm_start(mut self, warm_start: WarmStart) -> Self {
        self.warm_start = warm_start;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn check(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(Error::InvalidOption("max_iterations must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidOption("batch_size must be positive".into()));
        }
        if !(self.learning_rate > 0.0) || !self.learning_rate.is_finite() {
            return Err(Error::InvalidOption(format!(
                "learning_rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

/// Weights (`classes x NUM_FEATURES`, row-major) and one bias per class.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct Parameters {
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
}

impl Parameters {
    fn zeros(num_classes: usize) -> Parameters {
        Parameters {
            weights: vec![0.0; num_classes * NUM_FEATURES],
            bias: vec![0.0; num_classes],
        }
    }

    pub fn num_classes(&self) -> usize {
        self.bias.len()
    }

    pub fn probabilities(&self, x: &[f32]) -> Vec<f32> {
        let mut logits: Vec<f32> = self
            .weights
            .chunks(NUM_FEATURES)
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(x).map(|(w, v)| w * v).sum::<f32>() + b)
            .collect();
        softmax(&mut logits);
        logits
    }
}

pub(crate) fn softmax(values: &mut [f32]) {
    let max = values.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in values.iter_mut() {
        *v /= sum;
    }
}

// Index of the largest value; the first one wins ties
pub(crate) fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (ix, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = ix;
        }
    }
    best
}

/// Pixels scaled to 0..1, row-major. Expects a 28x28 bitmap.
pub(crate) fn image_features(image: &GrayImage) -> Vec<f32> {
    image.as_raw().iter().map(|&p| p as f32 / 255.0).collect()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TrainingStats {
    pub num_examples: usize,
    pub num_classes: usize,
    pub iterations: usize,
    pub training_loss: f32,
    pub training_accuracy: f64,
    pub training_time_secs: f64,
    pub warm_started: bool,
}

/// A trained drawing classifier.
#[derive(Debug, Clone)]
pub struct DrawingClassifier {
    pub(crate) feature: String,
    pub(crate) target: String,
    pub(crate) label_kind: LabelKind,
    // Sorted; index i is the class scored by row i of the weights
    pub(crate) classes: Vec<Label>,
    pub(crate) params: Parameters,
    pub(crate) stats: TrainingStats,
}

fn resolve_feature(table: &DrawingTable, target: &str, feature: Option<&str>) -> Result<String> {
    if let Some(feature) = feature {
        return Ok(feature.to_string());
    }
    let candidates: Vec<&str> = table
        .column_names()
        .into_iter()
        .filter(|name| *name != target)
        .collect();
    match candidates.as_slice() {
        [only] => Ok(only.to_string()),
        _ if table.column(DEFAULT_FEATURE).is_some() => Ok(DEFAULT_FEATURE.to_string()),
        _ => Err(Error::invalid_input(format!(
            "cannot infer the feature column from {:?}; pass it explicitly",
            candidates
        ))),
    }
}

fn label_column<'a>(table: &'a DrawingTable, target: &str) -> Result<&'a [Label]> {
    match table.column(target) {
        Some(Column::Labels(labels)) => Ok(labels),
        _ => Err(Error::invalid_input(format!(
            "target column `{}` with labels not found",
            target
        ))),
    }
}

fn warm_start_parameters(path: &Path, classes: &[Label]) -> Result<Parameters> {
    let pretrained = load_model(path)?;
    let mut params = Parameters::zeros(classes.len());
    let mut copied = 0;
    for (c, label) in classes.iter().enumerate() {
        if let Ok(ix) = pretrained.classes.binary_search(label) {
            params.weights[c * NUM_FEATURES..(c + 1) * NUM_FEATURES]
                .copy_from_slice(&pretrained.params.weights[ix * NUM_FEATURES..(ix + 1) * NUM_FEATURES]);
            params.bias[c] = pretrained.params.bias[ix];
            copied += 1;
        }
    }
    info!(
        "Warm start from {}: reused weights for {} of {} classes",
        path.display(),
        copied,
        classes.len()
    );
    Ok(params)
}

/// Trains a drawing classifier on `table`, predicting the `target` column.
///
/// The feature column may hold stroke drawings, which are validated and
/// rasterized, or bitmaps of any size. Any invalid drawing fails the call
/// before training starts.
pub fn create(table: &DrawingTable, target: &str, options: CreateOptions) -> Result<DrawingClassifier> {
    options.check()?;
    let feature = resolve_feature(table, target, options.feature.as_deref())?;
    validate_dataset(table, &feature, target)?;
    let start = Instant::now();

    let bitmaps = draw_strokes_column(feature_column(table, &feature)?)?;
    let labels = label_column(table, target)?;
    let label_kind = labels[0].kind();
    let mut classes = labels.to_vec();
    classes.sort();
    classes.dedup();
    let targets: Vec<usize> = labels
        .iter()
        .map(|l| classes.binary_search(l).unwrap_or_else(|ix| ix))
        .collect();

    let blank = bitmaps.iter().filter(|b| b.as_raw().iter().all(|&p| p == 0)).count();
    if blank > 0 {
        warn!("{} of {} training drawings are blank", blank, bitmaps.len());
    }
    let features: Vec<Vec<f32>> = bitmaps.iter().map(image_features).collect();

    let (mut params, warm_started) = match &options.warm_start {
        WarmStart::Scratch => (Parameters::zeros(classes.len()), false),
        WarmStart::Pretrained(path) => (warm_start_parameters(path, &classes)?, true),
    };

    let num_examples = features.len();
    let num_classes = classes.len();
    let batch_size = options.batch_size.min(num_examples);
    info!(
        "Training drawing classifier: {} examples, {} classes, {} iterations",
        num_examples, num_classes, options.max_iterations
    );

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut order: Vec<usize> = (0..num_examples).collect();
    order.shuffle(&mut rng);
    let mut cursor = 0;
    let mut grad_w = vec![0f32; num_classes * NUM_FEATURES];
    let mut grad_b = vec![0f32; num_classes];
    for iteration in 1..=options.max_iterations {
        grad_w.fill(0.0);
        grad_b.fill(0.0);
        let mut batch_loss = 0.0;
        for _ in 0..batch_size {
            // Reshuffle at the end of each pass over the data
            if cursor == num_examples {
                order.shuffle(&mut rng);
                cursor = 0;
            }
            let ix = order[cursor];
            cursor += 1;

            let x = &features[ix];
            let probs = params.probabilities(x);
            batch_loss -= probs[targets[ix]].max(f32::MIN_POSITIVE).ln();
            for c in 0..num_classes {
                let g = if c == targets[ix] { probs[c] - 1.0 } else { probs[c] };
                grad_b[c] += g;
                let row = &mut grad_w[c * NUM_FEATURES..(c + 1) * NUM_FEATURES];
                for (gw, v) in row.iter_mut().zip(x) {
                    *gw += g * v;
                }
            }
        }
        let step = options.learning_rate / batch_size as f32;
        for (w, g) in params.weights.iter_mut().zip(&grad_w) {
            *w -= step * g;
        }
        for (b, g) in params.bias.iter_mut().zip(&grad_b) {
            *b -= step * g;
        }
        debug!(
            "Iteration {}/{}: batch loss {:.5}",
            iteration,
            options.max_iterations,
            batch_loss / batch_size as f32
        );
    }

    let mut loss = 0.0;
    let mut predicted = Vec::with_capacity(num_examples);
    for (x, &t) in features.iter().zip(&targets) {
        let probs = params.probabilities(x);
        loss -= probs[t].max(f32::MIN_POSITIVE).ln();
        predicted.push(argmax(&probs));
    }
    let stats = TrainingStats {
        num_examples,
        num_classes,
        iterations: options.max_iterations,
        training_loss: loss / num_examples as f32,
        training_accuracy: evaluation::accuracy(&predicted, &targets),
        training_time_secs: start.elapsed().as_secs_f64(),
        warm_started,
    };
    info!(
        "Finished training in {:.3}s: loss {:.5}, accuracy {:.3}",
        stats.training_time_secs, stats.training_loss, stats.training_accuracy
    );

    Ok(DrawingClassifier {
        feature,
        target: target.to_string(),
        label_kind,
        classes,
        params,
        stats,
    })
}

impl DrawingClassifier {
    pub fn feature(&self) -> &str {
        &self.feature
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn classes(&self) -> &[Label] {
        &self.classes
    }

    pub fn label_kind(&self) -> LabelKind {
        self.label_kind
    }

    pub fn stats(&self) -> &TrainingStats {
        &self.stats
    }

    pub(crate) fn probabilities_for_bitmaps(&self, bitmaps: &[GrayImage]) -> Vec<Vec<f32>> {
        bitmaps
            .iter()
            .map(|b| self.params.probabilities(&image_features(b)))
            .collect()
    }

    /// Class probabilities for every drawing of `column`, in class order.
    pub fn predict_probabilities(&self, column: &Column) -> Result<Vec<Vec<f32>>> {
        let bitmaps = draw_strokes_column(column)?;
        Ok(self.probabilities_for_bitmaps(&bitmaps))
    }

    /// Most likely label for every drawing of `column`.
    pub fn predict_column(&self, column: &Column) -> Result<Vec<Label>> {
        Ok(self
            .predict_probabilities(column)?
            .iter()
            .map(|probs| self.classes[argmax(probs)].clone())
            .collect())
    }

    /// Most likely label for every row, read from the model's feature column.
    pub fn predict(&self, table: &DrawingTable) -> Result<Vec<Label>> {
        self.predict_column(feature_column(table, &self.feature)?)
    }

    /// The `k` most likely labels per drawing, best first.
    pub fn predict_topk(&self, column: &Column, k: usize) -> Result<Vec<Vec<Match>>> {
        if k == 0 {
            return Err(Error::InvalidOption("k must be positive".into()));
        }
        let mut res = Vec::with_capacity(column.len());
        for probs in self.predict_probabilities(column)? {
            let mut matches: Vec<Match> = Vec::with_capacity(k.min(self.classes.len()));
            let mut collector = MatchCollector::new(&mut matches, k);
            for (label, score) in self.classes.iter().zip(probs) {
                collector.file_match(Match {
                    label: label.clone(),
                    score,
                });
            }
            res.push(matches);
        }
        Ok(res)
    }

    /// Evaluates the model against the target column of `table`.
    ///
    /// `metric` is `"auto"` for every metric, or one metric name.
    pub fn evaluate(&self, table: &DrawingTable, metric: &str) -> Result<Evaluation> {
        let metric: Metric = metric.parse()?;
        validate_dataset(table, &self.feature, &self.target)?;
        let targets = label_column(table, &self.target)?;
        if targets[0].kind() != self.label_kind {
            return Err(Error::invalid_input(format!(
                "target column `{}` holds {} labels but the model was trained on {} labels",
                self.target,
                targets[0].kind(),
                self.label_kind
            )));
        }

        // Model classes first, then labels never seen in training
        let mut labels = self.classes.clone();
        let mut unseen: Vec<Label> = targets
            .iter()
            .filter(|t| self.classes.binary_search(t).is_err())
            .cloned()
            .collect();
        unseen.sort();
        unseen.dedup();
        labels.extend(unseen);
        let index_of = |label: &Label| match self.classes.binary_search(label) {
            Ok(ix) => ix,
            Err(_) => labels[self.classes.len()..]
                .iter()
                .position(|l| l == label)
                .map_or(0, |ix| self.classes.len() + ix),
        };
        let truth: Vec<usize> = targets.iter().map(index_of).collect();

        let probs = self.predict_probabilities(feature_column(table, &self.feature)?)?;
        let pred: Vec<usize> = probs.iter().map(|p| argmax(p)).collect();
        Ok(evaluation::evaluate(metric, &pred, &truth, &probs, &labels, self.classes.len()))
    }

    /// Human-readable description of the model and its training.
    pub fn summary(&self) -> String {
        let rows: Vec<(&str, String)> = vec![
            ("Number of classes", self.classes.len().to_string()),
            ("Feature column", self.feature.clone()),
            ("Target column", self.target.clone()),
            ("Label type", self.label_kind.to_string()),
        ];
        let training: Vec<(&str, String)> = vec![
            ("Training iterations", self.stats.iterations.to_string()),
            ("Training accuracy", format!("{:.4}", self.stats.training_accuracy)),
            ("Training loss", format!("{:.4}", self.stats.training_loss)),
            ("Training time (sec)", format!("{:.4}", self.stats.training_time_secs)),
            ("Number of examples", self.stats.num_examples.to_string()),
            ("Warm start", self.stats.warm_started.to_string()),
        ];
        let mut res = String::from("Class                                    : DrawingClassifier\n");
        for (title, section) in [("Schema", rows), ("Training summary", training)] {
            res.push('\n');
            res.push_str(title);
            res.push('\n');
            res.push_str(&"-".repeat(title.len()));
            res.push('\n');
            for (name, value) in section {
                res.push_str(&format!("{:<41}: {}\n", name, value));
            }
        }
        res
    }
}

impl fmt::Display for DrawingClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}
