//! Classification metrics for evaluating a trained drawing classifier.
//!
//! All functions work on class indices. Index `i < n_scored` has a
//! probability column in `probs`; labels that only appear in the evaluation
//! targets get indices past the model's classes.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Serialize;

use super::entities::Label;
use super::error::Error;

// Thresholds of the ROC curve: 0.00, 0.01, ..., 1.00
const ROC_STEPS: usize = 100;

/// A metric name accepted by `evaluate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Auto,
    Accuracy,
    Auc,
    Precision,
    Recall,
    F1Score,
    ConfusionMatrix,
    RocCurve,
}

impl Metric {
    pub const ALL: [Metric; 7] = [
        Metric::Accuracy,
        Metric::Auc,
        Metric::Precision,
        Metric::Recall,
        Metric::F1Score,
        Metric::ConfusionMatrix,
        Metric::RocCurve,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Auto => "auto",
            Metric::Accuracy => "accuracy",
            Metric::Auc => "auc",
            Metric::Precision => "precision",
            Metric::Recall => "recall",
            Metric::F1Score => "f1_score",
            Metric::ConfusionMatrix => "confusion_matrix",
            Metric::RocCurve => "roc_curve",
        }
    }

    /// The concrete metrics this one stands for.
    pub fn expand(self) -> Vec<Metric> {
        match self {
            Metric::Auto => Metric::ALL.to_vec(),
            other => vec![other],
        }
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        std::iter::once(Metric::Auto)
            .chain(Metric::ALL)
            .find(|m| m.name() == s)
            .ok_or_else(|| Error::UnsupportedMetric(s.to_string()))
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ConfusionEntry {
    pub target_label: Label,
    pub predicted_label: Label,
    pub count: usize,
}

/// One point of a one-vs-rest ROC curve.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RocPoint {
    pub class: Label,
    pub threshold: f64,
    pub fpr: f64,
    pub tpr: f64,
    // Number of positive and negative examples for this class
    pub p: usize,
    pub n: usize,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum MetricValue {
    Scalar(f64),
    ConfusionMatrix(Vec<ConfusionEntry>),
    RocCurve(Vec<RocPoint>),
}

impl MetricValue {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            MetricValue::Scalar(v) => Some(*v),
            _ => None,
        }
    }
}

/// Metric name to value, as returned by `evaluate`.
pub type Evaluation = BTreeMap<String, MetricValue>;

pub(crate) fn accuracy(pred: &[usize], truth: &[usize]) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let correct = pred.iter().zip(truth).filter(|(p, t)| p == t).count();
    correct as f64 / truth.len() as f64
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Macro-averaged precision, recall and F1 over the scored classes that occur
/// in either the targets or the predictions. Labels from `n_scored` on only
/// appear as targets and are left out of the average.
pub(crate) fn precision_recall_f1(
    pred: &[usize],
    truth: &[usize],
    n_labels: usize,
    n_scored: usize,
) -> (f64, f64, f64) {
    let mut tp = vec![0usize; n_labels];
    let mut fp = vec![0usize; n_labels];
    let mut fn_counts = vec![0usize; n_labels];
    for (&p, &t) in pred.iter().zip(truth) {
        if p == t {
            tp[p] += 1;
        } else {
            fp[p] += 1;
            fn_counts[t] += 1;
        }
    }
    let present: Vec<usize> = (0..n_scored.min(n_labels))
        .filter(|&c| tp[c] + fp[c] + fn_counts[c] > 0)
        .collect();
    if present.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let mut precision = 0.0;
    let mut recall = 0.0;
    let mut f1 = 0.0;
    for &c in &present {
        let p = ratio(tp[c], tp[c] + fp[c]);
        let r = ratio(tp[c], tp[c] + fn_counts[c]);
        precision += p;
        recall += r;
        if p + r > 0.0 {
            f1 += 2.0 * p * r / (p + r);
        }
    }
    let count = present.len() as f64;
    (precision / count, recall / count, f1 / count)
}

// Area under the ROC curve from ranks (Mann-Whitney U), ties share their average rank
fn binary_auc(scores: &[f32], positive: &[bool]) -> Option<f64> {
    let n_pos = positive.iter().filter(|&&p| p).count();
    let n_neg = positive.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));
    let mut rank_sum = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // Ranks are 1-based
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &ix in &order[i..=j] {
            if positive[ix] {
                rank_sum += avg_rank;
            }
        }
        i = j + 1;
    }
    let n_pos = n_pos as f64;
    Some((rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64))
}

/// Macro one-vs-rest AUC over scored classes with both positive and negative
/// examples; 0.5 when no class qualifies.
pub(crate) fn auc(probs: &[Vec<f32>], truth: &[usize], n_scored: usize) -> f64 {
    let mut total = 0.0;
    let mut count = 0;
    for c in 0..n_scored {
        let scores: Vec<f32> = probs.iter().map(|p| p[c]).collect();
        let positive: Vec<bool> = truth.iter().map(|&t| t == c).collect();
        if let Some(v) = binary_auc(&scores, &positive) {
            total += v;
            count += 1;
        }
    }
    if count == 0 {
        0.5
    } else {
        total / count as f64
    }
}

/// Non-zero cells of the confusion matrix, ordered by target then predicted label.
pub(crate) fn confusion_matrix(pred: &[usize], truth: &[usize], labels: &[Label]) -> Vec<ConfusionEntry> {
    let mut counts: BTreeMap<(&Label, &Label), usize> = BTreeMap::new();
    for (&p, &t) in pred.iter().zip(truth) {
        *counts.entry((&labels[t], &labels[p])).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .map(|((target, predicted), count)| ConfusionEntry {
            target_label: target.clone(),
            predicted_label: predicted.clone(),
            count,
        })
        .collect()
}

/// One-vs-rest ROC curve for each scored class at fixed thresholds.
pub(crate) fn roc_curve(probs: &[Vec<f32>], truth: &[usize], labels: &[Label], n_scored: usize) -> Vec<RocPoint> {
    let mut res = Vec::with_capacity(n_scored * (ROC_STEPS + 1));
    for c in 0..n_scored {
        let p = truth.iter().filter(|&&t| t == c).count();
        let n = truth.len() - p;
        for step in 0..=ROC_STEPS {
            let threshold = step as f64 / ROC_STEPS as f64;
            let mut tp = 0;
            let mut fp = 0;
            for (row, &t) in truth.iter().enumerate() {
                if probs[row][c] as f64 >= threshold {
                    if t == c {
                        tp += 1;
                    } else {
                        fp += 1;
                    }
                }
            }
            res.push(RocPoint {
                class: labels[c].clone(),
                threshold,
                fpr: ratio(fp, n),
                tpr: ratio(tp, p),
                p,
                n,
            });
        }
    }
    res
}

/// Computes the requested metrics.
pub(crate) fn evaluate(
    metric: Metric,
    pred: &[usize],
    truth: &[usize],
    probs: &[Vec<f32>],
    labels: &[Label],
    n_scored: usize,
) -> Evaluation {
    let mut res = Evaluation::new();
    let mut prf = None;
    for m in metric.expand() {
        let mut scores = || *prf.get_or_insert_with(|| precision_recall_f1(pred, truth, labels.len(), n_scored));
        let value = match m {
            Metric::Accuracy => MetricValue::Scalar(accuracy(pred, truth)),
            Metric::Auc => MetricValue::Scalar(auc(probs, truth, n_scored)),
            Metric::Precision => MetricValue::Scalar(scores().0),
            Metric::Recall => MetricValue::Scalar(scores().1),
            Metric::F1Score => MetricValue::Scalar(scores().2),
            Metric::ConfusionMatrix => MetricValue::ConfusionMatrix(confusion_matrix(pred, truth, labels)),
            Metric::RocCurve => MetricValue::RocCurve(roc_curve(probs, truth, labels, n_scored)),
            Metric::Auto => continue,
        };
        res.insert(m.name().to_string(), value);
    }
    res
}
