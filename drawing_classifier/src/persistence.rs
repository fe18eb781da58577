use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use super::classifier::{DrawingClassifier, Parameters, TrainingStats};
use super::entities::*;
use super::error::{Error, Result};

const FORMAT_NAME: &str = "drawing_classifier";
const FORMAT_VERSION: u32 = 1;
const METADATA_FILE: &str = "metadata.json";
const PARAMETERS_FILE: &str = "model.bin";

// Human-readable half of a saved model; weights go to the binary file
#[derive(Serialize, Deserialize, Debug)]
struct ModelMetadata {
    format: String,
    version: u32,
    feature: String,
    target: String,
    label_kind: LabelKind,
    classes: Vec<Label>,
    num_features: usize,
    stats: TrainingStats,
}

impl DrawingClassifier {
    /// Saves the model into directory `dir`, creating it if needed.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let metadata = ModelMetadata {
            format: FORMAT_NAME.to_string(),
            version: FORMAT_VERSION,
            feature: self.feature.clone(),
            target: self.target.clone(),
            label_kind: self.label_kind,
            classes: self.classes.clone(),
            num_features: NUM_FEATURES,
            stats: self.stats.clone(),
        };
        let mut writer = BufWriter::new(File::create(dir.join(METADATA_FILE))?);
        serde_json::to_writer_pretty(&mut writer, &metadata)?;
        writer.flush()?;
        let mut writer = BufWriter::new(File::create(dir.join(PARAMETERS_FILE))?);
        bincode::serialize_into(&mut writer, &self.params)?;
        writer.flush()?;
        info!("Saved drawing classifier to {}", dir.display());
        Ok(())
    }
}

/// Loads a model saved with [`DrawingClassifier::save`].
pub fn load_model<P: AsRef<Path>>(dir: P) -> Result<DrawingClassifier> {
    let dir = dir.as_ref();
    let reader = BufReader::new(File::open(dir.join(METADATA_FILE))?);
    let metadata: ModelMetadata = serde_json::from_reader(reader)?;
    if metadata.format != FORMAT_NAME {
        return Err(Error::IncompatibleModel(format!(
            "{} holds a `{}` model, expected `{}`",
            dir.display(),
            metadata.format,
            FORMAT_NAME
        )));
    }
    if metadata.version > FORMAT_VERSION {
        return Err(Error::IncompatibleModel(format!(
            "model version {} is newer than supported version {}",
            metadata.version, FORMAT_VERSION
        )));
    }
    if metadata.num_features != NUM_FEATURES {
        return Err(Error::IncompatibleModel(format!(
            "model expects {} input features, this build uses {}",
            metadata.num_features, NUM_FEATURES
        )));
    }

    let reader = BufReader::new(File::open(dir.join(PARAMETERS_FILE))?);
    let params: Parameters = bincode::deserialize_from(reader)?;
    let num_classes = metadata.classes.len();
    if params.num_classes() != num_classes || params.weights.len() != num_classes * NUM_FEATURES {
        return Err(Error::IncompatibleModel(format!(
            "parameter file does not match {} classes",
            num_classes
        )));
    }
    info!("Loaded drawing classifier from {}", dir.display());
    Ok(DrawingClassifier {
        feature: metadata.feature,
        target: metadata.target,
        label_kind: metadata.label_kind,
        classes: metadata.classes,
        params,
        stats: metadata.stats,
    })
}
