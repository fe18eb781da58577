//! Column-oriented table of drawings and labels.

use std::fs;
use std::io::{BufRead, Write};
use std::ops::Range;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::entities::*;
use super::error::{Error, Result};

const SUPPORTED_FILES: [&str; 4] = ["bmp", "jpg", "jpeg", "png"];

/// A single column. All values of a column share one kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// Raw stroke drawings, not yet validated.
    Strokes(Vec<RawDrawing>),
    /// Single-channel bitmaps of any size.
    Bitmaps(Vec<GrayImage>),
    /// Class labels.
    Labels(Vec<Label>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Strokes,
    Bitmaps,
    Labels,
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Strokes(v) => v.len(),
            Column::Bitmaps(v) => v.len(),
            Column::Labels(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            Column::Strokes(_) => ColumnKind::Strokes,
            Column::Bitmaps(_) => ColumnKind::Bitmaps,
            Column::Labels(_) => ColumnKind::Labels,
        }
    }

    pub fn slice(&self, range: Range<usize>) -> Column {
        match self {
            Column::Strokes(v) => Column::Strokes(v[range].to_vec()),
            Column::Bitmaps(v) => Column::Bitmaps(v[range].to_vec()),
            Column::Labels(v) => Column::Labels(v[range].to_vec()),
        }
    }

    /// Kind shared by all labels, or `None` for an empty column.
    /// Mixed integer and string labels are rejected.
    pub fn label_kind(&self) -> Result<Option<LabelKind>> {
        let labels = match self {
            Column::Labels(labels) => labels,
            _ => return Err(Error::invalid_input("column does not hold labels")),
        };
        let kind = match labels.first() {
            Some(label) => label.kind(),
            None => return Ok(None),
        };
        if labels.iter().any(|l| l.kind() != kind) {
            return Err(Error::invalid_input("label column mixes integer and string labels"));
        }
        Ok(Some(kind))
    }

    fn json_value(&self, row: usize) -> Result<Value> {
        let value = match self {
            Column::Strokes(v) => serde_json::to_value(&v[row])?,
            Column::Labels(v) => serde_json::to_value(&v[row])?,
            Column::Bitmaps(v) => serde_json::to_value(BitmapRecord::from_image(&v[row]))?,
        };
        Ok(value)
    }
}

// Bitmaps in JSON lines: dimensions plus base64 luma bytes
#[derive(Serialize, Deserialize)]
struct BitmapRecord {
    width: u32,
    height: u32,
    pixels: String,
}

impl BitmapRecord {
    fn from_image(image: &GrayImage) -> BitmapRecord {
        BitmapRecord {
            width: image.width(),
            height: image.height(),
            pixels: STANDARD.encode(image.as_raw()),
        }
    }

    fn into_image(self) -> Result<GrayImage> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::invalid_input(format!(
                "bitmap is {}x{}, width and height must be positive",
                self.width, self.height
            )));
        }
        let bytes = STANDARD
            .decode(&self.pixels)
            .map_err(|e| Error::invalid_input(format!("bitmap pixels are not base64: {}", e)))?;
        GrayImage::from_raw(self.width, self.height, bytes).ok_or_else(|| {
            Error::invalid_input(format!(
                "bitmap pixel count does not match {}x{}",
                self.width, self.height
            ))
        })
    }
}

/// Named columns of equal length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawingTable {
    columns: Vec<(String, Column)>,
}

impl DrawingTable {
    pub fn new() -> DrawingTable {
        DrawingTable { columns: Vec::new() }
    }

    /// Builder form of [`add_column`](Self::add_column).
    pub fn with_column(mut self, name: &str, column: Column) -> Result<DrawingTable> {
        self.add_column(name, column)?;
        Ok(self)
    }

    /// Adds a column, replacing any column with the same name.
    pub fn add_column(&mut self, name: &str, column: Column) -> Result<()> {
        if let Some((other, existing)) = self.columns.iter().find(|(n, _)| n != name) {
            if existing.len() != column.len() {
                return Err(Error::invalid_input(format!(
                    "column `{}` has {} rows but column `{}` has {}",
                    name,
                    column.len(),
                    other,
                    existing.len()
                )));
            }
        }
        match self.columns.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = column,
            None => self.columns.push((name.to_string(), column)),
        }
        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    pub fn remove_column(&mut self, name: &str) -> Option<Column> {
        let ix = self.columns.iter().position(|(n, _)| n == name)?;
        Some(self.columns.remove(ix).1)
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<()> {
        if from != to && self.column(to).is_some() {
            return Err(Error::invalid_input(format!("column `{}` already exists", to)));
        }
        match self.columns.iter_mut().find(|(n, _)| n == from) {
            Some(slot) => {
                slot.0 = to.to_string();
                Ok(())
            }
            None => Err(Error::invalid_input(format!("no column named `{}`", from))),
        }
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, |(_, c)| c.len())
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    pub fn select_columns(&self, names: &[&str]) -> Result<DrawingTable> {
        let mut res = DrawingTable::new();
        for name in names {
            let column = self
                .column(name)
                .ok_or_else(|| Error::invalid_input(format!("no column named `{}`", name)))?;
            res.add_column(name, column.clone())?;
        }
        Ok(res)
    }

    /// The first `n` rows (all rows if the table is shorter).
    pub fn head(&self, n: usize) -> DrawingTable {
        let end = n.min(self.num_rows());
        DrawingTable {
            columns: self
                .columns
                .iter()
                .map(|(name, c)| (name.clone(), c.slice(0..end)))
                .collect(),
        }
    }

    /// Loads every supported image file of a directory, sorted by path.
    ///
    /// Produces an `image` column of single-channel bitmaps and a `path`
    /// column with each file's path.
    pub fn load_images<P: AsRef<Path>>(dir: P) -> Result<DrawingTable> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            let supported = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| SUPPORTED_FILES.contains(&e.to_lowercase().as_str()))
                .unwrap_or(false);
            if path.is_file() && supported {
                paths.push(path);
            }
        }
        paths.sort();

        let mut images = Vec::with_capacity(paths.len());
        let mut names = Vec::with_capacity(paths.len());
        for path in &paths {
            images.push(image::open(path)?.into_luma8());
            names.push(Label::Str(path.to_string_lossy().into_owned()));
        }
        log::debug!("Loaded {} images from {}", images.len(), dir.as_ref().display());
        DrawingTable::new()
            .with_column("image", Column::Bitmaps(images))?
            .with_column("path", Column::Labels(names))
    }

    /// Reads one JSON object per line. Blank lines are skipped.
    ///
    /// Each column's kind is inferred from its values: arrays are stroke
    /// drawings, numbers and strings are labels, and objects with `width`,
    /// `height` and base64 `pixels` are bitmaps.
    pub fn from_json_lines<R: BufRead>(reader: R) -> Result<DrawingTable> {
        let mut names: Vec<String> = Vec::new();
        let mut values: Vec<Vec<Value>> = Vec::new();
        for (line_ix, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let row: Map<String, Value> = serde_json::from_str(&line)?;
            if names.is_empty() && values.is_empty() {
                names = row.keys().cloned().collect();
                values = vec![Vec::new(); names.len()];
            }
            if row.len() != names.len() {
                return Err(Error::invalid_input(format!(
                    "line {} has {} fields, expected {}",
                    line_ix + 1,
                    row.len(),
                    names.len()
                )));
            }
            for (ix, name) in names.iter().enumerate() {
                let value = row.get(name).ok_or_else(|| {
                    Error::invalid_input(format!("line {} has no field `{}`", line_ix + 1, name))
                })?;
                values[ix].push(value.clone());
            }
        }

        let mut table = DrawingTable::new();
        for (name, column_values) in names.iter().zip(values) {
            table.add_column(name, column_from_values(name, column_values)?)?;
        }
        Ok(table)
    }

    /// Writes one JSON object per row, in the format read by
    /// [`from_json_lines`](Self::from_json_lines).
    pub fn to_json_lines<W: Write>(&self, mut writer: W) -> Result<()> {
        for row in 0..self.num_rows() {
            let mut obj = Map::new();
            for (name, column) in &self.columns {
                obj.insert(name.clone(), column.json_value(row)?);
            }
            serde_json::to_writer(&mut writer, &obj)?;
            writer.write_all(b"\n")?;
        }
        Ok(())
    }
}

fn column_from_values(name: &str, values: Vec<Value>) -> Result<Column> {
    let kind = match values.first() {
        Some(Value::Array(_)) => ColumnKind::Strokes,
        Some(Value::Object(_)) => ColumnKind::Bitmaps,
        _ => ColumnKind::Labels,
    };
    let wrap = |row: usize, e: serde_json::Error| {
        Error::invalid_input(format!("column `{}`, row {}: {}", name, row, e))
    };
    let column = match kind {
        ColumnKind::Strokes => {
            let mut drawings = Vec::with_capacity(values.len());
            for (row, value) in values.into_iter().enumerate() {
                drawings.push(serde_json::from_value::<RawDrawing>(value).map_err(|e| wrap(row, e))?);
            }
            Column::Strokes(drawings)
        }
        ColumnKind::Bitmaps => {
            let mut images = Vec::with_capacity(values.len());
            for (row, value) in values.into_iter().enumerate() {
                let record: BitmapRecord = serde_json::from_value(value).map_err(|e| wrap(row, e))?;
                images.push(record.into_image()?);
            }
            Column::Bitmaps(images)
        }
        ColumnKind::Labels => {
            let mut labels = Vec::with_capacity(values.len());
            for (row, value) in values.into_iter().enumerate() {
                labels.push(serde_json::from_value::<Label>(value).map_err(|e| wrap(row, e))?);
            }
            let column = Column::Labels(labels);
            column.label_kind()?;
            column
        }
    };
    Ok(column)
}
