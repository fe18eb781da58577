//! Boundary checks for drawing tables.
//!
//! Validation is all-or-nothing: the first bad record anywhere in a column
//! fails the whole call, before any training or prediction starts.

use image::GrayImage;

use super::entities::*;
use super::error::{Error, Result};
use super::table::{Column, ColumnKind, DrawingTable};
use super::{Drawing, Point, Stroke};

// Where a bad coordinate was found, for the error message
struct Location {
    row: Option<usize>,
    stroke: usize,
    point: usize,
}

impl Location {
    fn describe(&self) -> String {
        match self.row {
            Some(row) => format!("row {}, stroke {}, point {}", row, self.stroke, self.point),
            None => format!("stroke {}, point {}", self.stroke, self.point),
        }
    }
}

fn check_coordinate(name: &str, coord: &Coordinate, loc: &Location) -> Result<f64> {
    match coord {
        Coordinate::Number(v) => Ok(*v),
        Coordinate::Missing => Err(Error::invalid_input(format!(
            "missing `{}` coordinate at {}",
            name,
            loc.describe()
        ))),
        Coordinate::Invalid(value) => Err(Error::invalid_input(format!(
            "`{}` coordinate at {} is not a number: {}",
            name,
            loc.describe(),
            value
        ))),
    }
}

fn convert_drawing(raw: &RawDrawing, row: Option<usize>) -> Result<Drawing> {
    let mut strokes: Vec<Stroke> = Vec::with_capacity(raw.len());
    for (stroke_ix, raw_stroke) in raw.iter().enumerate() {
        let mut points: Vec<Point> = Vec::with_capacity(raw_stroke.len());
        for (point_ix, raw_point) in raw_stroke.iter().enumerate() {
            let loc = Location {
                row,
                stroke: stroke_ix,
                point: point_ix,
            };
            points.push(Point {
                x: check_coordinate("x", &raw_point.x, &loc)?,
                y: check_coordinate("y", &raw_point.y, &loc)?,
            });
        }
        strokes.push(Stroke { points });
    }
    Ok(Drawing { strokes })
}

/// Validates a single raw drawing and returns its typed form.
///
/// Empty drawings and empty strokes are kept as they are; they are not errors.
pub fn validate_drawing(raw: &RawDrawing) -> Result<Drawing> {
    convert_drawing(raw, None)
}

/// Validates every drawing of a stroke column, returning the typed drawings in order.
pub fn validate_strokes(drawings: &[RawDrawing]) -> Result<Vec<Drawing>> {
    drawings
        .iter()
        .enumerate()
        .map(|(row, raw)| convert_drawing(raw, Some(row)))
        .collect()
}

// Bitmaps of any size are resized later; empty ones have nothing to resize
pub(crate) fn validate_bitmaps(images: &[GrayImage]) -> Result<()> {
    match images.iter().position(|b| b.width() == 0 || b.height() == 0) {
        Some(row) => Err(Error::invalid_input(format!(
            "row {}: bitmap is {}x{}, width and height must be positive",
            row,
            images[row].width(),
            images[row].height()
        ))),
        None => Ok(()),
    }
}

pub(crate) fn feature_column<'a>(table: &'a DrawingTable, feature: &str) -> Result<&'a Column> {
    let column = table.column(feature).ok_or_else(|| {
        Error::invalid_input(format!(
            "feature column `{}` not found; available columns: {:?}",
            feature,
            table.column_names()
        ))
    })?;
    if column.kind() == ColumnKind::Labels {
        return Err(Error::invalid_input(format!(
            "feature column `{}` must hold stroke drawings or bitmaps",
            feature
        )));
    }
    Ok(column)
}

/// Checks the drawings of `feature`: the column must exist and hold drawings,
/// and every point of a stroke column must carry two numeric coordinates.
pub fn validate(table: &DrawingTable, feature: &str) -> Result<()> {
    match feature_column(table, feature)? {
        Column::Strokes(drawings) => validate_strokes(drawings).map(|_| ()),
        Column::Bitmaps(images) => validate_bitmaps(images),
        Column::Labels(_) => Ok(()),
    }
}

/// Full schema check for a training or evaluation table: drawing column,
/// label column, at least one row, then [`validate`].
pub fn validate_dataset(table: &DrawingTable, feature: &str, target: &str) -> Result<()> {
    feature_column(table, feature)?;
    let target_column = table.column(target).ok_or_else(|| {
        Error::invalid_input(format!(
            "target column `{}` not found; available columns: {:?}",
            target,
            table.column_names()
        ))
    })?;
    if target_column.kind() != ColumnKind::Labels {
        return Err(Error::invalid_input(format!(
            "target column `{}` must hold integer or string labels",
            target
        )));
    }
    target_column.label_kind()?;
    if table.is_empty() {
        return Err(Error::invalid_input("input table has no rows"));
    }
    validate(table, feature)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> RawDrawing {
        serde_json::from_str(json).unwrap()
    }

    fn single_row(drawing: RawDrawing, label: &str) -> DrawingTable {
        DrawingTable::new()
            .with_column("drawing", Column::Strokes(vec![drawing]))
            .unwrap()
            .with_column("label", Column::Labels(vec![Label::from(label)]))
            .unwrap()
    }

    fn assert_invalid(res: Result<()>) {
        assert!(
            matches!(res, Err(Error::InvalidDrawingInput(_))),
            "expected invalid drawing input, got {:?}",
            res
        );
    }

    #[test]
    fn test_missing_coordinate() {
        let drawing = parse(r#"[[{"x": 1.0, "y": 1.0}], [{"x": 0.0}, {"y": 0.0}]]"#);
        assert_invalid(validate(&single_row(drawing, "missing_coordinates"), "drawing"));
    }

    #[test]
    fn test_string_coordinate() {
        let drawing = parse(r#"[[{"x": 1.0, "y": 0}], [{"x": "string_x?!", "y": 0.1}]]"#);
        let table = single_row(drawing, "string_x_coordinate");
        assert_invalid(validate(&table, "drawing"));
        assert_invalid(validate_dataset(&table, "drawing", "label"));
    }

    #[test]
    fn test_null_coordinate() {
        let drawing = parse(r#"[[{"x": 1.0, "y": null}], [{"x": 1.1, "y": 0.1}]]"#);
        assert_invalid(validate(&single_row(drawing, "none_y_coordinate"), "drawing"));
    }

    #[test]
    fn test_empty_drawing_and_stroke() {
        validate(&single_row(parse("[]"), "empty_drawing"), "drawing").unwrap();

        let drawing = parse(r#"[[{"x": 1.0, "y": 0.0}], [], [{"x": 1.1, "y": 0.1}]]"#);
        let typed = validate_drawing(&drawing).unwrap();
        assert_eq!(typed.strokes.len(), 3);
        assert!(typed.strokes[1].points.is_empty());
        assert_eq!(typed.num_points(), 2);
    }

    #[test]
    fn test_one_bad_row_fails_whole_column() {
        let good = parse(r#"[[{"x": 1, "y": 2}]]"#);
        let bad = parse(r#"[[{"x": 1, "y": true}]]"#);
        let err = validate_strokes(&[good.clone(), good, bad]).unwrap_err();
        assert!(err.to_string().contains("row 2"), "{}", err);
    }

    #[test]
    fn test_empty_bitmap() {
        let table = DrawingTable::new()
            .with_column("image", Column::Bitmaps(vec![GrayImage::new(56, 56), GrayImage::new(5, 0)]))
            .unwrap()
            .with_column("label", Column::Labels(vec![Label::Int(0), Label::Int(1)]))
            .unwrap();
        let err = validate(&table, "image").unwrap_err();
        assert!(err.to_string().contains("row 1"), "{}", err);
        assert_invalid(validate_dataset(&table, "image", "label"));
    }

    #[test]
    fn test_dataset_schema() {
        let table = single_row(parse("[]"), "x");
        assert_invalid(validate_dataset(&table, "wrong_feature", "label"));
        assert_invalid(validate_dataset(&table, "drawing", "wrong_target"));
        assert_invalid(validate_dataset(&table, "label", "label"));
        assert_invalid(validate_dataset(&table, "drawing", "drawing"));
        assert_invalid(validate_dataset(&table.head(0), "drawing", "label"));
        validate_dataset(&table, "drawing", "label").unwrap();
    }
}
