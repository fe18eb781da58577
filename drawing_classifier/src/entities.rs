use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

// Side length of every rasterized bitmap
pub const BITMAP_WIDTH: u32 = 28;
pub const BITMAP_HEIGHT: u32 = 28;
// Number of model inputs: one per pixel of the single channel
pub const NUM_FEATURES: usize = (BITMAP_WIDTH * BITMAP_HEIGHT) as usize;

/// One coordinate of a raw, not yet validated point.
///
/// Stroke records arrive as loosely typed JSON, so a field can be absent,
/// `null`, or hold something that is not a number at all.
#[derive(Debug, Clone, PartialEq)]
pub enum Coordinate {
    Number(f64),
    Missing,
    Invalid(Value),
}

impl Default for Coordinate {
    fn default() -> Self {
        Coordinate::Missing
    }
}

impl Coordinate {
    pub fn from_value(value: &Value) -> Coordinate {
        match value {
            Value::Null => Coordinate::Missing,
            Value::Number(n) => match n.as_f64() {
                Some(v) if v.is_finite() => Coordinate::Number(v),
                _ => Coordinate::Invalid(value.clone()),
            },
            other => Coordinate::Invalid(other.clone()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Coordinate::Number(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<f64> for Coordinate {
    fn from(v: f64) -> Self {
        if v.is_finite() {
            Coordinate::Number(v)
        } else {
            Coordinate::Invalid(Value::Null)
        }
    }
}

impl<'de> Deserialize<'de> for Coordinate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Coordinate::from_value(&value))
    }
}

impl Serialize for Coordinate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Coordinate::Number(v) => serializer.serialize_f64(*v),
            Coordinate::Missing => serializer.serialize_none(),
            Coordinate::Invalid(value) => value.serialize(serializer),
        }
    }
}

/// A point as found in the input, before validation.
/// Absent fields deserialize as `Coordinate::Missing`; extra fields are ignored.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct RawPoint {
    #[serde(default)]
    pub x: Coordinate,
    #[serde(default)]
    pub y: Coordinate,
}

impl RawPoint {
    pub fn new(x: f64, y: f64) -> RawPoint {
        RawPoint {
            x: Coordinate::from(x),
            y: Coordinate::from(y),
        }
    }
}

pub type RawStroke = Vec<RawPoint>;
pub type RawDrawing = Vec<RawStroke>;

/// Kind of values held by a label column.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LabelKind {
    Int,
    Str,
}

/// A class label: integer or string, like the target columns we train on.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(untagged)]
pub enum Label {
    Int(i64),
    Str(String),
}

impl Label {
    pub fn kind(&self) -> LabelKind {
        match self {
            Label::Int(_) => LabelKind::Int,
            Label::Str(_) => LabelKind::Str,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Int(v) => write!(f, "{}", v),
            Label::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Label {
    fn from(v: i64) -> Self {
        Label::Int(v)
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Self {
        Label::Str(s.to_string())
    }
}

impl From<String> for Label {
    fn from(s: String) -> Self {
        Label::Str(s)
    }
}

impl fmt::Display for LabelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelKind::Int => f.write_str("int"),
            LabelKind::Str => f.write_str("str"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_point_fields() {
        let pt: RawPoint = serde_json::from_str(r#"{"x": 1.5, "y": 2}"#).unwrap();
        assert_eq!(pt, RawPoint::new(1.5, 2.0));

        let pt: RawPoint = serde_json::from_str(r#"{"x": 0.0}"#).unwrap();
        assert_eq!(pt.y, Coordinate::Missing);

        let pt: RawPoint = serde_json::from_str(r#"{"x": 1.0, "y": null}"#).unwrap();
        assert_eq!(pt.y, Coordinate::Missing);

        let pt: RawPoint = serde_json::from_str(r#"{"x": "string_x?!", "y": 0.1}"#).unwrap();
        assert_eq!(pt.x, Coordinate::Invalid(Value::from("string_x?!")));
        assert_eq!(pt.y.as_f64(), Some(0.1));
    }

    #[test]
    fn test_raw_point_extra_fields_ignored() {
        let pt: RawPoint = serde_json::from_str(r#"{"x": 3, "y": 4, "t": 1200}"#).unwrap();
        assert_eq!(pt, RawPoint::new(3.0, 4.0));
    }

    #[test]
    fn test_label_untagged() {
        let labels: Vec<Label> = serde_json::from_str(r#"[3, "cat"]"#).unwrap();
        assert_eq!(labels, vec![Label::Int(3), Label::from("cat")]);
        assert_eq!(labels[0].kind(), LabelKind::Int);
        assert_eq!(labels[1].to_string(), "cat");
        assert!(Label::Int(1) < Label::Int(2));
    }
}
