use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};

use super::entities::*;
use super::error::{Error, Result};
use super::table::Column;
use super::validation::{validate_bitmaps, validate_strokes};
use super::{Drawing, Point};

// Blank border kept around the drawing, in pixels
const MARGIN: f64 = 2.0;
// Half the stroke width, in pixels
const LINE_RADIUS: f64 = 1.0;

struct Rect {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

// Maps drawing coordinates onto the canvas, relative to the bounding box origin
struct Transform {
    scale: f64,
    left: f64,
    top: f64,
    pad_x: f64,
    pad_y: f64,
}

impl Transform {
    // Fits the bounding rectangle into the canvas minus the margin, keeping the
    // aspect ratio and centering along the shorter side.
    fn fit(rect: &Rect) -> Transform {
        let width = rect.right - rect.left;
        let height = rect.bottom - rect.top;
        let side = f64::max(width, height);
        let available = BITMAP_WIDTH as f64 - 2.0 * MARGIN;
        // Degenerate (a single point, or overflowing ranges): everything lands in the middle
        if !(side > 0.0) || !side.is_finite() {
            let center = BITMAP_WIDTH as f64 / 2.0;
            return Transform {
                scale: 0.0,
                left: rect.left,
                top: rect.top,
                pad_x: center,
                pad_y: center,
            };
        }
        let scale = available / side;
        Transform {
            scale,
            left: rect.left,
            top: rect.top,
            pad_x: MARGIN + (available - width * scale) / 2.0,
            pad_y: MARGIN + (available - height * scale) / 2.0,
        }
    }

    fn apply(&self, pt: Point) -> (f64, f64) {
        let x = (pt.x - self.left) * self.scale + self.pad_x;
        let y = (pt.y - self.top) * self.scale + self.pad_y;
        let limit = BITMAP_WIDTH as f64;
        if x.is_finite() && y.is_finite() {
            (x.clamp(0.0, limit), y.clamp(0.0, limit))
        } else {
            (limit / 2.0, limit / 2.0)
        }
    }
}

fn get_bounding_rect(drawing: &Drawing) -> Option<Rect> {
    let mut res = Rect {
        top: f64::MAX,
        bottom: f64::MIN,
        left: f64::MAX,
        right: f64::MIN,
    };
    let mut any = false;
    for stroke in &drawing.strokes {
        for pt in &stroke.points {
            any = true;
            if pt.x < res.left { res.left = pt.x; }
            if pt.x > res.right { res.right = pt.x; }
            if pt.y < res.top { res.top = pt.y; }
            if pt.y > res.bottom { res.bottom = pt.y; }
        }
    }
    if any { Some(res) } else { None }
}

// Distance from point p to segment ab
fn dist_to_segment(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len_squared = dx * dx + dy * dy;
    let t = if len_squared > 0.0 {
        (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len_squared).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let (cx, cy) = (a.0 + t * dx, a.1 + t * dy);
    ((p.0 - cx) * (p.0 - cx) + (p.1 - cy) * (p.1 - cy)).sqrt()
}

// Draws an anti-aliased segment into the coverage canvas, keeping the maximum coverage per pixel
fn draw_segment(canvas: &mut [f64], a: (f64, f64), b: (f64, f64)) {
    let reach = LINE_RADIUS + 1.0;
    let max_ix = BITMAP_WIDTH as f64 - 1.0;
    let x0 = (f64::min(a.0, b.0) - reach).floor().clamp(0.0, max_ix) as usize;
    let x1 = (f64::max(a.0, b.0) + reach).ceil().clamp(0.0, max_ix) as usize;
    let y0 = (f64::min(a.1, b.1) - reach).floor().clamp(0.0, max_ix) as usize;
    let y1 = (f64::max(a.1, b.1) + reach).ceil().clamp(0.0, max_ix) as usize;
    for py in y0..=y1 {
        for px in x0..=x1 {
            let center = (px as f64 + 0.5, py as f64 + 0.5);
            let coverage = (LINE_RADIUS + 0.5 - dist_to_segment(center, a, b)).clamp(0.0, 1.0);
            let ix = py * BITMAP_WIDTH as usize + px;
            if coverage > canvas[ix] {
                canvas[ix] = coverage;
            }
        }
    }
}

fn render(drawing: &Drawing) -> GrayImage {
    let mut canvas = vec![0f64; NUM_FEATURES];
    if let Some(rect) = get_bounding_rect(drawing) {
        let transform = Transform::fit(&rect);
        for stroke in &drawing.strokes {
            let mapped: Vec<(f64, f64)> = stroke.points.iter().map(|&pt| transform.apply(pt)).collect();
            match mapped.len() {
                0 => continue,
                1 => draw_segment(&mut canvas, mapped[0], mapped[0]),
                _ => {
                    for pair in mapped.windows(2) {
                        draw_segment(&mut canvas, pair[0], pair[1]);
                    }
                }
            }
        }
    }
    let pixels: Vec<u8> = canvas.iter().map(|c| (c * 255.0).round() as u8).collect();
    GrayImage::from_fn(BITMAP_WIDTH, BITMAP_HEIGHT, |x, y| {
        Luma([pixels[(y * BITMAP_WIDTH + x) as usize]])
    })
}

/// Inputs that can be rasterized: a single drawing or a batch of them.
pub trait DrawStrokes {
    type Output;

    fn draw_strokes(&self) -> Self::Output;
}

impl DrawStrokes for Drawing {
    type Output = GrayImage;

    fn draw_strokes(&self) -> GrayImage {
        render(self)
    }
}

impl DrawStrokes for [Drawing] {
    type Output = Vec<GrayImage>;

    fn draw_strokes(&self) -> Vec<GrayImage> {
        self.iter().map(render).collect()
    }
}

impl DrawStrokes for Vec<Drawing> {
    type Output = Vec<GrayImage>;

    fn draw_strokes(&self) -> Vec<GrayImage> {
        self.as_slice().draw_strokes()
    }
}

/// Rasterizes one drawing into a 28x28 single-channel bitmap, or a batch of
/// drawings into one bitmap each, in order.
///
/// Strokes are white on black. Empty drawings and empty strokes produce blank
/// output rather than an error.
pub fn draw_strokes<T: DrawStrokes + ?Sized>(input: &T) -> T::Output {
    input.draw_strokes()
}

/// Resizes a bitmap to 28x28 unless it already has that size.
pub fn to_bitmap_size(image: &GrayImage) -> GrayImage {
    if image.dimensions() == (BITMAP_WIDTH, BITMAP_HEIGHT) {
        image.clone()
    } else {
        imageops::resize(image, BITMAP_WIDTH, BITMAP_HEIGHT, FilterType::Triangle)
    }
}

/// 28x28 bitmaps for a drawing column: stroke columns are validated and
/// rasterized, bitmap columns resized where needed.
pub fn draw_strokes_column(column: &Column) -> Result<Vec<GrayImage>> {
    match column {
        Column::Strokes(raw) => Ok(draw_strokes(validate_strokes(raw)?.as_slice())),
        Column::Bitmaps(images) => {
            validate_bitmaps(images)?;
            Ok(images.iter().map(to_bitmap_size).collect())
        }
        Column::Labels(_) => Err(Error::invalid_input("cannot rasterize a label column")),
    }
}
