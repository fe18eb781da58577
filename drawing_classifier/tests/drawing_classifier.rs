use std::path::Path;

use drawing_classifier::*;
use image::{imageops, DynamicImage, GenericImageView};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

const FEATURE: &str = "drawing";
const TARGET: &str = "label";

fn strokes(points: &[&[(f64, f64)]]) -> RawDrawing {
    points
        .iter()
        .map(|stroke| stroke.iter().map(|&(x, y)| RawPoint::new(x, y)).collect())
        .collect()
}

// Writes 10 drawings as PNG files named like "check1.png" and "cross3.png"
fn write_bitmap_files(dir: &Path) {
    for i in 0..5 {
        let d = i as f64 * 3.0;
        let check = strokes(&[&[(10.0 + d, 50.0), (35.0, 80.0 - d), (90.0, 10.0 + d)]]);
        let cross = strokes(&[
            &[(10.0, 10.0 + d), (90.0 - d, 90.0)],
            &[(10.0 + d, 90.0), (90.0, 10.0)],
        ]);
        for (name, raw) in [("check", check), ("cross", cross)] {
            let mut bitmap = draw_strokes(&validate_drawing(&raw).unwrap());
            // Larger files get resized back to 28x28 by the toolkit
            if i == 4 {
                bitmap = imageops::resize(&bitmap, 56, 56, imageops::FilterType::Nearest);
            }
            bitmap.save(dir.join(format!("{}{}.png", name, i))).unwrap();
        }
    }
}

// Table of saved bitmaps, labeled by file name: "check1.png" -> "check"
fn build_bitmap_data() -> DrawingTable {
    let dir = tempfile::tempdir().unwrap();
    write_bitmap_files(dir.path());
    let mut table = DrawingTable::load_images(dir.path()).unwrap();
    let labels = match table.remove_column("path") {
        Some(Column::Labels(paths)) => paths
            .iter()
            .map(|p| {
                let stem = Path::new(&p.to_string()).file_stem().unwrap().to_string_lossy().into_owned();
                Label::Str(stem[..stem.len() - 1].to_string())
            })
            .collect(),
        other => panic!("unexpected path column {:?}", other),
    };
    table.rename_column("image", FEATURE).unwrap();
    table.add_column(TARGET, Column::Labels(labels)).unwrap();
    table
}

// 10 random stroke drawings; each stroke is a random walk on a 1000x1000 canvas
fn build_stroke_data() -> DrawingTable {
    let mut rng = StdRng::seed_from_u64(100);
    let mut drawings = Vec::new();
    let mut labels = Vec::new();
    for label in 0..10 {
        let num_strokes = rng.gen_range(0..10);
        let mut drawing: RawDrawing = Vec::new();
        for _ in 0..num_strokes {
            let num_points = rng.gen_range(0..500);
            let mut stroke = Vec::with_capacity(num_points);
            let mut last: Option<(f64, f64)> = None;
            for _ in 0..num_points {
                let next = match last {
                    Some((x, y)) => (x + rng.gen_range(-1..=1) as f64, y + rng.gen_range(-1..=1) as f64),
                    None => (rng.gen_range(0..1000) as f64, rng.gen_range(0..1000) as f64),
                };
                stroke.push(RawPoint::new(next.0, next.1));
                last = Some(next);
            }
            drawing.push(stroke);
        }
        drawings.push(drawing);
        labels.push(Label::Int(label));
    }
    DrawingTable::new()
        .with_column(FEATURE, Column::Strokes(drawings))
        .unwrap()
        .with_column(TARGET, Column::Labels(labels))
        .unwrap()
}

struct Fixture {
    trains: Vec<DrawingTable>,
    models: Vec<DrawingClassifier>,
}

fn train(table: &DrawingTable, max_iterations: usize, warm_start: WarmStart) -> DrawingClassifier {
    let options = CreateOptions::default()
        .with_feature(FEATURE)
        .with_max_iterations(max_iterations)
        .with_warm_start(warm_start);
    create(table, TARGET, options).unwrap()
}

fn fixture() -> Fixture {
    let check_cross = build_bitmap_data();
    let stroke = build_stroke_data();
    let models = vec![
        train(&check_cross, 10, WarmStart::Scratch),
        train(&stroke, 1, WarmStart::Scratch),
    ];
    Fixture {
        trains: vec![check_cross, stroke],
        models,
    }
}

// Same data, each model warm-started from a saved scratch model
fn warm_fixture() -> Fixture {
    let scratch = fixture();
    let mut models = Vec::new();
    for (model, table) in scratch.models.iter().zip(&scratch.trains) {
        let dir = tempfile::tempdir().unwrap();
        model.save(dir.path()).unwrap();
        models.push(train(table, 1, WarmStart::Pretrained(dir.path().to_path_buf())));
    }
    Fixture {
        trains: scratch.trains,
        models,
    }
}

fn single_drawing_table(drawing: serde_json::Value, label: &str) -> DrawingTable {
    let drawing: RawDrawing = serde_json::from_value(drawing).unwrap();
    DrawingTable::new()
        .with_column(FEATURE, Column::Strokes(vec![drawing]))
        .unwrap()
        .with_column(TARGET, Column::Labels(vec![Label::from(label)]))
        .unwrap()
}

fn assert_invalid_input<T: std::fmt::Debug>(res: Result<T>) {
    assert!(
        matches!(res, Err(Error::InvalidDrawingInput(_))),
        "expected invalid drawing input, got {:?}",
        res
    );
}

fn target_kind(table: &DrawingTable) -> LabelKind {
    table.column(TARGET).unwrap().label_kind().unwrap().unwrap()
}

#[test]
fn test_create_with_missing_feature() {
    for table in fixture().trains {
        let options = CreateOptions::default().with_feature("wrong_feature");
        assert_invalid_input(create(&table, TARGET, options));
    }
}

#[test]
fn test_create_with_missing_target() {
    for table in fixture().trains {
        assert_invalid_input(create(&table, "wrong_target", CreateOptions::default()));
    }
}

#[test]
fn test_create_with_empty_dataset() {
    for table in fixture().trains {
        let options = CreateOptions::default().with_feature(FEATURE);
        assert_invalid_input(create(&table.head(0), TARGET, options));
    }
}

#[test]
fn test_create_with_missing_coordinates_in_stroke_input() {
    let table = single_drawing_table(
        json!([[{"x": 1.0, "y": 1.0}], [{"x": 0.0}, {"y": 0.0}]]),
        "missing_coordinates",
    );
    assert_invalid_input(validate(&table, FEATURE));
    assert_invalid_input(create(&table, TARGET, CreateOptions::default()));
}

#[test]
fn test_create_with_wrongly_typed_coordinates_in_stroke_input() {
    let table = single_drawing_table(
        json!([[{"x": 1.0, "y": 0}], [{"x": "string_x?!", "y": 0.1}]]),
        "string_x_coordinate",
    );
    assert_invalid_input(validate(&table, FEATURE));
    assert_invalid_input(create(&table, TARGET, CreateOptions::default()));
}

#[test]
fn test_create_with_none_coordinates_in_stroke_input() {
    let table = single_drawing_table(
        json!([[{"x": 1.0, "y": null}], [{"x": 1.1, "y": 0.1}]]),
        "none_y_coordinate",
    );
    let options = CreateOptions::default().with_feature(FEATURE);
    assert_invalid_input(create(&table, TARGET, options));
}

#[test]
fn test_create_with_empty_drawing_in_stroke_input() {
    let table = single_drawing_table(json!([]), "empty_drawing");
    validate(&table, FEATURE).unwrap();
    let options = CreateOptions::default().with_feature(FEATURE).with_max_iterations(1);
    create(&table, TARGET, options).unwrap();

    let images = draw_strokes_column(table.column(FEATURE).unwrap()).unwrap();
    assert_eq!(images[0].dimensions(), (28, 28));
    assert!(images[0].pixels().all(|p| p.0[0] == 0));
}

#[test]
fn test_create_with_empty_stroke_in_stroke_input() {
    let table = single_drawing_table(
        json!([[{"x": 1.0, "y": 0.0}], [], [{"x": 1.1, "y": 0.1}]]),
        "empty_drawing",
    );
    validate(&table, FEATURE).unwrap();
    let options = CreateOptions::default().with_feature(FEATURE).with_max_iterations(1);
    create(&table, TARGET, options).unwrap();

    let images = draw_strokes_column(table.column(FEATURE).unwrap()).unwrap();
    assert_eq!(images[0].dimensions(), (28, 28));
    assert!(images[0].pixels().any(|p| p.0[0] > 0));
}

#[test]
fn test_predict_with_table() {
    let fx = fixture();
    for (model, table) in fx.models.iter().zip(&fx.trains) {
        let preds = model.predict(table).unwrap();
        assert_eq!(preds.len(), table.num_rows());
        assert!(preds.iter().all(|p| p.kind() == target_kind(table)));
    }
}

#[test]
fn test_predict_with_column() {
    let fx = fixture();
    for (model, table) in fx.models.iter().zip(&fx.trains) {
        let preds = model.predict_column(table.column(FEATURE).unwrap()).unwrap();
        assert_eq!(preds.len(), table.num_rows());
        assert!(preds.iter().all(|p| p.kind() == target_kind(table)));
        assert_eq!(preds, model.predict(table).unwrap());
    }
}

#[test]
fn test_predict_rejects_invalid_strokes() {
    let fx = fixture();
    let table = single_drawing_table(json!([[{"x": 1.0}]]), "missing");
    assert_invalid_input(fx.models[1].predict(&table));
}

#[test]
fn test_evaluate_without_ground_truth() {
    let fx = fixture();
    for (model, table) in fx.models.iter().zip(&fx.trains) {
        let without_ground_truth = table.select_columns(&[FEATURE]).unwrap();
        assert_invalid_input(model.evaluate(&without_ground_truth, "auto"));
    }
}

#[test]
fn test_evaluate_with_ground_truth() {
    let fx = fixture();
    let all_metrics = [
        "accuracy",
        "auc",
        "precision",
        "recall",
        "f1_score",
        "confusion_matrix",
        "roc_curve",
    ];
    for (model, table) in fx.models.iter().zip(&fx.trains) {
        let auto = model.evaluate(table, "auto").unwrap();
        for metric in all_metrics {
            let evaluation = model.evaluate(table, metric).unwrap();
            assert!(evaluation.contains_key(metric));
            assert_eq!(evaluation[metric], auto[metric], "metric {}", metric);
        }
        let accuracy = auto["accuracy"].as_scalar().unwrap();
        assert!((0.0..=1.0).contains(&accuracy));
        match &auto["confusion_matrix"] {
            MetricValue::ConfusionMatrix(cells) => {
                assert_eq!(cells.iter().map(|c| c.count).sum::<usize>(), table.num_rows());
            }
            other => panic!("unexpected confusion matrix {:?}", other),
        }
    }
}

#[test]
fn test_evaluate_with_unsupported_metric() {
    let fx = fixture();
    for (model, table) in fx.models.iter().zip(&fx.trains) {
        assert!(matches!(
            model.evaluate(table, "unsupported"),
            Err(Error::UnsupportedMetric(_))
        ));
    }
}

#[test]
fn test_save_and_load() {
    for fx in [fixture(), warm_fixture()] {
        for (old_model, data) in fx.models.iter().zip(&fx.trains) {
            let dir = tempfile::tempdir().unwrap();
            old_model.save(dir.path()).unwrap();
            let new_model = load_model(dir.path()).unwrap();
            let old_preds = old_model.predict(data).unwrap();
            let new_preds = new_model.predict(data).unwrap();
            assert_eq!(old_preds, new_preds);
            assert_eq!(new_model.label_kind(), old_model.label_kind());
        }
    }
}

#[test]
fn test_export_with_predict() {
    for fx in [fixture(), warm_fixture()] {
        for (model, table) in fx.models.iter().zip(&fx.trains) {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("drawing.json");
            model.export(&path).unwrap();

            let exported = ExportedModel::load(&path).unwrap();
            assert_eq!(exported.input().name, FEATURE);
            assert_eq!((exported.input().width, exported.input().height), (28, 28));
            assert_eq!(exported.class_label_output(), "classLabel");
            assert_eq!(exported.class_labels(), model.classes());

            let preds = model.predict(table).unwrap();
            let bitmaps: Vec<GrayImage> = match table.column(FEATURE).unwrap() {
                Column::Bitmaps(images) => images.clone(),
                strokes => draw_strokes_column(strokes).unwrap(),
            };
            for (bitmap, expected) in bitmaps.iter().zip(&preds) {
                let prediction = exported.predict(bitmap);
                assert_eq!(&prediction.class_label, expected);
                let total: f32 = prediction.label_probability.iter().map(|(_, p)| p).sum();
                assert!((total - 1.0).abs() < 1e-4);
            }
        }
    }
}

#[test]
fn test_draw_strokes_column() {
    let table = build_stroke_data();
    let rendered = draw_strokes_column(table.column(FEATURE).unwrap()).unwrap();
    assert_eq!(rendered.len(), table.num_rows());
    for image in rendered {
        let image = DynamicImage::ImageLuma8(image);
        assert_eq!(image.color().channel_count(), 1);
        assert_eq!((image.width(), image.height()), (28, 28));
    }
}

#[test]
fn test_draw_strokes_single_input() {
    let table = build_stroke_data();
    let raw = match table.column(FEATURE).unwrap() {
        Column::Strokes(drawings) => drawings[0].clone(),
        other => panic!("unexpected column {:?}", other),
    };
    let drawing = validate_drawing(&raw).unwrap();
    let single_bitmap = draw_strokes(&drawing);
    assert_eq!(single_bitmap.dimensions(), (28, 28));
    assert_eq!(single_bitmap, draw_strokes(&drawing));
}

#[test]
fn test_draw_strokes_batch_matches_single() {
    let table = build_stroke_data();
    let drawings = match table.column(FEATURE).unwrap() {
        Column::Strokes(raw) => validate_strokes(raw).unwrap(),
        other => panic!("unexpected column {:?}", other),
    };
    let batch = draw_strokes(&drawings);
    assert_eq!(batch.len(), drawings.len());
    for (image, drawing) in batch.iter().zip(&drawings) {
        assert_eq!(image, &draw_strokes(drawing));
    }
}

#[test]
fn test_repr_and_summary() {
    for fx in [fixture(), warm_fixture()] {
        for model in &fx.models {
            assert!(!model.to_string().is_empty());
            assert!(!model.summary().is_empty());
            assert!(!format!("{:?}", model).is_empty());
        }
        assert!(fx.models.iter().all(|m| m.stats().iterations > 0));
    }
}

#[test]
fn test_warm_start_reuses_weights() {
    let fx = warm_fixture();
    for model in &fx.models {
        assert!(model.stats().warm_started);
    }
}

#[test]
fn test_json_lines_round_trip_keeps_predictions() {
    let fx = fixture();
    let table = &fx.trains[1];
    let mut buf = Vec::new();
    table.to_json_lines(&mut buf).unwrap();
    let reloaded = DrawingTable::from_json_lines(&buf[..]).unwrap();
    assert_eq!(fx.models[1].predict(&reloaded).unwrap(), fx.models[1].predict(table).unwrap());
}
