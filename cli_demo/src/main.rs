use std::error::Error;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use drawing_classifier::{
    create, draw_strokes_column, load_model, Column, CreateOptions, DrawingTable, MetricValue, WarmStart,
};
use log::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Train, evaluate and run drawing classifiers on JSON-lines tables")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a model and save it to a directory
    Train {
        #[arg(long)]
        data: PathBuf,
        #[arg(long, default_value = "label")]
        target: String,
        #[arg(long)]
        feature: Option<String>,
        #[arg(long, default_value_t = 500)]
        max_iterations: usize,
        #[arg(long, default_value_t = 32)]
        batch_size: usize,
        /// Directory of a saved model to start from
        #[arg(long)]
        warm_start: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Evaluate a saved model against a labeled table
    Evaluate {
        #[arg(long)]
        model: PathBuf,
        #[arg(long)]
        data: PathBuf,
        #[arg(long, default_value = "auto")]
        metric: String,
    },
    /// Print one predicted label per row
    Predict {
        #[arg(long)]
        model: PathBuf,
        #[arg(long)]
        data: PathBuf,
        #[arg(long, default_value_t = 1)]
        top_k: usize,
    },
    /// Export a saved model to the portable inference format
    Export {
        #[arg(long)]
        model: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Rasterize the drawing column into one PNG per row
    Render {
        #[arg(long)]
        data: PathBuf,
        #[arg(long, default_value = "drawing")]
        feature: String,
        #[arg(long)]
        out_dir: PathBuf,
    },
}

fn read_table(path: &Path) -> Result<DrawingTable, Box<dyn Error>> {
    let file = File::open(path)?;
    let table = DrawingTable::from_json_lines(BufReader::new(file))?;
    info!("Loaded {} rows from {}", table.num_rows(), path.display());
    Ok(table)
}

fn run(command: Command) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Train {
            data,
            target,
            feature,
            max_iterations,
            batch_size,
            warm_start,
            out,
        } => {
            let table = read_table(&data)?;
            let mut options = CreateOptions::default()
                .with_max_iterations(max_iterations)
                .with_batch_size(batch_size);
            options.feature = feature;
            if let Some(dir) = warm_start {
                options = options.with_warm_start(WarmStart::Pretrained(dir));
            }
            let model = create(&table, &target, options)?;
            model.save(&out)?;
            println!("{}", model.summary());
        }
        Command::Evaluate { model, data, metric } => {
            let model = load_model(&model)?;
            let table = read_table(&data)?;
            for (name, value) in model.evaluate(&table, &metric)? {
                match value {
                    MetricValue::Scalar(v) => println!("{:<18}{:.4}", name, v),
                    other => println!("{:<18}{}", name, describe_metric(&other)),
                }
            }
        }
        Command::Predict { model, data, top_k } => {
            let model = load_model(&model)?;
            let table = read_table(&data)?;
            let column = table
                .column(model.feature())
                .ok_or_else(|| format!("no column named `{}` in {}", model.feature(), data.display()))?;
            for (row, matches) in model.predict_topk(column, top_k)?.iter().enumerate() {
                let shown: Vec<String> = matches
                    .iter()
                    .map(|m| format!("{} ({:.3})", m.label, m.score))
                    .collect();
                println!("{}\t{}", row, shown.join(", "));
            }
        }
        Command::Export { model, out } => {
            load_model(&model)?.export(&out)?;
            println!("Exported {} to {}", model.display(), out.display());
        }
        Command::Render { data, feature, out_dir } => {
            let table = read_table(&data)?;
            let column: &Column = table
                .column(&feature)
                .ok_or_else(|| format!("no column named `{}` in {}", feature, data.display()))?;
            fs::create_dir_all(&out_dir)?;
            let images = draw_strokes_column(column)?;
            for (row, image) in images.iter().enumerate() {
                image.save(out_dir.join(format!("{:05}.png", row)))?;
            }
            println!("Rendered {} drawings into {}", images.len(), out_dir.display());
        }
    }
    Ok(())
}

fn describe_metric(value: &MetricValue) -> String {
    match value {
        MetricValue::ConfusionMatrix(cells) => cells
            .iter()
            .map(|c| format!("{}->{}: {}", c.target_label, c.predicted_label, c.count))
            .collect::<Vec<_>>()
            .join(", "),
        MetricValue::RocCurve(points) => format!("{} points", points.len()),
        MetricValue::Scalar(v) => v.to_string(),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();
    let start = Instant::now();
    run(cli.command)?;
    info!("Finished in {:?}", start.elapsed());
    Ok(())
}
