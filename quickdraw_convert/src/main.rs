use std::error::Error;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use clap::Parser;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Converts Quick, Draw! ndjson files into the JSON-lines tables the
/// drawing classifier reads.
#[derive(Parser, Debug)]
struct Args {
    /// Input ndjson file; repeat to merge several words
    #[arg(long = "input", required = true)]
    inputs: Vec<PathBuf>,
    #[arg(long)]
    output: PathBuf,
    /// Records to keep from each input file
    #[arg(long)]
    limit: Option<usize>,
    /// Skip drawings the game did not recognize
    #[arg(long)]
    recognized_only: bool,
}

// One stroke is [xs, ys] or, in the raw dataset, [xs, ys, ts]
#[derive(Deserialize, Debug)]
struct QuickDrawRecord {
    word: String,
    #[serde(default = "yes")]
    recognized: bool,
    drawing: Vec<Vec<Vec<f64>>>,
}

fn yes() -> bool {
    true
}

#[derive(Serialize, PartialEq, Debug)]
struct Point {
    x: f64,
    y: f64,
}

#[derive(Serialize, Debug)]
struct Row {
    drawing: Vec<Vec<Point>>,
    label: String,
}

fn convert_record(record: QuickDrawRecord, line_no: usize) -> Result<Row, String> {
    let mut drawing = Vec::with_capacity(record.drawing.len());
    for (i, stroke) in record.drawing.into_iter().enumerate() {
        if stroke.len() < 2 {
            return Err(format!("line {}: stroke {} has no x/y arrays", line_no, i));
        }
        let (xs, ys) = (&stroke[0], &stroke[1]);
        if xs.len() != ys.len() {
            return Err(format!(
                "line {}: stroke {} has {} x values but {} y values",
                line_no,
                i,
                xs.len(),
                ys.len()
            ));
        }
        drawing.push(xs.iter().zip(ys).map(|(&x, &y)| Point { x, y }).collect());
    }
    Ok(Row {
        drawing,
        label: record.word,
    })
}

/// Copies rows from `reader` to `writer`, returning how many were written.
fn convert<R: BufRead, W: Write>(
    reader: R,
    mut writer: W,
    limit: Option<usize>,
    recognized_only: bool,
) -> Result<usize, Box<dyn Error>> {
    let mut written = 0;
    for (ix, line) in reader.lines().enumerate() {
        if limit.map_or(false, |limit| written >= limit) {
            break;
        }
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let line_no = ix + 1;
        let record: QuickDrawRecord =
            serde_json::from_str(&line).map_err(|e| format!("line {}: {}", line_no, e))?;
        if recognized_only && !record.recognized {
            continue;
        }
        let row = convert_record(record, line_no)?;
        serde_json::to_writer(&mut writer, &row)?;
        writer.write_all(b"\n")?;
        written += 1;
    }
    Ok(written)
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let mut writer = BufWriter::new(File::create(&args.output)?);
    let mut total = 0;
    for input in &args.inputs {
        let reader = BufReader::new(File::open(input)?);
        let count = convert(reader, &mut writer, args.limit, args.recognized_only)
            .map_err(|e| format!("{}: {}", input.display(), e))?;
        if count == 0 {
            warn!("No drawings taken from {}", input.display());
        }
        info!("Converted {} drawings from {}", count, input.display());
        total += count;
    }
    writer.flush()?;
    info!("Wrote {} rows to {}", total, args.output.display());
    Ok(())
}
