// Replays still images through the tracker and profiles it. Useful for tuning the
// configuration against recorded eye footage exported as image sequences.

use anyhow::{Context, Result};
use clap::Parser;
use flexi_logger::{Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming};
use log::{info, warn};
use pupil_gate::core_modules::frame::Frame;
use pupil_gate::{FrameReport, PupilTracker, TrackerConfig};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const LOG_FILE_SIZE: u64 = 5 * 1024 * 1024;
const LOG_FILES_KEPT: usize = 5;

#[derive(Parser, Debug)]
#[command(name = "pupil_gate")]
#[command(author, version, about = "Pupil tracking replay and profiling", long_about = None)]
struct Args {
    /// Image files, processed in the given order as consecutive frames
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// JSON configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Lock the pupil position after this many frames
    #[arg(long)]
    lock_after: Option<usize>,

    /// Write annotated frames into this directory
    #[arg(long)]
    annotate_dir: Option<PathBuf>,

    /// Log level specification, e.g. "info" or "debug,pupil_gate=trace"
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn setup_logging(spec: &str) -> Result<LoggerHandle> {
    let handle = Logger::try_with_str(spec)?
        .log_to_file(FileSpec::default().directory("logs").basename("pupil_gate"))
        .duplicate_to_stdout(Duplicate::All)
        .rotate(
            Criterion::Size(LOG_FILE_SIZE),
            Naming::Numbers,
            Cleanup::KeepLogFiles(LOG_FILES_KEPT),
        )
        .start()?;
    Ok(handle)
}

fn load_frame(path: &Path) -> Result<Frame> {
    let image = image::open(path)
        .with_context(|| format!("failed to decode {}", path.display()))?
        .to_rgb8();
    Ok(Frame::from_rgb_image(&image)?)
}

fn save_annotated(dir: &Path, source: &Path, report: &FrameReport) -> Result<()> {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "frame".to_string());
    let target = dir.join(format!("{stem}_annotated.png"));
    report
        .frame
        .to_rgb_image()
        .save(&target)
        .with_context(|| format!("failed to write {}", target.display()))?;
    Ok(())
}

fn describe(report: &FrameReport) -> String {
    let center = match report.pupil_center {
        Some((x, y)) => format!("({x:.1}, {y:.1})"),
        None => "none".to_string(),
    };
    let tolerance = match report.tolerance {
        Some(state) => format!("{state:?}"),
        None => "-".to_string(),
    };
    format!(
        "centre {center} level {:?} ellipse {} tolerance {tolerance}",
        report.threshold_level,
        if report.ellipse.is_some() { "yes" } else { "no" },
    )
}

struct Timings {
    samples: Vec<Duration>,
}

impl Timings {
    fn summary(&self) -> Option<String> {
        let count = self.samples.len();
        if count == 0 {
            return None;
        }
        let ms: Vec<f64> = self.samples.iter().map(|d| d.as_secs_f64() * 1000.0).collect();
        let mean = ms.iter().sum::<f64>() / count as f64;
        let min = ms.iter().copied().fold(f64::INFINITY, f64::min);
        let max = ms.iter().copied().fold(0.0, f64::max);
        let fps = if mean > 0.0 { 1000.0 / mean } else { f64::INFINITY };
        Some(format!(
            "{count} frames: mean {mean:.2} ms, min {min:.2} ms, max {max:.2} ms, {fps:.1} FPS"
        ))
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _logger = setup_logging(&args.log_level)?;

    let config = match &args.config {
        Some(path) => TrackerConfig::load(path)
            .with_context(|| format!("failed to load configuration {}", path.display()))?,
        None => TrackerConfig::default(),
    };
    let mut tracker = PupilTracker::new(config)?;

    if let Some(dir) = &args.annotate_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let mut timings = Timings {
        samples: Vec::with_capacity(args.images.len()),
    };
    for (index, path) in args.images.iter().enumerate() {
        let frame = load_frame(path)?;

        let started = Instant::now();
        let report = tracker.process_frame(&frame)?;
        timings.samples.push(started.elapsed());

        println!("{}: {}", path.display(), describe(&report));
        if let Some(dir) = &args.annotate_dir {
            save_annotated(dir, path, &report)?;
        }

        if args.lock_after == Some(index + 1) {
            match tracker.lock_current_position() {
                Ok((x, y)) => info!("Calibrated at ({x:.1}, {y:.1}) after frame {}", index + 1),
                Err(err) => warn!("Could not calibrate after frame {}: {err}", index + 1),
            }
        }
    }

    if let Some(summary) = timings.summary() {
        println!("{summary}");
    }
    Ok(())
}
