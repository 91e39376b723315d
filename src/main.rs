use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use slide_lib::api::{ExtractionRequest, ExtractionStatus, ExtractionTask, TaskEvent};
use slide_lib::core::video::{list_slides, FfmpegSource, SlideFormat};
use slide_lib::core::AppConfig;
use slide_lib::frame_extractor::{ComparatorKind, ExtractionOutcome, Frame};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

const EXIT_FAILED: i32 = 1;
const EXIT_CANCELLED: i32 = 130;

#[derive(Parser)]
#[command(author, version, about = "Extract distinct slides from lecture recordings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample a video and save every new slide as an image
    Extract {
        /// Video file path or URL readable by ffmpeg
        #[arg(short, long)]
        video: String,
        /// Seconds between samples
        #[arg(short, long)]
        interval: Option<f64>,
        /// Similarity at or above which a sample counts as the same slide
        #[arg(short, long)]
        threshold: Option<f64>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short, long, value_enum)]
        format: Option<SlideFormat>,
        #[arg(short, long, value_enum)]
        comparator: Option<ComparatorKind>,
        /// Replace slides left in the output directory by an earlier run
        #[arg(long, default_value_t = false)]
        overwrite: bool,
        /// Also skip samples whose OCR text matches the last slide
        #[arg(long, default_value_t = false)]
        ocr: bool,
        /// Path to the tesseract executable (implies --ocr)
        #[arg(long)]
        tesseract: Option<PathBuf>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print duration, frame rate and size of a video as JSON
    Probe {
        video: String,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the similarity score of two images
    Compare {
        first: PathBuf,
        second: PathBuf,
        #[arg(short, long, value_enum, default_value_t = ComparatorKind::Structural)]
        comparator: ComparatorKind,
    },
    /// List slide files of a directory in presentation order
    List { dir: PathBuf },
}

fn main() {
    slide_lib::init_logging();
    let cli = Cli::parse();

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            EXIT_FAILED
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Extract {
            video,
            interval,
            threshold,
            output,
            format,
            comparator,
            overwrite,
            ocr,
            tesseract,
            config,
        } => {
            let mut app_config = AppConfig::load(config.as_deref())?;
            if let Some(interval) = interval {
                app_config.interval_secs = interval;
            }
            if let Some(threshold) = threshold {
                app_config.similarity_threshold = threshold;
            }
            if let Some(output) = output {
                app_config.output_directory = output;
            }
            if let Some(format) = format {
                app_config.image_format = format;
            }
            if let Some(comparator) = comparator {
                app_config.comparator = comparator;
            }
            if let Some(tesseract) = tesseract {
                app_config.ocr.tesseract_path = tesseract;
                app_config.ocr.enabled = true;
            }
            app_config.overwrite_existing |= overwrite;
            app_config.ocr.enabled |= ocr;

            extract(ExtractionRequest::from_config(video, &app_config))
        }
        Commands::Probe { video, config } => {
            let app_config = AppConfig::load(config.as_deref())?;
            let source = FfmpegSource::with_tools(app_config.ffmpeg_path, app_config.ffprobe_path);
            let info = source.probe(&video)?;
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(0)
        }
        Commands::Compare {
            first,
            second,
            comparator,
        } => {
            let a = load_frame(&first)?;
            let b = load_frame(&second)?;
            let score = comparator.build().similarity(&a, &b)?;
            println!("{:.4}", score);
            Ok(0)
        }
        Commands::List { dir } => {
            let slides = list_slides(&dir)
                .with_context(|| format!("Failed to read slide directory {}", dir.display()))?;
            for slide in slides {
                println!("{}", slide.display());
            }
            Ok(0)
        }
    }
}

fn extract(request: ExtractionRequest) -> Result<i32> {
    println!("{}", ExtractionStatus::Ready);

    let task = ExtractionTask::spawn(request);
    let token = task.cancellation_token();
    ctrlc::set_handler(move || token.cancel()).context("Failed to install Ctrl-C handler")?;

    let mut stderr = std::io::stderr();
    while let Some(event) = task.next_event() {
        match event {
            TaskEvent::Status(status) => {
                if status.is_finished() {
                    eprintln!();
                }
                println!("{}", status);
            }
            TaskEvent::Progress(progress) => {
                let _ = write!(
                    stderr,
                    "\r⏳ {:>5.1}%  {:.1}s / {:.1}s  slides: {}",
                    progress.fraction() * 100.0,
                    progress.timestamp_secs,
                    progress.duration_secs,
                    progress.slides_written
                );
                let _ = stderr.flush();
            }
            TaskEvent::Finished { .. } => {}
        }
    }

    let result = task.wait();
    for slide in &result.slides {
        println!(
            "{:>5}  {:>9}  {}",
            slide.index,
            format_timestamp(slide.timestamp_secs),
            slide.path.display()
        );
    }

    Ok(match result.outcome {
        ExtractionOutcome::Completed => 0,
        ExtractionOutcome::Cancelled => EXIT_CANCELLED,
        ExtractionOutcome::Failed => EXIT_FAILED,
    })
}

fn load_frame(path: &Path) -> Result<Frame> {
    let image =
        image::open(path).with_context(|| format!("Failed to open image {}", path.display()))?;
    Ok(Frame::from_image(&image, Duration::ZERO))
}

fn format_timestamp(secs: f64) -> String {
    let total = secs.max(0.0) as u64;
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total / 60) % 60,
        total % 60
    )
}
