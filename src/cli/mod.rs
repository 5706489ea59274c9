//! # CLI Module
//!
//! Command-line interface for the orientation fixer.
//!
//! ## Usage
//! ```bash
//! # Write `-rotated` siblings next to photos that need turning
//! rotate ~/Photos
//!
//! # Replace the originals, using at most 4 workers
//! rotate ~/Photos --overwrite --max-workers 4
//!
//! # JSON output
//! rotate ~/Photos --output json
//! ```

use clap::{ArgAction, Parser, ValueEnum};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use photo_orient::core::detector::{default_model_path, RustfaceFactory, RustfaceSettings};
use photo_orient::core::pipeline::{Pipeline, PipelineResult};
use photo_orient::core::pool::{CancellationToken, TaskStatus};
use photo_orient::core::transform::{StandardCodec, DEFAULT_JPEG_QUALITY};
use photo_orient::error::Result;
use photo_orient::events::{Event, EventChannel, OrientEvent, PipelineEvent, ScanEvent};
use std::path::PathBuf;
use std::thread;
use tracing::warn;

/// Rotate photos so the faces in them are upright
#[derive(Parser, Debug)]
#[command(name = "rotate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory to scan recursively
    directory: PathBuf,

    /// Replace originals instead of writing `<name>-rotated.<ext>` siblings
    #[arg(
        long,
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    overwrite: bool,

    /// Maximum number of worker threads (default: number of CPUs)
    #[arg(short = 'j', long, value_parser = clap::value_parser!(u16).range(1..))]
    max_workers: Option<u16>,

    /// SeetaFace frontal face model file
    #[arg(long, env = "PHOTO_ORIENT_MODEL")]
    model: Option<PathBuf>,

    /// Smallest face (in pixels) the detector looks for
    #[arg(
        long,
        default_value_t = RustfaceSettings::default().min_face_size,
        value_parser = clap::value_parser!(u32).range(20..)
    )]
    min_face_size: u32,

    /// File extensions to process
    #[arg(long, value_delimiter = ',', default_value = "jpg,jpeg,png")]
    extensions: Vec<String>,

    /// Skip hidden files and directories
    #[arg(long)]
    skip_hidden: bool,

    /// Follow symbolic links to directories
    #[arg(long)]
    follow_symlinks: bool,

    /// Quality for JPEGs that cannot be rotated losslessly
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// Output format
    #[arg(short, long, default_value = "pretty")]
    output: OutputFormat,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Progress bar and a styled summary
    Pretty,
    /// JSON summary for scripting
    Json,
    /// Rewrite lines only
    Minimal,
}

/// Run the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    photo_orient::init_tracing(cli.verbose);
    run_rotate(cli)
}

fn run_rotate(cli: Cli) -> Result<()> {
    let term = Term::stderr();
    let output = cli.output;

    if matches!(output, OutputFormat::Pretty) {
        term.write_line(&format!(
            "{} {}",
            style("Photo Orient").bold().cyan(),
            style(concat!("v", env!("CARGO_PKG_VERSION"))).dim()
        ))
        .ok();
        term.write_line("").ok();
    }

    // Fail before scanning if there is no model to load
    let factory = RustfaceFactory::new(cli.model.unwrap_or_else(default_model_path)).with_settings(
        RustfaceSettings {
            min_face_size: cli.min_face_size,
            ..Default::default()
        },
    );
    factory.check_model()?;

    if cli.verbose && matches!(output, OutputFormat::Pretty) {
        term.write_line(&format!(
            "  {} {}",
            style("Model:").dim(),
            factory.model_path().display()
        ))
        .ok();
    }

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        warn!("Could not install Ctrl-C handler: {}", e);
    }

    let mut builder = Pipeline::builder()
        .root(&cli.directory)
        .extensions(cli.extensions)
        .include_hidden(!cli.skip_hidden)
        .follow_symlinks(cli.follow_symlinks)
        .overwrite(cli.overwrite)
        .codec(Box::new(StandardCodec::new(cli.jpeg_quality)))
        .detector_factory(Box::new(factory))
        .cancellation(cancel);
    if let Some(workers) = cli.max_workers {
        builder = builder.max_workers(workers as usize);
    }
    let pipeline = builder.build();

    let (sender, receiver) = EventChannel::new();

    // Progress bar for pretty output
    let progress = if matches!(output, OutputFormat::Pretty) {
        let pb = ProgressBar::new(0);
        if let Ok(bar_style) =
            ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(bar_style.progress_chars("█▓░"));
        }
        Some(pb)
    } else {
        None
    };

    let progress_clone = progress.clone();
    let verbose = cli.verbose;

    // Handle events in a separate thread
    let event_thread = thread::spawn(move || {
        for event in receiver.iter() {
            match event {
                Event::Pipeline(PipelineEvent::PhaseChanged { phase }) => {
                    if let Some(ref pb) = progress_clone {
                        pb.set_message(format!("{}", phase));
                    }
                }
                Event::Scan(ScanEvent::Completed { total_images }) => {
                    if let Some(ref pb) = progress_clone {
                        pb.set_length(total_images as u64);
                    }
                }
                Event::Orient(OrientEvent::Rewritten { path, degrees, .. }) => {
                    let line = format!("{} (Rotated {} Degrees)", path.display(), degrees);
                    match progress_clone {
                        Some(ref pb) => pb.suspend(|| println!("{}", line)),
                        None if !matches!(output, OutputFormat::Json) => println!("{}", line),
                        None => {}
                    }
                }
                Event::Orient(OrientEvent::Progress(p)) => {
                    if let Some(ref pb) = progress_clone {
                        pb.set_position(p.completed as u64);
                        if verbose {
                            pb.set_message(
                                p.current_path
                                    .file_name()
                                    .unwrap_or_default()
                                    .to_string_lossy()
                                    .into_owned(),
                            );
                        }
                    }
                }
                Event::Pipeline(PipelineEvent::Cancelled) => {
                    if let Some(ref pb) = progress_clone {
                        pb.set_message("cancelled");
                    }
                }
                Event::Pipeline(PipelineEvent::Completed { .. }) => {
                    if let Some(ref pb) = progress_clone {
                        pb.finish_and_clear();
                    }
                }
                _ => {}
            }
        }
    });

    let result = pipeline.run_with_events(&sender);

    // Drop sender to signal event thread to finish
    drop(sender);
    event_thread.join().ok();
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    let result = result?;

    match output {
        OutputFormat::Pretty => print_pretty_results(&term, &result, verbose),
        OutputFormat::Json => print_json_results(&result),
        OutputFormat::Minimal => {}
    }

    Ok(())
}

fn print_pretty_results(term: &Term, result: &PipelineResult, verbose: bool) {
    let summary = &result.summary;

    term.write_line("").ok();
    term.write_line(&format!("{} Run Complete", style("✓").green().bold()))
        .ok();
    term.write_line("").ok();

    term.write_line(&format!(
        "  {} images scanned in {:.1}s with {} workers",
        style(summary.scanned).cyan(),
        summary.duration_ms as f64 / 1000.0,
        result.workers
    ))
    .ok();
    term.write_line(&format!("  {} rotated", style(summary.rewritten).green()))
        .ok();
    term.write_line(&format!("  {} already upright", style(summary.unchanged).cyan()))
        .ok();
    term.write_line(&format!("  {} without a detectable face", style(summary.no_face).dim()))
        .ok();

    if summary.failed > 0 {
        term.write_line(&format!("  {} failed", style(summary.failed).red()))
            .ok();
    }
    if summary.cancelled > 0 {
        term.write_line(&format!(
            "  {} not started (cancelled)",
            style(summary.cancelled).yellow()
        ))
        .ok();
    }

    let failures: Vec<_> = result.failures().collect();
    if !failures.is_empty() {
        term.write_line("").ok();
        term.write_line(&format!("{}", style("Failures:").bold().underlined()))
            .ok();
        for report in failures {
            if let TaskStatus::Failed { kind, message } = &report.status {
                term.write_line(&format!("  {} {}", style(format!("[{}]", kind)).red(), message))
                    .ok();
            }
        }
    }

    if verbose && !result.scan_errors.is_empty() {
        term.write_line("").ok();
        term.write_line(&format!("{}", style("Skipped entries:").bold().underlined()))
            .ok();
        for error in &result.scan_errors {
            term.write_line(&format!("  {} {}", style("○").dim(), error))
                .ok();
        }
    }
}

fn print_json_results(result: &PipelineResult) {
    let output = serde_json::json!({
        "summary": result.summary,
        "workers": result.workers,
        "scan_errors": result.scan_errors,
        "images": result.tasks.iter().map(|t| {
            let degrees = match &t.status {
                TaskStatus::Rewritten { rotation, .. } => Some(rotation.degrees()),
                _ => None,
            };
            serde_json::json!({
                "report": t,
                "degrees": degrees,
            })
        }).collect::<Vec<_>>()
    });

    match serde_json::to_string_pretty(&output) {
        Ok(json) => println!("{}", json),
        Err(e) => warn!("Failed to serialize results: {}", e),
    }
}
