//! Scriptorium batch CLI
//!
//! Runs files through the extraction pipeline without the server, one job
//! per input file, writing markdown and metadata into a timestamped folder.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use scriptorium_server::config::Config;
use scriptorium_server::jobs::batch::{batch_output_dir, collect_input_files, BatchJob, BatchQueue};
use scriptorium_server::ocr::{Extractor, OcrMode, OllamaEngine};
use scriptorium_server::pdf::MuPdfRasterizer;

#[derive(Parser, Debug)]
#[command(name = "scriptorium-cli")]
#[command(version, about = "Batch OCR of images and PDFs into markdown")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process files or directories
    Process {
        /// Input files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Extraction mode
        #[arg(long, default_value = "text-only", value_parser = ["text-only", "text-img"])]
        mode: String,

        /// PDF pages to process, e.g. "1-5,7"
        #[arg(long)]
        pages: Option<String>,

        /// Compute device passed to the model
        #[arg(long, default_value = "auto", value_parser = ["auto", "cuda", "cpu", "mps"])]
        device: String,

        /// Output root; each run gets its own timestamped folder
        #[arg(short, long, env = "OUTPUT_DIR", default_value = "output")]
        output: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "scriptorium_server=debug,scriptorium_cli=debug"
    } else {
        "scriptorium_server=info,scriptorium_cli=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Command::Process {
            paths,
            mode,
            pages,
            device,
            output,
        } => {
            let mode: OcrMode = mode.parse()?;
            let failed = process(&paths, mode, pages, &device, &output)?;
            if failed {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// Run the batch. Returns whether the run should exit with a failure status.
fn process(
    paths: &[PathBuf],
    mode: OcrMode,
    pages: Option<String>,
    device: &str,
    output: &std::path::Path,
) -> anyhow::Result<bool> {
    let files = collect_input_files(paths);
    if files.is_empty() {
        eprintln!("No supported files found");
        return Ok(true);
    }

    let config = Config::from_env();
    let output_dir = batch_output_dir(output);
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    tracing::info!("Output directory: {}", output_dir.display());
    tracing::info!(mode = mode.as_str(), device, "Processing {} file(s)", files.len());

    let mut queue = BatchQueue::new();
    for file in files {
        queue.push(BatchJob::new(file, &output_dir, mode, pages.clone(), device));
    }

    let extractor = Extractor::new(Arc::new(OllamaEngine::new(config.ocr.clone())));
    let rasterizer = MuPdfRasterizer::new(config.pdf.render_dpi);

    let (completed, failed) = queue.process(&extractor, &rasterizer, |job, index, total| {
        match &job.error {
            None => println!("[{}/{}] {} -> done", index + 1, total, job.file_name()),
            Some(e) => println!("[{}/{}] {} -> failed: {}", index + 1, total, job.file_name(), e),
        }
    });

    println!();
    println!("Completed: {}  Failed: {}", completed, failed);
    println!("Results saved to: {}", output_dir.display());

    Ok(failed > 0)
}
