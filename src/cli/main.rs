//! Single-image inference CLI
//!
//! `image-infer [OPTIONS] <MODEL> <INPUT> <OUTPUT>` loads MODEL, feeds it
//! INPUT and writes the output tensor to OUTPUT as an image. Exits 0 on
//! success and 1 on any failure, argument errors included.

use super::config::CliConfigBuilder;
use crate::{
    config::{OutputFormat, PixelScaling},
    error::InferError,
    runner::{InferenceRunner, ModelSummary, RunReport},
    tracing_config::{events, init_cli_tracing},
    utils::ExecutionProviderManager,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};

/// Run one image through a model and save the output tensor as an image
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "image-infer")]
pub struct Cli {
    /// Model file (ONNX)
    #[arg(value_name = "MODEL", required_unless_present = "show_providers")]
    pub model: Option<PathBuf>,

    /// Input image; its size must match the model's input tensor
    #[arg(value_name = "INPUT", required_unless_present_any = ["show_providers", "inspect"])]
    pub input: Option<PathBuf>,

    /// Output image; the format follows the extension (PNG when unknown)
    #[arg(value_name = "OUTPUT", required_unless_present_any = ["show_providers", "inspect"])]
    pub output: Option<PathBuf>,

    /// Execution provider in format backend:provider (e.g., onnx:auto, onnx:coreml, tract:cpu)
    #[arg(short, long, default_value = "onnx:auto")]
    pub execution_provider: String,

    /// Hardware delegate option as key=value (repeatable, e.g. device_id=0)
    #[arg(short = 'd', long = "delegate-option", value_name = "KEY=VALUE")]
    pub delegate_options: Vec<String>,

    /// Number of intra-op threads (0 = engine default)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Pixel scaling for floating point tensors
    #[arg(short, long, value_enum, default_value_t = CliScaling::Raw)]
    pub scaling: CliScaling,

    /// Output image format (default: from the OUTPUT extension, PNG when unknown)
    #[arg(short, long, value_enum)]
    pub format: Option<CliOutputFormat>,

    /// Increase log verbosity (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log line format (json requires the tracing-json feature)
    #[arg(long, value_enum, default_value_t = CliLogFormat::Console)]
    pub log_format: CliLogFormat,

    /// Write logs to this file instead of stderr (requires the tracing-files feature)
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Print the run report (or the --inspect summary) as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Describe the model's tensors and exit
    #[arg(long)]
    pub inspect: bool,

    /// Show backend and execution provider availability and exit
    #[arg(long)]
    pub show_providers: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliScaling {
    /// Pixel value v becomes element v
    Raw,
    /// Pixel value v becomes element v / 255
    Normalized,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliOutputFormat {
    Png,
    Jpeg,
    Tiff,
    Webp,
}

impl From<CliOutputFormat> for OutputFormat {
    fn from(format: CliOutputFormat) -> Self {
        match format {
            CliOutputFormat::Png => Self::Png,
            CliOutputFormat::Jpeg => Self::Jpeg,
            CliOutputFormat::Tiff => Self::Tiff,
            CliOutputFormat::Webp => Self::WebP,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLogFormat {
    /// Colored, human-readable
    Console,
    /// No colors, for CI logs
    Compact,
    /// One JSON object per line
    Json,
}

impl From<CliScaling> for PixelScaling {
    fn from(scaling: CliScaling) -> Self {
        match scaling {
            CliScaling::Raw => Self::Raw,
            CliScaling::Normalized => Self::Normalized,
        }
    }
}

/// Entry point used by the `image-infer` binary
#[must_use]
pub fn main() -> ExitCode {
    run(std::env::args_os())
}

/// Parse `args` and run the CLI, returning the process exit code
pub fn run<I, T>(args: I) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version also arrive here
            let code = if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
            let _ = e.print();
            return code;
        },
    };

    let tracing_guard = CliConfigBuilder::tracing_config(&cli).and_then(init_cli_tracing);
    let _tracing_guard = match tracing_guard {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e:#}");
            return ExitCode::FAILURE;
        },
    };

    match execute(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let stage = e
                .downcast_ref::<InferError>()
                .map_or("cli", InferError::stage);
            events::error_with_context(&format!("{e:#}"), stage);
            ExitCode::FAILURE
        },
    }
}

fn execute(cli: &Cli) -> Result<()> {
    info!("image-infer {}", env!("CARGO_PKG_VERSION"));

    if cli.show_providers {
        return show_provider_diagnostics(cli.json);
    }

    let config = CliConfigBuilder::from_cli(cli).context("Invalid arguments")?;
    let runner = InferenceRunner::new(config).context("Invalid configuration")?;
    let config = runner.config();
    debug!(
        "Backend: {}, Provider: {}, Scaling: {:?}, Format: {:?}",
        config.backend_type, config.execution_provider, config.scaling, config.output_format
    );

    if cli.inspect {
        let summary = runner.inspect().context("Failed to inspect model")?;
        return print_summary(&summary, cli.json);
    }

    let (Some(input), Some(output)) = (&cli.input, &cli.output) else {
        anyhow::bail!(InferError::argument("INPUT and OUTPUT are required"));
    };

    let report = runner
        .run(input, output)
        .with_context(|| format!("Inference failed for '{}'", input.display()))?;
    print_report(&report, cli.json)
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(report).context("Failed to serialize run report")?
        );
        return Ok(());
    }

    info!(
        "Done: {} -> {} (model load {:.0} ms, inference {:.2} ms)",
        report.input_geometry,
        report.output_geometry,
        report.model_load_ms,
        report.inference_ms
    );
    Ok(())
}

fn print_summary(summary: &ModelSummary, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(summary).context("Failed to serialize model summary")?
        );
        return Ok(());
    }

    println!(
        "Model: {} ({} backend, loaded in {:.0} ms)",
        summary.model_path.display(),
        summary.backend,
        summary.model_load_ms
    );
    for (role, tensors) in [("Input", &summary.inputs), ("Output", &summary.outputs)] {
        for tensor in tensors {
            let image = match (&tensor.geometry, &tensor.problem) {
                (Some(geometry), _) => geometry.to_string(),
                (None, Some(problem)) => format!("not an image ({problem})"),
                (None, None) => "not an image".to_string(),
            };
            println!(
                "{role} '{}': {} {} -> {image}",
                tensor.info.name,
                tensor.info.dims_display(),
                tensor.info.element_type
            );
        }
    }
    if !summary.is_runnable() {
        println!("This model cannot be run: exactly one image input and one output are required");
    }
    Ok(())
}

fn show_provider_diagnostics(json: bool) -> Result<()> {
    let all_providers = ExecutionProviderManager::list_all_providers();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&all_providers)
                .context("Failed to serialize providers")?
        );
        return Ok(());
    }

    println!("Backend and Execution Provider Diagnostics");
    println!("  System: {} ({})", std::env::consts::OS, std::env::consts::ARCH);
    println!();
    println!("Execution Providers:");
    for provider_info in all_providers {
        let status = if provider_info.available {
            "available"
        } else {
            "not available"
        };
        println!(
            "  {:<12} {:<14} {}",
            provider_info.name, status, provider_info.description
        );
    }
    println!();
    println!("Usage Examples:");
    println!("  -e onnx:auto              # Best available delegate (default)");
    println!("  -e onnx:cuda -d device_id=1");
    println!("  -e onnx:coreml -d subgraphs=false");
    println!("  -e tract                  # Same as tract:cpu");
    Ok(())
}
