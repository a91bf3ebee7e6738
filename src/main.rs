//! SentioVox CLI - emotion-aware synthesis through a local AivisSpeech engine

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use sentiovox::emotion::{EmotionLabel, EmotionParameterMapper, EmotionVector, ParameterTable};
use sentiovox::pipeline::{ProgressEvent, SegmentStatus};
use sentiovox::{
    select_range, AivisClient, FailurePolicy, OrchestratorConfig, OutputEncoding,
    ProcessSupervisor, RunReport, SegmentInput, SynthesisOrchestrator, VERSION,
};

/// SentioVox - turn emotion-annotated text into one spoken audio file
#[derive(Parser, Debug)]
#[command(name = "sentiovox")]
#[command(author, version, about, long_about = None)]
#[command(long_about = "
SentioVox synthesizes a list of text segments, each with eight emotion scores,
through a locally hosted AivisSpeech engine and assembles them into one file.

Input is a JSON array:
  [{\"text\": \"こんにちは\", \"emotions\": {\"joy\": 0.8}},
   {\"text\": \"さようなら\", \"emotions\": {\"sadness\": 0.6}}]

Examples:
  # Synthesize to m4a (falls back to WAV when ffmpeg is unavailable)
  sentiovox synthesize script.json --output story.m4a

  # Only lines 10 to 19 of the script
  sentiovox synthesize script.json --from 10 --to 19

  # Check the engine
  sentiovox status

  # Show the parameters an emotion mix maps to
  sentiovox map joy=0.8,surprise=0.3
")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Synthesize a JSON script into one audio file
    Synthesize {
        /// Input JSON file
        input: PathBuf,

        /// Output audio file path (default: output_<timestamp>.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Concurrent synthesis workers
        #[arg(short, long)]
        workers: Option<usize>,

        /// Write WAV instead of m4a
        #[arg(long)]
        wav: bool,

        /// Fail the whole run if any segment fails
        #[arg(long)]
        all_or_nothing: bool,

        /// Engine base URL
        #[arg(long)]
        engine_url: Option<String>,

        /// Write a JSON run report next to the audio
        #[arg(long)]
        report: Option<PathBuf>,

        /// First segment index to synthesize (inclusive)
        #[arg(long)]
        from: Option<usize>,

        /// Last segment index to synthesize (inclusive)
        #[arg(long)]
        to: Option<usize>,
    },

    /// Probe the engine and print its version
    Status,

    /// Print the synthesis parameters for an emotion mix
    Map {
        /// `label=score` pairs (English or Japanese labels) or eight comma-separated scores
        emotions: String,
    },

    /// Write the default configuration to a file
    InitConfig {
        /// Destination path
        #[arg(default_value = "sentiovox.toml")]
        path: PathBuf,
    },
}

fn load_config(path: Option<&Path>) -> Result<OrchestratorConfig> {
    match path {
        Some(path) => OrchestratorConfig::load(path)
            .with_context(|| format!("Failed to load config {:?}", path)),
        None => Ok(OrchestratorConfig::default()),
    }
}

fn parse_emotions(raw: &str) -> Result<EmotionVector> {
    let parts: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if parts.iter().all(|p| !p.contains('=')) {
        let scores = parts
            .iter()
            .map(|p| p.parse::<f32>().with_context(|| format!("Invalid score '{}'", p)))
            .collect::<Result<Vec<_>>>()?;
        return Ok(EmotionVector::from_slice(&scores)?);
    }

    let mut vector = EmotionVector::new();
    for part in parts {
        let Some((name, score)) = part.split_once('=') else {
            bail!("Expected label=score, got '{}'", part);
        };
        let label: EmotionLabel = name.parse()?;
        let score: f32 = score
            .trim()
            .parse()
            .with_context(|| format!("Invalid score for {}", label))?;
        vector.set(label, score);
    }
    Ok(vector)
}

fn default_output_path(encoding: OutputEncoding) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    PathBuf::from(format!("output_{}.{}", stamp, encoding.extension()))
}

fn create_progress_bar(total: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );
    Ok(pb)
}

fn write_report_json(report: &RunReport, audio_path: &Path, path: &Path) -> Result<()> {
    let failures: Vec<_> = report
        .failures
        .iter()
        .map(|f| {
            serde_json::json!({
                "index": f.index,
                "kind": f.kind.to_string(),
                "message": f.error.to_string(),
            })
        })
        .collect();
    let body = serde_json::json!({
        "run_id": report.run_id,
        "output": audio_path,
        "encoding": report.artifact.encoding,
        "requested_encoding": report.artifact.requested_encoding,
        "sample_rate": report.artifact.sample_rate,
        "channels": report.artifact.channels,
        "duration_secs": report.artifact.duration_secs,
        "partial": report.artifact.partial,
        "downgrade": report.artifact.downgrade.as_ref().map(|e| e.to_string()),
        "cancelled": report.cancelled,
        "total_segments": report.total_segments,
        "synthesized": report.synthesized,
        "failures": failures,
        "skipped": report.skipped,
        "unfinished": report.unfinished,
        "boundaries": report.artifact.boundaries,
        "elapsed_secs": report.elapsed.as_secs_f64(),
    });
    std::fs::write(path, serde_json::to_string_pretty(&body)?)
        .with_context(|| format!("Failed to write report {:?}", path))?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_synthesize(
    mut config: OrchestratorConfig,
    input: &Path,
    output: Option<PathBuf>,
    workers: Option<usize>,
    wav: bool,
    all_or_nothing: bool,
    engine_url: Option<String>,
    report_path: Option<PathBuf>,
    (from, to): (Option<usize>, Option<usize>),
) -> Result<()> {
    if let Some(workers) = workers {
        config.run.workers = workers;
    }
    if wav {
        config.encoding.format = OutputEncoding::Wav;
    }
    if all_or_nothing {
        config.run.failure_policy = FailurePolicy::AllOrNothing;
    }
    if let Some(url) = engine_url {
        config.engine.base_url = url;
    }
    config.validate()?;

    let script = SegmentInput::load(input)?;
    let script_len = script.len();
    let inputs = select_range(script, from, to)?;
    if inputs.len() == script_len {
        info!("Input: {:?} ({} segments)", input, script_len);
    } else {
        info!(
            "Input: {:?} ({} of {} segments, starting at {})",
            input,
            inputs.len(),
            script_len,
            from.unwrap_or(0)
        );
    }

    let supervisor = Arc::new(ProcessSupervisor::new(config.engine.clone())?);
    let client = AivisClient::new(
        supervisor,
        config.client.clone(),
        config.assembly.target_sample_rate,
    )?;

    let pb = create_progress_bar(inputs.len())?;
    let progress_bar = pb.clone();
    let orchestrator = SynthesisOrchestrator::from_config(Arc::new(client), &config)?
        .with_progress(Arc::new(move |event: ProgressEvent| {
            progress_bar.set_position(event.completed as u64);
            if event.status == SegmentStatus::Failed {
                progress_bar.set_message(format!("segment {} failed", event.index));
            }
        }));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing in-flight segments");
            on_signal.cancel();
        }
    });

    let result = orchestrator.run(inputs, cancel).await;
    pb.finish_and_clear();
    let report = result?;

    let requested = output.unwrap_or_else(|| default_output_path(config.encoding.format));
    let written = report.artifact.write_to(&requested)?;

    if let Some(path) = report_path {
        write_report_json(&report, &written, &path)?;
    }

    println!("Output: {}", written.display());
    println!(
        "Duration: {:.2}s at {} Hz ({} segments of {})",
        report.artifact.duration_secs,
        report.artifact.sample_rate,
        report.synthesized,
        report.total_segments
    );
    if let Some(reason) = &report.artifact.downgrade {
        println!("Degraded: wrote WAV instead of {} ({})", report.artifact.requested_encoding, reason);
    }
    for failure in &report.failures {
        println!("Failed: segment {} [{}] {}", failure.index, failure.kind, failure.error);
    }
    if !report.skipped.is_empty() {
        println!("Skipped (blank): {:?}", report.skipped);
    }
    if report.cancelled {
        println!("Cancelled: {} segment(s) not synthesized", report.unfinished.len());
    }
    println!("Elapsed: {:.2}s", report.elapsed.as_secs_f64());
    Ok(())
}

async fn run_status(config: OrchestratorConfig) -> Result<()> {
    let supervisor = Arc::new(ProcessSupervisor::new(config.engine.clone())?);
    println!("Engine: {}", supervisor.base_url());

    if !supervisor.probe().await {
        println!("Status: not reachable");
        return Ok(());
    }

    let client = AivisClient::new(
        Arc::clone(&supervisor),
        config.client.clone(),
        config.assembly.target_sample_rate,
    )?;
    let version = client.engine_version().await?;
    println!("Status: {}", supervisor.state());
    println!("Version: {}", version);
    Ok(())
}

fn run_map(config: &OrchestratorConfig, raw: &str) -> Result<()> {
    let emotions = parse_emotions(raw)?;
    let table = match &config.mapper.table_path {
        Some(path) => ParameterTable::load(path)?,
        None => ParameterTable::default(),
    };
    let mapper = EmotionParameterMapper::new(table, config.mapper.activation_threshold);

    let params = mapper.map(&emotions);
    println!("Emotions: {}", emotions);
    println!("Style ID: {}", mapper.style_for(&emotions));
    println!("{}", serde_json::to_string_pretty(&params)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    sentiovox::init_logging(level);
    info!("SentioVox v{}", VERSION);

    match cli.command {
        Commands::Synthesize {
            input,
            output,
            workers,
            wav,
            all_or_nothing,
            engine_url,
            report,
            from,
            to,
        } => {
            run_synthesize(
                config,
                &input,
                output,
                workers,
                wav,
                all_or_nothing,
                engine_url,
                report,
                (from, to),
            )
            .await
        }

        Commands::Status => run_status(config).await,

        Commands::Map { emotions } => run_map(&config, &emotions),

        Commands::InitConfig { path } => {
            if path.exists() {
                bail!("{:?} already exists", path);
            }
            OrchestratorConfig::default().save(&path)?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
    }
}
