//! WaveForge - Batch media-to-WAV converter
//!
//! Usage:
//!   waveforge convert <FILES>... --out-dir DIR   - Convert files to WAV
//!   waveforge probe <FILES>...                   - Show stream metadata

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use wf_core::{BitDepth, ChannelMode, SampleRate, format_duration, parse_time_range};
use wf_offline::{
    AudioDecoder, BatchEvent, ConversionSettings, Converter, JobStatus, MediaHint, OfflineConfig,
    SourceMedia, SrcQuality, TargetFormat,
};

#[derive(Parser)]
#[command(name = "waveforge", version, about = "Convert audio and video files to PCM WAV")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert files to WAV, one at a time
    Convert {
        /// Input audio or video files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Directory for converted files
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// Target format label (output is always WAV)
        #[arg(short, long, default_value = "wav")]
        format: TargetFormat,

        /// Output sample rate (44100 or 48000)
        #[arg(short = 'r', long, default_value = "44100", value_parser = parse_sample_rate)]
        sample_rate: SampleRate,

        /// Output bit depth (16 or 24)
        #[arg(short, long, default_value = "16", value_parser = parse_bit_depth)]
        bit_depth: BitDepth,

        /// Output channels (mono or stereo)
        #[arg(short, long, default_value = "stereo")]
        channels: ChannelMode,

        /// Trim every input to START:END seconds
        #[arg(short, long)]
        trim: Option<String>,

        /// Resampling quality (quick, medium, best)
        #[arg(short, long, value_parser = parse_quality)]
        quality: Option<SrcQuality>,

        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print duration, sample rate and bitrate of each file
    Probe {
        /// Input audio or video files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Convert {
            files,
            out_dir,
            format,
            sample_rate,
            bit_depth,
            channels,
            trim,
            quality,
            config,
        } => {
            let settings = ConversionSettings::new(format, sample_rate, bit_depth, channels);
            convert(ConvertArgs {
                files,
                out_dir,
                settings,
                trim,
                quality,
                config,
            })
        }
        Commands::Probe { files } => probe(&files),
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn parse_sample_rate(value: &str) -> Result<SampleRate, String> {
    let hz: u32 = value.parse().map_err(|_| format!("not a number: {}", value))?;
    SampleRate::try_from(hz).map_err(|e| e.to_string())
}

fn parse_bit_depth(value: &str) -> Result<BitDepth, String> {
    let bits: u16 = value.parse().map_err(|_| format!("not a number: {}", value))?;
    BitDepth::try_from(bits).map_err(|e| e.to_string())
}

fn parse_quality(value: &str) -> Result<SrcQuality, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "quick" | "fast" | "linear" => Ok(SrcQuality::Quick),
        "medium" => Ok(SrcQuality::Medium),
        "best" | "high" => Ok(SrcQuality::Best),
        other => Err(format!("unknown quality '{}'", other)),
    }
}

fn read_source(path: &Path) -> Result<SourceMedia> {
    let data = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(SourceMedia::new(name, "", data))
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONVERT
// ═══════════════════════════════════════════════════════════════════════════════

struct ConvertArgs {
    files: Vec<PathBuf>,
    out_dir: PathBuf,
    settings: ConversionSettings,
    trim: Option<String>,
    quality: Option<SrcQuality>,
    config: Option<PathBuf>,
}

/// Returns `Ok(false)` when any input was rejected or failed
fn convert(args: ConvertArgs) -> Result<bool> {
    let mut config = match &args.config {
        Some(path) => OfflineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => OfflineConfig::default(),
    };
    if let Some(quality) = args.quality {
        config = config.with_src_quality(quality);
    }
    log::debug!("Using {:?}", config);

    let trim = args
        .trim
        .as_deref()
        .map(parse_time_range)
        .transpose()
        .context("Invalid --trim")?;

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("Failed to create {}", args.out_dir.display()))?;

    let converter = Converter::new(config)?;

    let sources = args
        .files
        .iter()
        .map(|path| read_source(path))
        .collect::<Result<Vec<_>>>()?;
    let report = converter.submit(sources);
    for rejection in &report.rejected {
        eprintln!("skipped {}", rejection);
    }
    if report.accepted.is_empty() {
        bail!("No convertible input files");
    }

    converter.probe_all();
    if let Some((start, end)) = trim {
        for &id in &report.accepted {
            if let Err(e) = converter.set_trim(id, start, end) {
                eprintln!("job {}: trim ignored: {}", id, e);
            }
        }
    }

    let events = converter.subscribe();
    let printer = std::thread::spawn(move || {
        for event in events {
            match event {
                BatchEvent::JobFailed { id, error } => eprintln!("job {} failed: {}", id, error),
                BatchEvent::RunFinished(_) => break,
                _ => {}
            }
        }
    });

    let summary = converter.start(args.settings)?;
    if printer.join().is_err() {
        log::warn!("Event printer thread panicked");
    }

    for &id in &report.accepted {
        if converter.status(id) != Some(JobStatus::Done) {
            continue;
        }
        let Some(result) = converter.take_result(id) else {
            continue;
        };

        let path = write_new(&args.out_dir, &result.output_name, &result.bytes)?;

        println!(
            "{} ({}, {}, {} bytes)",
            path.display(),
            result.format,
            format_duration(result.duration_secs),
            result.byte_size
        );
        for note in &result.diagnostics {
            println!("  note: {}", note);
        }
    }

    println!(
        "{} converted, {} failed, {} rejected",
        summary.done,
        summary.failed,
        report.rejected.len()
    );

    Ok(summary.is_success() && report.is_clean())
}

/// Write `bytes` to `dir/name`, or to `dir/stem (n).ext` when that path
/// exists. Existing files, inputs included, are never overwritten.
fn write_new(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf> {
    let (stem, ext) = name.rsplit_once('.').unwrap_or((name, ""));
    let mut candidate = dir.join(name);
    let mut n = 1;
    loop {
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(mut file) => {
                file.write_all(bytes)
                    .with_context(|| format!("Failed to write {}", candidate.display()))?;
                return Ok(candidate);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                n += 1;
                candidate = dir.join(if ext.is_empty() {
                    format!("{} ({})", stem, n)
                } else {
                    format!("{} ({}).{}", stem, n, ext)
                });
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to create {}", candidate.display()));
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROBE
// ═══════════════════════════════════════════════════════════════════════════════

fn probe(files: &[PathBuf]) -> Result<bool> {
    let mut all_ok = true;

    for path in files {
        let source = read_source(path)?;
        let hint = MediaHint::new(&source.name, &source.mime_type);
        match AudioDecoder::probe(source.data.clone(), &hint) {
            Ok(info) => {
                println!(
                    "{}: {}, {} Hz, {} ch, {} kbps, {} bytes",
                    source.name,
                    info.duration_str(),
                    info.sample_rate.map(|r| r.to_string()).unwrap_or_else(|| "?".into()),
                    info.channels.map(|c| c.to_string()).unwrap_or_else(|| "?".into()),
                    info.bitrate_estimate
                        .map(|b| (b / 1000).to_string())
                        .unwrap_or_else(|| "?".into()),
                    info.size_bytes
                );
            }
            Err(e) => {
                all_ok = false;
                eprintln!("{}: {}", source.name, e);
            }
        }
    }

    Ok(all_ok)
}
