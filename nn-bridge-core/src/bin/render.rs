//! Offline renderer: pushes a WAV file through an `NnProcessor` block by
//! block, exactly as a host callback would, and writes the result.
//!
//! Uses the gain-only `StubBackend`, so the output is the input scaled by
//! `--gain` and delayed by the scheduling latency of the chosen mode.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use nn_bridge_core::{host, BackendHandle, NnProcessor, ProcessorConfig, StubBackend};
use tracing::info;

/// Used when `RUST_LOG` is unset: library and renderer at `info`.
const DEFAULT_LOG_FILTER: &str = "nn_bridge_core=info,render=info";

#[derive(Debug)]
struct Args {
    input: PathBuf,
    output: PathBuf,
    config: Option<PathBuf>,
    buffer_size: Option<usize>,
    block_size: Option<usize>,
    gain: f32,
    sync: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut input: Option<PathBuf> = None;
    let mut output: Option<PathBuf> = None;
    let mut config: Option<PathBuf> = None;
    let mut buffer_size: Option<usize> = None;
    let mut block_size: Option<usize> = None;
    let mut gain = 1.0f32;
    let mut sync = false;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--input" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --input");
                };
                input = Some(PathBuf::from(v));
            }
            "--output" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --output");
                };
                output = Some(PathBuf::from(v));
            }
            "--config" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --config");
                };
                config = Some(PathBuf::from(v));
            }
            "--buffer-size" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --buffer-size");
                };
                buffer_size = Some(v.parse().context("invalid value for --buffer-size")?);
            }
            "--block-size" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --block-size");
                };
                let n: usize = v.parse().context("invalid value for --block-size")?;
                if n == 0 {
                    bail!("--block-size must be positive");
                }
                block_size = Some(n);
            }
            "--gain" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --gain");
                };
                gain = v.parse().context("invalid value for --gain")?;
            }
            "--sync" => sync = true,
            "--help" | "-h" => {
                println!(
                    "Usage: render --input <in.wav> --output <out.wav> [--config <file.json>] \\
  [--buffer-size <n>] [--block-size <n>] [--gain <g>] [--sync]"
                );
                std::process::exit(0);
            }
            other => bail!("unknown argument: {other}"),
        }
    }

    let Some(input) = input else {
        bail!("--input is required");
    };
    let Some(output) = output else {
        bail!("--output is required");
    };

    Ok(Args {
        input,
        output,
        config,
        buffer_size,
        block_size,
        gain,
        sync,
    })
}

fn read_mono(path: &Path) -> anyhow::Result<(Vec<f32>, hound::WavSpec)> {
    let mut reader =
        hound::WavReader::open(path).with_context(|| format!("opening {}", path.display()))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    // Channel 0 only.
    let mono = interleaved.iter().step_by(channels).copied().collect();
    Ok((mono, spec))
}

fn run() -> anyhow::Result<()> {
    let args = parse_args()?;
    host::setup();

    let mut config = match &args.config {
        Some(path) => ProcessorConfig::load(path)?,
        None => ProcessorConfig::default(),
    };
    if let Some(n) = args.buffer_size {
        config.buffer_size = n;
    }
    if let Some(n) = args.block_size {
        config.block_size = n;
    }
    if args.sync {
        config.buffer_size = 0;
    }
    let block_size = config.block_size.max(1);

    let (input, spec) = read_mono(&args.input)?;
    info!(
        samples = input.len(),
        sample_rate = spec.sample_rate,
        "input loaded"
    );

    let backend = BackendHandle::new(StubBackend::loaded().with_gain(args.gain));
    let mut processor = NnProcessor::new(config, backend)?;
    processor.prepare(block_size)?;

    let latency = if processor.negotiated().use_background {
        (2 * processor.negotiated().buffer_size).saturating_sub(block_size)
    } else {
        processor.negotiated().buffer_size.saturating_sub(block_size)
    };

    // Pad so the delayed tail makes it out.
    let total = (input.len() + latency).div_ceil(block_size) * block_size;
    let mut padded = input;
    padded.resize(total, 0.0);
    let mut rendered = vec![0.0f32; total];

    let start = Instant::now();
    for (inp, out) in padded
        .chunks(block_size)
        .zip(rendered.chunks_mut(block_size))
    {
        processor.perform(&[inp], &mut [out]);
    }
    let elapsed = start.elapsed();

    let out_spec = hound::WavSpec {
        channels: 1,
        sample_rate: spec.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&args.output, out_spec)
        .with_context(|| format!("creating {}", args.output.display()))?;
    for sample in &rendered {
        writer.write_sample(*sample)?;
    }
    writer.finalize()?;

    let snapshot = processor.diagnostics_snapshot();
    info!(
        latency_samples = latency,
        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
        "render complete"
    );
    println!(
        "{}",
        serde_json::json!({
            "negotiated": processor.negotiated(),
            "latencySamples": latency,
            "diagnostics": snapshot,
        })
    );
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)
            }),
        )
        .init();

    if let Err(e) = run() {
        eprintln!("render failed: {e:#}");
        std::process::exit(1);
    }
}
