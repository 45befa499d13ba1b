mod cli;

use voicetrim::{
    config, probe, trim_async, ProgressSender, TimeRange, TrimOptions, TrimRequest, Trimmer,
};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;
use tokio_util::sync::CancellationToken;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "voicetrim=trace,voicetrim_media=trace".to_string()
        } else {
            "voicetrim=info,voicetrim_media=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Trim {
            input,
            start_ms,
            end_ms,
            dry_run,
        } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let range = TimeRange::new(start_ms, end_ms)?;
            let request = TrimRequest::new(input, range);
            let trimmer = Trimmer::new(TrimOptions::from(&config)).with_progress(
                ProgressSender::new(|samples, pts_us| {
                    tracing::trace!(samples, pts_us, "sample copied");
                }),
            );

            if dry_run {
                return plan_trim(&trimmer, &request);
            }

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_trim(trimmer, request))
        }
        Commands::Probe { file, json } => probe_file(&file, json),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("voicetrim {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn run_trim(trimmer: Trimmer, request: TrimRequest) -> Result<()> {
    let cancel = CancellationToken::new();

    // Ctrl-C stops the trim; it still cleans up its staging file
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling trim");
            on_interrupt.cancel();
        }
    });

    let input = request.input.clone();
    let report = trim_async(trimmer, request, cancel)
        .await
        .with_context(|| format!("trim failed: {}", input.display()))?;

    println!("Trimmed: {}", report.path.display());
    println!("Samples: {}", report.samples_written);
    println!("Bytes: {}", report.bytes_written);
    println!("Duration: {}", format_us(report.output_duration_us));
    if let (Some(first), Some(last)) = (report.first_pts_us, report.last_pts_us) {
        println!("Source span: {} - {}", format_us(first), format_us(last));
    }

    Ok(())
}

fn plan_trim(trimmer: &Trimmer, request: &TrimRequest) -> Result<()> {
    let plan = trimmer
        .plan(request)
        .with_context(|| format!("cannot plan trim of {}", request.input.display()))?;

    println!("File: {}", request.input.display());
    println!("Range: {}", request.range);
    println!(
        "Source: {} samples, {}",
        plan.source_samples,
        format_us(plan.source_duration_us)
    );
    match (plan.first_pts_us, plan.last_pts_us) {
        (Some(first), Some(last)) => {
            println!("Would keep {} samples ({} bytes)", plan.samples, plan.bytes);
            println!("  from {} to {}", format_us(first), format_us(last));
        }
        _ => println!("Would keep no samples (range starts past the end)"),
    }
    println!("\n[DRY RUN] File not modified");

    Ok(())
}

fn probe_file(file: &Path, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let report = probe::probe_file(file)?;

    if json {
        let json_str = serde_json::to_string_pretty(&report)?;
        println!("{}", json_str);
    } else {
        println!("File: {}", report.path.display());
        println!("Size: {} bytes", report.file_size);
        println!("Duration: {}", format_us(report.duration_us));
        println!("Layout: {}", if report.faststart { "faststart" } else { "moov at end" });

        println!("\nTracks: {}", report.tracks.len());
        for track in &report.tracks {
            print!("  [{}] {}", track.index, track.mime.as_deref().unwrap_or("unknown"));
            if let Some(rate) = track.sample_rate {
                print!(" {} Hz", rate);
            }
            if let Some(channels) = track.channels {
                print!(" {}ch", channels);
            }
            print!(", {} samples", track.sample_count);
            if track.index == report.selected_track {
                print!(" [selected]");
            }
            println!();
        }
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let path = path.map(Path::to_path_buf).or_else(config::find_default_config);
    let config = match &path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file found, using defaults");
            config::Config::default()
        }
    };

    println!("  Initial buffer: {} bytes", config.trim.initial_buffer_bytes);
    println!("  Max sample size: {} bytes", config.trim.max_sample_bytes);
    println!("  fsync before swap: {}", config.trim.fsync);
    println!("  Samples per chunk: {}", config.writer.samples_per_chunk);

    Ok(())
}

fn format_us(us: i64) -> String {
    let ms = us / 1000;
    let secs = ms / 1000;
    format!("{:02}:{:02}.{:03}", secs / 60, secs % 60, ms % 1000)
}
