//! Bustup CLI - Command-line tool for decoding bup character sprites.
//!
//! This is the main entry point for the bustup command-line application.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use walkdir::WalkDir;

use bustup::bup::{write_composited, write_layers};
use bustup::prelude::*;

/// Bustup - layered bup sprite decoder
#[derive(Parser)]
#[command(name = "bustup")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a single bup file to PNG images
    Convert {
        /// Input bup file
        #[arg(short, long, env = "BUSTUP_INPUT")]
        input: PathBuf,

        /// Output directory
        #[arg(short, long, env = "BUSTUP_OUTPUT")]
        output: PathBuf,

        #[command(flatten)]
        decode: DecodeArgs,
    },

    /// Decode every bup file below a directory
    Batch {
        /// Input directory
        #[arg(short, long, env = "BUSTUP_INPUT")]
        input: PathBuf,

        /// Output directory (the input folder structure is kept)
        #[arg(short, long, env = "BUSTUP_OUTPUT")]
        output: PathBuf,

        /// Filter pattern for relative paths (glob-style)
        #[arg(short, long)]
        filter: Option<String>,

        #[command(flatten)]
        decode: DecodeArgs,
    },

    /// Show the header, tables and per-chunk outcomes of a bup file
    Inspect {
        /// Input bup file
        #[arg(short, long, env = "BUSTUP_INPUT")]
        input: PathBuf,

        /// Force a layout: auto, ps3 or switch
        #[arg(long, env = "BUSTUP_VARIANT", default_value = "auto")]
        variant: String,

        /// List byte ranges the decoder did not consume
        #[arg(long)]
        coverage: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Decoding options shared by `convert` and `batch`.
#[derive(Args, Clone)]
struct DecodeArgs {
    /// Force a layout: auto, ps3 or switch
    #[arg(long, env = "BUSTUP_VARIANT", default_value = "auto")]
    variant: String,

    /// Transparency repair: none, border-purity or blackness-ratio
    #[arg(long, env = "BUSTUP_REPAIR", default_value = "none")]
    repair: RepairPolicy,

    /// Output mode: composited or parts
    #[arg(long, env = "BUSTUP_MODE", default_value = "composited")]
    mode: OutputMode,

    /// Also write the composited base as <stem>_base.png
    #[arg(long)]
    write_base: bool,

    /// Write every decoded chunk to this directory
    #[arg(long, env = "BUSTUP_DEBUG_IMAGES")]
    debug_images: Option<PathBuf>,

    /// Maximum blocks in one filler run
    #[arg(long, default_value_t = bustup::bup::decoder::DEFAULT_MAX_FILLER_BLOCKS)]
    max_filler_blocks: usize,

    /// Filler-skip retries after a decompression failure
    #[arg(long, default_value_t = bustup::bup::decoder::DEFAULT_MAX_CODEC_RETRIES)]
    max_codec_retries: u32,
}

impl DecodeArgs {
    fn options(&self) -> Result<DecodeOptions> {
        Ok(DecodeOptions {
            variant: parse_variant(&self.variant)?,
            repair: self.repair,
            max_filler_blocks: self.max_filler_blocks,
            max_codec_retries: self.max_codec_retries,
            track_coverage: false,
            keep_layers: self.mode.requires_layers() || self.debug_images.is_some(),
        })
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::init_from_env(env_logger::Env::default().default_filter_or(level));

    match cli.command {
        Commands::Convert {
            input,
            output,
            decode,
        } => {
            cmd_convert(&input, &output, &decode)?;
        }
        Commands::Batch {
            input,
            output,
            filter,
            decode,
        } => {
            cmd_batch(&input, &output, filter.as_deref(), &decode)?;
        }
        Commands::Inspect {
            input,
            variant,
            coverage,
            json,
        } => {
            cmd_inspect(&input, &variant, coverage, json)?;
        }
    }

    Ok(())
}

fn cmd_convert(input: &Path, output: &Path, args: &DecodeArgs) -> Result<()> {
    println!("Decoding: {} -> {}", input.display(), output.display());

    let start = Instant::now();
    let decoder = BupDecoder::new(args.options()?);
    let written = convert_file(&decoder, input, output, args)?;

    println!("Wrote {} files in {:?}", written, start.elapsed());

    Ok(())
}

fn cmd_batch(input: &Path, output: &Path, filter: Option<&str>, args: &DecodeArgs) -> Result<()> {
    let pattern = filter
        .map(glob::Pattern::new)
        .transpose()
        .context("Invalid filter pattern")?;

    println!("Scanning: {}", input.display());

    let files: Vec<PathBuf> = WalkDir::new(input)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_bup(p))
        .filter(|p| {
            let relative = p.strip_prefix(input).unwrap_or(p);
            pattern
                .as_ref()
                .map_or(true, |pat| pat.matches_path(relative))
        })
        .collect();

    println!("Decoding {} files...", files.len());

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );

    fs::create_dir_all(output)?;

    let decoder = BupDecoder::new(args.options()?);
    let start = Instant::now();
    let written = AtomicUsize::new(0);
    let errors = Mutex::new(Vec::new());

    files.par_iter().for_each(|path| {
        let relative = path.strip_prefix(input).unwrap_or(path);
        let out_dir = match relative.parent() {
            Some(parent) => output.join(parent),
            None => output.to_path_buf(),
        };

        match convert_file(&decoder, path, &out_dir, args) {
            Ok(count) => {
                log::debug!("{}: {} files", relative.display(), count);
                written.fetch_add(count, Ordering::Relaxed);
            }
            Err(e) => {
                pb.suspend(|| eprintln!("Error decoding {}: {:#}", relative.display(), e));
                if let Ok(mut errors) = errors.lock() {
                    errors.push(relative.to_path_buf());
                }
            }
        }

        pb.inc(1);
    });

    pb.finish_with_message("Done");

    let errors = errors.into_inner().unwrap_or_default();
    println!(
        "Decoded {} files in {:?} ({} images, {} errors)",
        files.len() - errors.len(),
        start.elapsed(),
        written.load(Ordering::Relaxed),
        errors.len()
    );
    for path in &errors {
        println!("  failed: {}", path.display());
    }

    Ok(())
}

fn cmd_inspect(input: &Path, variant: &str, coverage: bool, json: bool) -> Result<()> {
    let data = fs::read(input).context("Failed to read input file")?;
    let options = DecodeOptions {
        variant: parse_variant(variant)?,
        track_coverage: coverage,
        ..Default::default()
    };
    let container = BupDecoder::new(options)
        .decode(&data)
        .context("Failed to decode bup file")?;

    if json {
        let gaps = container.gaps();
        let value = serde_json::json!({
            "header": &container.header,
            "expressions": &container.expressions,
            "chunks": &container.report.chunks,
            "gaps": gaps,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let header = &container.header;
    println!("File:        {} ({} bytes)", input.display(), data.len());
    println!("Layout:      {}", header.variant);
    if let Some(version) = header.version {
        println!("Version:     {}", version);
    }
    println!("Size field:  {}", header.size);
    println!("Canvas:      {}x{}", header.width, header.height);
    println!("Expr canvas: {}x{}", header.expr_width, header.expr_height);
    println!("Skip table:  {} entries", header.skip_count);
    println!("Base chunks: {}", header.base_chunk_count);
    println!("Expressions: {}", header.expression_count);

    println!("\nExpressions:");
    for entry in &container.expressions {
        let mouths: Vec<String> = entry
            .present_mouths()
            .map(|(slot, m)| format!("{}@{:#x}", slot, m.offset))
            .collect();
        println!(
            "  [{:>3}] {:<20} face {:#x}  mouths [{}]",
            entry.index,
            entry.name,
            entry.face.offset,
            mouths.join(", ")
        );
    }

    println!("\nChunks:");
    for chunk in &container.report.chunks {
        let status = match &chunk.outcome {
            ChunkOutcome::Drawn => "drawn".to_string(),
            ChunkOutcome::Absent => "absent".to_string(),
            ChunkOutcome::Failed { message } => format!("FAILED: {}", message),
        };
        println!("  {:#010x}  {:<28} {}", chunk.offset, chunk.role.to_string(), status);
    }

    if let Some(gaps) = container.gaps() {
        let unexplained: usize = gaps.iter().map(|g| g.length).sum();
        println!("\nUnconsumed regions ({} bytes):", unexplained);
        for gap in &gaps {
            println!("  {:#010x}..{:#010x} ({} bytes)", gap.offset, gap.end(), gap.length);
        }
    }

    Ok(())
}

/// Decode one file and write its images; returns the number of files written.
fn convert_file(decoder: &BupDecoder, input: &Path, output: &Path, args: &DecodeArgs) -> Result<usize> {
    let data = fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let container = decoder
        .decode(&data)
        .with_context(|| format!("Failed to decode {}", input.display()))?;

    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("bup");

    let mut written = match args.mode {
        OutputMode::Composited => write_composited(&container, output, stem, args.write_base)?,
        mode => {
            let mut written = mode.write(&container, output, stem)?;
            if args.write_base {
                let path = output.join(format!("{}_base.png", stem));
                container.base.save_png(&path)?;
                written.push(path);
            }
            written
        }
    };

    if let Some(dir) = &args.debug_images {
        written.extend(write_layers(&container, dir, stem)?);
    }

    Ok(written.len())
}

fn parse_variant(value: &str) -> Result<Option<FormatVariant>> {
    if value.eq_ignore_ascii_case("auto") {
        return Ok(None);
    }
    value
        .parse::<FormatVariant>()
        .map(Some)
        .map_err(anyhow::Error::msg)
}

fn is_bup(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("bup"))
}
