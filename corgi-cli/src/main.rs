//! Corgi CLI Application
//!
//! Command-line front end for the corgi-decoder library:
//! - `corgi decode <vin>` with text or JSON output
//! - Optional TOML config for dataset location and default options
//!
//! A decode that completes exits 0 even when the VIN is invalid; dataset
//! and download failures exit non-zero.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use corgi_decoder::{create_decoder, DecodeOptions};
use std::path::PathBuf;

mod config;
mod output;

use config::{AppConfig, OutputFormat};

/// Corgi - Offline VIN decoder
#[derive(Parser, Debug)]
#[command(name = "corgi")]
#[command(about = "Decode Vehicle Identification Numbers against a local vPIC dataset", long_about = None)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (corgi.toml)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all log output except errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a single VIN
    Decode(DecodeArgs),
}

#[derive(clap::Args, Debug)]
struct DecodeArgs {
    /// 17-character VIN
    vin: String,

    /// Include every matched pattern rule
    #[arg(long)]
    patterns: bool,

    /// Override the model year
    #[arg(long, value_name = "YEAR")]
    year: Option<u16>,

    /// Output format (default: text, or the config file's choice)
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Dataset file path, URL, or `edge:` token
    #[arg(long, value_name = "PATH")]
    database: Option<String>,

    /// Ignore any cached dataset and prepare a fresh one
    #[arg(long)]
    force_fresh: bool,

    /// Withhold fields scoring below this confidence (0-1)
    #[arg(long, value_name = "SCORE")]
    threshold: Option<f64>,

    /// Attach decode diagnostics to the metadata
    #[arg(long)]
    diagnostics: bool,

    /// Attach pre-normalization values to the metadata
    #[arg(long)]
    raw: bool,

    /// Treat a check-digit mismatch as invalidating
    #[arg(long)]
    strict: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    log::info!("Corgi CLI v{}", env!("CARGO_PKG_VERSION"));
    log::debug!("Using decoder library v{}", corgi_decoder::VERSION);

    let app_config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };

    match &args.command {
        Command::Decode(decode) => decode_command(&app_config, decode).await,
    }
}

async fn decode_command(app_config: &AppConfig, args: &DecodeArgs) -> Result<()> {
    let mut decoder_config = app_config.decoder_config();
    if let Some(database) = &args.database {
        decoder_config = decoder_config.with_database_path(database.clone());
    }
    if args.force_fresh {
        decoder_config = decoder_config.with_force_fresh(true);
    }

    let options = decode_options(app_config.decode.clone(), args);
    options.validate().context("Invalid decode options")?;

    let decoder = create_decoder(decoder_config)
        .await
        .context("Failed to prepare the VIN dataset")?;
    log::info!("Dataset backend: {}", decoder.backend());

    let result = decoder
        .decode_with(&args.vin, &options)
        .await
        .with_context(|| format!("Failed to decode {}", args.vin))?;

    if !result.valid {
        log::warn!("{} is not a valid VIN ({} problem(s))", result.vin, result.errors.len());
    }

    let format = args.format.unwrap_or(app_config.output.format);
    println!("{}", output::render(&result, format, app_config.output.pretty)?);

    decoder.close().await.context("Failed to close decoder")?;
    Ok(())
}

/// Merge command-line flags over the configured defaults
fn decode_options(mut options: DecodeOptions, args: &DecodeArgs) -> DecodeOptions {
    if let Some(year) = args.year {
        options = options.with_model_year(year);
    }
    if let Some(threshold) = args.threshold {
        options = options.with_confidence_threshold(threshold);
    }
    options.include_pattern_details |= args.patterns;
    options.include_diagnostics |= args.diagnostics;
    options.include_raw_data |= args.raw;
    options.strict_check_digit |= args.strict;
    options
}

fn init_logging(verbose: u8, quiet: bool) {
    use std::io::Write;

    let level = if quiet {
        log::LevelFilter::Error
    } else {
        match verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };

    env_logger::Builder::new()
        .filter_level(level)
        .format(|buf, record| writeln!(buf, "[{} {}] {}", record.level(), record.target(), record.args()))
        .init();
}
