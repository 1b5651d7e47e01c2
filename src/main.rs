//! `clap`-based CLI for the QTC codec (spec.md §6.3).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use qtc::{DecodeOptions, EncodeOptions, QtcError};

/// Converts grayscale images between PGM and the quadtree-based QTC
/// compressed format.
#[derive(Parser, Debug)]
#[command(
    name = "qtc",
    version = env!("CARGO_PKG_VERSION"),
    author = "vkcz",
    group(clap::ArgGroup::new("mode").args(["encode", "decode"]).required(true))
)]
struct Cli {
    /// Encode a PGM image into QTC.
    #[arg(short = 'c', long = "encode")]
    encode: bool,

    /// Decode a QTC file back into PGM.
    #[arg(short = 'u', long = "decode")]
    decode: bool,

    /// Path to the input file.
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    input: PathBuf,

    /// Path to the output file; defaults to QTC/out.qtc (encode) or
    /// PGM/out.pgm (decode).
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,

    /// Lossy filter strength in [0.0, 2.0]; 0 disables filtering
    /// (--encode only).
    #[arg(
        short = 'a',
        long = "alpha",
        value_name = "N",
        default_value_t = 0.0,
        value_parser = parse_alpha
    )]
    alpha: f64,

    /// Also render and write the segmentation grid alongside the output.
    #[arg(short = 'g', long = "grid")]
    grid: bool,

    /// Enable verbose (debug-level) logging.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

/// Rejects alpha values outside `[0.0, 2.0]` at parse time, matching
/// `handle_a_option`'s range check (spec.md §6.3) instead of letting an
/// out-of-range value reach `encode_file`.
fn parse_alpha(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|_| format!("not a float: {}", s))?;
    if (0.0..=2.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("alpha must be in [0.0, 2.0], got {}", value))
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), QtcError> {
    if cli.encode {
        let output = cli.output.clone().unwrap_or_else(|| PathBuf::from("QTC/out.qtc"));
        check_extensions(&cli.input, "pgm", &output, "qtc")?;
        let opts = EncodeOptions {
            alpha: cli.alpha,
            write_grid: cli.grid,
        };
        qtc::encode_file(&cli.input, &output, &opts)?;
    } else {
        let output = cli.output.clone().unwrap_or_else(|| PathBuf::from("PGM/out.pgm"));
        check_extensions(&cli.input, "qtc", &output, "pgm")?;
        let opts = DecodeOptions {
            write_grid: cli.grid,
        };
        qtc::decode_file(&cli.input, &output, &opts)?;
    }
    Ok(())
}

fn check_extensions(
    input: &PathBuf,
    want_input: &str,
    output: &PathBuf,
    want_output: &str,
) -> Result<(), QtcError> {
    let has_ext = |p: &PathBuf, want: &str| {
        p.extension().map(|e| e.eq_ignore_ascii_case(want)).unwrap_or(false)
    };
    if has_ext(input, want_input) && has_ext(output, want_output) {
        Ok(())
    } else {
        Err(QtcError::WrongExtension {
            input: input.display().to_string(),
            output: output.display().to_string(),
        })
    }
}
