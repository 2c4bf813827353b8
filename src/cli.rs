// Command-line front end for ipsa.
//
// Options mirror the classic ipsa flags (-p/-f/-o/-x/-t) and are global, so
// they may appear before or after the subcommand.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Parser, Subcommand, ValueHint};

use crate::io::{self as ipsio, ApplyStats, STDIO_PATH, is_stdio};
use crate::ips::{MAX_HUNK_LEN, MAX_HUNK_OFFSET, PatchOptions, PatchSummary};

const BUF_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// IPS patcher utility.
#[derive(Parser, Debug)]
#[command(
    name = "ipsa",
    version,
    about = "ipsa - IPS patcher utility",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Patch file (`-` for stdin).
    #[arg(short = 'p', long = "patch-path", global = true, value_hint = ValueHint::FilePath)]
    patch_path: Option<PathBuf>,

    /// Patient file the patch is applied to.
    #[arg(short = 'f', long = "patient-path", global = true, value_hint = ValueHint::FilePath)]
    patient_path: Option<PathBuf>,

    /// Output file.
    #[arg(short = 'o', long = "output-path", global = true, value_hint = ValueHint::FilePath)]
    output_path: Option<PathBuf>,

    /// Hunk listing destination (`-` for stdout).
    #[arg(short = 'x', long = "text-path", global = true, value_hint = ValueHint::FilePath)]
    text_path: Option<PathBuf>,

    /// Honor the truncation length following the EOF marker.
    #[arg(short = 't', long = "post-trunc", global = true)]
    post_trunc: bool,

    /// Overwrite an existing output file.
    #[arg(long, global = true)]
    force: bool,

    /// Quiet mode (errors only).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output stats as JSON to stderr.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Apply a patch to a copy of the patient file.
    Apply,
    /// Print a listing of the hunks in a patch.
    Text,
    /// Print build/configuration details.
    Config,
}

// ---------------------------------------------------------------------------
// Resolved command + options (flattened from Cli)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Apply,
    Text,
    Config,
}

#[derive(Debug)]
struct Options {
    command: Command,
    patch_file: Option<PathBuf>,
    patient_file: Option<PathBuf>,
    output_file: Option<PathBuf>,
    text_file: Option<PathBuf>,
    truncate: bool,
    force: bool,
    quiet: bool,
    verbose: u8,
    json_output: bool,
}

impl Options {
    fn patch_options(&self) -> PatchOptions {
        PatchOptions {
            truncate: self.truncate,
        }
    }

    fn log_filter(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "error",
            (false, 0) => "warn",
            (false, 1) => "info",
            _ => "debug",
        }
    }
}

fn resolve_options(cli: Cli) -> Options {
    let command = match cli.command {
        Cmd::Apply => Command::Apply,
        Cmd::Text => Command::Text,
        Cmd::Config => Command::Config,
    };
    Options {
        command,
        patch_file: cli.patch_path,
        patient_file: cli.patient_path,
        output_file: cli.output_path,
        text_file: cli.text_path,
        truncate: cli.post_trunc,
        force: cli.force,
        quiet: cli.quiet,
        verbose: cli.verbose.min(2),
        json_output: cli.json_output,
    }
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("ipsa".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let _ = resolve_options(cli);
    }
}

// ---------------------------------------------------------------------------
// Config command
// ---------------------------------------------------------------------------

fn cmd_config() -> i32 {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!("ipsa version {version} (Rust)");
    eprintln!("Licensed under the GNU General Public License, version 3 or later");

    let file_io = cfg!(feature = "file-io") as u8;
    eprintln!("FILE_IO={file_io}");
    eprintln!("MAX_HUNK_OFFSET={MAX_HUNK_OFFSET:#08x}");
    eprintln!("MAX_HUNK_LEN={MAX_HUNK_LEN:#06x}");

    0
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Open a listing sink: stdout for `-` or no path, else a new file.
fn open_listing(path: Option<&Path>) -> Result<Box<dyn Write>, i32> {
    match path {
        None => Ok(Box::new(BufWriter::with_capacity(
            BUF_SIZE,
            io::stdout().lock(),
        ))),
        Some(p) if is_stdio(p) => Ok(Box::new(BufWriter::with_capacity(
            BUF_SIZE,
            io::stdout().lock(),
        ))),
        Some(p) => match File::create(p) {
            Ok(f) => Ok(Box::new(BufWriter::with_capacity(BUF_SIZE, f))),
            Err(e) => {
                eprintln!("ipsa: error: failed to open text file {}: {e}", p.display());
                Err(1)
            }
        },
    }
}

fn report_summary(command: &str, summary: &PatchSummary, opts: &Options) {
    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "ipsa: {command}: {} hunks ({} regular, {} rle), {} bytes written, {} warnings",
            summary.hunks(),
            summary.regular_hunks,
            summary.rle_hunks,
            summary.bytes_written,
            summary.warnings.len()
        );
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// Apply command
// ---------------------------------------------------------------------------

fn cmd_apply(opts: &Options) -> i32 {
    let Some(patch) = opts.patch_file.as_deref() else {
        eprintln!("ipsa: error: no patch file provided");
        return 1;
    };
    let output = match opts.output_file.as_deref() {
        Some(p) if is_stdio(p) => {
            eprintln!("ipsa: error: apply needs a seekable output file, not {STDIO_PATH}");
            return 1;
        }
        Some(p) => p,
        None => {
            eprintln!("ipsa: error: no output file provided");
            return 1;
        }
    };
    let mut listing = match opts.text_file.as_deref() {
        Some(p) => match open_listing(Some(p)) {
            Ok(w) => Some(w),
            Err(code) => return code,
        },
        None => None,
    };

    let result = ipsio::apply_file(
        patch,
        opts.patient_file.as_deref(),
        output,
        listing.as_deref_mut(),
        opts.patch_options(),
        opts.force,
    );
    let stats: ApplyStats = match result {
        Ok(stats) => stats,
        Err(e @ ipsio::FileError::OutputExists { .. }) => {
            eprintln!("ipsa: error: {e}, use --force to overwrite");
            return 1;
        }
        Err(e) => {
            eprintln!("ipsa: error: {e}");
            return 1;
        }
    };

    report_summary("apply", &stats.summary, opts);
    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "ipsa: apply: patient size: {}, output size: {}",
            stats.patient_size, stats.output_size
        );
        if let Some(sha) = stats.output_sha256 {
            eprintln!("ipsa: apply: output sha256: {}", hex(&sha));
        }
    }

    if opts.json_output {
        let json = serde_json::json!({
            "command": "apply",
            "patient_size": stats.patient_size,
            "patch_size": stats.patch_size,
            "output_size": stats.output_size,
            "regular_hunks": stats.summary.regular_hunks,
            "rle_hunks": stats.summary.rle_hunks,
            "bytes_written": stats.summary.bytes_written,
            "truncated_to": stats.summary.truncated_to,
            "warnings": stats.summary.warnings.len(),
            "output_sha256": stats.output_sha256.map(|s| hex(&s)),
        });
        match serde_json::to_string_pretty(&json) {
            Ok(s) => eprintln!("{s}"),
            Err(e) => {
                eprintln!("ipsa: error: json: {e}");
                return 1;
            }
        }
    }

    0
}

// ---------------------------------------------------------------------------
// Text command
// ---------------------------------------------------------------------------

fn cmd_text(opts: &Options) -> i32 {
    let Some(patch) = opts.patch_file.as_deref() else {
        eprintln!("ipsa: error: no patch file provided");
        return 1;
    };

    let dest = opts.text_file.as_deref().or(opts.output_file.as_deref());
    let mut listing = match open_listing(dest) {
        Ok(w) => w,
        Err(code) => return code,
    };

    let summary = match ipsio::list_file(patch, &mut listing, opts.patch_options()) {
        Ok(summary) => summary,
        Err(e) => {
            // Keep whatever was listed before the failure.
            let _ = listing.flush();
            eprintln!("ipsa: error: {e}");
            return 1;
        }
    };

    report_summary("text", &summary, opts);

    if opts.json_output {
        let json = serde_json::json!({
            "command": "text",
            "regular_hunks": summary.regular_hunks,
            "rle_hunks": summary.rle_hunks,
            "patch_bytes": summary.patch_bytes,
            "truncated_to": summary.truncated_to,
            "warnings": summary.warnings.len(),
        });
        match serde_json::to_string_pretty(&json) {
            Ok(s) => eprintln!("{s}"),
            Err(e) => {
                eprintln!("ipsa: error: json: {e}");
                return 1;
            }
        }
    }

    0
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    let cli = Cli::parse();
    let opts = resolve_options(cli);

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(opts.log_filter()))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let exit_code = match opts.command {
        Command::Apply => cmd_apply(&opts),
        Command::Text => cmd_text(&opts),
        Command::Config => cmd_config(),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
