use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use vigrep::{FileOutcome, RegionCodes, SanityPolicy, ScanConfig, Scanner};

/// Exit code when no file matched
const EXIT_NO_MATCH: u8 = 1;
/// Exit code for errors that stopped the scan
const EXIT_FATAL: u8 = 2;

/// Search the front panel and block diagram text of LabVIEW VI files
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Text to search for (case-sensitive)
    pattern: String,

    /// VI file or directory to scan
    path: PathBuf,

    /// Treat the pattern as a regular expression
    #[arg(short = 'r', long)]
    regex: bool,

    /// Extension of the files to scan, compared case-sensitively
    #[arg(short = 'e', long, default_value = "vi")]
    extension: String,

    /// Identifier substring of front panel blocks
    #[arg(long, default_value = "FPH")]
    front_panel_code: String,

    /// Identifier substring of block diagram blocks
    #[arg(long, default_value = "BDH")]
    block_diagram_code: String,

    /// Text encoding of the VIs (e.g. windows-1252); defaults to the locale
    #[arg(long)]
    encoding: Option<String>,

    /// Count files failing the integrity check as failed instead of searching them
    #[arg(long)]
    strict_sanity: bool,

    /// Do not show a progress bar
    #[arg(long)]
    no_progress: bool,

    /// Print why each failed file could not be parsed
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

impl Cli {
    fn to_config(&self) -> ScanConfig {
        ScanConfig {
            use_regex: self.regex,
            extension: self.extension.clone(),
            region_codes: RegionCodes {
                front_panel: self.front_panel_code.clone(),
                block_diagram: self.block_diagram_code.clone(),
            },
            encoding: self.encoding.clone(),
            sanity_policy: if self.strict_sanity {
                SanityPolicy::Strict
            } else {
                SanityPolicy::Lenient
            },
            show_progress: !self.no_progress,
            log_level: self.log_level.clone(),
            ..ScanConfig::new(self.pattern.clone(), self.path.clone())
        }
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("invalid log level '{}'", level))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    Ok(())
}

fn progress_bar(len: u64, enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let progress = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} files")
    {
        progress.set_style(style.progress_chars("=>-"));
    }
    progress
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = ScanConfig::load_from(cli.config.as_deref())
        .context("failed to load configuration")?
        .merge_with_cli(cli.to_config());
    init_logging(&config.log_level)?;

    let scanner = Scanner::new(&config)?;
    let files = scanner.candidate_files()?;
    let progress = progress_bar(files.len() as u64, config.show_progress);

    let report = scanner.scan_files(&files, |outcome| {
        match outcome {
            FileOutcome::Searched {
                path,
                matched: true,
                ..
            } => progress.suspend(|| println!("{}", path.display().to_string().green())),
            FileOutcome::Failed { path, reason } if cli.verbose => progress.suspend(|| {
                eprintln!("{} {}: {}", "failed:".yellow(), path.display(), reason)
            }),
            _ => {}
        }
        progress.inc(1);
    });
    progress.finish_and_clear();
    let report = report?;

    scanner.metrics().log_stats();
    println!("{}", report.summary());

    Ok(if report.has_matches() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_NO_MATCH)
    })
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}
