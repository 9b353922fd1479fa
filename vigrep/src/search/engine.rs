use ignore::WalkBuilder;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use super::matcher::PatternMatcher;
use super::processor::{ExtractOptions, FileProcessor};
use crate::config::ScanConfig;
use crate::errors::{VigrepError, VigrepResult};
use crate::filters::has_extension;
use crate::metrics::ScanMetrics;
use crate::results::{FileOutcome, ScanReport};

/// Walks a directory tree and runs the extraction pipeline on each VI file,
/// one file at a time in walk order.
#[derive(Debug)]
pub struct Scanner {
    root_path: PathBuf,
    extension: String,
    respect_ignore_files: bool,
    processor: FileProcessor,
    cancel: Arc<AtomicBool>,
}

impl Scanner {
    /// Builds a scanner from `config`. Fails on an invalid pattern or an
    /// unknown encoding label.
    pub fn new(config: &ScanConfig) -> VigrepResult<Self> {
        let matcher = PatternMatcher::new(&config.pattern, config.use_regex)?;
        let options = ExtractOptions::from_config(config)?;
        debug!(
            "Decoding text as {}, sanity policy {:?}",
            options.encoding.name(),
            options.sanity_policy
        );
        Ok(Self {
            root_path: config.root_path.clone(),
            extension: config.extension.clone(),
            respect_ignore_files: config.respect_ignore_files,
            processor: FileProcessor::new(options, matcher).quiet(config.quiet_decoder),
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Shares a cancellation flag with the caller. Setting it stops the scan
    /// before the next file.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn metrics(&self) -> &ScanMetrics {
        self.processor.metrics()
    }

    /// Lists the files to scan in sorted walk order. A root that is not a
    /// directory is scanned as is, whatever its extension.
    pub fn candidate_files(&self) -> VigrepResult<Vec<PathBuf>> {
        if !self.root_path.exists() {
            return Err(VigrepError::file_not_found(&self.root_path));
        }
        if !self.root_path.is_dir() {
            return Ok(vec![self.root_path.clone()]);
        }

        let mut walker = WalkBuilder::new(&self.root_path);
        walker
            .hidden(self.respect_ignore_files)
            .ignore(self.respect_ignore_files)
            .git_ignore(self.respect_ignore_files)
            .git_global(self.respect_ignore_files)
            .git_exclude(self.respect_ignore_files)
            .parents(self.respect_ignore_files)
            .sort_by_file_name(|a, b| a.cmp(b));

        let files: Vec<PathBuf> = walker
            .build()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!("Skipping unreadable entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .filter(|entry| has_extension(entry.path(), &self.extension))
            .map(|entry| entry.into_path())
            .collect();

        debug!("Found {} files to process", files.len());
        Ok(files)
    }

    /// Processes `files` in order, handing each outcome to `on_outcome` as
    /// soon as it is known.
    ///
    /// Returns [`VigrepError::Interrupted`] if the cancellation flag is set
    /// between two files; the interrupted scan yields no report.
    pub fn scan_files<F>(&self, files: &[PathBuf], mut on_outcome: F) -> VigrepResult<ScanReport>
    where
        F: FnMut(&FileOutcome),
    {
        let mut report = ScanReport::new();
        for path in files {
            if self.cancel.load(Ordering::SeqCst) {
                info!(
                    "Scan interrupted after {} of {} files",
                    report.files_scanned,
                    files.len()
                );
                return Err(VigrepError::Interrupted);
            }
            let outcome = self.processor.process_file(path);
            on_outcome(&outcome);
            report.add_outcome(outcome);
        }
        Ok(report)
    }

    /// Walks the root and scans every candidate file
    pub fn run<F>(&self, on_outcome: F) -> VigrepResult<ScanReport>
    where
        F: FnMut(&FileOutcome),
    {
        info!(
            "Scanning {} for {:?}",
            self.root_path.display(),
            self.processor.options().region_codes
        );
        let files = self.candidate_files()?;
        let report = self.scan_files(&files, on_outcome)?;

        self.metrics().log_stats();
        info!(
            "Scan complete. {} of {} files matched, {} failed to parse",
            report.matches.len(),
            report.files_scanned,
            report.failed_count()
        );
        Ok(report)
    }
}

/// Scans the tree described by `config` and returns the report
pub fn scan(config: &ScanConfig) -> VigrepResult<ScanReport> {
    Scanner::new(config)?.run(|_| {})
}
