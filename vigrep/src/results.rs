/// Per-file outcomes and the report of a whole scan.
///
/// Every scanned file produces exactly one [`FileOutcome`]. A file that could
/// not be parsed is not an error for the scan: it is counted, its reason is
/// kept, and the scan moves on. [`ScanReport`] aggregates the outcomes in
/// walk order.
use std::fmt;
use std::path::PathBuf;

use crate::errors::VigrepError;

/// Result of running the pipeline on one file
#[derive(Debug)]
pub enum FileOutcome {
    /// Text was extracted and searched
    Searched {
        path: PathBuf,
        matched: bool,
        /// Section, text and sanity problems that did not stop the file
        warnings: Vec<VigrepError>,
    },
    /// The file could not be parsed
    Failed { path: PathBuf, reason: VigrepError },
}

impl FileOutcome {
    pub fn path(&self) -> &PathBuf {
        match self {
            FileOutcome::Searched { path, .. } | FileOutcome::Failed { path, .. } => path,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, FileOutcome::Searched { matched: true, .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, FileOutcome::Failed { .. })
    }
}

/// A file that failed to parse and why
#[derive(Debug)]
pub struct FileFailure {
    pub path: PathBuf,
    pub reason: VigrepError,
}

impl fmt::Display for FileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.reason)
    }
}

/// The complete result of a scan
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Matching files in walk order
    pub matches: Vec<PathBuf>,
    /// Files that failed to parse, in walk order
    pub failures: Vec<FileFailure>,
    /// Total number of candidate files processed
    pub files_scanned: usize,
    /// Number of non-fatal warnings across all searched files
    pub warnings: usize,
}

impl ScanReport {
    /// Creates a new empty report
    pub fn new() -> Self {
        Default::default()
    }

    /// Records the outcome of one file
    pub fn add_outcome(&mut self, outcome: FileOutcome) {
        self.files_scanned += 1;
        match outcome {
            FileOutcome::Searched {
                path,
                matched,
                warnings,
            } => {
                self.warnings += warnings.len();
                if matched {
                    self.matches.push(path);
                }
            }
            FileOutcome::Failed { path, reason } => {
                self.failures.push(FileFailure { path, reason });
            }
        }
    }

    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    pub fn has_matches(&self) -> bool {
        !self.matches.is_empty()
    }

    /// The closing summary line, e.g. `failed to parse: 2 out of 40`
    pub fn summary(&self) -> String {
        format!(
            "failed to parse: {} out of {}",
            self.failed_count(),
            self.files_scanned
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts() {
        let mut report = ScanReport::new();
        report.add_outcome(FileOutcome::Searched {
            path: PathBuf::from("a.vi"),
            matched: true,
            warnings: vec![VigrepError::sanity("open scope")],
        });
        report.add_outcome(FileOutcome::Failed {
            path: PathBuf::from("b.vi"),
            reason: VigrepError::malformed("bad signature"),
        });
        report.add_outcome(FileOutcome::Searched {
            path: PathBuf::from("c.vi"),
            matched: false,
            warnings: vec![],
        });

        assert_eq!(report.files_scanned, 3);
        assert_eq!(report.matches, vec![PathBuf::from("a.vi")]);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.warnings, 1);
        assert!(report.has_matches());
        assert_eq!(report.summary(), "failed to parse: 1 out of 3");
        assert_eq!(
            report.failures[0].to_string(),
            "b.vi: Malformed container: bad signature"
        );
    }

    #[test]
    fn test_empty_report() {
        let report = ScanReport::new();
        assert!(!report.has_matches());
        assert_eq!(report.summary(), "failed to parse: 0 out of 0");
    }

    #[test]
    fn test_outcome_accessors() {
        let outcome = FileOutcome::Failed {
            path: PathBuf::from("x.vi"),
            reason: VigrepError::Interrupted,
        };
        assert!(outcome.is_failed());
        assert!(!outcome.is_match());
        assert_eq!(outcome.path(), &PathBuf::from("x.vi"));
    }
}
