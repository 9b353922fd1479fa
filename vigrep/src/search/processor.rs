use encoding_rs::Encoding;
use std::io::{Read, Seek};
use std::path::Path;
use tracing::dispatcher::{self, Dispatch};
use tracing::subscriber::NoSubscriber;
use tracing::{debug, trace, warn};

use super::matcher::PatternMatcher;
use crate::config::{RegionCodes, SanityPolicy, ScanConfig};
use crate::container::Container;
use crate::errors::VigrepResult;
use crate::metrics::ScanMetrics;
use crate::results::FileOutcome;
use crate::text::{extract_text, TextExtraction};

/// Settings of the per-file pipeline
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub region_codes: RegionCodes,
    pub encoding: &'static Encoding,
    pub sanity_policy: SanityPolicy,
}

impl ExtractOptions {
    pub fn from_config(config: &ScanConfig) -> VigrepResult<Self> {
        Ok(Self {
            region_codes: config.region_codes.clone(),
            encoding: config.resolve_encoding()?,
            sanity_policy: config.sanity_policy,
        })
    }
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            region_codes: RegionCodes::default(),
            encoding: encoding_rs::UTF_8,
            sanity_policy: SanityPolicy::default(),
        }
    }
}

/// Runs the pipeline on an opened container: load the selected blocks,
/// decode them, check sanity and collect the text. The resource map read by
/// [`Container::open`] is reused as is.
///
/// Section and text decode problems are returned as warnings on the
/// extraction. A failed sanity check is a warning under
/// [`SanityPolicy::Lenient`] and an error under [`SanityPolicy::Strict`].
pub fn extract_from_container<R: Read + Seek>(
    container: &mut Container<R>,
    options: &ExtractOptions,
    metrics: &ScanMetrics,
) -> VigrepResult<TextExtraction> {
    container.load(&options.region_codes, metrics)?;
    let mut warnings = container.decode(metrics);

    if let Err(e) = container.check_sanity() {
        match options.sanity_policy {
            SanityPolicy::Strict => return Err(e),
            SanityPolicy::Lenient => {
                warn!("{}: {}", container.base_name(), e);
                warnings.push(e);
            }
        }
    }

    let mut extraction = extract_text(container.blocks(), options.encoding, metrics);
    warnings.append(&mut extraction.warnings);
    extraction.warnings = warnings;
    Ok(extraction)
}

/// Opens a container stream and runs [`extract_from_container`] on it.
pub fn extract_from_reader<R: Read + Seek>(
    reader: R,
    base_name: &str,
    options: &ExtractOptions,
    metrics: &ScanMetrics,
) -> VigrepResult<TextExtraction> {
    let mut container = Container::open(reader, base_name)?;
    extract_from_container(&mut container, options, metrics)
}

/// Opens `path` and runs [`extract_from_container`] on it. The file is
/// closed before this returns.
pub fn extract_from_path(
    path: &Path,
    options: &ExtractOptions,
    metrics: &ScanMetrics,
) -> VigrepResult<TextExtraction> {
    let mut container = Container::from_path(path)?;
    extract_from_container(&mut container, options, metrics)
}

/// Handles file processing operations
#[derive(Debug)]
pub struct FileProcessor {
    options: ExtractOptions,
    matcher: PatternMatcher,
    metrics: ScanMetrics,
    quiet: bool,
}

impl FileProcessor {
    /// Creates a new FileProcessor with the given pattern matcher
    pub fn new(options: ExtractOptions, matcher: PatternMatcher) -> Self {
        Self {
            options,
            matcher,
            metrics: ScanMetrics::new(),
            quiet: false,
        }
    }

    /// Silences decoder diagnostics while a file is processed
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn with_metrics(mut self, metrics: ScanMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Gets the scan metrics
    pub fn metrics(&self) -> &ScanMetrics {
        &self.metrics
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// Runs `f` with diagnostics routed nowhere when quiet. The previous
    /// dispatcher is back in place when this returns, even on panic.
    fn with_diagnostics<T>(&self, f: impl FnOnce() -> T) -> T {
        if self.quiet {
            dispatcher::with_default(&Dispatch::new(NoSubscriber::default()), f)
        } else {
            f()
        }
    }

    /// Extracts and searches one file. Never fails: parse errors become a
    /// [`FileOutcome::Failed`].
    pub fn process_file(&self, path: &Path) -> FileOutcome {
        trace!("Processing file: {}", path.display());
        self.metrics.record_file_processed();

        let result = self.with_diagnostics(|| extract_from_path(path, &self.options, &self.metrics));
        match result {
            Ok(extraction) => FileOutcome::Searched {
                path: path.to_path_buf(),
                matched: self.matcher.is_match(&extraction.text),
                warnings: extraction.warnings,
            },
            Err(reason) => {
                debug!("Failed to parse {}: {}", path.display(), reason);
                FileOutcome::Failed {
                    path: path.to_path_buf(),
                    reason,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::VigrepError;
    use crate::fixtures::{vi_with_text, zlib_payload, ContainerBuilder, HeapBuilder};
    use crate::heap::tags;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn processor(pattern: &str) -> FileProcessor {
        FileProcessor::new(
            ExtractOptions::default(),
            PatternMatcher::new(pattern, false).unwrap(),
        )
    }

    fn unclosed_vi(text: &str) -> Vec<u8> {
        let heap = HeapBuilder::new()
            .open(tags::SYSTEM_OBJECT, &[(tags::ATTR_UID, 1)])
            .open(tags::FIELD_TEXT_REC, &[(tags::ATTR_CLASS, tags::CLASS_TEXT_HAIR)])
            .leaf(tags::TEXT_HAIR_TEXT, text.as_bytes())
            .close(tags::FIELD_TEXT_REC)
            .finish();
        ContainerBuilder::new()
            .block("FPHb", vec![(0, zlib_payload(&heap))])
            .build()
    }

    #[test]
    fn test_extract_from_reader() {
        let bytes = vi_with_text(&["Stop"], &["Initialize", "Loop"]);
        let extraction = extract_from_reader(
            Cursor::new(bytes),
            "main",
            &ExtractOptions::default(),
            &ScanMetrics::new(),
        )
        .unwrap();
        assert_eq!(extraction.text, "Stop\nInitialize\nLoop\n");
        assert!(extraction.warnings.is_empty());
    }

    #[test]
    fn test_lenient_sanity_keeps_text() {
        let extraction = extract_from_reader(
            Cursor::new(unclosed_vi("kept")),
            "broken",
            &ExtractOptions::default(),
            &ScanMetrics::new(),
        )
        .unwrap();
        assert_eq!(extraction.text, "kept\n");
        assert!(matches!(
            extraction.warnings[0],
            VigrepError::SanityCheckFailed(_)
        ));
    }

    #[test]
    fn test_strict_sanity_fails_file() {
        let options = ExtractOptions {
            sanity_policy: SanityPolicy::Strict,
            ..ExtractOptions::default()
        };
        let result = extract_from_reader(
            Cursor::new(unclosed_vi("kept")),
            "broken",
            &options,
            &ScanMetrics::new(),
        );
        assert!(matches!(result, Err(VigrepError::SanityCheckFailed(_))));
    }

    #[test]
    fn test_process_file_outcomes() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("good.vi");
        let bad = dir.path().join("bad.vi");
        std::fs::write(&good, vi_with_text(&["Hello world"], &[])).unwrap();
        std::fs::write(&bad, b"definitely not a container").unwrap();

        let processor = processor("world");
        assert!(processor.process_file(&good).is_match());
        assert!(!self::processor("absent").process_file(&good).is_match());

        match processor.process_file(&bad) {
            FileOutcome::Failed { path, reason } => {
                assert_eq!(path, bad);
                assert!(matches!(reason, VigrepError::MalformedContainer(_)));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(processor.metrics().get_stats().files_processed, 2);
    }

    #[test]
    fn test_missing_file_fails() {
        let outcome = processor("x").process_file(Path::new("/no/such/file.vi"));
        assert!(matches!(
            outcome,
            FileOutcome::Failed {
                reason: VigrepError::FileNotFound(_),
                ..
            }
        ));
    }

    #[test]
    fn test_quiet_processing_still_records_warnings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.vi");
        std::fs::write(&path, unclosed_vi("kept")).unwrap();

        let outcome = processor("kept").quiet(true).process_file(&path);
        match outcome {
            FileOutcome::Searched {
                matched, warnings, ..
            } => {
                assert!(matched);
                assert_eq!(warnings.len(), 1);
            }
            other => panic!("expected searched, got {:?}", other),
        }
    }
}
