/// The scan driver.
///
/// [`engine::Scanner`] enumerates candidate files and feeds them one at a
/// time to [`processor::FileProcessor`], which runs the per-file pipeline:
///
/// ```text
/// resource map -> block filter -> payload loader -> heap decoder -> text -> match
/// ```
///
/// Files are processed sequentially so that matches come out in walk order,
/// and every file ends as a [`crate::results::FileOutcome`]. Only fatal
/// errors, such as cancellation, stop the scan:
///
/// ```rust,ignore
/// let scanner = Scanner::new(&config)?;
/// let report = scanner.run(|outcome| {
///     if outcome.is_match() {
///         println!("{}", outcome.path().display());
///     }
/// })?;
/// println!("{}", report.summary());
/// ```
pub mod engine;
pub mod matcher;
pub mod processor;

pub use engine::{scan, Scanner};
pub use matcher::{MatchStrategy, PatternMatcher};
pub use processor::{
    extract_from_container, extract_from_path, extract_from_reader, ExtractOptions, FileProcessor,
};
