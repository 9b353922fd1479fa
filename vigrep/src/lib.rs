pub mod config;
pub mod container;
pub mod errors;
#[doc(hidden)]
pub mod fixtures;
pub mod filters;
pub mod heap;
pub mod metrics;
pub mod results;
pub mod search;
pub mod text;

pub use config::{RegionCodes, SanityPolicy, ScanConfig};
pub use errors::{VigrepError, VigrepResult};
pub use metrics::{ScanMetrics, ScanStats};
pub use results::{FileOutcome, ScanReport};
pub use search::{scan, ExtractOptions, Scanner};
pub use text::{extract_text, TextExtraction};
