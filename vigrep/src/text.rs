//! Collects the text-tagged heap objects of loaded blocks.

use encoding_rs::Encoding;
use tracing::warn;

use crate::container::{Block, Section};
use crate::errors::VigrepError;
use crate::heap::NodeScope;
use crate::metrics::ScanMetrics;

/// Separator appended after every text object.
pub const TEXT_SEPARATOR: char = '\n';

/// Text gathered from one container.
#[derive(Debug, Default)]
pub struct TextExtraction {
    /// Decoded text objects in block, section and document order
    pub text: String,
    /// Number of text objects that decoded
    pub text_objects: usize,
    /// Objects skipped because their bytes are not valid in the encoding
    pub warnings: Vec<VigrepError>,
}

impl TextExtraction {
    pub fn contains(&self, pattern: &str) -> bool {
        self.text.contains(pattern)
    }
}

/// Appends the text objects of one section to `out`.
fn extract_section(
    block: &Block,
    section: &Section,
    encoding: &'static Encoding,
    metrics: &ScanMetrics,
    out: &mut TextExtraction,
) {
    let Some(tree) = section.heap() else {
        return;
    };
    for (object, tag) in tree.classified() {
        if !tag.is_text() || object.scope == NodeScope::Close {
            continue;
        }
        let Some(bytes) = object.bytes() else {
            continue;
        };
        match encoding.decode_without_bom_handling_and_without_replacement(bytes) {
            Some(text) => {
                out.text.push_str(&text);
                out.text.push(TEXT_SEPARATOR);
                out.text_objects += 1;
                metrics.record_text_object();
            }
            None => {
                warn!(
                    "Failed to decode {} bytes of text in {} section {} as {}",
                    bytes.len(),
                    block.ident(),
                    section.index(),
                    encoding.name()
                );
                metrics.record_text_decode_failure();
                out.warnings.push(VigrepError::TextDecode {
                    block: block.ident().to_string(),
                    section: section.index(),
                    encoding: encoding.name(),
                    length: bytes.len(),
                });
            }
        }
    }
}

/// Extracts all text objects from `blocks` using `encoding`.
///
/// Never fails: sections without a heap contribute nothing, and objects whose
/// bytes do not decode are skipped with a warning.
pub fn extract_text(
    blocks: &[Block],
    encoding: &'static Encoding,
    metrics: &ScanMetrics,
) -> TextExtraction {
    let mut out = TextExtraction::default();
    for block in blocks {
        for section in &block.sections {
            extract_section(block, section, encoding, metrics, &mut out);
        }
    }
    out
}
