//! Selective access to LabVIEW resource containers.
//!
//! A [`Container`] reads the resource map when it is opened, then loads and
//! decodes only the blocks whose identifiers match the configured region
//! codes. Everything else in the file stays on disk.
pub mod loader;
pub mod map;

use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use tracing::{debug, trace};

use crate::config::RegionCodes;
use crate::errors::{VigrepError, VigrepResult};
use crate::filters::filter_block_headers;
use crate::heap::{decode_section, HeapObject, HeapTree};
use crate::metrics::ScanMetrics;

pub use loader::load_blocks;
pub use map::{
    read_resource_map, BlockHeader, ContainerHeader, Ident, MapEntryKind, ResourceMap,
    ResourceMapEntry, SectionHeader,
};

/// File types written by LabVIEW into the container header.
const KNOWN_FILE_TYPES: &[&[u8; 4]] = &[
    b"LVIN", b"LVCC", b"LVAR", b"LVIT", b"LMNU", b"LVRS", b"iUWl", b"sVIN",
];

/// Decode state of a loaded section.
#[derive(Debug, Clone)]
pub enum SectionState {
    /// Loaded but not decoded yet
    Pending,
    Decoded(HeapTree),
    /// The block's sub-format carries no heap
    NoHeap,
    /// Decoding failed; the section contributes no objects
    Failed(String),
}

/// One loaded section of a block.
#[derive(Debug, Clone)]
pub struct Section {
    pub header: SectionHeader,
    /// Size prefix and payload as read from the data region
    pub raw: Vec<u8>,
    pub state: SectionState,
}

impl Section {
    pub fn new(header: SectionHeader, raw: Vec<u8>) -> Self {
        Self {
            header,
            raw,
            state: SectionState::Pending,
        }
    }

    pub fn index(&self) -> i32 {
        self.header.index
    }

    /// The decoded heap, if this section has one.
    pub fn heap(&self) -> Option<&HeapTree> {
        match &self.state {
            SectionState::Decoded(tree) => Some(tree),
            _ => None,
        }
    }

    /// Decoded objects in document order; empty unless decoding succeeded.
    pub fn objects(&self) -> &[HeapObject] {
        self.heap().map(|tree| tree.objects()).unwrap_or(&[])
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, SectionState::Failed(_))
    }
}

/// A block whose selected sections have been read from the stream.
#[derive(Debug, Clone)]
pub struct Block {
    pub header: BlockHeader,
    /// Sections in on-disk order, unique by index
    pub sections: Vec<Section>,
}

impl Block {
    pub fn ident(&self) -> Ident {
        self.header.ident
    }

    /// Decodes every section independently.
    ///
    /// A section that fails is marked [`SectionState::Failed`] and decoding
    /// moves on to the next one. The failures are returned as warnings.
    pub fn decode_sections(&mut self, metrics: &ScanMetrics) -> Vec<VigrepError> {
        let ident = self.header.ident;
        let mut warnings = Vec::new();
        for section in &mut self.sections {
            section.state = match decode_section(ident, &section.raw) {
                Ok(Some(tree)) => {
                    trace!(
                        "{} section {}: {} heap objects",
                        ident,
                        section.index(),
                        tree.len()
                    );
                    metrics.record_section_decoded();
                    SectionState::Decoded(tree)
                }
                Ok(None) => {
                    metrics.record_section_without_heap();
                    SectionState::NoHeap
                }
                Err(e) => {
                    debug!("{} section {} not decoded: {}", ident, section.index(), e);
                    metrics.record_section_failed();
                    let reason = e.to_string();
                    warnings.push(VigrepError::section_decode(
                        ident.to_string(),
                        section.index(),
                        reason.clone(),
                    ));
                    SectionState::Failed(reason)
                }
            };
        }
        warnings
    }
}

/// One open container file.
#[derive(Debug)]
pub struct Container<R> {
    reader: R,
    base_name: String,
    map: ResourceMap,
    blocks: Vec<Block>,
}

impl Container<File> {
    /// Opens the file at `path` and reads its resource map.
    pub fn from_path(path: &Path) -> VigrepResult<Self> {
        let file = File::open(path).map_err(|e| VigrepError::from_open(path, e))?;
        let base_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::open(file, base_name)
    }
}

impl<R: Read + Seek> Container<R> {
    /// Reads the resource map from `reader`. No block payload is read.
    pub fn open(mut reader: R, base_name: impl Into<String>) -> VigrepResult<Self> {
        let map = read_resource_map(&mut reader)?;
        Ok(Self {
            reader,
            base_name: base_name.into(),
            map,
            blocks: Vec::new(),
        })
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn map(&self) -> &ResourceMap {
        &self.map
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Loads the raw sections of every block matching `codes`.
    pub fn load(&mut self, codes: &RegionCodes, metrics: &ScanMetrics) -> VigrepResult<()> {
        let selected = filter_block_headers(&self.map.blocks, codes);
        let selected_bytes: u64 = selected.iter().map(|b| b.length).sum();
        metrics.record_bytes_skipped(self.map.total_block_bytes() - selected_bytes);
        debug!(
            "{}: loading {} of {} blocks",
            self.base_name,
            selected.len(),
            self.map.blocks.len()
        );
        self.blocks = load_blocks(&mut self.reader, &selected, metrics)?;
        Ok(())
    }

    /// Decodes the sections of all loaded blocks, returning the section
    /// failures as warnings.
    pub fn decode(&mut self, metrics: &ScanMetrics) -> Vec<VigrepError> {
        self.blocks
            .iter_mut()
            .flat_map(|block| block.decode_sections(metrics))
            .collect()
    }

    /// Integrity check over the header and the decoded blocks.
    pub fn check_sanity(&self) -> VigrepResult<()> {
        let header = &self.map.header;
        if !KNOWN_FILE_TYPES.iter().any(|t| **t == header.file_type.0) {
            return Err(VigrepError::sanity(format!(
                "unknown file type '{}'",
                header.file_type
            )));
        }

        let data = (header.data_offset as u64, header.data_end());
        let info = (header.info_offset as u64, header.info_end());
        if header.data_size > 0 && data.0 < info.1 && info.0 < data.1 {
            return Err(VigrepError::sanity(format!(
                "data region {}..{} overlaps info region {}..{}",
                data.0, data.1, info.0, info.1
            )));
        }

        for block in &self.blocks {
            if block.sections.len() != block.header.sections.len() {
                return Err(VigrepError::sanity(format!(
                    "block {} holds {} of {} sections",
                    block.ident(),
                    block.sections.len(),
                    block.header.sections.len()
                )));
            }
            for section in &block.sections {
                if section.raw.len() as u64 != section.header.length {
                    return Err(VigrepError::sanity(format!(
                        "block {} section {} loaded {} of {} bytes",
                        block.ident(),
                        section.index(),
                        section.raw.len(),
                        section.header.length
                    )));
                }
                if let Some(tree) = section.heap() {
                    if tree.unclosed() > 0 {
                        return Err(VigrepError::sanity(format!(
                            "block {} section {} leaves {} heap scopes open",
                            block.ident(),
                            section.index(),
                            tree.unclosed()
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Gives back the underlying stream.
    pub fn into_inner(self) -> R {
        self.reader
    }
}
