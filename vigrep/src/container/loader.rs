//! Block payload loader.
//!
//! Reads exactly the byte ranges of the selected sections. Headers that were
//! filtered out are never passed in, so their bytes are never requested from
//! the stream. A section whose size prefix runs past its range is a truncated
//! file, not a bad section.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Read, Seek, SeekFrom};
use tracing::trace;

use super::map::{BlockHeader, SectionHeader};
use super::{Block, Section};
use crate::errors::{VigrepError, VigrepResult};
use crate::metrics::ScanMetrics;

fn read_range<R: Read + Seek>(reader: &mut R, section: &SectionHeader) -> VigrepResult<Vec<u8>> {
    reader.seek(SeekFrom::Start(section.offset))?;
    let mut raw = Vec::with_capacity(section.length as usize);
    reader.by_ref().take(section.length).read_to_end(&mut raw)?;
    if (raw.len() as u64) < section.length {
        return Err(VigrepError::truncated(
            section.offset,
            section.length,
            raw.len() as u64,
        ));
    }
    let declared = 4 + (&raw[..])
        .read_u32::<BigEndian>()
        .map_err(|_| VigrepError::truncated(section.offset, 4, raw.len() as u64))?
        as u64;
    if declared > raw.len() as u64 {
        return Err(VigrepError::truncated(
            section.offset,
            declared,
            raw.len() as u64,
        ));
    }
    Ok(raw)
}

/// Loads the raw section bytes of every header in `selected`.
///
/// Only the size prefix is checked here; a payload that does not decode
/// shows up later as a failed section.
pub fn load_blocks<R: Read + Seek>(
    reader: &mut R,
    selected: &[&BlockHeader],
    metrics: &ScanMetrics,
) -> VigrepResult<Vec<Block>> {
    let mut blocks = Vec::with_capacity(selected.len());
    for header in selected {
        let mut sections = Vec::with_capacity(header.sections.len());
        for section in &header.sections {
            trace!(
                "Loading {} section {}: {} bytes at {}",
                header.ident,
                section.index,
                section.length,
                section.offset
            );
            let raw = read_range(reader, section)?;
            metrics.record_bytes_loaded(raw.len() as u64);
            sections.push(Section::new(section.clone(), raw));
        }
        blocks.push(Block {
            header: (*header).clone(),
            sections,
        });
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::map::Ident;
    use std::io::Cursor;

    fn header(offset: u64, length: u64) -> BlockHeader {
        BlockHeader {
            ident: Ident(*b"FPHb"),
            offset,
            length,
            sections: vec![SectionHeader {
                index: 0,
                name: None,
                offset,
                length,
            }],
        }
    }

    #[test]
    fn test_loads_exact_range() {
        let mut bytes = vec![0xEEu8; 4];
        bytes.extend_from_slice(&[0, 0, 0, 2, 7, 8, 9, 9]);
        let metrics = ScanMetrics::new();
        let blocks = load_blocks(&mut Cursor::new(&bytes), &[&header(4, 7)], &metrics).unwrap();

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].sections[0].raw, vec![0, 0, 0, 2, 7, 8, 9]);
        assert_eq!(metrics.get_stats().bytes_loaded, 7);
    }

    #[test]
    fn test_size_prefix_past_range_is_truncation() {
        // Prefix claims 1000 bytes, the range holds 6 after it
        let mut bytes = vec![0, 0, 0x03, 0xE8];
        bytes.extend_from_slice(b"kept!!");
        let metrics = ScanMetrics::new();
        let err = load_blocks(&mut Cursor::new(&bytes), &[&header(0, 10)], &metrics).unwrap_err();
        match err {
            VigrepError::TruncatedRead {
                offset,
                expected,
                found,
            } => {
                assert_eq!(offset, 0);
                assert_eq!(expected, 1004);
                assert_eq!(found, 10);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(metrics.get_stats().bytes_loaded, 0);
    }

    #[test]
    fn test_truncated_read() {
        let bytes = vec![0u8; 16];
        let metrics = ScanMetrics::new();
        let err = load_blocks(&mut Cursor::new(&bytes), &[&header(10, 20)], &metrics).unwrap_err();
        match err {
            VigrepError::TruncatedRead {
                offset,
                expected,
                found,
            } => {
                assert_eq!(offset, 10);
                assert_eq!(expected, 20);
                assert_eq!(found, 6);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_empty_selection_reads_nothing() {
        let bytes = vec![0u8; 16];
        let metrics = ScanMetrics::new();
        let blocks = load_blocks(&mut Cursor::new(&bytes), &[], &metrics).unwrap();
        assert!(blocks.is_empty());
        assert_eq!(metrics.get_stats().bytes_loaded, 0);
    }
}
