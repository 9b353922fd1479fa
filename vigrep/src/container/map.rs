//! Resource map reader.
//!
//! Reads the container header and the info region (header copy, block-info
//! list, block table, section tables and names) in two reads, then parses
//! the index from memory. Block payloads in the data region are never read
//! here.

use byteorder::{BigEndian, ReadBytesExt};
use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::io::{Cursor, Read, Seek, SeekFrom};
use tracing::{debug, trace};

use crate::errors::{VigrepError, VigrepResult};

pub const RSRC_MAGIC: &[u8; 6] = b"RSRC\r\n";
pub const RSRC_CREATOR: &[u8; 4] = b"LBVW";
pub const VI_FILE_TYPE: &[u8; 4] = b"LVIN";
pub const HEADER_SIZE: u64 = 32;
pub const BLOCK_INFO_LIST_SIZE: u64 = 20;
pub const BLOCK_ENTRY_SIZE: u64 = 12;
pub const SECTION_ENTRY_SIZE: u64 = 20;
/// Name offset of a section without a name.
pub const NO_NAME: u32 = u32::MAX;

const MAX_BLOCKS: u64 = 4096;
const MAX_SECTIONS_PER_BLOCK: u64 = 65536;

/// Four-character block or file-type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ident(pub [u8; 4]);

impl Ident {
    pub fn as_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    /// Whether the identifier contains `code` as a substring.
    pub fn contains(&self, code: &str) -> bool {
        self.as_str().contains(code)
    }

    /// Fourth character, which selects the sub-format of heap blocks.
    pub fn variant(&self) -> u8 {
        self.0[3]
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&[u8; 4]> for Ident {
    fn from(bytes: &[u8; 4]) -> Self {
        Ident(*bytes)
    }
}

/// The 32-byte header at the start of the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    pub version: u16,
    pub file_type: Ident,
    pub info_offset: u32,
    pub info_size: u32,
    pub data_offset: u32,
    pub data_size: u32,
}

impl ContainerHeader {
    fn parse(bytes: &[u8]) -> VigrepResult<Self> {
        let mut cursor = Cursor::new(bytes);
        let mut magic = [0u8; 6];
        cursor.read_exact(&mut magic).map_err(index_eof)?;
        if &magic != RSRC_MAGIC {
            return Err(VigrepError::malformed(format!(
                "bad signature {:02x?}",
                magic
            )));
        }
        let version = cursor.read_u16::<BigEndian>().map_err(index_eof)?;
        let file_type = read_ident(&mut cursor)?;
        let creator = read_ident(&mut cursor)?;
        if &creator.0 != RSRC_CREATOR {
            return Err(VigrepError::malformed(format!(
                "unexpected creator '{}'",
                creator
            )));
        }
        Ok(Self {
            version,
            file_type,
            info_offset: cursor.read_u32::<BigEndian>().map_err(index_eof)?,
            info_size: cursor.read_u32::<BigEndian>().map_err(index_eof)?,
            data_offset: cursor.read_u32::<BigEndian>().map_err(index_eof)?,
            data_size: cursor.read_u32::<BigEndian>().map_err(index_eof)?,
        })
    }

    pub fn is_vi(&self) -> bool {
        &self.file_type.0 == VI_FILE_TYPE
    }

    pub fn data_end(&self) -> u64 {
        self.data_offset as u64 + self.data_size as u64
    }

    pub fn info_end(&self) -> u64 {
        self.info_offset as u64 + self.info_size as u64
    }
}

/// Kinds of regions listed in the resource map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapEntryKind {
    Header,
    Data,
    Info,
    BlockInfo,
    Names,
}

impl MapEntryKind {
    pub fn name(&self) -> &'static str {
        match self {
            MapEntryKind::Header => "header",
            MapEntryKind::Data => "data",
            MapEntryKind::Info => "info",
            MapEntryKind::BlockInfo => "block-info",
            MapEntryKind::Names => "names",
        }
    }
}

/// One region of the container's top-level index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceMapEntry {
    pub kind: MapEntryKind,
    pub offset: u64,
    pub length: u64,
}

/// Location of one section's data inside the data region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    pub index: i32,
    pub name: Option<String>,
    /// Absolute offset of the section's size prefix
    pub offset: u64,
    /// Bytes up to the next section start or the end of the data region
    pub length: u64,
}

/// One named block and the sections it is made of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub ident: Ident,
    /// Lowest absolute section offset
    pub offset: u64,
    /// Sum of the section lengths
    pub length: u64,
    pub sections: Vec<SectionHeader>,
}

/// Everything the index of a container describes.
#[derive(Debug, Clone)]
pub struct ResourceMap {
    pub header: ContainerHeader,
    pub entries: Vec<ResourceMapEntry>,
    pub blocks: Vec<BlockHeader>,
}

impl ResourceMap {
    /// Total declared length of all blocks.
    pub fn total_block_bytes(&self) -> u64 {
        self.blocks.iter().map(|b| b.length).sum()
    }
}

struct RawBlock {
    ident: Ident,
    section_count: u64,
    table_offset: u64,
}

struct RawSection {
    index: i32,
    name_offset: u32,
    data_offset: u64,
}

fn index_eof(err: std::io::Error) -> VigrepError {
    match err.kind() {
        std::io::ErrorKind::UnexpectedEof => {
            VigrepError::malformed("index runs past the end of its region")
        }
        _ => VigrepError::IoError(err),
    }
}

fn read_ident(cursor: &mut Cursor<&[u8]>) -> VigrepResult<Ident> {
    let mut ident = [0u8; 4];
    cursor.read_exact(&mut ident).map_err(index_eof)?;
    Ok(Ident(ident))
}

fn region<'a>(bytes: &'a [u8], start: u64, len: u64, what: &str) -> VigrepResult<&'a [u8]> {
    let end = start
        .checked_add(len)
        .filter(|end| *end <= bytes.len() as u64)
        .ok_or_else(|| {
            VigrepError::malformed(format!(
                "{} at {}+{} exceeds info region of {} bytes",
                what,
                start,
                len,
                bytes.len()
            ))
        })?;
    Ok(&bytes[start as usize..end as usize])
}

/// Reads the resource map of the container in `reader`.
///
/// Fails with [`VigrepError::MalformedContainer`] if the signature is wrong,
/// the header copy disagrees with the primary header, or any declared offset
/// or length runs past the stream.
pub fn read_resource_map<R: Read + Seek>(reader: &mut R) -> VigrepResult<ResourceMap> {
    let stream_len = reader.seek(SeekFrom::End(0))?;
    if stream_len < HEADER_SIZE {
        return Err(VigrepError::malformed(format!(
            "stream of {} bytes is shorter than the header",
            stream_len
        )));
    }

    reader.seek(SeekFrom::Start(0))?;
    let mut header_bytes = [0u8; HEADER_SIZE as usize];
    reader.read_exact(&mut header_bytes)?;
    let header = ContainerHeader::parse(&header_bytes)?;
    trace!(
        "Header: type={} version={} info={}+{} data={}+{}",
        header.file_type,
        header.version,
        header.info_offset,
        header.info_size,
        header.data_offset,
        header.data_size
    );

    if header.info_end() > stream_len {
        return Err(VigrepError::malformed(format!(
            "info region ends at {} past stream length {}",
            header.info_end(),
            stream_len
        )));
    }
    if header.data_end() > stream_len {
        return Err(VigrepError::malformed(format!(
            "data region ends at {} past stream length {}",
            header.data_end(),
            stream_len
        )));
    }
    if (header.data_offset as u64) < HEADER_SIZE {
        return Err(VigrepError::malformed("data region overlaps the header"));
    }
    if (header.info_size as u64) < HEADER_SIZE + BLOCK_INFO_LIST_SIZE {
        return Err(VigrepError::malformed(format!(
            "info region of {} bytes is too small",
            header.info_size
        )));
    }

    reader.seek(SeekFrom::Start(header.info_offset as u64))?;
    let mut info = vec![0u8; header.info_size as usize];
    reader.read_exact(&mut info)?;

    if info[..HEADER_SIZE as usize] != header_bytes[..] {
        return Err(VigrepError::malformed(
            "header copy in info region does not match the primary header",
        ));
    }

    let mut cursor = Cursor::new(region(&info, HEADER_SIZE, BLOCK_INFO_LIST_SIZE, "block-info list")?);
    // Three dataset words precede the block-info location.
    for _ in 0..3 {
        cursor.read_u32::<BigEndian>().map_err(index_eof)?;
    }
    let blockinfo_offset = cursor.read_u32::<BigEndian>().map_err(index_eof)? as u64;
    let blockinfo_size = cursor.read_u32::<BigEndian>().map_err(index_eof)? as u64;
    let blockinfo = region(&info, blockinfo_offset, blockinfo_size, "block-info")?;

    let raw_blocks = parse_block_entries(blockinfo)?;
    let names_start = blockinfo_offset + blockinfo_size;
    let names = &info[names_start as usize..];

    let data_start = header.data_offset as u64;
    let data_end = header.data_end();
    let mut raw_sections: Vec<Vec<RawSection>> = Vec::with_capacity(raw_blocks.len());
    for block in &raw_blocks {
        let table_len = block.section_count * SECTION_ENTRY_SIZE;
        let table = region(blockinfo, block.table_offset, table_len, "section table")?;
        let mut cursor = Cursor::new(table);
        let mut sections = Vec::with_capacity(block.section_count as usize);
        let mut seen = HashSet::new();
        for _ in 0..block.section_count {
            let index = cursor.read_i32::<BigEndian>().map_err(index_eof)?;
            let name_offset = cursor.read_u32::<BigEndian>().map_err(index_eof)?;
            cursor.read_u32::<BigEndian>().map_err(index_eof)?;
            let rel = cursor.read_u32::<BigEndian>().map_err(index_eof)? as u64;
            cursor.read_u32::<BigEndian>().map_err(index_eof)?;

            if !seen.insert(index) {
                return Err(VigrepError::malformed(format!(
                    "block {} declares section {} twice",
                    block.ident, index
                )));
            }
            let data_offset = data_start + rel;
            // Every section starts with a 4-byte size.
            if data_offset + 4 > data_end {
                return Err(VigrepError::malformed(format!(
                    "section {} of block {} starts at {} past data end {}",
                    index, block.ident, data_offset, data_end
                )));
            }
            sections.push(RawSection {
                index,
                name_offset,
                data_offset,
            });
        }
        raw_sections.push(sections);
    }

    let mut starts: Vec<u64> = raw_sections
        .iter()
        .flatten()
        .map(|s| s.data_offset)
        .collect();
    starts.sort_unstable();
    starts.dedup();
    let section_length = |offset: u64| -> u64 {
        let next = match starts.binary_search(&offset) {
            Ok(i) => starts.get(i + 1).copied().unwrap_or(data_end),
            Err(_) => data_end,
        };
        next - offset
    };

    let mut blocks = Vec::with_capacity(raw_blocks.len());
    for (block, sections) in raw_blocks.iter().zip(raw_sections) {
        let mut headers = Vec::with_capacity(sections.len());
        for section in sections {
            let name = if section.name_offset == NO_NAME {
                None
            } else {
                Some(read_name(names, section.name_offset as u64)?)
            };
            headers.push(SectionHeader {
                index: section.index,
                name,
                offset: section.data_offset,
                length: section_length(section.data_offset),
            });
        }
        blocks.push(BlockHeader {
            ident: block.ident,
            offset: headers.iter().map(|s| s.offset).min().unwrap_or(data_start),
            length: headers.iter().map(|s| s.length).sum(),
            sections: headers,
        });
    }

    let info_start = header.info_offset as u64;
    let mut entries = vec![
        ResourceMapEntry {
            kind: MapEntryKind::Header,
            offset: 0,
            length: HEADER_SIZE,
        },
        ResourceMapEntry {
            kind: MapEntryKind::Data,
            offset: data_start,
            length: header.data_size as u64,
        },
        ResourceMapEntry {
            kind: MapEntryKind::Info,
            offset: info_start,
            length: header.info_size as u64,
        },
        ResourceMapEntry {
            kind: MapEntryKind::BlockInfo,
            offset: info_start + blockinfo_offset,
            length: blockinfo_size,
        },
        ResourceMapEntry {
            kind: MapEntryKind::Names,
            offset: info_start + names_start,
            length: names.len() as u64,
        },
    ];
    entries.sort_by_key(|e| e.offset);

    debug!(
        "Resource map: {} blocks, {} sections",
        blocks.len(),
        blocks.iter().map(|b| b.sections.len()).sum::<usize>()
    );

    Ok(ResourceMap {
        header,
        entries,
        blocks,
    })
}

fn parse_block_entries(blockinfo: &[u8]) -> VigrepResult<Vec<RawBlock>> {
    let mut cursor = Cursor::new(blockinfo);
    let count = cursor.read_u32::<BigEndian>().map_err(index_eof)? as u64 + 1;
    if count > MAX_BLOCKS {
        return Err(VigrepError::malformed(format!(
            "implausible block count {}",
            count
        )));
    }
    region(blockinfo, 4, count * BLOCK_ENTRY_SIZE, "block table")?;

    let mut blocks = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let ident = read_ident(&mut cursor)?;
        let section_count = cursor.read_u32::<BigEndian>().map_err(index_eof)? as u64 + 1;
        let table_offset = cursor.read_u32::<BigEndian>().map_err(index_eof)? as u64;
        if section_count > MAX_SECTIONS_PER_BLOCK {
            return Err(VigrepError::malformed(format!(
                "implausible section count {} in block {}",
                section_count, ident
            )));
        }
        blocks.push(RawBlock {
            ident,
            section_count,
            table_offset,
        });
    }
    Ok(blocks)
}

fn read_name(names: &[u8], offset: u64) -> VigrepResult<String> {
    let len = *names
        .get(offset as usize)
        .ok_or_else(|| VigrepError::malformed(format!("name offset {} out of range", offset)))?;
    let bytes = region(names, offset + 1, len as u64, "section name")?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}
