//! Builders for synthetic containers and heaps, shared by the unit tests,
//! the integration tests, the CLI tests and the benchmarks.

use byteorder::{BigEndian, WriteBytesExt};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::Write;

use crate::container::map::{
    BLOCK_ENTRY_SIZE, BLOCK_INFO_LIST_SIZE, HEADER_SIZE, NO_NAME, RSRC_CREATOR, RSRC_MAGIC,
    SECTION_ENTRY_SIZE, VI_FILE_TYPE,
};
use crate::heap::tags;

const FORMAT_VERSION: u16 = 3;

struct FixtureSection {
    index: i32,
    name: Option<String>,
    payload: Vec<u8>,
}

struct FixtureBlock {
    ident: [u8; 4],
    sections: Vec<FixtureSection>,
}

/// Writes a resource container: header, data region, then info region.
///
/// Sections are laid out back to back in the order they were added, each as
/// a u32 payload size followed by the payload. Blocks need at least one
/// section.
pub struct ContainerBuilder {
    file_type: [u8; 4],
    blocks: Vec<FixtureBlock>,
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self {
            file_type: *VI_FILE_TYPE,
            blocks: Vec::new(),
        }
    }

    pub fn file_type(mut self, file_type: [u8; 4]) -> Self {
        self.file_type = file_type;
        self
    }

    /// Adds a block of unnamed sections given as (index, payload).
    pub fn block(mut self, ident: &str, sections: Vec<(i32, Vec<u8>)>) -> Self {
        let sections = sections
            .into_iter()
            .map(|(index, payload)| FixtureSection {
                index,
                name: None,
                payload,
            })
            .collect();
        self.blocks.push(FixtureBlock {
            ident: ident_bytes(ident),
            sections,
        });
        self
    }

    /// Adds a block of named sections given as (index, name, payload).
    pub fn named_block(mut self, ident: &str, sections: Vec<(i32, String, Vec<u8>)>) -> Self {
        let sections = sections
            .into_iter()
            .map(|(index, name, payload)| FixtureSection {
                index,
                name: Some(name),
                payload,
            })
            .collect();
        self.blocks.push(FixtureBlock {
            ident: ident_bytes(ident),
            sections,
        });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut data = Vec::new();
        let mut data_offsets = Vec::new();
        for block in &self.blocks {
            for section in &block.sections {
                data_offsets.push(data.len() as u32);
                put_u32(&mut data, section.payload.len() as u32);
                data.extend_from_slice(&section.payload);
            }
        }

        let section_count: usize = self.blocks.iter().map(|b| b.sections.len()).sum();
        let table_start = 4 + BLOCK_ENTRY_SIZE as usize * self.blocks.len();
        let blockinfo_size = table_start + SECTION_ENTRY_SIZE as usize * section_count;

        let mut blockinfo = Vec::with_capacity(blockinfo_size);
        let mut names = Vec::new();
        put_u32(&mut blockinfo, self.blocks.len().saturating_sub(1) as u32);
        let mut table_offset = table_start;
        for block in &self.blocks {
            blockinfo.extend_from_slice(&block.ident);
            put_u32(&mut blockinfo, block.sections.len().saturating_sub(1) as u32);
            put_u32(&mut blockinfo, table_offset as u32);
            table_offset += SECTION_ENTRY_SIZE as usize * block.sections.len();
        }
        let mut data_offsets = data_offsets.into_iter();
        for section in self.blocks.iter().flat_map(|b| &b.sections) {
            let name_offset = match &section.name {
                Some(name) => {
                    let offset = names.len() as u32;
                    names.push(name.len() as u8);
                    names.extend_from_slice(name.as_bytes());
                    offset
                }
                None => NO_NAME,
            };
            put_u32(&mut blockinfo, section.index as u32);
            put_u32(&mut blockinfo, name_offset);
            put_u32(&mut blockinfo, 0);
            put_u32(&mut blockinfo, data_offsets.next().unwrap_or_default());
            put_u32(&mut blockinfo, 0);
        }

        let data_offset = HEADER_SIZE as u32;
        let info_offset = data_offset + data.len() as u32;
        let blockinfo_offset = (HEADER_SIZE + BLOCK_INFO_LIST_SIZE) as u32;
        let info_size = blockinfo_offset + blockinfo.len() as u32 + names.len() as u32;

        let mut header = Vec::with_capacity(HEADER_SIZE as usize);
        header.extend_from_slice(RSRC_MAGIC);
        header.extend_from_slice(&FORMAT_VERSION.to_be_bytes());
        header.extend_from_slice(&self.file_type);
        header.extend_from_slice(RSRC_CREATOR);
        put_u32(&mut header, info_offset);
        put_u32(&mut header, info_size);
        put_u32(&mut header, data_offset);
        put_u32(&mut header, data.len() as u32);

        let mut out = Vec::with_capacity(info_offset as usize + info_size as usize);
        out.extend_from_slice(&header);
        out.extend_from_slice(&data);
        out.extend_from_slice(&header);
        for _ in 0..3 {
            put_u32(&mut out, 0);
        }
        put_u32(&mut out, blockinfo_offset);
        put_u32(&mut out, blockinfo.len() as u32);
        out.extend_from_slice(&blockinfo);
        out.extend_from_slice(&names);
        out
    }
}

fn ident_bytes(ident: &str) -> [u8; 4] {
    let mut bytes = [b' '; 4];
    for (dst, src) in bytes.iter_mut().zip(ident.bytes()) {
        *dst = src;
    }
    bytes
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Writes a heap stream node by node. Scopes are not checked, so broken
/// trees can be built on purpose.
#[derive(Default)]
pub struct HeapBuilder {
    nodes: Vec<u8>,
}

impl HeapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(mut self, tag: i32, attributes: &[(i32, i32)]) -> Self {
        self.node(0, tag, attributes, 0, &[]);
        self
    }

    /// Leaf with byte content; the size spec follows the content length.
    pub fn leaf(mut self, tag: i32, content: &[u8]) -> Self {
        let spec = match content.len() {
            0..=4 => content.len() as u16,
            _ => 6,
        };
        self.node(1, tag, &[], spec, content);
        self
    }

    /// Leaf carrying the boolean true flag.
    pub fn flag(mut self, tag: i32) -> Self {
        self.node(1, tag, &[], 7, &[]);
        self
    }

    pub fn close(mut self, tag: i32) -> Self {
        self.node(2, tag, &[], 0, &[]);
        self
    }

    /// Appends bytes verbatim.
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.nodes.extend_from_slice(bytes);
        self
    }

    /// The heap stream: u32 content length followed by the nodes.
    pub fn finish(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.nodes.len() + 4);
        put_u32(&mut out, self.nodes.len() as u32);
        out.extend_from_slice(&self.nodes);
        out
    }

    fn node(&mut self, scope: u16, tag: i32, attributes: &[(i32, i32)], spec: u16, content: &[u8]) {
        let biased = tag + 31;
        let extended = !(0..1023).contains(&biased);
        let raw_tag = if extended { 1023 } else { biased as u16 };
        let mut command = (scope << 14) | (spec << 10) | raw_tag;
        if !attributes.is_empty() {
            command |= 0x2000;
        }
        self.nodes.extend_from_slice(&command.to_be_bytes());
        if extended {
            self.nodes.extend_from_slice(&tag.to_be_bytes());
        }
        if !attributes.is_empty() {
            write_u124(&mut self.nodes, attributes.len() as u32);
            for (id, value) in attributes {
                write_s124(&mut self.nodes, *id);
                write_s124(&mut self.nodes, *value);
            }
        }
        if spec == 6 {
            write_u124(&mut self.nodes, content.len() as u32);
        }
        if spec != 7 {
            self.nodes.extend_from_slice(content);
        }
    }
}

fn write_u124(out: &mut Vec<u8>, value: u32) {
    if value < 0x80 {
        out.push(value as u8);
    } else if value < 0x7F00 {
        out.push(0x80 | (value >> 8) as u8);
        out.push(value as u8);
    } else {
        out.push(0xFF);
        put_u32(out, value);
    }
}

fn write_s124(out: &mut Vec<u8>, value: i32) {
    if (-126..=127).contains(&value) {
        out.push(value as i8 as u8);
    } else if let Ok(short) = i16::try_from(value) {
        out.push(0x81);
        out.extend_from_slice(&short.to_be_bytes());
    } else {
        out.push(0x80);
        out.extend_from_slice(&value.to_be_bytes());
    }
}

/// Payload of a `b`/`c` heap block: inflated size plus the zlib stream.
pub fn zlib_payload(heap: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_u32::<BigEndian>(heap.len() as u32)
        .expect("writing to a Vec cannot fail");
    let mut encoder = ZlibEncoder::new(out, Compression::default());
    encoder
        .write_all(heap)
        .expect("writing to a Vec cannot fail");
    encoder.finish().expect("writing to a Vec cannot fail")
}

/// A section as stored in the data region: u32 size then the payload.
pub fn section_bytes(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 4);
    put_u32(&mut out, payload.len() as u32);
    out.extend_from_slice(payload);
    out
}

/// Heap of one object holding each text in its own text record, the way a
/// label stores its caption.
pub fn label_heap(texts: &[&[u8]]) -> Vec<u8> {
    let mut heap = HeapBuilder::new().open(tags::SYSTEM_OBJECT, &[(tags::ATTR_UID, 1)]);
    for text in texts {
        heap = heap
            .open(
                tags::FIELD_TEXT_REC,
                &[(tags::ATTR_CLASS, tags::CLASS_TEXT_HAIR)],
            )
            .leaf(tags::TEXT_HAIR_MODE, &[0x11])
            .leaf(tags::TEXT_HAIR_TEXT, text)
            .close(tags::FIELD_TEXT_REC);
    }
    heap.close(tags::SYSTEM_OBJECT).finish()
}

/// A VI whose front panel and block diagram each hold one compressed label
/// heap, next to a few blocks that are never selected.
pub fn vi_with_text(front_panel: &[&str], block_diagram: &[&str]) -> Vec<u8> {
    let as_bytes = |texts: &[&str]| -> Vec<u8> {
        let texts: Vec<&[u8]> = texts.iter().map(|t| t.as_bytes()).collect();
        zlib_payload(&label_heap(&texts))
    };
    ContainerBuilder::new()
        .block("LVSR", vec![(0, vec![0; 24])])
        .block("vers", vec![(0, vec![1, 0, 0, 0])])
        .block("FPHb", vec![(0, as_bytes(front_panel))])
        .block("BDHb", vec![(0, as_bytes(block_diagram))])
        .block("ICON", vec![(0, vec![0xAA; 128])])
        .build()
}
