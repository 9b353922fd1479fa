//! Heap decoding for front panel and block diagram sections.
//!
//! A heap is a serialized tree. Each node carries a scope (open, leaf or
//! close), a tag, optional attributes and optional content. Nodes are read in
//! document order and the tree is tracked with a stack of open nodes, so
//! every object's parent is already known when the object is read.
pub mod tags;

use byteorder::{BigEndian, ReadBytesExt};
use flate2::read::ZlibDecoder;
use std::io::{Cursor, Read};
use thiserror::Error;

use crate::container::Ident;
pub use tags::{classify, FieldTag, ObjectClass, ParentKind, SystemTag, Tag, TextHairTag};

/// Upper bound for an inflated heap.
pub const MAX_INFLATED_SIZE: u32 = (1 << 28) - 1;
/// Most bytes reserved up front for an inflated heap.
const INFLATE_RESERVE: usize = 1 << 20;
/// Raw tag value announcing a 32-bit tag after the command word.
const EXTENDED_TAG: u16 = 1023;
const TAG_BIAS: i32 = 31;

/// Errors local to one section's heap.
#[derive(Debug, Error)]
pub enum HeapError {
    #[error("unexpected end of heap data")]
    UnexpectedEnd,
    #[error("section payload declares {declared} bytes but holds {available}")]
    SizeMismatch { declared: u64, available: u64 },
    #[error("inflate failed: {0}")]
    Inflate(String),
    #[error("invalid scope {scope} at offset {offset}")]
    InvalidScope { scope: u8, offset: u64 },
    #[error("invalid size spec {spec} at offset {offset}")]
    InvalidSizeSpec { spec: u8, offset: u64 },
    #[error("close of tag {tag} without an open node")]
    CloseWithoutOpen { tag: i32 },
    #[error("close of tag {found} does not match open tag {expected}")]
    MismatchedClose { expected: i32, found: i32 },
}

impl From<std::io::Error> for HeapError {
    fn from(_: std::io::Error) -> Self {
        HeapError::UnexpectedEnd
    }
}

/// Position of a node relative to its subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeScope {
    Open,
    Leaf,
    Close,
}

impl NodeScope {
    fn from_bits(bits: u8, offset: u64) -> Result<Self, HeapError> {
        match bits {
            0 => Ok(NodeScope::Open),
            1 => Ok(NodeScope::Leaf),
            2 => Ok(NodeScope::Close),
            scope => Err(HeapError::InvalidScope { scope, offset }),
        }
    }
}

/// Content carried by a heap node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeapContent {
    None,
    Bytes(Vec<u8>),
    /// Size spec 7: a boolean flag with no bytes
    True,
}

/// One decoded heap node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapObject {
    pub tag: i32,
    pub scope: NodeScope,
    /// Index of the enclosing open node in the same section
    pub parent: Option<usize>,
    pub depth: usize,
    pub attributes: Vec<(i32, i32)>,
    pub content: HeapContent,
}

impl HeapObject {
    pub fn attribute(&self, id: i32) -> Option<i32> {
        self.attributes
            .iter()
            .find(|(attr, _)| *attr == id)
            .map(|(_, value)| *value)
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.content {
            HeapContent::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// Objects of one section in document order, with their classification.
#[derive(Debug, Clone, Default)]
pub struct HeapTree {
    objects: Vec<HeapObject>,
    tags: Vec<Tag>,
    unclosed: usize,
}

impl HeapTree {
    fn new(objects: Vec<HeapObject>, unclosed: usize) -> Self {
        // Parents precede their children, so one forward pass is enough.
        let mut tags: Vec<Tag> = Vec::with_capacity(objects.len());
        for object in &objects {
            let parent = object.parent.map(|i| (&objects[i], tags[i]));
            let context = ParentKind::of(parent);
            tags.push(classify(object.tag, &context));
        }
        Self {
            objects,
            tags,
            unclosed,
        }
    }

    pub fn objects(&self) -> &[HeapObject] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Open scopes left at the end of the stream.
    pub fn unclosed(&self) -> usize {
        self.unclosed
    }

    pub fn tag(&self, index: usize) -> Option<Tag> {
        self.tags.get(index).copied()
    }

    /// Objects paired with their semantic tag.
    pub fn classified(&self) -> impl Iterator<Item = (&HeapObject, Tag)> + '_ {
        self.objects.iter().zip(self.tags.iter().copied())
    }

    /// Tags of the ancestors of `index`, outermost first.
    pub fn scope_path(&self, index: usize) -> Vec<i32> {
        let mut path = Vec::new();
        let mut current = self.objects.get(index).and_then(|o| o.parent);
        while let Some(i) = current {
            path.push(self.objects[i].tag);
            current = self.objects[i].parent;
        }
        path.reverse();
        path
    }
}

/// Heap encoding selected by the fourth character of a heap block ident.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapCoding {
    Zlib,
    Raw,
    NoHeap,
}

impl HeapCoding {
    pub fn for_ident(ident: Ident) -> Self {
        match ident.variant() {
            b'b' | b'c' => HeapCoding::Zlib,
            b'x' => HeapCoding::Raw,
            _ => HeapCoding::NoHeap,
        }
    }
}

/// Reads the variable-size unsigned field used for counts and lengths.
pub fn read_u124(cursor: &mut Cursor<&[u8]>) -> Result<u32, HeapError> {
    let first = cursor.read_u8()?;
    Ok(match first {
        0xFF => cursor.read_u32::<BigEndian>()?,
        b if b < 0x80 => b as u32,
        b => (((b & 0x7F) as u32) << 8) | cursor.read_u8()? as u32,
    })
}

/// Reads the variable-size signed field used for attribute ids and values.
pub fn read_s124(cursor: &mut Cursor<&[u8]>) -> Result<i32, HeapError> {
    let first = cursor.read_u8()?;
    Ok(match first {
        0x80 => cursor.read_i32::<BigEndian>()?,
        0x81 => cursor.read_i16::<BigEndian>()? as i32,
        b => b as i8 as i32,
    })
}

struct Node {
    tag: i32,
    scope: NodeScope,
    attributes: Vec<(i32, i32)>,
    content: HeapContent,
}

fn read_node(cursor: &mut Cursor<&[u8]>) -> Result<Node, HeapError> {
    let offset = cursor.position();
    let command = cursor.read_u16::<BigEndian>()?;
    let scope = NodeScope::from_bits((command >> 14) as u8, offset)?;
    let has_attributes = command & 0x2000 != 0;
    let size_spec = ((command >> 10) & 0x7) as u8;
    let raw_tag = command & 0x3FF;
    let tag = if raw_tag == EXTENDED_TAG {
        cursor.read_i32::<BigEndian>()?
    } else {
        raw_tag as i32 - TAG_BIAS
    };

    let mut attributes = Vec::new();
    if has_attributes {
        let count = read_u124(cursor)?;
        for _ in 0..count {
            let id = read_s124(cursor)?;
            let value = read_s124(cursor)?;
            attributes.push((id, value));
        }
    }

    let content = match size_spec {
        0 => HeapContent::None,
        1..=4 => HeapContent::Bytes(read_bytes(cursor, size_spec as usize)?),
        6 => {
            let len = read_u124(cursor)? as usize;
            HeapContent::Bytes(read_bytes(cursor, len)?)
        }
        7 => HeapContent::True,
        spec => return Err(HeapError::InvalidSizeSpec { spec, offset }),
    };

    Ok(Node {
        tag,
        scope,
        attributes,
        content,
    })
}

fn read_bytes(cursor: &mut Cursor<&[u8]>, len: usize) -> Result<Vec<u8>, HeapError> {
    let remaining = cursor.get_ref().len() - cursor.position() as usize;
    if len > remaining {
        return Err(HeapError::UnexpectedEnd);
    }
    let mut bytes = vec![0u8; len];
    cursor.read_exact(&mut bytes)?;
    Ok(bytes)
}

/// Decodes a heap stream: a u32 content length followed by that many bytes
/// of nodes.
pub fn decode_heap(data: &[u8]) -> Result<HeapTree, HeapError> {
    let mut cursor = Cursor::new(data);
    let declared = cursor.read_u32::<BigEndian>()? as u64;
    let available = data.len() as u64 - 4;
    if declared > available {
        return Err(HeapError::SizeMismatch {
            declared,
            available,
        });
    }
    let stream = &data[4..4 + declared as usize];
    let mut cursor = Cursor::new(stream);

    let mut objects: Vec<HeapObject> = Vec::new();
    let mut open: Vec<usize> = Vec::new();
    while (cursor.position() as usize) < stream.len() {
        let node = read_node(&mut cursor)?;
        let index = objects.len();
        let (parent, depth) = match node.scope {
            NodeScope::Open | NodeScope::Leaf => (open.last().copied(), open.len()),
            NodeScope::Close => {
                let opened = open
                    .pop()
                    .ok_or(HeapError::CloseWithoutOpen { tag: node.tag })?;
                if objects[opened].tag != node.tag {
                    return Err(HeapError::MismatchedClose {
                        expected: objects[opened].tag,
                        found: node.tag,
                    });
                }
                (objects[opened].parent, open.len())
            }
        };
        if node.scope == NodeScope::Open {
            open.push(index);
        }
        objects.push(HeapObject {
            tag: node.tag,
            scope: node.scope,
            parent,
            depth,
            attributes: node.attributes,
            content: node.content,
        });
    }

    Ok(HeapTree::new(objects, open.len()))
}

fn inflate(payload: &[u8]) -> Result<Vec<u8>, HeapError> {
    let mut cursor = Cursor::new(payload);
    let expected = cursor.read_u32::<BigEndian>()?;
    if expected > MAX_INFLATED_SIZE {
        return Err(HeapError::Inflate(format!(
            "inflated size {} exceeds limit",
            expected
        )));
    }
    let mut inflated = Vec::with_capacity((expected as usize).min(INFLATE_RESERVE));
    ZlibDecoder::new(&payload[4..])
        .take(expected as u64 + 1)
        .read_to_end(&mut inflated)
        .map_err(|e| HeapError::Inflate(e.to_string()))?;
    if inflated.len() as u64 != expected as u64 {
        return Err(HeapError::SizeMismatch {
            declared: expected as u64,
            available: inflated.len() as u64,
        });
    }
    Ok(inflated)
}

/// Decodes one loaded section of a heap block.
///
/// `raw` is the section as read from the data region: a u32 payload size,
/// the payload, and possibly trailing bytes up to the next section. Returns
/// `Ok(None)` when the block's sub-format has no heap.
pub fn decode_section(ident: Ident, raw: &[u8]) -> Result<Option<HeapTree>, HeapError> {
    let coding = HeapCoding::for_ident(ident);
    if coding == HeapCoding::NoHeap {
        return Ok(None);
    }

    let mut cursor = Cursor::new(raw);
    let size = cursor.read_u32::<BigEndian>()? as u64;
    let available = raw.len() as u64 - 4;
    if size > available {
        return Err(HeapError::SizeMismatch {
            declared: size,
            available,
        });
    }
    let payload = &raw[4..4 + size as usize];

    let tree = match coding {
        HeapCoding::Zlib => decode_heap(&inflate(payload)?)?,
        _ => decode_heap(payload)?,
    };
    Ok(Some(tree))
}
