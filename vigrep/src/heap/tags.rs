//! Context-dependent classification of heap tags.
//!
//! Negative tags are system tags and mean the same thing everywhere. Positive
//! tags are object fields. Most fields come from one shared numbering, but a
//! node that carries a class attribute gives its children the field numbering
//! of that class: tag 3 is the `text` of a text record (class `textHair`) and
//! `activePlot` anywhere else. The lookup goes through [`CLASS_FIELDS`] first,
//! then the shared object fields. Anything else is [`Tag::Unknown`].
//!
//! Numbering follows the LabVIEW heap tag tables published with pylabview
//! (`SL_SYSTEM_TAGS`, `SL_SYSTEM_ATTRIB_TAGS`, `SL_CLASS_TAGS`,
//! `OBJ_FIELD_TAGS` and `OBJ_TEXT_HAIR_TAGS`). Only the entries the extractor
//! and its diagnostics name are listed here.

use super::HeapObject;

pub const SYSTEM_OBJECT: i32 = -3;
pub const SYSTEM_ARRAY: i32 = -4;
pub const SYSTEM_REFERENCE: i32 = -5;
pub const SYSTEM_ARRAY_ELEMENT: i32 = -6;
pub const SYSTEM_ROOT_OBJECT: i32 = -7;

/// System attribute holding a node's class id.
pub const ATTR_CLASS: i32 = -2;
pub const ATTR_UID: i32 = -3;

pub const CLASS_GENERIC: i32 = 0;
pub const CLASS_PR_FONT: i32 = -600;
/// Text record: the class of every `textRec` node
pub const CLASS_TEXT_HAIR: i32 = -601;
pub const CLASS_FONT_RUN: i32 = -602;

pub const FIELD_ACTIVE_DIAG: i32 = 1;
pub const FIELD_ACTIVE_PLOT: i32 = 3;
pub const FIELD_BG_COLOR: i32 = 8;
pub const FIELD_BOUNDS: i32 = 10;
pub const FIELD_COLOR: i32 = 23;
pub const FIELD_DCO: i32 = 34;
pub const FIELD_DDO: i32 = 38;
pub const FIELD_DESCRIPTION: i32 = 46;
pub const FIELD_FG_COLOR: i32 = 56;
pub const FIELD_HOW_GROW: i32 = 70;
pub const FIELD_LABEL: i32 = 83;
pub const FIELD_NAME: i32 = 101;
pub const FIELD_NODE_LIST: i32 = 103;
pub const FIELD_OBJ_FLAGS: i32 = 110;
pub const FIELD_PART_ID: i32 = 120;
pub const FIELD_PARTS_LIST: i32 = 122;
pub const FIELD_TEXT_REC: i32 = 197;

pub const TEXT_HAIR_FLAGS: i32 = 1;
pub const TEXT_HAIR_MODE: i32 = 2;
pub const TEXT_HAIR_TEXT: i32 = 3;
pub const TEXT_HAIR_VIEW: i32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemTag {
    Object,
    Array,
    Reference,
    ArrayElement,
    RootObject,
}

impl SystemTag {
    pub fn from_raw(tag: i32) -> Option<Self> {
        match tag {
            SYSTEM_OBJECT => Some(SystemTag::Object),
            SYSTEM_ARRAY => Some(SystemTag::Array),
            SYSTEM_REFERENCE => Some(SystemTag::Reference),
            SYSTEM_ARRAY_ELEMENT => Some(SystemTag::ArrayElement),
            SYSTEM_ROOT_OBJECT => Some(SystemTag::RootObject),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SystemTag::Object => "object",
            SystemTag::Array => "array",
            SystemTag::Reference => "reference",
            SystemTag::ArrayElement => "arrayElement",
            SystemTag::RootObject => "rootObject",
        }
    }
}

/// Class id carried by a node's class attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectClass {
    Generic,
    PrFont,
    TextHair,
    FontRun,
    /// A class with no field numbering of its own here
    Other(i32),
}

impl ObjectClass {
    pub fn from_raw(class: i32) -> Self {
        match class {
            CLASS_GENERIC => ObjectClass::Generic,
            CLASS_PR_FONT => ObjectClass::PrFont,
            CLASS_TEXT_HAIR => ObjectClass::TextHair,
            CLASS_FONT_RUN => ObjectClass::FontRun,
            other => ObjectClass::Other(other),
        }
    }
}

/// Fields shared by every object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldTag {
    ActiveDiag,
    ActivePlot,
    BgColor,
    Bounds,
    Color,
    Dco,
    Ddo,
    Description,
    FgColor,
    HowGrow,
    Label,
    Name,
    NodeList,
    ObjFlags,
    PartId,
    PartsList,
    TextRec,
}

impl FieldTag {
    pub fn from_raw(tag: i32) -> Option<Self> {
        Some(match tag {
            FIELD_ACTIVE_DIAG => FieldTag::ActiveDiag,
            FIELD_ACTIVE_PLOT => FieldTag::ActivePlot,
            FIELD_BG_COLOR => FieldTag::BgColor,
            FIELD_BOUNDS => FieldTag::Bounds,
            FIELD_COLOR => FieldTag::Color,
            FIELD_DCO => FieldTag::Dco,
            FIELD_DDO => FieldTag::Ddo,
            FIELD_DESCRIPTION => FieldTag::Description,
            FIELD_FG_COLOR => FieldTag::FgColor,
            FIELD_HOW_GROW => FieldTag::HowGrow,
            FIELD_LABEL => FieldTag::Label,
            FIELD_NAME => FieldTag::Name,
            FIELD_NODE_LIST => FieldTag::NodeList,
            FIELD_OBJ_FLAGS => FieldTag::ObjFlags,
            FIELD_PART_ID => FieldTag::PartId,
            FIELD_PARTS_LIST => FieldTag::PartsList,
            FIELD_TEXT_REC => FieldTag::TextRec,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldTag::ActiveDiag => "activeDiag",
            FieldTag::ActivePlot => "activePlot",
            FieldTag::BgColor => "bgColor",
            FieldTag::Bounds => "bounds",
            FieldTag::Color => "color",
            FieldTag::Dco => "dco",
            FieldTag::Ddo => "ddo",
            FieldTag::Description => "description",
            FieldTag::FgColor => "fgColor",
            FieldTag::HowGrow => "howGrow",
            FieldTag::Label => "label",
            FieldTag::Name => "name",
            FieldTag::NodeList => "nodeList",
            FieldTag::ObjFlags => "objFlags",
            FieldTag::PartId => "partID",
            FieldTag::PartsList => "partsList",
            FieldTag::TextRec => "textRec",
        }
    }
}

/// Fields of a text record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextHairTag {
    Flags,
    Mode,
    Text,
    View,
}

impl TextHairTag {
    pub fn name(&self) -> &'static str {
        match self {
            TextHairTag::Flags => "flags",
            TextHairTag::Mode => "mode",
            TextHairTag::Text => "text",
            TextHairTag::View => "view",
        }
    }
}

/// Semantic meaning of a heap tag in its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    System(SystemTag),
    Field(FieldTag),
    TextHair(TextHairTag),
    Unknown(i32),
}

impl Tag {
    pub fn name(&self) -> &'static str {
        match self {
            Tag::System(tag) => tag.name(),
            Tag::Field(tag) => tag.name(),
            Tag::TextHair(tag) => tag.name(),
            Tag::Unknown(_) => "unknown",
        }
    }

    pub fn is_text(&self) -> bool {
        *self == Tag::TextHair(TextHairTag::Text)
    }
}

/// What encloses a heap object, as far as classification cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentKind {
    Root,
    /// A node carrying a class attribute
    Class(ObjectClass),
    /// A node without a class attribute, by its own tag
    Node(Tag),
}

impl ParentKind {
    /// Derives the context from the parent object and the parent's own tag.
    /// The class attribute wins over the tag.
    pub fn of(parent: Option<(&HeapObject, Tag)>) -> Self {
        match parent {
            None => ParentKind::Root,
            Some((object, tag)) => match object.attribute(ATTR_CLASS) {
                Some(class) => ParentKind::Class(ObjectClass::from_raw(class)),
                None => ParentKind::Node(tag),
            },
        }
    }
}

/// Fields numbered by the class of their parent.
const CLASS_FIELDS: &[(ObjectClass, i32, Tag)] = &[
    (ObjectClass::TextHair, TEXT_HAIR_FLAGS, Tag::TextHair(TextHairTag::Flags)),
    (ObjectClass::TextHair, TEXT_HAIR_MODE, Tag::TextHair(TextHairTag::Mode)),
    (ObjectClass::TextHair, TEXT_HAIR_TEXT, Tag::TextHair(TextHairTag::Text)),
    (ObjectClass::TextHair, TEXT_HAIR_VIEW, Tag::TextHair(TextHairTag::View)),
];

/// Maps a raw tag and its parent context to a semantic tag. Never fails:
/// unrecognized combinations come back as [`Tag::Unknown`].
pub fn classify(tag: i32, parent: &ParentKind) -> Tag {
    if let Some(system) = SystemTag::from_raw(tag) {
        return Tag::System(system);
    }

    if let ParentKind::Class(class) = parent {
        if let Some((_, _, semantic)) = CLASS_FIELDS
            .iter()
            .find(|(owner, raw, _)| owner == class && *raw == tag)
        {
            return *semantic;
        }
    }

    match parent {
        ParentKind::Root => Tag::Unknown(tag),
        _ => FieldTag::from_raw(tag).map_or(Tag::Unknown(tag), Tag::Field),
    }
}
