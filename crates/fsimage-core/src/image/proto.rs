//! Record payload decoding
//!
//! Every framed record in the image is a protobuf message. Only the handful
//! of fields needed to rebuild the namespace are read; anything else is
//! skipped by wire type. Field numbers follow the image schema:
//!
//! | message          | fields                                         |
//! |------------------|------------------------------------------------|
//! | `FileSummary`    | 1 ondiskVersion, 2 layoutVersion, 3 codec, 4 sections |
//! | `Section`        | 1 name, 2 length, 3 offset                     |
//! | `INodeSection`   | 1 lastInodeId, 2 numInodes                     |
//! | `INode`          | 1 type, 2 id, 3 name                           |
//! | `DirEntry`       | 1 parent, 2 children (packed or not)           |

use nom::combinator::map;
use nom::error::{Error as NomError, ErrorKind};
use nom::multi::length_data;
use nom::number::complete::{le_u32, le_u64};
use nom::IResult;

use super::varint::decode_varint;
use crate::error::{ImageError, Result};

/// Schema default for a missing inode `type` field
const DEFAULT_INODE_TYPE: u64 = 1;

/// A record type that can be decoded from one framed payload
pub trait Message: Sized {
    /// Name used in error messages
    const NAME: &'static str;

    fn decode(payload: &[u8]) -> Result<Self>;
}

/// Raw value of one field, by wire type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue<'a> {
    Varint(u64),
    Fixed64(u64),
    Bytes(&'a [u8]),
    Fixed32(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field<'a> {
    pub number: u32,
    pub value: FieldValue<'a>,
}

fn varint(input: &[u8]) -> IResult<&[u8], u64> {
    match decode_varint(input) {
        Ok((value, consumed)) => Ok((&input[consumed..], value)),
        Err(_) => Err(nom::Err::Error(NomError::new(input, ErrorKind::TooLarge))),
    }
}

fn field(input: &[u8]) -> IResult<&[u8], Field<'_>> {
    let (input, key) = varint(input)?;
    let number = (key >> 3) as u32;
    let (input, value) = match key & 0x7 {
        0 => map(varint, FieldValue::Varint)(input)?,
        1 => map(le_u64::<&[u8], NomError<&[u8]>>, FieldValue::Fixed64)(input)?,
        2 => map(length_data(map(varint, |n| n as usize)), FieldValue::Bytes)(input)?,
        5 => map(le_u32::<&[u8], NomError<&[u8]>>, FieldValue::Fixed32)(input)?,
        _ => return Err(nom::Err::Failure(NomError::new(input, ErrorKind::Tag))),
    };
    Ok((input, Field { number, value }))
}

/// Iterates the fields of one encoded message
pub struct Fields<'a> {
    message: &'static str,
    rest: &'a [u8],
}

impl<'a> Fields<'a> {
    pub fn new(message: &'static str, payload: &'a [u8]) -> Self {
        Self {
            message,
            rest: payload,
        }
    }
}

impl<'a> Iterator for Fields<'a> {
    type Item = Result<Field<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        match field(self.rest) {
            Ok((rest, field)) => {
                self.rest = rest;
                Some(Ok(field))
            }
            Err(e) => {
                let remaining = self.rest.len();
                self.rest = &[];
                let kind = match e {
                    nom::Err::Error(inner) | nom::Err::Failure(inner) => inner.code,
                    nom::Err::Incomplete(_) => ErrorKind::Eof,
                };
                Some(Err(ImageError::decode(
                    self.message,
                    format!("unreadable field with {} bytes left ({:?})", remaining, kind),
                )))
            }
        }
    }
}

fn expect_varint(message: &'static str, field: &Field<'_>) -> Result<u64> {
    match field.value {
        FieldValue::Varint(v) => Ok(v),
        other => Err(ImageError::decode(
            message,
            format!("field {} should be a varint, found {:?}", field.number, other),
        )),
    }
}

fn expect_bytes<'a>(message: &'static str, field: &Field<'a>) -> Result<&'a [u8]> {
    match field.value {
        FieldValue::Bytes(b) => Ok(b),
        other => Err(ImageError::decode(
            message,
            format!("field {} should be length-delimited, found {:?}", field.number, other),
        )),
    }
}

fn expect_string(message: &'static str, field: &Field<'_>) -> Result<String> {
    let bytes = expect_bytes(message, field)?;
    String::from_utf8(bytes.to_vec())
        .map_err(|e| ImageError::decode(message, format!("field {} is not UTF-8: {}", field.number, e)))
}

/// A named byte range of the image
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Section {
    pub name: String,
    pub offset: u64,
    pub length: u64,
}

impl Message for Section {
    const NAME: &'static str = "Section";

    fn decode(payload: &[u8]) -> Result<Self> {
        let mut section = Section {
            name: String::new(),
            offset: 0,
            length: 0,
        };
        for field in Fields::new(Self::NAME, payload) {
            let field = field?;
            match field.number {
                1 => section.name = expect_string(Self::NAME, &field)?,
                2 => section.length = expect_varint(Self::NAME, &field)?,
                3 => section.offset = expect_varint(Self::NAME, &field)?,
                _ => {}
            }
        }
        Ok(section)
    }
}

/// The image summary: format versions and the section table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSummary {
    pub ondisk_version: u32,
    pub layout_version: u32,
    pub codec: Option<String>,
    pub sections: Vec<Section>,
}

impl Message for FileSummary {
    const NAME: &'static str = "FileSummary";

    fn decode(payload: &[u8]) -> Result<Self> {
        let mut summary = FileSummary::default();
        for field in Fields::new(Self::NAME, payload) {
            let field = field?;
            match field.number {
                1 => summary.ondisk_version = expect_varint(Self::NAME, &field)? as u32,
                2 => summary.layout_version = expect_varint(Self::NAME, &field)? as u32,
                3 => summary.codec = Some(expect_string(Self::NAME, &field)?),
                4 => summary
                    .sections
                    .push(Section::decode(expect_bytes(Self::NAME, &field)?)?),
                _ => {}
            }
        }
        Ok(summary)
    }
}

/// First record of the INODE section
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InodeSectionHeader {
    pub last_inode_id: u64,
    pub num_inodes: u64,
}

impl Message for InodeSectionHeader {
    const NAME: &'static str = "INodeSection";

    fn decode(payload: &[u8]) -> Result<Self> {
        let mut header = InodeSectionHeader::default();
        for field in Fields::new(Self::NAME, payload) {
            let field = field?;
            match field.number {
                1 => header.last_inode_id = expect_varint(Self::NAME, &field)?,
                2 => header.num_inodes = expect_varint(Self::NAME, &field)?,
                _ => {}
            }
        }
        Ok(header)
    }
}

/// One inode record: the fields needed for path reconstruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InodeRecord {
    pub type_code: u64,
    pub id: u64,
    pub name: Vec<u8>,
}

impl Message for InodeRecord {
    const NAME: &'static str = "INode";

    fn decode(payload: &[u8]) -> Result<Self> {
        let mut record = InodeRecord {
            type_code: DEFAULT_INODE_TYPE,
            id: 0,
            name: Vec::new(),
        };
        for field in Fields::new(Self::NAME, payload) {
            let field = field?;
            match field.number {
                1 => record.type_code = expect_varint(Self::NAME, &field)?,
                2 => record.id = expect_varint(Self::NAME, &field)?,
                3 => record.name = expect_bytes(Self::NAME, &field)?.to_vec(),
                // file/directory/symlink attribute blocks are not needed
                _ => {}
            }
        }
        Ok(record)
    }
}

/// One directory record: a parent and its children in stored order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirEntry {
    pub parent: u64,
    pub children: Vec<u64>,
}

impl Message for DirEntry {
    const NAME: &'static str = "DirEntry";

    fn decode(payload: &[u8]) -> Result<Self> {
        let mut entry = DirEntry::default();
        for field in Fields::new(Self::NAME, payload) {
            let field = field?;
            match (field.number, field.value) {
                (1, _) => entry.parent = expect_varint(Self::NAME, &field)?,
                (2, FieldValue::Varint(child)) => entry.children.push(child),
                (2, FieldValue::Bytes(mut packed)) => {
                    while !packed.is_empty() {
                        let (rest, child) = varint(packed).map_err(|_| {
                            ImageError::decode(Self::NAME, "truncated packed children list")
                        })?;
                        entry.children.push(child);
                        packed = rest;
                    }
                }
                (2, other) => {
                    return Err(ImageError::decode(
                        Self::NAME,
                        format!("children field has unexpected wire value {:?}", other),
                    ))
                }
                _ => {}
            }
        }
        Ok(entry)
    }
}
