//! Trailer and summary decoding
//!
//! The last [`TRAILER_LEN`] bytes of an image hold the big-endian length of
//! the summary block that sits immediately before them. The summary block is
//! a single framed `FileSummary` record listing every section of the image.

use byteorder::{BigEndian, ReadBytesExt};
use std::collections::HashMap;
use std::io::Cursor;

use super::framing::RecordReader;
use super::proto::{FileSummary, Section};
use crate::error::{ImageError, Result};

/// Size of the fixed trailer
pub const TRAILER_LEN: usize = 4;

/// Section holding the inode records
pub const INODE_SECTION: &str = "INODE";

/// Section holding the parent → children records
pub const INODE_DIR_SECTION: &str = "INODE_DIR";

/// Decoded summary: format versions and name → section lookup
#[derive(Debug, Clone)]
pub struct SectionTable {
    pub ondisk_version: u32,
    pub layout_version: u32,
    /// Sections in the order the summary lists them
    sections: Vec<Section>,
    by_name: HashMap<String, usize>,
}

impl SectionTable {
    pub fn from_summary(summary: FileSummary) -> Result<Self> {
        if let Some(codec) = summary.codec.filter(|c| !c.is_empty()) {
            return Err(ImageError::UnsupportedCodec(codec));
        }

        let mut by_name = HashMap::with_capacity(summary.sections.len());
        for (i, section) in summary.sections.iter().enumerate() {
            if by_name.insert(section.name.clone(), i).is_some() {
                tracing::warn!("Section '{}' listed more than once; using the last entry", section.name);
            }
        }

        Ok(SectionTable {
            ondisk_version: summary.ondisk_version,
            layout_version: summary.layout_version,
            sections: summary.sections,
            by_name,
        })
    }

    pub fn get(&self, name: &str) -> Option<&Section> {
        self.by_name.get(name).map(|&i| &self.sections[i])
    }

    /// Look up a section the caller cannot proceed without
    pub fn require(&self, name: &str) -> Result<&Section> {
        self.get(name)
            .ok_or_else(|| ImageError::MissingSection(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// Read the summary length from the trailer
pub fn read_summary_length(image: &[u8]) -> Result<u64> {
    let image_len = image.len() as u64;
    if image.len() < TRAILER_LEN {
        return Err(ImageError::InvalidTrailer {
            summary_len: 0,
            image_len,
        });
    }

    let mut cursor = Cursor::new(&image[image.len() - TRAILER_LEN..]);
    let summary_len = cursor.read_i32::<BigEndian>()? as i64;

    if summary_len < 0 || summary_len as u64 > image_len - TRAILER_LEN as u64 {
        return Err(ImageError::InvalidTrailer {
            summary_len,
            image_len,
        });
    }
    Ok(summary_len as u64)
}

/// Decode the trailer and summary of an image into its section table
pub fn locate_sections(image: &[u8]) -> Result<SectionTable> {
    let summary_len = read_summary_length(image)? as usize;
    let end = image.len() - TRAILER_LEN;
    let block = &image[end - summary_len..end];

    // The block is one framed record; anything after it is padding
    let mut reader = RecordReader::new(block);
    let summary: FileSummary = reader
        .next_message()?
        .ok_or_else(|| ImageError::decode("FileSummary", "summary block is empty"))?;

    if !reader.is_exhausted() {
        tracing::debug!("{} bytes follow the summary record", reader.remaining());
    }

    tracing::debug!(
        "Image summary: ondisk v{}, layout v{}, {} sections",
        summary.ondisk_version,
        summary.layout_version,
        summary.sections.len()
    );

    let table = SectionTable::from_summary(summary)?;

    // Every section must lie inside the region before the summary
    let data_end = (end - summary_len) as u64;
    for section in table.iter() {
        match section.offset.checked_add(section.length) {
            Some(section_end) if section_end <= data_end => {}
            _ => {
                return Err(ImageError::OutOfBounds {
                    offset: section.offset,
                    length: section.length,
                    image_len: image.len() as u64,
                })
            }
        }
    }

    Ok(table)
}
