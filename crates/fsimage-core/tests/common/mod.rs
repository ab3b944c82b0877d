//! Synthetic image construction shared by the integration tests

#![allow(dead_code)]

use fsimage_core::image::varint::encode_varint;
use std::io::Write;
use tempfile::NamedTempFile;

pub const FILE: u64 = 1;
pub const DIRECTORY: u64 = 2;
pub const SYMLINK: u64 = 3;

const MAGIC: &[u8] = b"HDFSIMG1";

fn key(field: u64, wire_type: u64, buf: &mut Vec<u8>) {
    encode_varint((field << 3) | wire_type, buf);
}

fn varint_field(field: u64, value: u64, buf: &mut Vec<u8>) {
    key(field, 0, buf);
    encode_varint(value, buf);
}

fn bytes_field(field: u64, value: &[u8], buf: &mut Vec<u8>) {
    key(field, 2, buf);
    encode_varint(value.len() as u64, buf);
    buf.extend_from_slice(value);
}

fn frame(payload: &[u8], buf: &mut Vec<u8>) {
    encode_varint(payload.len() as u64, buf);
    buf.extend_from_slice(payload);
}

/// Builds an image byte-for-byte: magic, INODE, INODE_DIR, extra sections,
/// summary block, trailer
#[derive(Default)]
pub struct ImageBuilder {
    inodes: Vec<(u64, u64, Vec<u8>)>,
    declared_inodes: Option<u64>,
    dirs: Vec<(u64, Vec<u64>)>,
    extra_sections: Vec<(String, Vec<u8>)>,
    codec: Option<String>,
    omit_inode_dir: bool,
    truncate_inode_dir: usize,
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inode(mut self, kind: u64, id: u64, name: &str) -> Self {
        self.inodes.push((kind, id, name.as_bytes().to_vec()));
        self
    }

    pub fn dir(mut self, parent: u64, children: &[u64]) -> Self {
        self.dirs.push((parent, children.to_vec()));
        self
    }

    /// Override the inode count written in the INODE header
    pub fn declare_inodes(mut self, count: u64) -> Self {
        self.declared_inodes = Some(count);
        self
    }

    pub fn extra_section(mut self, name: &str, bytes: &[u8]) -> Self {
        self.extra_sections.push((name.to_string(), bytes.to_vec()));
        self
    }

    pub fn codec(mut self, codec: &str) -> Self {
        self.codec = Some(codec.to_string());
        self
    }

    pub fn without_inode_dir(mut self) -> Self {
        self.omit_inode_dir = true;
        self
    }

    /// Drop bytes from the end of the INODE_DIR section so its last record
    /// runs past the section
    pub fn truncate_inode_dir(mut self, bytes: usize) -> Self {
        self.truncate_inode_dir = bytes;
        self
    }

    fn inode_section(&self) -> Vec<u8> {
        let mut section = Vec::new();

        let last_id = self.inodes.iter().map(|(_, id, _)| *id).max().unwrap_or(0);
        let mut header = Vec::new();
        varint_field(1, last_id, &mut header);
        varint_field(
            2,
            self.declared_inodes.unwrap_or(self.inodes.len() as u64),
            &mut header,
        );
        frame(&header, &mut section);

        for (kind, id, name) in &self.inodes {
            let mut record = Vec::new();
            varint_field(1, *kind, &mut record);
            varint_field(2, *id, &mut record);
            bytes_field(3, name, &mut record);
            frame(&record, &mut section);
        }
        section
    }

    fn inode_dir_section(&self) -> Vec<u8> {
        let mut section = Vec::new();
        for (parent, children) in &self.dirs {
            let mut record = Vec::new();
            varint_field(1, *parent, &mut record);
            if !children.is_empty() {
                let mut packed = Vec::new();
                for &child in children {
                    encode_varint(child, &mut packed);
                }
                bytes_field(2, &packed, &mut record);
            }
            frame(&record, &mut section);
        }
        section.truncate(section.len().saturating_sub(self.truncate_inode_dir));
        section
    }

    pub fn build(&self) -> Vec<u8> {
        let mut image = MAGIC.to_vec();

        let mut sections: Vec<(String, Vec<u8>)> = vec![("INODE".to_string(), self.inode_section())];
        if !self.omit_inode_dir {
            sections.push(("INODE_DIR".to_string(), self.inode_dir_section()));
        }
        sections.extend(self.extra_sections.iter().cloned());

        let mut summary = Vec::new();
        varint_field(1, 1, &mut summary);
        varint_field(2, 47, &mut summary);
        if let Some(codec) = &self.codec {
            bytes_field(3, codec.as_bytes(), &mut summary);
        }
        for (name, bytes) in sections {
            let mut entry = Vec::new();
            bytes_field(1, name.as_bytes(), &mut entry);
            varint_field(2, bytes.len() as u64, &mut entry);
            varint_field(3, image.len() as u64, &mut entry);
            bytes_field(4, &entry, &mut summary);
            image.extend_from_slice(&bytes);
        }

        let mut block = Vec::new();
        frame(&summary, &mut block);
        image.extend_from_slice(&block);
        image.extend_from_slice(&(block.len() as i32).to_be_bytes());
        image
    }

    /// Write the image to a temporary file
    pub fn write(&self) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("create temp image");
        file.write_all(&self.build()).expect("write temp image");
        file.flush().expect("flush temp image");
        file
    }
}

/// /a/b.txt and /c.txt below the root
pub fn small_tree() -> ImageBuilder {
    ImageBuilder::new()
        .inode(DIRECTORY, 16385, "")
        .inode(DIRECTORY, 2, "a")
        .inode(FILE, 3, "b.txt")
        .inode(FILE, 4, "c.txt")
        .dir(16385, &[2, 4])
        .dir(2, &[3])
}
