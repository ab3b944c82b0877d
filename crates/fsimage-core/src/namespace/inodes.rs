//! INode index: id → (name, kind) built from the INODE section

use std::collections::HashMap;

use crate::error::{ImageError, Result};
use crate::image::{InodeRecord, InodeSectionHeader, RecordReader};
use crate::{EntityCounts, Inode, InodeKind};

/// Every inode of the image, keyed by id
#[derive(Debug, Default)]
pub struct InodeIndex {
    inodes: HashMap<u64, Inode>,
    counts: EntityCounts,
    last_inode_id: u64,
}

impl InodeIndex {
    /// Build the index from the bytes of the INODE section
    ///
    /// The first record is the section header; exactly `numInodes` inode
    /// records follow it. Bytes after the last declared record are ignored.
    pub fn build(section: &[u8]) -> Result<Self> {
        let mut reader = RecordReader::new(section);
        let header: InodeSectionHeader = reader
            .next_message()?
            .ok_or_else(|| ImageError::decode("INodeSection", "INODE section is empty"))?;

        tracing::debug!(
            "INODE header: {} inodes, last id {}",
            header.num_inodes,
            header.last_inode_id
        );

        // Every record needs at least one byte; don't trust the header for sizing
        let capacity = std::cmp::min(header.num_inodes, reader.remaining() as u64) as usize;
        let mut index = InodeIndex {
            inodes: HashMap::with_capacity(capacity),
            counts: EntityCounts::default(),
            last_inode_id: header.last_inode_id,
        };

        for found in 0..header.num_inodes {
            let record: InodeRecord = match reader.next_message()? {
                Some(record) => record,
                None => {
                    return Err(ImageError::InodeCountMismatch {
                        declared: header.num_inodes,
                        found,
                    })
                }
            };
            index.insert(record)?;
        }

        if !reader.is_exhausted() {
            tracing::debug!(
                "{} bytes after the last declared inode record ignored",
                reader.remaining()
            );
        }

        tracing::info!(
            "Indexed {} inodes ({} files, {} directories, {} symlinks)",
            index.len(),
            index.counts.files,
            index.counts.directories,
            index.counts.symlinks
        );

        Ok(index)
    }

    /// Build an index directly from inodes (no header count to honour)
    pub fn from_inodes<I: IntoIterator<Item = Inode>>(inodes: I) -> Result<Self> {
        let mut index = InodeIndex::default();
        for inode in inodes {
            index.last_inode_id = index.last_inode_id.max(inode.id);
            index.insert_inode(inode)?;
        }
        Ok(index)
    }

    fn insert(&mut self, record: InodeRecord) -> Result<()> {
        self.insert_inode(Inode {
            id: record.id,
            name: record.name,
            kind: InodeKind::from_type_code(record.type_code),
        })
    }

    fn insert_inode(&mut self, inode: Inode) -> Result<()> {
        let id = inode.id;
        let kind = inode.kind;
        if self.inodes.insert(id, inode).is_some() {
            return Err(ImageError::DuplicateInode(id));
        }
        self.counts.record(kind);
        Ok(())
    }

    pub fn get(&self, id: u64) -> Option<&Inode> {
        self.inodes.get(&id)
    }

    /// Own name of an inode, if the id resolves
    pub fn name(&self, id: u64) -> Option<&[u8]> {
        self.inodes.get(&id).map(|inode| inode.name.as_slice())
    }

    pub fn counts(&self) -> EntityCounts {
        self.counts
    }

    pub fn last_inode_id(&self) -> u64 {
        self.last_inode_id
    }

    pub fn len(&self) -> usize {
        self.inodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Inode> {
        self.inodes.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::varint::encode_varint;

    fn frame(payload: &[u8], buf: &mut Vec<u8>) {
        encode_varint(payload.len() as u64, buf);
        buf.extend_from_slice(payload);
    }

    fn header(num_inodes: u64) -> Vec<u8> {
        let mut buf = vec![0x08];
        encode_varint(num_inodes + 16385, &mut buf);
        buf.push(0x10);
        encode_varint(num_inodes, &mut buf);
        buf
    }

    fn inode(type_code: u64, id: u64, name: &str) -> Vec<u8> {
        let mut buf = vec![0x08];
        encode_varint(type_code, &mut buf);
        buf.push(0x10);
        encode_varint(id, &mut buf);
        buf.push(0x1A);
        encode_varint(name.len() as u64, &mut buf);
        buf.extend_from_slice(name.as_bytes());
        buf
    }

    fn section(num_inodes: u64, records: &[Vec<u8>]) -> Vec<u8> {
        let mut buf = Vec::new();
        frame(&header(num_inodes), &mut buf);
        for record in records {
            frame(record, &mut buf);
        }
        buf
    }

    #[test]
    fn test_counts_per_kind() {
        let bytes = section(
            5,
            &[
                inode(1, 10, "a"),
                inode(1, 11, "b"),
                inode(2, 12, "c"),
                inode(1, 13, "d"),
                inode(3, 14, "e"),
            ],
        );

        let index = InodeIndex::build(&bytes).unwrap();
        let counts = index.counts();
        assert_eq!(counts.files, 3);
        assert_eq!(counts.directories, 1);
        assert_eq!(counts.symlinks, 1);
        assert_eq!(counts.total(), 5);
        assert_eq!(index.len(), 5);
        assert_eq!(index.name(12), Some(&b"c"[..]));
        assert_eq!(index.get(14).map(|i| i.kind), Some(InodeKind::Symlink));
    }

    #[test]
    fn test_unknown_type_code_is_symlink() {
        let bytes = section(1, &[inode(7, 1, "odd")]);
        let index = InodeIndex::build(&bytes).unwrap();
        assert_eq!(index.get(1).unwrap().kind, InodeKind::Symlink);
    }

    #[test]
    fn test_stops_at_declared_count() {
        // Trailing bytes belong to no documented structure
        let mut bytes = section(1, &[inode(1, 1, "kept")]);
        bytes.extend_from_slice(&[0xFF, 0xFF, 0xFF]);

        let index = InodeIndex::build(&bytes).unwrap();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_fewer_records_than_declared() {
        let bytes = section(3, &[inode(1, 1, "a"), inode(1, 2, "b")]);
        assert!(matches!(
            InodeIndex::build(&bytes),
            Err(ImageError::InodeCountMismatch { declared: 3, found: 2 })
        ));
    }

    #[test]
    fn test_duplicate_id_is_error() {
        let bytes = section(2, &[inode(1, 5, "a"), inode(1, 5, "b")]);
        assert!(matches!(
            InodeIndex::build(&bytes),
            Err(ImageError::DuplicateInode(5))
        ));
    }

    #[test]
    fn test_empty_section() {
        assert!(InodeIndex::build(&[]).is_err());
    }
}
