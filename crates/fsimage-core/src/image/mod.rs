//! Image file access and the low-level binary layers

use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::path::{Path, PathBuf};

pub mod framing;
pub mod proto;
pub mod summary;
pub mod varint;

pub use framing::RecordReader;
pub use proto::{DirEntry, FileSummary, InodeRecord, InodeSectionHeader, Message, Section};
pub use summary::{SectionTable, INODE_DIR_SECTION, INODE_SECTION, TRAILER_LEN};

use crate::error::{ImageError, Result};

enum Backing {
    Mapped { _file: File, mmap: Mmap },
    Owned(Vec<u8>),
}

/// A read-only namespace image, memory-mapped for random-offset reads
pub struct ImageFile {
    backing: Backing,
    path: Option<PathBuf>,
}

impl ImageFile {
    /// Open and map an image file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let size = file.metadata()?.len();

        // Too short to hold a trailer; also avoids mapping an empty file
        if size < TRAILER_LEN as u64 {
            return Err(ImageError::InvalidTrailer {
                summary_len: 0,
                image_len: size,
            });
        }

        let mmap = unsafe { MmapOptions::new().map(&file)? };

        Ok(ImageFile {
            backing: Backing::Mapped { _file: file, mmap },
            path: Some(path.as_ref().to_path_buf()),
        })
    }

    /// Wrap an in-memory image
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        ImageFile {
            backing: Backing::Owned(bytes),
            path: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn as_bytes(&self) -> &[u8] {
        match &self.backing {
            Backing::Mapped { mmap, .. } => &mmap[..],
            Backing::Owned(bytes) => bytes.as_slice(),
        }
    }

    /// Size of the image in bytes
    pub fn len(&self) -> u64 {
        self.as_bytes().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Read a slice of bytes from the image
    pub fn read_bytes(&self, offset: u64, length: u64) -> Result<&[u8]> {
        let image_len = self.len();
        let out_of_bounds = ImageError::OutOfBounds {
            offset,
            length,
            image_len,
        };

        match offset.checked_add(length) {
            Some(end) if end <= image_len => Ok(&self.as_bytes()[offset as usize..end as usize]),
            _ => Err(out_of_bounds),
        }
    }

    /// Bytes of one section
    pub fn section_bytes(&self, section: &Section) -> Result<&[u8]> {
        self.read_bytes(section.offset, section.length)
    }

    /// Decode the trailer and summary into the section table
    pub fn sections(&self) -> Result<SectionTable> {
        summary::locate_sections(self.as_bytes())
    }
}

impl std::fmt::Debug for ImageFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageFile")
            .field("path", &self.path)
            .field("len", &self.len())
            .finish()
    }
}
