//! Namespace reconstruction: the two indices built from an image
//!
//! The INODE and INODE_DIR sections occupy disjoint byte ranges, so their
//! indices are built concurrently. Once built, a [`Namespace`] is read-only
//! and can be shared by reference across walker threads.

mod directories;
mod inodes;

pub use directories::DirectoryIndex;
pub use inodes::InodeIndex;

use crate::error::{ImageError, Result};
use crate::image::{ImageFile, SectionTable, INODE_DIR_SECTION, INODE_SECTION};
use crate::walk::{TreeWalker, WalkConfig};
use crate::EntityCounts;

/// Options for building a namespace
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Fail when a parent id owns more than one INODE_DIR record instead of
    /// keeping the later one
    pub reject_duplicate_parents: bool,
}

/// Decoded namespace of one image
#[derive(Debug)]
pub struct Namespace {
    sections: SectionTable,
    inodes: InodeIndex,
    directories: DirectoryIndex,
}

impl Namespace {
    /// Locate the sections of `image` and build both indices
    pub fn load(image: &ImageFile, options: &LoadOptions) -> Result<Self> {
        let sections = image.sections()?;
        let inode_bytes = image.section_bytes(sections.require(INODE_SECTION)?)?;
        let dir_bytes = image.section_bytes(sections.require(INODE_DIR_SECTION)?)?;

        tracing::info!(
            "🔍 Decoding INODE ({} bytes) and INODE_DIR ({} bytes)",
            inode_bytes.len(),
            dir_bytes.len()
        );

        let (inodes, directories) = rayon::join(
            || InodeIndex::build(inode_bytes),
            || DirectoryIndex::build(dir_bytes),
        );
        let inodes = inodes?;
        let directories = directories?;

        if options.reject_duplicate_parents {
            if let Some(&parent) = directories.duplicate_parents().first() {
                return Err(ImageError::DuplicateParent(parent));
            }
        }

        Ok(Namespace {
            sections,
            inodes,
            directories,
        })
    }

    pub fn sections(&self) -> &SectionTable {
        &self.sections
    }

    pub fn inodes(&self) -> &InodeIndex {
        &self.inodes
    }

    pub fn directories(&self) -> &DirectoryIndex {
        &self.directories
    }

    pub fn counts(&self) -> EntityCounts {
        self.inodes.counts()
    }

    /// A walker over this namespace from the well-known root
    pub fn walker(&self, config: WalkConfig) -> TreeWalker<'_> {
        TreeWalker::new(&self.inodes, &self.directories, config)
    }
}
