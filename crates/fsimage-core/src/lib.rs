use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod error;
pub mod image;
pub mod namespace;
pub mod stats;
pub mod walk;

pub use error::{ImageError, Result, VarintError, WalkError};
pub use image::{ImageFile, Section, SectionTable};
pub use namespace::{DirectoryIndex, InodeIndex, LoadOptions, Namespace};
pub use stats::{FanOut, NameCount, NamespaceReport, DEFAULT_TOP_N};
pub use walk::{CancelFlag, TreeWalker, WalkConfig, WalkStats, WalkSummary};

/// Inode id of the namespace root
pub const ROOT_INODE_ID: u64 = 16385;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InodeKind {
    File,
    Directory,
    Symlink,
}

impl InodeKind {
    /// Map an INODE record's type code; anything that is not a file or a
    /// directory is treated as a symlink
    pub fn from_type_code(code: u64) -> Self {
        match code {
            1 => InodeKind::File,
            2 => InodeKind::Directory,
            _ => InodeKind::Symlink,
        }
    }
}

impl std::fmt::Display for InodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InodeKind::File => write!(f, "FILE"),
            InodeKind::Directory => write!(f, "DIRECTORY"),
            InodeKind::Symlink => write!(f, "SYMLINK"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    pub id: u64,
    /// Own name segment as raw bytes (not guaranteed UTF-8)
    pub name: Vec<u8>,
    pub kind: InodeKind,
}

/// Inodes per kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCounts {
    pub files: u64,
    pub directories: u64,
    pub symlinks: u64,
}

impl EntityCounts {
    pub fn record(&mut self, kind: InodeKind) {
        match kind {
            InodeKind::File => self.files += 1,
            InodeKind::Directory => self.directories += 1,
            InodeKind::Symlink => self.symlinks += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.files + self.directories + self.symlinks
    }
}

/// Open an image file and decode its namespace
pub fn open_namespace<P: AsRef<Path>>(path: P, options: &LoadOptions) -> Result<Namespace> {
    let path = path.as_ref();
    tracing::info!("📂 Opening image {}", path.display());

    let image = ImageFile::open(path)?;
    let namespace = Namespace::load(&image, options)?;

    let counts = namespace.counts();
    tracing::info!(
        "✅ Namespace decoded: {} inodes, {} directories with entries",
        counts.total(),
        namespace.directories().len()
    );
    Ok(namespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_codes() {
        assert_eq!(InodeKind::from_type_code(1), InodeKind::File);
        assert_eq!(InodeKind::from_type_code(2), InodeKind::Directory);
        assert_eq!(InodeKind::from_type_code(3), InodeKind::Symlink);
        assert_eq!(InodeKind::from_type_code(0), InodeKind::Symlink);
        assert_eq!(InodeKind::Directory.to_string(), "DIRECTORY");
    }

    #[test]
    fn test_counts_total() {
        let mut counts = EntityCounts::default();
        for kind in [
            InodeKind::File,
            InodeKind::File,
            InodeKind::Directory,
            InodeKind::File,
            InodeKind::Symlink,
        ] {
            counts.record(kind);
        }
        assert_eq!((counts.files, counts.directories, counts.symlinks), (3, 1, 1));
        assert_eq!(counts.total(), 5);
    }
}
