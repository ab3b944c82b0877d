//! Directory index: parent id → ordered child ids from the INODE_DIR section

use std::collections::HashMap;

use crate::error::Result;
use crate::image::{DirEntry, RecordReader};

/// Children of every directory, in the order the image records them
#[derive(Debug, Default)]
pub struct DirectoryIndex {
    children: HashMap<u64, Vec<u64>>,
    /// Parents that appeared more than once, in encounter order
    duplicate_parents: Vec<u64>,
    /// Child ids read from the section, superseded records included
    edges_recorded: u64,
}

impl DirectoryIndex {
    /// Build the index from the bytes of the INODE_DIR section
    ///
    /// The section has no count header: records are read until the section
    /// is consumed. A parent listed twice keeps its later child list.
    pub fn build(section: &[u8]) -> Result<Self> {
        let mut index = DirectoryIndex::default();
        let mut reader = RecordReader::new(section);

        while let Some(entry) = reader.next_message::<DirEntry>()? {
            index.insert(entry.parent, entry.children);
        }

        if !index.duplicate_parents.is_empty() {
            tracing::warn!(
                "⚠️  {} parent ids listed more than once in INODE_DIR; later entries replaced earlier ones",
                index.duplicate_parents.len()
            );
        }

        tracing::info!(
            "Indexed {} directories with {} child links",
            index.len(),
            index.edge_count()
        );

        Ok(index)
    }

    /// Build an index from (parent, children) pairs
    pub fn from_entries<I: IntoIterator<Item = (u64, Vec<u64>)>>(entries: I) -> Self {
        let mut index = DirectoryIndex::default();
        for (parent, children) in entries {
            index.insert(parent, children);
        }
        index
    }

    fn insert(&mut self, parent: u64, children: Vec<u64>) {
        self.edges_recorded += children.len() as u64;
        if self.children.insert(parent, children).is_some() {
            tracing::debug!("Parent {} listed again in INODE_DIR", parent);
            self.duplicate_parents.push(parent);
        }
    }

    /// Children of `parent`; `None` when the id owns no entry
    pub fn children(&self, parent: u64) -> Option<&[u64]> {
        self.children.get(&parent).map(Vec::as_slice)
    }

    /// True when `id` has no children to descend into
    pub fn is_leaf(&self, id: u64) -> bool {
        self.children(id).map_or(true, <[u64]>::is_empty)
    }

    pub fn duplicate_parents(&self) -> &[u64] {
        &self.duplicate_parents
    }

    /// Child links currently held (sum of all child-list lengths)
    pub fn edge_count(&self) -> u64 {
        self.children.values().map(|c| c.len() as u64).sum()
    }

    /// Child ids read from the section, superseded records included
    pub fn edges_recorded(&self) -> u64 {
        self.edges_recorded
    }

    /// Number of parents with an entry
    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &[u64])> {
        self.children.iter().map(|(&parent, c)| (parent, c.as_slice()))
    }
}
