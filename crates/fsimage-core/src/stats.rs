//! Namespace statistics: most common names and widest directories

use serde::Serialize;
use std::collections::HashMap;

use crate::namespace::{DirectoryIndex, Namespace};
use crate::walk::WalkStats;
use crate::{EntityCounts, ROOT_INODE_ID};

/// Entries kept in each ranking by default
pub const DEFAULT_TOP_N: usize = 10;

/// How many inodes share a name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameCount {
    pub name: String,
    pub count: u64,
}

/// Number of direct children of a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FanOut {
    pub parent: u64,
    pub children: u64,
}

/// Most frequent non-empty names, descending; ties by name ascending
pub fn top_names<'a, I>(names: I, n: usize) -> Vec<NameCount>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut freq: HashMap<&[u8], u64> = HashMap::new();
    for name in names {
        if !name.is_empty() {
            *freq.entry(name).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(&[u8], u64)> = freq.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
        .into_iter()
        .take(n)
        .map(|(name, count)| NameCount {
            name: String::from_utf8_lossy(name).into_owned(),
            count,
        })
        .collect()
}

/// Directories with the most children, descending; ties by parent id ascending
pub fn top_fanout(directories: &DirectoryIndex, n: usize) -> Vec<FanOut> {
    let mut ranked: Vec<FanOut> = directories
        .iter()
        .map(|(parent, children)| FanOut {
            parent,
            children: children.len() as u64,
        })
        .collect();
    ranked.sort_by(|a, b| b.children.cmp(&a.children).then_with(|| a.parent.cmp(&b.parent)));
    ranked.truncate(n);
    ranked
}

/// Everything reported about a decoded namespace
#[derive(Debug, Clone, Serialize)]
pub struct NamespaceReport {
    pub root_id: u64,
    pub ondisk_version: u32,
    pub layout_version: u32,
    pub counts: EntityCounts,
    pub total_inodes: u64,
    pub last_inode_id: u64,
    pub directories_with_entries: u64,
    pub child_links: u64,
    pub duplicate_parents: Vec<u64>,
    pub top_names: Vec<NameCount>,
    pub top_fanout: Vec<FanOut>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub walk: Option<WalkStats>,
}

impl NamespaceReport {
    pub fn build(namespace: &Namespace, top_n: usize) -> Self {
        let inodes = namespace.inodes();
        let directories = namespace.directories();

        NamespaceReport {
            root_id: ROOT_INODE_ID,
            ondisk_version: namespace.sections().ondisk_version,
            layout_version: namespace.sections().layout_version,
            counts: inodes.counts(),
            total_inodes: inodes.len() as u64,
            last_inode_id: inodes.last_inode_id(),
            directories_with_entries: directories.len() as u64,
            child_links: directories.edge_count(),
            duplicate_parents: directories.duplicate_parents().to_vec(),
            top_names: top_names(inodes.iter().map(|inode| inode.name.as_slice()), top_n),
            top_fanout: top_fanout(directories, top_n),
            walk: None,
        }
    }

    pub fn with_walk(mut self, stats: WalkStats) -> Self {
        self.walk = Some(stats);
        self
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl std::fmt::Display for NamespaceReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Root INode ID: {}", self.root_id)?;
        writeln!(f, "Image versions: ondisk {}, layout {}", self.ondisk_version, self.layout_version)?;
        writeln!(f, "Total Number of INodes: {}", self.total_inodes)?;
        writeln!(f, "Total Number of Files: {}", self.counts.files)?;
        writeln!(f, "Total Number of Directories: {}", self.counts.directories)?;
        writeln!(f, "Total Number of Symlinks: {}", self.counts.symlinks)?;
        writeln!(f, "Directories with entries: {}", self.directories_with_entries)?;
        writeln!(f, "Child links: {}", self.child_links)?;
        if !self.duplicate_parents.is_empty() {
            writeln!(f, "Duplicate parent entries: {}", self.duplicate_parents.len())?;
        }
        if let Some(walk) = &self.walk {
            writeln!(f, "No of Paths: {}", walk.paths)?;
            if walk.unresolved_ids > 0 {
                writeln!(f, "Unresolved ids: {}", walk.unresolved_ids)?;
            }
            if walk.cycles_skipped > 0 {
                writeln!(f, "Cyclic links skipped: {}", walk.cycles_skipped)?;
            }
        }

        writeln!(f)?;
        writeln!(f, "Top {} file names:", self.top_names.len())?;
        for entry in &self.top_names {
            writeln!(f, "  {:>10}  {}", entry.count, entry.name)?;
        }

        writeln!(f)?;
        writeln!(f, "Top {} directories by fan-out:", self.top_fanout.len())?;
        for entry in &self.top_fanout {
            writeln!(f, "  {:>10}  {}", entry.children, entry.parent)?;
        }
        Ok(())
    }
}
