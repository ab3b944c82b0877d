//! Depth-first enumeration of one subtree with an explicit stack

use crossbeam_channel::Sender;
use std::collections::HashSet;
use std::time::Instant;

use super::{CancelFlag, WalkStats};
use crate::namespace::{DirectoryIndex, InodeIndex};

/// Steps between cancellation/deadline checks
const CHECK_INTERVAL: u64 = 256;

enum Step {
    /// Append the node's name and either emit it or descend
    Enter(u64),
    /// Pop the directory entered last
    Leave,
}

/// Result of walking one top-level subtree
#[derive(Debug, Default)]
pub(crate) struct TaskOutcome {
    pub stats: WalkStats,
    /// The walk stopped early (cancelled, timed out, or consumer gone)
    pub stopped: bool,
}

/// Read-only context shared by every task of a walk
pub(crate) struct SubtreeWalk<'a> {
    /// Root of the whole walk; a link back to it is a cycle
    pub root_id: u64,
    pub inodes: &'a InodeIndex,
    pub directories: &'a DirectoryIndex,
    pub cancel: &'a CancelFlag,
    pub deadline: Option<Instant>,
}

impl SubtreeWalk<'_> {
    /// Whether the walk should stop; trips the cancel flag on timeout
    pub fn should_stop(&self) -> bool {
        if self.cancel.is_cancelled() {
            return true;
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                tracing::warn!("Walk deadline reached, cancelling");
                self.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Emit every leaf path below `top` (a child of the root), pre-order,
    /// siblings in recorded order
    pub fn run(&self, top: u64, paths: &Sender<Vec<u8>>) -> TaskOutcome {
        let mut outcome = TaskOutcome::default();
        outcome.stats.subtrees = 1;

        let mut stack = vec![Step::Enter(top)];
        let mut path: Vec<u8> = Vec::new();
        // path length before each entered directory's segment
        let mut marks: Vec<usize> = Vec::new();
        // entered directories, innermost last
        let mut chain: Vec<u64> = Vec::new();
        let mut ancestors: HashSet<u64> = HashSet::from([self.root_id]);
        let mut steps: u64 = 0;

        while let Some(step) = stack.pop() {
            steps += 1;
            if steps % CHECK_INTERVAL == 0 && self.should_stop() {
                outcome.stopped = true;
                return outcome;
            }

            let id = match step {
                Step::Leave => {
                    if let Some(dir) = chain.pop() {
                        ancestors.remove(&dir);
                    }
                    if let Some(mark) = marks.pop() {
                        path.truncate(mark);
                    }
                    continue;
                }
                Step::Enter(id) => id,
            };

            if ancestors.contains(&id) {
                outcome.stats.cycles_skipped += 1;
                tracing::warn!(
                    "Inode {} is its own ancestor below {}; not descending",
                    id,
                    String::from_utf8_lossy(&path)
                );
                continue;
            }

            let mark = path.len();
            path.push(b'/');
            match self.inodes.name(id) {
                Some(name) => path.extend_from_slice(name),
                None => {
                    outcome.stats.unresolved_ids += 1;
                    tracing::warn!("Inode {} has no INODE record; using an empty name", id);
                }
            }

            match self.directories.children(id) {
                Some(children) if !children.is_empty() => {
                    marks.push(mark);
                    chain.push(id);
                    ancestors.insert(id);
                    stack.push(Step::Leave);
                    stack.extend(children.iter().rev().map(|&child| Step::Enter(child)));
                }
                _ => {
                    // Blocks while the channel is full
                    if paths.send(path.clone()).is_err() {
                        outcome.stopped = true;
                        return outcome;
                    }
                    outcome.stats.paths += 1;
                    path.truncate(mark);
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Inode, InodeKind, ROOT_INODE_ID};
    use crossbeam_channel::unbounded;

    fn inode(id: u64, name: &str, kind: InodeKind) -> Inode {
        Inode {
            id,
            name: name.as_bytes().to_vec(),
            kind,
        }
    }

    fn collect(walk: &SubtreeWalk<'_>, top: u64) -> (Vec<String>, TaskOutcome) {
        let (tx, rx) = unbounded();
        let outcome = walk.run(top, &tx);
        drop(tx);
        let paths = rx
            .iter()
            .map(|p| String::from_utf8(p).unwrap())
            .collect();
        (paths, outcome)
    }

    #[test]
    fn test_preorder_sibling_order() {
        let inodes = InodeIndex::from_inodes(vec![
            inode(2, "a", InodeKind::Directory),
            inode(3, "z.txt", InodeKind::File),
            inode(4, "sub", InodeKind::Directory),
            inode(5, "b.txt", InodeKind::File),
            inode(6, "m.txt", InodeKind::File),
        ])
        .unwrap();
        let dirs = DirectoryIndex::from_entries(vec![(2, vec![3, 4, 6]), (4, vec![5])]);
        let cancel = CancelFlag::new();
        let walk = SubtreeWalk {
            root_id: ROOT_INODE_ID,
            inodes: &inodes,
            directories: &dirs,
            cancel: &cancel,
            deadline: None,
        };

        let (paths, outcome) = collect(&walk, 2);
        assert_eq!(paths, vec!["/a/z.txt", "/a/sub/b.txt", "/a/m.txt"]);
        assert_eq!(outcome.stats.paths, 3);
        assert!(!outcome.stopped);
    }

    #[test]
    fn test_empty_directory_is_leaf() {
        let inodes = InodeIndex::from_inodes(vec![inode(2, "empty", InodeKind::Directory)]).unwrap();
        let dirs = DirectoryIndex::from_entries(vec![(2, vec![])]);
        let cancel = CancelFlag::new();
        let walk = SubtreeWalk {
            root_id: ROOT_INODE_ID,
            inodes: &inodes,
            directories: &dirs,
            cancel: &cancel,
            deadline: None,
        };

        let (paths, _) = collect(&walk, 2);
        assert_eq!(paths, vec!["/empty"]);
    }

    #[test]
    fn test_unresolved_child_gets_empty_segment() {
        let inodes = InodeIndex::from_inodes(vec![inode(2, "a", InodeKind::Directory)]).unwrap();
        let dirs = DirectoryIndex::from_entries(vec![(2, vec![99])]);
        let cancel = CancelFlag::new();
        let walk = SubtreeWalk {
            root_id: ROOT_INODE_ID,
            inodes: &inodes,
            directories: &dirs,
            cancel: &cancel,
            deadline: None,
        };

        let (paths, outcome) = collect(&walk, 2);
        assert_eq!(paths, vec!["/a/"]);
        assert_eq!(outcome.stats.unresolved_ids, 1);
    }

    #[test]
    fn test_cycle_is_skipped() {
        let inodes = InodeIndex::from_inodes(vec![
            inode(2, "a", InodeKind::Directory),
            inode(3, "b", InodeKind::Directory),
            inode(4, "f", InodeKind::File),
        ])
        .unwrap();
        let dirs = DirectoryIndex::from_entries(vec![(2, vec![3]), (3, vec![2, 4])]);
        let cancel = CancelFlag::new();
        let walk = SubtreeWalk {
            root_id: ROOT_INODE_ID,
            inodes: &inodes,
            directories: &dirs,
            cancel: &cancel,
            deadline: None,
        };

        let (paths, outcome) = collect(&walk, 2);
        assert_eq!(paths, vec!["/a/b/f"]);
        assert_eq!(outcome.stats.cycles_skipped, 1);
    }

    #[test]
    fn test_disconnected_consumer_stops_task() {
        let inodes = InodeIndex::from_inodes(vec![inode(2, "f", InodeKind::File)]).unwrap();
        let dirs = DirectoryIndex::default();
        let cancel = CancelFlag::new();
        let walk = SubtreeWalk {
            root_id: ROOT_INODE_ID,
            inodes: &inodes,
            directories: &dirs,
            cancel: &cancel,
            deadline: None,
        };

        let (tx, rx) = unbounded();
        drop(rx);
        let outcome = walk.run(2, &tx);
        assert!(outcome.stopped);
        assert_eq!(outcome.stats.paths, 0);
    }

    #[test]
    fn test_link_back_to_root_is_a_cycle() {
        // / ── a/ ── (root again)
        let inodes = InodeIndex::from_inodes(vec![
            inode(ROOT_INODE_ID, "", InodeKind::Directory),
            inode(2, "a", InodeKind::Directory),
            inode(3, "b", InodeKind::File),
        ])
        .unwrap();
        let dirs = DirectoryIndex::from_entries(vec![(ROOT_INODE_ID, vec![2, 3]), (2, vec![ROOT_INODE_ID])]);
        let cancel = CancelFlag::new();
        let walk = SubtreeWalk {
            root_id: ROOT_INODE_ID,
            inodes: &inodes,
            directories: &dirs,
            cancel: &cancel,
            deadline: None,
        };

        let (paths, outcome) = collect(&walk, 2);
        assert!(paths.is_empty());
        assert_eq!(outcome.stats.cycles_skipped, 1);
    }
}
