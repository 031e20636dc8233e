//! Bounded-depth snapshots of a window subtree.
//!
//! A snapshot is an immutable value-object: one breadth-first capture
//! of a root's subtree at a point in time, never mutated across scan
//! cycles. Classification and mutation decisions are made against the
//! snapshot, then re-verified against the live window before acting.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::Instant;

use serde::Serialize;

use crate::Rect;
use crate::cache::IdentityCache;
use crate::system::{WindowHandle, WindowSystem};

/// One window as observed during a snapshot.
#[derive(Debug, Clone)]
pub struct WindowNode {
    pub handle: WindowHandle,
    pub pid: u32,
    pub class_name: String,
    pub text: String,
    pub rect: Option<Rect>,
    pub visible: bool,
    pub parent: WindowHandle,
    pub children: BTreeSet<WindowHandle>,
    pub last_seen: Instant,
}

/// A snapshot keyed by handle. `BTreeMap` keeps iteration order stable
/// so identical trees always classify identically.
pub type Snapshot = BTreeMap<WindowHandle, WindowNode>;

/// Captures a bounded-depth snapshot of `root`'s subtree.
///
/// Breadth-first with an explicit queue; `max_depth` levels below the
/// root are visited. Handles that die mid-walk are skipped, and an
/// enumeration failure on one node leaves that subtree childless
/// without aborting the walk. Returns an empty map if the root itself
/// is not live.
pub fn snapshot(
    sys: &dyn WindowSystem,
    cache: &IdentityCache,
    root: WindowHandle,
    max_depth: u32,
) -> Snapshot {
    let mut out = Snapshot::new();
    if root == 0 || !sys.is_window(root) {
        return out;
    }

    let max_depth = max_depth.max(1);
    let mut queue: VecDeque<(WindowHandle, u32)> = VecDeque::new();
    let mut visited: BTreeSet<WindowHandle> = BTreeSet::new();

    let Some(root_node) = observe(sys, cache, root, 0) else {
        return out;
    };
    out.insert(root, root_node);
    queue.push_back((root, 0));

    while let Some((parent, depth)) = queue.pop_front() {
        if !visited.insert(parent) {
            continue;
        }
        if depth >= max_depth {
            continue;
        }

        for child in sys.enumerate_children(parent) {
            if child == 0 || !sys.is_window(child) {
                continue;
            }
            let Some(node) = observe(sys, cache, child, parent) else {
                continue;
            };
            if let Some(parent_node) = out.get_mut(&parent) {
                parent_node.children.insert(child);
            }
            out.insert(child, node);
            queue.push_back((child, depth + 1));
        }
    }

    out
}

/// Reads one window through the cache into a node.
fn observe(
    sys: &dyn WindowSystem,
    cache: &IdentityCache,
    handle: WindowHandle,
    parent: WindowHandle,
) -> Option<WindowNode> {
    let info = cache.lookup(sys, handle)?;
    Some(WindowNode {
        handle,
        pid: info.pid,
        class_name: info.class_name,
        text: info.text,
        rect: info.rect,
        visible: info.visible,
        parent,
        children: BTreeSet::new(),
        last_seen: Instant::now(),
    })
}

/// Serializable window-tree node for diagnostics.
///
/// The engine only produces the in-memory structure; the caller decides
/// whether to pretty-print it, write it to disk, or drop it.
#[derive(Debug, Clone, Serialize)]
pub struct DumpNode {
    pub handle: WindowHandle,
    pub pid: u32,
    pub class: String,
    pub text: String,
    pub rect: Option<Rect>,
    pub visible: bool,
    pub children: Vec<DumpNode>,
}

/// Converts a snapshot into a nested diagnostic tree rooted at `root`.
pub fn dump_tree(snapshot: &Snapshot, root: WindowHandle) -> Option<DumpNode> {
    let node = snapshot.get(&root)?;
    Some(DumpNode {
        handle: node.handle,
        pid: node.pid,
        class: node.class_name.clone(),
        text: node.text.clone(),
        rect: node.rect,
        visible: node.visible,
        children: node
            .children
            .iter()
            .filter_map(|&child| dump_tree(snapshot, child))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeWindowSystem;
    use std::time::Duration;

    fn cache() -> IdentityCache {
        IdentityCache::new(Duration::from_millis(100))
    }

    #[test]
    fn snapshot_collects_the_whole_subtree() {
        // Arrange — the tree 1 → {2, 3}, 2 → {4}.
        let sys = FakeWindowSystem::new();
        sys.add_window(1, 100, "EVA_Window", "카카오톡", Some(Rect::new(0, 0, 600, 800)), true, 0);
        sys.add_window(2, 100, "EVA_ChildWindow", "OnlineMainView", Some(Rect::new(0, 0, 600, 700)), true, 1);
        sys.add_window(3, 100, "Chrome_WidgetWin_1", "AdFit", Some(Rect::new(0, 700, 600, 100)), true, 1);
        sys.add_window(4, 100, "EVA_ChildWindow", "Nested", Some(Rect::new(0, 0, 600, 600)), true, 2);

        // Act
        let snap = snapshot(&sys, &cache(), 1, 8);

        // Assert
        assert_eq!(snap.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert_eq!(snap[&1].children, BTreeSet::from([2, 3]));
        assert_eq!(snap[&2].children, BTreeSet::from([4]));
        assert!(snap[&3].children.is_empty());
    }

    #[test]
    fn snapshot_of_dead_root_is_empty() {
        let sys = FakeWindowSystem::new();
        assert!(snapshot(&sys, &cache(), 99, 8).is_empty());
    }

    #[test]
    fn snapshot_respects_max_depth() {
        // Chain 1 → 2 → 3 with depth 1: node 3 stays unvisited.
        let sys = FakeWindowSystem::new();
        sys.add_window(1, 100, "EVA_Window", "root", None, true, 0);
        sys.add_window(2, 100, "EVA_ChildWindow", "mid", None, true, 1);
        sys.add_window(3, 100, "EVA_ChildWindow", "leaf", None, true, 2);

        let snap = snapshot(&sys, &cache(), 1, 1);

        assert!(snap.contains_key(&2));
        assert!(!snap.contains_key(&3));
    }

    #[test]
    fn dead_child_leaves_subtree_childless() {
        let sys = FakeWindowSystem::new();
        sys.add_window(1, 100, "EVA_Window", "root", None, true, 0);
        sys.add_window(2, 100, "EVA_ChildWindow", "child", None, true, 1);
        sys.destroy_window(2);

        let snap = snapshot(&sys, &cache(), 1, 8);

        assert_eq!(snap.len(), 1);
        assert!(snap[&1].children.is_empty());
    }

    #[test]
    fn dump_tree_nests_children() {
        let sys = FakeWindowSystem::new();
        sys.add_window(1, 100, "EVA_Window", "카카오톡", None, true, 0);
        sys.add_window(2, 100, "EVA_ChildWindow", "OnlineMainView", None, true, 1);

        let snap = snapshot(&sys, &cache(), 1, 8);
        let tree = dump_tree(&snap, 1).unwrap();

        assert_eq!(tree.class, "EVA_Window");
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].text, "OnlineMainView");
    }
}
