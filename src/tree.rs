//! Hierarchy builder for self-referencing tables
//!
//! Menus and departments are stored flat with a `parent_id` pointer. This
//! module turns such a flat list into a nested forest once per request:
//! one pass indexes children by parent id, a second pass moves every record
//! out of the arena into its parent. A record is moved at most once, so
//! cycles, self-parenting rows and duplicate ids terminate. Records that are
//! never reached from the root are handed back as orphans: a record whose
//! parent is absent from the input heads its own nested subtree, and only
//! members of a parent loop come back bare.

use std::collections::{HashMap, HashSet};

/// Parent id of top-level records
pub const ROOT_PARENT_ID: &str = "0";

/// A record carrying a self-referencing parent pointer
pub trait ParentLink {
    fn node_id(&self) -> &str;
    fn parent_id(&self) -> &str;
}

/// A record that can hold its own children
pub trait TreeNode: ParentLink + Sized {
    fn order_num(&self) -> i32;
    fn set_children(&mut self, children: Vec<Self>);
    fn take_children(&mut self) -> Vec<Self>;
}

/// Result of [`build_tree`]
#[derive(Debug)]
pub struct Forest<T> {
    /// Records reachable from the root, nested and ordered
    pub roots: Vec<T>,
    /// Records whose parent chain never reaches the root. Subtrees headed by
    /// a record with an absent parent come first, nested and ordered; cycle
    /// members follow unnested.
    pub orphans: Vec<T>,
}

impl<T> Forest<T> {
    pub fn has_orphans(&self) -> bool {
        !self.orphans.is_empty()
    }

    pub fn into_roots(self) -> Vec<T> {
        self.roots
    }
}

/// Build a forest from flat records.
///
/// Children are attached only when non-empty. Every sibling group is sorted
/// ascending by `order_num`; equal keys keep their input order.
pub fn build_tree<T: TreeNode>(items: Vec<T>, root_parent_id: &str) -> Forest<T> {
    let mut children_of: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, item) in items.iter().enumerate() {
        children_of
            .entry(item.parent_id().to_string())
            .or_default()
            .push(idx);
    }

    let known: HashSet<&str> = items.iter().map(|item| item.node_id()).collect();
    let dangling: Vec<usize> = items
        .iter()
        .enumerate()
        .filter(|(_, item)| item.parent_id() != root_parent_id && !known.contains(item.parent_id()))
        .map(|(idx, _)| idx)
        .collect();
    drop(known);

    let mut arena: Vec<Option<T>> = items.into_iter().map(Some).collect();
    let roots = attach(root_parent_id, &children_of, &mut arena);

    let mut orphans = Vec::new();
    for idx in dangling {
        let Some(mut node) = arena[idx].take() else {
            continue;
        };
        let id = node.node_id().to_string();
        let children = attach(&id, &children_of, &mut arena);
        if !children.is_empty() {
            node.set_children(children);
        }
        orphans.push(node);
    }
    orphans.sort_by_key(|node| node.order_num());
    orphans.extend(arena.into_iter().flatten());

    if !orphans.is_empty() {
        let ids: Vec<&str> = orphans.iter().map(|o| o.node_id()).collect();
        tracing::warn!(
            count = orphans.len(),
            ?ids,
            "Records unreachable from root '{}' (missing parent or cycle)",
            root_parent_id
        );
    }

    Forest { roots, orphans }
}

fn attach<T: TreeNode>(
    parent_id: &str,
    children_of: &HashMap<String, Vec<usize>>,
    arena: &mut [Option<T>],
) -> Vec<T> {
    let Some(indices) = children_of.get(parent_id) else {
        return Vec::new();
    };

    let mut level = Vec::with_capacity(indices.len());
    for &idx in indices {
        // An empty slot was already placed elsewhere in the forest
        let Some(mut node) = arena[idx].take() else {
            continue;
        };
        let id = node.node_id().to_string();
        let children = attach(&id, children_of, arena);
        if !children.is_empty() {
            node.set_children(children);
        }
        level.push(node);
    }

    level.sort_by_key(|node| node.order_num());
    level
}

/// Flatten a forest in pre-order, detaching children from every node
pub fn flatten_tree<T: TreeNode>(roots: Vec<T>) -> Vec<T> {
    let mut flat = Vec::new();
    let mut stack: Vec<T> = roots.into_iter().rev().collect();

    while let Some(mut node) = stack.pop() {
        let children = node.take_children();
        flat.push(node);
        stack.extend(children.into_iter().rev());
    }

    flat
}

/// Ancestor ids of `target_id`, nearest first, excluding the root sentinel
pub fn parent_ids<T: ParentLink>(items: &[T], target_id: &str) -> Vec<String> {
    let by_id: HashMap<&str, &T> = items.iter().map(|item| (item.node_id(), item)).collect();

    let mut chain = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut current: &str = target_id;
    seen.insert(current);

    while let Some(item) = by_id.get(current) {
        let parent = item.parent_id();
        if parent == ROOT_PARENT_ID || !seen.insert(parent) {
            break;
        }
        chain.push(parent.to_string());
        current = parent;
    }

    chain
}

/// Whether re-parenting `id` under `new_parent_id` would close a loop
pub fn would_create_cycle<T: ParentLink>(items: &[T], id: &str, new_parent_id: &str) -> bool {
    if new_parent_id == id {
        return true;
    }
    if new_parent_id == ROOT_PARENT_ID {
        return false;
    }
    parent_ids(items, new_parent_id).iter().any(|p| p == id)
}

/// `ancestors` value for a child of `parent_id`
pub fn ancestors_path(parent_id: &str, parent_ancestors: Option<&str>) -> String {
    match parent_ancestors {
        Some(ancestors) if parent_id != ROOT_PARENT_ID => format!("{},{}", ancestors, parent_id),
        _ => ROOT_PARENT_ID.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Debug, Clone, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Node {
        id: String,
        parent_id: String,
        order_num: i32,
        name: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        children: Vec<Node>,
    }

    impl ParentLink for Node {
        fn node_id(&self) -> &str {
            &self.id
        }

        fn parent_id(&self) -> &str {
            &self.parent_id
        }
    }

    impl TreeNode for Node {
        fn order_num(&self) -> i32 {
            self.order_num
        }

        fn set_children(&mut self, children: Vec<Self>) {
            self.children = children;
        }

        fn take_children(&mut self) -> Vec<Self> {
            std::mem::take(&mut self.children)
        }
    }

    fn node(id: &str, parent_id: &str, order_num: i32, name: &str) -> Node {
        Node {
            id: id.to_string(),
            parent_id: parent_id.to_string(),
            order_num,
            name: name.to_string(),
            children: Vec::new(),
        }
    }

    fn ids(nodes: &[Node]) -> Vec<&str> {
        nodes.iter().map(|n| n.id.as_str()).collect()
    }

    #[test]
    fn test_roots_ordered_and_children_attached() {
        let items = vec![
            node("1", "0", 2, "B"),
            node("2", "0", 1, "A"),
            node("3", "1", 1, "B-child"),
        ];

        let forest = build_tree(items, ROOT_PARENT_ID);
        assert!(!forest.has_orphans());

        let json = serde_json::to_value(&forest.roots).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"id": "2", "parentId": "0", "orderNum": 1, "name": "A"},
                {"id": "1", "parentId": "0", "orderNum": 2, "name": "B", "children": [
                    {"id": "3", "parentId": "1", "orderNum": 1, "name": "B-child"}
                ]}
            ])
        );
    }

    #[test]
    fn test_equal_order_keeps_input_order() {
        let items = vec![
            node("x", "0", 1, "first"),
            node("y", "0", 0, "zero"),
            node("z", "0", 1, "second"),
        ];
        let roots = build_tree(items, ROOT_PARENT_ID).into_roots();
        assert_eq!(ids(&roots), vec!["y", "x", "z"]);
    }

    #[test]
    fn test_missing_parent_reported_as_orphan() {
        let items = vec![
            node("1", "0", 1, "root"),
            node("2", "ghost", 1, "lost"),
            node("3", "2", 1, "lost-child"),
        ];
        let forest = build_tree(items, ROOT_PARENT_ID);
        assert_eq!(ids(&forest.roots), vec!["1"]);
        assert_eq!(ids(&forest.orphans), vec!["2"]);
        assert_eq!(ids(&forest.orphans[0].children), vec!["3"]);
    }

    #[test]
    fn test_detached_subtrees_keep_nesting_and_order() {
        let items = vec![
            node("page-b", "sub", 2, "page b"),
            node("sub", "hidden-dir", 3, "sub"),
            node("page-a", "sub", 1, "page a"),
            node("lone", "other-missing", 1, "lone"),
            node("loop-1", "loop-2", 1, "loop"),
            node("loop-2", "loop-1", 1, "loop"),
        ];
        let forest = build_tree(items, ROOT_PARENT_ID);
        assert!(forest.roots.is_empty());

        // Dangling heads sorted by order, cycle members appended bare
        assert_eq!(ids(&forest.orphans), vec!["lone", "sub", "loop-1", "loop-2"]);
        assert_eq!(ids(&forest.orphans[1].children), vec!["page-a", "page-b"]);
        assert!(forest.orphans[2].children.is_empty());
    }

    #[test]
    fn test_cycle_terminates() {
        let items = vec![
            node("a", "b", 1, "a"),
            node("b", "a", 1, "b"),
            node("c", "c", 1, "self"),
            node("r", "0", 1, "root"),
        ];
        let forest = build_tree(items, ROOT_PARENT_ID);
        assert_eq!(ids(&forest.roots), vec!["r"]);
        assert_eq!(forest.orphans.len(), 3);
    }

    #[test]
    fn test_record_with_root_id_is_placed_once() {
        let items = vec![node("0", "0", 1, "sentinel"), node("1", "0", 2, "child")];
        let forest = build_tree(items, ROOT_PARENT_ID);
        assert!(!forest.has_orphans());
        let flat = flatten_tree(forest.roots);
        assert_eq!(ids(&flat), vec!["0", "1"]);
    }

    #[test]
    fn test_duplicate_ids_do_not_duplicate_children() {
        let items = vec![
            node("p", "0", 1, "p1"),
            node("p", "0", 2, "p2"),
            node("c", "p", 1, "child"),
        ];
        let forest = build_tree(items, ROOT_PARENT_ID);
        let flat = flatten_tree(forest.roots);
        assert_eq!(flat.iter().filter(|n| n.id == "c").count(), 1);
        assert_eq!(flat.len(), 3);
    }

    #[test]
    fn test_flatten_restores_reachable_set() {
        let items = vec![
            node("1", "0", 1, "a"),
            node("2", "1", 2, "b"),
            node("3", "1", 1, "c"),
            node("4", "3", 1, "d"),
            node("5", "missing", 1, "orphan"),
        ];
        let forest = build_tree(items.clone(), ROOT_PARENT_ID);
        let mut flat_ids: Vec<String> = flatten_tree(forest.roots)
            .into_iter()
            .map(|n| n.id)
            .collect();
        flat_ids.sort();
        assert_eq!(flat_ids, vec!["1", "2", "3", "4"]);

        let flat = flatten_tree(build_tree(items, ROOT_PARENT_ID).roots);
        assert_eq!(ids(&flat), vec!["1", "3", "4", "2"]);
        assert!(flat.iter().all(|n| n.children.is_empty()));
    }

    #[test]
    fn test_parent_ids_and_cycles() {
        let items = vec![
            node("1", "0", 1, "a"),
            node("2", "1", 1, "b"),
            node("3", "2", 1, "c"),
        ];
        assert_eq!(parent_ids(&items, "3"), vec!["2", "1"]);
        assert!(parent_ids(&items, "1").is_empty());

        assert!(would_create_cycle(&items, "1", "3"));
        assert!(would_create_cycle(&items, "2", "2"));
        assert!(!would_create_cycle(&items, "3", "1"));
        assert!(!would_create_cycle(&items, "2", ROOT_PARENT_ID));

        let looped = vec![node("a", "b", 1, "a"), node("b", "a", 1, "b")];
        assert_eq!(parent_ids(&looped, "a"), vec!["b"]);
    }

    #[test]
    fn test_ancestors_path() {
        assert_eq!(ancestors_path(ROOT_PARENT_ID, None), "0");
        assert_eq!(ancestors_path("dept-001", Some("0")), "0,dept-001");
        assert_eq!(ancestors_path("d2", Some("0,dept-001")), "0,dept-001,d2");
    }
}
