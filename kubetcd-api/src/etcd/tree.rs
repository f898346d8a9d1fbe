//! Hierarchical view over the flat etcd key space

use kubetcd_common::etcd::TreeNode;
use std::collections::BTreeMap;

#[derive(Default)]
struct Builder {
    has_value: bool,
    children: BTreeMap<String, Builder>,
}

/// Build the `/`-delimited tree for `keys`.
///
/// Leading, trailing and repeated slashes are ignored. A node is a directory
/// once it has a child and carries `has_value` when some key ends on it, so
/// `/a` and `/a/b` together make `a` both. Siblings come out sorted by name.
pub fn build_tree<S: AsRef<str>>(keys: &[S]) -> Vec<TreeNode> {
    let mut root = Builder::default();

    for key in keys {
        let mut node = &mut root;
        let mut walked = false;
        for segment in key.as_ref().split('/').filter(|s| !s.is_empty()) {
            node = node.children.entry(segment.to_string()).or_default();
            walked = true;
        }
        if walked {
            node.has_value = true;
        }
    }

    finish(root.children, "")
}

fn finish(children: BTreeMap<String, Builder>, parent_key: &str) -> Vec<TreeNode> {
    children
        .into_iter()
        .map(|(name, builder)| {
            let key = format!("{}/{}", parent_key, name);
            let children = finish(builder.children, &key);
            TreeNode {
                is_dir: !children.is_empty(),
                has_value: builder.has_value,
                name,
                key,
                children,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(nodes: &[TreeNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.name.as_str()).collect()
    }

    #[test]
    fn test_basic_tree() {
        let tree = build_tree(&["/a/b", "/a/c", "/x"]);

        assert_eq!(names(&tree), vec!["a", "x"]);

        let a = &tree[0];
        assert_eq!(a.key, "/a");
        assert!(a.is_dir);
        assert!(!a.has_value);
        assert_eq!(names(&a.children), vec!["b", "c"]);
        assert_eq!(a.children[0].key, "/a/b");
        assert!(a.children[0].has_value);
        assert!(!a.children[0].is_dir);

        let x = &tree[1];
        assert_eq!(x.key, "/x");
        assert!(!x.is_dir);
        assert!(x.has_value);
        assert!(x.children.is_empty());
    }

    #[test]
    fn test_key_that_is_also_a_directory() {
        let tree = build_tree(&["/registry/pods/default/web", "/registry/pods"]);

        let pods = &tree[0].children[0];
        assert_eq!(pods.key, "/registry/pods");
        assert!(pods.is_dir);
        assert!(pods.has_value);
    }

    #[test]
    fn test_siblings_sorted_regardless_of_input_order() {
        let tree = build_tree(&["/z", "/m/2", "/b", "/m/1"]);
        assert_eq!(names(&tree), vec!["b", "m", "z"]);
        assert_eq!(names(&tree[1].children), vec!["1", "2"]);
    }

    #[test]
    fn test_empty_segments_are_skipped() {
        let tree = build_tree(&["//a///b/", "a/b", "/"]);

        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].children.len(), 1);
        assert_eq!(tree[0].children[0].key, "/a/b");
        assert!(tree[0].children[0].has_value);
    }

    #[test]
    fn test_empty_input() {
        let keys: Vec<String> = vec![];
        assert!(build_tree(&keys).is_empty());
    }

    #[test]
    fn test_every_key_has_a_path() {
        let keys = [
            "/registry/services/specs/default/kubernetes",
            "/registry/services/endpoints/default/kubernetes",
            "/registry/namespaces/default",
            "compact_rev_key",
        ];
        let tree = build_tree(&keys);

        for key in keys {
            let mut level = &tree;
            let mut found = None;
            for segment in key.trim_matches('/').split('/') {
                let node = level
                    .iter()
                    .find(|n| n.name == segment)
                    .unwrap_or_else(|| panic!("missing segment {} of {}", segment, key));
                level = &node.children;
                found = Some(node);
            }
            assert!(found.unwrap().has_value, "{} should end on a value", key);
        }
    }
}
