//! Tree extender (component C): splices ghost nodes `X0/X1/X2/X3` onto
//! every non-root edge so that ancestral reconstruction yields a per-branch
//! posterior-probability matrix.
//!
//! Grounded on `original_source/ipk/src/extended_tree.cpp`
//! (`calc_ghost_branch_lengths`, `tree_extender::extend_subtree`).

use std::collections::HashMap;

use crate::error::{BuildError, Result};
use crate::tree::{Node, NodeId, PhyloTree};

/// Maps an extended-tree ghost label (`"<n>_X0"` / `"<n>_X1"`) to the
/// post-order id of the original node it was spliced onto.
pub type GhostMapping = HashMap<String, u32>;

/// Maps an extended-tree node label to the corresponding ACR-tree node
/// label (component C's AR-mapping, spec §3).
pub type ArMapping = HashMap<String, String>;

/// Total branch length of the subtree rooted at `node`, weighting each
/// internal branch by the number of leaves below it and excluding the
/// branch leading into `node` itself. Leaves contribute their own branch
/// length. Matches `total_branch_length` in the original's
/// `extended_tree.cpp`.
fn total_branch_length(tree: &PhyloTree, node: NodeId) -> f64 {
    if tree.is_leaf(node) {
        return 0.0;
    }
    let mut length = 0.0;
    for n in tree.subtree(node) {
        if tree.is_leaf(n) {
            length += tree.branch_length(n);
        } else {
            length += tree.num_leaves_in_subtree(n) as f64 * tree.branch_length(n);
        }
    }
    length -= tree.num_leaves_in_subtree(node) as f64 * tree.branch_length(node);
    length
}

/// Computes `(len(parent -> X0), len(X0 -> X1))` per spec §3's branch-length
/// policy.
fn calc_ghost_branch_lengths(tree: &PhyloTree, node: NodeId) -> (f64, f64) {
    let old_branch_length = tree.branch_length(node);
    let x0_len = old_branch_length / 2.0;
    let residual = old_branch_length - x0_len;
    let x1_len = if tree.is_leaf(node) {
        residual
    } else {
        let total = total_branch_length(tree, node);
        let num_leaves = tree.num_leaves_in_subtree(node) as f64;
        (total + residual * num_leaves) / num_leaves
    };
    (x0_len, x1_len)
}

/// Insert ghost nodes on every non-root edge of `original`, returning the
/// extended tree (re-indexed) and the ghost mapping.
///
/// `X2`/`X3` get a fixed branch length of `0.01`, per spec §3.
pub fn extend_tree(original: &PhyloTree) -> Result<(PhyloTree, GhostMapping)> {
    let mut extended = original.clone();
    let mut counter = original.len() as u32 + 1;
    let mut mapping = GhostMapping::new();

    // Process every original node (root excluded) using stats computed on
    // the untouched `original` tree; node ids are shared between `original`
    // and `extended` until the splicing below starts appending new nodes.
    for node in original.iter_postorder() {
        if original.parent(node).is_none() {
            continue;
        }
        let parent = original
            .parent(node)
            .expect("checked above: node is not the root");
        let old_branch_length = original.branch_length(node);
        let (x0_len, x1_len) = calc_ghost_branch_lengths(original, node);

        let x0_id = NodeId(extended.nodes.len() as u32);
        let x0_label = format!("{}_X0", counter);
        counter += 1;
        extended
            .nodes
            .push(Node::new(x0_label.clone(), Some(parent), x0_len));

        // Replace `node` with `x0` in the parent's child list.
        let parent_children = &mut extended.nodes[parent.0 as usize].children;
        let slot = parent_children
            .iter()
            .position(|&c| c == node)
            .ok_or_else(|| BuildError::internal("parent does not list node as a child"))?;
        parent_children[slot] = x0_id;

        let x1_id = NodeId(extended.nodes.len() as u32);
        let x1_label = format!("{}_X1", counter);
        counter += 1;
        extended
            .nodes
            .push(Node::new(x1_label.clone(), Some(x0_id), x1_len));

        extended.nodes[node.0 as usize].parent = Some(x0_id);
        extended.nodes[node.0 as usize].branch_length = old_branch_length - x0_len;
        extended.nodes[x0_id.0 as usize].children = vec![x1_id, node];

        let x2_id = NodeId(extended.nodes.len() as u32);
        extended
            .nodes
            .push(Node::new(format!("{}_X2", counter), Some(x1_id), 0.01));
        counter += 1;
        let x3_id = NodeId(extended.nodes.len() as u32);
        extended
            .nodes
            .push(Node::new(format!("{}_X3", counter), Some(x1_id), 0.01));
        counter += 1;
        extended.nodes[x1_id.0 as usize].children = vec![x2_id, x3_id];

        let orig_post = original.post_order_id(node);
        mapping.insert(x0_label, orig_post);
        mapping.insert(x1_label, orig_post);
    }

    extended.index();
    Ok((extended, mapping))
}

/// Build the AR-mapping between the extended tree and the ACR tool's own
/// (re-rooted) output tree. Both trees must share topology; only labels may
/// differ. Walked as a synchronized pre-order DFS.
pub fn build_ar_mapping(extended: &PhyloTree, ar_tree: &PhyloTree) -> Result<ArMapping> {
    if extended.len() != ar_tree.len() {
        return Err(BuildError::inconsistent_tree(format!(
            "extended tree has {} nodes but AR tree has {}",
            extended.len(),
            ar_tree.len()
        )));
    }

    let mut mapping = ArMapping::new();
    let mut stack = vec![(extended.root(), ar_tree.root())];
    while let Some((e, a)) = stack.pop() {
        let e_children = extended.children(e);
        let a_children = ar_tree.children(a);
        if e_children.len() != a_children.len() {
            return Err(BuildError::inconsistent_tree(format!(
                "topology mismatch at extended node '{}' (ar node '{}'): {} vs {} children",
                extended.label(e),
                ar_tree.label(a),
                e_children.len(),
                a_children.len()
            )));
        }
        mapping.insert(extended.label(e).to_string(), ar_tree.label(a).to_string());
        for (&ec, &ac) in e_children.iter().zip(a_children.iter()) {
            stack.push((ec, ac));
        }
    }
    Ok(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::PhyloTree;

    fn small_tree() -> PhyloTree {
        let mut t = PhyloTree::new_root("root");
        let a = t.add_child(t.root(), "A", 1.0).unwrap();
        let b = t.add_child(t.root(), "B", 2.0).unwrap();
        t.add_child(a, "A1", 0.5).unwrap();
        t.add_child(a, "A2", 0.5).unwrap();
        t.index();
        let _ = b;
        t
    }

    #[test]
    fn test_extend_adds_four_nodes_per_non_root_edge() {
        let original = small_tree();
        // non-root nodes: A, B, A1, A2 => 4 edges => 16 ghost nodes
        let (extended, _mapping) = extend_tree(&original).unwrap();
        assert_eq!(extended.len(), original.len() + 4 * 4);
    }

    #[test]
    fn test_ghost_mapping_resolves_to_original_postorder_id() {
        let original = small_tree();
        let a = original.get_by_label("A").unwrap();
        let a_post = original.post_order_id(a);
        let (extended, mapping) = extend_tree(&original).unwrap();

        let x0_label = extended
            .children(extended.parent(a).unwrap())
            .iter()
            .find(|&&c| extended.label(c).ends_with("_X0"))
            .map(|&c| extended.label(c).to_string());
        // `a`'s parent in the extended tree is its X0 ghost node.
        let x0 = extended.parent(a).unwrap();
        assert!(extended.label(x0).ends_with("_X0"));
        assert_eq!(mapping[extended.label(x0)], a_post);
        assert!(x0_label.is_some());
    }

    #[test]
    fn test_leaf_ghost_branch_length_is_half_original() {
        let original = small_tree();
        let a1 = original.get_by_label("A1").unwrap();
        let old_len = original.branch_length(a1);
        let (extended, _mapping) = extend_tree(&original).unwrap();
        let x0 = extended.parent(a1).unwrap();
        let x1 = extended
            .children(x0)
            .iter()
            .copied()
            .find(|&c| extended.label(c).ends_with("_X1"))
            .unwrap();
        assert!((extended.branch_length(x0) - old_len / 2.0).abs() < 1e-9);
        assert!((extended.branch_length(x1) - old_len / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_x2_x3_have_fixed_branch_length() {
        let original = small_tree();
        let a1 = original.get_by_label("A1").unwrap();
        let (extended, _mapping) = extend_tree(&original).unwrap();
        let x0 = extended.parent(a1).unwrap();
        let x1 = extended
            .children(x0)
            .iter()
            .copied()
            .find(|&c| extended.label(c).ends_with("_X1"))
            .unwrap();
        for &leaf in extended.children(x1) {
            assert!((extended.branch_length(leaf) - 0.01).abs() < 1e-9);
        }
    }

    #[test]
    fn test_ar_mapping_synchronized_dfs() {
        let original = small_tree();
        let (extended, _mapping) = extend_tree(&original).unwrap();
        // Use the extended tree itself, relabeled, as a stand-in "AR tree"
        // with identical topology but different labels.
        let mut ar_tree = extended.clone();
        for id in ar_tree.clone().iter_preorder() {
            let relabeled = format!("ar_{}", extended.label(id));
            ar_tree.relabel(id, relabeled);
        }
        ar_tree.index();
        let ar_mapping = build_ar_mapping(&extended, &ar_tree).unwrap();
        assert_eq!(ar_mapping.len(), extended.len());
        for id in extended.iter_preorder() {
            assert_eq!(ar_mapping[extended.label(id)], format!("ar_{}", extended.label(id)));
        }
    }

    #[test]
    fn test_ar_mapping_rejects_topology_mismatch() {
        let original = small_tree();
        let (extended, _mapping) = extend_tree(&original).unwrap();
        let mut ar_tree = extended.clone();
        // Break topology: add an extra child somewhere.
        let leaf = ar_tree
            .iter_preorder()
            .find(|&id| ar_tree.is_leaf(id))
            .unwrap();
        ar_tree.add_child(leaf, "extra", 0.1).unwrap();
        ar_tree.index();
        assert!(build_ar_mapping(&extended, &ar_tree).is_err());
    }
}
