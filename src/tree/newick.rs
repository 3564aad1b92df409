//! Newick parsing and serialization.
//!
//! Out of the core's scope per spec §1 ("FASTA/Newick file I/O formats
//! themselves... only the semantic contract matters") — this module exists
//! only as the thin glue the demo binary and integration tests need to turn
//! a `.newick` string into a [`PhyloTree`] and back. It is intentionally
//! minimal: no NHX annotations, no quoted labels, no comments.

use crate::error::{BuildError, Result};
use crate::tree::{NodeId, PhyloTree};

/// Parse a Newick string into a [`PhyloTree`]. Does not reroot trifurcating
/// roots; call [`PhyloTree::reroot_trifurcating`] explicitly if
/// `use_unrooted` was requested.
pub fn parse(newick: &str) -> Result<PhyloTree> {
    let trimmed = newick.trim().trim_end_matches(';').trim();
    if trimmed.is_empty() {
        return Err(BuildError::invalid_input("empty newick string"));
    }

    let mut parser = Parser {
        chars: trimmed.chars().collect(),
        pos: 0,
    };
    let (label, branch_length, children) = parser.parse_node()?;
    if parser.pos != parser.chars.len() {
        return Err(BuildError::invalid_input(
            "trailing characters after root node in newick string",
        ));
    }

    let mut tree = PhyloTree::new_root(label);
    tree.set_branch_length(tree.root(), branch_length.unwrap_or(0.0));
    attach_children(&mut tree, tree.root(), children)?;
    tree.index();
    Ok(tree)
}

/// Intermediate parsed node before it is inserted into the tree's arena.
struct ParsedNode {
    label: String,
    branch_length: Option<f64>,
    children: Vec<ParsedNode>,
}

fn attach_children(tree: &mut PhyloTree, parent: NodeId, children: Vec<ParsedNode>) -> Result<()> {
    for child in children {
        let id = tree.add_child(parent, child.label, child.branch_length.unwrap_or(0.0))?;
        attach_children(tree, id, child.children)?;
    }
    Ok(())
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    /// Parses one node: `(children)label:branch_length`, where both the
    /// child list and the label/branch-length suffix are optional (a leaf
    /// has no child list; the root may have no branch length).
    fn parse_node(&mut self) -> Result<(String, Option<f64>, Vec<ParsedNode>)> {
        let mut children = Vec::new();
        if self.peek() == Some('(') {
            self.pos += 1;
            loop {
                let (label, branch_length, grandchildren) = self.parse_node()?;
                children.push(ParsedNode {
                    label,
                    branch_length,
                    children: grandchildren,
                });
                match self.peek() {
                    Some(',') => {
                        self.pos += 1;
                    }
                    Some(')') => {
                        self.pos += 1;
                        break;
                    }
                    _ => {
                        return Err(BuildError::invalid_input(
                            "unterminated child list in newick string",
                        ))
                    }
                }
            }
        }

        let label = self.parse_text();
        let branch_length = if self.peek() == Some(':') {
            self.pos += 1;
            let text = self.parse_number_text();
            Some(text.parse::<f64>().map_err(|_| {
                BuildError::invalid_input(format!("invalid branch length: {text}"))
            })?)
        } else {
            None
        };

        Ok((label, branch_length, children))
    }

    fn parse_text(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c == '(' || c == ')' || c == ',' || c == ':' || c == ';' {
                break;
            }
            out.push(c);
            self.pos += 1;
        }
        out
    }

    fn parse_number_text(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c == '(' || c == ')' || c == ',' || c == ':' || c == ';' {
                break;
            }
            out.push(c);
            self.pos += 1;
        }
        out
    }
}

/// Serialize a tree back to a Newick string, in the subtree's child order.
pub fn to_newick(tree: &PhyloTree) -> String {
    let mut out = String::new();
    write_node(tree, tree.root(), &mut out);
    out.push(';');
    out
}

fn write_node(tree: &PhyloTree, id: NodeId, out: &mut String) {
    let children = tree.children(id);
    if !children.is_empty() {
        out.push('(');
        for (i, &child) in children.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            write_node(tree, child, out);
        }
        out.push(')');
    }
    out.push_str(tree.label(id));
    out.push(':');
    out.push_str(&format!("{}", tree.branch_length(id)));
}
