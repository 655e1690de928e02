//! Newick parser and writer for time trees.
//!
//! Supports the standard Newick grammar:
//! ```text
//! tree     = subtree ';'
//! subtree  = '(' children ')' label | label
//! children = subtree (',' subtree)*
//! label    = name? (':' length)?
//! ```
//!
//! Every non-root node needs a branch length. Ages are derived from them:
//! the root sits at the largest root-to-tip distance and each node's age is
//! the root age minus its distance from the root.

use crate::tree::{NodeId, TimeTree, TreeNode};
use phylomc_core::{PhyloMcError, Result};

/// Ages this close to zero (relative to the root age) are snapped to zero so
/// that ultrametric input yields tips at exactly age 0.
const AGE_SNAP: f64 = 1e-9;

/// Parse a Newick string into a [`TimeTree`].
pub fn parse(input: &str) -> Result<TimeTree> {
    let mut parser = Parser::new(input.as_bytes());
    let root = parser.parse_tree()?;
    let Parser {
        mut nodes, lengths, ..
    } = parser;

    for node in &nodes {
        if node.is_tip() && node.name.is_none() {
            return Err(PhyloMcError::Parse(format!("tip {} has no name", node.id)));
        }
    }

    // Distance from the root, parents are allocated before their children.
    let mut depth = vec![0.0; nodes.len()];
    for id in 0..nodes.len() {
        if let Some(parent) = nodes[id].parent {
            let len = lengths[id].ok_or_else(|| {
                PhyloMcError::Parse(format!(
                    "missing branch length on node '{}'",
                    nodes[id].name.as_deref().unwrap_or("<internal>")
                ))
            })?;
            if len < 0.0 {
                return Err(PhyloMcError::Parse(format!("negative branch length {}", len)));
            }
            depth[id] = depth[parent] + len;
        }
    }
    let root_age = depth.iter().copied().fold(0.0, f64::max);
    for (node, d) in nodes.iter_mut().zip(&depth) {
        let age = root_age - d;
        node.age = if age.abs() <= AGE_SNAP * root_age.max(1.0) {
            0.0
        } else {
            age
        };
    }
    TimeTree::from_parts(nodes, root)
}

/// Serialize a [`TimeTree`] to a Newick string.
pub fn write(tree: &TimeTree) -> String {
    let mut buf = String::new();
    write_subtree(tree, tree.root(), &mut buf);
    buf.push(';');
    buf
}

fn write_subtree(tree: &TimeTree, id: NodeId, buf: &mut String) {
    let children = tree.children(id);
    if !children.is_empty() {
        buf.push('(');
        for (i, &child) in children.iter().enumerate() {
            if i > 0 {
                buf.push(',');
            }
            write_subtree(tree, child, buf);
        }
        buf.push(')');
    }
    if let Some(name) = tree.get_node(id).and_then(|n| n.name.as_deref()) {
        buf.push_str(name);
    }
    if let Some(len) = tree.branch_length(id) {
        buf.push(':');
        let s = format!("{:.10}", len);
        let s = s.trim_end_matches('0');
        let s = s.trim_end_matches('.');
        buf.push_str(s);
    }
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    nodes: Vec<TreeNode>,
    lengths: Vec<Option<f64>>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            pos: 0,
            nodes: Vec::new(),
            lengths: Vec::new(),
        }
    }

    fn parse_tree(&mut self) -> Result<NodeId> {
        self.skip_whitespace();
        let root = self.parse_subtree(None)?;
        self.skip_whitespace();
        if self.peek() != Some(b';') {
            return Err(PhyloMcError::Parse("expected ';' at end of Newick string".into()));
        }
        self.pos += 1;
        Ok(root)
    }

    fn parse_subtree(&mut self, parent: Option<NodeId>) -> Result<NodeId> {
        self.skip_whitespace();
        let id = self.alloc_node(parent);

        if self.peek() == Some(b'(') {
            self.pos += 1;
            let first_child = self.parse_subtree(Some(id))?;
            self.nodes[id].children.push(first_child);

            loop {
                self.skip_whitespace();
                if self.peek() == Some(b',') {
                    self.pos += 1;
                    let child = self.parse_subtree(Some(id))?;
                    self.nodes[id].children.push(child);
                } else {
                    break;
                }
            }
            self.skip_whitespace();
            if self.peek() != Some(b')') {
                return Err(PhyloMcError::Parse("expected ')' in Newick string".into()));
            }
            self.pos += 1;
        }

        self.parse_label(id)?;
        Ok(id)
    }

    fn parse_label(&mut self, id: NodeId) -> Result<()> {
        self.skip_whitespace();
        let name = self.parse_name();
        if !name.is_empty() {
            self.nodes[id].name = Some(name);
        }
        self.skip_whitespace();
        if self.peek() == Some(b':') {
            self.pos += 1;
            self.skip_whitespace();
            let len_str = self.parse_float_str();
            if len_str.is_empty() {
                return Err(PhyloMcError::Parse("expected number after ':'".into()));
            }
            let len: f64 = len_str.parse().map_err(|_| {
                PhyloMcError::Parse(format!("invalid branch length: '{}'", len_str))
            })?;
            self.lengths[id] = Some(len);
        }
        Ok(())
    }

    fn parse_name(&mut self) -> String {
        let start = self.pos;
        while let Some(b) = self.peek() {
            match b {
                b':' | b',' | b')' | b'(' | b';' | b' ' | b'\t' | b'\n' | b'\r' => break,
                _ => self.pos += 1,
            }
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    fn parse_float_str(&mut self) -> String {
        let start = self.pos;
        while let Some(b'0'..=b'9' | b'.' | b'-' | b'+' | b'e' | b'E') = self.peek() {
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    fn alloc_node(&mut self, parent: Option<NodeId>) -> NodeId {
        let id = self.nodes.len();
        let mut node = TreeNode::new(id, 0.0, None);
        node.parent = parent;
        self.nodes.push(node);
        self.lengths.push(None);
        id
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while let Some(b' ' | b'\t' | b'\n' | b'\r') = self.peek() {
            self.pos += 1;
        }
    }
}
