//! Programmatic construction of a [DeviceTree].
//!
//! Boards and tests describe the tree node by node; [TreeBuilder::build]
//! then checks the nesting, indexes phandles and resolves references.

use crate::{
    node::{DeviceTree, Node, NodeType},
    prop::{Property, PropertyError},
};
use alloc::{boxed::Box, collections::btree_map::BTreeMap, vec, vec::Vec};

pub struct TreeBuilder {
    nodes: Vec<Node>,
    /// Path of open nodes, root at the bottom.
    stack: Vec<usize>,
    /// `end_node` was called with only the root open.
    unbalanced: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeError {
    /// `end_node` without `begin_node`, or nodes left open at `build`.
    UnbalancedNodes,
    DuplicatePhandle { phandle: u32 },
    Property(PropertyError),
}

impl From<PropertyError> for TreeError {
    fn from(value: PropertyError) -> Self {
        TreeError::Property(value)
    }
}

fn split_name(full_name: &str) -> (&str, &str) {
    match full_name.find('@') {
        Some(idx) => (&full_name[0..idx], &full_name[idx + 1..]),
        None => (full_name, ""),
    }
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder {
    /// Start a tree with an empty root node opened.
    pub fn new() -> TreeBuilder {
        let mut builder = TreeBuilder {
            nodes: vec![],
            stack: vec![],
            unbalanced: false,
        };
        builder.push_node("");
        builder
    }

    fn push_node(&mut self, full_name: &str) {
        let node_id = self.nodes.len();
        let parent_id = self.stack.last().copied().unwrap_or(node_id);
        let (node_name, unit_addr) = split_name(full_name);
        self.nodes.push(Node {
            node_id,
            parent_id,
            full_name: Box::from(full_name),
            node_name: Box::from(node_name),
            unit_addr: Box::from(unit_addr),
            children: vec![],
            props: vec![],
            phandle: None,
            node_type: NodeType::Description,
            references: vec![],
        });
        if parent_id != node_id {
            self.nodes[parent_id].children.push(node_id);
        }
        self.stack.push(node_id);
    }

    fn current(&mut self) -> &mut Node {
        let id = self.stack.last().copied().unwrap_or(0);
        &mut self.nodes[id]
    }

    /// Open a child of the current node; it becomes the current node.
    pub fn begin_node(&mut self, full_name: &str) -> &mut Self {
        self.push_node(full_name);
        self
    }

    /// Close the current node. The root stays open; trying to close it is
    /// recorded as an error reported by [TreeBuilder::build].
    pub fn end_node(&mut self) -> &mut Self {
        if self.stack.len() > 1 {
            self.stack.pop();
        } else {
            self.unbalanced = true;
        }
        self
    }

    /// Set a property of the current node, replacing one with the same name.
    pub fn prop(&mut self, prop: Property) -> &mut Self {
        let node = self.current();
        match node.props.iter_mut().find(|p| p.name == prop.name) {
            Some(old) => *old = prop,
            None => node.props.push(prop),
        }
        self
    }

    pub fn prop_empty(&mut self, name: &str) -> &mut Self {
        self.prop(Property::new_empty(name))
    }

    pub fn prop_u32(&mut self, name: &str, value: u32) -> &mut Self {
        self.prop(Property::new_u32(name, value))
    }

    pub fn prop_cells(&mut self, name: &str, cells: &[u32]) -> &mut Self {
        self.prop(Property::new_cells(name, cells))
    }

    pub fn prop_str(&mut self, name: &str, value: &str) -> &mut Self {
        self.prop(Property::new_str(name, value))
    }

    pub fn prop_strlist(&mut self, name: &str, values: &[&str]) -> &mut Self {
        self.prop(Property::new_strlist(name, values))
    }

    pub fn compatible(&mut self, values: &[&str]) -> &mut Self {
        self.prop_strlist("compatible", values)
    }

    pub fn status(&mut self, value: &str) -> &mut Self {
        self.prop_str("status", value)
    }

    pub fn phandle(&mut self, phandle: u32) -> &mut Self {
        self.prop_u32("phandle", phandle)
    }

    /// Finish the tree. The root may be left open; every other node must be closed.
    pub fn build(mut self) -> Result<DeviceTree, TreeError> {
        if self.unbalanced || self.stack.len() != 1 {
            return Err(TreeError::UnbalancedNodes);
        }
        let mut phandle_map = BTreeMap::new();
        for node in &mut self.nodes {
            let prop = node
                .props
                .iter()
                .find(|p| &*p.name == "phandle" || &*p.name == "linux,phandle");
            if let Some(prop) = prop {
                let phandle = prop.value_as_u32()?;
                if phandle_map.insert(phandle, node.node_id).is_some() {
                    return Err(TreeError::DuplicatePhandle { phandle });
                }
                node.phandle = Some(phandle);
            }
            if node.props.iter().any(|p| &*p.name == "compatible") {
                node.node_type = NodeType::Device;
            }
        }
        let mut tree = DeviceTree {
            root_id: 0,
            container: self.nodes,
            phandle_map,
        };
        tree.resolve_references();
        Ok(tree)
    }
}
