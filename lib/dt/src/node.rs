use crate::{
    phandle::PhandleRef,
    prop::{Property, PropertyError},
};
use alloc::{boxed::Box, collections::btree_map::BTreeMap, string::String, vec, vec::Vec};
use core::ops::Range;

pub struct DeviceTree {
    pub root_id: usize,
    pub container: Vec<Node>,
    pub phandle_map: BTreeMap<u32, usize>,
}

pub struct Node {
    pub node_id: usize,
    pub parent_id: usize,
    pub full_name: Box<str>,
    pub node_name: Box<str>,
    pub unit_addr: Box<str>,
    pub children: Vec<usize>,
    pub props: Vec<Property>,
    pub phandle: Option<u32>,
    pub node_type: NodeType,
    pub references: Vec<PhandleRef>,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum NodeType {
    /// The node carries a `compatible` property and may be bound to a driver.
    Device,
    Description,
}

impl DeviceTree {
    pub fn root(&self) -> &Node {
        &self.container[self.root_id]
    }
    pub fn node(&self, node_id: usize) -> Option<&Node> {
        self.container.get(node_id)
    }
    pub fn len(&self) -> usize {
        self.container.len()
    }
    pub fn is_empty(&self) -> bool {
        self.container.is_empty()
    }
    pub fn is_root(&self, node: &Node) -> bool {
        self.get_parent(node).node_id == node.node_id
    }
    fn full_path(&self, node: &Node) -> String {
        if self.is_root(node) {
            String::from("")
        } else {
            self.full_path(self.get_parent(node)) + "/" + node.full_name.as_ref()
        }
    }
    pub fn get_full_path(&self, node: &Node) -> Box<str> {
        if self.is_root(node) {
            return Box::from("/");
        }
        self.full_path(node).into_boxed_str()
    }
    pub fn get_parent(&self, node: &Node) -> &Node {
        &self.container[node.parent_id]
    }
    pub fn get_children<'b>(&'b self, node: &Node) -> impl Iterator<Item = &'b Node> {
        node.children.iter().map(|x| &self.container[*x])
    }
    /// Walk the tree depth first, parents before children, siblings in order.
    pub fn iter_preorder(&self) -> impl Iterator<Item = &Node> {
        let mut stack = vec![self.root_id];
        core::iter::from_fn(move || {
            let id = stack.pop()?;
            let node = &self.container[id];
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }
    pub fn get_property<'b>(&self, node: &'b Node, name: impl AsRef<str>) -> Option<&'b Property> {
        let name = name.as_ref();
        node.props.iter().find(|prop| prop.name.as_ref().eq(name))
    }
    /// The `compatible` strings of `node`, most specific first.
    ///
    /// A missing or malformed property yields an empty list.
    pub fn get_compatibles<'b>(&self, node: &'b Node) -> Vec<&'b str> {
        self.get_property(node, "compatible")
            .and_then(|prop| prop.value_as_strlist().ok())
            .unwrap_or_default()
    }
    /// `status` absent, `"okay"` or `"ok"`.
    pub fn is_available(&self, node: &Node) -> bool {
        match self.get_property(node, "status") {
            None => true,
            Some(prop) => matches!(prop.value_as_str(), Ok("okay") | Ok("ok")),
        }
    }
    pub fn find_by_phandle(&self, phandle: u32) -> Option<&Node> {
        self.phandle_map.get(&phandle).map(|id| &self.container[*id])
    }
    pub fn find_compatible<'b>(&'b self, compat: &'b str) -> impl Iterator<Item = &'b Node> {
        self.iter_preorder()
            .filter(move |node| self.get_compatibles(node).contains(&compat))
    }
    pub fn get_node(&self, path: impl AsRef<str>) -> Option<&Node> {
        let path_str = path.as_ref();
        let mut node = &self.container[self.root_id];
        for section in path_str.split('/') {
            if section.trim().is_empty() {
                continue;
            }
            node = self
                .get_children(node)
                .find(|subnode| subnode.full_name.as_ref().eq(section))?;
        }
        Some(node)
    }
    /// Like [DeviceTree::get_node], but a path section also matches on the bare
    /// node name, and `*` matches any child.
    pub fn get_nodes(&self, path: impl AsRef<str>) -> Vec<&Node> {
        let path_str = path.as_ref();
        let root = &self.container[self.root_id];
        let path = path_str.split('/').collect();
        self.get_sub_nodes(root, &path, 0)
    }
    fn get_sub_nodes<'b>(&'b self, node: &'b Node, path: &Vec<&str>, mut cursor: usize) -> Vec<&'b Node> {
        while cursor < path.len() && path[cursor].trim().is_empty() {
            cursor += 1;
        }
        if cursor >= path.len() {
            return vec![node];
        }
        let sec = path[cursor];
        self.get_children(node)
            .flat_map(|child| {
                if sec.eq("*") || child.full_name.as_ref().eq(sec) || child.node_name.as_ref().eq(sec) {
                    self.get_sub_nodes(child, path, cursor + 1)
                } else {
                    vec![]
                }
            })
            .collect()
    }
    pub fn get_reg_value(&self, node: &Node) -> Result<Vec<Range<usize>>, PropertyError> {
        let mut size_cel = 1;
        let mut addr_cel = 2;
        if !self.is_root(node) {
            let parent = self.get_parent(node);
            if let Some(prop) = self.get_property(parent, "#address-cells") {
                addr_cel = prop.value_as_u32()? as usize;
            }
            if let Some(prop) = self.get_property(parent, "#size-cells") {
                size_cel = prop.value_as_u32()? as usize;
            }
        }
        let reg = self
            .get_property(node, "reg")
            .ok_or(PropertyError::PropNotFound)?;
        let reg = reg.value_as_cells()?;
        let width = size_cel + addr_cel;
        if width == 0 || addr_cel > 2 || size_cel > 2 || reg.len() % width != 0 {
            return Err(PropertyError::InvalidPropFormat);
        }
        let mut res = vec![];
        for entry in reg.chunks_exact(width) {
            let addr = cells_to_usize(&entry[..addr_cel])?;
            let sz = cells_to_usize(&entry[addr_cel..])?;
            let end = addr.checked_add(sz).ok_or(PropertyError::InvalidPropFormat)?;
            res.push(Range { start: addr, end });
        }
        Ok(res)
    }
}

/// Join up to two big-endian cells into a value that must fit the address space.
fn cells_to_usize(cells: &[u32]) -> Result<usize, PropertyError> {
    let value = cells.iter().fold(0u64, |acc, cell| (acc << 32) | u64::from(*cell));
    usize::try_from(value).map_err(|_| PropertyError::InvalidPropFormat)
}
