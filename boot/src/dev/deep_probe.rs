//! Deep probe: which nodes must be probed so that others can find them.
//!
//! Drivers (or boards) list the compatibles whose devices are deep-probe
//! roots. A root, and every node reachable from a root over phandle
//! references, is probed on demand before the node referencing it. Without
//! any entry the machine does not support deep probe and every node counts
//! as required.

use crate::dev::matching::OfDeviceId;
use alloc::{collections::btree_set::BTreeSet, vec, vec::Vec};
use dt::{
    node::{DeviceTree, Node},
    phandle::PhandleRef,
};
use log::debug;
use spin::Once;

#[derive(Debug, Clone, Copy)]
pub struct DeepProbeEntry {
    pub name: &'static str,
    pub ids: &'static [OfDeviceId],
}

pub struct DeepProbe {
    entries: Vec<DeepProbeEntry>,
    compat: Once<BTreeSet<&'static str>>,
}

impl Default for DeepProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// Nodes found required by [DeepProbe::resolve], indexed by node id.
#[derive(Debug, Clone)]
pub struct ProbeSet {
    supported: bool,
    required: Vec<bool>,
}

impl ProbeSet {
    pub fn is_required(&self, node_id: usize) -> bool {
        !self.supported || self.required.get(node_id).copied().unwrap_or(false)
    }

    pub fn is_supported(&self) -> bool {
        self.supported
    }

    /// Ids of the required nodes in ascending order. Empty when deep probe is not supported.
    pub fn iter_required(&self) -> impl Iterator<Item = usize> + '_ {
        self.required
            .iter()
            .enumerate()
            .filter_map(|(id, required)| required.then_some(id))
    }
}

impl DeepProbe {
    pub const fn new() -> DeepProbe {
        DeepProbe {
            entries: Vec::new(),
            compat: Once::new(),
        }
    }

    pub fn enable(&mut self, entry: DeepProbeEntry) {
        debug!("deep probe enabled for {}", entry.name);
        self.entries.push(entry);
        self.compat = Once::new();
    }

    fn compatibles(&self) -> &BTreeSet<&'static str> {
        self.compat.call_once(|| {
            self.entries
                .iter()
                .flat_map(|entry| entry.ids.iter())
                .map(|id| id.compatible)
                .collect()
        })
    }

    pub fn is_supported(&self) -> bool {
        !self.compatibles().is_empty()
    }

    /// Whether `node` carries one of the deep-probe compatibles itself.
    pub fn is_root(&self, tree: &DeviceTree, node: &Node) -> bool {
        let set = self.compatibles();
        tree.get_compatibles(node).iter().any(|c| set.contains(c))
    }

    /// Mark the roots and everything reachable from them over phandle references.
    pub fn resolve(&self, tree: &DeviceTree) -> ProbeSet {
        if !self.is_supported() {
            return ProbeSet {
                supported: false,
                required: vec![],
            };
        }
        let mut required = vec![false; tree.len()];
        let mut worklist = Vec::new();
        for node in tree.iter_preorder() {
            if self.is_root(tree, node) {
                required[node.node_id] = true;
                worklist.push(node.node_id);
            }
        }
        while let Some(id) = worklist.pop() {
            let node = &tree.container[id];
            for reference in tree.get_references(node) {
                match reference {
                    PhandleRef::Resolved { target, .. } => {
                        if !required[*target] {
                            required[*target] = true;
                            worklist.push(*target);
                        }
                    }
                    PhandleRef::Dangling { prop, phandle } => {
                        debug!(
                            "{}: {} references unknown phandle {:#x}",
                            tree.get_full_path(node),
                            prop,
                            phandle
                        );
                    }
                }
            }
        }
        ProbeSet {
            supported: true,
            required,
        }
    }

    /// Whether `node` has to be probed.
    ///
    /// Every call resolves the whole tree. Code asking about many nodes holds
    /// the [ProbeSet] from [DeepProbe::resolve] instead, as a
    /// [BindSession](crate::dev::BindSession) does.
    pub fn is_probe_required(&self, tree: &DeviceTree, node: &Node) -> bool {
        self.resolve(tree).is_required(node.node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dt::builder::TreeBuilder;

    static CLK_IDS: [OfDeviceId; 1] = [OfDeviceId::new("acme,clk")];

    fn deep() -> DeepProbe {
        let mut deep = DeepProbe::new();
        deep.enable(DeepProbeEntry {
            name: "acme-clk",
            ids: &CLK_IDS,
        });
        deep
    }

    fn cyclic_tree() -> DeviceTree {
        let mut b = TreeBuilder::new();
        b.begin_node("a")
            .compatible(&["acme,clk"])
            .phandle(1)
            .prop_u32("#clock-cells", 0)
            .prop_cells("clocks", &[2])
            .end_node();
        b.begin_node("b")
            .compatible(&["acme,mux"])
            .phandle(2)
            .prop_u32("#clock-cells", 0)
            .prop_cells("clocks", &[1])
            .end_node();
        b.begin_node("c").compatible(&["acme,uart"]).end_node();
        b.build().unwrap()
    }

    #[test]
    fn cycles_terminate() {
        let tree = cyclic_tree();
        let deep = deep();
        let a = tree.get_node("/a").unwrap();
        let b = tree.get_node("/b").unwrap();
        let c = tree.get_node("/c").unwrap();
        assert!(deep.is_probe_required(&tree, a));
        assert!(deep.is_probe_required(&tree, b));
        assert!(!deep.is_probe_required(&tree, c));
        let set = deep.resolve(&tree);
        assert_eq!(set.iter_required().collect::<Vec<_>>(), vec![a.node_id, b.node_id]);
    }

    #[test]
    fn dangling_references_do_not_propagate() {
        let mut b = TreeBuilder::new();
        b.begin_node("a")
            .compatible(&["acme,clk"])
            .prop_u32("interrupt-parent", 0x42)
            .prop_cells("clocks", &[0x43, 0])
            .end_node();
        b.begin_node("b").compatible(&["acme,intc"]).phandle(5).end_node();
        let tree = b.build().unwrap();
        let deep = deep();
        assert!(deep.is_probe_required(&tree, tree.get_node("/a").unwrap()));
        assert!(!deep.is_probe_required(&tree, tree.get_node("/b").unwrap()));
    }

    #[test]
    fn unsupported_requires_everything() {
        let tree = cyclic_tree();
        let deep = DeepProbe::new();
        assert!(!deep.is_supported());
        assert!(deep.is_probe_required(&tree, tree.get_node("/c").unwrap()));
        assert_eq!(deep.resolve(&tree).iter_required().count(), 0);
    }

    #[test]
    fn enabling_resets_the_lookup_set() {
        static UART_IDS: [OfDeviceId; 1] = [OfDeviceId::new("acme,uart")];
        let tree = cyclic_tree();
        let mut deep = deep();
        let c = tree.get_node("/c").unwrap();
        assert!(!deep.is_root(&tree, c));
        deep.enable(DeepProbeEntry {
            name: "acme-uart",
            ids: &UART_IDS,
        });
        assert!(deep.is_root(&tree, c));
    }
}
