//! Phandle references between nodes.
//!
//! Reference properties are resolved once, when the tree is built, into
//! [PhandleRef] entries stored on the referring node.

use crate::{
    node::{DeviceTree, Node},
    prop::Property,
};
use alloc::{boxed::Box, vec::Vec};
use log::debug;

/// One phandle found in a reference property of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhandleRef {
    Resolved { prop: Box<str>, target: usize },
    /// The phandle names no node of the tree.
    Dangling { prop: Box<str>, phandle: u32 },
}

impl PhandleRef {
    pub fn target(&self) -> Option<usize> {
        match self {
            PhandleRef::Resolved { target, .. } => Some(*target),
            PhandleRef::Dangling { .. } => None,
        }
    }
    pub fn prop(&self) -> &str {
        match self {
            PhandleRef::Resolved { prop, .. } | PhandleRef::Dangling { prop, .. } => prop,
        }
    }
}

/// How the phandles of a reference property are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefLayout {
    /// Every cell is a phandle.
    Plain,
    /// Every phandle is followed by as many cells as the target's cells property says.
    Specifier(&'static str),
}

const SPECIFIER_PROPS: &[(&str, &str)] = &[
    ("clocks", "#clock-cells"),
    ("resets", "#reset-cells"),
    ("power-domains", "#power-domain-cells"),
    ("phys", "#phy-cells"),
    ("pwms", "#pwm-cells"),
    ("dmas", "#dma-cells"),
    ("mboxes", "#mbox-cells"),
    ("iommus", "#iommu-cells"),
    ("io-channels", "#io-channel-cells"),
    ("interrupts-extended", "#interrupt-cells"),
    ("gpios", "#gpio-cells"),
];

const PLAIN_PROPS: &[&str] = &[
    "interrupt-parent",
    "phy-handle",
    "memory-region",
    "nvmem-cells",
];

/// Classify a property name as a phandle reference, if it is one.
pub fn reference_layout(name: &str) -> Option<RefLayout> {
    if let Some((_, cells)) = SPECIFIER_PROPS.iter().find(|(prop, _)| *prop == name) {
        return Some(RefLayout::Specifier(*cells));
    }
    if name.ends_with("-gpios") {
        return Some(RefLayout::Specifier("#gpio-cells"));
    }
    if PLAIN_PROPS.contains(&name) || name.ends_with("-supply") {
        return Some(RefLayout::Plain);
    }
    if let Some(index) = name.strip_prefix("pinctrl-")
        && !index.is_empty()
        && index.bytes().all(|b| b.is_ascii_digit())
    {
        return Some(RefLayout::Plain);
    }
    None
}

impl DeviceTree {
    /// The resolved and dangling references of `node`, in property order.
    pub fn get_references<'b>(&self, node: &'b Node) -> &'b [PhandleRef] {
        &node.references
    }

    /// Ids of the nodes `node` references, dangling entries skipped.
    pub fn get_reference_targets<'b>(&self, node: &'b Node) -> impl Iterator<Item = usize> + 'b {
        node.references.iter().filter_map(PhandleRef::target)
    }

    fn specifier_len(&self, target: usize, cells: &str) -> usize {
        self.get_property(&self.container[target], cells)
            .and_then(|prop| prop.value_as_u32().ok())
            .unwrap_or(0) as usize
    }

    fn resolve_property(&self, prop: &Property, layout: RefLayout, out: &mut Vec<PhandleRef>) {
        let Ok(cells) = prop.value_as_cells() else {
            debug!("Skipped malformed reference property '{}'.", prop.name);
            return;
        };
        let mut index = 0;
        while index < cells.len() {
            let phandle = cells[index];
            index += 1;
            if phandle == 0 {
                continue;
            }
            match self.phandle_map.get(&phandle) {
                Some(target) => {
                    out.push(PhandleRef::Resolved {
                        prop: prop.name.clone(),
                        target: *target,
                    });
                    if let RefLayout::Specifier(cells_name) = layout {
                        index += self.specifier_len(*target, cells_name);
                    }
                }
                None => {
                    out.push(PhandleRef::Dangling {
                        prop: prop.name.clone(),
                        phandle,
                    });
                    if let RefLayout::Specifier(_) = layout {
                        break;
                    }
                }
            }
        }
    }

    /// Fill [Node::references] of every node from its reference properties.
    pub(crate) fn resolve_references(&mut self) {
        for id in 0..self.container.len() {
            let mut refs = Vec::new();
            for prop in &self.container[id].props {
                if let Some(layout) = reference_layout(&prop.name) {
                    self.resolve_property(prop, layout, &mut refs);
                }
            }
            self.container[id].references = refs;
        }
    }
}
