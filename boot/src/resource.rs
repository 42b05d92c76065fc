//! Memory banks and requested address regions.
//!
//! Boards (or the `memory` nodes of the device tree) describe the SDRAM
//! banks. Code that uses a piece of SDRAM or a register window requests it
//! here first, so two users of the same range are caught at boot.

use crate::error::MessageError;
use alloc::{boxed::Box, format, vec::Vec};
use core::{fmt::Debug, ops::Range};
use dt::node::DeviceTree;
use log::{debug, warn};
use utils::{impl_conversion, impl_deref, range_set::SortedRangeSet};

/// Address ranges that are still free for use.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct MemorySet {
    inner: SortedRangeSet,
}
impl_deref!(MemorySet, SortedRangeSet);
impl_conversion!(MemorySet, SortedRangeSet);

impl MemorySet {
    pub const fn new() -> MemorySet {
        MemorySet {
            inner: SortedRangeSet::new(),
        }
    }
}

impl Debug for MemorySet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for range in self.inner.iter() {
            f.write_fmt(format_args!("[{:#x},{:#x})", range.start, range.end))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceError {
    /// The range overlaps one that is already taken.
    Busy,
    /// An SDRAM request not covered by a single memory bank.
    OutsideMemory,
    EmptyRange,
    NotFound,
}

impl MessageError for ResourceError {
    fn errno_name(&self) -> &'static str {
        match self {
            ResourceError::Busy => "EBUSY",
            ResourceError::OutsideMemory | ResourceError::EmptyRange => "EINVAL",
            ResourceError::NotFound => "ENOENT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Sdram,
    Iomem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RegionHandle(u64);

#[derive(Debug)]
pub struct MemoryBank {
    pub name: Box<str>,
    pub range: Range<usize>,
}

#[derive(Debug)]
pub struct Region {
    pub handle: RegionHandle,
    pub name: Box<str>,
    pub range: Range<usize>,
    pub kind: RegionKind,
}

#[derive(Debug, Default)]
pub struct ResourceMap {
    banks: Vec<MemoryBank>,
    /// Union of the banks.
    memory: MemorySet,
    regions: Vec<Region>,
    /// Requested ranges, per kind.
    sdram_used: MemorySet,
    iomem_used: MemorySet,
    next_handle: u64,
}

impl ResourceMap {
    pub const fn new() -> ResourceMap {
        ResourceMap {
            banks: Vec::new(),
            memory: MemorySet::new(),
            regions: Vec::new(),
            sdram_used: MemorySet::new(),
            iomem_used: MemorySet::new(),
            next_handle: 0,
        }
    }

    fn used_mut(&mut self, kind: RegionKind) -> &mut MemorySet {
        match kind {
            RegionKind::Sdram => &mut self.sdram_used,
            RegionKind::Iomem => &mut self.iomem_used,
        }
    }

    pub fn add_memory_bank(&mut self, name: &str, range: Range<usize>) -> Result<(), ResourceError> {
        if range.is_empty() {
            return Err(ResourceError::EmptyRange);
        }
        if self.memory.overlaps(&range) {
            return Err(ResourceError::Busy);
        }
        self.memory.add(range.clone());
        debug!("memory bank {}: [{:#x},{:#x})", name, range.start, range.end);
        let pos = self
            .banks
            .iter()
            .position(|bank| bank.range.start > range.start)
            .unwrap_or(self.banks.len());
        self.banks.insert(
            pos,
            MemoryBank {
                name: Box::from(name),
                range,
            },
        );
        Ok(())
    }

    /// Memory banks by ascending start address.
    pub fn banks(&self) -> impl Iterator<Item = &MemoryBank> {
        self.banks.iter()
    }

    fn request(&mut self, name: &str, range: Range<usize>, kind: RegionKind) -> Result<RegionHandle, ResourceError> {
        if range.is_empty() {
            return Err(ResourceError::EmptyRange);
        }
        if self.used_mut(kind).overlaps(&range) {
            return Err(ResourceError::Busy);
        }
        self.used_mut(kind).add(range.clone());
        let handle = RegionHandle(self.next_handle);
        self.next_handle += 1;
        self.regions.push(Region {
            handle,
            name: Box::from(name),
            range,
            kind,
        });
        Ok(handle)
    }

    /// Reserve a piece of SDRAM. It must lie inside one memory bank.
    pub fn request_sdram_region(&mut self, name: &str, range: Range<usize>) -> Result<RegionHandle, ResourceError> {
        if !range.is_empty()
            && !self
                .banks
                .iter()
                .any(|bank| bank.range.start <= range.start && range.end <= bank.range.end)
        {
            return Err(ResourceError::OutsideMemory);
        }
        self.request(name, range, RegionKind::Sdram)
    }

    /// Reserve a register window.
    pub fn request_iomem_region(&mut self, name: &str, range: Range<usize>) -> Result<RegionHandle, ResourceError> {
        self.request(name, range, RegionKind::Iomem)
    }

    pub fn release_region(&mut self, handle: RegionHandle) -> Result<(), ResourceError> {
        let pos = self
            .regions
            .iter()
            .position(|region| region.handle == handle)
            .ok_or(ResourceError::NotFound)?;
        let region = self.regions.remove(pos);
        self.used_mut(region.kind).sub(region.range);
        Ok(())
    }

    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    /// Memory bank space not covered by an SDRAM request.
    pub fn free_memory(&self) -> MemorySet {
        let mut set = self.memory.clone();
        for range in self.sdram_used.iter() {
            set.sub(range.clone());
        }
        set
    }

    /// Add a bank for every `reg` entry of the available `device_type = "memory"` nodes.
    ///
    /// Returns the number of banks added.
    pub fn register_memory_from_tree(&mut self, tree: &DeviceTree) -> usize {
        let mut added = 0;
        let memory_nodes = tree.iter_preorder().filter(|node| {
            tree.get_property(node, "device_type")
                .is_some_and(|prop| prop.value_as_str() == Ok("memory"))
                && tree.is_available(node)
        });
        for node in memory_nodes {
            let ranges = match tree.get_reg_value(node) {
                Ok(ranges) => ranges,
                Err(err) => {
                    debug!(
                        "{}: no usable reg: {}",
                        tree.get_full_path(node),
                        &err as &dyn MessageError
                    );
                    continue;
                }
            };
            for range in ranges.into_iter().filter(|r| !r.is_empty()) {
                let name = format!("ram{}", self.banks.len());
                match self.add_memory_bank(&name, range) {
                    Ok(()) => added += 1,
                    Err(err) => warn!(
                        "{}: cannot add memory bank: {}",
                        tree.get_full_path(node),
                        &err as &dyn MessageError
                    ),
                }
            }
        }
        added
    }
}
