use crate::{
    dev::{
        bind::DriverId,
        driver::{DriverProbeError, MmioError},
        matching::OfDeviceId,
    },
    init::InitLevel,
    resource::{RegionHandle, ResourceError, ResourceMap},
};
use alloc::{boxed::Box, vec::Vec};
use core::{any::Any, fmt::Debug, ops::Range};
use dt::{
    node::{DeviceTree, Node},
    prop::{Property, PropertyError},
};

/// A device-tree node matched to a driver, as seen by the driver's probe.
#[derive(Clone, Copy)]
pub struct Device<'t> {
    tree: &'t DeviceTree,
    node: &'t Node,
    id: &'static OfDeviceId,
    rank: usize,
}

impl<'t> Device<'t> {
    pub fn new(tree: &'t DeviceTree, node: &'t Node, id: &'static OfDeviceId, rank: usize) -> Device<'t> {
        Device { tree, node, id, rank }
    }

    pub fn tree(&self) -> &'t DeviceTree {
        self.tree
    }

    pub fn node(&self) -> &'t Node {
        self.node
    }

    /// The driver table entry that matched.
    pub fn of_id(&self) -> &'static OfDeviceId {
        self.id
    }

    /// Position of the matched string in the node's compatible list.
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn name(&self) -> &'t str {
        &self.node.full_name
    }

    pub fn full_path(&self) -> Box<str> {
        self.tree.get_full_path(self.node)
    }

    /// Match data of the table entry, if it is a `T`.
    pub fn match_data<T: Any>(&self) -> Option<&'static T> {
        self.id.data.and_then(|data| data.downcast_ref::<T>())
    }

    pub fn get_property(&self, name: &str) -> Option<&'t Property> {
        self.tree.get_property(self.node, name)
    }

    pub fn reg(&self) -> Result<Vec<Range<usize>>, PropertyError> {
        self.tree.get_reg_value(self.node)
    }

    /// Request the `index`th `reg` window of the device as IO memory.
    pub fn request_mem_region(
        &self,
        resources: &mut ResourceMap,
        index: usize,
    ) -> Result<(RegionHandle, Range<usize>), DriverProbeError> {
        let reg = match self.reg() {
            Ok(reg) => reg,
            Err(PropertyError::PropNotFound) => return Err(MmioError::AddressNotSpecified.into()),
            Err(err) => return Err(err.into()),
        };
        let range = reg
            .get(index)
            .cloned()
            .ok_or(MmioError::AddressNotSpecified)?;
        let handle = resources
            .request_iomem_region(&self.full_path(), range.clone())
            .map_err(|err| match err {
                ResourceError::Busy => MmioError::Busy,
                _ => MmioError::InvalidAddress,
            })?;
        Ok((handle, range))
    }
}

impl Debug for Device<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Device")
            .field("node", &self.full_path())
            .field("compatible", &self.id.compatible)
            .field("rank", &self.rank)
            .finish()
    }
}

/// Binding state of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Unbound,
    Bound { driver: DriverId, level: InitLevel },
    /// The last probe failed; the node is not tried again at `level`.
    Failed { level: InitLevel, error: DriverProbeError },
    /// Parked until the deferred probe retry.
    Deferred { driver: DriverId, reason: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;
    use dt::builder::TreeBuilder;

    #[derive(Debug, PartialEq)]
    struct UartData {
        fifo: usize,
    }

    static UART_DATA: UartData = UartData { fifo: 64 };
    static UART: OfDeviceId = OfDeviceId::with_data("acme,uart", &UART_DATA);
    static WDT: OfDeviceId = OfDeviceId::new("acme,wdt");

    fn tree() -> DeviceTree {
        let mut b = TreeBuilder::new();
        b.prop_u32("#address-cells", 1).prop_u32("#size-cells", 1);
        b.begin_node("uart@1000")
            .compatible(&["acme,uart"])
            .prop_cells("reg", &[0x1000, 0x100, 0x4000, 0x10])
            .end_node();
        b.begin_node("uart@1080")
            .compatible(&["acme,uart"])
            .prop_cells("reg", &[0x1080, 0x100])
            .end_node();
        b.begin_node("wdt").compatible(&["acme,wdt"]).end_node();
        b.build().unwrap()
    }

    fn device<'t>(tree: &'t DeviceTree, path: &str, id: &'static OfDeviceId) -> Device<'t> {
        Device::new(tree, tree.get_node(path).unwrap(), id, 0)
    }

    #[test]
    fn overlapping_windows_are_busy() {
        let tree = tree();
        let mut resources = ResourceMap::new();
        let first = device(&tree, "/uart@1000", &UART);
        let (_, range) = first.request_mem_region(&mut resources, 0).unwrap();
        assert_eq!(range, 0x1000..0x1100);
        assert_eq!(
            first.request_mem_region(&mut resources, 1).map(|(_, range)| range),
            Ok(0x4000..0x4010)
        );
        let second = device(&tree, "/uart@1080", &UART);
        assert_eq!(
            second.request_mem_region(&mut resources, 0),
            Err(DriverProbeError::Mmio(MmioError::Busy))
        );
        let names: Vec<&str> = resources.regions().map(|r| &*r.name).collect();
        assert_eq!(names, ["/uart@1000", "/uart@1000"]);
    }

    #[test]
    fn missing_reg_or_index_is_not_specified() {
        let tree = tree();
        let mut resources = ResourceMap::new();
        assert_eq!(
            device(&tree, "/wdt", &WDT).request_mem_region(&mut resources, 0),
            Err(DriverProbeError::Mmio(MmioError::AddressNotSpecified))
        );
        assert_eq!(
            device(&tree, "/uart@1000", &UART).request_mem_region(&mut resources, 2),
            Err(DriverProbeError::Mmio(MmioError::AddressNotSpecified))
        );
        assert_eq!(resources.regions().count(), 0);
    }

    #[test]
    fn match_data_is_typed() {
        let tree = tree();
        let uart = device(&tree, "/uart@1000", &UART);
        assert_eq!(uart.match_data::<UartData>(), Some(&UartData { fifo: 64 }));
        assert_eq!(uart.match_data::<u32>(), None);
        assert_eq!(device(&tree, "/wdt", &WDT).match_data::<UartData>(), None);
        assert_eq!(uart.name(), "uart@1000");
        assert_eq!(&*uart.full_path(), "/uart@1000");
    }
}
