//! Driver registry and the binding of drivers to device-tree nodes.
//!
//! [DriverCore] owns the registered drivers and the deep-probe tables. One
//! boot over one tree is a [BindSession]: it records the state of every
//! node, the bound devices in probe order and the deferred probes.
//!
//! Binding rules:
//! - Within a level, nodes are visited in tree pre-order. A node is a
//!   candidate if it has a `compatible`, is available, is not bound, and has
//!   not already failed at this level.
//! - The driver is the one of this level matching the node's most specific
//!   compatible; equal matches go to the driver registered first. A driver
//!   already bound once is skipped unless it is multi-instance.
//! - A failing probe leaves the node unbound and the level goes on.
//! - With deep probe, the required nodes a node references are probed
//!   first, whatever level their drivers are registered at.

use crate::{
    dev::{
        deep_probe::{DeepProbe, DeepProbeEntry, ProbeSet},
        device::{Device, DeviceState},
        driver::{Driver, DriverFlags, DriverProbeError},
        matching::{OfMatch, of_match_node},
    },
    error::MessageError,
    init::InitLevel,
    machine::Machine,
};
use alloc::{
    boxed::Box,
    collections::{btree_map::BTreeMap, btree_set::BTreeSet},
    vec,
    vec::Vec,
};
use core::mem;
use dt::node::{DeviceTree, NodeType};
use log::{debug, error};

/// Index of a registered driver, in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DriverId(usize);

struct DriverEntry {
    driver: Box<dyn Driver>,
    level: InitLevel,
}

#[derive(Default)]
pub struct DriverCore {
    drivers: Vec<DriverEntry>,
    /// Compatible string to the drivers listing it, in registration order.
    comp_map: BTreeMap<&'static str, Vec<DriverId>>,
    deep_probe: DeepProbe,
}

impl DriverCore {
    pub const fn new() -> DriverCore {
        DriverCore {
            drivers: Vec::new(),
            comp_map: BTreeMap::new(),
            deep_probe: DeepProbe::new(),
        }
    }

    /// Register a driver to be bound at `level`.
    pub fn register_driver<T: 'static + Driver>(&mut self, level: InitLevel, driver: Box<T>) -> DriverId {
        debug_ex!("\tRegistered driver '{}' at {}.", driver.get_name(), level.name());
        driver.on_registered();
        let id = DriverId(self.drivers.len());
        for of_id in driver.get_of_ids() {
            let ids = self.comp_map.entry(of_id.compatible).or_default();
            if ids.last() != Some(&id) {
                ids.push(id);
            }
        }
        self.drivers.push(DriverEntry { driver, level });
        id
    }

    /// Mark the devices of `entry` as deep-probe roots.
    pub fn enable_deep_probe(&mut self, entry: DeepProbeEntry) {
        self.deep_probe.enable(entry);
    }

    pub fn deep_probe(&self) -> &DeepProbe {
        &self.deep_probe
    }

    pub fn driver(&self, id: DriverId) -> &dyn Driver {
        self.drivers[id.0].driver.as_ref()
    }

    pub fn driver_level(&self, id: DriverId) -> InitLevel {
        self.drivers[id.0].level
    }

    pub fn get_driver_by_name(&self, name: &str) -> Option<DriverId> {
        self.drivers
            .iter()
            .position(|entry| entry.driver.get_name() == name)
            .map(DriverId)
    }

    /// Drivers listing `compat`, in registration order.
    pub fn find_drivers(&self, compat: &str) -> &[DriverId] {
        self.comp_map.get(compat).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn drivers(&self) -> impl Iterator<Item = (DriverId, &dyn Driver, InitLevel)> {
        self.drivers
            .iter()
            .enumerate()
            .map(|(id, entry)| (DriverId(id), entry.driver.as_ref(), entry.level))
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    /// The eligible driver matching the most specific string of `compatibles`.
    fn best_driver(
        &self,
        compatibles: &[&str],
        mut eligible: impl FnMut(DriverId) -> bool,
    ) -> Option<(DriverId, OfMatch<'static>)> {
        for compat in compatibles {
            for id in self.find_drivers(compat) {
                if !eligible(*id) {
                    continue;
                }
                if let Some(found) = of_match_node(compatibles, self.drivers[id.0].driver.get_of_ids()) {
                    return Some((*id, found));
                }
            }
        }
        None
    }
}

/// A device bound during a session.
#[derive(Debug, Clone, Copy)]
struct ActiveDevice {
    node: usize,
    driver: DriverId,
    found: OfMatch<'static>,
}

pub struct BindSession<'t> {
    tree: &'t DeviceTree,
    states: Vec<DeviceState>,
    /// Bound devices in probe order.
    active: Vec<ActiveDevice>,
    deferred: Vec<usize>,
    probe_set: ProbeSet,
    /// Bound instances per driver.
    instances: Vec<usize>,
    /// Nodes whose probe is in progress.
    visiting: BTreeSet<usize>,
    depth: usize,
}

impl<'t> BindSession<'t> {
    pub fn new(tree: &'t DeviceTree, core: &DriverCore) -> BindSession<'t> {
        BindSession {
            tree,
            states: vec![DeviceState::Unbound; tree.len()],
            active: vec![],
            deferred: vec![],
            probe_set: core.deep_probe.resolve(tree),
            instances: vec![0; core.len()],
            visiting: BTreeSet::new(),
            depth: 0,
        }
    }

    pub fn tree(&self) -> &'t DeviceTree {
        self.tree
    }

    pub fn probe_set(&self) -> &ProbeSet {
        &self.probe_set
    }

    pub fn state(&self, node_id: usize) -> DeviceState {
        self.states.get(node_id).copied().unwrap_or(DeviceState::Unbound)
    }

    pub fn is_bound(&self, node_id: usize) -> bool {
        matches!(self.state(node_id), DeviceState::Bound { .. })
    }

    pub fn bound_driver(&self, node_id: usize) -> Option<DriverId> {
        match self.state(node_id) {
            DeviceState::Bound { driver, .. } => Some(driver),
            _ => None,
        }
    }

    /// Node ids of the bound devices, in probe order.
    pub fn bound_devices(&self) -> impl Iterator<Item = usize> + '_ {
        self.active.iter().map(|dev| dev.node)
    }

    /// The device bound to `node_id`.
    pub fn device(&self, node_id: usize) -> Option<Device<'t>> {
        let dev = self.active.iter().find(|dev| dev.node == node_id)?;
        Some(self.make_device(dev))
    }

    /// First node in pre-order whose full name or bare name is `name`.
    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.tree
            .iter_preorder()
            .find(|node| &*node.full_name == name || &*node.node_name == name)
            .map(|node| node.node_id)
    }

    pub fn find_by_path(&self, path: &str) -> Option<usize> {
        self.tree.get_node(path).map(|node| node.node_id)
    }

    /// Whether deep probe forces `node_id` to be probed. Always true without deep probe.
    pub fn is_probe_required(&self, node_id: usize) -> bool {
        self.probe_set.is_required(node_id)
    }

    /// Nodes parked for the deferred probe retry.
    pub fn deferred(&self) -> &[usize] {
        &self.deferred
    }

    fn make_device(&self, dev: &ActiveDevice) -> Device<'t> {
        let tree = self.tree;
        Device::new(tree, &tree.container[dev.node], dev.found.id, dev.found.rank)
    }

    fn has_capacity(&self, core: &DriverCore, driver: DriverId) -> bool {
        core.driver(driver).get_flags().contains(DriverFlags::MULTI_INSTANCE)
            || self.instances.get(driver.0).copied().unwrap_or(0) == 0
    }

    fn is_candidate(&self, node_id: usize, level: InitLevel) -> bool {
        let node = &self.tree.container[node_id];
        if node.node_type != NodeType::Device || !self.tree.is_available(node) {
            return false;
        }
        match self.state(node_id) {
            DeviceState::Unbound => true,
            DeviceState::Failed { level: failed, .. } => failed != level,
            DeviceState::Bound { .. } | DeviceState::Deferred { .. } => false,
        }
    }

    /// Bind the drivers registered at `level` to the candidate nodes.
    pub fn probe_level(&mut self, core: &DriverCore, level: InitLevel, machine: &mut Machine) {
        let tree = self.tree;
        for node in tree.iter_preorder() {
            if !self.is_candidate(node.node_id, level) {
                continue;
            }
            let compatibles = tree.get_compatibles(node);
            let best = core.best_driver(&compatibles, |driver| {
                core.driver_level(driver) == level && self.has_capacity(core, driver)
            });
            if let Some((driver, found)) = best {
                // failures are logged and recorded in the node state
                let _ = self.bind(core, node.node_id, driver, found, machine);
            }
        }
    }

    /// Make sure `node_id` is bound, probing it with its best driver of any level.
    pub fn ensure_probed(
        &mut self,
        core: &DriverCore,
        node_id: usize,
        machine: &mut Machine,
    ) -> Result<(), DriverProbeError> {
        if self.is_bound(node_id) || self.visiting.contains(&node_id) {
            return Ok(());
        }
        let tree = self.tree;
        let node = tree.node(node_id).ok_or(DriverProbeError::NoDevice)?;
        if node.node_type != NodeType::Device || !tree.is_available(node) {
            return Err(DriverProbeError::NoDevice);
        }
        let compatibles = tree.get_compatibles(node);
        let Some((driver, found)) = core.best_driver(&compatibles, |driver| self.has_capacity(core, driver))
        else {
            debug!("{}: no driver to probe", tree.get_full_path(node));
            return Err(DriverProbeError::NoDevice);
        };
        // a failed node is not retried at the level it failed at
        if let DeviceState::Failed { level, error } = self.state(node_id)
            && level == core.driver_level(driver)
        {
            return Err(error);
        }
        self.bind(core, node_id, driver, found, machine)
    }

    fn bind(
        &mut self,
        core: &DriverCore,
        node_id: usize,
        driver: DriverId,
        found: OfMatch<'static>,
        machine: &mut Machine,
    ) -> Result<(), DriverProbeError> {
        let tree = self.tree;
        let node = &tree.container[node_id];
        self.visiting.insert(node_id);
        if self.probe_set.is_supported() {
            let targets: Vec<usize> = tree
                .get_reference_targets(node)
                .filter(|target| *target != node_id && self.probe_set.is_required(*target))
                .collect();
            for target in targets {
                if let Err(err) = self.ensure_probed(core, target, machine) {
                    debug!(
                        "{}: dependency {} not probed: {}",
                        tree.get_full_path(node),
                        tree.get_full_path(&tree.container[target]),
                        &err as &dyn MessageError
                    );
                }
            }
        }

        let level = core.driver_level(driver);
        let dev = Device::new(tree, node, found.id, found.rank);
        let path = tree.get_full_path(node);
        report_probe!("{:width$}probe-> {}", "", path, width = (self.depth + 1) * 4);
        self.depth += 1;
        let result = core.driver(driver).probe(&dev, machine);
        self.depth -= 1;
        self.visiting.remove(&node_id);
        self.deferred.retain(|id| *id != node_id);

        match result {
            Ok(()) => {
                self.states[node_id] = DeviceState::Bound { driver, level };
                self.active.push(ActiveDevice {
                    node: node_id,
                    driver,
                    found,
                });
                if self.instances.len() <= driver.0 {
                    self.instances.resize(driver.0 + 1, 0);
                }
                self.instances[driver.0] += 1;
            }
            Err(DriverProbeError::Defer { reason }) if !self.probe_set.is_supported() => {
                debug!("{}: probe deferred ({})", path, reason);
                self.states[node_id] = DeviceState::Deferred { driver, reason };
                self.deferred.push(node_id);
            }
            Err(err) => {
                if let DriverProbeError::Defer { reason } = err {
                    error!("{}: probe permanently deferred ({})", path, reason);
                } else if err.is_quiet() {
                    debug!("{}: probe failed: {}", path, &err as &dyn MessageError);
                } else {
                    error!("{}: probe failed: {}", path, &err as &dyn MessageError);
                }
                self.states[node_id] = DeviceState::Failed { level, error: err };
            }
        }
        result
    }

    /// Retry the deferred probes as long as one of them succeeds.
    ///
    /// Nodes still deferred afterwards are reported and marked failed.
    pub fn probe_deferred(&mut self, core: &DriverCore, machine: &mut Machine) {
        let tree = self.tree;
        loop {
            if self.deferred.is_empty() {
                return;
            }
            let mut progress = false;
            for node_id in mem::take(&mut self.deferred) {
                let DeviceState::Deferred { driver, .. } = self.state(node_id) else {
                    continue;
                };
                if !self.has_capacity(core, driver) {
                    self.deferred.push(node_id);
                    continue;
                }
                let compatibles = tree.get_compatibles(&tree.container[node_id]);
                let Some(found) = of_match_node(&compatibles, core.driver(driver).get_of_ids()) else {
                    continue;
                };
                if self.bind(core, node_id, driver, found, machine).is_ok() {
                    progress = true;
                }
            }
            if !progress {
                break;
            }
        }
        for node_id in mem::take(&mut self.deferred) {
            if let DeviceState::Deferred { driver, reason } = self.state(node_id) {
                error!(
                    "{}: probe permanently deferred ({})",
                    tree.get_full_path(&tree.container[node_id]),
                    reason
                );
                self.states[node_id] = DeviceState::Failed {
                    level: core.driver_level(driver),
                    error: DriverProbeError::Defer { reason },
                };
            }
        }
    }

    /// Remove the bound devices in reverse probe order. Returns how many were removed.
    pub fn shutdown(&mut self, core: &DriverCore, machine: &mut Machine) -> usize {
        let active = mem::take(&mut self.active);
        for dev in active.iter().rev() {
            let device = self.make_device(dev);
            report_probe!("    remove-> {}", device.full_path());
            core.driver(dev.driver).remove(&device, machine);
            self.states[dev.node] = DeviceState::Unbound;
            if let Some(count) = self.instances.get_mut(dev.driver.0) {
                *count = count.saturating_sub(1);
            }
        }
        active.len()
    }
}
