use crate::{
    dev::{BindSession, DeepProbeEntry, Driver, DriverCore, DriverId},
    init::{ExitLevel, InitLevel, InitcallError, InitcallTable},
    machine::{BootEvent, Machine},
};
use alloc::{boxed::Box, vec::Vec};
use dt::node::DeviceTree;
use log::{debug, info};

/// An initcall or exitcall that returned an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedCall<L> {
    pub level: L,
    pub name: Box<str>,
    pub error: InitcallError,
}

/// Outcome of [Sequencer::boot].
pub struct BootReport<'t> {
    /// Binding state of every node.
    pub session: BindSession<'t>,
    pub failed: Vec<FailedCall<InitLevel>>,
}

/// Runs the initcall levels and binds drivers along the way.
#[derive(Default)]
pub struct Sequencer {
    pub initcalls: InitcallTable,
    pub drivers: DriverCore,
}

impl Sequencer {
    pub fn new() -> Sequencer {
        Sequencer::default()
    }

    pub fn register_driver<T: 'static + Driver>(&mut self, level: InitLevel, driver: Box<T>) -> DriverId {
        self.drivers.register_driver(level, driver)
    }

    pub fn enable_deep_probe(&mut self, entry: DeepProbeEntry) {
        self.drivers.enable_deep_probe(entry);
    }

    /// Run every level in order over `tree`.
    ///
    /// At each level the initcalls run first, in registration order, then the
    /// level's drivers are bound. Failures never stop the boot; they are logged
    /// and collected in the report.
    pub fn boot<'t>(&mut self, tree: &'t DeviceTree, machine: &mut Machine) -> BootReport<'t> {
        if let Some(model) = tree
            .get_property(tree.root(), "model")
            .and_then(|prop| prop.value_as_str().ok())
        {
            machine.set_model(model);
        }
        let mut session = BindSession::new(tree, &self.drivers);
        let mut failed = Vec::new();
        for level in InitLevel::ALL {
            debug!("initcall level {}", level.name());
            if level == InitLevel::Mem {
                let banks = machine.resources.register_memory_from_tree(tree);
                debug!("{} memory bank(s) from the device tree", banks);
            }
            self.initcalls.run_level(level, machine, |name, error| {
                failed.push(FailedCall {
                    level,
                    name: Box::from(name),
                    error,
                })
            });
            session.probe_level(&self.drivers, level, machine);
            if level == InitLevel::Late {
                session.probe_deferred(&self.drivers, machine);
            }
            machine.notifier.call_chain(&BootEvent::LevelDone(level));
        }
        info!(
            "boot done: {} device(s) bound, {} initcall(s) failed",
            session.bound_devices().count(),
            failed.len()
        );
        BootReport { session, failed }
    }

    /// Run the exit levels. Bound devices are removed at [ExitLevel::Devshutdown].
    pub fn shutdown(&mut self, session: &mut BindSession<'_>, machine: &mut Machine) -> Vec<FailedCall<ExitLevel>> {
        machine.notifier.call_chain(&BootEvent::Shutdown);
        let mut failed = Vec::new();
        for level in ExitLevel::ALL {
            debug!("exitcall level {}", level.name());
            if level == ExitLevel::Devshutdown {
                session.shutdown(&self.drivers, machine);
            }
            self.initcalls.run_exit_level(level, machine, |name, error| {
                failed.push(FailedCall {
                    level,
                    name: Box::from(name),
                    error,
                })
            });
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dev::{Device, DriverProbeError, OfDeviceId},
        notifier::NotifyResult,
        power::{HandlerOutcome, RestartFlags},
    };
    use alloc::{format, rc::Rc, string::String, sync::Arc, vec};
    use core::cell::RefCell;
    use dt::builder::TreeBuilder;
    use spin::Mutex;

    #[derive(Debug)]
    struct Recorder {
        name: &'static str,
        ids: &'static [OfDeviceId],
        fail: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Driver for Recorder {
        fn get_name(&self) -> &'static str {
            self.name
        }
        fn get_of_ids(&self) -> &'static [OfDeviceId] {
            self.ids
        }
        fn probe(&self, dev: &Device<'_>, _machine: &mut Machine) -> Result<(), DriverProbeError> {
            self.log.lock().push(format!("probe {}", dev.name()));
            if self.fail {
                Err(DriverProbeError::SubDeviceError)
            } else {
                Ok(())
            }
        }
        fn remove(&self, dev: &Device<'_>, _machine: &mut Machine) -> bool {
            self.log.lock().push(format!("remove {}", dev.name()));
            true
        }
    }

    static BROKEN: [OfDeviceId; 1] = [OfDeviceId::new("acme,broken")];
    static WDT: [OfDeviceId; 1] = [OfDeviceId::new("acme,wdt")];

    fn tree() -> DeviceTree {
        let mut b = TreeBuilder::new();
        b.prop_str("model", "Acme Board")
            .prop_u32("#address-cells", 1)
            .prop_u32("#size-cells", 1);
        b.begin_node("memory@80000000")
            .prop_str("device_type", "memory")
            .prop_cells("reg", &[0x8000_0000, 0x800_0000])
            .end_node();
        b.begin_node("broken@0").compatible(&["acme,broken"]).end_node();
        b.begin_node("wdt@1000").compatible(&["acme,wdt"]).end_node();
        b.build().unwrap()
    }

    #[test]
    fn levels_run_in_order_whatever_the_registration_order() {
        let ran = Rc::new(RefCell::new(Vec::new()));
        let mut seq = Sequencer::new();
        for (level, name) in [
            (InitLevel::Postcore, "postcore-1"),
            (InitLevel::Core, "core-1"),
            (InitLevel::Late, "late-1"),
            (InitLevel::Postcore, "postcore-2"),
            (InitLevel::Core, "core-2"),
        ] {
            let ran = ran.clone();
            seq.initcalls.add_initcall(level, name, move |_| {
                ran.borrow_mut().push(name);
                Ok(())
            });
        }
        let tree = tree();
        let mut machine = Machine::new();
        seq.boot(&tree, &mut machine);
        assert_eq!(
            *ran.borrow(),
            vec!["core-1", "core-2", "postcore-1", "postcore-2", "late-1"]
        );
    }

    #[test]
    fn failures_do_not_stop_the_boot() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut seq = Sequencer::new();
        seq.initcalls.core_initcall("fails", |_| Err(InitcallError::NotSupported));
        seq.register_driver(
            InitLevel::Device,
            Box::new(Recorder {
                name: "broken",
                ids: &BROKEN,
                fail: true,
                log: log.clone(),
            }),
        );
        seq.register_driver(
            InitLevel::Device,
            Box::new(Recorder {
                name: "wdt",
                ids: &WDT,
                fail: false,
                log: log.clone(),
            }),
        );
        seq.initcalls.late_initcall("after", |machine| {
            machine
                .restart
                .register_fn("wdt", |_: RestartFlags| HandlerOutcome::Taken);
            Ok(())
        });
        let tree = tree();
        let mut machine = Machine::new();
        let report = seq.boot(&tree, &mut machine);

        assert_eq!(
            report.failed,
            vec![FailedCall {
                level: InitLevel::Core,
                name: Box::from("fails"),
                error: InitcallError::NotSupported
            }]
        );
        let broken = tree.get_node("/broken@0").unwrap().node_id;
        let wdt = tree.get_node("/wdt@1000").unwrap().node_id;
        assert!(!report.session.is_bound(broken));
        assert!(report.session.is_bound(wdt));
        assert_eq!(machine.restart.len(), 1);
        assert_eq!(machine.model(), Some("Acme Board"));
        assert_eq!(machine.resources.banks().count(), 1);
    }

    #[test]
    fn notifier_sees_every_level_and_shutdown_removes_devices() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut seq = Sequencer::new();
        seq.register_driver(
            InitLevel::Coredevice,
            Box::new(Recorder {
                name: "wdt",
                ids: &WDT,
                fail: false,
                log: log.clone(),
            }),
        );
        let l = log.clone();
        seq.initcalls.devshutdown_exitcall("flush", move |_| {
            l.lock().push(String::from("flush"));
            Ok(())
        });
        let tree = tree();
        let mut machine = Machine::new();
        let e = events.clone();
        machine.notifier.register("events", 0, move |event: &BootEvent| {
            e.lock().push(*event);
            NotifyResult::Ok
        });
        let mut report = seq.boot(&tree, &mut machine);
        assert_eq!(events.lock().len(), InitLevel::ALL.len());
        assert_eq!(events.lock().last(), Some(&BootEvent::LevelDone(InitLevel::Postenvironment)));

        let failed = seq.shutdown(&mut report.session, &mut machine);
        assert!(failed.is_empty());
        assert_eq!(events.lock().last(), Some(&BootEvent::Shutdown));
        assert_eq!(*log.lock(), vec!["probe wdt@1000", "remove wdt@1000", "flush"]);
    }
}
