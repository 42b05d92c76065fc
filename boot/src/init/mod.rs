//! Initcall levels and the per-level initcall tables.
//!
//! Boot runs a fixed sequence of levels. Each level holds plain initcalls,
//! run in registration order, and the drivers registered for it. Shutdown
//! runs the exit levels the same way.

mod sequencer;

pub use sequencer::{BootReport, FailedCall, Sequencer};

use crate::{bbu::BbuError, error::MessageError, machine::Machine, resource::ResourceError};
use alloc::{boxed::Box, vec::Vec};
use log::error;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use paste::paste;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum InitLevel {
    Pure = 0,
    Core,
    Postcore,
    Console,
    Postconsole,
    Mem,
    Mmu,
    Postmmu,
    Coredevice,
    Fs,
    Device,
    Crypto,
    OfPopulate,
    Late,
    Environment,
    Postenvironment,
}

impl InitLevel {
    pub const ALL: [InitLevel; 16] = [
        InitLevel::Pure,
        InitLevel::Core,
        InitLevel::Postcore,
        InitLevel::Console,
        InitLevel::Postconsole,
        InitLevel::Mem,
        InitLevel::Mmu,
        InitLevel::Postmmu,
        InitLevel::Coredevice,
        InitLevel::Fs,
        InitLevel::Device,
        InitLevel::Crypto,
        InitLevel::OfPopulate,
        InitLevel::Late,
        InitLevel::Environment,
        InitLevel::Postenvironment,
    ];

    pub fn name(self) -> &'static str {
        match self {
            InitLevel::Pure => "pure",
            InitLevel::Core => "core",
            InitLevel::Postcore => "postcore",
            InitLevel::Console => "console",
            InitLevel::Postconsole => "postconsole",
            InitLevel::Mem => "mem",
            InitLevel::Mmu => "mmu",
            InitLevel::Postmmu => "postmmu",
            InitLevel::Coredevice => "coredevice",
            InitLevel::Fs => "fs",
            InitLevel::Device => "device",
            InitLevel::Crypto => "crypto",
            InitLevel::OfPopulate => "of_populate",
            InitLevel::Late => "late",
            InitLevel::Environment => "environment",
            InitLevel::Postenvironment => "postenvironment",
        }
    }

    pub fn next(self) -> Option<InitLevel> {
        InitLevel::try_from(u8::from(self) + 1).ok()
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum ExitLevel {
    Early = 0,
    Predevshutdown,
    Devshutdown,
    Postdevshutdown,
    Prearchshutdown,
    Archshutdown,
    Postarchshutdown,
}

impl ExitLevel {
    pub const ALL: [ExitLevel; 7] = [
        ExitLevel::Early,
        ExitLevel::Predevshutdown,
        ExitLevel::Devshutdown,
        ExitLevel::Postdevshutdown,
        ExitLevel::Prearchshutdown,
        ExitLevel::Archshutdown,
        ExitLevel::Postarchshutdown,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ExitLevel::Early => "early",
            ExitLevel::Predevshutdown => "predevshutdown",
            ExitLevel::Devshutdown => "devshutdown",
            ExitLevel::Postdevshutdown => "postdevshutdown",
            ExitLevel::Prearchshutdown => "prearchshutdown",
            ExitLevel::Archshutdown => "archshutdown",
            ExitLevel::Postarchshutdown => "postarchshutdown",
        }
    }

    pub fn next(self) -> Option<ExitLevel> {
        ExitLevel::try_from(u8::from(self) + 1).ok()
    }
}

// region: Error Types

/// Errors returned by initcalls and exitcalls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitcallError {
    NoDevice,
    NotSupported,
    Busy,
    Bbu(BbuError),
    Resource(ResourceError),
    /// Custom initcall-specific information.
    Customized { info: &'static str },
}

impl From<BbuError> for InitcallError {
    fn from(value: BbuError) -> Self {
        InitcallError::Bbu(value)
    }
}

impl From<ResourceError> for InitcallError {
    fn from(value: ResourceError) -> Self {
        InitcallError::Resource(value)
    }
}

impl MessageError for InitcallError {
    fn errno_name(&self) -> &'static str {
        match self {
            InitcallError::NoDevice => "ENODEV",
            InitcallError::NotSupported => "ENOSYS",
            InitcallError::Busy => "EBUSY",
            InitcallError::Bbu(err) => err.errno_name(),
            InitcallError::Resource(err) => err.errno_name(),
            InitcallError::Customized { .. } => "EINVAL",
        }
    }
}

// endregion

pub type InitFn = Box<dyn FnMut(&mut Machine) -> Result<(), InitcallError>>;

pub struct Initcall {
    name: Box<str>,
    func: InitFn,
}

impl Initcall {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn call(&mut self, machine: &mut Machine) -> Result<(), InitcallError> {
        (self.func)(machine)
    }
}

/// Run every call of `calls` in order. Failures are logged and handed to `failed`.
fn run_calls(kind: &str, calls: &mut [Initcall], machine: &mut Machine, mut failed: impl FnMut(&str, InitcallError)) {
    for call in calls {
        debug_ex!("{}-> {}", kind, call.name());
        if let Err(err) = call.call(machine) {
            error!("{} {} failed: {}", kind, call.name(), &err as &dyn MessageError);
            failed(call.name(), err);
        }
    }
}

/// Initcalls and exitcalls, one ordered list per level.
pub struct InitcallTable {
    init: Vec<Vec<Initcall>>,
    exit: Vec<Vec<Initcall>>,
}

impl Default for InitcallTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InitcallTable {
    pub fn new() -> InitcallTable {
        InitcallTable {
            init: InitLevel::ALL.iter().map(|_| Vec::new()).collect(),
            exit: ExitLevel::ALL.iter().map(|_| Vec::new()).collect(),
        }
    }

    pub fn add_initcall<F>(&mut self, level: InitLevel, name: &str, func: F)
    where
        F: FnMut(&mut Machine) -> Result<(), InitcallError> + 'static,
    {
        self.init[usize::from(u8::from(level))].push(Initcall {
            name: Box::from(name),
            func: Box::new(func),
        });
    }

    pub fn add_exitcall<F>(&mut self, level: ExitLevel, name: &str, func: F)
    where
        F: FnMut(&mut Machine) -> Result<(), InitcallError> + 'static,
    {
        self.exit[usize::from(u8::from(level))].push(Initcall {
            name: Box::from(name),
            func: Box::new(func),
        });
    }

    pub fn initcalls(&self, level: InitLevel) -> &[Initcall] {
        &self.init[usize::from(u8::from(level))]
    }

    pub fn exitcalls(&self, level: ExitLevel) -> &[Initcall] {
        &self.exit[usize::from(u8::from(level))]
    }

    /// Run the initcalls of `level`, reporting each failure to `failed`.
    pub fn run_level(&mut self, level: InitLevel, machine: &mut Machine, failed: impl FnMut(&str, InitcallError)) {
        run_calls("initcall", &mut self.init[usize::from(u8::from(level))], machine, failed);
    }

    /// Run the exitcalls of `level`, reporting each failure to `failed`.
    pub fn run_exit_level(&mut self, level: ExitLevel, machine: &mut Machine, failed: impl FnMut(&str, InitcallError)) {
        run_calls("exitcall", &mut self.exit[usize::from(u8::from(level))], machine, failed);
    }
}

macro_rules! level_helpers {
    ($suffix:ident, $add:ident, $level_type:ident: $($level:ident),+ $(,)?) => {
        paste! {
            impl InitcallTable {
                $(
                    #[doc = "Register `func` at [`" $level_type "::" $level "`]."]
                    pub fn [<$level:snake _ $suffix>]<F>(&mut self, name: &str, func: F)
                    where
                        F: FnMut(&mut Machine) -> Result<(), InitcallError> + 'static,
                    {
                        self.$add($level_type::$level, name, func)
                    }
                )+
            }
        }
    };
}

level_helpers!(
    initcall, add_initcall, InitLevel:
    Pure, Core, Postcore, Console, Postconsole, Mem, Mmu, Postmmu, Coredevice,
    Fs, Device, Crypto, OfPopulate, Late, Environment, Postenvironment,
);

level_helpers!(
    exitcall, add_exitcall, ExitLevel:
    Early, Predevshutdown, Devshutdown, Postdevshutdown, Prearchshutdown, Archshutdown,
    Postarchshutdown,
);

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::{rc::Rc, vec, vec::Vec};
    use core::cell::RefCell;

    #[test]
    fn levels_are_totally_ordered() {
        assert!(InitLevel::ALL.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(InitLevel::Core.next(), Some(InitLevel::Postcore));
        assert_eq!(InitLevel::Postenvironment.next(), None);
        assert_eq!(InitLevel::try_from(12u8).ok(), Some(InitLevel::OfPopulate));
        assert_eq!(InitLevel::OfPopulate.name(), "of_populate");
        assert_eq!(ExitLevel::Devshutdown.next(), Some(ExitLevel::Postdevshutdown));
    }

    #[test]
    fn helpers_register_at_their_level() {
        let ran = Rc::new(RefCell::new(Vec::new()));
        let mut table = InitcallTable::new();
        let r = ran.clone();
        table.postcore_initcall("b", move |_| {
            r.borrow_mut().push("b");
            Err(InitcallError::NoDevice)
        });
        let r = ran.clone();
        table.of_populate_initcall("c", move |_| {
            r.borrow_mut().push("c");
            Ok(())
        });
        table.devshutdown_exitcall("d", |_| Ok(()));
        assert_eq!(table.initcalls(InitLevel::Postcore)[0].name(), "b");
        assert_eq!(table.initcalls(InitLevel::OfPopulate).len(), 1);
        assert_eq!(table.exitcalls(ExitLevel::Devshutdown).len(), 1);

        let mut machine = Machine::new();
        let mut failed = vec![];
        table.run_level(InitLevel::Postcore, &mut machine, |name, err| {
            failed.push((alloc::string::String::from(name), err))
        });
        assert_eq!(*ran.borrow(), vec!["b"]);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].1, InitcallError::NoDevice);
    }
}
