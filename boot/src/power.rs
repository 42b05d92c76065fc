//! Restart and poweroff handler chains.
//!
//! Several handlers can reset or power off a board, for example a watchdog
//! and the PMIC. They are registered with a priority and tried from the
//! highest priority down. A handler that resets the machine never returns;
//! if it does return, the next handler gets its turn.

use crate::{
    error::MessageError,
    prio::{ListHandle, PriorityEntry, PriorityList},
};
use alloc::boxed::Box;
use bitflags::bitflags;
use log::{debug, info, warn};

bitflags! {
    /// Properties of a restart request, and what a restart handler can do.
    #[derive(Default)]
    pub struct RestartFlags: u32 {
        /// The restart keeps enough state for the boot ROM to run a warm boot.
        const WARM_BOOTROM = 0b1;
    }
}

/// What a handler reports if it returns control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// The request took effect. Real hardware handlers never get to return this;
    /// emulated machines do.
    Taken,
    /// The handler gave up and the machine is still running.
    Returned,
}

pub trait RestartHandler: Send + Sync {
    fn restart(&self, flags: RestartFlags) -> HandlerOutcome;
}

impl<F> RestartHandler for F
where
    F: Fn(RestartFlags) -> HandlerOutcome + Send + Sync,
{
    fn restart(&self, flags: RestartFlags) -> HandlerOutcome {
        self(flags)
    }
}

pub trait PoweroffHandler: Send + Sync {
    fn poweroff(&self) -> HandlerOutcome;
}

impl<F> PoweroffHandler for F
where
    F: Fn() -> HandlerOutcome + Send + Sync,
{
    fn poweroff(&self) -> HandlerOutcome {
        self()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerError {
    /// No handler is registered for the request.
    NoHandler,
    HandlerNotFound,
    /// Every eligible handler returned control.
    AllHandlersReturned { tried: usize },
}

impl MessageError for PowerError {
    fn errno_name(&self) -> &'static str {
        match self {
            PowerError::NoHandler => "ENODEV",
            PowerError::HandlerNotFound => "ENOENT",
            PowerError::AllHandlersReturned { .. } => "EIO",
        }
    }
}

/// Call `fire` on the entries highest priority first until one takes effect.
///
/// `fire` returns `None` for entries it skips.
fn walk<T>(
    kind: &str,
    list: &PriorityList<T>,
    mut fire: impl FnMut(&T) -> Option<HandlerOutcome>,
) -> Result<(), PowerError> {
    let mut tried = 0;
    for entry in list.iter() {
        match fire(entry.item()) {
            None => continue,
            Some(HandlerOutcome::Taken) => {
                debug!("{} handler {} took effect", kind, entry.name());
                return Ok(());
            }
            Some(HandlerOutcome::Returned) => {
                tried += 1;
                warn!(
                    "{} handler '{}' (priority {}) returned, trying the next one",
                    kind,
                    entry.name(),
                    entry.priority()
                );
            }
        }
    }
    match tried {
        0 => Err(PowerError::NoHandler),
        tried => Err(PowerError::AllHandlersReturned { tried }),
    }
}

pub struct RestartEntry {
    flags: RestartFlags,
    handler: Box<dyn RestartHandler>,
}

impl RestartEntry {
    pub fn flags(&self) -> RestartFlags {
        self.flags
    }
}

#[derive(Default)]
pub struct RestartChain {
    list: PriorityList<RestartEntry>,
}

impl RestartChain {
    pub const fn new() -> RestartChain {
        RestartChain {
            list: PriorityList::new(),
        }
    }

    pub fn register<H: RestartHandler + 'static>(
        &mut self,
        name: &str,
        priority: i32,
        flags: RestartFlags,
        handler: H,
    ) -> ListHandle {
        debug!("register restart handler {} (priority {})", name, priority);
        let entry = RestartEntry {
            flags,
            handler: Box::new(handler),
        };
        self.list.register(name, priority, entry)
    }

    /// Register a plain handler at `RESTART_DEFAULT_PRIORITY`.
    pub fn register_fn<H: RestartHandler + 'static>(&mut self, name: &str, handler: H) -> ListHandle {
        self.register(
            name,
            config::RESTART_DEFAULT_PRIORITY as i32,
            RestartFlags::empty(),
            handler,
        )
    }

    pub fn unregister(&mut self, handle: ListHandle) -> bool {
        self.list.unregister(handle).is_some()
    }

    /// The highest priority handler called `name` (any name for `None`) that supports `flags`.
    pub fn get_by_name(&self, name: Option<&str>, flags: RestartFlags) -> Option<&PriorityEntry<RestartEntry>> {
        self.list.iter().find(|entry| {
            name.is_none_or(|name| entry.name() == name) && entry.item().flags.contains(flags)
        })
    }

    /// Try every handler supporting `flags`, highest priority first.
    pub fn restart(&self, flags: RestartFlags) -> Result<(), PowerError> {
        walk("restart", &self.list, |entry| {
            entry
                .flags
                .contains(flags)
                .then(|| entry.handler.restart(flags))
        })
    }

    /// Restart through one handler only.
    pub fn restart_by_name(&self, name: &str, flags: RestartFlags) -> Result<(), PowerError> {
        let entry = self
            .get_by_name(Some(name), flags)
            .ok_or(PowerError::HandlerNotFound)?;
        match entry.item().handler.restart(flags) {
            HandlerOutcome::Taken => Ok(()),
            HandlerOutcome::Returned => {
                warn!("restart handler '{}' returned", name);
                Err(PowerError::AllHandlersReturned { tried: 1 })
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PriorityEntry<RestartEntry>> {
        self.list.iter()
    }

    /// Print the registered handlers to the log.
    pub fn list(&self) {
        for entry in self.list.iter() {
            let warm = if entry.item().flags.contains(RestartFlags::WARM_BOOTROM) {
                " [warm-bootrom]"
            } else {
                ""
            };
            info!("{:<20} {:>5}{}", entry.name(), entry.priority(), warm);
        }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

#[derive(Default)]
pub struct PoweroffChain {
    list: PriorityList<Box<dyn PoweroffHandler>>,
}

impl PoweroffChain {
    pub const fn new() -> PoweroffChain {
        PoweroffChain {
            list: PriorityList::new(),
        }
    }

    pub fn register<H: PoweroffHandler + 'static>(&mut self, name: &str, priority: i32, handler: H) -> ListHandle {
        debug!("register poweroff handler {} (priority {})", name, priority);
        self.list.register(name, priority, Box::new(handler))
    }

    /// Register at `POWEROFF_DEFAULT_PRIORITY`.
    pub fn register_fn<H: PoweroffHandler + 'static>(&mut self, name: &str, handler: H) -> ListHandle {
        self.register(name, config::POWEROFF_DEFAULT_PRIORITY as i32, handler)
    }

    pub fn unregister(&mut self, handle: ListHandle) -> bool {
        self.list.unregister(handle).is_some()
    }

    pub fn poweroff(&self) -> Result<(), PowerError> {
        walk("poweroff", &self.list, |handler| Some(handler.poweroff()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &PriorityEntry<Box<dyn PoweroffHandler>>> {
        self.list.iter()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}
