//! Board services collected during boot.

use crate::{
    bbu::BbuRegistry,
    error::MessageError,
    init::InitLevel,
    notifier::NotifierChain,
    power::{PoweroffChain, RestartChain, RestartFlags},
    resource::ResourceMap,
};
use alloc::boxed::Box;
use log::{error, info};

/// Events sent down [Machine::notifier] while booting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootEvent {
    /// Every initcall and driver of the level has run.
    LevelDone(InitLevel),
    /// Shutdown is about to start.
    Shutdown,
}

/// The registries initcalls and drivers fill while the board comes up.
#[derive(Default)]
pub struct Machine {
    model: Option<Box<str>>,
    pub restart: RestartChain,
    pub poweroff: PoweroffChain,
    pub bbu: BbuRegistry,
    pub resources: ResourceMap,
    pub notifier: NotifierChain<BootEvent>,
}

fn hang() -> ! {
    error!("### ERROR ### Please RESET the board ###");
    loop {
        core::hint::spin_loop();
    }
}

impl Machine {
    pub fn new() -> Machine {
        Machine::default()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn set_model(&mut self, model: &str) {
        info!("Model: {}", model);
        self.model = Some(Box::from(model));
    }

    /// Restart through the restart chain. Hangs if no handler resets the board.
    pub fn restart_machine(&self, flags: RestartFlags) -> ! {
        if let Err(err) = self.restart.restart(flags) {
            error!("restart failed: {}", &err as &dyn MessageError);
        }
        hang()
    }

    /// Power off through the poweroff chain. Hangs if no handler powers the board off.
    pub fn poweroff_machine(&self) -> ! {
        if let Err(err) = self.poweroff.poweroff() {
            error!("poweroff failed: {}", &err as &dyn MessageError);
        }
        hang()
    }
}
