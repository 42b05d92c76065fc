//! Update handlers: named ways of writing a new bootloader image.
//!
//! Board code registers one handler per storage the bootloader can boot
//! from (SPI NOR, eMMC boot partition, NAND, ...). An update picks a handler
//! by name, or the one flagged [BbuHandlerFlags::DEFAULT] when no name is
//! given, and hands it the image.
//!
//! At most one handler may carry the default flag and names are unique;
//! both are checked when a handler is registered.

mod file;

pub use file::{BlockStorage, StdFileUpdater, std_check};

use crate::error::MessageError;
use alloc::{boxed::Box, vec::Vec};
use bitflags::bitflags;
use core::fmt::Debug;
use log::{error, info, warn};

bitflags! {
    #[derive(Default)]
    pub struct BbuHandlerFlags: u32 {
        /// Used when an update names no handler.
        const DEFAULT = 0b01;
        /// The handler can rewrite the image it booted from.
        const CAN_REFRESH = 0b10;
    }
}

bitflags! {
    #[derive(Default)]
    pub struct BbuDataFlags: u32 {
        /// Go on even if the image looks wrong for the handler.
        const FORCE = 0b01;
        /// Do not ask for confirmation.
        const YES = 0b10;
    }
}

/// Image types update handlers care about. Detecting the type of an image
/// is up to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Unknown,
    ArmBarebox,
    MipsBarebox,
    RiscvBarebox,
    ImxImage,
    Fit,
}

impl FileType {
    pub fn name(self) -> &'static str {
        match self {
            FileType::Unknown => "unknown",
            FileType::ArmBarebox => "ARM barebox image",
            FileType::MipsBarebox => "MIPS barebox image",
            FileType::RiscvBarebox => "RISC-V barebox image",
            FileType::ImxImage => "i.MX image",
            FileType::Fit => "FIT image",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BbuError {
    HandlerNotFound,
    /// No handler was named and none is flagged default.
    NoDefault,
    /// A second handler flagged default.
    AmbiguousDefault,
    AlreadyRegistered,
    InvalidImage,
    NotConfirmed,
    /// The handler gave up without writing anything.
    Aborted,
    Io { info: &'static str },
}

impl MessageError for BbuError {
    fn errno_name(&self) -> &'static str {
        match self {
            BbuError::HandlerNotFound => "ENOENT",
            BbuError::NoDefault => "ENODEV",
            BbuError::AmbiguousDefault => "ENOTUNIQ",
            BbuError::AlreadyRegistered => "EEXIST",
            BbuError::InvalidImage => "EINVAL",
            BbuError::NotConfirmed => "EINTR",
            BbuError::Aborted => "ECANCELED",
            BbuError::Io { .. } => "EIO",
        }
    }
}

/// One update request.
#[derive(Debug, Clone, Copy)]
pub struct BbuData<'a> {
    pub image: &'a [u8],
    /// Where the image came from, for messages.
    pub imagefile: Option<&'a str>,
    /// Target device file; the handler's own when `None`.
    pub devicefile: Option<&'a str>,
    pub filetype: FileType,
    pub flags: BbuDataFlags,
}

impl<'a> BbuData<'a> {
    pub fn new(image: &'a [u8], filetype: FileType) -> BbuData<'a> {
        BbuData {
            image,
            imagefile: None,
            devicefile: None,
            filetype,
            flags: BbuDataFlags::empty(),
        }
    }

    pub fn with_flags(self, flags: BbuDataFlags) -> BbuData<'a> {
        BbuData { flags, ..self }
    }

    pub fn with_imagefile(self, imagefile: &'a str) -> BbuData<'a> {
        BbuData {
            imagefile: Some(imagefile),
            ..self
        }
    }

    pub fn with_devicefile(self, devicefile: &'a str) -> BbuData<'a> {
        BbuData {
            devicefile: Some(devicefile),
            ..self
        }
    }

    /// A check of the handler failed for `reason`. Returns whether the update may go on.
    pub fn force(&self, reason: &str) -> bool {
        if self.flags.contains(BbuDataFlags::FORCE) {
            warn!("{}, update forced", reason);
            true
        } else {
            error!("{}", reason);
            error!("use force to update anyway");
            false
        }
    }

    /// Updates must be confirmed up front; there is no console to ask.
    pub fn confirm(&self) -> Result<(), BbuError> {
        if self.flags.contains(BbuDataFlags::YES) {
            info!(
                "updating from {} to {}",
                self.imagefile.unwrap_or("buffer"),
                self.devicefile.unwrap_or("-")
            );
            Ok(())
        } else {
            error!("update not confirmed");
            Err(BbuError::NotConfirmed)
        }
    }
}

/// Writes an image for a [BbuHandler].
pub trait BbuUpdater: Send + Sync {
    fn update(&self, handler: &BbuHandler, data: &BbuData<'_>) -> Result<(), BbuError>;
}

impl<F> BbuUpdater for F
where
    F: Fn(&BbuHandler, &BbuData<'_>) -> Result<(), BbuError> + Send + Sync,
{
    fn update(&self, handler: &BbuHandler, data: &BbuData<'_>) -> Result<(), BbuError> {
        self(handler, data)
    }
}

pub struct BbuHandler {
    pub name: Box<str>,
    pub devicefile: Box<str>,
    pub filetype: FileType,
    pub flags: BbuHandlerFlags,
    updater: Box<dyn BbuUpdater>,
}

impl Debug for BbuHandler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BbuHandler")
            .field("name", &self.name)
            .field("devicefile", &self.devicefile)
            .field("filetype", &self.filetype)
            .field("flags", &self.flags)
            .finish()
    }
}

impl BbuHandler {
    pub fn new<U: BbuUpdater + 'static>(
        name: &str,
        devicefile: &str,
        filetype: FileType,
        flags: BbuHandlerFlags,
        updater: U,
    ) -> BbuHandler {
        BbuHandler {
            name: Box::from(name),
            devicefile: Box::from(devicefile),
            filetype,
            flags,
            updater: Box::new(updater),
        }
    }

    pub fn is_default(&self) -> bool {
        self.flags.contains(BbuHandlerFlags::DEFAULT)
    }

    /// Hand `data` to the updater, targeting the handler's device file unless `data` names one.
    pub fn write(&self, data: BbuData<'_>) -> Result<(), BbuError> {
        let data = BbuData {
            devicefile: Some(data.devicefile.unwrap_or(&*self.devicefile)),
            ..data
        };
        match self.updater.update(self, &data) {
            Ok(()) => {
                info!("update succeeded");
                Ok(())
            }
            Err(BbuError::Aborted) => {
                error!("update aborted");
                Err(BbuError::Aborted)
            }
            Err(err) => {
                error!("update with handler {} failed: {}", self.name, &err as &dyn MessageError);
                Err(err)
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct BbuRegistry {
    handlers: Vec<BbuHandler>,
}

impl BbuRegistry {
    pub const fn new() -> BbuRegistry {
        BbuRegistry {
            handlers: Vec::new(),
        }
    }

    pub fn register(&mut self, handler: BbuHandler) -> Result<(), BbuError> {
        if self.handlers.iter().any(|h| h.name == handler.name) {
            error!("update handler {} already registered", handler.name);
            return Err(BbuError::AlreadyRegistered);
        }
        if handler.is_default()
            && let Some(other) = self.handlers.iter().find(|h| h.is_default())
        {
            error!(
                "update handler {} cannot be default, {} already is",
                handler.name, other.name
            );
            return Err(BbuError::AmbiguousDefault);
        }
        info!(
            "registered update handler {} for {}{}",
            handler.name,
            handler.devicefile,
            if handler.is_default() { " (default)" } else { "" }
        );
        self.handlers.push(handler);
        Ok(())
    }

    /// Register a handler writing through [StdFileUpdater].
    pub fn register_std_file_handler<S: BlockStorage + 'static>(
        &mut self,
        name: &str,
        devicefile: &str,
        filetype: FileType,
        flags: BbuHandlerFlags,
        storage: S,
    ) -> Result<(), BbuError> {
        let updater = StdFileUpdater::new(storage, 0);
        self.register(BbuHandler::new(name, devicefile, filetype, flags, updater))
    }

    pub fn unregister(&mut self, name: &str) -> Result<BbuHandler, BbuError> {
        let pos = self
            .handlers
            .iter()
            .position(|h| &*h.name == name)
            .ok_or(BbuError::HandlerNotFound)?;
        Ok(self.handlers.remove(pos))
    }

    /// The handler called `name`, or the default handler for `None`.
    pub fn find(&self, name: Option<&str>) -> Result<&BbuHandler, BbuError> {
        match name {
            Some(name) => self
                .handlers
                .iter()
                .find(|h| &*h.name == name)
                .ok_or(BbuError::HandlerNotFound),
            None => self
                .handlers
                .iter()
                .find(|h| h.is_default())
                .ok_or(BbuError::NoDefault),
        }
    }

    pub fn find_by_device(&self, devicefile: &str) -> Option<&BbuHandler> {
        self.handlers.iter().find(|h| &*h.devicefile == devicefile)
    }

    /// Handlers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &BbuHandler> {
        self.handlers.iter()
    }

    /// Print the handlers to the log.
    pub fn list(&self) {
        if self.handlers.is_empty() {
            info!("no update handlers registered");
            return;
        }
        info!("Available update handlers:");
        for handler in &self.handlers {
            info!(
                "* {}{}",
                handler.name,
                if handler.is_default() { " (default)" } else { "" }
            );
            info!("    {}", handler.devicefile);
        }
    }

    /// Find the handler and write `data` with it.
    pub fn update(&self, name: Option<&str>, data: BbuData<'_>) -> Result<(), BbuError> {
        let handler = self.find(name).inspect_err(|err| match name {
            Some(name) => error!("update handler {} not found: {}", name, err as &dyn MessageError),
            None => error!("no default update handler: {}", err as &dyn MessageError),
        })?;
        handler.write(data)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::{string::String, sync::Arc, vec, vec::Vec};
    use spin::Mutex;

    fn nop(_: &BbuHandler, _: &BbuData<'_>) -> Result<(), BbuError> {
        Ok(())
    }

    fn handler(name: &str, flags: BbuHandlerFlags) -> BbuHandler {
        BbuHandler::new(name, "/dev/mmc0", FileType::ArmBarebox, flags, nop)
    }

    #[test]
    fn default_handler_lookup() {
        let mut reg = BbuRegistry::new();
        reg.register(handler("spi", BbuHandlerFlags::empty())).unwrap();
        assert_eq!(reg.find(None).err(), Some(BbuError::NoDefault));
        reg.register(handler("emmc", BbuHandlerFlags::DEFAULT)).unwrap();
        assert_eq!(reg.find(None).map(|h| &*h.name), Ok("emmc"));
        assert_eq!(reg.find(Some("spi")).map(|h| &*h.name), Ok("spi"));
        assert_eq!(reg.find(Some("nand")).err(), Some(BbuError::HandlerNotFound));
    }

    #[test]
    fn second_default_is_rejected() {
        let mut reg = BbuRegistry::new();
        reg.register(handler("emmc", BbuHandlerFlags::DEFAULT)).unwrap();
        assert_eq!(
            reg.register(handler("spi", BbuHandlerFlags::DEFAULT | BbuHandlerFlags::CAN_REFRESH)),
            Err(BbuError::AmbiguousDefault)
        );
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.find(None).map(|h| &*h.name), Ok("emmc"));
        // the slot is free again once the default is gone
        reg.unregister("emmc").unwrap();
        reg.register(handler("spi", BbuHandlerFlags::DEFAULT)).unwrap();
        assert_eq!(reg.find(None).map(|h| &*h.name), Ok("spi"));
    }

    #[test]
    fn names_are_unique() {
        let mut reg = BbuRegistry::new();
        reg.register(handler("emmc", BbuHandlerFlags::empty())).unwrap();
        assert_eq!(
            reg.register(handler("emmc", BbuHandlerFlags::empty())),
            Err(BbuError::AlreadyRegistered)
        );
        assert_eq!(reg.unregister("nand").err(), Some(BbuError::HandlerNotFound));
    }

    #[test]
    fn write_targets_handler_device_unless_overridden() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::default();
        let s = seen.clone();
        let mut reg = BbuRegistry::new();
        reg.register(BbuHandler::new(
            "emmc",
            "/dev/mmc2.boot0",
            FileType::ArmBarebox,
            BbuHandlerFlags::DEFAULT,
            move |_: &BbuHandler, data: &BbuData<'_>| -> Result<(), BbuError> {
                s.lock().push(String::from(data.devicefile.unwrap_or("")));
                Ok(())
            },
        ))
        .unwrap();
        let image = [1u8; 16];
        let data = BbuData::new(&image, FileType::ArmBarebox);
        reg.update(None, data).unwrap();
        reg.update(Some("emmc"), data.with_devicefile("/dev/mmc2.boot1")).unwrap();
        assert_eq!(*seen.lock(), vec!["/dev/mmc2.boot0", "/dev/mmc2.boot1"]);
        assert_eq!(reg.find_by_device("/dev/mmc2.boot0").map(|h| &*h.name), Some("emmc"));
    }

    #[test]
    fn handler_errors_reach_the_caller() {
        let mut reg = BbuRegistry::new();
        reg.register(BbuHandler::new(
            "nand",
            "/dev/nand0",
            FileType::ImxImage,
            BbuHandlerFlags::empty(),
            |_: &BbuHandler, _: &BbuData<'_>| -> Result<(), BbuError> { Err(BbuError::Aborted) },
        ))
        .unwrap();
        let data = BbuData::new(&[0], FileType::ImxImage);
        assert_eq!(reg.update(Some("nand"), data), Err(BbuError::Aborted));
        assert_eq!(reg.update(None, data), Err(BbuError::NoDefault));
    }

    #[test]
    fn force_and_confirm_follow_flags() {
        let data = BbuData::new(&[0], FileType::Unknown);
        assert!(!data.force("wrong image"));
        assert_eq!(data.confirm(), Err(BbuError::NotConfirmed));
        let data = data.with_flags(BbuDataFlags::FORCE | BbuDataFlags::YES);
        assert!(data.force("wrong image"));
        assert_eq!(data.confirm(), Ok(()));
    }
}
