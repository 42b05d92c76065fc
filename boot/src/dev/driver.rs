//! Driver trait and the errors a probe can end with.

use crate::{
    dev::{device::Device, matching::OfDeviceId},
    error::MessageError,
    machine::Machine,
};
use bitflags::bitflags;
use core::fmt::Debug;
use dt::prop::PropertyError;

bitflags! {
    pub struct DriverFlags: u32 {
        /// The driver may be bound to more than one node.
        const MULTI_INSTANCE = 0b1;
    }
}

/// Trait implemented by drivers.
///
/// - [Driver::get_of_ids] lists the compatibles the driver handles; the core
///   picks the driver whose entry matches the most specific compatible of a node.
/// - [Driver::probe] binds the driver to a matched [Device]. Board services
///   (restart handlers, update handlers, memory regions) are reached through
///   the [Machine] passed along.
/// - A driver binds to one node unless its flags include
///   [DriverFlags::MULTI_INSTANCE].
pub trait Driver: Sync + Debug {
    fn get_name(&self) -> &'static str;
    fn get_of_ids(&self) -> &'static [OfDeviceId];
    fn probe(&self, dev: &Device<'_>, machine: &mut Machine) -> Result<(), DriverProbeError>;

    /// Called when the device is shut down. Returns whether the driver had anything to do.
    fn remove(&self, _dev: &Device<'_>, _machine: &mut Machine) -> bool {
        false
    }

    fn get_flags(&self) -> DriverFlags {
        DriverFlags::empty()
    }

    fn on_registered(&self) {}
}

// region: Error Types

/// Errors that may be returned by [Driver::probe].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverProbeError {
    /// The hardware is not there.
    NoDevice,
    /// The hardware does not answer at the given address.
    NoAddress,
    /// A resource the driver needs is not available yet; try again later.
    Defer { reason: &'static str },
    /// MMIO-related failures (address missing or invalid).
    Mmio(MmioError),
    /// The node lacks a property the driver needs, or has a malformed one.
    Property(PropertyError),
    /// A sub-device failed to initialize; propagate up.
    SubDeviceError,
    /// Custom driver-specific information.
    Customized { info: &'static str },
}

impl DriverProbeError {
    /// Absent hardware is logged at debug level only.
    pub fn is_quiet(&self) -> bool {
        matches!(self, DriverProbeError::NoDevice | DriverProbeError::NoAddress)
    }
}

impl From<MmioError> for DriverProbeError {
    fn from(value: MmioError) -> Self {
        DriverProbeError::Mmio(value)
    }
}

impl From<PropertyError> for DriverProbeError {
    fn from(value: PropertyError) -> Self {
        DriverProbeError::Property(value)
    }
}

impl MessageError for DriverProbeError {
    fn errno_name(&self) -> &'static str {
        match self {
            DriverProbeError::NoDevice => "ENODEV",
            DriverProbeError::NoAddress => "ENXIO",
            DriverProbeError::Defer { .. } => "EPROBE_DEFER",
            DriverProbeError::Mmio(err) => err.errno_name(),
            DriverProbeError::Property(err) => err.errno_name(),
            DriverProbeError::SubDeviceError => "EIO",
            DriverProbeError::Customized { .. } => "EINVAL",
        }
    }
}

/// MMIO-related probe failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmioError {
    /// MMIO address is invalid or out of supported range.
    InvalidAddress,
    /// Device did not specify MMIO resources.
    AddressNotSpecified,
    /// The region is already requested by someone else.
    Busy,
}

impl MessageError for MmioError {
    fn errno_name(&self) -> &'static str {
        match self {
            MmioError::InvalidAddress => "EFAULT",
            MmioError::AddressNotSpecified => "ENXIO",
            MmioError::Busy => "EBUSY",
        }
    }
}

// endregion
