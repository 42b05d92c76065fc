//! Driver model: match tables, drivers, devices and their binding.

pub mod bind;
pub mod deep_probe;
pub mod device;
pub mod driver;
pub mod matching;

pub use bind::{BindSession, DriverCore, DriverId};
pub use deep_probe::{DeepProbe, DeepProbeEntry, ProbeSet};
pub use device::{Device, DeviceState};
pub use driver::{Driver, DriverFlags, DriverProbeError, MmioError};
pub use matching::{OfDeviceId, OfMatch, of_device_is_compatible, of_match_node};
