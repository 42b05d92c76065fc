//! Boot-time driver model and board service registries.
//!
//! The crate binds drivers to device-tree nodes level by level, resolves
//! deep-probe dependencies along phandle references, and keeps the
//! registries board code fills during init: restart and poweroff handlers,
//! notifier chains, memory regions and firmware update (BBU) handlers.
#![cfg_attr(not(test), no_std)]
extern crate alloc;

#[macro_use]
pub mod logging;
pub mod bbu;
pub mod dev;
pub mod error;
pub mod init;
pub mod machine;
pub mod notifier;
pub mod power;
pub mod prio;
pub mod resource;
