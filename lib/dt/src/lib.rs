//! Arena-indexed device tree used by the boot core.
//!
//! Nodes live in one vector and refer to their parent, children and phandle
//! targets by index, so reference cycles between nodes are plain data.
#![cfg_attr(not(test), no_std)]
extern crate alloc;

pub mod builder;
pub mod node;
pub mod phandle;
pub mod prop;
