//! Build-time configuration of the boot core.
//!
//! Every key of `flags.json` at the workspace root becomes a `usize` constant
//! of the same name.

#![no_std]
#![deny(missing_docs)]

include!(concat!(env!("OUT_DIR"), "/build_flags.rs"));
