//! Matching `compatible` strings against driver id tables.

use core::{any::Any, fmt::Debug};

/// One entry of a driver's match table.
pub struct OfDeviceId {
    pub compatible: &'static str,
    /// Driver private data handed to the bound device.
    pub data: Option<&'static (dyn Any + Send + Sync)>,
}

impl OfDeviceId {
    pub const fn new(compatible: &'static str) -> OfDeviceId {
        OfDeviceId {
            compatible,
            data: None,
        }
    }

    pub const fn with_data(compatible: &'static str, data: &'static (dyn Any + Send + Sync)) -> OfDeviceId {
        OfDeviceId {
            compatible,
            data: Some(data),
        }
    }
}

impl Debug for OfDeviceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OfDeviceId")
            .field("compatible", &self.compatible)
            .field("data", &self.data.is_some())
            .finish()
    }
}

/// A successful match.
#[derive(Debug, Clone, Copy)]
pub struct OfMatch<'a> {
    pub id: &'a OfDeviceId,
    /// Index of the matched string in the node's compatible list; lower is more specific.
    pub rank: usize,
}

/// Position of `compat` in a node's compatible list.
pub fn of_device_is_compatible(compatibles: &[&str], compat: &str) -> Option<usize> {
    compatibles.iter().position(|c| *c == compat)
}

/// Find the entry of `table` matching the most specific string of `compatibles`.
///
/// Strings are compared exactly. Among table entries naming the same string the first one wins.
pub fn of_match_node<'a>(compatibles: &[&str], table: &'a [OfDeviceId]) -> Option<OfMatch<'a>> {
    compatibles.iter().enumerate().find_map(|(rank, compat)| {
        table
            .iter()
            .find(|id| id.compatible == *compat)
            .map(|id| OfMatch { id, rank })
    })
}
