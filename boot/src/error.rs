//! This module defines traits for the error types reported during boot

use core::fmt::{Debug, Display, Write};

/// An error that can be printed to the boot log
pub trait MessageError: Debug {
    /// The errno-style name of the error class, e.g. `ENODEV`
    fn errno_name(&self) -> &'static str;

    /// Print the error message to a writer
    fn print_to_writer(&self, f: &mut dyn Write) -> core::fmt::Result {
        f.write_fmt(format_args!("{} ({:?})", self.errno_name(), self))
    }
}

impl Display for dyn MessageError + '_ {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.print_to_writer(f)
    }
}

impl MessageError for dt::prop::PropertyError {
    fn errno_name(&self) -> &'static str {
        match self {
            dt::prop::PropertyError::InvalidPropFormat => "EINVAL",
            dt::prop::PropertyError::PropNotFound => "ENOENT",
            dt::prop::PropertyError::DanglingHandle => "ENODEV",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use dt::prop::PropertyError;

    #[test]
    fn renders_errno_and_variant() {
        let err = PropertyError::PropNotFound;
        let msg = (&err as &dyn MessageError).to_string();
        assert_eq!(msg, "ENOENT (PropNotFound)");
    }
}
