//! The driver record contract.
//!
//! A driver is a static, linker-collected record: a name, a human-readable
//! description, a `compatible` string matched against device tree nodes, a
//! version, and an `attach` entry point. The core kernel never calls into a
//! driver beyond `attach`; everything else (interrupt registration, timer
//! binding, console registration) happens through calls the driver itself
//! makes back into the kernel from within `attach`.

use crate::error::DriverError;
use hadron_fdt::FdtNode;

/// A statically-allocated driver record.
///
/// Every driver in the system defines exactly one `'static DriverRecord` and
/// places a pointer to it in the `utk_driver_tbl` linker section via
/// [`hadron_linkset`](https://docs.rs/hadron-linkset)'s `linkset_entry!` macro, so
/// the driver manager can walk the whole table without the driver crate
/// depending on the manager.
pub struct DriverRecord {
    /// Short identifier, e.g. `"ns16550a"`.
    pub name: &'static str,
    /// One-line human-readable description.
    pub description: &'static str,
    /// The device tree `compatible` string this driver matches, e.g.
    /// `"ns16550a"` or `"arm,pl011"`.
    pub compatible: &'static str,
    /// Driver version, compared against `DevMgr` when multiple drivers claim
    /// the same `compatible` string (highest version wins).
    pub version: u32,
    /// Attaches the driver to a matched device tree node.
    ///
    /// May initialize hardware, register interrupt handlers, attach device
    /// data to the node, or register itself as a timer/console/interrupt
    /// controller provider. Returning `Err` marks the attach attempt failed;
    /// the driver manager logs it and continues unless the driver is
    /// declared critical (see [`DriverRecord::critical`]).
    pub attach: fn(&FdtNode<'_>) -> Result<(), DriverError>,
    /// If `true`, an attach failure for this driver escalates to a kernel
    /// panic instead of being logged and skipped.
    pub critical: bool,
}

impl DriverRecord {
    /// Invokes this driver's `attach` entry point against a matched node.
    pub fn attach(&self, node: &FdtNode<'_>) -> Result<(), DriverError> {
        (self.attach)(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_attach(_node: &FdtNode<'_>) -> Result<(), DriverError> {
        Ok(())
    }

    #[test]
    fn attach_forwards_to_function_pointer() {
        let record = DriverRecord {
            name: "stub",
            description: "test stub driver",
            compatible: "vendor,stub",
            version: 1,
            attach: stub_attach,
            critical: false,
        };
        assert_eq!(record.name, "stub");
        assert_eq!(record.version, 1);
        assert!(!record.critical);
    }
}
