//! Device tree walk and driver manager.
//!
//! Depth-first walks the flattened device tree once at boot. For each node
//! with a `compatible` property, scans the linker-gathered driver table for
//! the best match (exact `compatible` string, highest [`DriverRecord::version`]
//! on a tie) and calls its `attach`. A critical driver's attach failure
//! escalates to a kernel panic; any other failure is logged and the walk
//! continues into the node's children regardless.

use alloc::collections::BTreeMap;

use hadron_core::sync::IrqSpinLock;
use hadron_core::{kinfo, kwarn};
use hadron_driver_api::DriverRecord;
use hadron_fdt::{Fdt, FdtNode};

hadron_linkset::declare_linkset! {
    /// Every driver record linked into the kernel image.
    pub fn driver_table() -> [&'static DriverRecord],
    section = "utk_driver_tbl"
}

/// Per-device opaque data, keyed by the node's `phandle`.
///
/// A driver's `attach` stashes whatever it needs to find its device again
/// later (a register base, an index into its own table) here, and other
/// code looks it up by the same phandle used to reference the node from
/// elsewhere in the tree (e.g. an `interrupt-parent` property).
static DEVICE_DATA: IrqSpinLock<BTreeMap<u32, usize>> = IrqSpinLock::new(BTreeMap::new());

/// Records `data` against `phandle`, overwriting any previous value.
pub fn driver_manager_set_device_data(phandle: u32, data: usize) {
    DEVICE_DATA.lock().insert(phandle, data);
}

/// Returns the data previously recorded for `phandle`, if any.
pub fn driver_manager_get_device_data(phandle: u32) -> Option<usize> {
    DEVICE_DATA.lock().get(&phandle).copied()
}

fn find_driver(node: &FdtNode<'_>) -> Option<&'static DriverRecord> {
    let compatible = node.property("compatible")?;
    let mut best: Option<&'static DriverRecord> = None;
    for candidate in compatible.as_str_list() {
        for driver in driver_table() {
            if driver.compatible != candidate {
                continue;
            }
            best = match best {
                Some(current) if current.version >= driver.version => Some(current),
                _ => Some(*driver),
            };
        }
    }
    best
}

/// Walks every node in `fdt`, attaching the best-matching driver to each.
pub fn probe(fdt: &Fdt<'_>) {
    walk(&fdt.root());
}

fn walk(node: &FdtNode<'_>) {
    if let Some(driver) = find_driver(node) {
        match driver.attach(node) {
            Ok(()) => {
                kinfo!("driver {} attached to {}", driver.name, node.name());
            }
            Err(err) => {
                if driver.critical {
                    panic!(
                        "critical driver {} failed to attach to {}: {err}",
                        driver.name,
                        node.name()
                    );
                }
                kwarn!(
                    "driver {} failed to attach to {}: {err}",
                    driver.name,
                    node.name()
                );
            }
        }
    }

    for child in node.children() {
        walk(&child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_data_round_trips_by_phandle() {
        assert_eq!(driver_manager_get_device_data(99), None);
        driver_manager_set_device_data(99, 0xdead_beef);
        assert_eq!(driver_manager_get_device_data(99), Some(0xdead_beef));
        driver_manager_set_device_data(99, 0xf00d);
        assert_eq!(driver_manager_get_device_data(99), Some(0xf00d));
    }
}
