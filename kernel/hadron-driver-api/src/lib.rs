//! Driver record contract shared between device drivers and the kernel's
//! device tree walk.
//!
//! A driver crate defines one or more [`DriverRecord`]s and registers them
//! into the `utk_driver_tbl` linker section with `hadron-linkset`. The
//! kernel's driver manager walks the device tree, and for each node with a
//! `compatible` property, scans this table for a matching record and calls
//! its `attach` entry point. The core never reaches into a driver beyond
//! that call.

#![cfg_attr(not(test), no_std)]

pub mod driver;
pub mod error;

pub use driver::DriverRecord;
pub use error::DriverError;
