//! Error type returned by driver attach routines and the driver manager.

use core::fmt;

/// Errors a driver's `attach` routine, or the driver manager itself, can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// No registered driver declared a `compatible` string matching the node.
    NoMatchingDriver,
    /// The node's required properties were missing or malformed.
    InvalidNode,
    /// A resource the driver needs (IRQ line, MMIO window, timer role) was
    /// already claimed by another driver.
    ResourceBusy,
    /// The underlying hardware did not respond as expected during probe.
    ProbeFailed,
    /// The driver does not support the operation requested of it.
    Unsupported,
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            DriverError::NoMatchingDriver => "no driver is compatible with this node",
            DriverError::InvalidNode => "device tree node is missing required properties",
            DriverError::ResourceBusy => "requested resource is already claimed",
            DriverError::ProbeFailed => "hardware probe failed",
            DriverError::Unsupported => "operation not supported by this driver",
        };
        f.write_str(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write;

    struct StackBuf {
        data: [u8; 64],
        len: usize,
    }

    impl Write for StackBuf {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            let bytes = s.as_bytes();
            self.data[self.len..self.len + bytes.len()].copy_from_slice(bytes);
            self.len += bytes.len();
            Ok(())
        }
    }

    fn render(e: DriverError) -> StackBuf {
        let mut buf = StackBuf {
            data: [0; 64],
            len: 0,
        };
        write!(buf, "{e}").unwrap();
        buf
    }

    #[test]
    fn display_is_non_empty_for_every_variant() {
        let variants = [
            DriverError::NoMatchingDriver,
            DriverError::InvalidNode,
            DriverError::ResourceBusy,
            DriverError::ProbeFailed,
            DriverError::Unsupported,
        ];
        for v in variants {
            assert!(render(v).len > 0);
        }
    }

    #[test]
    fn display_text_matches_variant() {
        let buf = render(DriverError::ResourceBusy);
        assert_eq!(&buf.data[..buf.len], b"requested resource is already claimed");
    }
}
