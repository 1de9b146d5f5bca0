use crate::diag::{Abort, Diagnostic, Reporter};
use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BankId(pub u32);

impl BankId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Uninitialized ROM bytes keep this value in the final image.
pub const PAD_VALUE: u8 = 0xFF;

/// Highest address representable by the 16-bit target.
pub const ADDRESS_MAX: u32 = 65535;

/// A named, contiguous region of address space. Physical (ROM-backed)
/// banks own storage that ends up in the output image; RAM-only banks
/// track reservations without storage.
///
/// The position cursor never exceeds capacity, and the origin, once fixed
/// by a relocation, never moves backward. All violations are fatal: later
/// allocation would cascade off a corrupt layout.
#[derive(Debug, Clone)]
pub struct Bank {
    name: String,
    physical: bool,
    capacity: u32,
    initialized: bool,
    origin: u32,
    position: u32,
    data: Vec<u8>,
}

impl Bank {
    pub fn new(name: impl Into<String>, physical: bool, capacity: u32) -> Self {
        let data = if physical {
            vec![PAD_VALUE; capacity as usize]
        } else {
            Vec::new()
        };
        Self {
            name: name.into(),
            physical,
            capacity,
            initialized: false,
            origin: 0,
            position: 0,
            data,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn physical(&self) -> bool {
        self.physical
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    fn describe(&self) -> String {
        let kind = if self.physical { "rom" } else { "ram" };
        format!("'{} : {} * {}'", self.name, kind, self.capacity)
    }

    /// Reset the cursor and origin between passes. The byte buffer is kept:
    /// the emission pass overwrites what the reservation pass sized.
    pub fn rewind(&mut self) {
        self.position = 0;
        self.initialized = false;
    }

    /// Advance the cursor by `size` bytes of address space.
    pub fn reserve(
        &mut self,
        description: &str,
        size: u32,
        span: Span,
        reporter: &mut Reporter,
    ) -> Result<(), Abort> {
        if !self.initialized {
            return Err(reporter.fatal(Diagnostic::error(
                span,
                format!(
                    "{description} found inside {}, but the bank has no address yet",
                    self.describe()
                ),
            )));
        }
        if self.position + size > self.capacity {
            let overage = self.position + size - self.capacity;
            return Err(reporter.fatal(Diagnostic::error(
                span,
                format!(
                    "{description} needs {size} byte(s), which exceeds the remaining space in {} by {overage} byte(s)",
                    self.describe()
                ),
            )));
        }
        self.position += size;
        Ok(())
    }

    /// Reserve RAM-only storage; rejected in a ROM bank.
    pub fn reserve_virtual(
        &mut self,
        description: &str,
        size: u32,
        span: Span,
        reporter: &mut Reporter,
    ) -> Result<(), Abort> {
        if self.physical {
            return Err(reporter.fatal(Diagnostic::error(
                span,
                format!("{description} is not allowed in {}", self.describe()),
            )));
        }
        self.reserve(description, size, span, reporter)
    }

    /// Reserve bytes that need ROM storage; rejected in a RAM bank.
    pub fn reserve_physical(
        &mut self,
        description: &str,
        size: u32,
        span: Span,
        reporter: &mut Reporter,
    ) -> Result<(), Abort> {
        if !self.physical {
            return Err(reporter.fatal(Diagnostic::error(
                span,
                format!("{description} is not allowed in {}", self.describe()),
            )));
        }
        self.reserve(description, size, span, reporter)
    }

    /// Store bytes at the cursor in a ROM bank's buffer, advancing it.
    pub fn write_physical(
        &mut self,
        bytes: &[u8],
        span: Span,
        reporter: &mut Reporter,
    ) -> Result<(), Abort> {
        if !self.physical {
            return Err(reporter.fatal(Diagnostic::error(
                span,
                format!("attempt to write into {}", self.describe()),
            )));
        }
        if self.position as usize + bytes.len() > self.capacity as usize {
            return Err(reporter.fatal(Diagnostic::error(
                span,
                "attempt to write outside of bank's reserved space",
            )));
        }
        let start = self.position as usize;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        self.position += bytes.len() as u32;
        Ok(())
    }

    /// The absolute address at the cursor: `origin + position`.
    pub fn check_address(
        &self,
        description: &str,
        span: Span,
        reporter: &mut Reporter,
    ) -> Result<u32, Abort> {
        if self.initialized {
            Ok(self.origin + self.position)
        } else {
            Err(reporter.fatal(Diagnostic::error(
                span,
                format!(
                    "{description} is not allowed in {} before knowing its start address",
                    self.describe()
                ),
            )))
        }
    }

    /// Fix the origin on first use; afterwards an explicit address is an
    /// implicit reserve of the gap, and moving backward is a hard error.
    pub fn set_address(
        &mut self,
        description: &str,
        dest: u32,
        span: Span,
        reporter: &mut Reporter,
    ) -> Result<(), Abort> {
        if self.initialized {
            let current = self.origin + self.position;
            if dest < current {
                return Err(reporter.fatal(Diagnostic::error(
                    span,
                    format!(
                        "attempt to move backwards within {} (location 0x{current:04X} -> 0x{dest:04X})",
                        self.describe()
                    ),
                )));
            }
            return self.reserve(description, dest - current, span, reporter);
        }

        if dest + self.capacity > ADDRESS_MAX + 1 {
            return Err(reporter.fatal(Diagnostic::error(
                span,
                format!(
                    "{} with start location {dest} (0x{dest:04X}) has an invalid upper bound {end} (0x{end:04X}), outside of addressable memory 0..{ADDRESS_MAX}",
                    self.describe(),
                    end = dest + self.capacity,
                ),
            )));
        }
        self.origin = dest;
        self.initialized = true;
        Ok(())
    }

    /// Append this bank's storage to the output image. RAM banks contribute
    /// nothing.
    pub fn dump(&self, buffer: &mut Vec<u8>) {
        if self.physical {
            buffer.extend_from_slice(&self.data);
        }
    }
}
