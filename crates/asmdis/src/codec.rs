//! Operand codec primitives: opcode bit fields, endian-aware byte order, and
//! the memory-reader interface decode pulls bytes from.

use crate::config::Endian;
use crate::error::ErrorKind;
use crate::resolver::fits_field;

/// A bit field inside an opcode word or postbyte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Position of the least significant bit.
    pub shift: u8,
    /// Field width in bits.
    pub bits: u8,
}

impl Field {
    /// A field of `bits` bits starting at bit `shift`.
    pub const fn new(shift: u8, bits: u8) -> Self {
        Self { shift, bits }
    }

    /// The field's bits in place.
    #[inline]
    pub const fn mask(&self) -> u16 {
        (((1u32 << self.bits) - 1) << self.shift) as u16
    }

    /// `word` with this field replaced by the low bits of `value`.
    #[inline]
    pub const fn insert(&self, word: u16, value: u16) -> u16 {
        let m = self.mask();
        (word & !m) | (((value as u32) << self.shift) as u16 & m)
    }

    /// The field's value, right-aligned.
    #[inline]
    pub const fn extract(&self, word: u16) -> u16 {
        (word & self.mask()) >> self.shift
    }
}

/// Validate that `value` fits a `bits`-bit immediate field (signed or
/// unsigned reading).
///
/// # Errors
///
/// `OverflowRange` when it does not.
#[inline]
pub fn check_range(value: i64, bits: u32) -> Result<(), ErrorKind> {
    if fits_field(value, bits) {
        Ok(())
    } else {
        Err(ErrorKind::OverflowRange)
    }
}

/// `value` as two bytes in `endian` order.
#[inline]
pub fn u16_bytes(value: u16, endian: Endian) -> [u8; 2] {
    match endian {
        Endian::Little => value.to_le_bytes(),
        Endian::Big => value.to_be_bytes(),
    }
}

/// `value` as four bytes in `endian` order.
#[inline]
pub fn u32_bytes(value: u32, endian: Endian) -> [u8; 4] {
    match endian {
        Endian::Little => value.to_le_bytes(),
        Endian::Big => value.to_be_bytes(),
    }
}

/// Two bytes in `endian` order as a `u16`.
#[inline]
pub fn u16_from(bytes: [u8; 2], endian: Endian) -> u16 {
    match endian {
        Endian::Little => u16::from_le_bytes(bytes),
        Endian::Big => u16::from_be_bytes(bytes),
    }
}

/// Four bytes in `endian` order as a `u32`.
#[inline]
pub fn u32_from(bytes: [u8; 4], endian: Endian) -> u32 {
    match endian {
        Endian::Little => u32::from_le_bytes(bytes),
        Endian::Big => u32::from_be_bytes(bytes),
    }
}

// ─── Memory readers ─────────────────────────────────────────────────────

/// Byte source for decode.
pub trait MemoryReader {
    /// Next byte, or `None` when memory is exhausted.
    fn read_byte(&mut self) -> Option<u8>;

    /// Address of the next byte.
    fn address(&self) -> u64;
}

/// A byte slice mapped at a base address.
///
/// ```rust
/// use asmdis::{ArrayMemory, MemoryReader};
///
/// let mut mem = ArrayMemory::new(0x100, &[0x12, 0x34]);
/// assert_eq!(mem.read_byte(), Some(0x12));
/// assert_eq!(mem.address(), 0x101);
/// ```
#[derive(Debug, Clone)]
pub struct ArrayMemory<'a> {
    base: u64,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ArrayMemory<'a> {
    /// Map `bytes` at `base`.
    #[must_use]
    pub fn new(base: u64, bytes: &'a [u8]) -> Self {
        Self { base, bytes, pos: 0 }
    }

    /// Bytes not yet read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// Whether every byte has been read.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    /// Move the read position to `address`. Returns false (and stays put)
    /// when the address is outside the mapped range.
    pub fn seek(&mut self, address: u64) -> bool {
        match address.checked_sub(self.base) {
            Some(off) if off <= self.bytes.len() as u64 => {
                self.pos = off as usize;
                true
            }
            _ => false,
        }
    }
}

impl MemoryReader for ArrayMemory<'_> {
    fn read_byte(&mut self) -> Option<u8> {
        let b = self.bytes.get(self.pos).copied()?;
        self.pos += 1;
        Some(b)
    }

    fn address(&self) -> u64 {
        self.base + self.pos as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_insert_extract() {
        let reg = Field::new(9, 3);
        assert_eq!(reg.mask(), 0x0E00);
        let w = reg.insert(0xD000, 3);
        assert_eq!(w, 0xD600);
        assert_eq!(reg.extract(w), 3);
        // Excess bits are dropped.
        assert_eq!(reg.insert(0, 0xF), 0x0E00);
    }

    #[test]
    fn field_full_width() {
        let f = Field::new(0, 16);
        assert_eq!(f.mask(), 0xFFFF);
        assert_eq!(f.extract(0xBEEF), 0xBEEF);
    }

    #[test]
    fn range_checks() {
        assert!(check_range(-128, 8).is_ok());
        assert!(check_range(255, 8).is_ok());
        assert_eq!(check_range(256, 8), Err(ErrorKind::OverflowRange));
    }

    #[test]
    fn byte_order() {
        assert_eq!(u16_bytes(0x1234, Endian::Little), [0x34, 0x12]);
        assert_eq!(u16_bytes(0x1234, Endian::Big), [0x12, 0x34]);
        assert_eq!(u32_bytes(0x12345678, Endian::Big), [0x12, 0x34, 0x56, 0x78]);
        assert_eq!(u16_from([0x34, 0x12], Endian::Little), 0x1234);
        assert_eq!(u32_from([0x78, 0x56, 0x34, 0x12], Endian::Little), 0x12345678);
    }

    #[test]
    fn array_memory_reads_in_order() {
        let mut mem = ArrayMemory::new(0x2000, &[1, 2, 3]);
        assert_eq!(mem.address(), 0x2000);
        assert_eq!(mem.read_byte(), Some(1));
        assert_eq!(mem.remaining(), 2);
        assert_eq!(mem.read_byte(), Some(2));
        assert_eq!(mem.read_byte(), Some(3));
        assert!(mem.is_empty());
        assert_eq!(mem.read_byte(), None);
        assert_eq!(mem.address(), 0x2003);
    }

    #[test]
    fn array_memory_seek() {
        let mut mem = ArrayMemory::new(0x10, &[9, 8, 7]);
        assert!(mem.seek(0x12));
        assert_eq!(mem.read_byte(), Some(7));
        assert!(!mem.seek(0x0F));
        assert!(!mem.seek(0x14));
        assert_eq!(mem.address(), 0x13);
    }
}
