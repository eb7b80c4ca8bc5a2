//! Per-call instruction state for encode and decode.
//!
//! An [`AsmInsn`] or [`DisInsn`] is created fresh for every call, owns a
//! fixed-capacity byte buffer bounded by the configuration's longest
//! instruction, and is dropped when the call returns.

use core::fmt;

use alloc::vec::Vec;

use crate::codec::{u16_bytes, u16_from, u32_bytes, u32_from, MemoryReader};
use crate::config::{Config, Endian};
use crate::error::{AsmError, ErrorAt, ErrorKind, Span};
use crate::expr::Value;

/// Hard capacity of an instruction buffer.
pub const MAX_INSN_BYTES: usize = 16;

// ─── InsnBytes: stack-allocated instruction buffer ────────────────────

/// Stack-allocated buffer for one instruction's bytes.
///
/// Derefs to `[u8]`. Appends are fallible: exceeding the limit yields
/// [`ErrorKind::BufferOverflow`] instead of a panic.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct InsnBytes {
    data: [u8; MAX_INSN_BYTES],
    len: u8,
    limit: u8,
}

impl InsnBytes {
    /// An empty buffer holding at most `limit` bytes (clamped to
    /// [`MAX_INSN_BYTES`]).
    #[inline]
    pub const fn new(limit: usize) -> Self {
        let limit = if limit > MAX_INSN_BYTES {
            MAX_INSN_BYTES
        } else {
            limit
        };
        Self {
            data: [0; MAX_INSN_BYTES],
            len: 0,
            limit: limit as u8,
        }
    }

    /// Append a single byte.
    ///
    /// # Errors
    ///
    /// `BufferOverflow` when the buffer is full.
    #[inline]
    pub fn push(&mut self, byte: u8) -> Result<(), ErrorKind> {
        if self.len >= self.limit {
            return Err(ErrorKind::BufferOverflow);
        }
        self.data[self.len as usize] = byte;
        self.len += 1;
        Ok(())
    }

    /// Append a slice of bytes; nothing is appended on overflow.
    ///
    /// # Errors
    ///
    /// `BufferOverflow` when the bytes do not fit.
    #[inline]
    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> Result<(), ErrorKind> {
        let start = self.len as usize;
        let end = start + bytes.len();
        if end > self.limit as usize {
            return Err(ErrorKind::BufferOverflow);
        }
        self.data[start..end].copy_from_slice(bytes);
        self.len = end as u8;
        Ok(())
    }

    /// Overwrite the byte at `pos`.
    ///
    /// # Errors
    ///
    /// `BufferOverflow` when `pos` is past the end.
    #[inline]
    pub fn set(&mut self, pos: usize, byte: u8) -> Result<(), ErrorKind> {
        if pos >= self.len as usize {
            return Err(ErrorKind::BufferOverflow);
        }
        self.data[pos] = byte;
        Ok(())
    }

    /// Number of bytes held.
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Whether the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Convert to a heap-allocated `Vec<u8>`.
    #[inline]
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_ref().to_vec()
    }
}

impl core::ops::Deref for InsnBytes {
    type Target = [u8];
    #[inline]
    fn deref(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }
}

impl AsRef<[u8]> for InsnBytes {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl fmt::Debug for InsnBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl PartialEq<[u8]> for InsnBytes {
    fn eq(&self, other: &[u8]) -> bool {
        **self == *other
    }
}

impl PartialEq<Vec<u8>> for InsnBytes {
    fn eq(&self, other: &Vec<u8>) -> bool {
        **self == **other
    }
}

// ─── Stages ─────────────────────────────────────────────────────────────

/// Encode progress. Any stage may move to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EncodeStage {
    /// Nothing done yet.
    Init,
    /// A table entry was found for the mnemonic and operands.
    NameResolved,
    /// A deferred addressing-mode choice (e.g. branch width) was made.
    AddrModeDetermined,
    /// All operand bits were written.
    OperandsEncoded,
    /// Finished without error.
    Done,
    /// Stopped with an error; partial bytes are kept.
    Failed(ErrorKind),
}

/// Decode progress. Any stage may move to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DecodeStage {
    /// Nothing read yet.
    Init,
    /// Prefix and opcode bytes were read.
    OpcodeRead,
    /// A table entry matched the opcode.
    EntryResolved,
    /// All operands were read and formatted.
    OperandsDecoded,
    /// Finished without error.
    Done,
    /// Stopped with an error.
    Failed(ErrorKind),
}

/// Attach a source span to an operand-level error.
pub trait ResultExt<T> {
    /// Map `Err(kind)` to `Err(AsmError { kind, span })`.
    ///
    /// # Errors
    ///
    /// Propagates the original error with `span` attached.
    fn at(self, span: Span) -> Result<T, AsmError>;
}

impl<T> ResultExt<T> for Result<T, ErrorKind> {
    #[inline]
    fn at(self, span: Span) -> Result<T, AsmError> {
        self.map_err(|kind| AsmError::new(kind, span))
    }
}

// ─── Encode state ───────────────────────────────────────────────────────

/// Mutable state of one encode call.
#[derive(Debug, Clone)]
pub struct AsmInsn {
    address: u64,
    endian: Endian,
    bytes: InsnBytes,
    error: ErrorAt<Span>,
    stage: EncodeStage,
}

impl AsmInsn {
    /// Fresh state for an instruction at `address`.
    #[must_use]
    pub fn new(address: u64, config: &Config) -> Self {
        Self {
            address,
            endian: config.endian(),
            bytes: InsnBytes::new(config.max_insn_len()),
            error: ErrorAt::new(),
            stage: EncodeStage::Init,
        }
    }

    /// Address of the first byte.
    #[inline]
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Bytes emitted so far.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of bytes emitted so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether nothing has been emitted.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Current stage.
    #[inline]
    pub fn stage(&self) -> EncodeStage {
        self.stage
    }

    /// The sticky error cell.
    #[inline]
    pub fn error(&self) -> &ErrorAt<Span> {
        &self.error
    }

    /// Move to `stage`.
    pub fn advance(&mut self, stage: EncodeStage) {
        log::trace!("encode {:#x}: {:?} -> {:?}", self.address, self.stage, stage);
        self.stage = stage;
    }

    /// Record a failure; the first real error stays.
    pub fn fail(&mut self, err: AsmError) {
        self.error.set_if_ok(err.kind, err.span);
        let kind = self.error.kind().unwrap_or(err.kind);
        self.advance(EncodeStage::Failed(kind));
    }

    /// Record an `UndefinedSymbol` warning if `value` is undefined.
    pub fn note_undefined(&mut self, value: &Value, span: Span) {
        if value.undefined {
            self.error.set_if_ok(ErrorKind::UndefinedSymbol, span);
        }
    }

    /// Append one byte.
    ///
    /// # Errors
    ///
    /// `BufferOverflow` past the configured instruction length.
    #[inline]
    pub fn emit_u8(&mut self, value: u8) -> Result<(), ErrorKind> {
        self.bytes.push(value)
    }

    /// Append a 16-bit value in the configured byte order.
    ///
    /// # Errors
    ///
    /// `BufferOverflow` past the configured instruction length.
    #[inline]
    pub fn emit_u16(&mut self, value: u16) -> Result<(), ErrorKind> {
        self.bytes.extend_from_slice(&u16_bytes(value, self.endian))
    }

    /// Append a 32-bit value in the configured byte order.
    ///
    /// # Errors
    ///
    /// `BufferOverflow` past the configured instruction length.
    #[inline]
    pub fn emit_u32(&mut self, value: u32) -> Result<(), ErrorKind> {
        self.bytes.extend_from_slice(&u32_bytes(value, self.endian))
    }

    /// Overwrite a previously emitted byte.
    ///
    /// # Errors
    ///
    /// `BufferOverflow` when `pos` has not been emitted yet.
    #[inline]
    pub fn patch_u8(&mut self, pos: usize, value: u8) -> Result<(), ErrorKind> {
        self.bytes.set(pos, value)
    }

    /// Overwrite a previously emitted 16-bit value.
    ///
    /// # Errors
    ///
    /// `BufferOverflow` when the field has not been emitted yet.
    pub fn patch_u16(&mut self, pos: usize, value: u16) -> Result<(), ErrorKind> {
        let [a, b] = u16_bytes(value, self.endian);
        self.bytes.set(pos + 1, b)?;
        self.bytes.set(pos, a)
    }

    /// Consume the state into its bytes.
    pub fn into_bytes(self) -> InsnBytes {
        self.bytes
    }
}

// ─── Decode state ───────────────────────────────────────────────────────

/// Mutable state of one decode call.
pub struct DisInsn<'r> {
    address: u64,
    endian: Endian,
    bytes: InsnBytes,
    reader: &'r mut dyn MemoryReader,
    stage: DecodeStage,
}

impl<'r> DisInsn<'r> {
    /// Fresh state for an instruction at `address`, reading from `reader`.
    pub fn new(address: u64, config: &Config, reader: &'r mut dyn MemoryReader) -> Self {
        Self {
            address,
            endian: config.endian(),
            bytes: InsnBytes::new(config.max_insn_len()),
            reader,
            stage: DecodeStage::Init,
        }
    }

    /// Address of the first byte.
    #[inline]
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Bytes consumed so far.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of bytes consumed so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether nothing has been consumed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Current stage.
    #[inline]
    pub fn stage(&self) -> DecodeStage {
        self.stage
    }

    /// Move to `stage`.
    pub fn advance(&mut self, stage: DecodeStage) {
        log::trace!("decode {:#x}: {:?} -> {:?}", self.address, self.stage, stage);
        self.stage = stage;
    }

    /// Read one byte.
    ///
    /// # Errors
    ///
    /// `NoMemory` when the reader is exhausted; `BufferOverflow` past the
    /// configured instruction length.
    pub fn read_u8(&mut self) -> Result<u8, ErrorKind> {
        let b = self.reader.read_byte().ok_or(ErrorKind::NoMemory)?;
        self.bytes.push(b)?;
        Ok(b)
    }

    /// Read a 16-bit value in the configured byte order.
    ///
    /// # Errors
    ///
    /// As [`DisInsn::read_u8`].
    pub fn read_u16(&mut self) -> Result<u16, ErrorKind> {
        let a = self.read_u8()?;
        let b = self.read_u8()?;
        Ok(u16_from([a, b], self.endian))
    }

    /// Read a 32-bit value in the configured byte order.
    ///
    /// # Errors
    ///
    /// As [`DisInsn::read_u8`].
    pub fn read_u32(&mut self) -> Result<u32, ErrorKind> {
        let mut buf = [0u8; 4];
        for b in &mut buf {
            *b = self.read_u8()?;
        }
        Ok(u32_from(buf, self.endian))
    }

    /// Consume the state into its bytes.
    pub fn into_bytes(self) -> InsnBytes {
        self.bytes
    }
}

impl fmt::Debug for DisInsn<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisInsn")
            .field("address", &self.address)
            .field("bytes", &self.bytes)
            .field("stage", &self.stage)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ArrayMemory;
    use crate::config::Cpu;
    use alloc::vec;

    #[test]
    fn buffer_push_and_overflow() {
        let mut buf = InsnBytes::new(2);
        assert!(buf.push(1).is_ok());
        assert!(buf.push(2).is_ok());
        assert_eq!(buf.push(3), Err(ErrorKind::BufferOverflow));
        assert_eq!(buf, vec![1u8, 2]);
    }

    #[test]
    fn buffer_extend_is_all_or_nothing() {
        let mut buf = InsnBytes::new(3);
        buf.push(0xAA).unwrap();
        assert_eq!(buf.extend_from_slice(&[1, 2, 3]), Err(ErrorKind::BufferOverflow));
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn buffer_limit_is_clamped() {
        let mut buf = InsnBytes::new(100);
        for i in 0..MAX_INSN_BYTES {
            buf.push(i as u8).unwrap();
        }
        assert!(buf.push(0).is_err());
    }

    #[test]
    fn emit_respects_endianness() {
        let mut le = AsmInsn::new(0, &Config::new(Cpu::I8086));
        le.emit_u16(0x1234).unwrap();
        assert_eq!(le.bytes(), &[0x34, 0x12]);

        let mut be = AsmInsn::new(0, &Config::new(Cpu::Mc68000));
        be.emit_u16(0x4E71).unwrap();
        be.emit_u32(0x0001_0002).unwrap();
        assert_eq!(be.bytes(), &[0x4E, 0x71, 0x00, 0x01, 0x00, 0x02]);
    }

    #[test]
    fn patch_rewrites_emitted_bytes() {
        let mut insn = AsmInsn::new(0, &Config::new(Cpu::Mc68000));
        insn.emit_u16(0).unwrap();
        insn.patch_u16(0, 0xBEEF).unwrap();
        assert_eq!(insn.bytes(), &[0xBE, 0xEF]);
        assert!(insn.patch_u8(2, 0).is_err());
    }

    #[test]
    fn fail_keeps_first_error() {
        let mut insn = AsmInsn::new(0, &Config::new(Cpu::Mc6809));
        insn.fail(AsmError::new(ErrorKind::OverflowRange, Span::new(1, 5, 4, 1)));
        insn.fail(AsmError::new(ErrorKind::UnknownOperand, Span::new(1, 9, 8, 1)));
        assert_eq!(insn.error().kind(), Some(ErrorKind::OverflowRange));
        assert_eq!(insn.stage(), EncodeStage::Failed(ErrorKind::OverflowRange));
    }

    #[test]
    fn fail_replaces_a_warning() {
        let mut insn = AsmInsn::new(0, &Config::new(Cpu::Mc6809));
        insn.note_undefined(&Value::undefined(), Span::dummy());
        insn.fail(AsmError::new(ErrorKind::OperandTooFar, Span::new(1, 5, 4, 1)));
        assert_eq!(insn.error().kind(), Some(ErrorKind::OperandTooFar));
        assert_eq!(insn.stage(), EncodeStage::Failed(ErrorKind::OperandTooFar));
    }

    #[test]
    fn undefined_is_a_warning() {
        let mut insn = AsmInsn::new(0, &Config::new(Cpu::Mc6809));
        insn.note_undefined(&Value::undefined(), Span::dummy());
        assert_eq!(insn.error().kind(), Some(ErrorKind::UndefinedSymbol));
        assert!(!insn.error().has_error());
        insn.note_undefined(&Value::new(5), Span::dummy());
        assert_eq!(insn.error().kind(), Some(ErrorKind::UndefinedSymbol));
    }

    #[test]
    fn read_tracks_bytes() {
        let mut mem = ArrayMemory::new(0x100, &[0x12, 0x34, 0x56]);
        let cfg = Config::new(Cpu::I8086);
        let mut insn = DisInsn::new(0x100, &cfg, &mut mem);
        assert_eq!(insn.read_u16(), Ok(0x3412));
        assert_eq!(insn.read_u8(), Ok(0x56));
        assert_eq!(insn.read_u8(), Err(ErrorKind::NoMemory));
        assert_eq!(insn.bytes(), &[0x12, 0x34, 0x56]);
    }

    #[test]
    fn read_big_endian_long() {
        let mut mem = ArrayMemory::new(0, &[0x00, 0x01, 0x02, 0x03]);
        let cfg = Config::new(Cpu::Mc68000);
        let mut insn = DisInsn::new(0, &cfg, &mut mem);
        assert_eq!(insn.read_u32(), Ok(0x0001_0203));
    }

    #[test]
    fn result_ext_attaches_span() {
        let r: Result<(), ErrorKind> = Err(ErrorKind::OverflowRange);
        let err = r.at(Span::new(1, 3, 2, 1)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::OverflowRange);
        assert_eq!(err.span.col, 3);
    }
}
