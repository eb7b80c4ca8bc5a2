//! Static instruction tables.
//!
//! An [`Entry`] describes one (mnemonic, opcode, operand signature) row: the
//! base opcode bits, up to three operand [`Slot`]s pairing the required
//! addressing mode with the position its bits occupy, and a size/format tag.
//! Entries sharing a prefix byte are grouped into a [`Page`].
//!
//! The vocabularies themselves (modes, positions, size tags) are closed enums
//! owned by each backend and tied together through the [`Isa`] trait.

use core::fmt;

use crate::error::ErrorKind;

/// Ties an architecture's closed tag sets to the generic table machinery.
pub trait Isa: Sized + 'static {
    /// Operand shape, both as parsed from text and as required by a table.
    type Mode: Copy + Eq + fmt::Debug + 'static;
    /// Where an operand's bits live.
    type Pos: Copy + Eq + fmt::Debug + 'static;
    /// Size/format tag carried by each entry.
    type Size: Copy + Eq + fmt::Debug + 'static;

    /// The "no operand" mode.
    const NONE_MODE: Self::Mode;
    /// The "no operand" position.
    const NONE_POS: Self::Pos;

    /// Bits of the base opcode reserved for an operand with this mode and
    /// position. Cleared from raw bits before comparing against an entry.
    fn operand_mask(mode: Self::Mode, pos: Self::Pos, size: Self::Size) -> u16;

    /// Bits of the base opcode reserved for the size field.
    fn size_mask(size: Self::Size) -> u16 {
        let _ = size;
        0
    }

    /// Whether a parsed operand of mode `parsed` satisfies a table slot
    /// requiring `table`.
    fn accept_mode(parsed: Self::Mode, table: Self::Mode) -> bool;

    /// Error reported when `accept_mode(parsed, table)` is false.
    fn reject_kind(parsed: Self::Mode, table: Self::Mode) -> ErrorKind {
        let _ = (parsed, table);
        ErrorKind::OperandNotAllowed
    }
}

// ─── Slot ───────────────────────────────────────────────────────────────

/// One operand requirement: an addressing mode and its bit position.
pub struct Slot<I: Isa> {
    /// Required addressing mode.
    pub mode: I::Mode,
    /// Where the operand's bits live.
    pub pos: I::Pos,
}

impl<I: Isa> Slot<I> {
    /// A slot requiring `mode` at `pos`.
    pub const fn new(mode: I::Mode, pos: I::Pos) -> Self {
        Self { mode, pos }
    }

    /// A slot requiring no operand.
    pub const fn none() -> Self {
        Self {
            mode: I::NONE_MODE,
            pos: I::NONE_POS,
        }
    }

    /// Whether this slot requires no operand.
    pub fn is_none(&self) -> bool {
        self.mode == I::NONE_MODE
    }
}

impl<I: Isa> Clone for Slot<I> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<I: Isa> Copy for Slot<I> {}

impl<I: Isa> PartialEq for Slot<I> {
    fn eq(&self, other: &Self) -> bool {
        self.mode == other.mode && self.pos == other.pos
    }
}

impl<I: Isa> Eq for Slot<I> {}

impl<I: Isa> fmt::Debug for Slot<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}@{:?}", self.mode, self.pos)
    }
}

// ─── Flags ──────────────────────────────────────────────────────────────

/// Three operand slots plus a size/format tag.
pub struct Flags<I: Isa> {
    /// Operand slots in source order; unused slots are [`Slot::none`].
    pub slots: [Slot<I>; 3],
    /// Size/format tag.
    pub size: I::Size,
}

impl<I: Isa> Flags<I> {
    /// No operands.
    pub const fn none(size: I::Size) -> Self {
        Self {
            slots: [Slot::none(), Slot::none(), Slot::none()],
            size,
        }
    }

    /// One operand.
    pub const fn one(mode: I::Mode, pos: I::Pos, size: I::Size) -> Self {
        Self {
            slots: [Slot::new(mode, pos), Slot::none(), Slot::none()],
            size,
        }
    }

    /// Two operands.
    pub const fn two(src: Slot<I>, dst: Slot<I>, size: I::Size) -> Self {
        Self {
            slots: [src, dst, Slot::none()],
            size,
        }
    }

    /// Three operands.
    pub const fn three(a: Slot<I>, b: Slot<I>, c: Slot<I>, size: I::Size) -> Self {
        Self {
            slots: [a, b, c],
            size,
        }
    }

    /// Number of leading slots that require an operand.
    pub fn operand_count(&self) -> usize {
        self.slots.iter().take_while(|s| !s.is_none()).count()
    }
}

impl<I: Isa> Clone for Flags<I> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<I: Isa> Copy for Flags<I> {}

impl<I: Isa> fmt::Debug for Flags<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flags")
            .field("slots", &self.slots)
            .field("size", &self.size)
            .finish()
    }
}

// ─── Entry ──────────────────────────────────────────────────────────────

/// One row of an instruction table. Never mutated after construction.
pub struct Entry<I: Isa> {
    opcode: u16,
    flags: Flags<I>,
    name: &'static str,
}

impl<I: Isa> Entry<I> {
    /// Build an entry. `name` is stored upper case by convention.
    pub const fn new(name: &'static str, opcode: u16, flags: Flags<I>) -> Self {
        Self {
            opcode,
            flags,
            name,
        }
    }

    /// Base opcode with every operand and size field cleared.
    #[inline]
    pub fn opcode(&self) -> u16 {
        self.opcode
    }

    /// Mnemonic text.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Operand slots and size tag.
    #[inline]
    pub fn flags(&self) -> &Flags<I> {
        &self.flags
    }

    /// Operand slot `i` (0-based).
    #[inline]
    pub fn slot(&self, i: usize) -> Slot<I> {
        self.flags.slots[i]
    }

    /// Size/format tag.
    #[inline]
    pub fn size(&self) -> I::Size {
        self.flags.size
    }

    /// Case-insensitive mnemonic comparison.
    #[inline]
    pub fn matches_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Bits of the raw opcode owned by operands and the size field.
    pub fn mask(&self) -> u16 {
        let size = self.flags.size;
        self.flags
            .slots
            .iter()
            .filter(|s| !s.is_none())
            .fold(I::size_mask(size), |m, s| {
                m | I::operand_mask(s.mode, s.pos, size)
            })
    }

    /// Whether `raw` carries this entry's fixed opcode bits.
    #[inline]
    pub fn matches_opcode(&self, raw: u16) -> bool {
        raw & !self.mask() == self.opcode
    }
}

impl<I: Isa> fmt::Debug for Entry<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("name", &self.name)
            .field("opcode", &format_args!("{:#06x}", self.opcode))
            .field("flags", &self.flags)
            .finish()
    }
}

// ─── Page ───────────────────────────────────────────────────────────────

/// Entries sharing one opcode prefix.
pub struct Page<I: Isa> {
    prefix: Option<u8>,
    entries: &'static [Entry<I>],
    encode_only: bool,
}

impl<I: Isa> Page<I> {
    /// A page searched by both encode and decode.
    pub const fn new(prefix: Option<u8>, entries: &'static [Entry<I>]) -> Self {
        Self {
            prefix,
            entries,
            encode_only: false,
        }
    }

    /// A page of alias entries: visible to name search only, never yielded
    /// by opcode search.
    pub const fn alias(prefix: Option<u8>, entries: &'static [Entry<I>]) -> Self {
        Self {
            prefix,
            entries,
            encode_only: true,
        }
    }

    /// Prefix byte emitted before the opcode, if any.
    #[inline]
    pub fn prefix(&self) -> Option<u8> {
        self.prefix
    }

    /// The entries, in declaration (priority) order.
    #[inline]
    pub fn entries(&self) -> &'static [Entry<I>] {
        self.entries
    }

    /// Whether decode must skip this page.
    #[inline]
    pub fn is_encode_only(&self) -> bool {
        self.encode_only
    }
}

impl<I: Isa> fmt::Debug for Page<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("prefix", &self.prefix)
            .field("entries", &self.entries.len())
            .field("encode_only", &self.encode_only)
            .finish()
    }
}
