//! Addressing-mode resolution and relaxation.
//!
//! This is the only place an encoding *size* is chosen. Backends describe
//! the candidate widths of a field, smallest first, and the resolver picks
//! the smallest that represents the value exactly, or validates a size the
//! source text forced. Decode runs the same rule in reverse so a backend
//! can tell whether the bytes it read were the minimal choice.

use crate::error::ErrorKind;

/// Sign-extend the low `bits` of `value`.
#[inline]
pub fn sign_extend(value: u64, bits: u32) -> i64 {
    if bits == 0 {
        return 0;
    }
    if bits >= 64 {
        return value as i64;
    }
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

/// Whether `value` is representable as a two's-complement `bits`-bit number.
#[inline]
pub fn fits_signed(value: i64, bits: u32) -> bool {
    if bits == 0 {
        return value == 0;
    }
    if bits >= 64 {
        return true;
    }
    let half = 1i64 << (bits - 1);
    (-half..half).contains(&value)
}

/// Whether `value` is representable as an unsigned `bits`-bit number.
#[inline]
pub fn fits_unsigned(value: i64, bits: u32) -> bool {
    if bits >= 63 {
        return value >= 0;
    }
    (0..(1i64 << bits)).contains(&value)
}

/// Whether `value` fits a `bits`-bit field read as either signed or
/// unsigned, the usual rule for immediates.
#[inline]
pub fn fits_field(value: i64, bits: u32) -> bool {
    fits_signed(value, bits) || fits_unsigned(value, bits)
}

/// `value` reduced modulo `2^bits` into the signed `bits`-bit range.
#[inline]
pub fn wrap_signed(value: i64, bits: u32) -> i64 {
    if bits >= 64 {
        return value;
    }
    sign_extend(value as u64, bits)
}

// ─── Widths (absolute values, displacements) ────────────────────────────

/// One candidate encoding width for a value field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Width<S> {
    /// Backend tag for this width.
    pub size: S,
    /// Smallest representable value.
    pub min: i64,
    /// Largest representable value.
    pub max: i64,
}

impl<S> Width<S> {
    /// A width covering `min..=max`.
    pub const fn new(size: S, min: i64, max: i64) -> Self {
        Self { size, min, max }
    }

    /// A signed `bits`-bit width.
    pub const fn signed(size: S, bits: u32) -> Self {
        let half = 1i64 << (bits - 1);
        Self {
            size,
            min: -half,
            max: half - 1,
        }
    }

    /// The reserved "null displacement" width: only zero, no bytes.
    pub const fn null(size: S) -> Self {
        Self {
            size,
            min: 0,
            max: 0,
        }
    }

    #[inline]
    fn contains(&self, value: i64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// Choose the width for `value` among `widths` (ordered smallest first).
///
/// A forced size is validated, never substituted. An undefined value takes
/// the largest width so a later pass with the real value cannot grow the
/// instruction.
///
/// # Errors
///
/// `OverflowRange` when no width (or the forced one) holds the value;
/// `IllegalSize` when the forced size is not a candidate at all.
pub fn choose_width<S>(
    value: i64,
    undefined: bool,
    widths: &[Width<S>],
    forced: Option<S>,
) -> Result<S, ErrorKind>
where
    S: Copy + PartialEq + core::fmt::Debug,
{
    if let Some(size) = forced {
        let w = widths
            .iter()
            .find(|w| w.size == size)
            .ok_or(ErrorKind::IllegalSize)?;
        if undefined || w.contains(value) {
            return Ok(size);
        }
        return Err(ErrorKind::OverflowRange);
    }
    if undefined {
        return widths
            .last()
            .map(|w| w.size)
            .ok_or(ErrorKind::IllegalSize);
    }
    let chosen = widths
        .iter()
        .find(|w| w.contains(value))
        .map(|w| w.size)
        .ok_or(ErrorKind::OverflowRange)?;
    log::trace!("width for {}: {:?}", value, chosen);
    Ok(chosen)
}

// ─── Reaches (PC-relative displacements) ────────────────────────────────

/// One candidate PC-relative displacement encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reach<S> {
    /// Backend tag for this reach.
    pub size: S,
    /// Width of the signed displacement field.
    pub bits: u32,
    /// Distance from the instruction address to the PC value the
    /// displacement is relative to, assuming this reach is chosen.
    pub pc_offset: i64,
    /// A displacement of zero is reserved (it signals a longer form).
    pub reserved_zero: bool,
}

impl<S> Reach<S> {
    /// A plain reach.
    pub const fn new(size: S, bits: u32, pc_offset: i64) -> Self {
        Self {
            size,
            bits,
            pc_offset,
            reserved_zero: false,
        }
    }

    /// A reach whose zero displacement is reserved.
    pub const fn reserving_zero(mut self) -> Self {
        self.reserved_zero = true;
        self
    }
}

/// A resolved branch: the chosen reach and its displacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Branch<S> {
    /// Chosen reach.
    pub size: S,
    /// Displacement to store.
    pub delta: i64,
}

/// Pick the smallest reach that can express a branch from `address` to
/// `target`.
///
/// Choosing a reach fixes the instruction length, which moves the PC the
/// displacement is measured from. Each candidate therefore computes its
/// displacement with its own `pc_offset` and then verifies that this
/// displacement fits its own field: one compute step and one verify step
/// per candidate, with no iteration.
///
/// `align` is the required displacement alignment in bytes (1 for none).
///
/// # Errors
///
/// `OperandNotAligned` for a misaligned displacement; `OperandTooFar` when
/// no reach (or the forced one) spans the distance; `OperandNotAllowed` for
/// a forced reach whose zero displacement is reserved; `IllegalSize` when
/// the forced size is not a candidate.
pub fn relax_branch<S>(
    address: i64,
    target: i64,
    align: i64,
    reaches: &[Reach<S>],
    forced: Option<S>,
) -> Result<Branch<S>, ErrorKind>
where
    S: Copy + PartialEq + core::fmt::Debug,
{
    relax_branch_in(64, address, target, align, reaches, forced)
}

/// [`relax_branch`] in a `space`-bit address space where the program
/// counter wraps: displacements are taken modulo `2^space`.
///
/// # Errors
///
/// As [`relax_branch`].
pub fn relax_branch_in<S>(
    space: u32,
    address: i64,
    target: i64,
    align: i64,
    reaches: &[Reach<S>],
    forced: Option<S>,
) -> Result<Branch<S>, ErrorKind>
where
    S: Copy + PartialEq + core::fmt::Debug,
{
    let check = |r: &Reach<S>| -> Result<i64, ErrorKind> {
        let delta = wrap_signed(target.wrapping_sub(address.wrapping_add(r.pc_offset)), space);
        if align > 1 && delta % align != 0 {
            return Err(ErrorKind::OperandNotAligned);
        }
        if r.reserved_zero && delta == 0 {
            return Err(ErrorKind::OperandNotAllowed);
        }
        if !fits_signed(delta, r.bits) {
            return Err(ErrorKind::OperandTooFar);
        }
        Ok(delta)
    };

    if let Some(size) = forced {
        let r = reaches
            .iter()
            .find(|r| r.size == size)
            .ok_or(ErrorKind::IllegalSize)?;
        let delta = check(r)?;
        return Ok(Branch { size, delta });
    }

    for r in reaches {
        match check(r) {
            Ok(delta) => {
                log::trace!("branch {:#x} -> {:#x}: {:?} delta {}", address, target, r.size, delta);
                return Ok(Branch {
                    size: r.size,
                    delta,
                });
            }
            Err(ErrorKind::OperandNotAligned) => return Err(ErrorKind::OperandNotAligned),
            Err(_) => continue,
        }
    }
    Err(ErrorKind::OperandTooFar)
}

/// Inverse of [`relax_branch`]: the target a stored displacement denotes.
#[inline]
pub fn branch_target(address: i64, pc_offset: i64, delta: i64) -> i64 {
    address.wrapping_add(pc_offset).wrapping_add(delta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Sz {
        Zero,
        Short,
        Long,
    }

    const WIDTHS: [Width<Sz>; 3] = [
        Width::null(Sz::Zero),
        Width::signed(Sz::Short, 8),
        Width::signed(Sz::Long, 16),
    ];

    // Two-byte short form, three-byte long form.
    const REACHES: [Reach<Sz>; 2] = [Reach::new(Sz::Short, 8, 2), Reach::new(Sz::Long, 16, 3)];

    #[test]
    fn sign_extension() {
        assert_eq!(sign_extend(0xFF, 8), -1);
        assert_eq!(sign_extend(0x7F, 8), 127);
        assert_eq!(sign_extend(0x8000, 16), -32768);
        assert_eq!(sign_extend(0x1F, 5), -1);
        assert_eq!(sign_extend(0x0F, 5), 15);
    }

    #[test]
    fn field_fits() {
        assert!(fits_signed(-128, 8));
        assert!(!fits_signed(128, 8));
        assert!(fits_unsigned(255, 8));
        assert!(!fits_unsigned(-1, 8));
        assert!(fits_field(-128, 8));
        assert!(fits_field(255, 8));
        assert!(!fits_field(256, 8));
        assert!(!fits_field(-129, 8));
    }

    #[test]
    fn smallest_width_wins() {
        assert_eq!(choose_width(0, false, &WIDTHS, None), Ok(Sz::Zero));
        assert_eq!(choose_width(5, false, &WIDTHS, None), Ok(Sz::Short));
        assert_eq!(choose_width(-128, false, &WIDTHS, None), Ok(Sz::Short));
        assert_eq!(choose_width(200, false, &WIDTHS, None), Ok(Sz::Long));
        assert_eq!(
            choose_width(40_000, false, &WIDTHS, None),
            Err(ErrorKind::OverflowRange)
        );
    }

    #[test]
    fn forced_width_is_validated_not_substituted() {
        assert_eq!(choose_width(0, false, &WIDTHS, Some(Sz::Long)), Ok(Sz::Long));
        assert_eq!(
            choose_width(300, false, &WIDTHS, Some(Sz::Short)),
            Err(ErrorKind::OverflowRange)
        );
        let no_null = &WIDTHS[1..];
        assert_eq!(
            choose_width(0, false, no_null, Some(Sz::Zero)),
            Err(ErrorKind::IllegalSize)
        );
    }

    #[test]
    fn undefined_takes_largest() {
        assert_eq!(choose_width(0, true, &WIDTHS, None), Ok(Sz::Long));
        assert_eq!(choose_width(0, true, &WIDTHS, Some(Sz::Short)), Ok(Sz::Short));
    }

    #[test]
    fn short_branch_backwards_to_self() {
        // jmp $ : target == address, short form delta = -2.
        let b = relax_branch(0x100, 0x100, 1, &REACHES, None).unwrap();
        assert_eq!(b, Branch { size: Sz::Short, delta: -2 });
    }

    #[test]
    fn minimality_boundary() {
        let b = relax_branch(0, 100, 1, &REACHES, None).unwrap();
        assert_eq!(b.size, Sz::Short);
        assert_eq!(b.delta, 98);
        let b = relax_branch(0, 200, 1, &REACHES, None).unwrap();
        assert_eq!(b.size, Sz::Long);
        assert_eq!(b.delta, 197);
        // Largest short displacement.
        let b = relax_branch(0, 129, 1, &REACHES, None).unwrap();
        assert_eq!(b, Branch { size: Sz::Short, delta: 127 });
        let b = relax_branch(0, 130, 1, &REACHES, None).unwrap();
        assert_eq!(b.size, Sz::Long);
    }

    #[test]
    fn beyond_every_reach() {
        // Long form covers -32768..=32767 relative to address + 3.
        assert!(relax_branch(0, 32_770, 1, &REACHES, None).is_ok());
        assert_eq!(
            relax_branch(0, 32_771, 1, &REACHES, None),
            Err(ErrorKind::OperandTooFar)
        );
    }

    #[test]
    fn forced_reach_too_far() {
        assert_eq!(
            relax_branch(0, 200, 1, &REACHES, Some(Sz::Short)),
            Err(ErrorKind::OperandTooFar)
        );
        let b = relax_branch(0, 10, 1, &REACHES, Some(Sz::Long)).unwrap();
        assert_eq!(b, Branch { size: Sz::Long, delta: 7 });
    }

    #[test]
    fn reserved_zero_moves_to_next_reach() {
        let reaches = [
            Reach::new(Sz::Short, 8, 2).reserving_zero(),
            Reach::new(Sz::Long, 16, 2),
        ];
        let b = relax_branch(0x1000, 0x1002, 2, &reaches, None).unwrap();
        assert_eq!(b, Branch { size: Sz::Long, delta: 0 });
        assert_eq!(
            relax_branch(0x1000, 0x1002, 2, &reaches, Some(Sz::Short)),
            Err(ErrorKind::OperandNotAllowed)
        );
    }

    #[test]
    fn misaligned_target() {
        let reaches = [Reach::new(Sz::Short, 8, 2)];
        assert_eq!(
            relax_branch(0x1000, 0x1005, 2, &reaches, None),
            Err(ErrorKind::OperandNotAligned)
        );
    }

    #[test]
    fn target_inverts_delta() {
        for (addr, target) in [(0x100, 0x100), (0x1000, 0x0F80), (0, 200)] {
            let b = relax_branch(addr, target, 1, &REACHES, None).unwrap();
            let pc = if b.size == Sz::Short { 2 } else { 3 };
            assert_eq!(branch_target(addr, pc, b.delta), target);
        }
    }

    #[test]
    fn wrap_signed_reduces_into_range() {
        assert_eq!(wrap_signed(-65520, 16), 16);
        assert_eq!(wrap_signed(0xFFFF, 16), -1);
        assert_eq!(wrap_signed(0x8000, 16), -0x8000);
        assert_eq!(wrap_signed(0x7FFF, 16), 0x7FFF);
        assert_eq!(wrap_signed(-0x00FF_FFF0, 24), 0x10);
        assert_eq!(wrap_signed(-70_000, 64), -70_000);
    }

    #[test]
    fn branch_wraps_around_the_address_space() {
        // 0xFFFA + 2 + 0x10 lands on 0x000C in a 64K space.
        let b = relax_branch_in(16, 0xFFFA, 0x000C, 1, &REACHES, None).unwrap();
        assert_eq!(b, Branch { size: Sz::Short, delta: 0x10 });
        assert_eq!(
            relax_branch(0xFFFA, 0x000C, 1, &REACHES, None).map(|b| b.size),
            Err(ErrorKind::OperandTooFar)
        );
    }
}
