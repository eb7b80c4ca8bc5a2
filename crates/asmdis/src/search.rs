//! Name search (encode) and opcode search (decode) over table pages.
//!
//! Both searches are linear scans in declaration order: pages in the order
//! the backend lists them, entries in the order the page lists them. The
//! first entry the architecture's `accept` predicate admits wins, so more
//! specific forms are declared ahead of general catch-alls.

use core::fmt;

use crate::entry::{Entry, Isa, Page};
use crate::error::ErrorKind;

/// Why an entry, or a whole search, did not admit the parsed operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reject {
    /// Error code to report.
    pub kind: ErrorKind,
    /// Operand slot the error is attributed to, if any.
    pub slot: Option<usize>,
    /// How many slots were accepted before the failure.
    pub matched: usize,
}

impl Reject {
    /// A rejection at `slot` after `matched` slots were accepted.
    #[must_use]
    pub const fn new(kind: ErrorKind, slot: Option<usize>, matched: usize) -> Self {
        Self {
            kind,
            slot,
            matched,
        }
    }

    /// No entry carries the mnemonic.
    #[must_use]
    pub const fn unknown() -> Self {
        Self::new(ErrorKind::UnknownInstruction, None, 0)
    }

    /// A rejection attributed to operand `slot` with everything before it
    /// accepted.
    #[must_use]
    pub const fn at(kind: ErrorKind, slot: usize) -> Self {
        Self::new(kind, Some(slot), slot)
    }

    /// The more informative of two rejections. An unknown mnemonic always
    /// loses to a rejection from an entry that carries the mnemonic.
    #[must_use]
    pub fn prefer(self, other: Reject) -> Reject {
        if self.kind == ErrorKind::UnknownInstruction {
            return other;
        }
        if other.kind == ErrorKind::UnknownInstruction {
            return self;
        }
        if other.beats(&self) {
            other
        } else {
            self
        }
    }

    /// Whether `self` is a more informative failure than `other`. Deeper
    /// matches win; on a tie a specific code beats the generic
    /// `OperandNotAllowed`; otherwise the earlier one stands.
    fn beats(&self, other: &Reject) -> bool {
        if self.matched != other.matched {
            return self.matched > other.matched;
        }
        other.kind == ErrorKind::OperandNotAllowed && self.kind != ErrorKind::OperandNotAllowed
    }
}

impl fmt::Display for Reject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slot {
            Some(slot) => write!(f, "{} (operand {})", self.kind, slot + 1),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// A matched entry together with the page prefix it lives under.
pub struct Found<I: Isa> {
    /// The matched entry.
    pub entry: &'static Entry<I>,
    /// Prefix byte of the entry's page.
    pub prefix: Option<u8>,
}

impl<I: Isa> Clone for Found<I> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<I: Isa> Copy for Found<I> {}

impl<I: Isa> fmt::Debug for Found<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Found")
            .field("entry", self.entry)
            .field("prefix", &self.prefix)
            .finish()
    }
}

/// Check parsed operand modes against an entry's slots using the
/// architecture's widening rules.
///
/// # Errors
///
/// Returns the [`Reject`] for the first slot that does not accept.
pub fn accept_slots<I: Isa>(parsed: &[I::Mode; 3], entry: &Entry<I>) -> Result<(), Reject> {
    for (i, &got) in parsed.iter().enumerate() {
        let want = entry.slot(i).mode;
        if want == I::NONE_MODE {
            if got != I::NONE_MODE {
                return Err(Reject::at(ErrorKind::OperandNotAllowed, i));
            }
            continue;
        }
        if got == I::NONE_MODE {
            return Err(Reject::at(ErrorKind::MissingOperand, i));
        }
        if !I::accept_mode(got, want) {
            return Err(Reject::at(I::reject_kind(got, want), i));
        }
    }
    Ok(())
}

/// Find the first entry named `name` (case-insensitively) that `accept`
/// admits, scanning `pages` in order.
///
/// # Errors
///
/// `UnknownInstruction` when no entry carries the name; otherwise the most
/// informative rejection among the entries that do.
pub fn search_name<I, F>(name: &str, pages: &[Page<I>], mut accept: F) -> Result<Found<I>, Reject>
where
    I: Isa,
    F: FnMut(&'static Entry<I>) -> Result<(), Reject>,
{
    let mut best: Option<Reject> = None;
    for page in pages {
        for entry in page.entries() {
            if !entry.matches_name(name) {
                continue;
            }
            match accept(entry) {
                Ok(()) => {
                    log::trace!("name search: {} -> {:?}", name, entry);
                    return Ok(Found {
                        entry,
                        prefix: page.prefix(),
                    });
                }
                Err(reject) => {
                    if best.map_or(true, |b| reject.beats(&b)) {
                        best = Some(reject);
                    }
                }
            }
        }
    }
    let reject = best.unwrap_or_else(Reject::unknown);
    log::trace!("name search: {} rejected: {}", name, reject);
    Err(reject)
}

/// Find the first decodable entry under `prefix` whose fixed bits match
/// `opcode` and that `accept` admits.
///
/// # Errors
///
/// `UnknownInstruction` when nothing matches.
pub fn search_opcode<I, F>(
    prefix: Option<u8>,
    opcode: u16,
    pages: &[Page<I>],
    mut accept: F,
) -> Result<Found<I>, ErrorKind>
where
    I: Isa,
    F: FnMut(&'static Entry<I>) -> bool,
{
    for page in pages {
        if page.is_encode_only() || page.prefix() != prefix {
            continue;
        }
        for entry in page.entries() {
            if entry.matches_opcode(opcode) && accept(entry) {
                log::trace!("opcode search: {:?}/{:#06x} -> {}", prefix, opcode, entry.name());
                return Ok(Found {
                    entry,
                    prefix: page.prefix(),
                });
            }
        }
    }
    log::trace!("opcode search: {:?}/{:#06x} unknown", prefix, opcode);
    Err(ErrorKind::UnknownInstruction)
}

/// Whether `byte` introduces one of the decodable prefixed pages.
pub fn is_prefix<I: Isa>(byte: u8, pages: &[Page<I>]) -> bool {
    pages
        .iter()
        .any(|p| !p.is_encode_only() && p.prefix() == Some(byte))
}

/// Whether any entry named `name` satisfies `pred`. Lets a backend decide
/// how to parse operand text before the real search runs.
pub fn name_accepts<I, P>(name: &str, pages: &[Page<I>], mut pred: P) -> bool
where
    I: Isa,
    P: FnMut(&Entry<I>) -> bool,
{
    pages
        .iter()
        .flat_map(|p| p.entries().iter())
        .any(|e| e.matches_name(name) && pred(e))
}
