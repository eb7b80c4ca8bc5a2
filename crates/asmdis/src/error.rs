//! Error codes, sticky error cells, and source span tracking for diagnostics.

use core::fmt;

/// Source location for diagnostics.
///
/// Tracks the line, column, byte offset, and length of a token or construct
/// in the original assembly source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Span {
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number (byte offset within line).
    pub col: u32,
    /// 0-based byte offset from start of source.
    pub offset: usize,
    /// Byte length of the spanned region.
    pub len: usize,
}

impl Span {
    /// Create a new span.
    #[must_use]
    pub fn new(line: u32, col: u32, offset: usize, len: usize) -> Self {
        Self {
            line,
            col,
            offset,
            len,
        }
    }

    /// A dummy span for generated/internal constructs.
    #[must_use]
    pub fn dummy() -> Self {
        Self {
            line: 0,
            col: 0,
            offset: 0,
            len: 0,
        }
    }

    /// Smallest span covering both `self` and `other`.
    #[must_use]
    pub fn to(self, other: Span) -> Span {
        if other.offset + other.len <= self.offset {
            return self;
        }
        Span {
            len: other.offset + other.len - self.offset,
            ..self
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Closed set of error codes reported by encode and decode.
///
/// Every failure is recoverable; none of them aborts the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorKind {
    /// Mnemonic or opcode not present in any table page.
    UnknownInstruction,
    /// Operand text could not be parsed into any operand shape.
    UnknownOperand,
    /// The mnemonic exists but no entry accepts this operand.
    OperandNotAllowed,
    /// The operand shape is not valid in this position.
    IllegalOperandMode,
    /// A register is syntactically valid but not usable here.
    RegisterNotAllowed,
    /// Register name or register code is not known.
    UnknownRegister,
    /// A register appears twice in a register list.
    DuplicateRegister,
    /// Value does not fit the operand field.
    OverflowRange,
    /// Branch or PC-relative target is beyond every available reach.
    OperandTooFar,
    /// Value violates a required alignment.
    OperandNotAligned,
    /// Segment override used where no memory operand takes it.
    IllegalSegment,
    /// Size suffix or operand size not supported by the instruction.
    IllegalSize,
    /// A symbol was referenced before being defined. Warning level: the
    /// instruction is still encoded with the symbol taken as zero.
    UndefinedSymbol,
    /// An operand was expected but the line ended.
    MissingOperand,
    /// Operand text is not a valid expression.
    NotAnExpression,
    /// Unexpected text after a complete instruction.
    GarbageAtEnd,
    /// Division or modulo by zero in an expression.
    DivideByZero,
    /// Unrecognised character or malformed token.
    Syntax,
    /// Decode ran out of bytes in the middle of an instruction.
    NoMemory,
    /// The instruction exceeds the fixed instruction buffer.
    BufferOverflow,
    /// The requested CPU backend is not compiled in.
    UnsupportedCpu,
}

impl ErrorKind {
    /// Warning-level codes are recorded, but any real error replaces them.
    #[must_use]
    pub const fn is_warning(self) -> bool {
        matches!(self, ErrorKind::UndefinedSymbol)
    }

    /// Short human-readable description.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            ErrorKind::UnknownInstruction => "unknown instruction",
            ErrorKind::UnknownOperand => "unknown operand",
            ErrorKind::OperandNotAllowed => "operand not allowed",
            ErrorKind::IllegalOperandMode => "illegal operand mode",
            ErrorKind::RegisterNotAllowed => "register not allowed",
            ErrorKind::UnknownRegister => "unknown register",
            ErrorKind::DuplicateRegister => "duplicate register",
            ErrorKind::OverflowRange => "overflow range",
            ErrorKind::OperandTooFar => "operand too far",
            ErrorKind::OperandNotAligned => "operand not aligned",
            ErrorKind::IllegalSegment => "illegal segment",
            ErrorKind::IllegalSize => "illegal size",
            ErrorKind::UndefinedSymbol => "undefined symbol",
            ErrorKind::MissingOperand => "missing operand",
            ErrorKind::NotAnExpression => "not an expression",
            ErrorKind::GarbageAtEnd => "garbage at end",
            ErrorKind::DivideByZero => "divide by zero",
            ErrorKind::Syntax => "syntax error",
            ErrorKind::NoMemory => "no memory",
            ErrorKind::BufferOverflow => "instruction too long",
            ErrorKind::UnsupportedCpu => "unsupported cpu",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Sticky first-error cell.
///
/// The first error recorded wins. A warning-level entry is the only thing a
/// later error may replace, and only with a real error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorAt<P> {
    slot: Option<(ErrorKind, P)>,
}

impl<P: Copy> ErrorAt<P> {
    /// An empty cell.
    #[must_use]
    pub const fn new() -> Self {
        Self { slot: None }
    }

    /// Record `kind` at `at` unless a higher-priority error is already held.
    /// Returns whether the cell changed.
    pub fn set_if_ok(&mut self, kind: ErrorKind, at: P) -> bool {
        let replace = match self.slot {
            None => true,
            Some((held, _)) => held.is_warning() && !kind.is_warning(),
        };
        if replace {
            self.slot = Some((kind, at));
        }
        replace
    }

    /// The recorded code, warning or error.
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        self.slot.map(|(k, _)| k)
    }

    /// Where the recorded code was raised.
    #[must_use]
    pub fn at(&self) -> Option<P> {
        self.slot.map(|(_, p)| p)
    }

    /// Whether nothing at all has been recorded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.slot.is_none()
    }

    /// Whether a real (non-warning) error is held.
    #[must_use]
    pub fn has_error(&self) -> bool {
        matches!(self.slot, Some((k, _)) if !k.is_warning())
    }
}

impl<P: Copy> Default for ErrorAt<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode failure: the error code and where in the source line it arose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AsmError {
    /// What went wrong.
    pub kind: ErrorKind,
    /// Source location the error is attributed to.
    pub span: Span,
}

impl AsmError {
    /// Create a new error.
    #[must_use]
    pub fn new(kind: ErrorKind, span: Span) -> Self {
        Self { kind, span }
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.span, self.kind)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for AsmError {}

/// Decode failure: the error code and the address of the instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DisError {
    /// What went wrong.
    pub kind: ErrorKind,
    /// Address of the first byte of the failing instruction.
    pub address: u64,
}

impl fmt::Display for DisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}: {}", self.address, self.kind)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DisError {}
