//! Symbol tables and the operand value parser.
//!
//! Operand text becomes a number through a precedence-climbing evaluator:
//!
//! - `|` (bitwise OR, lowest)
//! - `^` (bitwise XOR)
//! - `&` (bitwise AND)
//! - `<<`, `>>` (shifts)
//! - `+`, `-` (additive)
//! - `*`, `/`, `%` (multiplicative)
//! - Unary: `-`, `+`, `~`
//! - Atoms: numbers, character literals, symbols, `(expr)`, and the current
//!   location written `$` (Intel) or `*` (Motorola)
//!
//! A symbol the table does not know evaluates to zero and marks the value
//! undefined; callers turn that into an `UndefinedSymbol` warning.

use alloc::collections::BTreeMap;
use alloc::string::String;

use crate::error::{AsmError, ErrorKind, Span};
use crate::lexer::{tokenize, Cursor, TokenKind};

/// Read-only symbol lookup consulted during encode.
pub trait SymbolTable {
    /// Value of `name`, or `None` when it is not (yet) defined.
    fn lookup(&self, name: &str) -> Option<i64>;

    /// Location counter of the enclosing assembly pass.
    fn current_origin(&self) -> i64 {
        0
    }
}

/// A symbol table with nothing in it.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSymbols;

impl SymbolTable for NoSymbols {
    fn lookup(&self, _name: &str) -> Option<i64> {
        None
    }
}

/// A `BTreeMap`-backed symbol table.
///
/// ```rust
/// use asmdis::{Symbols, SymbolTable};
///
/// let mut syms = Symbols::new();
/// syms.define("start", 0x100).define("end", 0x200);
/// assert_eq!(syms.lookup("end"), Some(0x200));
/// assert_eq!(syms.lookup("middle"), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Symbols {
    map: BTreeMap<String, i64>,
    origin: i64,
}

impl Symbols {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Define or redefine `name`.
    pub fn define(&mut self, name: &str, value: i64) -> &mut Self {
        self.map.insert(String::from(name), value);
        self
    }

    /// Set the location counter reported by [`SymbolTable::current_origin`].
    pub fn set_origin(&mut self, origin: i64) -> &mut Self {
        self.origin = origin;
        self
    }

    /// Number of defined symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether no symbol is defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl SymbolTable for Symbols {
    fn lookup(&self, name: &str) -> Option<i64> {
        self.map.get(name).copied()
    }

    fn current_origin(&self) -> i64 {
        self.origin
    }
}

/// Result of evaluating an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Value {
    /// The computed value (zero contribution from undefined symbols).
    pub value: i64,
    /// Whether any undefined symbol took part.
    pub undefined: bool,
}

impl Value {
    /// A defined value.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self {
            value,
            undefined: false,
        }
    }

    /// An undefined value.
    #[must_use]
    pub const fn undefined() -> Self {
        Self {
            value: 0,
            undefined: true,
        }
    }

    fn map(self, f: impl FnOnce(i64) -> i64) -> Self {
        Self {
            value: f(self.value),
            undefined: self.undefined,
        }
    }

    fn zip(self, rhs: Value, f: impl FnOnce(i64, i64) -> i64) -> Self {
        Self {
            value: f(self.value, rhs.value),
            undefined: self.undefined || rhs.undefined,
        }
    }
}

/// What an expression is evaluated against.
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    symbols: &'a dyn SymbolTable,
    origin: i64,
}

impl<'a> EvalContext<'a> {
    /// Evaluate against `symbols` with `$`/`*` meaning `origin`.
    pub fn new(symbols: &'a dyn SymbolTable, origin: i64) -> Self {
        Self { symbols, origin }
    }

    /// The value of `$` and `*`.
    pub fn origin(&self) -> i64 {
        self.origin
    }
}

impl core::fmt::Debug for EvalContext<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EvalContext")
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// Parse and evaluate a full expression at the cursor.
///
/// Stops at the first token that cannot continue the expression (a comma,
/// a parenthesis that does not open a sub-expression, end of line).
///
/// # Errors
///
/// `MissingOperand` at end of line, `NotAnExpression` for a token that
/// cannot start one, `DivideByZero` for `/ 0` or `% 0`.
pub fn parse_expr(cur: &mut Cursor<'_, '_>, ctx: &EvalContext<'_>) -> Result<Value, AsmError> {
    Evaluator { cur, ctx }.or()
}

/// Parse a multiplicative term: everything [`parse_expr`] accepts except
/// that it stops at binary `+`, `-` and the lower-precedence operators.
/// Used where `+`/`-` separate the parts of a memory operand.
///
/// # Errors
///
/// As [`parse_expr`].
pub fn parse_term(cur: &mut Cursor<'_, '_>, ctx: &EvalContext<'_>) -> Result<Value, AsmError> {
    Evaluator { cur, ctx }.mul()
}

/// Evaluate a complete expression string against `symbols`.
///
/// ```rust
/// use asmdis::{eval, Symbols};
///
/// let mut syms = Symbols::new();
/// syms.define("base", 0x1000);
/// assert_eq!(eval("base + 2*4", &syms).unwrap().value, 0x1008);
/// ```
///
/// # Errors
///
/// Any tokenizer or evaluator error, and `GarbageAtEnd` when text remains.
pub fn eval(text: &str, symbols: &dyn SymbolTable) -> Result<Value, AsmError> {
    let tokens = tokenize(text)?;
    let mut cur = Cursor::new(&tokens);
    let ctx = EvalContext::new(symbols, symbols.current_origin());
    let value = parse_expr(&mut cur, &ctx)?;
    if !cur.at_end() {
        return Err(AsmError::new(ErrorKind::GarbageAtEnd, cur.span()));
    }
    Ok(value)
}

struct Evaluator<'c, 't, 's, 'a> {
    cur: &'c mut Cursor<'t, 's>,
    ctx: &'c EvalContext<'a>,
}

impl Evaluator<'_, '_, '_, '_> {
    // ── Precedence levels ──────────────────────────────────

    /// Bitwise OR: `a | b`
    fn or(&mut self) -> Result<Value, AsmError> {
        let mut val = self.xor()?;
        while self.cur.eat(TokenKind::Pipe) {
            val = val.zip(self.xor()?, |a, b| a | b);
        }
        Ok(val)
    }

    /// Bitwise XOR: `a ^ b`
    fn xor(&mut self) -> Result<Value, AsmError> {
        let mut val = self.and()?;
        while self.cur.eat(TokenKind::Caret) {
            val = val.zip(self.and()?, |a, b| a ^ b);
        }
        Ok(val)
    }

    /// Bitwise AND: `a & b`
    fn and(&mut self) -> Result<Value, AsmError> {
        let mut val = self.shift()?;
        while self.cur.eat(TokenKind::Ampersand) {
            val = val.zip(self.shift()?, |a, b| a & b);
        }
        Ok(val)
    }

    /// Shifts: `a << b`, `a >> b`
    fn shift(&mut self) -> Result<Value, AsmError> {
        let mut val = self.add()?;
        loop {
            if self.cur.eat(TokenKind::LShift) {
                val = val.zip(self.add()?, |a, b| {
                    if (0..64).contains(&b) {
                        a.wrapping_shl(b as u32)
                    } else {
                        0
                    }
                });
            } else if self.cur.eat(TokenKind::RShift) {
                val = val.zip(self.add()?, |a, b| {
                    if (0..64).contains(&b) {
                        a >> b
                    } else {
                        0
                    }
                });
            } else {
                break;
            }
        }
        Ok(val)
    }

    /// Addition/subtraction: `a + b`, `a - b`
    fn add(&mut self) -> Result<Value, AsmError> {
        let mut val = self.mul()?;
        loop {
            if self.cur.eat(TokenKind::Plus) {
                val = val.zip(self.mul()?, i64::wrapping_add);
            } else if self.cur.eat(TokenKind::Minus) {
                val = val.zip(self.mul()?, i64::wrapping_sub);
            } else {
                break;
            }
        }
        Ok(val)
    }

    /// Multiplication/division/modulo: `a * b`, `a / b`, `a % b`
    fn mul(&mut self) -> Result<Value, AsmError> {
        let mut val = self.unary()?;
        loop {
            match self.cur.kind() {
                TokenKind::Star => {
                    self.cur.advance();
                    val = val.zip(self.unary()?, i64::wrapping_mul);
                }
                kind @ (TokenKind::Slash | TokenKind::Percent) => {
                    let span = self.cur.advance().span;
                    let rhs = self.unary()?;
                    if rhs.value == 0 {
                        if rhs.undefined {
                            val = Value::undefined();
                            continue;
                        }
                        return Err(AsmError::new(ErrorKind::DivideByZero, span));
                    }
                    val = if kind == TokenKind::Slash {
                        val.zip(rhs, i64::wrapping_div)
                    } else {
                        val.zip(rhs, i64::wrapping_rem)
                    };
                }
                _ => break,
            }
        }
        Ok(val)
    }

    /// Unary operators: `-x`, `+x`, `~x`
    fn unary(&mut self) -> Result<Value, AsmError> {
        if self.cur.eat(TokenKind::Minus) {
            return Ok(self.unary()?.map(i64::wrapping_neg));
        }
        if self.cur.eat(TokenKind::Plus) {
            return self.unary();
        }
        if self.cur.eat(TokenKind::Tilde) {
            return Ok(self.unary()?.map(|v| !v));
        }
        self.atom()
    }

    /// Atoms: numbers, characters, symbols, location counter, and `(expr)`.
    fn atom(&mut self) -> Result<Value, AsmError> {
        let tok = self.cur.peek();
        match tok.kind {
            TokenKind::Number(n) => {
                self.cur.advance();
                Ok(Value::new(n))
            }
            TokenKind::CharLit(c) => {
                self.cur.advance();
                Ok(Value::new(i64::from(c)))
            }
            TokenKind::Dollar | TokenKind::Star => {
                self.cur.advance();
                Ok(Value::new(self.ctx.origin))
            }
            TokenKind::Ident => {
                self.cur.advance();
                match self.ctx.symbols.lookup(tok.text()) {
                    Some(v) => Ok(Value::new(v)),
                    None => {
                        log::debug!("undefined symbol `{}` at {}", tok.text(), tok.span);
                        Ok(Value::undefined())
                    }
                }
            }
            TokenKind::OpenParen => {
                self.cur.advance();
                let val = self.or()?;
                self.cur.expect(TokenKind::CloseParen, ErrorKind::NotAnExpression)?;
                Ok(val)
            }
            TokenKind::Eof => Err(AsmError::new(ErrorKind::MissingOperand, tok.span)),
            _ => Err(AsmError::new(ErrorKind::NotAnExpression, tok.span)),
        }
    }
}

/// Span from `start` to just before the cursor's current token.
pub(crate) fn span_since(start: Span, cur: &Cursor<'_, '_>) -> Span {
    let end = cur.span();
    if end.offset <= start.offset {
        return start;
    }
    Span {
        len: end.offset - start.offset,
        ..start
    }
}
