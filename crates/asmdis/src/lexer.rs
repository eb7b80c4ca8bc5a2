//! Lexer for one line of assembly source.
//!
//! The lexer tokenizes a source line into a stream of [`Token`]s, each
//! carrying its [`Span`] so that error messages can point back to the exact
//! column in the original input. Everything after `;` is a comment.

use alloc::borrow::Cow;
use alloc::vec::Vec;

use crate::error::{AsmError, ErrorKind, Span};

/// A token produced by the lexer.
///
/// Token text is borrowed from the source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'src> {
    /// Token classification.
    pub kind: TokenKind,
    /// Source text of the token.
    pub text: Cow<'src, str>,
    /// Source location.
    pub span: Span,
}

impl<'src> Token<'src> {
    /// Returns the token text as a `&str`.
    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether this is an identifier equal to `word`, ignoring case.
    #[inline]
    pub fn is_word(&self, word: &str) -> bool {
        self.kind == TokenKind::Ident && self.text.eq_ignore_ascii_case(word)
    }
}

/// The type of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// An identifier: mnemonic, register name, or symbol.
    Ident,
    /// A numeric literal.
    Number(i64),
    /// A character literal (e.g., 'A').
    CharLit(u8),
    /// A size suffix starting with `.` (e.g., `.W`).
    Suffix,
    /// Comma separator.
    Comma,
    /// Open bracket `[`.
    OpenBracket,
    /// Close bracket `]`.
    CloseBracket,
    /// Open parenthesis `(`.
    OpenParen,
    /// Close parenthesis `)`.
    CloseParen,
    /// Plus `+`.
    Plus,
    /// Minus `-`.
    Minus,
    /// Asterisk `*` (multiply, or current location in Motorola syntax).
    Star,
    /// Forward slash `/` (divide, or register-list separator).
    Slash,
    /// Percent sign `%` (modulo).
    Percent,
    /// Ampersand `&`.
    Ampersand,
    /// Pipe `|`.
    Pipe,
    /// Caret `^`.
    Caret,
    /// Tilde `~`.
    Tilde,
    /// Left shift `<<`.
    LShift,
    /// Right shift `>>`.
    RShift,
    /// Less-than `<` (force short/direct form).
    Lt,
    /// Greater-than `>` (force long/extended form).
    Gt,
    /// Hash `#` (immediate prefix).
    Hash,
    /// Colon `:` (segment override, far pointer).
    Colon,
    /// Dollar sign `$` alone (current location in Intel syntax).
    Dollar,
    /// End of input.
    Eof,
}

impl TokenKind {
    /// Whether a token of this kind can end an operand, which decides if a
    /// following `%` is the modulo operator or a binary-number prefix.
    fn ends_operand(self) -> bool {
        matches!(
            self,
            TokenKind::Ident
                | TokenKind::Number(_)
                | TokenKind::CharLit(_)
                | TokenKind::CloseParen
                | TokenKind::CloseBracket
                | TokenKind::Dollar
        )
    }
}

fn punctuation(ch: u8) -> Option<TokenKind> {
    Some(match ch {
        b',' => TokenKind::Comma,
        b'[' => TokenKind::OpenBracket,
        b']' => TokenKind::CloseBracket,
        b'(' => TokenKind::OpenParen,
        b')' => TokenKind::CloseParen,
        b'+' => TokenKind::Plus,
        b'-' => TokenKind::Minus,
        b'*' => TokenKind::Star,
        b'/' => TokenKind::Slash,
        b'%' => TokenKind::Percent,
        b'&' => TokenKind::Ampersand,
        b'|' => TokenKind::Pipe,
        b'^' => TokenKind::Caret,
        b'~' => TokenKind::Tilde,
        b'<' => TokenKind::Lt,
        b'>' => TokenKind::Gt,
        b'#' => TokenKind::Hash,
        b':' => TokenKind::Colon,
        _ => return None,
    })
}

/// Tokenize one line of assembly source.
///
/// The lexer recognizes:
/// - Identifiers (mnemonics, registers, symbols)
/// - Numeric literals: decimal, `0x`/`0b`/`0o` prefixes, `H` suffix
///   (`0FFH`), Motorola `$hex` and `%binary`
/// - Character literals (`'A'`)
/// - Size suffixes (`.B`, `.W`, `.L`, `.S`)
/// - Punctuation and operators, including `<<` and `>>`
/// - Comments: `;` to end of line
///
/// Tokenizing stops at the first newline.
///
/// # Errors
///
/// Returns an [`AsmError`] with [`ErrorKind::Syntax`] for an unrecognised
/// character or a malformed literal, and [`ErrorKind::OverflowRange`] for a
/// number that does not fit 64 bits.
pub fn tokenize(source: &str) -> Result<Vec<Token<'_>>, AsmError> {
    let mut tokens: Vec<Token<'_>> = Vec::with_capacity(source.len() / 3 + 1);
    let bytes = source.as_bytes();
    let len = bytes.len();
    let mut pos = 0;

    let span = |start: usize, end: usize| Span::new(1, start as u32 + 1, start, end - start);
    let text = |start: usize, end: usize| Cow::Borrowed(source.get(start..end).unwrap_or(""));

    while pos < len {
        let ch = bytes[pos];

        if ch == b' ' || ch == b'\t' || ch == b'\r' {
            pos += 1;
            continue;
        }
        if ch == b'\n' || ch == b';' {
            break;
        }

        // Shift operators << >>
        if (ch == b'<' || ch == b'>') && pos + 1 < len && bytes[pos + 1] == ch {
            let kind = if ch == b'<' {
                TokenKind::LShift
            } else {
                TokenKind::RShift
            };
            tokens.push(Token {
                kind,
                text: text(pos, pos + 2),
                span: span(pos, pos + 2),
            });
            pos += 2;
            continue;
        }

        // Dollar: `$hex` number, or the current location alone.
        if ch == b'$' {
            let start = pos;
            pos += 1;
            while pos < len && bytes[pos].is_ascii_hexdigit() {
                pos += 1;
            }
            let kind = if pos == start + 1 {
                TokenKind::Dollar
            } else {
                TokenKind::Number(parse_radix(&source[start + 1..pos], 16, span(start, pos))?)
            };
            tokens.push(Token {
                kind,
                text: text(start, pos),
                span: span(start, pos),
            });
            continue;
        }

        // Percent: `%binary` where an operand may start, else modulo.
        if ch == b'%'
            && pos + 1 < len
            && matches!(bytes[pos + 1], b'0' | b'1')
            && !tokens.last().map_or(false, |t| t.kind.ends_operand())
        {
            let start = pos;
            pos += 1;
            while pos < len && matches!(bytes[pos], b'0' | b'1') {
                pos += 1;
            }
            let value = parse_radix(&source[start + 1..pos], 2, span(start, pos))?;
            tokens.push(Token {
                kind: TokenKind::Number(value),
                text: text(start, pos),
                span: span(start, pos),
            });
            continue;
        }

        if let Some(kind) = punctuation(ch) {
            tokens.push(Token {
                kind,
                text: text(pos, pos + 1),
                span: span(pos, pos + 1),
            });
            pos += 1;
            continue;
        }

        // Character literal
        if ch == b'\'' {
            let start = pos;
            pos += 1;
            if pos >= len {
                return Err(AsmError::new(ErrorKind::Syntax, span(start, pos)));
            }
            let value = if bytes[pos] == b'\\' && pos + 1 < len {
                pos += 1;
                match bytes[pos] {
                    b'n' => b'\n',
                    b't' => b'\t',
                    b'r' => b'\r',
                    b'\\' => b'\\',
                    b'\'' => b'\'',
                    b'0' => 0,
                    _ => return Err(AsmError::new(ErrorKind::Syntax, span(pos - 1, pos + 1))),
                }
            } else {
                bytes[pos]
            };
            pos += 1;
            if pos >= len || bytes[pos] != b'\'' {
                return Err(AsmError::new(ErrorKind::Syntax, span(start, pos)));
            }
            pos += 1;
            tokens.push(Token {
                kind: TokenKind::CharLit(value),
                text: text(start, pos),
                span: span(start, pos),
            });
            continue;
        }

        // Size suffix (starts with '.')
        if ch == b'.' {
            let start = pos;
            pos += 1;
            while pos < len && bytes[pos].is_ascii_alphanumeric() {
                pos += 1;
            }
            if pos == start + 1 {
                return Err(AsmError::new(ErrorKind::Syntax, span(start, pos)));
            }
            tokens.push(Token {
                kind: TokenKind::Suffix,
                text: text(start, pos),
                span: span(start, pos),
            });
            continue;
        }

        // Number
        if ch.is_ascii_digit() {
            let start = pos;
            while pos < len && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
                pos += 1;
            }
            let value = parse_number(&source[start..pos], span(start, pos))?;
            tokens.push(Token {
                kind: TokenKind::Number(value),
                text: text(start, pos),
                span: span(start, pos),
            });
            continue;
        }

        // Identifier (mnemonics, registers, symbols)
        if ch.is_ascii_alphabetic() || ch == b'_' || ch == b'?' || ch == b'@' {
            let start = pos;
            while pos < len
                && (bytes[pos].is_ascii_alphanumeric()
                    || bytes[pos] == b'_'
                    || bytes[pos] == b'?'
                    || bytes[pos] == b'@')
            {
                pos += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Ident,
                text: text(start, pos),
                span: span(start, pos),
            });
            continue;
        }

        return Err(AsmError::new(ErrorKind::Syntax, span(pos, pos + 1)));
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        text: Cow::Borrowed(""),
        span: span(pos.min(len), pos.min(len)),
    });
    Ok(tokens)
}

/// Parse a numeric literal that starts with a decimal digit.
fn parse_number(s: &str, span: Span) -> Result<i64, AsmError> {
    let b = s.as_bytes();
    let digits = s.trim_end_matches('_');
    if b.len() > 2 && b[0] == b'0' && matches!(b[1], b'x' | b'X') {
        return parse_radix(&digits[2..], 16, span);
    }
    // `0FFH` before `0b`, so `0B1H` stays hex.
    if b.len() > 1 && matches!(b[b.len() - 1], b'h' | b'H') {
        return parse_radix(&digits[..digits.len() - 1], 16, span);
    }
    if b.len() > 2 && b[0] == b'0' && matches!(b[1], b'b' | b'B') {
        return parse_radix(&digits[2..], 2, span);
    }
    if b.len() > 2 && b[0] == b'0' && matches!(b[1], b'o' | b'O') {
        return parse_radix(&digits[2..], 8, span);
    }
    parse_radix(digits, 10, span)
}

fn parse_radix(digits: &str, radix: u32, span: Span) -> Result<i64, AsmError> {
    if digits.is_empty() || !digits.bytes().all(|c| c == b'_' || (c as char).is_digit(radix)) {
        return Err(AsmError::new(ErrorKind::Syntax, span));
    }
    let mut value: u64 = 0;
    for c in digits.bytes().filter(|&c| c != b'_') {
        let d = u64::from((c as char).to_digit(radix).unwrap_or(0));
        value = value
            .checked_mul(u64::from(radix))
            .and_then(|v| v.checked_add(d))
            .ok_or(AsmError::new(ErrorKind::OverflowRange, span))?;
    }
    Ok(value as i64)
}

// ─── Cursor ─────────────────────────────────────────────────────────────

static EOF_TOKEN: Token<'static> = Token {
    kind: TokenKind::Eof,
    text: Cow::Borrowed(""),
    span: Span {
        line: 0,
        col: 0,
        offset: 0,
        len: 0,
    },
};

/// A read position over a token slice. Reading past the end keeps
/// returning the final `Eof` token.
#[derive(Debug, Clone)]
pub struct Cursor<'t, 'src> {
    tokens: &'t [Token<'src>],
    pos: usize,
}

impl<'t, 'src> Cursor<'t, 'src> {
    /// A cursor at the first token.
    #[must_use]
    pub fn new(tokens: &'t [Token<'src>]) -> Self {
        Self { tokens, pos: 0 }
    }

    /// The current token.
    #[inline]
    pub fn peek(&self) -> &'t Token<'src> {
        self.peek_at(0)
    }

    /// The token `n` positions ahead.
    #[inline]
    pub fn peek_at(&self, n: usize) -> &'t Token<'src> {
        match self.tokens.get(self.pos + n).or_else(|| self.tokens.last()) {
            Some(t) => t,
            None => &EOF_TOKEN,
        }
    }

    /// Kind of the current token.
    #[inline]
    pub fn kind(&self) -> TokenKind {
        self.peek().kind
    }

    /// Return the current token and move past it.
    pub fn advance(&mut self) -> &'t Token<'src> {
        let t = self.peek();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    /// Consume the current token if it is of `kind`.
    pub fn eat(&mut self, kind: TokenKind) -> bool {
        if self.kind() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Consume a token of `kind` or fail with `err` at the current token.
    ///
    /// # Errors
    ///
    /// `err` at the current span when the token does not match.
    pub fn expect(&mut self, kind: TokenKind, err: ErrorKind) -> Result<&'t Token<'src>, AsmError> {
        if self.kind() == kind {
            Ok(self.advance())
        } else {
            Err(AsmError::new(err, self.span()))
        }
    }

    /// Whether only `Eof` remains.
    #[inline]
    pub fn at_end(&self) -> bool {
        self.kind() == TokenKind::Eof
    }

    /// Span of the current token.
    #[inline]
    pub fn span(&self) -> Span {
        self.peek().span
    }

    /// Opaque position for [`Cursor::reset`].
    #[inline]
    pub fn mark(&self) -> usize {
        self.pos
    }

    /// Return to a position obtained from [`Cursor::mark`].
    #[inline]
    pub fn reset(&mut self, mark: usize) {
        self.pos = mark.min(self.tokens.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn tok_kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn empty_input() {
        let tokens = tokenize("").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Eof);
    }

    #[test]
    fn only_comment() {
        let tokens = tokenize("  ; nothing here").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Eof);
    }

    #[test]
    fn simple_instruction() {
        assert_eq!(
            tok_kinds("mov ax, bx"),
            vec![
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::Comma,
                TokenKind::Ident,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn number_formats() {
        let k = tok_kinds("%1010 10 0x1F 0b101 0o17 0FFH 0B1H $C000");
        assert_eq!(
            k,
            vec![
                TokenKind::Number(10),
                TokenKind::Number(10),
                TokenKind::Number(0x1F),
                TokenKind::Number(5),
                TokenKind::Number(15),
                TokenKind::Number(0xFF),
                TokenKind::Number(0xB1),
                TokenKind::Number(0xC000),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn dollar_alone_is_location() {
        assert_eq!(tok_kinds("jmp $"), vec![TokenKind::Ident, TokenKind::Dollar, TokenKind::Eof]);
        assert_eq!(
            tok_kinds("$+2"),
            vec![TokenKind::Dollar, TokenKind::Plus, TokenKind::Number(2), TokenKind::Eof]
        );
    }

    #[test]
    fn percent_after_operand_is_modulo() {
        assert_eq!(
            tok_kinds("7%10"),
            vec![TokenKind::Number(7), TokenKind::Percent, TokenKind::Number(10), TokenKind::Eof]
        );
        assert_eq!(
            tok_kinds("#%11"),
            vec![TokenKind::Hash, TokenKind::Number(3), TokenKind::Eof]
        );
    }

    #[test]
    fn size_suffix() {
        let tokens = tokenize("move.w d0,$1234.L").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Ident);
        assert_eq!(tokens[1].kind, TokenKind::Suffix);
        assert_eq!(tokens[1].text(), ".w");
        assert_eq!(tokens[5].kind, TokenKind::Suffix);
        assert_eq!(tokens[5].text(), ".L");
    }

    #[test]
    fn motorola_indexed() {
        assert_eq!(
            tok_kinds("lda [,--x]"),
            vec![
                TokenKind::Ident,
                TokenKind::OpenBracket,
                TokenKind::Comma,
                TokenKind::Minus,
                TokenKind::Minus,
                TokenKind::Ident,
                TokenKind::CloseBracket,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn shifts_and_forcing() {
        assert_eq!(
            tok_kinds("1<<4 >>2 <$10 >$10"),
            vec![
                TokenKind::Number(1),
                TokenKind::LShift,
                TokenKind::Number(4),
                TokenKind::RShift,
                TokenKind::Number(2),
                TokenKind::Lt,
                TokenKind::Number(0x10),
                TokenKind::Gt,
                TokenKind::Number(0x10),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn character_literal() {
        let tokens = tokenize("'A' '\\n'").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::CharLit(b'A'));
        assert_eq!(tokens[1].kind, TokenKind::CharLit(b'\n'));
    }

    #[test]
    fn span_tracking() {
        let tokens = tokenize("ldx  #$10").unwrap();
        assert_eq!(tokens[1].span, Span::new(1, 6, 5, 1));
        assert_eq!(tokens[2].span, Span::new(1, 7, 6, 3));
    }

    #[test]
    fn unknown_character_error() {
        let err = tokenize("mov ax, `").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
        assert_eq!(err.span.col, 9);
    }

    #[test]
    fn malformed_numbers() {
        assert_eq!(tokenize("12z").unwrap_err().kind, ErrorKind::Syntax);
        assert_eq!(tokenize("0x").unwrap_err().kind, ErrorKind::Syntax);
        assert_eq!(
            tokenize("0x1_0000_0000_0000_0000").unwrap_err().kind,
            ErrorKind::OverflowRange
        );
    }

    #[test]
    fn unterminated_character() {
        assert_eq!(tokenize("'A").unwrap_err().kind, ErrorKind::Syntax);
    }

    #[test]
    fn stops_at_newline() {
        assert_eq!(tok_kinds("nop\nmov"), vec![TokenKind::Ident, TokenKind::Eof]);
    }

    #[test]
    fn cursor_walks_and_sticks_at_eof() {
        let tokens = tokenize("a , b").unwrap();
        let mut cur = Cursor::new(&tokens);
        assert!(cur.peek().is_word("A"));
        cur.advance();
        assert!(cur.eat(TokenKind::Comma));
        let m = cur.mark();
        assert_eq!(cur.advance().text(), "b");
        assert!(cur.at_end());
        cur.advance();
        assert!(cur.at_end());
        cur.reset(m);
        assert_eq!(cur.peek().text(), "b");
    }

    #[test]
    fn cursor_expect() {
        let tokens = tokenize("(x").unwrap();
        let mut cur = Cursor::new(&tokens);
        assert!(cur.expect(TokenKind::OpenParen, ErrorKind::Syntax).is_ok());
        cur.advance();
        let err = cur.expect(TokenKind::CloseParen, ErrorKind::UnknownOperand).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownOperand);
    }
}
