//! Decoded instruction text.
//!
//! Each backend renders its operands through a [`TextOut`], which owns the
//! letter-case and number-style conventions of the architecture family so
//! that backends only decide *what* to print.

use core::fmt::Write as _;

use alloc::string::String;

/// How numbers are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HexStyle {
    /// `0x1f` with lower-case digits; operands separated by `", "`.
    Intel,
    /// `$1F` with upper-case digits; operands separated by `","`.
    Motorola,
}

/// Text sink for one decoded instruction.
#[derive(Debug, Clone)]
pub struct TextOut {
    buf: String,
    style: HexStyle,
    uppercase: bool,
}

impl TextOut {
    /// An empty sink.
    pub fn new(style: HexStyle, uppercase: bool) -> Self {
        Self {
            buf: String::with_capacity(32),
            style,
            uppercase,
        }
    }

    /// Number style in effect.
    #[inline]
    pub fn style(&self) -> HexStyle {
        self.style
    }

    /// Write a mnemonic, register or keyword in the configured letter case.
    pub fn name(&mut self, word: &str) -> &mut Self {
        for c in word.chars() {
            self.buf.push(if self.uppercase {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            });
        }
        self
    }

    /// Write punctuation verbatim.
    pub fn text(&mut self, s: &str) -> &mut Self {
        self.buf.push_str(s);
        self
    }

    /// Write one character verbatim.
    pub fn ch(&mut self, c: char) -> &mut Self {
        self.buf.push(c);
        self
    }

    /// The gap between mnemonic and first operand.
    pub fn gap(&mut self) -> &mut Self {
        self.buf.push(' ');
        self
    }

    /// The separator between operands.
    pub fn sep(&mut self) -> &mut Self {
        match self.style {
            HexStyle::Intel => self.buf.push_str(", "),
            HexStyle::Motorola => self.buf.push(','),
        }
        self
    }

    /// An unsigned number in the family's hex notation.
    pub fn hex(&mut self, value: u64) -> &mut Self {
        // Writing to a String cannot fail.
        let _ = match self.style {
            HexStyle::Intel => write!(self.buf, "{:#x}", value),
            HexStyle::Motorola => write!(self.buf, "${:X}", value),
        };
        self
    }

    /// A signed number in hex: a leading `-` for negatives.
    pub fn signed_hex(&mut self, value: i64) -> &mut Self {
        if value < 0 {
            self.buf.push('-');
        }
        self.hex(value.unsigned_abs())
    }

    /// A signed decimal number.
    pub fn dec(&mut self, value: i64) -> &mut Self {
        let _ = write!(self.buf, "{}", value);
        self
    }

    /// Text written so far.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.buf
    }

    /// Whether nothing has been written.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Discard everything written.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Take the finished text.
    pub fn into_string(self) -> String {
        self.buf
    }
}
