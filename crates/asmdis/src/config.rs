//! Per-architecture configuration.
//!
//! A [`Config`] is an immutable value chosen once per [`Assembler`] or
//! [`Disassembler`] and threaded by reference through every call. There is no
//! process-wide "current CPU" state, so differently configured façades can be
//! used side by side from any number of threads.
//!
//! [`Assembler`]: crate::Assembler
//! [`Disassembler`]: crate::Disassembler

use core::fmt;
use core::str::FromStr;

use crate::error::ErrorKind;
use crate::format::HexStyle;

/// Supported CPU variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Cpu {
    /// Intel 8086 / 8088.
    I8086,
    /// Intel 80186 / 80188: the 8086 set plus the 80186 additions.
    I80186,
    /// Motorola 6809.
    Mc6809,
    /// Motorola 68000.
    Mc68000,
}

impl Cpu {
    /// Canonical name as accepted by [`FromStr`].
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Cpu::I8086 => "8086",
            Cpu::I80186 => "80186",
            Cpu::Mc6809 => "6809",
            Cpu::Mc68000 => "68000",
        }
    }

    /// Number notation used by this CPU family's decoded text.
    #[must_use]
    pub const fn hex_style(self) -> HexStyle {
        match self {
            Cpu::I8086 | Cpu::I80186 => HexStyle::Intel,
            Cpu::Mc6809 | Cpu::Mc68000 => HexStyle::Motorola,
        }
    }
}

impl fmt::Display for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Cpu {
    type Err = ErrorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s
            .strip_prefix('i')
            .or_else(|| s.strip_prefix('I'))
            .or_else(|| s.strip_prefix("mc"))
            .or_else(|| s.strip_prefix("MC"))
            .unwrap_or(s);
        match s {
            "8086" | "8088" => Ok(Cpu::I8086),
            "80186" | "80188" | "186" => Ok(Cpu::I80186),
            "6809" => Ok(Cpu::Mc6809),
            "68000" | "68k" | "68K" => Ok(Cpu::Mc68000),
            _ => Err(ErrorKind::UnsupportedCpu),
        }
    }
}

/// Byte order of multi-byte fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Endian {
    /// Least significant byte first (Intel).
    Little,
    /// Most significant byte first (Motorola).
    Big,
}

/// Immutable per-architecture configuration.
///
/// Built with [`Config::new`] and chained `with_*` setters:
///
/// ```rust
/// use asmdis::{Config, Cpu};
///
/// let cfg = Config::new(Cpu::Mc68000).with_alias_entries(false);
/// assert!(!cfg.alias_entries());
/// assert_eq!(cfg.max_insn_len(), 10);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    cpu: Cpu,
    alias_entries: bool,
    long_branch: bool,
    direct_page: u8,
    uppercase: bool,
}

impl Config {
    /// Default configuration for `cpu`.
    #[must_use]
    pub const fn new(cpu: Cpu) -> Self {
        Self {
            cpu,
            alias_entries: true,
            long_branch: false,
            direct_page: 0,
            uppercase: false,
        }
    }

    /// Enable or disable the 68000 quick/immediate alias entries
    /// (`ADD #1,D0` → `ADDQ`). Default: on.
    #[must_use]
    pub const fn with_alias_entries(mut self, on: bool) -> Self {
        self.alias_entries = on;
        self
    }

    /// Let a 6809 `Bcc` whose target is out of 8-bit reach encode as
    /// `LBcc`. Default: off.
    #[must_use]
    pub const fn with_long_branch(mut self, on: bool) -> Self {
        self.long_branch = on;
        self
    }

    /// Assumed 6809 direct-page register value. Default: 0.
    #[must_use]
    pub const fn with_direct_page(mut self, dp: u8) -> Self {
        self.direct_page = dp;
        self
    }

    /// Upper-case mnemonics and registers in decoded text. Default: off.
    #[must_use]
    pub const fn with_uppercase(mut self, on: bool) -> Self {
        self.uppercase = on;
        self
    }

    /// The selected CPU.
    #[must_use]
    pub const fn cpu(&self) -> Cpu {
        self.cpu
    }

    /// Whether alias entries take part in name search.
    #[must_use]
    pub const fn alias_entries(&self) -> bool {
        self.alias_entries
    }

    /// Whether out-of-range short branches are promoted.
    #[must_use]
    pub const fn long_branch(&self) -> bool {
        self.long_branch
    }

    /// Assumed direct-page register value.
    #[must_use]
    pub const fn direct_page(&self) -> u8 {
        self.direct_page
    }

    /// Whether decoded text is upper case.
    #[must_use]
    pub const fn uppercase(&self) -> bool {
        self.uppercase
    }

    /// Width of the address bus in bits.
    #[must_use]
    pub const fn address_width(&self) -> u8 {
        match self.cpu {
            Cpu::I8086 | Cpu::I80186 => 20,
            Cpu::Mc6809 => 16,
            Cpu::Mc68000 => 24,
        }
    }

    /// Width of the base opcode in bits.
    #[must_use]
    pub const fn opcode_width(&self) -> u8 {
        match self.cpu {
            Cpu::I8086 | Cpu::I80186 | Cpu::Mc6809 => 8,
            Cpu::Mc68000 => 16,
        }
    }

    /// Byte order of multi-byte operand fields.
    #[must_use]
    pub const fn endian(&self) -> Endian {
        match self.cpu {
            Cpu::I8086 | Cpu::I80186 => Endian::Little,
            Cpu::Mc6809 | Cpu::Mc68000 => Endian::Big,
        }
    }

    /// Longest instruction in bytes, prefixes included.
    #[must_use]
    pub const fn max_insn_len(&self) -> usize {
        match self.cpu {
            Cpu::I8086 | Cpu::I80186 => 10,
            Cpu::Mc6809 => 5,
            Cpu::Mc68000 => 10,
        }
    }

    /// Longest mnemonic, size suffix excluded.
    #[must_use]
    pub const fn max_name_len(&self) -> usize {
        match self.cpu {
            Cpu::I8086 | Cpu::I80186 => 6,
            Cpu::Mc6809 => 5,
            Cpu::Mc68000 => 7,
        }
    }

    /// Most operands any entry takes.
    #[must_use]
    pub const fn max_operands(&self) -> usize {
        match self.cpu {
            Cpu::I8086 | Cpu::I80186 => 3,
            Cpu::Mc6809 | Cpu::Mc68000 => 2,
        }
    }
}
