//! # asmdis: table-driven retargetable assembler and disassembler
//!
//! `asmdis` encodes one line of assembly text into machine-code bytes and
//! decodes bytes back into text. Every target describes its instruction set
//! as static tables of entries; a shared engine searches those tables by
//! mnemonic (encoding) or by opcode (decoding), and a per-target backend
//! parses operands and places their bits.
//!
//! ## Quick Start
//!
//! ```rust
//! use asmdis::{assemble_line, disassemble, Cpu};
//!
//! let out = assemble_line(Cpu::I8086, 0x100, "mov ax, 1234h").unwrap();
//! assert_eq!(out.bytes, vec![0xB8, 0x34, 0x12]);
//!
//! let lines = disassemble(Cpu::Mc68000, 0x1000, &[0x4E, 0x75]).unwrap();
//! assert_eq!(lines[0].text, "rts");
//! ```
//!
//! ## Targets
//!
//! - **8086 / 80186**: Intel syntax, little-endian (feature `i8086`).
//! - **6809**: Motorola syntax, big-endian, prefixed opcode pages
//!   (feature `mc6809`).
//! - **68000**: Motorola syntax, big-endian, 16-bit opcode words
//!   (feature `mc68000`).
//!
//! The crate is `no_std` + `alloc` when the default `std` feature is off.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
// ── Pedantic lint policy ─────────────────────────────────────────────────
// Instruction encoding narrows and sign-changes integers constantly and
// writes opcodes as dense hex literals.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_lossless,
    clippy::cast_possible_wrap,
    clippy::unreadable_literal,
    clippy::match_same_arms,
    clippy::redundant_closure_for_method_calls,
    clippy::bool_to_int_with_if,
    clippy::wildcard_imports,
    clippy::enum_glob_use,
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::uninlined_format_args,
    clippy::doc_markdown,
    clippy::similar_names,
    clippy::too_many_lines,
    clippy::single_match_else,
    clippy::manual_let_else,
    clippy::unnecessary_wraps,
    clippy::missing_errors_doc,
    clippy::needless_continue
)]

extern crate alloc;

/// Assembler and disassembler drivers, plus one-shot helpers.
pub mod assembler;
/// Byte order, field range checks and memory readers.
pub mod codec;
/// Target selection and per-target limits.
pub mod config;
/// Instruction table entries, pages and the [`entry::Isa`] trait.
pub mod entry;
/// Error codes, spans and positioned errors.
pub mod error;
/// Expression evaluation and symbol tables.
pub mod expr;
/// Text output with target number style.
pub mod format;
/// Per-instruction encode and decode state.
pub mod insn;
/// Tokenizer with span tracking.
pub mod lexer;
/// Immediate width selection and branch relaxation.
pub mod resolver;
/// Table search by name and by opcode.
pub mod search;

#[cfg(feature = "i8086")]
pub(crate) mod i8086;
#[cfg(feature = "mc6809")]
pub(crate) mod mc6809;
#[cfg(feature = "mc68000")]
pub(crate) mod mc68000;

// Re-exports
pub use assembler::{
    assemble_line, disassemble, Assembler, Decoded, Disassembler, Encoded, UNKNOWN_TEXT,
};
pub use codec::{ArrayMemory, MemoryReader};
pub use config::{Config, Cpu, Endian};
pub use error::{AsmError, DisError, ErrorKind, Span};
pub use expr::{eval, NoSymbols, SymbolTable, Symbols, Value};
pub use format::HexStyle;
pub use insn::{DecodeStage, EncodeStage};
