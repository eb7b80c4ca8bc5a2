//! Public encode/decode API.
//!
//! This module ties together the lexer, the per-architecture backends and
//! the instruction state into the two façades: [`Assembler`] turns one
//! source line into bytes, [`Disassembler`] turns bytes back into one line
//! of text.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use crate::codec::{ArrayMemory, MemoryReader};
use crate::config::{Config, Cpu};
use crate::error::{AsmError, DisError, ErrorKind};
use crate::expr::{EvalContext, NoSymbols, SymbolTable};
use crate::format::TextOut;
use crate::insn::{AsmInsn, DecodeStage, DisInsn, EncodeStage};
use crate::lexer::{self, Cursor, Token, TokenKind};

/// Placeholder text for bytes that do not decode.
pub const UNKNOWN_TEXT: &str = "unknown";

// ─── Backend seam ───────────────────────────────────────────────────────

/// One architecture's tables plus its operand codec.
///
/// Implementations hold only read-only data chosen at construction time;
/// every call gets its own instruction state.
pub(crate) trait Backend: Send + Sync {
    /// Encode the statement whose mnemonic is `name`, reading operands from
    /// `cur`. Must leave the cursor after the last operand it consumed.
    fn encode(
        &self,
        insn: &mut AsmInsn,
        name: &Token<'_>,
        cur: &mut Cursor<'_, '_>,
        ctx: &EvalContext<'_>,
    ) -> Result<(), AsmError>;

    /// Decode one instruction, writing its text to `out`.
    fn decode(&self, insn: &mut DisInsn<'_>, out: &mut TextOut) -> Result<(), ErrorKind>;
}

fn backend_for(config: &Config) -> Result<Box<dyn Backend>, ErrorKind> {
    match config.cpu() {
        #[cfg(feature = "i8086")]
        Cpu::I8086 => Ok(Box::new(crate::i8086::I8086::new(config, crate::i8086::Base))),
        #[cfg(feature = "i8086")]
        Cpu::I80186 => Ok(Box::new(crate::i8086::I8086::new(
            config,
            crate::i8086::Ext186::new(),
        ))),
        #[cfg(feature = "mc6809")]
        Cpu::Mc6809 => Ok(Box::new(crate::mc6809::Mc6809::new(config))),
        #[cfg(feature = "mc68000")]
        Cpu::Mc68000 => Ok(Box::new(crate::mc68000::Mc68000::new(config))),
        #[allow(unreachable_patterns)]
        _ => Err(ErrorKind::UnsupportedCpu),
    }
}

// ─── Results ────────────────────────────────────────────────────────────

/// Outcome of encoding one line.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[must_use]
pub struct Encoded {
    /// Address of the first byte.
    pub address: u64,
    /// Emitted bytes; partial when `error` is a real error.
    pub bytes: Vec<u8>,
    /// First error (or `UndefinedSymbol` warning) recorded.
    pub error: Option<AsmError>,
    /// Stage the encode reached.
    pub stage: EncodeStage,
}

impl Encoded {
    /// Whether no real error occurred (a warning still counts as success).
    pub fn is_ok(&self) -> bool {
        self.error.map_or(true, |e| e.kind.is_warning())
    }

    /// The emitted bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of emitted bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether nothing was emitted.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Outcome of decoding one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[must_use]
pub struct Decoded {
    /// Address of the first byte.
    pub address: u64,
    /// Instruction text, or [`UNKNOWN_TEXT`].
    pub text: String,
    /// Bytes consumed, including those of an unknown instruction.
    pub bytes: Vec<u8>,
    /// Why decoding failed, if it did.
    pub error: Option<DisError>,
}

impl Decoded {
    /// Whether the bytes decoded to an instruction.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Number of bytes consumed.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether nothing was consumed.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// ─── Assembler ──────────────────────────────────────────────────────────

/// Line encoder for one configuration.
///
/// ```rust
/// use asmdis::{Assembler, Config, Cpu, NoSymbols};
///
/// let asm = Assembler::new(Config::new(Cpu::I8086)).unwrap();
/// let out = asm.encode(0x100, "jmp $", &NoSymbols);
/// assert_eq!(out.bytes, [0xEB, 0xFE]);
/// assert!(out.error.is_none());
/// ```
pub struct Assembler {
    config: Config,
    backend: Box<dyn Backend>,
}

impl Assembler {
    /// Build the encoder, selecting the table set for `config` once.
    ///
    /// # Errors
    ///
    /// `UnsupportedCpu` when the backend's feature is disabled.
    pub fn new(config: Config) -> Result<Self, ErrorKind> {
        let backend = backend_for(&config)?;
        log::debug!("assembler for {} ready", config.cpu());
        Ok(Self { config, backend })
    }

    /// The configuration in effect.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Encode one source line at `address`.
    ///
    /// Never panics and never returns early without a result: failures are
    /// reported in [`Encoded::error`] alongside whatever bytes were emitted.
    pub fn encode(&self, address: u64, line: &str, symbols: &dyn SymbolTable) -> Encoded {
        let mut insn = AsmInsn::new(address, &self.config);
        if let Err(err) = self.encode_into(&mut insn, line, symbols) {
            insn.fail(err);
        } else if !matches!(insn.stage(), EncodeStage::Failed(_)) {
            insn.advance(EncodeStage::Done);
        }
        let error = match (insn.error().kind(), insn.error().at()) {
            (Some(kind), Some(span)) => Some(AsmError::new(kind, span)),
            _ => None,
        };
        if let Some(err) = error {
            log::debug!("encode {:#x} `{}`: {}", address, line.trim(), err);
        }
        Encoded {
            address,
            stage: insn.stage(),
            error,
            bytes: insn.into_bytes().to_vec(),
        }
    }

    fn encode_into(
        &self,
        insn: &mut AsmInsn,
        line: &str,
        symbols: &dyn SymbolTable,
    ) -> Result<(), AsmError> {
        let tokens = lexer::tokenize(line)?;
        let mut cur = Cursor::new(&tokens);
        if cur.at_end() {
            return Ok(());
        }
        let name = cur.advance();
        if name.kind != TokenKind::Ident {
            return Err(AsmError::new(ErrorKind::UnknownInstruction, name.span));
        }
        if name.text().len() > self.config.max_name_len() {
            return Err(AsmError::new(ErrorKind::UnknownInstruction, name.span));
        }
        let ctx = EvalContext::new(symbols, insn.address() as i64);
        self.backend.encode(insn, name, &mut cur, &ctx)?;
        if !cur.at_end() {
            return Err(AsmError::new(ErrorKind::GarbageAtEnd, cur.span()));
        }
        Ok(())
    }
}

impl core::fmt::Debug for Assembler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Assembler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ─── Disassembler ───────────────────────────────────────────────────────

/// Instruction decoder for one configuration.
///
/// ```rust
/// use asmdis::{ArrayMemory, Config, Cpu, Disassembler};
///
/// let dis = Disassembler::new(Config::new(Cpu::Mc68000)).unwrap();
/// let mut mem = ArrayMemory::new(0x1000, &[0x4E, 0x75]);
/// let out = dis.decode(0x1000, &mut mem);
/// assert_eq!(out.text, "rts");
/// assert_eq!(out.bytes, [0x4E, 0x75]);
/// ```
pub struct Disassembler {
    config: Config,
    backend: Box<dyn Backend>,
}

impl Disassembler {
    /// Build the decoder, selecting the table set for `config` once.
    ///
    /// # Errors
    ///
    /// `UnsupportedCpu` when the backend's feature is disabled.
    pub fn new(config: Config) -> Result<Self, ErrorKind> {
        let backend = backend_for(&config)?;
        log::debug!("disassembler for {} ready", config.cpu());
        Ok(Self { config, backend })
    }

    /// The configuration in effect.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Decode one instruction at `address`, pulling bytes from `reader`.
    ///
    /// Unrecognised bytes yield [`UNKNOWN_TEXT`] together with the bytes
    /// consumed while trying.
    pub fn decode(&self, address: u64, reader: &mut dyn MemoryReader) -> Decoded {
        let mut out = TextOut::new(self.config.cpu().hex_style(), self.config.uppercase());
        let mut insn = DisInsn::new(address, &self.config, reader);
        let error = match self.backend.decode(&mut insn, &mut out) {
            Ok(()) => {
                insn.advance(DecodeStage::Done);
                None
            }
            Err(kind) => {
                insn.advance(DecodeStage::Failed(kind));
                log::debug!("decode {:#x}: {} after {:02X?}", address, kind, insn.bytes());
                Some(DisError { kind, address })
            }
        };
        let text = if error.is_some() {
            String::from(UNKNOWN_TEXT)
        } else {
            out.into_string()
        };
        Decoded {
            address,
            text,
            error,
            bytes: insn.into_bytes().to_vec(),
        }
    }
}

impl core::fmt::Debug for Disassembler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Disassembler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ─── One-shot helpers ───────────────────────────────────────────────────

/// Encode a single line with the default configuration for `cpu` and no
/// symbols.
///
/// ```rust
/// use asmdis::{assemble_line, Cpu};
///
/// let out = assemble_line(Cpu::Mc6809, 0, "lda #$12").unwrap();
/// assert_eq!(out.bytes, [0x86, 0x12]);
/// ```
///
/// # Errors
///
/// `UnsupportedCpu` when the backend's feature is disabled; encode errors
/// are reported inside the [`Encoded`] value.
pub fn assemble_line(cpu: Cpu, address: u64, line: &str) -> Result<Encoded, ErrorKind> {
    let asm = Assembler::new(Config::new(cpu))?;
    Ok(asm.encode(address, line, &NoSymbols))
}

/// Decode every instruction in `bytes`, mapped at `address`.
///
/// Decoding continues after an unknown instruction with the byte following
/// the ones it consumed, and stops when the bytes run out.
///
/// ```rust
/// use asmdis::{disassemble, Cpu};
///
/// let lines = disassemble(Cpu::I8086, 0, &[0x90, 0xC3]).unwrap();
/// let text: Vec<_> = lines.iter().map(|d| d.text.as_str()).collect();
/// assert_eq!(text, ["nop", "ret"]);
/// ```
///
/// # Errors
///
/// `UnsupportedCpu` when the backend's feature is disabled.
pub fn disassemble(cpu: Cpu, address: u64, bytes: &[u8]) -> Result<Vec<Decoded>, ErrorKind> {
    let dis = Disassembler::new(Config::new(cpu))?;
    let mut mem = ArrayMemory::new(address, bytes);
    let mut lines = Vec::new();
    while !mem.is_empty() {
        let at = mem.address();
        let decoded = dis.decode(at, &mut mem);
        if decoded.is_empty() {
            break;
        }
        lines.push(decoded);
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Symbols;

    #[test]
    fn empty_and_comment_lines_encode_nothing() {
        let asm = Assembler::new(Config::new(Cpu::I8086)).unwrap();
        for line in ["", "   ", "; just a comment"] {
            let out = asm.encode(0, line, &NoSymbols);
            assert!(out.bytes.is_empty());
            assert!(out.error.is_none());
            assert_eq!(out.stage, EncodeStage::Done);
        }
    }

    #[test]
    fn unknown_mnemonic() {
        let asm = Assembler::new(Config::new(Cpu::Mc6809)).unwrap();
        let out = asm.encode(0, "frob a", &NoSymbols);
        assert_eq!(out.error.map(|e| e.kind), Some(ErrorKind::UnknownInstruction));
        assert_eq!(out.stage, EncodeStage::Failed(ErrorKind::UnknownInstruction));
    }

    #[test]
    fn overlong_mnemonic_is_unknown() {
        let asm = Assembler::new(Config::new(Cpu::Mc6809)).unwrap();
        let out = asm.encode(0, "ldaaaa #1", &NoSymbols);
        assert_eq!(out.error.map(|e| e.kind), Some(ErrorKind::UnknownInstruction));
    }

    #[test]
    fn numeric_mnemonic_is_unknown() {
        let asm = Assembler::new(Config::new(Cpu::I8086)).unwrap();
        let out = asm.encode(0, "42", &NoSymbols);
        assert_eq!(out.error.map(|e| e.kind), Some(ErrorKind::UnknownInstruction));
    }

    #[test]
    fn trailing_tokens_are_garbage() {
        let asm = Assembler::new(Config::new(Cpu::I8086)).unwrap();
        let out = asm.encode(0, "ret 4 5", &NoSymbols);
        let err = out.error.unwrap();
        assert_eq!(err.kind, ErrorKind::GarbageAtEnd);
        assert_eq!(err.span.col, 7);
        assert_eq!(out.bytes, [0xC2, 0x04, 0x00]);
    }

    #[test]
    fn undefined_symbol_is_a_warning_with_bytes() {
        let asm = Assembler::new(Config::new(Cpu::Mc6809)).unwrap();
        let out = asm.encode(0, "ldx #later", &NoSymbols);
        assert_eq!(out.bytes, [0x8E, 0x00, 0x00]);
        assert_eq!(out.error.map(|e| e.kind), Some(ErrorKind::UndefinedSymbol));
        assert!(out.is_ok());
    }

    #[test]
    fn symbols_are_consulted() {
        let asm = Assembler::new(Config::new(Cpu::Mc6809)).unwrap();
        let mut syms = Symbols::new();
        syms.define("port", 0x1234);
        let out = asm.encode(0, "lda port", &syms);
        assert_eq!(out.bytes, [0xB6, 0x12, 0x34]);
        assert!(out.error.is_none());
    }

    #[test]
    fn unknown_bytes_get_placeholder() {
        let dis = Disassembler::new(Config::new(Cpu::Mc6809)).unwrap();
        let mut mem = ArrayMemory::new(0, &[0x01]);
        let out = dis.decode(0, &mut mem);
        assert_eq!(out.text, UNKNOWN_TEXT);
        assert_eq!(out.bytes, [0x01]);
        assert_eq!(out.error.map(|e| e.kind), Some(ErrorKind::UnknownInstruction));
    }

    #[test]
    fn truncated_instruction_reports_no_memory() {
        let dis = Disassembler::new(Config::new(Cpu::Mc68000)).unwrap();
        let mut mem = ArrayMemory::new(0x400, &[0x4E]);
        let out = dis.decode(0x400, &mut mem);
        assert_eq!(out.error, Some(DisError { kind: ErrorKind::NoMemory, address: 0x400 }));
        assert_eq!(out.bytes, [0x4E]);
    }

    #[test]
    fn disassemble_walks_all_bytes() {
        let lines = disassemble(Cpu::Mc6809, 0x100, &[0x12, 0x86, 0x05, 0x39]).unwrap();
        let text: Vec<_> = lines.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(text, ["nop", "lda #$5", "rts"]);
        assert_eq!(lines[1].address, 0x101);
        assert_eq!(lines[2].address, 0x103);
    }

    #[test]
    fn uppercase_output() {
        let dis = Disassembler::new(Config::new(Cpu::Mc6809).with_uppercase(true)).unwrap();
        let mut mem = ArrayMemory::new(0, &[0x1F, 0x89]);
        assert_eq!(dis.decode(0, &mut mem).text, "TFR A,B");
    }
}
