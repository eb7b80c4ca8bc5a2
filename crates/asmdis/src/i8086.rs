//! Intel 8086 / 80186 backend.
//!
//! Operands are classified into [`Mode`]s, the table is searched, and the
//! chosen entry is emitted as
//! `[prefixes] [segment] opcode [modrm [disp]] [immediate | rel | moffs | far]`.
//! The 80186 additions live in their own table and are composed over the
//! 8086 base by explicit delegation (see [`Ext186`]).

use crate::assembler::Backend;
use crate::codec::check_range;
use crate::config::Config;
use crate::entry::{Entry, Flags, Isa, Page, Slot};
use crate::error::{AsmError, ErrorKind, Span};
use crate::expr::{parse_expr, parse_term, span_since, EvalContext, Value};
use crate::format::TextOut;
use crate::insn::{AsmInsn, DecodeStage, DisInsn, EncodeStage, ResultExt};
use crate::lexer::{Cursor, Token, TokenKind};
use crate::resolver::{choose_width, relax_branch, sign_extend, Reach, Width};
use crate::search::{self, accept_slots, Found, Reject};

// ─── Vocabulary ─────────────────────────────────────────────────────────

/// Operand shapes. The first group is produced by the operand parser; the
/// second appears only in tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    None,
    Al,
    Cl,
    Ax,
    Dx,
    Cs,
    Reg8,
    Reg16,
    Seg,
    /// Unsized memory through base/index registers.
    Mem,
    Mem8,
    Mem16,
    Mem32,
    /// Unsized direct `[addr]`.
    Dir,
    Dir8,
    Dir16,
    Val1,
    Val3,
    /// Fits a sign-extended byte.
    ImmS8,
    Imm8,
    Imm16,
    /// Branch target whose width is not determined yet.
    Rel,
    Rel8,
    Rel16,
    Far,
    // Table-only.
    Rm8,
    Rm16,
    Moffs8,
    Moffs16,
    /// A segment register that may be written (not CS).
    SegDst,
    /// 80186 shift count (anything but the constant 1).
    Cnt8,
}

/// Where an operand's bits live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pos {
    None,
    /// Opcode bits 0-2.
    OReg,
    /// Opcode bits 3-4.
    OSeg,
    /// ModR/M reg field.
    ModReg,
    /// ModR/M r/m field plus displacement.
    ModRm,
    /// Trailing immediate.
    Imm,
    /// Second trailing immediate (`ENTER`).
    Imm2,
    Rel,
    Moffs,
    Far,
    /// Named by the opcode itself.
    Implied,
}

/// Whether the entry is one half of a byte/word pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpSize {
    None,
    Byte,
    Word,
}

/// Opcode extension carried outside the opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Ext {
    None,
    /// `/digit` in the ModR/M reg field.
    Digit(u8),
    /// A fixed byte after the opcode.
    Suffix(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Format {
    size: OpSize,
    ext: Ext,
}

/// The 8086 table vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct X86;

impl Isa for X86 {
    type Mode = Mode;
    type Pos = Pos;
    type Size = Format;

    const NONE_MODE: Mode = Mode::None;
    const NONE_POS: Pos = Pos::None;

    fn operand_mask(_mode: Mode, pos: Pos, _size: Format) -> u16 {
        match pos {
            Pos::OReg => 0x07,
            Pos::OSeg => 0x18,
            _ => 0,
        }
    }

    fn accept_mode(parsed: Mode, table: Mode) -> bool {
        use Mode as M;
        if parsed == table {
            return true;
        }
        match table {
            M::Reg8 => matches!(parsed, M::Al | M::Cl),
            M::Reg16 => matches!(parsed, M::Ax | M::Dx),
            M::Seg => parsed == M::Cs,
            M::SegDst => parsed == M::Seg,
            M::Rm8 => matches!(parsed, M::Al | M::Cl | M::Reg8 | M::Mem8 | M::Dir8 | M::Mem | M::Dir),
            M::Rm16 => {
                matches!(parsed, M::Ax | M::Dx | M::Reg16 | M::Mem16 | M::Dir16 | M::Mem | M::Dir)
            }
            M::Mem => matches!(
                parsed,
                M::Mem8 | M::Mem16 | M::Mem32 | M::Dir | M::Dir8 | M::Dir16
            ),
            M::Moffs8 => matches!(parsed, M::Dir8 | M::Dir),
            M::Moffs16 => matches!(parsed, M::Dir16 | M::Dir),
            M::Imm8 => matches!(parsed, M::Val1 | M::Val3 | M::ImmS8 | M::Imm16),
            M::ImmS8 => matches!(parsed, M::Val1 | M::Val3),
            M::Imm16 => matches!(parsed, M::Val1 | M::Val3 | M::ImmS8 | M::Imm8),
            M::Cnt8 => matches!(parsed, M::Val3 | M::ImmS8 | M::Imm8 | M::Imm16),
            _ => false,
        }
    }

    fn reject_kind(parsed: Mode, table: Mode) -> ErrorKind {
        if table == Mode::SegDst && parsed == Mode::Cs {
            ErrorKind::RegisterNotAllowed
        } else {
            ErrorKind::OperandNotAllowed
        }
    }
}

// ─── Tables ─────────────────────────────────────────────────────────────

use Mode as M;
use Pos as P;

const N: Format = Format {
    size: OpSize::None,
    ext: Ext::None,
};
const B: Format = Format {
    size: OpSize::Byte,
    ext: Ext::None,
};
const W: Format = Format {
    size: OpSize::Word,
    ext: Ext::None,
};

const fn digit(size: OpSize, d: u8) -> Format {
    Format {
        size,
        ext: Ext::Digit(d),
    }
}

const fn s(mode: Mode, pos: Pos) -> Slot<X86> {
    Slot::new(mode, pos)
}

const fn e0(name: &'static str, op: u16, f: Format) -> Entry<X86> {
    Entry::new(name, op, Flags::none(f))
}

const fn e1(name: &'static str, op: u16, mode: Mode, pos: Pos, f: Format) -> Entry<X86> {
    Entry::new(name, op, Flags::one(mode, pos, f))
}

const fn e2(name: &'static str, op: u16, a: Slot<X86>, b: Slot<X86>, f: Format) -> Entry<X86> {
    Entry::new(name, op, Flags::two(a, b, f))
}

const fn alu(name: &'static str, op: u8) -> [Entry<X86>; 9] {
    let base = (op as u16) << 3;
    [
        e2(name, base | 4, s(M::Al, P::Implied), s(M::Imm8, P::Imm), B),
        e2(name, 0x83, s(M::Rm16, P::ModRm), s(M::ImmS8, P::Imm), digit(OpSize::Word, op)),
        e2(name, base | 5, s(M::Ax, P::Implied), s(M::Imm16, P::Imm), W),
        e2(name, 0x80, s(M::Rm8, P::ModRm), s(M::Imm8, P::Imm), digit(OpSize::Byte, op)),
        e2(name, 0x81, s(M::Rm16, P::ModRm), s(M::Imm16, P::Imm), digit(OpSize::Word, op)),
        e2(name, base, s(M::Rm8, P::ModRm), s(M::Reg8, P::ModReg), B),
        e2(name, base | 1, s(M::Rm16, P::ModRm), s(M::Reg16, P::ModReg), W),
        e2(name, base | 2, s(M::Reg8, P::ModReg), s(M::Rm8, P::ModRm), B),
        e2(name, base | 3, s(M::Reg16, P::ModReg), s(M::Rm16, P::ModRm), W),
    ]
}

const fn unary(name: &'static str, d: u8) -> [Entry<X86>; 2] {
    [
        e1(name, 0xF6, M::Rm8, P::ModRm, digit(OpSize::Byte, d)),
        e1(name, 0xF7, M::Rm16, P::ModRm, digit(OpSize::Word, d)),
    ]
}

const fn shift(name: &'static str, d: u8) -> [Entry<X86>; 4] {
    [
        e2(name, 0xD0, s(M::Rm8, P::ModRm), s(M::Val1, P::Implied), digit(OpSize::Byte, d)),
        e2(name, 0xD1, s(M::Rm16, P::ModRm), s(M::Val1, P::Implied), digit(OpSize::Word, d)),
        e2(name, 0xD2, s(M::Rm8, P::ModRm), s(M::Cl, P::Implied), digit(OpSize::Byte, d)),
        e2(name, 0xD3, s(M::Rm16, P::ModRm), s(M::Cl, P::Implied), digit(OpSize::Word, d)),
    ]
}

const fn shift186(name: &'static str, d: u8) -> [Entry<X86>; 2] {
    [
        e2(name, 0xC0, s(M::Rm8, P::ModRm), s(M::Cnt8, P::Imm), digit(OpSize::Byte, d)),
        e2(name, 0xC1, s(M::Rm16, P::ModRm), s(M::Cnt8, P::Imm), digit(OpSize::Word, d)),
    ]
}

const fn rel8(name: &'static str, op: u16) -> Entry<X86> {
    e1(name, op, M::Rel8, P::Rel, N)
}

static MOV: [Entry<X86>; 14] = [
    e2("MOV", 0xA0, s(M::Al, P::Implied), s(M::Moffs8, P::Moffs), B),
    e2("MOV", 0xA1, s(M::Ax, P::Implied), s(M::Moffs16, P::Moffs), W),
    e2("MOV", 0xA2, s(M::Moffs8, P::Moffs), s(M::Al, P::Implied), B),
    e2("MOV", 0xA3, s(M::Moffs16, P::Moffs), s(M::Ax, P::Implied), W),
    e2("MOV", 0x88, s(M::Rm8, P::ModRm), s(M::Reg8, P::ModReg), B),
    e2("MOV", 0x89, s(M::Rm16, P::ModRm), s(M::Reg16, P::ModReg), W),
    e2("MOV", 0x8A, s(M::Reg8, P::ModReg), s(M::Rm8, P::ModRm), B),
    e2("MOV", 0x8B, s(M::Reg16, P::ModReg), s(M::Rm16, P::ModRm), W),
    e2("MOV", 0x8C, s(M::Rm16, P::ModRm), s(M::Seg, P::ModReg), N),
    e2("MOV", 0x8E, s(M::SegDst, P::ModReg), s(M::Rm16, P::ModRm), N),
    e2("MOV", 0xB0, s(M::Reg8, P::OReg), s(M::Imm8, P::Imm), B),
    e2("MOV", 0xB8, s(M::Reg16, P::OReg), s(M::Imm16, P::Imm), W),
    e2("MOV", 0xC6, s(M::Rm8, P::ModRm), s(M::Imm8, P::Imm), digit(OpSize::Byte, 0)),
    e2("MOV", 0xC7, s(M::Rm16, P::ModRm), s(M::Imm16, P::Imm), digit(OpSize::Word, 0)),
];

static ADD: [Entry<X86>; 9] = alu("ADD", 0);
static OR: [Entry<X86>; 9] = alu("OR", 1);
static ADC: [Entry<X86>; 9] = alu("ADC", 2);
static SBB: [Entry<X86>; 9] = alu("SBB", 3);
static AND: [Entry<X86>; 9] = alu("AND", 4);
static SUB: [Entry<X86>; 9] = alu("SUB", 5);
static XOR: [Entry<X86>; 9] = alu("XOR", 6);
static CMP: [Entry<X86>; 9] = alu("CMP", 7);

static TEST: [Entry<X86>; 8] = [
    e2("TEST", 0xA8, s(M::Al, P::Implied), s(M::Imm8, P::Imm), B),
    e2("TEST", 0xA9, s(M::Ax, P::Implied), s(M::Imm16, P::Imm), W),
    e2("TEST", 0xF6, s(M::Rm8, P::ModRm), s(M::Imm8, P::Imm), digit(OpSize::Byte, 0)),
    e2("TEST", 0xF7, s(M::Rm16, P::ModRm), s(M::Imm16, P::Imm), digit(OpSize::Word, 0)),
    e2("TEST", 0x84, s(M::Rm8, P::ModRm), s(M::Reg8, P::ModReg), B),
    e2("TEST", 0x85, s(M::Rm16, P::ModRm), s(M::Reg16, P::ModReg), W),
    e2("TEST", 0x84, s(M::Reg8, P::ModReg), s(M::Rm8, P::ModRm), B),
    e2("TEST", 0x85, s(M::Reg16, P::ModReg), s(M::Rm16, P::ModRm), W),
];

static INC_DEC: [Entry<X86>; 6] = [
    e1("INC", 0x40, M::Reg16, P::OReg, N),
    e1("INC", 0xFE, M::Rm8, P::ModRm, digit(OpSize::Byte, 0)),
    e1("INC", 0xFF, M::Rm16, P::ModRm, digit(OpSize::Word, 0)),
    e1("DEC", 0x48, M::Reg16, P::OReg, N),
    e1("DEC", 0xFE, M::Rm8, P::ModRm, digit(OpSize::Byte, 1)),
    e1("DEC", 0xFF, M::Rm16, P::ModRm, digit(OpSize::Word, 1)),
];

static NOT: [Entry<X86>; 2] = unary("NOT", 2);
static NEG: [Entry<X86>; 2] = unary("NEG", 3);
static MUL: [Entry<X86>; 2] = unary("MUL", 4);
static IMUL: [Entry<X86>; 2] = unary("IMUL", 5);
static DIV: [Entry<X86>; 2] = unary("DIV", 6);
static IDIV: [Entry<X86>; 2] = unary("IDIV", 7);

static ROL: [Entry<X86>; 4] = shift("ROL", 0);
static ROR: [Entry<X86>; 4] = shift("ROR", 1);
static RCL: [Entry<X86>; 4] = shift("RCL", 2);
static RCR: [Entry<X86>; 4] = shift("RCR", 3);
static SHL: [Entry<X86>; 4] = shift("SHL", 4);
static SHR: [Entry<X86>; 4] = shift("SHR", 5);
static SAL: [Entry<X86>; 4] = shift("SAL", 4);
static SAR: [Entry<X86>; 4] = shift("SAR", 7);

static STACK: [Entry<X86>; 6] = [
    e1("PUSH", 0x50, M::Reg16, P::OReg, N),
    e1("PUSH", 0x06, M::Seg, P::OSeg, N),
    e1("PUSH", 0xFF, M::Rm16, P::ModRm, digit(OpSize::None, 6)),
    e1("POP", 0x58, M::Reg16, P::OReg, N),
    e1("POP", 0x07, M::SegDst, P::OSeg, N),
    e1("POP", 0x8F, M::Rm16, P::ModRm, digit(OpSize::None, 0)),
];

static XCHG: [Entry<X86>; 6] = [
    e2("XCHG", 0x90, s(M::Ax, P::Implied), s(M::Reg16, P::OReg), N),
    e2("XCHG", 0x90, s(M::Reg16, P::OReg), s(M::Ax, P::Implied), N),
    e2("XCHG", 0x86, s(M::Reg8, P::ModReg), s(M::Rm8, P::ModRm), B),
    e2("XCHG", 0x86, s(M::Rm8, P::ModRm), s(M::Reg8, P::ModReg), B),
    e2("XCHG", 0x87, s(M::Reg16, P::ModReg), s(M::Rm16, P::ModRm), W),
    e2("XCHG", 0x87, s(M::Rm16, P::ModRm), s(M::Reg16, P::ModReg), W),
];

static LOAD_PTR: [Entry<X86>; 3] = [
    e2("LEA", 0x8D, s(M::Reg16, P::ModReg), s(M::Mem, P::ModRm), N),
    e2("LDS", 0xC5, s(M::Reg16, P::ModReg), s(M::Mem, P::ModRm), N),
    e2("LES", 0xC4, s(M::Reg16, P::ModReg), s(M::Mem, P::ModRm), N),
];

static IO: [Entry<X86>; 8] = [
    e2("IN", 0xE4, s(M::Al, P::Implied), s(M::Imm8, P::Imm), B),
    e2("IN", 0xE5, s(M::Ax, P::Implied), s(M::Imm8, P::Imm), W),
    e2("IN", 0xEC, s(M::Al, P::Implied), s(M::Dx, P::Implied), B),
    e2("IN", 0xED, s(M::Ax, P::Implied), s(M::Dx, P::Implied), W),
    e2("OUT", 0xE6, s(M::Imm8, P::Imm), s(M::Al, P::Implied), B),
    e2("OUT", 0xE7, s(M::Imm8, P::Imm), s(M::Ax, P::Implied), W),
    e2("OUT", 0xEE, s(M::Dx, P::Implied), s(M::Al, P::Implied), B),
    e2("OUT", 0xEF, s(M::Dx, P::Implied), s(M::Ax, P::Implied), W),
];

static CONTROL: [Entry<X86>; 15] = [
    e1("INT", 0xCC, M::Val3, P::Implied, N),
    e1("INT", 0xCD, M::Imm8, P::Imm, N),
    e0("RET", 0xC3, N),
    e1("RET", 0xC2, M::Imm16, P::Imm, N),
    e0("RETF", 0xCB, N),
    e1("RETF", 0xCA, M::Imm16, P::Imm, N),
    e1("JMP", 0xEB, M::Rel8, P::Rel, N),
    e1("JMP", 0xE9, M::Rel16, P::Rel, N),
    e1("JMP", 0xFF, M::Rm16, P::ModRm, digit(OpSize::None, 4)),
    e1("JMP", 0xEA, M::Far, P::Far, N),
    e1("JMP", 0xFF, M::Mem32, P::ModRm, digit(OpSize::None, 5)),
    e1("CALL", 0xE8, M::Rel16, P::Rel, N),
    e1("CALL", 0xFF, M::Rm16, P::ModRm, digit(OpSize::None, 2)),
    e1("CALL", 0x9A, M::Far, P::Far, N),
    e1("CALL", 0xFF, M::Mem32, P::ModRm, digit(OpSize::None, 3)),
];

static JCC: [Entry<X86>; 36] = [
    rel8("JO", 0x70),
    rel8("JNO", 0x71),
    rel8("JB", 0x72),
    rel8("JAE", 0x73),
    rel8("JE", 0x74),
    rel8("JNE", 0x75),
    rel8("JBE", 0x76),
    rel8("JA", 0x77),
    rel8("JS", 0x78),
    rel8("JNS", 0x79),
    rel8("JP", 0x7A),
    rel8("JNP", 0x7B),
    rel8("JL", 0x7C),
    rel8("JGE", 0x7D),
    rel8("JLE", 0x7E),
    rel8("JG", 0x7F),
    rel8("LOOPNE", 0xE0),
    rel8("LOOPE", 0xE1),
    rel8("LOOP", 0xE2),
    rel8("JCXZ", 0xE3),
    // Alternative names for the same opcodes; decode reports the ones above.
    rel8("JC", 0x72),
    rel8("JNAE", 0x72),
    rel8("JNB", 0x73),
    rel8("JNC", 0x73),
    rel8("JZ", 0x74),
    rel8("JNZ", 0x75),
    rel8("JNA", 0x76),
    rel8("JNBE", 0x77),
    rel8("JPE", 0x7A),
    rel8("JPO", 0x7B),
    rel8("JNGE", 0x7C),
    rel8("JNL", 0x7D),
    rel8("JNG", 0x7E),
    rel8("JNLE", 0x7F),
    rel8("LOOPNZ", 0xE0),
    rel8("LOOPZ", 0xE1),
];

static SIMPLE: [Entry<X86>; 36] = [
    e0("NOP", 0x90, N),
    e0("DAA", 0x27, N),
    e0("DAS", 0x2F, N),
    e0("AAA", 0x37, N),
    e0("AAS", 0x3F, N),
    e0("CBW", 0x98, N),
    e0("CWD", 0x99, N),
    e0("WAIT", 0x9B, N),
    e0("PUSHF", 0x9C, N),
    e0("POPF", 0x9D, N),
    e0("SAHF", 0x9E, N),
    e0("LAHF", 0x9F, N),
    e0("MOVSB", 0xA4, N),
    e0("MOVSW", 0xA5, N),
    e0("CMPSB", 0xA6, N),
    e0("CMPSW", 0xA7, N),
    e0("STOSB", 0xAA, N),
    e0("STOSW", 0xAB, N),
    e0("LODSB", 0xAC, N),
    e0("LODSW", 0xAD, N),
    e0("SCASB", 0xAE, N),
    e0("SCASW", 0xAF, N),
    e0("XLAT", 0xD7, N),
    e0("XLATB", 0xD7, N),
    e0("INTO", 0xCE, N),
    e0("IRET", 0xCF, N),
    e0("HLT", 0xF4, N),
    e0("CMC", 0xF5, N),
    e0("CLC", 0xF8, N),
    e0("STC", 0xF9, N),
    e0("CLI", 0xFA, N),
    e0("STI", 0xFB, N),
    e0("CLD", 0xFC, N),
    e0("STD", 0xFD, N),
    e0("AAM", 0xD4, Format { size: OpSize::None, ext: Ext::Suffix(0x0A) }),
    e0("AAD", 0xD5, Format { size: OpSize::None, ext: Ext::Suffix(0x0A) }),
];

/// The 8086 table, in search priority order. `NOP` precedes `XCHG` so that
/// byte 0x90 decodes as `nop`.
static PAGES_8086: &[Page<X86>] = &[
    Page::new(None, &SIMPLE),
    Page::new(None, &MOV),
    Page::new(None, &ADD),
    Page::new(None, &OR),
    Page::new(None, &ADC),
    Page::new(None, &SBB),
    Page::new(None, &AND),
    Page::new(None, &SUB),
    Page::new(None, &XOR),
    Page::new(None, &CMP),
    Page::new(None, &TEST),
    Page::new(None, &INC_DEC),
    Page::new(None, &NOT),
    Page::new(None, &NEG),
    Page::new(None, &MUL),
    Page::new(None, &IMUL),
    Page::new(None, &DIV),
    Page::new(None, &IDIV),
    Page::new(None, &ROL),
    Page::new(None, &ROR),
    Page::new(None, &RCL),
    Page::new(None, &RCR),
    Page::new(None, &SHL),
    Page::new(None, &SHR),
    Page::new(None, &SAL),
    Page::new(None, &SAR),
    Page::new(None, &STACK),
    Page::new(None, &XCHG),
    Page::new(None, &LOAD_PTR),
    Page::new(None, &IO),
    Page::new(None, &CONTROL),
    Page::new(None, &JCC),
];

static ROL186: [Entry<X86>; 2] = shift186("ROL", 0);
static ROR186: [Entry<X86>; 2] = shift186("ROR", 1);
static RCL186: [Entry<X86>; 2] = shift186("RCL", 2);
static RCR186: [Entry<X86>; 2] = shift186("RCR", 3);
static SHL186: [Entry<X86>; 2] = shift186("SHL", 4);
static SHR186: [Entry<X86>; 2] = shift186("SHR", 5);
static SAL186: [Entry<X86>; 2] = shift186("SAL", 4);
static SAR186: [Entry<X86>; 2] = shift186("SAR", 7);

static I186: [Entry<X86>; 13] = [
    e1("PUSH", 0x6A, M::ImmS8, P::Imm, N),
    e1("PUSH", 0x68, M::Imm16, P::Imm, N),
    Entry::new(
        "IMUL",
        0x6B,
        Flags::three(s(M::Reg16, P::ModReg), s(M::Rm16, P::ModRm), s(M::ImmS8, P::Imm), N),
    ),
    Entry::new(
        "IMUL",
        0x69,
        Flags::three(s(M::Reg16, P::ModReg), s(M::Rm16, P::ModRm), s(M::Imm16, P::Imm), N),
    ),
    e2("ENTER", 0xC8, s(M::Imm16, P::Imm), s(M::Imm8, P::Imm2), N),
    e0("LEAVE", 0xC9, N),
    e0("PUSHA", 0x60, N),
    e0("POPA", 0x61, N),
    e2("BOUND", 0x62, s(M::Reg16, P::ModReg), s(M::Mem, P::ModRm), N),
    e0("INSB", 0x6C, N),
    e0("INSW", 0x6D, N),
    e0("OUTSB", 0x6E, N),
    e0("OUTSW", 0x6F, N),
];

static PAGES_186: &[Page<X86>] = &[
    Page::new(None, &I186),
    Page::new(None, &ROL186),
    Page::new(None, &ROR186),
    Page::new(None, &RCL186),
    Page::new(None, &RCR186),
    Page::new(None, &SHL186),
    Page::new(None, &SHR186),
    Page::new(None, &SAL186),
    Page::new(None, &SAR186),
];

// ─── Capability sets ────────────────────────────────────────────────────

/// Table lookups of one CPU variant.
pub(crate) trait Capability: Send + Sync + 'static {
    /// Name search over this variant's tables.
    fn search_name<F>(&self, name: &str, accept: F) -> Result<Found<X86>, Reject>
    where
        F: FnMut(&'static Entry<X86>) -> Result<(), Reject>;

    /// Opcode search over this variant's tables.
    fn search_opcode<F>(&self, opcode: u8, accept: F) -> Result<Found<X86>, ErrorKind>
    where
        F: FnMut(&'static Entry<X86>) -> bool;

    /// Whether any entry named `name` satisfies `pred`.
    fn has_form<F>(&self, name: &str, pred: F) -> bool
    where
        F: FnMut(&Entry<X86>) -> bool;
}

/// The 8086 instruction set.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Base;

impl Capability for Base {
    fn search_name<F>(&self, name: &str, accept: F) -> Result<Found<X86>, Reject>
    where
        F: FnMut(&'static Entry<X86>) -> Result<(), Reject>,
    {
        search::search_name(name, PAGES_8086, accept)
    }

    fn search_opcode<F>(&self, opcode: u8, accept: F) -> Result<Found<X86>, ErrorKind>
    where
        F: FnMut(&'static Entry<X86>) -> bool,
    {
        search::search_opcode(None, u16::from(opcode), PAGES_8086, accept)
    }

    fn has_form<F>(&self, name: &str, pred: F) -> bool
    where
        F: FnMut(&Entry<X86>) -> bool,
    {
        search::name_accepts(name, PAGES_8086, pred)
    }
}

/// The 80186 additions. Searches its own table first and hands anything it
/// does not handle to the 8086 base.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Ext186 {
    base: Base,
}

impl Ext186 {
    pub(crate) fn new() -> Self {
        Self { base: Base }
    }
}

impl Capability for Ext186 {
    fn search_name<F>(&self, name: &str, mut accept: F) -> Result<Found<X86>, Reject>
    where
        F: FnMut(&'static Entry<X86>) -> Result<(), Reject>,
    {
        match search::search_name(name, PAGES_186, &mut accept) {
            Ok(found) => Ok(found),
            Err(own) => self
                .base
                .search_name(name, &mut accept)
                .map_err(|base| own.prefer(base)),
        }
    }

    fn search_opcode<F>(&self, opcode: u8, mut accept: F) -> Result<Found<X86>, ErrorKind>
    where
        F: FnMut(&'static Entry<X86>) -> bool,
    {
        search::search_opcode(None, u16::from(opcode), PAGES_186, &mut accept)
            .or_else(|_| self.base.search_opcode(opcode, &mut accept))
    }

    fn has_form<F>(&self, name: &str, mut pred: F) -> bool
    where
        F: FnMut(&Entry<X86>) -> bool,
    {
        search::name_accepts(name, PAGES_186, &mut pred) || self.base.has_form(name, &mut pred)
    }
}

// ─── Registers ──────────────────────────────────────────────────────────

const REG8: [&str; 8] = ["AL", "CL", "DL", "BL", "AH", "CH", "DH", "BH"];
const REG16: [&str; 8] = ["AX", "CX", "DX", "BX", "SP", "BP", "SI", "DI"];
const SEG: [&str; 4] = ["ES", "CS", "SS", "DS"];

/// r/m text for mod 00..10, by r/m field.
const RM_BASE: [(&str, Option<&str>); 8] = [
    ("BX", Some("SI")),
    ("BX", Some("DI")),
    ("BP", Some("SI")),
    ("BP", Some("DI")),
    ("SI", None),
    ("DI", None),
    ("BP", None),
    ("BX", None),
];

fn lookup(tok: &Token<'_>, names: &[&str]) -> Option<u8> {
    if tok.kind != TokenKind::Ident {
        return None;
    }
    names
        .iter()
        .position(|n| n.eq_ignore_ascii_case(tok.text()))
        .map(|i| i as u8)
}

const PREFIXES: [(&str, u8); 6] = [
    ("LOCK", 0xF0),
    ("REP", 0xF3),
    ("REPE", 0xF3),
    ("REPZ", 0xF3),
    ("REPNE", 0xF2),
    ("REPNZ", 0xF2),
];

fn prefix_byte(name: &str) -> Option<u8> {
    PREFIXES
        .iter()
        .find(|(p, _)| p.eq_ignore_ascii_case(name))
        .map(|&(_, byte)| byte)
}

#[inline]
fn modrm(mod_: u8, reg: u8, rm: u8) -> u8 {
    (mod_ << 6) | ((reg & 7) << 3) | (rm & 7)
}

// ─── Operands ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemSize {
    Byte,
    Word,
    Dword,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disp {
    Zero,
    Byte,
    Word,
}

static DISP_WIDTHS: [Width<Disp>; 3] = [
    Width::null(Disp::Zero),
    Width::signed(Disp::Byte, 8),
    Width::new(Disp::Word, -32768, 0xFFFF),
];

/// One parsed operand.
#[derive(Debug, Clone, Copy)]
struct Operand {
    mode: Mode,
    /// Register number, or segment number.
    reg: u8,
    /// r/m field of a memory operand; `None` for a direct address.
    rm: Option<u8>,
    /// Segment override of a memory operand.
    seg: Option<u8>,
    /// Immediate, displacement, address, branch target or far offset.
    val: Value,
    /// Far pointer segment.
    hi: Value,
    /// `SHORT` / `NEAR`.
    forced: Option<Mode>,
    span: Span,
}

impl Operand {
    fn none() -> Self {
        Self {
            mode: Mode::None,
            reg: 0,
            rm: None,
            seg: None,
            val: Value::new(0),
            hi: Value::new(0),
            forced: None,
            span: Span::dummy(),
        }
    }

    fn is_memory(&self) -> bool {
        matches!(
            self.mode,
            M::Mem | M::Mem8 | M::Mem16 | M::Mem32 | M::Dir | M::Dir8 | M::Dir16
        )
    }
}

/// Classify an immediate by the narrowest table field that can hold it.
fn classify_imm(v: Value) -> Mode {
    if v.undefined {
        return M::Imm16;
    }
    match v.value {
        1 => M::Val1,
        3 => M::Val3,
        -128..=127 | 0xFF80..=0xFFFF => M::ImmS8,
        128..=255 => M::Imm8,
        _ => M::Imm16,
    }
}

fn memory_mode(size: Option<MemSize>, direct: bool) -> Mode {
    match (size, direct) {
        (Some(MemSize::Dword), _) => M::Mem32,
        (None, false) => M::Mem,
        (Some(MemSize::Byte), false) => M::Mem8,
        (Some(MemSize::Word), false) => M::Mem16,
        (None, true) => M::Dir,
        (Some(MemSize::Byte), true) => M::Dir8,
        (Some(MemSize::Word), true) => M::Dir16,
    }
}

fn parse_operand(
    cur: &mut Cursor<'_, '_>,
    ctx: &EvalContext<'_>,
    branch: bool,
) -> Result<Operand, AsmError> {
    let start = cur.span();
    let mut op = Operand::none();

    let mut size = None;
    let tok = cur.peek();
    if tok.is_word("BYTE") {
        size = Some(MemSize::Byte);
    } else if tok.is_word("WORD") {
        size = Some(MemSize::Word);
    } else if tok.is_word("DWORD") || tok.is_word("FAR") {
        size = Some(MemSize::Dword);
    } else if tok.is_word("SHORT") {
        op.forced = Some(M::Rel8);
    } else if tok.is_word("NEAR") {
        op.forced = Some(M::Rel16);
    }
    if size.is_some() || op.forced.is_some() {
        cur.advance();
        if cur.peek().is_word("PTR") {
            cur.advance();
        }
    }

    let tok = cur.peek();
    if let Some(seg) = lookup(tok, &SEG) {
        cur.advance();
        if cur.eat(TokenKind::Colon) {
            if cur.kind() != TokenKind::OpenBracket {
                return Err(AsmError::new(ErrorKind::IllegalSegment, tok.span));
            }
            op.seg = Some(seg);
            parse_memory(cur, ctx, &mut op, size)?;
        } else {
            op.reg = seg;
            op.mode = if seg == 1 { M::Cs } else { M::Seg };
        }
    } else if let Some(r) = lookup(tok, &REG8) {
        cur.advance();
        op.reg = r;
        op.mode = match r {
            0 => M::Al,
            1 => M::Cl,
            _ => M::Reg8,
        };
    } else if let Some(r) = lookup(tok, &REG16) {
        cur.advance();
        op.reg = r;
        op.mode = match r {
            0 => M::Ax,
            2 => M::Dx,
            _ => M::Reg16,
        };
    } else if tok.kind == TokenKind::OpenBracket {
        parse_memory(cur, ctx, &mut op, size)?;
    } else {
        let val = parse_expr(cur, ctx)?;
        if cur.eat(TokenKind::Colon) {
            op.hi = val;
            op.val = parse_expr(cur, ctx)?;
            op.mode = M::Far;
        } else if size.is_some() {
            return Err(AsmError::new(ErrorKind::OperandNotAllowed, start));
        } else {
            op.val = val;
            op.mode = if branch { M::Rel } else { classify_imm(val) };
        }
    }
    op.span = span_since(start, cur);
    Ok(op)
}

fn parse_memory(
    cur: &mut Cursor<'_, '_>,
    ctx: &EvalContext<'_>,
    op: &mut Operand,
    size: Option<MemSize>,
) -> Result<(), AsmError> {
    cur.expect(TokenKind::OpenBracket, ErrorKind::UnknownOperand)?;
    let mut base: Option<u8> = None;
    let mut index: Option<u8> = None;
    let mut disp = Value::new(0);
    let mut first = true;
    loop {
        let negate = if first {
            false
        } else if cur.eat(TokenKind::Plus) {
            false
        } else if cur.eat(TokenKind::Minus) {
            true
        } else {
            break;
        };
        first = false;
        let tok = cur.peek();
        if let Some(r) = lookup(tok, &REG16) {
            if negate {
                return Err(AsmError::new(ErrorKind::IllegalOperandMode, tok.span));
            }
            let slot = match r {
                3 | 5 => &mut base,
                6 | 7 => &mut index,
                _ => return Err(AsmError::new(ErrorKind::RegisterNotAllowed, tok.span)),
            };
            if slot.is_some() {
                return Err(AsmError::new(ErrorKind::IllegalOperandMode, tok.span));
            }
            *slot = Some(r);
            cur.advance();
        } else if lookup(tok, &REG8).is_some() || lookup(tok, &SEG).is_some() {
            return Err(AsmError::new(ErrorKind::RegisterNotAllowed, tok.span));
        } else {
            let v = parse_term(cur, ctx)?;
            disp = Value {
                value: if negate {
                    disp.value.wrapping_sub(v.value)
                } else {
                    disp.value.wrapping_add(v.value)
                },
                undefined: disp.undefined || v.undefined,
            };
        }
    }
    cur.expect(TokenKind::CloseBracket, ErrorKind::UnknownOperand)?;

    op.rm = match (base, index) {
        (Some(3), Some(6)) => Some(0),
        (Some(3), Some(7)) => Some(1),
        (Some(5), Some(6)) => Some(2),
        (Some(5), Some(7)) => Some(3),
        (None, Some(6)) => Some(4),
        (None, Some(7)) => Some(5),
        (Some(5), None) => Some(6),
        (Some(3), None) => Some(7),
        _ => None,
    };
    op.val = disp;
    op.mode = memory_mode(size, op.rm.is_none());
    Ok(())
}

// ─── Backend ────────────────────────────────────────────────────────────

/// The 8086 family backend over capability set `C`.
#[derive(Debug)]
pub(crate) struct I8086<C: Capability> {
    cap: C,
}

impl<C: Capability> I8086<C> {
    pub(crate) fn new(_config: &Config, cap: C) -> Self {
        Self { cap }
    }

    /// Branch widths available for `name`, smallest first.
    fn reaches(&self, name: &str) -> ([Reach<Mode>; 2], usize) {
        let mut out = [Reach::new(M::Rel8, 8, 2); 2];
        let mut n = 0;
        if self.cap.has_form(name, |e| e.slot(0).mode == M::Rel8) {
            out[n] = Reach::new(M::Rel8, 8, 2);
            n += 1;
        }
        if self.cap.has_form(name, |e| e.slot(0).mode == M::Rel16) {
            out[n] = Reach::new(M::Rel16, 16, 3);
            n += 1;
        }
        (out, n)
    }

    fn emit_modrm(&self, insn: &mut AsmInsn, reg: u8, op: &Operand) -> Result<(), AsmError> {
        if !op.is_memory() {
            return insn.emit_u8(modrm(3, reg, op.reg)).at(op.span);
        }
        let Some(rm) = op.rm else {
            check_range(op.val.value, 16).at(op.span)?;
            insn.emit_u8(modrm(0, reg, 6)).at(op.span)?;
            return insn.emit_u16(op.val.value as u16).at(op.span);
        };
        // [BP] with mod 00 means a direct address, so BP needs a displacement.
        let widths = if rm == 6 { &DISP_WIDTHS[1..] } else { &DISP_WIDTHS[..] };
        let disp = choose_width(op.val.value, op.val.undefined, widths, None).at(op.span)?;
        match disp {
            Disp::Zero => insn.emit_u8(modrm(0, reg, rm)),
            Disp::Byte => insn
                .emit_u8(modrm(1, reg, rm))
                .and_then(|()| insn.emit_u8(op.val.value as u8)),
            Disp::Word => insn
                .emit_u8(modrm(2, reg, rm))
                .and_then(|()| insn.emit_u16(op.val.value as u16)),
        }
        .at(op.span)
    }

    fn emit_trailing(&self, insn: &mut AsmInsn, slot: Slot<X86>, op: &Operand) -> Result<(), AsmError> {
        let v = op.val.value;
        match slot.pos {
            P::Imm | P::Imm2 => match slot.mode {
                M::Imm16 => {
                    check_range(v, 16).at(op.span)?;
                    insn.emit_u16(v as u16).at(op.span)
                }
                M::ImmS8 => insn.emit_u8(v as u8).at(op.span),
                _ => {
                    check_range(v, 8).at(op.span)?;
                    insn.emit_u8(v as u8).at(op.span)
                }
            },
            P::Moffs => {
                check_range(v, 16).at(op.span)?;
                insn.emit_u16(v as u16).at(op.span)
            }
            P::Rel => match slot.mode {
                M::Rel8 => insn.emit_u8(v as u8).at(op.span),
                _ => insn.emit_u16(v as u16).at(op.span),
            },
            P::Far => {
                check_range(v, 16).at(op.span)?;
                check_range(op.hi.value, 16).at(op.span)?;
                insn.emit_u16(v as u16).at(op.span)?;
                insn.emit_u16(op.hi.value as u16).at(op.span)
            }
            _ => Ok(()),
        }
    }

    /// Extra acceptance rules beyond per-slot mode widening.
    fn accept(parsed: &[Mode; 3], entry: &Entry<X86>) -> Result<(), Reject> {
        accept_slots(parsed, entry)?;
        if entry.size().size == OpSize::None {
            return Ok(());
        }
        let sized = (0..3).any(|i| matches!(entry.slot(i).mode, M::Reg8 | M::Reg16 | M::Al | M::Ax));
        if !sized {
            if let Some(i) = parsed.iter().position(|m| matches!(m, M::Mem | M::Dir)) {
                return Err(Reject::new(ErrorKind::IllegalSize, Some(i), 3));
            }
        }
        Ok(())
    }
}

impl<C: Capability> Backend for I8086<C> {
    fn encode(
        &self,
        insn: &mut AsmInsn,
        name: &Token<'_>,
        cur: &mut Cursor<'_, '_>,
        ctx: &EvalContext<'_>,
    ) -> Result<(), AsmError> {
        let mut name = name;
        while let Some(byte) = prefix_byte(name.text()) {
            insn.emit_u8(byte).at(name.span)?;
            if cur.at_end() {
                insn.advance(EncodeStage::OperandsEncoded);
                return Ok(());
            }
            let next = cur.advance();
            if next.kind != TokenKind::Ident || next.text().len() > 6 {
                return Err(AsmError::new(ErrorKind::UnknownInstruction, next.span));
            }
            name = next;
        }
        let mnemonic = name.text();

        let branch = self
            .cap
            .has_form(mnemonic, |e| matches!(e.slot(0).mode, M::Rel8 | M::Rel16));
        let mut ops = [Operand::none(); 3];
        let mut count = 0;
        if !cur.at_end() {
            loop {
                let op = parse_operand(cur, ctx, branch)?;
                insn.note_undefined(&op.val, op.span);
                insn.note_undefined(&op.hi, op.span);
                ops[count] = op;
                count += 1;
                if count == ops.len() || !cur.eat(TokenKind::Comma) {
                    break;
                }
            }
        }

        for op in ops.iter_mut().filter(|op| op.mode == M::Rel) {
            let (reaches, n) = self.reaches(mnemonic);
            let from = insn.address() as i64 + insn.len() as i64;
            let (target, forced) = if op.val.undefined {
                (from, op.forced.or(reaches[..n].last().map(|r| r.size)))
            } else {
                (op.val.value, op.forced)
            };
            let chosen = relax_branch(from, target, 1, &reaches[..n], forced).at(op.span)?;
            op.mode = chosen.size;
            op.val = Value {
                value: chosen.delta,
                undefined: op.val.undefined,
            };
            insn.advance(EncodeStage::AddrModeDetermined);
        }

        let parsed = [ops[0].mode, ops[1].mode, ops[2].mode];
        let found = self
            .cap
            .search_name(mnemonic, |e| Self::accept(&parsed, e))
            .map_err(|r| {
                let span = r.slot.map_or(name.span, |i| ops[i].span);
                AsmError::new(r.kind, span)
            })?;
        insn.advance(EncodeStage::NameResolved);
        let entry = found.entry;
        let fmt = entry.size();

        if let Some(op) = ops.iter().find(|op| op.seg.is_some()) {
            let seg = op.seg.unwrap_or(0);
            insn.emit_u8(0x26 | (seg << 3)).at(op.span)?;
        }
        let mut opcode = entry.opcode() as u8;
        for (i, op) in ops.iter().enumerate() {
            match entry.slot(i).pos {
                P::OReg => opcode |= op.reg & 7,
                P::OSeg => opcode |= (op.reg & 3) << 3,
                _ => {}
            }
        }
        insn.emit_u8(opcode).at(name.span)?;
        if let Ext::Suffix(byte) = fmt.ext {
            insn.emit_u8(byte).at(name.span)?;
        }
        if let Some(i) = (0..3).find(|&i| entry.slot(i).pos == P::ModRm) {
            let reg = match fmt.ext {
                Ext::Digit(d) => d,
                _ => (0..3)
                    .find(|&j| entry.slot(j).pos == P::ModReg)
                    .map_or(0, |j| ops[j].reg),
            };
            self.emit_modrm(insn, reg, &ops[i])?;
        }
        for (i, op) in ops.iter().enumerate() {
            self.emit_trailing(insn, entry.slot(i), op)?;
        }
        insn.advance(EncodeStage::OperandsEncoded);
        Ok(())
    }

    fn decode(&self, insn: &mut DisInsn<'_>, out: &mut TextOut) -> Result<(), ErrorKind> {
        let mut lock = false;
        let mut rep: Option<u8> = None;
        let mut seg: Option<u8> = None;
        let opcode = loop {
            let byte = insn.read_u8()?;
            match byte {
                0xF0 if !lock => lock = true,
                0xF2 | 0xF3 if rep.is_none() => rep = Some(byte),
                0x26 | 0x2E | 0x36 | 0x3E if seg.is_none() => seg = Some((byte >> 3) & 3),
                _ => break byte,
            }
        };
        insn.advance(DecodeStage::OpcodeRead);

        let mut state = Pending::default();
        let found = self
            .cap
            .search_opcode(opcode, |e| state.accept(e, opcode, insn))
            .map_err(|k| state.fail.unwrap_or(k))?;
        insn.advance(DecodeStage::EntryResolved);
        let entry = found.entry;
        let m = state.modrm.unwrap_or(0);

        let has_memory = (0..3).any(|i| {
            let slot = entry.slot(i);
            slot.pos == P::Moffs || (slot.pos == P::ModRm && m >> 6 != 3)
        });
        if seg.is_some() && !has_memory {
            return Err(ErrorKind::IllegalSegment);
        }

        if lock {
            out.name("lock").ch(' ');
        }
        match rep {
            Some(0xF2) => {
                out.name("repne").ch(' ');
            }
            Some(_) => {
                let repe = entry.name().starts_with("CMPS") || entry.name().starts_with("SCAS");
                out.name(if repe { "repe" } else { "rep" }).ch(' ');
            }
            None => {}
        }
        out.name(entry.name());

        let sized = (0..3).any(|i| {
            matches!(
                entry.slot(i).mode,
                M::Reg8 | M::Reg16 | M::Al | M::Ax | M::Seg | M::SegDst
            )
        });
        for i in 0..entry.flags().operand_count() {
            if i == 0 {
                out.gap();
            } else {
                out.sep();
            }
            let slot = entry.slot(i);
            self.decode_operand(insn, out, entry, slot, opcode, m, seg, sized)?;
        }
        insn.advance(DecodeStage::OperandsDecoded);
        Ok(())
    }
}

/// Lazily read bytes shared by the opcode-search predicate.
#[derive(Debug, Default)]
struct Pending {
    modrm: Option<u8>,
    fail: Option<ErrorKind>,
}

impl Pending {
    fn accept(&mut self, entry: &Entry<X86>, opcode: u8, insn: &mut DisInsn<'_>) -> bool {
        let fmt = entry.size();
        let needs_modrm = matches!(fmt.ext, Ext::Digit(_))
            || (0..3).any(|i| matches!(entry.slot(i).pos, P::ModReg | P::ModRm));
        if needs_modrm && self.modrm.is_none() {
            match insn.read_u8() {
                Ok(b) => self.modrm = Some(b),
                Err(k) => {
                    self.fail = Some(k);
                    return false;
                }
            }
        }
        let m = self.modrm.unwrap_or(0);
        let reg = (m >> 3) & 7;
        match fmt.ext {
            Ext::Digit(d) if reg != d => return false,
            Ext::Suffix(want) => match insn.read_u8() {
                Ok(b) if b == want => {}
                Ok(_) => return false,
                Err(k) => {
                    self.fail = Some(k);
                    return false;
                }
            },
            _ => {}
        }
        (0..3).all(|i| {
            let slot = entry.slot(i);
            match (slot.mode, slot.pos) {
                (M::Mem | M::Mem32, P::ModRm) => m >> 6 != 3,
                (M::Seg, P::ModReg) => reg < 4,
                (M::SegDst, P::ModReg) => reg < 4 && reg != 1,
                (M::SegDst, P::OSeg) => (opcode >> 3) & 3 != 1,
                _ => true,
            }
        })
    }
}

impl<C: Capability> I8086<C> {
    #[allow(clippy::too_many_arguments)]
    fn decode_operand(
        &self,
        insn: &mut DisInsn<'_>,
        out: &mut TextOut,
        entry: &Entry<X86>,
        slot: Slot<X86>,
        opcode: u8,
        m: u8,
        seg: Option<u8>,
        sized: bool,
    ) -> Result<(), ErrorKind> {
        let reg = (m >> 3) & 7;
        match (slot.mode, slot.pos) {
            (M::Al, _) => {
                out.name("al");
            }
            (M::Ax, _) => {
                out.name("ax");
            }
            (M::Cl, _) => {
                out.name("cl");
            }
            (M::Dx, _) => {
                out.name("dx");
            }
            (M::Val1, _) => {
                out.ch('1');
            }
            (M::Val3, _) => {
                out.ch('3');
            }
            (M::Reg8, P::OReg) => {
                out.name(REG8[usize::from(opcode & 7)]);
            }
            (M::Reg16, P::OReg) => {
                out.name(REG16[usize::from(opcode & 7)]);
            }
            (M::Seg | M::SegDst, P::OSeg) => {
                out.name(SEG[usize::from((opcode >> 3) & 3)]);
            }
            (M::Reg8, P::ModReg) => {
                out.name(REG8[usize::from(reg)]);
            }
            (M::Reg16, P::ModReg) => {
                out.name(REG16[usize::from(reg)]);
            }
            (M::Seg | M::SegDst, P::ModReg) => {
                out.name(SEG[usize::from(reg & 3)]);
            }
            (mode, P::ModRm) => {
                let rm = usize::from(m & 7);
                if m >> 6 == 3 {
                    let names = if mode == M::Rm8 { &REG8 } else { &REG16 };
                    out.name(names[rm]);
                    return Ok(());
                }
                if mode == M::Mem32 {
                    out.name("dword").ch(' ').name("ptr").ch(' ');
                } else if !sized {
                    match entry.size().size {
                        OpSize::Byte => {
                            out.name("byte").ch(' ').name("ptr").ch(' ');
                        }
                        OpSize::Word => {
                            out.name("word").ch(' ').name("ptr").ch(' ');
                        }
                        OpSize::None => {}
                    }
                }
                if let Some(s) = seg {
                    out.name(SEG[usize::from(s)]).ch(':');
                }
                out.ch('[');
                match m >> 6 {
                    0 if rm == 6 => {
                        out.hex(u64::from(insn.read_u16()?));
                    }
                    md => {
                        let (b, i) = RM_BASE[rm];
                        out.name(b);
                        if let Some(i) = i {
                            out.ch('+').name(i);
                        }
                        let disp = match md {
                            1 => sign_extend(u64::from(insn.read_u8()?), 8),
                            2 => sign_extend(u64::from(insn.read_u16()?), 16),
                            _ => 0,
                        };
                        if disp > 0 {
                            out.ch('+').hex(disp as u64);
                        } else if disp < 0 {
                            out.signed_hex(disp);
                        }
                    }
                }
                out.ch(']');
            }
            (M::Moffs8 | M::Moffs16, _) => {
                let addr = insn.read_u16()?;
                if let Some(s) = seg {
                    out.name(SEG[usize::from(s)]).ch(':');
                }
                out.ch('[').hex(u64::from(addr)).ch(']');
            }
            (M::ImmS8, _) => {
                let v = sign_extend(u64::from(insn.read_u8()?), 8) as u16;
                out.hex(u64::from(v));
            }
            (M::Imm16, _) => {
                out.hex(u64::from(insn.read_u16()?));
            }
            (M::Imm8 | M::Cnt8, _) => {
                out.hex(u64::from(insn.read_u8()?));
            }
            (M::Rel8 | M::Rel16, _) => {
                let delta = if slot.mode == M::Rel8 {
                    sign_extend(u64::from(insn.read_u8()?), 8)
                } else {
                    sign_extend(u64::from(insn.read_u16()?), 16)
                };
                let target = insn.address() as i64 + insn.len() as i64 + delta;
                if slot.mode == M::Rel16 && self.cap.has_form(entry.name(), |e| e.slot(0).mode == M::Rel8) {
                    // A short form would have reached: keep the long one on re-encode.
                    let from = insn.address() as i64 + insn.len() as i64 - 3;
                    if relax_branch(from, target, 1, &[Reach::new(M::Rel8, 8, 2)], None).is_ok() {
                        out.name("near").ch(' ');
                    }
                }
                out.signed_hex(target);
            }
            (M::Far, _) => {
                let off = insn.read_u16()?;
                let sel = insn.read_u16()?;
                out.hex(u64::from(sel)).ch(':').hex(u64::from(off));
            }
            _ => return Err(ErrorKind::UnknownInstruction),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ArrayMemory;
    use crate::config::Cpu;
    use crate::expr::{NoSymbols, Symbols};
    use crate::{Assembler, Disassembler};
    use alloc::string::String;
    use alloc::vec::Vec;

    fn asm(cpu: Cpu, address: u64, line: &str) -> Result<Vec<u8>, ErrorKind> {
        let out = Assembler::new(Config::new(cpu))
            .unwrap()
            .encode(address, line, &NoSymbols);
        match out.error {
            Some(e) if !e.kind.is_warning() => Err(e.kind),
            _ => Ok(out.bytes),
        }
    }

    fn enc(line: &str) -> Vec<u8> {
        asm(Cpu::I8086, 0, line).unwrap()
    }

    fn err(line: &str) -> ErrorKind {
        asm(Cpu::I8086, 0, line).unwrap_err()
    }

    fn dis_at(cpu: Cpu, address: u64, bytes: &[u8]) -> (String, usize) {
        let d = Disassembler::new(Config::new(cpu)).unwrap();
        let mut mem = ArrayMemory::new(address, bytes);
        let out = d.decode(address, &mut mem);
        (out.text, out.bytes.len())
    }

    fn dis(bytes: &[u8]) -> String {
        dis_at(Cpu::I8086, 0, bytes).0
    }

    // ─── Encode ────────────────────────────────────────────

    #[test]
    fn mov_register_forms() {
        assert_eq!(enc("mov ax, bx"), [0x89, 0xD8]);
        assert_eq!(enc("mov al, cl"), [0x88, 0xC8]);
        assert_eq!(enc("mov al, 5"), [0xB0, 0x05]);
        assert_eq!(enc("mov bx, 1234h"), [0xBB, 0x34, 0x12]);
        assert_eq!(enc("mov ds, ax"), [0x8E, 0xD8]);
        assert_eq!(enc("mov ax, cs"), [0x8C, 0xC8]);
    }

    #[test]
    fn mov_memory_forms() {
        assert_eq!(enc("mov [bx+si+4], ax"), [0x89, 0x40, 0x04]);
        assert_eq!(enc("mov ax, [bp]"), [0x8B, 0x46, 0x00]);
        assert_eq!(enc("mov ax, [bx]"), [0x8B, 0x07]);
        assert_eq!(enc("mov cx, [di-200]"), [0x8B, 0x8D, 0x38, 0xFF]);
        assert_eq!(enc("mov word ptr [bx], 1234h"), [0xC7, 0x07, 0x34, 0x12]);
        assert_eq!(enc("mov byte ptr [si], 7"), [0xC6, 0x04, 0x07]);
        assert_eq!(enc("mov bx, [1234h]"), [0x8B, 0x1E, 0x34, 0x12]);
    }

    #[test]
    fn accumulator_moffs_preferred() {
        assert_eq!(enc("mov al, [1234h]"), [0xA0, 0x34, 0x12]);
        assert_eq!(enc("mov [1234h], ax"), [0xA3, 0x34, 0x12]);
    }

    #[test]
    fn segment_override_prefix() {
        assert_eq!(enc("mov ax, es:[bx]"), [0x26, 0x8B, 0x07]);
        assert_eq!(enc("mov al, cs:[10h]"), [0x2E, 0xA0, 0x10, 0x00]);
        assert_eq!(err("mov ax, es:5"), ErrorKind::IllegalSegment);
    }

    #[test]
    fn unsized_memory_needs_size() {
        assert_eq!(err("mov [bx], 5"), ErrorKind::IllegalSize);
        assert_eq!(err("inc [bx]"), ErrorKind::IllegalSize);
        assert_eq!(enc("inc byte ptr [bx]"), [0xFE, 0x07]);
        // A register operand fixes the size.
        assert_eq!(enc("add [bx], al"), [0x00, 0x07]);
        // Word-only instructions need no size.
        assert_eq!(enc("push [bx]"), [0xFF, 0x37]);
    }

    #[test]
    fn alu_immediate_relaxation() {
        assert_eq!(enc("add ax, 5"), [0x83, 0xC0, 0x05]);
        assert_eq!(enc("add al, 5"), [0x04, 0x05]);
        assert_eq!(enc("add ax, 1000"), [0x05, 0xE8, 0x03]);
        assert_eq!(enc("add bx, 0FFFFh"), [0x83, 0xC3, 0xFF]);
        assert_eq!(enc("cmp word ptr [di+200h], -1"), [0x83, 0xBD, 0x00, 0x02, 0xFF]);
        assert_eq!(enc("sub cl, 200"), [0x80, 0xE9, 0xC8]);
        assert_eq!(err("add bl, 300"), ErrorKind::OverflowRange);
    }

    #[test]
    fn short_jump_to_self() {
        assert_eq!(asm(Cpu::I8086, 0x100, "jmp $").unwrap(), [0xEB, 0xFE]);
    }

    #[test]
    fn jump_relaxation_boundary() {
        assert_eq!(enc("jmp 100"), [0xEB, 0x62]);
        assert_eq!(enc("jmp 200"), [0xE9, 0xC5, 0x00]);
        assert_eq!(enc("jmp short 100"), [0xEB, 0x62]);
        assert_eq!(enc("jmp near 100"), [0xE9, 0x61, 0x00]);
        assert_eq!(err("jmp short 200"), ErrorKind::OperandTooFar);
    }

    #[test]
    fn conditional_jumps_are_short_only() {
        assert_eq!(enc("jz 10"), [0x74, 0x08]);
        assert_eq!(enc("je 10"), [0x74, 0x08]);
        assert_eq!(err("jnz 200"), ErrorKind::OperandTooFar);
        assert_eq!(asm(Cpu::I8086, 0x10, "loop 0").unwrap(), [0xE2, 0xEE]);
    }

    #[test]
    fn calls_and_far_pointers() {
        assert_eq!(asm(Cpu::I8086, 0x1000, "call 1234h").unwrap(), [0xE8, 0x31, 0x02]);
        assert_eq!(enc("jmp 1234h:5678h"), [0xEA, 0x78, 0x56, 0x34, 0x12]);
        assert_eq!(enc("call dword ptr [bx]"), [0xFF, 0x1F]);
        assert_eq!(enc("jmp ax"), [0xFF, 0xE0]);
    }

    #[test]
    fn forward_reference_takes_long_form() {
        let out = Assembler::new(Config::new(Cpu::I8086))
            .unwrap()
            .encode(0, "jmp later", &NoSymbols);
        assert_eq!(out.bytes.len(), 3);
        assert_eq!(out.bytes[0], 0xE9);
        assert_eq!(out.error.map(|e| e.kind), Some(ErrorKind::UndefinedSymbol));
    }

    #[test]
    fn stack_and_segment_registers() {
        assert_eq!(enc("push ax"), [0x50]);
        assert_eq!(enc("push cs"), [0x0E]);
        assert_eq!(enc("pop es"), [0x07]);
        assert_eq!(err("pop cs"), ErrorKind::RegisterNotAllowed);
        assert_eq!(err("mov cs, ax"), ErrorKind::RegisterNotAllowed);
        assert_eq!(enc("mov ds, ax"), [0x8E, 0xD8]);
    }

    #[test]
    fn cs_destination_is_refused_both_ways() {
        assert_eq!(dis_at(Cpu::I8086, 0, &[0x0F]).0, "unknown");
        assert_eq!(dis_at(Cpu::I8086, 0, &[0x8E, 0xC8]).0, "unknown");
        let out = Assembler::new(Config::new(Cpu::I8086))
            .unwrap()
            .encode(0, "pop cs", &NoSymbols);
        assert!(out.bytes.is_empty());
        let e = out.error.unwrap();
        assert_eq!(e.kind, ErrorKind::RegisterNotAllowed);
        assert_eq!(e.span.col, 5);
    }

    #[test]
    fn misc_instructions() {
        assert_eq!(enc("int 3"), [0xCC]);
        assert_eq!(enc("int 21h"), [0xCD, 0x21]);
        assert_eq!(enc("ret 4"), [0xC2, 0x04, 0x00]);
        assert_eq!(enc("xchg ax, bx"), [0x93]);
        assert_eq!(enc("xchg bx, ax"), [0x93]);
        assert_eq!(enc("lea si, [bx+4]"), [0x8D, 0x77, 0x04]);
        assert_eq!(enc("in al, dx"), [0xEC]);
        assert_eq!(enc("out 80h, al"), [0xE6, 0x80]);
        assert_eq!(enc("aam"), [0xD4, 0x0A]);
        assert_eq!(enc("shl ax, 1"), [0xD1, 0xE0]);
        assert_eq!(enc("shl byte ptr [bx], cl"), [0xD2, 0x27]);
        assert_eq!(enc("test al, 80h"), [0xA8, 0x80]);
        assert_eq!(enc("not word ptr [bx]"), [0xF7, 0x17]);
    }

    #[test]
    fn prefixes() {
        assert_eq!(enc("rep movsb"), [0xF3, 0xA4]);
        assert_eq!(enc("repne scasb"), [0xF2, 0xAE]);
        assert_eq!(enc("lock xchg [bx], ax"), [0xF0, 0x87, 0x07]);
        assert_eq!(enc("rep"), [0xF3]);
    }

    #[test]
    fn operand_errors() {
        assert_eq!(err("mov"), ErrorKind::MissingOperand);
        assert_eq!(err("mov ax,"), ErrorKind::MissingOperand);
        assert_eq!(err("mov ax, bx, cx"), ErrorKind::OperandNotAllowed);
        assert_eq!(err("mov ax, [ax]"), ErrorKind::RegisterNotAllowed);
        assert_eq!(err("mov ax, [bx+bp]"), ErrorKind::IllegalOperandMode);
        assert_eq!(err("mov ax, bl"), ErrorKind::OperandNotAllowed);
        assert_eq!(err("frob ax"), ErrorKind::UnknownInstruction);
    }

    #[test]
    fn error_span_points_at_operand() {
        let out = Assembler::new(Config::new(Cpu::I8086))
            .unwrap()
            .encode(0, "mov cs, ax", &NoSymbols);
        let e = out.error.unwrap();
        assert_eq!(e.span.col, 5);
        assert_eq!(e.span.len, 2);
    }

    #[test]
    fn symbols_in_memory_operands() {
        let mut syms = Symbols::new();
        syms.define("table", 0x40);
        let out = Assembler::new(Config::new(Cpu::I8086))
            .unwrap()
            .encode(0, "mov al, [bx+table]", &syms);
        assert_eq!(out.bytes, [0x8A, 0x47, 0x40]);
    }

    #[test]
    fn i80186_additions() {
        let a = |line| asm(Cpu::I80186, 0, line).unwrap();
        assert_eq!(a("push 5"), [0x6A, 0x05]);
        assert_eq!(a("push 1234h"), [0x68, 0x34, 0x12]);
        assert_eq!(a("push ax"), [0x50]);
        assert_eq!(a("imul ax, bx, 10"), [0x6B, 0xC3, 0x0A]);
        assert_eq!(a("shl ax, 4"), [0xC1, 0xE0, 0x04]);
        assert_eq!(a("shl ax, 1"), [0xD1, 0xE0]);
        assert_eq!(a("enter 16, 0"), [0xC8, 0x10, 0x00, 0x00]);
        assert_eq!(a("pusha"), [0x60]);
        assert_eq!(a("bound ax, [bx]"), [0x62, 0x07]);
        assert_eq!(a("rep insb"), [0xF3, 0x6C]);
    }

    #[test]
    fn i80186_forms_rejected_on_8086() {
        assert_eq!(err("shl ax, 4"), ErrorKind::OperandNotAllowed);
        assert_eq!(err("pusha"), ErrorKind::UnknownInstruction);
        assert_eq!(err("push 5"), ErrorKind::OperandNotAllowed);
    }

    // ─── Decode ────────────────────────────────────────────

    #[test]
    fn decode_basic() {
        assert_eq!(dis(&[0x89, 0xD8]), "mov ax, bx");
        assert_eq!(dis(&[0x8B, 0x46, 0xFC]), "mov ax, [bp-0x4]");
        assert_eq!(dis(&[0x89, 0x40, 0x04]), "mov [bx+si+0x4], ax");
        assert_eq!(dis(&[0xC6, 0x07, 0x05]), "mov byte ptr [bx], 0x5");
        assert_eq!(dis(&[0xA0, 0x34, 0x12]), "mov al, [0x1234]");
        assert_eq!(dis(&[0x83, 0xC0, 0xFF]), "add ax, 0xffff");
        assert_eq!(dis(&[0xCD, 0x21]), "int 0x21");
        assert_eq!(dis(&[0xD1, 0xE0]), "shl ax, 1");
        assert_eq!(dis(&[0x90]), "nop");
        assert_eq!(dis(&[0x93]), "xchg ax, bx");
        assert_eq!(dis(&[0xD4, 0x0A]), "aam");
        assert_eq!(dis(&[0xEA, 0x78, 0x56, 0x34, 0x12]), "jmp 0x1234:0x5678");
        assert_eq!(dis(&[0xFF, 0x1F]), "call dword ptr [bx]");
    }

    #[test]
    fn decode_prefixes() {
        assert_eq!(dis(&[0xF3, 0xA4]), "rep movsb");
        assert_eq!(dis(&[0xF3, 0xA6]), "repe cmpsb");
        assert_eq!(dis(&[0xF2, 0xAE]), "repne scasb");
        assert_eq!(dis(&[0x26, 0x8B, 0x07]), "mov ax, es:[bx]");
        assert_eq!(dis(&[0x26, 0x90]), "unknown");
    }

    #[test]
    fn decode_branches() {
        assert_eq!(dis_at(Cpu::I8086, 0x100, &[0xEB, 0xFE]).0, "jmp 0x100");
        assert_eq!(dis(&[0xE9, 0xC5, 0x00]), "jmp 0xc8");
        assert_eq!(dis(&[0xE9, 0x00, 0x00]), "jmp near 0x3");
        assert_eq!(dis(&[0x74, 0x08]), "je 0xa");
        assert_eq!(dis_at(Cpu::I8086, 0x1000, &[0xE8, 0x31, 0x02]).0, "call 0x1234");
    }

    #[test]
    fn decode_rejects_invalid_forms() {
        // POP CS does not exist.
        assert_eq!(dis(&[0x0F]), "unknown");
        // LEA needs a memory operand.
        assert_eq!(dis(&[0x8D, 0xC0]), "unknown");
        // Truncated.
        assert_eq!(dis_at(Cpu::I8086, 0, &[0xB8, 0x01]), (String::from("unknown"), 2));
        // 80186 opcode on an 8086.
        assert_eq!(dis(&[0xC1, 0xE0, 0x04]), "unknown");
        assert_eq!(dis_at(Cpu::I80186, 0, &[0xC1, 0xE0, 0x04]).0, "shl ax, 0x4");
    }

    #[test]
    fn round_trip_text() {
        for line in [
            "mov ax, bx",
            "mov word ptr [bx+di+0x10], 0x1234",
            "add byte ptr [bp-0x2], 0x7f",
            "xor cx, cx",
            "les di, [0x200]",
            "out dx, ax",
            "jmp near 0x3",
            "push es",
            "mov [0x1234], al",
        ] {
            let bytes = enc(line);
            assert_eq!(dis(&bytes), line, "{line}");
        }
    }
}
