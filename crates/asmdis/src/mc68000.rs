//! Motorola 68000 backend.
//!
//! Instructions are one 16-bit opcode word followed by extension words.
//! Operand fields inside the opcode are located by [`Pos`]; extension words
//! are written in operand order, except that a `MOVEM` register mask always
//! comes first.
//!
//! Effective-address categories (data, memory, control, alterable) are table
//! modes; a parsed operand satisfies a category through
//! [`Isa::accept_mode`], which the decoder reuses to validate the EA fields
//! it extracts from a candidate opcode.

use crate::assembler::Backend;
use crate::codec::{check_range, Field};
use crate::config::Config;
use crate::entry::{Entry, Flags, Isa, Page, Slot};
use crate::error::{AsmError, ErrorKind, Span};
use crate::expr::{parse_expr, span_since, EvalContext, Value};
use crate::format::TextOut;
use crate::insn::{AsmInsn, DecodeStage, DisInsn, EncodeStage, ResultExt};
use crate::lexer::{Cursor, Token, TokenKind};
use crate::resolver::{
    choose_width, fits_signed, relax_branch_in, sign_extend, wrap_signed, Branch, Reach, Width,
};
use crate::search::{self, accept_slots, Reject};

// ─── Vocabulary ─────────────────────────────────────────────────────────

/// Operand shapes. Parsed operands use the concrete addressing modes; the
/// categories after `Rel16` appear only in tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    None,
    DReg,
    AReg,
    /// `(An)`
    Ind,
    /// `(An)+`
    PostInc,
    /// `-(An)`
    PreDec,
    /// `d16(An)`
    Disp,
    /// `d8(An,Xn.s)`
    Index,
    /// Absolute address whose width is not chosen yet.
    Abs,
    AbsW,
    AbsL,
    /// `target(PC)`
    PcDisp,
    /// `target(PC,Xn.s)`
    PcIndex,
    Imm,
    Ccr,
    Sr,
    /// `d0-d3/a0`
    RegList,
    /// Branch target, 8 or 16 bits.
    Rel,
    /// `DBcc` target.
    Rel16,
    // Table-only categories.
    Data,
    DataAlt,
    MemAlt,
    Alt,
    Any,
    Ctrl,
    MovemDst,
    MovemSrc,
    /// `#1..8`, or anything when the value is not known yet.
    Quick3,
    /// `#1..8` with a known value; alias entries only.
    AutoQuick,
    /// `MOVEQ` data.
    Quick8,
    /// `TRAP` vector.
    Vector,
}

/// Where an operand's bits live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pos {
    None,
    /// Opcode bits 0-5, mode then register.
    Ea,
    /// Opcode bits 6-11, register then mode (`MOVE` destination).
    EaDst,
    /// Opcode bits 0-2.
    Reg,
    /// Opcode bits 9-11.
    RegHi,
    /// Opcode bits 9-11, 8 written as 0.
    Quick,
    /// Opcode bits 0-7.
    Data8,
    /// Opcode bits 0-3.
    Vector,
    /// Opcode bits 0-7, or an extension word when those are zero.
    Branch,
    /// Immediate extension word(s) sized by the operation.
    Ext,
    /// Static bit number extension word.
    BitNum,
    /// `MOVEM` register mask word.
    Mask,
    /// 16-bit displacement word (`DBcc`).
    Disp,
}

/// How an entry encodes its operation size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Sz {
    Unsized,
    /// Bits 7-6: `00` byte, `01` word, `10` long.
    Bwl,
    /// Bits 13-12: `01` byte, `11` word, `10` long.
    Move,
    /// Bit 6 selects long.
    Wl6,
    /// Bit 8 selects long.
    Wl8,
    Byte,
    Word,
    Long,
    /// Long on a data register, byte in memory.
    BitOp,
    /// `.S`/`.W` from the displacement.
    Branch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct M68k;

impl Isa for M68k {
    type Mode = Mode;
    type Pos = Pos;
    type Size = Sz;

    const NONE_MODE: Mode = Mode::None;
    const NONE_POS: Pos = Pos::None;

    fn operand_mask(_mode: Mode, pos: Pos, _size: Sz) -> u16 {
        match pos {
            Pos::Ea => 0x003F,
            Pos::EaDst => 0x0FC0,
            Pos::Reg => 0x0007,
            Pos::RegHi | Pos::Quick => 0x0E00,
            Pos::Data8 | Pos::Branch => 0x00FF,
            Pos::Vector => 0x000F,
            Pos::None | Pos::Ext | Pos::BitNum | Pos::Mask | Pos::Disp => 0,
        }
    }

    fn size_mask(size: Sz) -> u16 {
        match size {
            Sz::Bwl => 0x00C0,
            Sz::Move => 0x3000,
            Sz::Wl6 => 0x0040,
            Sz::Wl8 => 0x0100,
            _ => 0,
        }
    }

    fn accept_mode(parsed: Mode, table: Mode) -> bool {
        use Mode::*;
        let abs = matches!(parsed, Abs | AbsW | AbsL);
        let mem_alt = abs || matches!(parsed, Ind | PostInc | PreDec | Disp | Index);
        let pc = matches!(parsed, PcDisp | PcIndex);
        match table {
            Data => mem_alt || pc || matches!(parsed, DReg | Imm),
            DataAlt => mem_alt || parsed == DReg,
            MemAlt => mem_alt,
            Alt => mem_alt || matches!(parsed, DReg | AReg),
            Any => mem_alt || pc || matches!(parsed, DReg | AReg | Imm),
            Ctrl => pc || abs || matches!(parsed, Ind | Disp | Index),
            MovemDst => abs || matches!(parsed, Ind | PreDec | Disp | Index),
            MovemSrc => pc || abs || matches!(parsed, Ind | PostInc | Disp | Index),
            Quick3 | AutoQuick | Quick8 | Vector => parsed == Imm,
            RegList => matches!(parsed, RegList | DReg | AReg | Imm),
            Rel | Rel16 => parsed == Abs,
            _ => parsed == table,
        }
    }
}

/// Operation size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpSize {
    Byte,
    Word,
    Long,
}

/// Size suffix written after the mnemonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SizeSuffix {
    Absent,
    B,
    W,
    L,
    S,
}

impl SizeSuffix {
    fn parse(tok: &Token<'_>) -> Option<Self> {
        let text = tok.text();
        [(".B", Self::B), (".W", Self::W), (".L", Self::L), (".S", Self::S)]
            .into_iter()
            .find(|(s, _)| s.eq_ignore_ascii_case(text))
            .map(|(_, v)| v)
    }
}

/// Branch displacement widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Br {
    Short,
    Word,
}

// ─── Tables ─────────────────────────────────────────────────────────────

use Mode as M;
use Pos as P;

/// Only 24 address lines are decoded; the program counter wraps there.
const ADDRESS_BITS: u32 = 24;

const fn s(mode: Mode, pos: Pos) -> Slot<M68k> {
    Slot::new(mode, pos)
}

const fn e0(name: &'static str, op: u16, size: Sz) -> Entry<M68k> {
    Entry::new(name, op, Flags::none(size))
}

const fn e1(name: &'static str, op: u16, a: Slot<M68k>, size: Sz) -> Entry<M68k> {
    Entry::new(name, op, Flags::one(a.mode, a.pos, size))
}

const fn e2(name: &'static str, op: u16, a: Slot<M68k>, b: Slot<M68k>, size: Sz) -> Entry<M68k> {
    Entry::new(name, op, Flags::two(a, b, size))
}

const fn bcc(name: &'static str, op: u16) -> Entry<M68k> {
    e1(name, op, s(M::Rel, P::Branch), Sz::Branch)
}

const fn dbcc(name: &'static str, op: u16) -> Entry<M68k> {
    e2(name, op, s(M::DReg, P::Reg), s(M::Rel16, P::Disp), Sz::Word)
}

const fn scc(name: &'static str, op: u16) -> Entry<M68k> {
    e1(name, op, s(M::DataAlt, P::Ea), Sz::Byte)
}

/// `#imm,<ea>` immediate-group form.
const fn imm(name: &'static str, op: u16) -> Entry<M68k> {
    e2(name, op, s(M::Imm, P::Ext), s(M::DataAlt, P::Ea), Sz::Bwl)
}

/// `#imm,CCR` and `#imm,SR`.
const fn to_ccr(name: &'static str, op: u16) -> Entry<M68k> {
    e2(name, op, s(M::Imm, P::Ext), s(M::Ccr, P::None), Sz::Byte)
}

const fn to_sr(name: &'static str, op: u16) -> Entry<M68k> {
    e2(name, op, s(M::Imm, P::Ext), s(M::Sr, P::None), Sz::Word)
}

/// `<ea>,Dn` where the source category is `src`.
const fn to_dn(name: &'static str, op: u16, src: Mode, size: Sz) -> Entry<M68k> {
    e2(name, op, s(src, P::Ea), s(M::DReg, P::RegHi), size)
}

/// `Dn,<ea>` with a memory-alterable destination.
const fn from_dn(name: &'static str, op: u16, dst: Mode) -> Entry<M68k> {
    e2(name, op, s(M::DReg, P::RegHi), s(dst, P::Ea), Sz::Bwl)
}

/// `<ea>,An` address arithmetic.
const fn to_an(name: &'static str, op: u16) -> Entry<M68k> {
    e2(name, op, s(M::Any, P::Ea), s(M::AReg, P::RegHi), Sz::Wl8)
}

const fn unary(name: &'static str, op: u16) -> Entry<M68k> {
    e1(name, op, s(M::DataAlt, P::Ea), Sz::Bwl)
}

/// Register shifts by count and by register, then the memory form.
const fn shift(name: &'static str, reg: u16, mem: u16) -> [Entry<M68k>; 3] {
    [
        e2(name, reg, s(M::Quick3, P::Quick), s(M::DReg, P::Reg), Sz::Bwl),
        e2(name, reg | 0x20, s(M::DReg, P::RegHi), s(M::DReg, P::Reg), Sz::Bwl),
        e1(name, mem, s(M::MemAlt, P::Ea), Sz::Word),
    ]
}

/// Dynamic and static bit operations.
const fn bit(name: &'static str, dynamic: u16, fixed: u16, dst: Mode) -> [Entry<M68k>; 2] {
    [
        e2(name, dynamic, s(M::DReg, P::RegHi), s(dst, P::Ea), Sz::BitOp),
        e2(name, fixed, s(M::Imm, P::BitNum), s(dst, P::Ea), Sz::BitOp),
    ]
}

static INHERENT: [Entry<M68k>; 7] = [
    e0("ILLEGAL", 0x4AFC, Sz::Unsized),
    e0("RESET", 0x4E70, Sz::Unsized),
    e0("NOP", 0x4E71, Sz::Unsized),
    e0("RTE", 0x4E73, Sz::Unsized),
    e0("RTS", 0x4E75, Sz::Unsized),
    e0("TRAPV", 0x4E76, Sz::Unsized),
    e0("RTR", 0x4E77, Sz::Unsized),
];

static IMMEDIATE: [Entry<M68k>; 12] = [
    to_ccr("ORI", 0x003C),
    to_sr("ORI", 0x007C),
    to_ccr("ANDI", 0x023C),
    to_sr("ANDI", 0x027C),
    to_ccr("EORI", 0x0A3C),
    to_sr("EORI", 0x0A7C),
    imm("ORI", 0x0000),
    imm("ANDI", 0x0200),
    imm("SUBI", 0x0400),
    imm("ADDI", 0x0600),
    imm("EORI", 0x0A00),
    imm("CMPI", 0x0C00),
];

static BTST: [Entry<M68k>; 2] = bit("BTST", 0x0100, 0x0800, M::Data);
static BCHG: [Entry<M68k>; 2] = bit("BCHG", 0x0140, 0x0840, M::DataAlt);
static BCLR: [Entry<M68k>; 2] = bit("BCLR", 0x0180, 0x0880, M::DataAlt);
static BSET: [Entry<M68k>; 2] = bit("BSET", 0x01C0, 0x08C0, M::DataAlt);

static MOVE: [Entry<M68k>; 6] = [
    e2("MOVEA", 0x0040, s(M::Any, P::Ea), s(M::AReg, P::RegHi), Sz::Move),
    e2("MOVE", 0x40C0, s(M::Sr, P::None), s(M::DataAlt, P::Ea), Sz::Word),
    e2("MOVE", 0x44C0, s(M::Data, P::Ea), s(M::Ccr, P::None), Sz::Word),
    e2("MOVE", 0x46C0, s(M::Data, P::Ea), s(M::Sr, P::None), Sz::Word),
    e2("MOVE", 0x0000, s(M::Any, P::Ea), s(M::DataAlt, P::EaDst), Sz::Move),
    e2("MOVEQ", 0x7000, s(M::Quick8, P::Data8), s(M::DReg, P::RegHi), Sz::Long),
];

static MISC: [Entry<M68k>; 17] = [
    unary("NEGX", 0x4000),
    unary("CLR", 0x4200),
    unary("NEG", 0x4400),
    unary("NOT", 0x4600),
    unary("TST", 0x4A00),
    to_dn("CHK", 0x4180, M::Data, Sz::Word),
    e2("LEA", 0x41C0, s(M::Ctrl, P::Ea), s(M::AReg, P::RegHi), Sz::Long),
    e1("EXT", 0x4880, s(M::DReg, P::Reg), Sz::Wl6),
    e1("SWAP", 0x4840, s(M::DReg, P::Reg), Sz::Word),
    e1("PEA", 0x4840, s(M::Ctrl, P::Ea), Sz::Long),
    e2("MOVEM", 0x4880, s(M::RegList, P::Mask), s(M::MovemDst, P::Ea), Sz::Wl6),
    e2("MOVEM", 0x4C80, s(M::MovemSrc, P::Ea), s(M::RegList, P::Mask), Sz::Wl6),
    e1("TRAP", 0x4E40, s(M::Vector, P::Vector), Sz::Unsized),
    e2("LINK", 0x4E50, s(M::AReg, P::Reg), s(M::Imm, P::Ext), Sz::Word),
    e1("UNLK", 0x4E58, s(M::AReg, P::Reg), Sz::Unsized),
    e1("JSR", 0x4E80, s(M::Ctrl, P::Ea), Sz::Unsized),
    e1("JMP", 0x4EC0, s(M::Ctrl, P::Ea), Sz::Unsized),
];

static QUICK: [Entry<M68k>; 2] = [
    e2("ADDQ", 0x5000, s(M::Quick3, P::Quick), s(M::Alt, P::Ea), Sz::Bwl),
    e2("SUBQ", 0x5100, s(M::Quick3, P::Quick), s(M::Alt, P::Ea), Sz::Bwl),
];

static DBCC: [Entry<M68k>; 19] = [
    dbcc("DBT", 0x50C8),
    dbcc("DBRA", 0x51C8),
    dbcc("DBF", 0x51C8),
    dbcc("DBHI", 0x52C8),
    dbcc("DBLS", 0x53C8),
    dbcc("DBCC", 0x54C8),
    dbcc("DBCS", 0x55C8),
    dbcc("DBNE", 0x56C8),
    dbcc("DBEQ", 0x57C8),
    dbcc("DBVC", 0x58C8),
    dbcc("DBVS", 0x59C8),
    dbcc("DBPL", 0x5AC8),
    dbcc("DBMI", 0x5BC8),
    dbcc("DBGE", 0x5CC8),
    dbcc("DBLT", 0x5DC8),
    dbcc("DBGT", 0x5EC8),
    dbcc("DBLE", 0x5FC8),
    dbcc("DBHS", 0x54C8),
    dbcc("DBLO", 0x55C8),
];

static SCC: [Entry<M68k>; 18] = [
    scc("ST", 0x50C0),
    scc("SF", 0x51C0),
    scc("SHI", 0x52C0),
    scc("SLS", 0x53C0),
    scc("SCC", 0x54C0),
    scc("SCS", 0x55C0),
    scc("SNE", 0x56C0),
    scc("SEQ", 0x57C0),
    scc("SVC", 0x58C0),
    scc("SVS", 0x59C0),
    scc("SPL", 0x5AC0),
    scc("SMI", 0x5BC0),
    scc("SGE", 0x5CC0),
    scc("SLT", 0x5DC0),
    scc("SGT", 0x5EC0),
    scc("SLE", 0x5FC0),
    scc("SHS", 0x54C0),
    scc("SLO", 0x55C0),
];

static BRANCH: [Entry<M68k>; 18] = [
    bcc("BRA", 0x6000),
    bcc("BSR", 0x6100),
    bcc("BHI", 0x6200),
    bcc("BLS", 0x6300),
    bcc("BCC", 0x6400),
    bcc("BCS", 0x6500),
    bcc("BNE", 0x6600),
    bcc("BEQ", 0x6700),
    bcc("BVC", 0x6800),
    bcc("BVS", 0x6900),
    bcc("BPL", 0x6A00),
    bcc("BMI", 0x6B00),
    bcc("BGE", 0x6C00),
    bcc("BLT", 0x6D00),
    bcc("BGT", 0x6E00),
    bcc("BLE", 0x6F00),
    bcc("BHS", 0x6400),
    bcc("BLO", 0x6500),
];

static ARITH: [Entry<M68k>; 26] = [
    to_dn("DIVU", 0x80C0, M::Data, Sz::Word),
    to_dn("DIVS", 0x81C0, M::Data, Sz::Word),
    to_dn("OR", 0x8000, M::Data, Sz::Bwl),
    from_dn("OR", 0x8100, M::MemAlt),
    to_an("SUBA", 0x90C0),
    e2("SUBX", 0x9100, s(M::DReg, P::Reg), s(M::DReg, P::RegHi), Sz::Bwl),
    e2("SUBX", 0x9108, s(M::PreDec, P::Reg), s(M::PreDec, P::RegHi), Sz::Bwl),
    to_dn("SUB", 0x9000, M::Any, Sz::Bwl),
    from_dn("SUB", 0x9100, M::MemAlt),
    to_an("CMPA", 0xB0C0),
    e2("CMPM", 0xB108, s(M::PostInc, P::Reg), s(M::PostInc, P::RegHi), Sz::Bwl),
    to_dn("CMP", 0xB000, M::Any, Sz::Bwl),
    from_dn("EOR", 0xB100, M::DataAlt),
    to_dn("MULU", 0xC0C0, M::Data, Sz::Word),
    to_dn("MULS", 0xC1C0, M::Data, Sz::Word),
    e2("EXG", 0xC140, s(M::DReg, P::RegHi), s(M::DReg, P::Reg), Sz::Long),
    e2("EXG", 0xC148, s(M::AReg, P::RegHi), s(M::AReg, P::Reg), Sz::Long),
    e2("EXG", 0xC188, s(M::DReg, P::RegHi), s(M::AReg, P::Reg), Sz::Long),
    e2("EXG", 0xC188, s(M::AReg, P::Reg), s(M::DReg, P::RegHi), Sz::Long),
    to_dn("AND", 0xC000, M::Data, Sz::Bwl),
    from_dn("AND", 0xC100, M::MemAlt),
    to_an("ADDA", 0xD0C0),
    e2("ADDX", 0xD100, s(M::DReg, P::Reg), s(M::DReg, P::RegHi), Sz::Bwl),
    e2("ADDX", 0xD108, s(M::PreDec, P::Reg), s(M::PreDec, P::RegHi), Sz::Bwl),
    to_dn("ADD", 0xD000, M::Any, Sz::Bwl),
    from_dn("ADD", 0xD100, M::MemAlt),
];

static ASR: [Entry<M68k>; 3] = shift("ASR", 0xE000, 0xE0C0);
static ASL: [Entry<M68k>; 3] = shift("ASL", 0xE100, 0xE1C0);
static LSR: [Entry<M68k>; 3] = shift("LSR", 0xE008, 0xE2C0);
static LSL: [Entry<M68k>; 3] = shift("LSL", 0xE108, 0xE3C0);
static ROXR: [Entry<M68k>; 3] = shift("ROXR", 0xE010, 0xE4C0);
static ROXL: [Entry<M68k>; 3] = shift("ROXL", 0xE110, 0xE5C0);
static ROR: [Entry<M68k>; 3] = shift("ROR", 0xE018, 0xE6C0);
static ROL: [Entry<M68k>; 3] = shift("ROL", 0xE118, 0xE7C0);

/// Generic mnemonics that select the quick, immediate or address form.
/// Encode only.
static ALIASES: [Entry<M68k>; 18] = [
    e2("ADD", 0x5000, s(M::AutoQuick, P::Quick), s(M::Alt, P::Ea), Sz::Bwl),
    e2("SUB", 0x5100, s(M::AutoQuick, P::Quick), s(M::Alt, P::Ea), Sz::Bwl),
    imm("ADD", 0x0600),
    imm("SUB", 0x0400),
    imm("CMP", 0x0C00),
    imm("AND", 0x0200),
    imm("OR", 0x0000),
    imm("EOR", 0x0A00),
    to_ccr("AND", 0x023C),
    to_sr("AND", 0x027C),
    to_ccr("OR", 0x003C),
    to_sr("OR", 0x007C),
    to_ccr("EOR", 0x0A3C),
    to_sr("EOR", 0x0A7C),
    to_an("ADD", 0xD0C0),
    to_an("SUB", 0x90C0),
    to_an("CMP", 0xB0C0),
    e2("MOVE", 0x0040, s(M::Any, P::Ea), s(M::AReg, P::RegHi), Sz::Move),
];

macro_rules! base_pages {
    ($($extra:expr),*) => {
        &[
            $($extra,)*
            Page::new(None, &INHERENT),
            Page::new(None, &IMMEDIATE),
            Page::new(None, &BTST),
            Page::new(None, &BCHG),
            Page::new(None, &BCLR),
            Page::new(None, &BSET),
            Page::new(None, &MOVE),
            Page::new(None, &MISC),
            Page::new(None, &QUICK),
            Page::new(None, &DBCC),
            Page::new(None, &SCC),
            Page::new(None, &BRANCH),
            Page::new(None, &ARITH),
            Page::new(None, &ASR),
            Page::new(None, &ASL),
            Page::new(None, &LSR),
            Page::new(None, &LSL),
            Page::new(None, &ROXR),
            Page::new(None, &ROXL),
            Page::new(None, &ROR),
            Page::new(None, &ROL),
        ]
    };
}

static PAGES: &[Page<M68k>] = base_pages!();
static PAGES_WITH_ALIASES: &[Page<M68k>] = base_pages!(Page::alias(None, &ALIASES));

// ─── Registers ──────────────────────────────────────────────────────────

const REG_LO: Field = Field::new(0, 3);
const REG_HI: Field = Field::new(9, 3);

const DREG: [&str; 8] = ["D0", "D1", "D2", "D3", "D4", "D5", "D6", "D7"];
const AREG: [&str; 8] = ["A0", "A1", "A2", "A3", "A4", "A5", "A6", "A7"];

/// `Dn`, `An` or `SP`.
fn register(tok: &Token<'_>) -> Option<(Mode, u8)> {
    if tok.kind != TokenKind::Ident {
        return None;
    }
    if tok.is_word("SP") {
        return Some((Mode::AReg, 7));
    }
    match tok.text().as_bytes() {
        [kind, n @ b'0'..=b'7'] => {
            let n = n - b'0';
            match kind.to_ascii_uppercase() {
                b'D' => Some((Mode::DReg, n)),
                b'A' => Some((Mode::AReg, n)),
                _ => None,
            }
        }
        _ => None,
    }
}

fn address_register(tok: &Token<'_>) -> Option<u8> {
    match register(tok) {
        Some((Mode::AReg, n)) => Some(n),
        _ => None,
    }
}

/// Register number in list order: `D0-D7` are 0-7, `A0-A7` are 8-15.
fn list_index(tok: &Token<'_>) -> Option<u8> {
    register(tok).map(|(mode, n)| if mode == Mode::AReg { n + 8 } else { n })
}

fn index_name(index: u8) -> &'static str {
    let n = usize::from(index & 7);
    if index >= 8 {
        AREG[n]
    } else {
        DREG[n]
    }
}

// ─── Operands ───────────────────────────────────────────────────────────

static ABS_WIDTHS: [Width<Mode>; 2] = [
    Width::signed(Mode::AbsW, 16),
    Width::new(Mode::AbsL, i32::MIN as i64, u32::MAX as i64),
];

#[derive(Debug, Clone, Copy)]
struct Operand {
    mode: Mode,
    /// Register number of a register, address-register or PC-less mode.
    reg: u8,
    /// Immediate, displacement, absolute address or PC-relative target.
    val: Value,
    /// Index register in list order.
    index: u8,
    index_long: bool,
    list: u16,
    span: Span,
}

impl Operand {
    fn none() -> Self {
        Self {
            mode: Mode::None,
            reg: 0,
            val: Value::new(0),
            index: 0,
            index_long: false,
            list: 0,
            span: Span::dummy(),
        }
    }

    /// The 6-bit effective-address field.
    fn ea_field(&self) -> u16 {
        let reg = u16::from(self.reg);
        match self.mode {
            Mode::DReg => reg,
            Mode::AReg => 0o10 | reg,
            Mode::Ind => 0o20 | reg,
            Mode::PostInc => 0o30 | reg,
            Mode::PreDec => 0o40 | reg,
            Mode::Disp => 0o50 | reg,
            Mode::Index => 0o60 | reg,
            Mode::AbsW => 0o70,
            Mode::AbsL => 0o71,
            Mode::PcDisp => 0o72,
            Mode::PcIndex => 0o73,
            Mode::Imm => 0o74,
            _ => 0,
        }
    }
}

fn parse_list(cur: &mut Cursor<'_, '_>) -> Result<u16, AsmError> {
    let mut mask = 0u16;
    loop {
        let first = cur.advance();
        let lo = list_index(first)
            .ok_or_else(|| AsmError::new(ErrorKind::UnknownRegister, first.span))?;
        let hi = if cur.eat(TokenKind::Minus) {
            let last = cur.advance();
            list_index(last)
                .ok_or_else(|| AsmError::new(ErrorKind::UnknownRegister, last.span))?
        } else {
            lo
        };
        if hi < lo {
            return Err(AsmError::new(ErrorKind::IllegalOperandMode, first.span));
        }
        for r in lo..=hi {
            let bit = 1u16 << r;
            if mask & bit != 0 {
                return Err(AsmError::new(ErrorKind::DuplicateRegister, first.span));
            }
            mask |= bit;
        }
        if !cur.eat(TokenKind::Slash) {
            return Ok(mask);
        }
    }
}

/// The part after `(`: `An)`, `An)+`, `PC)` or an index `Rn,Xn.s)`.
fn parse_base(cur: &mut Cursor<'_, '_>, op: &mut Operand, bare: bool) -> Result<(), AsmError> {
    let tok = cur.advance();
    let pc = tok.is_word("PC");
    if !pc {
        op.reg = address_register(tok)
            .ok_or_else(|| AsmError::new(ErrorKind::UnknownRegister, tok.span))?;
    }
    if cur.eat(TokenKind::Comma) {
        let x = cur.advance();
        op.index =
            list_index(x).ok_or_else(|| AsmError::new(ErrorKind::UnknownRegister, x.span))?;
        if cur.kind() == TokenKind::Suffix {
            let sfx = cur.advance();
            op.index_long = match SizeSuffix::parse(sfx) {
                Some(SizeSuffix::W) => false,
                Some(SizeSuffix::L) => true,
                _ => return Err(AsmError::new(ErrorKind::IllegalSize, sfx.span)),
            };
        }
        cur.expect(TokenKind::CloseParen, ErrorKind::UnknownOperand)?;
        op.mode = if pc { Mode::PcIndex } else { Mode::Index };
        return Ok(());
    }
    cur.expect(TokenKind::CloseParen, ErrorKind::UnknownOperand)?;
    op.mode = match (pc, bare) {
        (true, _) => Mode::PcDisp,
        (false, true) if cur.eat(TokenKind::Plus) => Mode::PostInc,
        (false, true) => Mode::Ind,
        (false, false) => Mode::Disp,
    };
    Ok(())
}

fn parse_operand(cur: &mut Cursor<'_, '_>, ctx: &EvalContext<'_>) -> Result<Operand, AsmError> {
    let start = cur.span();
    let mut op = Operand::none();
    let tok = cur.peek();
    if cur.eat(TokenKind::Hash) {
        op.val = parse_expr(cur, ctx)?;
        op.mode = Mode::Imm;
    } else if let Some((mode, reg)) = register(tok) {
        if matches!(cur.peek_at(1).kind, TokenKind::Minus | TokenKind::Slash) {
            op.list = parse_list(cur)?;
            op.mode = Mode::RegList;
        } else {
            cur.advance();
            op.mode = mode;
            op.reg = reg;
        }
    } else if tok.is_word("CCR") {
        cur.advance();
        op.mode = Mode::Ccr;
    } else if tok.is_word("SR") {
        cur.advance();
        op.mode = Mode::Sr;
    } else if tok.kind == TokenKind::Minus
        && cur.peek_at(1).kind == TokenKind::OpenParen
        && address_register(cur.peek_at(2)).is_some()
        && cur.peek_at(3).kind == TokenKind::CloseParen
    {
        cur.advance();
        cur.advance();
        op.reg = address_register(cur.advance()).unwrap_or(0);
        cur.advance();
        op.mode = Mode::PreDec;
    } else if tok.kind == TokenKind::OpenParen
        && address_register(cur.peek_at(1)).is_some()
        && matches!(cur.peek_at(2).kind, TokenKind::CloseParen | TokenKind::Comma)
    {
        cur.advance();
        parse_base(cur, &mut op, true)?;
    } else {
        op.val = parse_expr(cur, ctx)?;
        if cur.eat(TokenKind::OpenParen) {
            parse_base(cur, &mut op, false)?;
        } else if cur.kind() == TokenKind::Suffix {
            let sfx = cur.advance();
            op.mode = match SizeSuffix::parse(sfx) {
                Some(SizeSuffix::W) => Mode::AbsW,
                Some(SizeSuffix::L) => Mode::AbsL,
                _ => return Err(AsmError::new(ErrorKind::IllegalSize, sfx.span)),
            };
        } else {
            op.mode = Mode::Abs;
        }
    }
    op.span = span_since(start, cur);
    Ok(op)
}

// ─── Sizes ──────────────────────────────────────────────────────────────

/// Operation size an entry takes for `suffix`, or `None` when the entry
/// cannot take that suffix. `dst_is_dreg` decides bit-operation sizes.
fn op_size(tag: Sz, suffix: SizeSuffix, dst_is_dreg: bool) -> Option<OpSize> {
    use SizeSuffix as S;
    match (tag, suffix) {
        (Sz::Unsized, S::Absent) => Some(OpSize::Word),
        (Sz::Bwl | Sz::Move, S::B) => Some(OpSize::Byte),
        (Sz::Bwl | Sz::Move | Sz::Wl6 | Sz::Wl8 | Sz::Word, S::Absent | S::W) => {
            Some(OpSize::Word)
        }
        (Sz::Bwl | Sz::Move | Sz::Wl6 | Sz::Wl8 | Sz::Long, S::L) => Some(OpSize::Long),
        (Sz::Long, S::Absent) => Some(OpSize::Long),
        (Sz::Byte, S::Absent | S::B) => Some(OpSize::Byte),
        (Sz::BitOp, S::Absent) if dst_is_dreg => Some(OpSize::Long),
        (Sz::BitOp, S::Absent) => Some(OpSize::Byte),
        (Sz::BitOp, S::L) if dst_is_dreg => Some(OpSize::Long),
        (Sz::BitOp, S::B) if !dst_is_dreg => Some(OpSize::Byte),
        (Sz::Branch, S::Absent | S::S | S::B | S::W) => Some(OpSize::Word),
        _ => None,
    }
}

/// Size field bits for `size` under `tag`.
fn size_bits(tag: Sz, size: OpSize) -> u16 {
    match (tag, size) {
        (Sz::Bwl, OpSize::Word) => 0x0040,
        (Sz::Bwl, OpSize::Long) => 0x0080,
        (Sz::Move, OpSize::Byte) => 0x1000,
        (Sz::Move, OpSize::Word) => 0x3000,
        (Sz::Move, OpSize::Long) => 0x2000,
        (Sz::Wl6, OpSize::Long) => 0x0040,
        (Sz::Wl8, OpSize::Long) => 0x0100,
        _ => 0,
    }
}

/// Operation size carried by a raw opcode, or `None` for a reserved size
/// field.
fn decoded_size(tag: Sz, opcode: u16) -> Option<OpSize> {
    match tag {
        Sz::Bwl => match (opcode >> 6) & 3 {
            0 => Some(OpSize::Byte),
            1 => Some(OpSize::Word),
            2 => Some(OpSize::Long),
            _ => None,
        },
        Sz::Move => match (opcode >> 12) & 3 {
            1 => Some(OpSize::Byte),
            3 => Some(OpSize::Word),
            2 => Some(OpSize::Long),
            _ => None,
        },
        Sz::Wl6 if opcode & 0x0040 != 0 => Some(OpSize::Long),
        Sz::Wl8 if opcode & 0x0100 != 0 => Some(OpSize::Long),
        Sz::Byte => Some(OpSize::Byte),
        Sz::Long => Some(OpSize::Long),
        Sz::BitOp if opcode & 0o70 == 0 => Some(OpSize::Long),
        Sz::BitOp => Some(OpSize::Byte),
        _ => Some(OpSize::Word),
    }
}

fn suffix_text(size: OpSize) -> &'static str {
    match size {
        OpSize::Byte => ".B",
        OpSize::Word => ".W",
        OpSize::Long => ".L",
    }
}

/// Mode and register of a 6-bit EA field; `None` for the reserved
/// encodings.
fn ea_mode(bits: u16) -> Option<(Mode, u8)> {
    let reg = (bits & 7) as u8;
    let mode = match (bits >> 3) & 7 {
        0 => Mode::DReg,
        1 => Mode::AReg,
        2 => Mode::Ind,
        3 => Mode::PostInc,
        4 => Mode::PreDec,
        5 => Mode::Disp,
        6 => Mode::Index,
        _ => match reg {
            0 => Mode::AbsW,
            1 => Mode::AbsL,
            2 => Mode::PcDisp,
            3 => Mode::PcIndex,
            4 => Mode::Imm,
            _ => return None,
        },
    };
    Some((mode, reg))
}

/// EA bits of slot `pos` within `opcode`.
fn ea_bits(pos: Pos, opcode: u16) -> Option<u16> {
    match pos {
        Pos::Ea => Some(opcode & 0x3F),
        Pos::EaDst => Some(((opcode >> 3) & 0o70) | REG_HI.extract(opcode)),
        _ => None,
    }
}

// ─── Backend ────────────────────────────────────────────────────────────

/// The 68000 backend.
#[derive(Debug)]
pub(crate) struct Mc68000 {
    pages: &'static [Page<M68k>],
}

impl Mc68000 {
    pub(crate) fn new(config: &Config) -> Self {
        let pages = if config.alias_entries() {
            PAGES_WITH_ALIASES
        } else {
            PAGES
        };
        Self { pages }
    }

    fn accept(
        ops: &[Operand; 2],
        suffix: SizeSuffix,
        entry: &Entry<M68k>,
    ) -> Result<(), Reject> {
        let parsed = [ops[0].mode, ops[1].mode, Mode::None];
        accept_slots(&parsed, entry)?;
        for (i, op) in ops.iter().enumerate() {
            let v = op.val.value;
            let ok = match entry.slot(i).mode {
                Mode::Quick3 => op.val.undefined || (1..=8).contains(&v),
                Mode::AutoQuick => !op.val.undefined && (1..=8).contains(&v),
                Mode::Quick8 => op.val.undefined || fits_signed(v, 8),
                Mode::Vector => op.val.undefined || (0..=15).contains(&v),
                _ => true,
            };
            if !ok {
                return Err(Reject::at(ErrorKind::OverflowRange, i));
            }
        }
        let size = op_size(entry.size(), suffix, ops[1].mode == Mode::DReg)
            .ok_or(Reject::new(ErrorKind::IllegalSize, None, 3))?;
        if size == OpSize::Byte && ops.iter().any(|o| o.mode == Mode::AReg) {
            return Err(Reject::new(ErrorKind::IllegalSize, None, 3));
        }
        Ok(())
    }

    /// Whether `entry` can have produced `opcode`.
    fn valid(opcode: u16, entry: &Entry<M68k>) -> bool {
        let Some(size) = decoded_size(entry.size(), opcode) else {
            return false;
        };
        (0..2).all(|i| {
            let slot = entry.slot(i);
            let Some(bits) = ea_bits(slot.pos, opcode) else {
                return true;
            };
            match ea_mode(bits) {
                Some((mode, _)) => {
                    M68k::accept_mode(mode, slot.mode)
                        && !(mode == Mode::AReg && size == OpSize::Byte)
                }
                None => false,
            }
        })
    }

    fn branch(
        insn: &AsmInsn,
        op: &Operand,
        suffix: SizeSuffix,
    ) -> Result<Branch<Br>, AsmError> {
        let reaches = [
            Reach::new(Br::Short, 8, 2).reserving_zero(),
            Reach::new(Br::Word, 16, 2),
        ];
        let mut forced = match suffix {
            SizeSuffix::S | SizeSuffix::B => Some(Br::Short),
            SizeSuffix::W => Some(Br::Word),
            _ => None,
        };
        let address = insn.address() as i64;
        let target = if op.val.undefined {
            forced = forced.or(Some(Br::Word));
            address
        } else {
            check_range(op.val.value, 32).at(op.span)?;
            op.val.value
        };
        relax_branch_in(ADDRESS_BITS, address, target, 2, &reaches, forced).at(op.span)
    }

    fn emit_imm(insn: &mut AsmInsn, op: &Operand, size: OpSize) -> Result<(), AsmError> {
        let v = op.val.value;
        match size {
            OpSize::Byte => {
                check_range(v, 8).at(op.span)?;
                insn.emit_u16(u16::from(v as u8)).at(op.span)
            }
            OpSize::Word => {
                check_range(v, 16).at(op.span)?;
                insn.emit_u16(v as u16).at(op.span)
            }
            OpSize::Long => {
                check_range(v, 32).at(op.span)?;
                insn.emit_u32(v as u32).at(op.span)
            }
        }
    }

    /// Extension words of an effective address.
    fn emit_ea(insn: &mut AsmInsn, op: &Operand, size: OpSize) -> Result<(), AsmError> {
        let v = op.val.value;
        let span = op.span;
        let brief = |disp: i64| {
            let mut ext = (u16::from(op.index & 7) << 12) | (disp as u16 & 0xFF);
            if op.index >= 8 {
                ext |= 0x8000;
            }
            if op.index_long {
                ext |= 0x0800;
            }
            ext
        };
        // Displacement from the extension word about to be written.
        let pc_disp = |insn: &AsmInsn, bits: u32| -> Result<i64, AsmError> {
            if op.val.undefined {
                return Ok(0);
            }
            check_range(v, 32).at(span)?;
            let d = wrap_signed(v - (insn.address() as i64 + insn.len() as i64), ADDRESS_BITS);
            if fits_signed(d, bits) {
                Ok(d)
            } else {
                Err(AsmError::new(ErrorKind::OperandTooFar, span))
            }
        };
        match op.mode {
            Mode::Disp => {
                if !fits_signed(v, 16) {
                    return Err(AsmError::new(ErrorKind::OverflowRange, span));
                }
                insn.emit_u16(v as u16).at(span)
            }
            Mode::Index => {
                if !fits_signed(v, 8) {
                    return Err(AsmError::new(ErrorKind::OverflowRange, span));
                }
                insn.emit_u16(brief(v)).at(span)
            }
            Mode::AbsW | Mode::AbsL => {
                choose_width(v, op.val.undefined, &ABS_WIDTHS, Some(op.mode)).at(span)?;
                if op.mode == Mode::AbsW {
                    insn.emit_u16(v as u16).at(span)
                } else {
                    insn.emit_u32(v as u32).at(span)
                }
            }
            Mode::PcDisp => {
                let d = pc_disp(insn, 16)?;
                insn.emit_u16(d as u16).at(span)
            }
            Mode::PcIndex => {
                let d = pc_disp(insn, 8)?;
                insn.emit_u16(brief(d)).at(span)
            }
            Mode::Imm => Self::emit_imm(insn, op, size),
            _ => Ok(()),
        }
    }

    /// `MOVEM` mask; the predecrement form stores it bit-reversed.
    fn movem_mask(op: &Operand, predec: bool) -> Result<u16, AsmError> {
        let mask = match op.mode {
            Mode::DReg => 1 << op.reg,
            Mode::AReg => 1 << (op.reg + 8),
            Mode::Imm => {
                check_range(op.val.value, 16).at(op.span)?;
                return Ok(op.val.value as u16);
            }
            _ => op.list,
        };
        Ok(if predec { mask.reverse_bits() } else { mask })
    }
}

impl Backend for Mc68000 {
    fn encode(
        &self,
        insn: &mut AsmInsn,
        name: &Token<'_>,
        cur: &mut Cursor<'_, '_>,
        ctx: &EvalContext<'_>,
    ) -> Result<(), AsmError> {
        let suffix = if cur.kind() == TokenKind::Suffix {
            let sfx = cur.advance();
            SizeSuffix::parse(sfx).ok_or_else(|| AsmError::new(ErrorKind::IllegalSize, sfx.span))?
        } else {
            SizeSuffix::Absent
        };

        let mut ops = [Operand::none(); 2];
        if !cur.at_end() {
            ops[0] = parse_operand(cur, ctx)?;
            if cur.eat(TokenKind::Comma) {
                ops[1] = parse_operand(cur, ctx)?;
            }
        }
        for op in &ops {
            insn.note_undefined(&op.val, op.span);
        }

        let found = search::search_name(name.text(), self.pages, |e| Self::accept(&ops, suffix, e))
            .map_err(|r| {
                let span = r.slot.map_or(name.span, |i| ops[i.min(1)].span);
                AsmError::new(r.kind, span)
            })?;
        insn.advance(EncodeStage::NameResolved);

        let entry = found.entry;
        let tag = entry.size();
        let size = op_size(tag, suffix, ops[1].mode == Mode::DReg)
            .ok_or_else(|| AsmError::new(ErrorKind::IllegalSize, name.span))?;
        for (i, op) in ops.iter_mut().enumerate() {
            if op.mode == Mode::Abs && entry.slot(i).mode != Mode::Rel && entry.slot(i).mode != Mode::Rel16 {
                op.mode = choose_width(op.val.value, op.val.undefined, &ABS_WIDTHS, None).at(op.span)?;
            }
        }
        insn.advance(EncodeStage::AddrModeDetermined);

        let mut opcode = entry.opcode() | size_bits(tag, size);
        let mut branch = None;
        for (i, op) in ops.iter().enumerate() {
            let v = op.val.value;
            match entry.slot(i).pos {
                Pos::Ea => opcode |= op.ea_field(),
                Pos::EaDst => {
                    let f = op.ea_field();
                    opcode |= ((f & 7) << 9) | ((f >> 3) << 6);
                }
                Pos::Reg => opcode = REG_LO.insert(opcode, u16::from(op.reg)),
                Pos::RegHi => opcode = REG_HI.insert(opcode, u16::from(op.reg)),
                Pos::Quick => opcode = REG_HI.insert(opcode, v as u16),
                Pos::Data8 => opcode |= (v & 0xFF) as u16,
                Pos::Vector => opcode |= (v & 0xF) as u16,
                Pos::Branch => {
                    let b = Self::branch(insn, op, suffix)?;
                    if b.size == Br::Short {
                        opcode |= (b.delta & 0xFF) as u16;
                    }
                    branch = Some(b);
                }
                Pos::None | Pos::Ext | Pos::BitNum | Pos::Mask | Pos::Disp => {}
            }
        }
        insn.emit_u16(opcode).at(name.span)?;

        if let Some(i) = (0..2).find(|&i| entry.slot(i).pos == Pos::Mask) {
            let predec = ops[1 - i].mode == Mode::PreDec;
            let mask = Self::movem_mask(&ops[i], predec)?;
            insn.emit_u16(mask).at(ops[i].span)?;
        }
        for (i, op) in ops.iter().enumerate() {
            match entry.slot(i).pos {
                Pos::Ea | Pos::EaDst => Self::emit_ea(insn, op, size)?,
                Pos::Ext => Self::emit_imm(insn, op, size)?,
                Pos::BitNum => {
                    check_range(op.val.value, 8).at(op.span)?;
                    insn.emit_u16(u16::from(op.val.value as u8)).at(op.span)?;
                }
                Pos::Disp => {
                    let address = insn.address() as i64;
                    let target = if op.val.undefined {
                        address
                    } else {
                        op.val.value
                    };
                    check_range(target, 32).at(op.span)?;
                    let reach = [Reach::new(Br::Word, 16, 2)];
                    let b = relax_branch_in(ADDRESS_BITS, address, target, 2, &reach, None).at(op.span)?;
                    insn.emit_u16(b.delta as u16).at(op.span)?;
                }
                Pos::Branch => {
                    if let Some(b) = branch.filter(|b| b.size == Br::Word) {
                        insn.emit_u16(b.delta as u16).at(op.span)?;
                    }
                }
                _ => {}
            }
        }
        insn.advance(EncodeStage::OperandsEncoded);
        Ok(())
    }

    fn decode(&self, insn: &mut DisInsn<'_>, out: &mut TextOut) -> Result<(), ErrorKind> {
        let opcode = insn.read_u16()?;
        insn.advance(DecodeStage::OpcodeRead);
        let found = search::search_opcode(None, opcode, self.pages, |e| Self::valid(opcode, e))?;
        insn.advance(DecodeStage::EntryResolved);
        let entry = found.entry;
        let tag = entry.size();
        let size = decoded_size(tag, opcode).ok_or(ErrorKind::UnknownInstruction)?;

        if tag == Sz::Branch {
            let d8 = opcode & 0xFF;
            let (delta, word) = if d8 == 0 {
                (sign_extend(u64::from(insn.read_u16()?), 16), true)
            } else {
                (sign_extend(u64::from(d8), 8), false)
            };
            if delta % 2 != 0 {
                return Err(ErrorKind::OperandNotAligned);
            }
            out.name(entry.name());
            if word && delta != 0 && fits_signed(delta, 8) {
                out.name(".W");
            }
            let target = (insn.address() as i64 + 2 + delta) & 0x00FF_FFFF;
            out.gap().hex(target as u64);
            insn.advance(DecodeStage::OperandsDecoded);
            return Ok(());
        }

        out.name(entry.name());
        if matches!(tag, Sz::Bwl | Sz::Move | Sz::Wl6 | Sz::Wl8) {
            out.name(suffix_text(size));
        }

        let mask = if (0..2).any(|i| entry.slot(i).pos == Pos::Mask) {
            let raw = insn.read_u16()?;
            Some(if opcode & 0o70 == 0o40 {
                raw.reverse_bits()
            } else {
                raw
            })
        } else {
            None
        };

        for i in 0..entry.flags().operand_count() {
            if i == 0 {
                out.gap();
            } else {
                out.sep();
            }
            let slot = entry.slot(i);
            match slot.pos {
                Pos::Ea | Pos::EaDst => {
                    let bits = ea_bits(slot.pos, opcode).ok_or(ErrorKind::UnknownInstruction)?;
                    decode_ea(insn, out, bits, size)?;
                }
                Pos::Reg | Pos::RegHi => {
                    let field = if slot.pos == Pos::Reg { REG_LO } else { REG_HI };
                    let r = usize::from(field.extract(opcode));
                    match slot.mode {
                        Mode::DReg => {
                            out.name(DREG[r]);
                        }
                        Mode::PreDec => {
                            out.text("-(").name(AREG[r]).ch(')');
                        }
                        Mode::PostInc => {
                            out.ch('(').name(AREG[r]).text(")+");
                        }
                        _ => {
                            out.name(AREG[r]);
                        }
                    }
                }
                Pos::Quick => {
                    let q = REG_HI.extract(opcode);
                    out.ch('#').hex(if q == 0 { 8 } else { u64::from(q) });
                }
                Pos::Data8 => {
                    out.ch('#').signed_hex(sign_extend(u64::from(opcode & 0xFF), 8));
                }
                Pos::Vector => {
                    out.ch('#').hex(u64::from(opcode & 0xF));
                }
                Pos::Ext => {
                    let v = match size {
                        OpSize::Byte => u64::from(insn.read_u16()? & 0xFF),
                        OpSize::Word => u64::from(insn.read_u16()?),
                        OpSize::Long => u64::from(insn.read_u32()?),
                    };
                    out.ch('#').hex(v);
                }
                Pos::BitNum => {
                    let n = insn.read_u16()?;
                    out.ch('#').hex(u64::from(n & 0xFF));
                }
                Pos::Mask => write_list(out, mask.ok_or(ErrorKind::UnknownInstruction)?),
                Pos::Disp => {
                    let d = sign_extend(u64::from(insn.read_u16()?), 16);
                    let target = (insn.address() as i64 + 2 + d) & 0x00FF_FFFF;
                    out.hex(target as u64);
                }
                Pos::None => {
                    out.name(if slot.mode == Mode::Ccr { "CCR" } else { "SR" });
                }
                Pos::Branch => return Err(ErrorKind::UnknownInstruction),
            }
        }
        insn.advance(DecodeStage::OperandsDecoded);
        Ok(())
    }
}

fn decode_ea(
    insn: &mut DisInsn<'_>,
    out: &mut TextOut,
    bits: u16,
    size: OpSize,
) -> Result<(), ErrorKind> {
    let (mode, reg) = ea_mode(bits).ok_or(ErrorKind::UnknownInstruction)?;
    let r = usize::from(reg);
    let brief = |out: &mut TextOut, ext: u16| -> Result<(), ErrorKind> {
        if ext & 0x0700 != 0 {
            return Err(ErrorKind::IllegalOperandMode);
        }
        let x = ((ext >> 12) & 7) as u8 | if ext & 0x8000 != 0 { 8 } else { 0 };
        out.ch(',').name(index_name(x));
        out.name(if ext & 0x0800 != 0 { ".L" } else { ".W" });
        Ok(())
    };
    match mode {
        Mode::DReg => {
            out.name(DREG[r]);
        }
        Mode::AReg => {
            out.name(AREG[r]);
        }
        Mode::Ind => {
            out.ch('(').name(AREG[r]).ch(')');
        }
        Mode::PostInc => {
            out.ch('(').name(AREG[r]).text(")+");
        }
        Mode::PreDec => {
            out.text("-(").name(AREG[r]).ch(')');
        }
        Mode::Disp => {
            let d = sign_extend(u64::from(insn.read_u16()?), 16);
            out.signed_hex(d).ch('(').name(AREG[r]).ch(')');
        }
        Mode::Index => {
            let ext = insn.read_u16()?;
            out.signed_hex(sign_extend(u64::from(ext & 0xFF), 8));
            out.ch('(').name(AREG[r]);
            brief(out, ext)?;
            out.ch(')');
        }
        Mode::AbsW => {
            out.signed_hex(sign_extend(u64::from(insn.read_u16()?), 16));
        }
        Mode::AbsL => {
            let a = insn.read_u32()?;
            out.hex(u64::from(a));
            if fits_signed(i64::from(a), 16) {
                out.name(".L");
            }
        }
        Mode::PcDisp => {
            let at = insn.address() as i64 + insn.len() as i64;
            let d = sign_extend(u64::from(insn.read_u16()?), 16);
            out.hex(((at + d) & 0x00FF_FFFF) as u64).ch('(').name("PC").ch(')');
        }
        Mode::PcIndex => {
            let at = insn.address() as i64 + insn.len() as i64;
            let ext = insn.read_u16()?;
            let d = sign_extend(u64::from(ext & 0xFF), 8);
            out.hex(((at + d) & 0x00FF_FFFF) as u64).ch('(').name("PC");
            brief(out, ext)?;
            out.ch(')');
        }
        Mode::Imm => {
            let v = match size {
                OpSize::Byte => u64::from(insn.read_u16()? & 0xFF),
                OpSize::Word => u64::from(insn.read_u16()?),
                OpSize::Long => u64::from(insn.read_u32()?),
            };
            out.ch('#').hex(v);
        }
        _ => return Err(ErrorKind::UnknownInstruction),
    }
    Ok(())
}

/// `d0-d3/a0` form of a mask in list order.
fn write_list(out: &mut TextOut, mask: u16) {
    if mask == 0 {
        out.ch('#').hex(0);
        return;
    }
    let mut first = true;
    for (base, names) in [(0u32, &DREG), (8, &AREG)] {
        let mut i = 0;
        while i < 8 {
            if mask & (1 << (base + i)) == 0 {
                i += 1;
                continue;
            }
            let start = i;
            while i + 1 < 8 && mask & (1 << (base + i + 1)) != 0 {
                i += 1;
            }
            if !first {
                out.ch('/');
            }
            out.name(names[start as usize]);
            if i > start {
                out.ch('-').name(names[i as usize]);
            }
            first = false;
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ArrayMemory;
    use crate::config::Cpu;
    use crate::expr::NoSymbols;
    use crate::{Assembler, Disassembler};
    use alloc::string::String;
    use alloc::vec::Vec;

    fn asm_with(config: Config, address: u64, line: &str) -> Result<Vec<u8>, ErrorKind> {
        let out = Assembler::new(config).unwrap().encode(address, line, &NoSymbols);
        match out.error {
            Some(e) if !e.kind.is_warning() => Err(e.kind),
            _ => Ok(out.bytes),
        }
    }

    fn enc_at(address: u64, line: &str) -> Vec<u8> {
        asm_with(Config::new(Cpu::Mc68000), address, line).unwrap()
    }

    fn enc(line: &str) -> Vec<u8> {
        enc_at(0x1000, line)
    }

    fn err(line: &str) -> ErrorKind {
        asm_with(Config::new(Cpu::Mc68000), 0x1000, line).unwrap_err()
    }

    fn dis_at(address: u64, bytes: &[u8]) -> String {
        let d = Disassembler::new(Config::new(Cpu::Mc68000)).unwrap();
        let mut mem = ArrayMemory::new(address, bytes);
        d.decode(address, &mut mem).text
    }

    fn dis(bytes: &[u8]) -> String {
        dis_at(0x1000, bytes)
    }

    #[test]
    fn quick_alias_is_configuration_gated() {
        assert_eq!(enc("add #1,d3"), [0x52, 0x43]);
        let plain = Config::new(Cpu::Mc68000).with_alias_entries(false);
        assert_eq!(asm_with(plain, 0, "add #1,d3").unwrap(), [0xD6, 0x7C, 0x00, 0x01]);
        assert_eq!(enc("add.l #9,d0"), [0x06, 0x80, 0x00, 0x00, 0x00, 0x09]);
        assert_eq!(enc("sub #1,a0"), [0x53, 0x48]);
        assert_eq!(enc("cmp.w #1,a0"), [0xB0, 0xFC, 0x00, 0x01]);
        assert_eq!(enc("move.l d0,a1"), [0x22, 0x40]);
    }

    #[test]
    fn data_movement() {
        assert_eq!(enc("move.l d0,d1"), [0x22, 0x00]);
        assert_eq!(enc("move.w #$1234,(a0)"), [0x30, 0xBC, 0x12, 0x34]);
        assert_eq!(enc("move.b (a0)+,-(a1)"), [0x13, 0x18]);
        assert_eq!(enc("movea.l a0,a1"), [0x22, 0x48]);
        assert_eq!(enc("moveq #-1,d0"), [0x70, 0xFF]);
        assert_eq!(enc("move sr,d0"), [0x40, 0xC0]);
        assert_eq!(enc("move #0,ccr"), [0x44, 0xFC, 0x00, 0x00]);
        assert_eq!(enc("lea (a0),a1"), [0x43, 0xD0]);
        assert_eq!(enc("pea 4(a0)"), [0x48, 0x68, 0x00, 0x04]);
        assert_eq!(enc("exg d0,d1"), [0xC1, 0x41]);
        assert_eq!(enc("exg a0,d1"), [0xC3, 0x88]);
        assert_eq!(enc("swap d0"), [0x48, 0x40]);
        assert_eq!(enc("ext.l d0"), [0x48, 0xC0]);
    }

    #[test]
    fn effective_address_extensions() {
        assert_eq!(enc("move.l 4(a0,d1.l),d0"), [0x20, 0x30, 0x18, 0x04]);
        assert_eq!(enc("move.w -2(a6),d0"), [0x30, 0x2E, 0xFF, 0xFE]);
        assert_eq!(enc("move.w (a0,a1.w),d0"), [0x30, 0x30, 0x90, 0x00]);
        assert_eq!(enc("jsr $1234"), [0x4E, 0xB8, 0x12, 0x34]);
        assert_eq!(enc("jmp $12345678"), [0x4E, 0xF9, 0x12, 0x34, 0x56, 0x78]);
        assert_eq!(enc("jmp $1234.l"), [0x4E, 0xF9, 0x00, 0x00, 0x12, 0x34]);
        assert_eq!(enc("clr.w -$8000"), [0x42, 0x78, 0x80, 0x00]);
        assert_eq!(enc("clr.w $8000"), [0x42, 0x79, 0x00, 0x00, 0x80, 0x00]);
        assert_eq!(enc("lea $1010(pc),a0"), [0x41, 0xFA, 0x00, 0x0E]);
        assert_eq!(enc("move.l $4(a0),$8(a1)"), [0x23, 0x68, 0x00, 0x04, 0x00, 0x08]);
        assert_eq!(err("clr.w $8000.w"), ErrorKind::OverflowRange);
        assert_eq!(err("move.w $8000(a0),d0"), ErrorKind::OverflowRange);
    }

    #[test]
    fn immediates_and_sizes() {
        assert_eq!(enc("addi.b #$12,d0"), [0x06, 0x00, 0x00, 0x12]);
        assert_eq!(enc("ori #$10,ccr"), [0x00, 0x3C, 0x00, 0x10]);
        assert_eq!(enc("andi #$F8FF,sr"), [0x02, 0x7C, 0xF8, 0xFF]);
        assert_eq!(enc("divs #3,d0"), [0x81, 0xFC, 0x00, 0x03]);
        assert_eq!(enc("link a6,#-8"), [0x4E, 0x56, 0xFF, 0xF8]);
        assert_eq!(err("addi.b #$123,d0"), ErrorKind::OverflowRange);
        assert_eq!(err("moveq #200,d0"), ErrorKind::OverflowRange);
        assert_eq!(err("trap #16"), ErrorKind::OverflowRange);
        assert_eq!(err("addq #9,d0"), ErrorKind::OverflowRange);
        assert_eq!(err("move.b a0,d0"), ErrorKind::IllegalSize);
        assert_eq!(err("ext.b d0"), ErrorKind::IllegalSize);
        assert_eq!(err("lea.w (a0),a1"), ErrorKind::IllegalSize);
        assert_eq!(err("nop.x"), ErrorKind::IllegalSize);
    }

    #[test]
    fn arithmetic_and_logic() {
        assert_eq!(enc("add.l d0,(a0)"), [0xD1, 0x90]);
        assert_eq!(enc("addx.l d1,d2"), [0xD5, 0x81]);
        assert_eq!(enc("subx.w -(a1),-(a2)"), [0x95, 0x49]);
        assert_eq!(enc("cmpm.b (a0)+,(a1)+"), [0xB3, 0x08]);
        assert_eq!(enc("mulu d1,d0"), [0xC0, 0xC1]);
        assert_eq!(enc("chk (a0),d1"), [0x43, 0x90]);
        assert_eq!(enc("eor.w d1,d0"), [0xB3, 0x40]);
        assert_eq!(enc("not.l d3"), [0x46, 0x83]);
        assert_eq!(enc("tst.b (a0)+"), [0x4A, 0x18]);
        assert_eq!(enc("clr.l d0"), [0x42, 0x80]);
        assert_eq!(err("eor (a0),d0"), ErrorKind::OperandNotAllowed);
    }

    #[test]
    fn shifts_and_bits() {
        assert_eq!(enc("asl.w #2,d0"), [0xE5, 0x40]);
        assert_eq!(enc("lsr.l d1,d2"), [0xE2, 0xAA]);
        assert_eq!(enc("ror.b #8,d7"), [0xE0, 0x1F]);
        assert_eq!(enc("asl (a0)"), [0xE1, 0xD0]);
        assert_eq!(enc("btst #3,d0"), [0x08, 0x00, 0x00, 0x03]);
        assert_eq!(enc("bset d1,(a0)"), [0x03, 0xD0]);
        assert_eq!(err("btst.b #3,d0"), ErrorKind::IllegalSize);
        assert_eq!(enc("seq d0"), [0x57, 0xC0]);
    }

    #[test]
    fn movem_masks() {
        assert_eq!(enc("movem.l d0-d3/a0,-(sp)"), [0x48, 0xE7, 0xF0, 0x80]);
        assert_eq!(enc("movem.l (sp)+,d0-d3/a0"), [0x4C, 0xDF, 0x01, 0x0F]);
        assert_eq!(enc("movem.w d0,(a0)"), [0x48, 0x90, 0x00, 0x01]);
        assert_eq!(enc("movem.w 4(a0),a1"), [0x4C, 0xA8, 0x02, 0x00, 0x00, 0x04]);
        assert_eq!(err("movem.l d0/d0,-(sp)"), ErrorKind::DuplicateRegister);
        assert_eq!(err("movem.l d3-d0,-(sp)"), ErrorKind::IllegalOperandMode);
    }

    #[test]
    fn branches() {
        assert_eq!(enc("bra $1000"), [0x60, 0xFE]);
        assert_eq!(enc("bra $1002"), [0x60, 0x00, 0x00, 0x00]);
        assert_eq!(enc("beq $1010"), [0x67, 0x0E]);
        assert_eq!(enc("bne.w $1010"), [0x66, 0x00, 0x00, 0x0E]);
        assert_eq!(enc("bsr $2000"), [0x61, 0x00, 0x0F, 0xFE]);
        assert_eq!(enc("dbra d0,$1000"), [0x51, 0xC8, 0xFF, 0xFE]);
        assert_eq!(err("bra $1001"), ErrorKind::OperandNotAligned);
        assert_eq!(err("bra.s $2000"), ErrorKind::OperandTooFar);
        assert_eq!(err("bra $20000"), ErrorKind::OperandTooFar);
        assert_eq!(err("bra.l $1010"), ErrorKind::IllegalSize);
    }

    #[test]
    fn undefined_branch_takes_word_form() {
        let out = Assembler::new(Config::new(Cpu::Mc68000))
            .unwrap()
            .encode(0x1000, "bra later", &NoSymbols);
        assert_eq!(out.bytes, [0x60, 0x00, 0xFF, 0xFE]);
        assert_eq!(out.error.map(|e| e.kind), Some(ErrorKind::UndefinedSymbol));
    }

    #[test]
    fn misc_control() {
        assert_eq!(enc("trap #15"), [0x4E, 0x4F]);
        assert_eq!(enc("unlk a6"), [0x4E, 0x5E]);
        assert_eq!(enc("rts"), [0x4E, 0x75]);
        assert_eq!(enc("illegal"), [0x4A, 0xFC]);
        assert_eq!(err("rts d0"), ErrorKind::OperandNotAllowed);
        assert_eq!(err("jmp d0"), ErrorKind::OperandNotAllowed);
        assert_eq!(err("move.l d0,4(a8)"), ErrorKind::UnknownRegister);
    }

    #[test]
    fn decode_basic() {
        assert_eq!(dis(&[0x4E, 0x75]), "rts");
        assert_eq!(dis(&[0x22, 0x00]), "move.l d0,d1");
        assert_eq!(dis(&[0x30, 0xBC, 0x12, 0x34]), "move.w #$1234,(a0)");
        assert_eq!(dis(&[0x70, 0xFF]), "moveq #-$1,d0");
        assert_eq!(dis(&[0x52, 0x43]), "addq.w #$1,d3");
        assert_eq!(dis(&[0x50, 0x43]), "addq.w #$8,d3");
        assert_eq!(dis(&[0xD6, 0x7C, 0x00, 0x01]), "add.w #$1,d3");
        assert_eq!(dis(&[0x22, 0x48]), "movea.l a0,a1");
        assert_eq!(dis(&[0x40, 0xC0]), "move sr,d0");
        assert_eq!(dis(&[0x00, 0x3C, 0x00, 0x10]), "ori #$10,ccr");
    }

    #[test]
    fn decode_addressing() {
        assert_eq!(dis(&[0x30, 0x2E, 0xFF, 0xFE]), "move.w -$2(a6),d0");
        assert_eq!(dis(&[0x20, 0x30, 0x18, 0x04]), "move.l $4(a0,d1.l),d0");
        assert_eq!(dis(&[0x4E, 0xB8, 0x12, 0x34]), "jsr $1234");
        assert_eq!(dis(&[0x42, 0x78, 0x80, 0x00]), "clr.w -$8000");
        assert_eq!(dis(&[0x4E, 0xF9, 0x00, 0x00, 0x12, 0x34]), "jmp $1234.l");
        assert_eq!(dis(&[0x41, 0xFA, 0x00, 0x0E]), "lea $1010(pc),a0");
        assert_eq!(dis(&[0x48, 0xE7, 0xF0, 0x80]), "movem.l d0-d3/a0,-(a7)");
        assert_eq!(dis(&[0x4C, 0xDF, 0x01, 0x0F]), "movem.l (a7)+,d0-d3/a0");
    }

    #[test]
    fn decode_register_mask_word() {
        assert_eq!(dis(&[0x48, 0x90, 0x00, 0x00]), "movem.w #$0,(a0)");
        assert_eq!(dis(&[0x48, 0x90, 0x00, 0x01]), "movem.w d0,(a0)");
        // The mask word is missing.
        assert_eq!(dis(&[0x48, 0x90]), "unknown");
    }

    #[test]
    fn decode_branches() {
        assert_eq!(dis(&[0x60, 0xFE]), "bra $1000");
        assert_eq!(dis(&[0x60, 0x00, 0x00, 0x00]), "bra $1002");
        assert_eq!(dis(&[0x66, 0x00, 0x00, 0x0E]), "bne.w $1010");
        assert_eq!(dis(&[0x51, 0xC8, 0xFF, 0xFE]), "dbra d0,$1000");
        assert_eq!(dis(&[0x60, 0xFF]), "unknown");
    }

    #[test]
    fn relative_targets_wrap_at_16m() {
        assert_eq!(enc_at(0xFF_FFF0, "bra $10"), [0x60, 0x1E]);
        assert_eq!(dis_at(0xFF_FFF0, &[0x60, 0x1E]), "bra $10");
        assert_eq!(enc_at(0xFF_FFF0, "lea $10(pc),a0"), [0x41, 0xFA, 0x00, 0x1E]);
        assert_eq!(dis_at(0xFF_FFF0, &[0x41, 0xFA, 0x00, 0x1E]), "lea $10(pc),a0");
        assert_eq!(enc_at(0xFF_FFF0, "dbra d0,$10"), [0x51, 0xC8, 0x00, 0x1E]);
    }

    #[test]
    fn decode_rejects_reserved() {
        assert_eq!(dis(&[0x4A, 0xC0]), "unknown");
        assert_eq!(dis(&[0x00, 0xC0]), "unknown");
        assert_eq!(dis(&[0x4E, 0xC0]), "unknown");
        assert_eq!(dis(&[0xFF, 0xFF]), "unknown");
        assert_eq!(dis(&[0x50, 0x08]), "unknown");
    }

    #[test]
    fn round_trip_text() {
        for line in [
            "move.l d0,d1",
            "move.b (a0)+,-(a1)",
            "addi.w #$FF,$10(a2)",
            "cmpi.l #$12345678,d7",
            "lea $1010(pc),a0",
            "lea $1010(pc,d0.w),a0",
            "movem.w d0/d2/a0-a2,-(a7)",
            "movem.l $4(a0),d0-d7",
            "asr.l #$3,d1",
            "rol.w d2,d3",
            "btst d1,(a0)",
            "bchg #$7,(a0)",
            "scc (a0)",
            "dbne d3,$1000",
            "bra $1100",
            "bra.w $1010",
            "swap d5",
            "exg a0,a1",
            "trap #$1",
            "eori #$FF,ccr",
        ] {
            let bytes = enc(line);
            assert_eq!(dis(&bytes), line, "{line}");
        }
    }

    #[test]
    fn table_masks_are_consistent() {
        for page in PAGES {
            for e in page.entries() {
                assert_eq!(e.opcode() & e.mask(), 0, "{e:?}");
            }
        }
    }
}
