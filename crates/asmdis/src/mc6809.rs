//! Motorola 6809 backend.
//!
//! One-operand instruction set over three opcode pages (unprefixed, `10`,
//! `11`). The whole operand field is parsed as a single operand: indexed
//! modes, register pairs and register lists all contain commas of their own.

use alloc::string::String;

use crate::assembler::Backend;
use crate::codec::check_range;
use crate::config::Config;
use crate::entry::{Entry, Flags, Isa, Page};
use crate::error::{AsmError, ErrorKind, Span};
use crate::expr::{parse_expr, span_since, EvalContext, Value};
use crate::format::TextOut;
use crate::insn::{AsmInsn, DecodeStage, DisInsn, EncodeStage, ResultExt};
use crate::lexer::{Cursor, Token, TokenKind};
use crate::resolver::{
    choose_width, fits_signed, relax_branch_in, sign_extend, Branch, Reach, Width,
};
use crate::search::{self, accept_slots, Found, Reject};

// ─── Vocabulary ─────────────────────────────────────────────────────────

/// Operand shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    None,
    /// `#value`
    Imm,
    /// Plain address; becomes `Dir` or `Ext` before the search.
    Addr,
    Dir,
    Ext,
    /// Indexed postbyte, direct or indirect.
    Idx,
    /// Branch target before the entry is known.
    Rel,
    Rel8,
    Rel16,
    /// `TFR`/`EXG` register pair.
    Pair,
    /// `PSH`/`PUL` register list.
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pos {
    None,
    /// Byte or word after the opcode, width from the entry size.
    Imm,
    /// One address byte.
    Byte,
    /// Two address bytes.
    Word,
    /// Indexed postbyte plus offset.
    Post,
    Rel,
    Pair,
    /// List pushed on or pulled from S.
    ListS,
    /// List pushed on or pulled from U.
    ListU,
}

/// Width of immediate data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Sz {
    None,
    Byte,
    Word,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct M6809;

impl Isa for M6809 {
    type Mode = Mode;
    type Pos = Pos;
    type Size = Sz;

    const NONE_MODE: Mode = Mode::None;
    const NONE_POS: Pos = Pos::None;

    fn operand_mask(_mode: Mode, _pos: Pos, _size: Sz) -> u16 {
        0
    }

    fn accept_mode(parsed: Mode, table: Mode) -> bool {
        parsed == table
            || (parsed == Mode::Rel && matches!(table, Mode::Rel8 | Mode::Rel16))
            || (parsed == Mode::Imm && table == Mode::List)
    }
}

// ─── Tables ─────────────────────────────────────────────────────────────

const fn one(name: &'static str, op: u16, mode: Mode, pos: Pos, size: Sz) -> Entry<M6809> {
    Entry::new(name, op, Flags::one(mode, pos, size))
}

const fn inh(name: &'static str, op: u16) -> Entry<M6809> {
    Entry::new(name, op, Flags::none(Sz::None))
}

const fn bcc(name: &'static str, op: u16) -> Entry<M6809> {
    one(name, op, Mode::Rel8, Pos::Rel, Sz::None)
}

const fn lbcc(name: &'static str, op: u16) -> Entry<M6809> {
    one(name, op, Mode::Rel16, Pos::Rel, Sz::None)
}

/// Immediate, direct, indexed and extended forms from the immediate opcode.
const fn mem(name: &'static str, base: u16, size: Sz) -> [Entry<M6809>; 4] {
    [
        one(name, base, Mode::Imm, Pos::Imm, size),
        one(name, base + 0x10, Mode::Dir, Pos::Byte, Sz::None),
        one(name, base + 0x20, Mode::Idx, Pos::Post, Sz::None),
        one(name, base + 0x30, Mode::Ext, Pos::Word, Sz::None),
    ]
}

/// Direct, indexed and extended forms for stores; `base` is the unused
/// immediate slot of the column.
const fn store(name: &'static str, base: u16) -> [Entry<M6809>; 3] {
    [
        one(name, base + 0x10, Mode::Dir, Pos::Byte, Sz::None),
        one(name, base + 0x20, Mode::Idx, Pos::Post, Sz::None),
        one(name, base + 0x30, Mode::Ext, Pos::Word, Sz::None),
    ]
}

/// Read-modify-write memory forms from the direct opcode.
const fn rmw(name: &'static str, base: u16) -> [Entry<M6809>; 3] {
    [
        one(name, base, Mode::Dir, Pos::Byte, Sz::None),
        one(name, base + 0x60, Mode::Idx, Pos::Post, Sz::None),
        one(name, base + 0x70, Mode::Ext, Pos::Word, Sz::None),
    ]
}

static INHERENT: [Entry<M6809>; 38] = [
    inh("NOP", 0x12),
    inh("SYNC", 0x13),
    inh("DAA", 0x19),
    inh("SEX", 0x1D),
    inh("RTS", 0x39),
    inh("ABX", 0x3A),
    inh("RTI", 0x3B),
    inh("MUL", 0x3D),
    inh("SWI", 0x3F),
    inh("NEGA", 0x40),
    inh("COMA", 0x43),
    inh("LSRA", 0x44),
    inh("RORA", 0x46),
    inh("ASRA", 0x47),
    inh("ASLA", 0x48),
    inh("ROLA", 0x49),
    inh("DECA", 0x4A),
    inh("INCA", 0x4C),
    inh("TSTA", 0x4D),
    inh("CLRA", 0x4F),
    inh("NEGB", 0x50),
    inh("COMB", 0x53),
    inh("LSRB", 0x54),
    inh("RORB", 0x56),
    inh("ASRB", 0x57),
    inh("ASLB", 0x58),
    inh("ROLB", 0x59),
    inh("DECB", 0x5A),
    inh("INCB", 0x5C),
    inh("TSTB", 0x5D),
    inh("CLRB", 0x5F),
    inh("LSLA", 0x48),
    inh("LSLB", 0x58),
    one("ORCC", 0x1A, Mode::Imm, Pos::Imm, Sz::Byte),
    one("ANDCC", 0x1C, Mode::Imm, Pos::Imm, Sz::Byte),
    one("CWAI", 0x3C, Mode::Imm, Pos::Imm, Sz::Byte),
    one("EXG", 0x1E, Mode::Pair, Pos::Pair, Sz::None),
    one("TFR", 0x1F, Mode::Pair, Pos::Pair, Sz::None),
];

static NEG: [Entry<M6809>; 3] = rmw("NEG", 0x00);
static COM: [Entry<M6809>; 3] = rmw("COM", 0x03);
static LSR: [Entry<M6809>; 3] = rmw("LSR", 0x04);
static ROR: [Entry<M6809>; 3] = rmw("ROR", 0x06);
static ASR: [Entry<M6809>; 3] = rmw("ASR", 0x07);
static ASL: [Entry<M6809>; 3] = rmw("ASL", 0x08);
static ROL: [Entry<M6809>; 3] = rmw("ROL", 0x09);
static DEC: [Entry<M6809>; 3] = rmw("DEC", 0x0A);
static INC: [Entry<M6809>; 3] = rmw("INC", 0x0C);
static TST: [Entry<M6809>; 3] = rmw("TST", 0x0D);
static JMP: [Entry<M6809>; 3] = rmw("JMP", 0x0E);
static CLR: [Entry<M6809>; 3] = rmw("CLR", 0x0F);
static LSL: [Entry<M6809>; 3] = rmw("LSL", 0x08);

static BRANCH: [Entry<M6809>; 21] = [
    bcc("BRA", 0x20),
    bcc("BRN", 0x21),
    bcc("BHI", 0x22),
    bcc("BLS", 0x23),
    bcc("BCC", 0x24),
    bcc("BCS", 0x25),
    bcc("BNE", 0x26),
    bcc("BEQ", 0x27),
    bcc("BVC", 0x28),
    bcc("BVS", 0x29),
    bcc("BPL", 0x2A),
    bcc("BMI", 0x2B),
    bcc("BGE", 0x2C),
    bcc("BLT", 0x2D),
    bcc("BGT", 0x2E),
    bcc("BLE", 0x2F),
    bcc("BSR", 0x8D),
    lbcc("LBRA", 0x16),
    lbcc("LBSR", 0x17),
    // Alternative names.
    bcc("BHS", 0x24),
    bcc("BLO", 0x25),
];

static STACK: [Entry<M6809>; 8] = [
    one("LEAX", 0x30, Mode::Idx, Pos::Post, Sz::None),
    one("LEAY", 0x31, Mode::Idx, Pos::Post, Sz::None),
    one("LEAS", 0x32, Mode::Idx, Pos::Post, Sz::None),
    one("LEAU", 0x33, Mode::Idx, Pos::Post, Sz::None),
    one("PSHS", 0x34, Mode::List, Pos::ListS, Sz::None),
    one("PULS", 0x35, Mode::List, Pos::ListS, Sz::None),
    one("PSHU", 0x36, Mode::List, Pos::ListU, Sz::None),
    one("PULU", 0x37, Mode::List, Pos::ListU, Sz::None),
];

static SUBA: [Entry<M6809>; 4] = mem("SUBA", 0x80, Sz::Byte);
static CMPA: [Entry<M6809>; 4] = mem("CMPA", 0x81, Sz::Byte);
static SBCA: [Entry<M6809>; 4] = mem("SBCA", 0x82, Sz::Byte);
static SUBD: [Entry<M6809>; 4] = mem("SUBD", 0x83, Sz::Word);
static ANDA: [Entry<M6809>; 4] = mem("ANDA", 0x84, Sz::Byte);
static BITA: [Entry<M6809>; 4] = mem("BITA", 0x85, Sz::Byte);
static LDA: [Entry<M6809>; 4] = mem("LDA", 0x86, Sz::Byte);
static STA: [Entry<M6809>; 3] = store("STA", 0x87);
static EORA: [Entry<M6809>; 4] = mem("EORA", 0x88, Sz::Byte);
static ADCA: [Entry<M6809>; 4] = mem("ADCA", 0x89, Sz::Byte);
static ORA: [Entry<M6809>; 4] = mem("ORA", 0x8A, Sz::Byte);
static ADDA: [Entry<M6809>; 4] = mem("ADDA", 0x8B, Sz::Byte);
static CMPX: [Entry<M6809>; 4] = mem("CMPX", 0x8C, Sz::Word);
static JSR: [Entry<M6809>; 3] = store("JSR", 0x8D);
static LDX: [Entry<M6809>; 4] = mem("LDX", 0x8E, Sz::Word);
static STX: [Entry<M6809>; 3] = store("STX", 0x8F);

static SUBB: [Entry<M6809>; 4] = mem("SUBB", 0xC0, Sz::Byte);
static CMPB: [Entry<M6809>; 4] = mem("CMPB", 0xC1, Sz::Byte);
static SBCB: [Entry<M6809>; 4] = mem("SBCB", 0xC2, Sz::Byte);
static ADDD: [Entry<M6809>; 4] = mem("ADDD", 0xC3, Sz::Word);
static ANDB: [Entry<M6809>; 4] = mem("ANDB", 0xC4, Sz::Byte);
static BITB: [Entry<M6809>; 4] = mem("BITB", 0xC5, Sz::Byte);
static LDB: [Entry<M6809>; 4] = mem("LDB", 0xC6, Sz::Byte);
static STB: [Entry<M6809>; 3] = store("STB", 0xC7);
static EORB: [Entry<M6809>; 4] = mem("EORB", 0xC8, Sz::Byte);
static ADCB: [Entry<M6809>; 4] = mem("ADCB", 0xC9, Sz::Byte);
static ORB: [Entry<M6809>; 4] = mem("ORB", 0xCA, Sz::Byte);
static ADDB: [Entry<M6809>; 4] = mem("ADDB", 0xCB, Sz::Byte);
static LDD: [Entry<M6809>; 4] = mem("LDD", 0xCC, Sz::Word);
static STD: [Entry<M6809>; 3] = store("STD", 0xCD);
static LDU: [Entry<M6809>; 4] = mem("LDU", 0xCE, Sz::Word);
static STU: [Entry<M6809>; 3] = store("STU", 0xCF);

static PAGE10_MISC: [Entry<M6809>; 18] = [
    lbcc("LBRN", 0x21),
    lbcc("LBHI", 0x22),
    lbcc("LBLS", 0x23),
    lbcc("LBCC", 0x24),
    lbcc("LBCS", 0x25),
    lbcc("LBNE", 0x26),
    lbcc("LBEQ", 0x27),
    lbcc("LBVC", 0x28),
    lbcc("LBVS", 0x29),
    lbcc("LBPL", 0x2A),
    lbcc("LBMI", 0x2B),
    lbcc("LBGE", 0x2C),
    lbcc("LBLT", 0x2D),
    lbcc("LBGT", 0x2E),
    lbcc("LBLE", 0x2F),
    inh("SWI2", 0x3F),
    lbcc("LBHS", 0x24),
    lbcc("LBLO", 0x25),
];

static CMPD: [Entry<M6809>; 4] = mem("CMPD", 0x83, Sz::Word);
static CMPY: [Entry<M6809>; 4] = mem("CMPY", 0x8C, Sz::Word);
static LDY: [Entry<M6809>; 4] = mem("LDY", 0x8E, Sz::Word);
static STY: [Entry<M6809>; 3] = store("STY", 0x8F);
static LDS: [Entry<M6809>; 4] = mem("LDS", 0xCE, Sz::Word);
static STS: [Entry<M6809>; 3] = store("STS", 0xCF);

static PAGE11_MISC: [Entry<M6809>; 1] = [inh("SWI3", 0x3F)];
static CMPU: [Entry<M6809>; 4] = mem("CMPU", 0x83, Sz::Word);
static CMPS: [Entry<M6809>; 4] = mem("CMPS", 0x8C, Sz::Word);

/// All pages in search order: unprefixed, then `10`, then `11`.
static PAGES: &[Page<M6809>] = &[
    Page::new(None, &INHERENT),
    Page::new(None, &NEG),
    Page::new(None, &COM),
    Page::new(None, &LSR),
    Page::new(None, &ROR),
    Page::new(None, &ASR),
    Page::new(None, &ASL),
    Page::new(None, &ROL),
    Page::new(None, &DEC),
    Page::new(None, &INC),
    Page::new(None, &TST),
    Page::new(None, &JMP),
    Page::new(None, &CLR),
    Page::new(None, &LSL),
    Page::new(None, &BRANCH),
    Page::new(None, &STACK),
    Page::new(None, &SUBA),
    Page::new(None, &CMPA),
    Page::new(None, &SBCA),
    Page::new(None, &SUBD),
    Page::new(None, &ANDA),
    Page::new(None, &BITA),
    Page::new(None, &LDA),
    Page::new(None, &STA),
    Page::new(None, &EORA),
    Page::new(None, &ADCA),
    Page::new(None, &ORA),
    Page::new(None, &ADDA),
    Page::new(None, &CMPX),
    Page::new(None, &JSR),
    Page::new(None, &LDX),
    Page::new(None, &STX),
    Page::new(None, &SUBB),
    Page::new(None, &CMPB),
    Page::new(None, &SBCB),
    Page::new(None, &ADDD),
    Page::new(None, &ANDB),
    Page::new(None, &BITB),
    Page::new(None, &LDB),
    Page::new(None, &STB),
    Page::new(None, &EORB),
    Page::new(None, &ADCB),
    Page::new(None, &ORB),
    Page::new(None, &ADDB),
    Page::new(None, &LDD),
    Page::new(None, &STD),
    Page::new(None, &LDU),
    Page::new(None, &STU),
    Page::new(Some(0x10), &PAGE10_MISC),
    Page::new(Some(0x10), &CMPD),
    Page::new(Some(0x10), &CMPY),
    Page::new(Some(0x10), &LDY),
    Page::new(Some(0x10), &STY),
    Page::new(Some(0x10), &LDS),
    Page::new(Some(0x10), &STS),
    Page::new(Some(0x11), &PAGE11_MISC),
    Page::new(Some(0x11), &CMPU),
    Page::new(Some(0x11), &CMPS),
];

// ─── Registers ──────────────────────────────────────────────────────────

/// Index registers by postbyte `rr` field.
/// The program counter wraps within 64K.
const ADDRESS_BITS: u32 = 16;

const INDEX: [&str; 4] = ["X", "Y", "U", "S"];

/// `TFR`/`EXG` register codes. 0-5 are 16-bit, 8-11 are 8-bit.
const PAIR_REGS: [(&str, u8); 11] = [
    ("D", 0x0),
    ("X", 0x1),
    ("Y", 0x2),
    ("U", 0x3),
    ("S", 0x4),
    ("PC", 0x5),
    ("A", 0x8),
    ("B", 0x9),
    ("CC", 0xA),
    ("DP", 0xB),
    ("PCR", 0x5),
];

/// Register-list bits while parsing. S and U get distinct bits here and
/// are folded into postbyte bit 6 once the stack is known.
const LIST_REGS: [(&str, u16); 10] = [
    ("CC", 0x001),
    ("A", 0x002),
    ("B", 0x004),
    ("D", 0x006),
    ("DP", 0x008),
    ("X", 0x010),
    ("Y", 0x020),
    ("U", 0x040),
    ("PC", 0x080),
    ("S", 0x100),
];

fn word_code(tok: &Token<'_>, table: &[(&str, u8)]) -> Option<u8> {
    if tok.kind != TokenKind::Ident {
        return None;
    }
    table
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(tok.text()))
        .map(|&(_, c)| c)
}

fn index_reg(tok: &Token<'_>) -> Option<u8> {
    if tok.kind != TokenKind::Ident {
        return None;
    }
    INDEX
        .iter()
        .position(|n| n.eq_ignore_ascii_case(tok.text()))
        .map(|i| i as u8)
}

// ─── Operands ───────────────────────────────────────────────────────────

/// Explicit size markers: `<<`, `<`, `>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Force {
    Five,
    Byte,
    Word,
}

/// Indexed offset widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Off {
    Zero,
    Five,
    Byte,
    Word,
}

impl Force {
    fn offset(self) -> Off {
        match self {
            Force::Five => Off::Five,
            Force::Byte => Off::Byte,
            Force::Word => Off::Word,
        }
    }
}

static OFFSET_WIDTHS: [Width<Off>; 4] = [
    Width::null(Off::Zero),
    Width::signed(Off::Five, 5),
    Width::signed(Off::Byte, 8),
    Width::new(Off::Word, -32768, 0xFFFF),
];

static INDIRECT_WIDTHS: [Width<Off>; 3] = [
    Width::null(Off::Zero),
    Width::signed(Off::Byte, 8),
    Width::new(Off::Word, -32768, 0xFFFF),
];

static PC_WIDTHS: [Width<Off>; 2] = [
    Width::signed(Off::Byte, 8),
    Width::new(Off::Word, -32768, 0xFFFF),
];

/// What an indexed operand refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Index {
    /// Postbyte with no offset bytes (`,R` `,R+` `A,R` ...).
    Fixed(u8),
    /// `n,R`
    Offset(u8),
    /// `n,PC`: raw offset.
    Pc,
    /// `label,PCR`: target address.
    Pcr,
    /// `[n]`
    ExtIndirect,
}

#[derive(Debug, Clone, Copy)]
struct Operand {
    mode: Mode,
    val: Value,
    force: Option<Force>,
    index: Index,
    indirect: bool,
    /// `TFR`/`EXG` postbyte.
    pair: u8,
    /// Register-list bits as parsed.
    list: u16,
    span: Span,
}

impl Operand {
    fn none() -> Self {
        Self {
            mode: Mode::None,
            val: Value::new(0),
            force: None,
            index: Index::Fixed(0x84),
            indirect: false,
            pair: 0,
            list: 0,
            span: Span::dummy(),
        }
    }
}

/// How the operand field of a mnemonic is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Syntax {
    General,
    Branch,
    Pair,
    List,
}

fn parse_pair(cur: &mut Cursor<'_, '_>, op: &mut Operand) -> Result<(), AsmError> {
    let first = cur.advance();
    let src = word_code(first, &PAIR_REGS)
        .ok_or_else(|| AsmError::new(ErrorKind::UnknownRegister, first.span))?;
    cur.expect(TokenKind::Comma, ErrorKind::MissingOperand)?;
    let second = cur.advance();
    let dst = word_code(second, &PAIR_REGS)
        .ok_or_else(|| AsmError::new(ErrorKind::UnknownRegister, second.span))?;
    if (src >= 8) != (dst >= 8) {
        return Err(AsmError::new(ErrorKind::IllegalSize, second.span));
    }
    op.pair = (src << 4) | dst;
    op.mode = Mode::Pair;
    Ok(())
}

fn parse_list(cur: &mut Cursor<'_, '_>, op: &mut Operand) -> Result<(), AsmError> {
    loop {
        let tok = cur.advance();
        let bits = word_code16(tok)
            .ok_or_else(|| AsmError::new(ErrorKind::UnknownRegister, tok.span))?;
        if op.list & bits != 0 {
            return Err(AsmError::new(ErrorKind::DuplicateRegister, tok.span));
        }
        op.list |= bits;
        if !cur.eat(TokenKind::Comma) {
            break;
        }
    }
    op.mode = Mode::List;
    Ok(())
}

fn word_code16(tok: &Token<'_>) -> Option<u16> {
    if tok.kind != TokenKind::Ident {
        return None;
    }
    LIST_REGS
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(tok.text()))
        .map(|&(_, b)| b)
}

/// Address, direct/extended or indexed operand, optionally inside `[ ]`.
fn parse_address(
    cur: &mut Cursor<'_, '_>,
    ctx: &EvalContext<'_>,
    op: &mut Operand,
) -> Result<(), AsmError> {
    let marker = cur.span();
    op.force = match cur.kind() {
        TokenKind::LShift => Some(Force::Five),
        TokenKind::Lt => Some(Force::Byte),
        TokenKind::Gt => Some(Force::Word),
        _ => None,
    };
    if op.force.is_some() {
        cur.advance();
    }

    if cur.eat(TokenKind::Comma) {
        if op.force.is_some() {
            return Err(AsmError::new(ErrorKind::IllegalOperandMode, marker));
        }
        let mut dec = 0;
        while dec < 2 && cur.eat(TokenKind::Minus) {
            dec += 1;
        }
        let tok = cur.advance();
        let rr = index_reg(tok)
            .ok_or_else(|| AsmError::new(ErrorKind::UnknownRegister, tok.span))?;
        let mut inc = 0;
        while inc < 2 && cur.eat(TokenKind::Plus) {
            inc += 1;
        }
        let post = match (dec, inc) {
            (0, 0) => 0x84,
            (0, 1) => 0x80,
            (0, 2) => 0x81,
            (1, 0) => 0x82,
            (2, 0) => 0x83,
            _ => return Err(AsmError::new(ErrorKind::IllegalOperandMode, tok.span)),
        };
        if op.indirect && (post == 0x80 || post == 0x82) {
            return Err(AsmError::new(ErrorKind::IllegalOperandMode, tok.span));
        }
        op.index = Index::Fixed(post | (rr << 5));
        op.mode = Mode::Idx;
        return Ok(());
    }

    let tok = cur.peek();
    let acc = if cur.peek_at(1).kind == TokenKind::Comma && op.force.is_none() {
        if tok.is_word("A") {
            Some(0x86)
        } else if tok.is_word("B") {
            Some(0x85)
        } else if tok.is_word("D") {
            Some(0x8B)
        } else {
            None
        }
    } else {
        None
    };
    if let Some(post) = acc {
        cur.advance();
        cur.advance();
        let reg = cur.advance();
        let rr = index_reg(reg)
            .ok_or_else(|| AsmError::new(ErrorKind::UnknownRegister, reg.span))?;
        op.index = Index::Fixed(post | (rr << 5));
        op.mode = Mode::Idx;
        return Ok(());
    }

    op.val = parse_expr(cur, ctx)?;
    if cur.eat(TokenKind::Comma) {
        let reg = cur.advance();
        op.index = if let Some(rr) = index_reg(reg) {
            Index::Offset(rr)
        } else if reg.is_word("PCR") {
            Index::Pcr
        } else if reg.is_word("PC") {
            Index::Pc
        } else {
            return Err(AsmError::new(ErrorKind::UnknownRegister, reg.span));
        };
        op.mode = Mode::Idx;
    } else if op.indirect {
        if matches!(op.force, Some(Force::Five | Force::Byte)) {
            return Err(AsmError::new(ErrorKind::IllegalOperandMode, marker));
        }
        op.index = Index::ExtIndirect;
        op.mode = Mode::Idx;
    } else {
        op.mode = match op.force {
            None => Mode::Addr,
            Some(Force::Byte) => Mode::Dir,
            Some(Force::Word) => Mode::Ext,
            Some(Force::Five) => {
                return Err(AsmError::new(ErrorKind::IllegalOperandMode, marker))
            }
        };
    }
    Ok(())
}

fn parse_operand(
    cur: &mut Cursor<'_, '_>,
    ctx: &EvalContext<'_>,
    syntax: Syntax,
) -> Result<Operand, AsmError> {
    let start = cur.span();
    let mut op = Operand::none();
    if cur.eat(TokenKind::Hash) {
        op.val = parse_expr(cur, ctx)?;
        op.mode = Mode::Imm;
    } else {
        match syntax {
            Syntax::Pair => parse_pair(cur, &mut op)?,
            Syntax::List => parse_list(cur, &mut op)?,
            Syntax::Branch => {
                op.val = parse_expr(cur, ctx)?;
                op.mode = Mode::Rel;
            }
            Syntax::General => {
                if cur.eat(TokenKind::OpenBracket) {
                    op.indirect = true;
                    parse_address(cur, ctx, &mut op)?;
                    cur.expect(TokenKind::CloseBracket, ErrorKind::UnknownOperand)?;
                } else {
                    parse_address(cur, ctx, &mut op)?;
                }
            }
        }
    }
    op.span = span_since(start, cur);
    Ok(op)
}

// ─── Backend ────────────────────────────────────────────────────────────

/// The 6809 backend.
#[derive(Debug)]
pub(crate) struct Mc6809 {
    direct_page: u8,
    long_branch: bool,
}

impl Mc6809 {
    pub(crate) fn new(config: &Config) -> Self {
        Self {
            direct_page: config.direct_page(),
            long_branch: config.long_branch(),
        }
    }

    fn has_form(name: &str, mode: Mode) -> bool {
        search::name_accepts(name, PAGES, |e| e.slot(0).mode == mode)
    }

    fn syntax(name: &str) -> Syntax {
        if Self::has_form(name, Mode::Rel8) || Self::has_form(name, Mode::Rel16) {
            Syntax::Branch
        } else if Self::has_form(name, Mode::Pair) {
            Syntax::Pair
        } else if Self::has_form(name, Mode::List) {
            Syntax::List
        } else {
            Syntax::General
        }
    }

    fn find(name: &str, mode: Mode) -> Result<Found<M6809>, Reject> {
        let parsed = [mode, Mode::None, Mode::None];
        search::search_name(name, PAGES, |e| accept_slots(&parsed, e))
    }

    /// Whether `value` is reachable through the direct page.
    fn on_direct_page(&self, value: i64) -> bool {
        (0..=0xFFFF).contains(&value) && (value >> 8) as u8 == self.direct_page
    }

    /// Entry and displacement for a branch, promoting to the long form when
    /// enabled.
    fn branch(
        &self,
        insn: &AsmInsn,
        name: &str,
        op: &Operand,
    ) -> Result<(Found<M6809>, Branch<Mode>), AsmError> {
        let reject = |r: Reject| AsmError::new(r.kind, op.span);
        let found = Self::find(name, Mode::Rel).map_err(reject)?;
        let short = found.entry.slot(0).mode == Mode::Rel8;
        let long_name = || {
            let mut s = String::with_capacity(5);
            s.push('L');
            s.push_str(name);
            s
        };
        if short && self.long_branch {
            let promote = |found: Found<M6809>| -> Result<_, AsmError> {
                let b = self.relax(insn, found, op).at(op.span)?;
                Ok((found, b))
            };
            if op.val.undefined {
                if let Ok(long) = Self::find(&long_name(), Mode::Rel) {
                    return promote(long);
                }
            }
            return match self.relax(insn, found, op) {
                Ok(b) => Ok((found, b)),
                Err(ErrorKind::OperandTooFar) => match Self::find(&long_name(), Mode::Rel) {
                    Ok(long) => promote(long),
                    Err(_) => Err(AsmError::new(ErrorKind::OperandTooFar, op.span)),
                },
                Err(k) => Err(AsmError::new(k, op.span)),
            };
        }
        let b = self.relax(insn, found, op).at(op.span)?;
        Ok((found, b))
    }

    /// Displacement from the end of `found` to the operand target. An
    /// undefined target branches to the next instruction.
    fn relax(
        &self,
        insn: &AsmInsn,
        found: Found<M6809>,
        op: &Operand,
    ) -> Result<Branch<Mode>, ErrorKind> {
        let mode = found.entry.slot(0).mode;
        let (bits, width) = if mode == Mode::Rel8 { (8, 1) } else { (16, 2) };
        let pc = insn.len() as i64 + i64::from(found.prefix.is_some()) + 1 + width;
        let address = insn.address() as i64;
        let target = if op.val.undefined {
            address + pc
        } else {
            check_range(op.val.value, ADDRESS_BITS)?;
            op.val.value
        };
        relax_branch_in(ADDRESS_BITS, address, target, 1, &[Reach::new(mode, bits, pc)], None)
    }

    fn emit_indexed(&self, insn: &mut AsmInsn, op: &Operand) -> Result<(), AsmError> {
        let ind = if op.indirect { 0x10 } else { 0 };
        let v = op.val.value;
        let span = op.span;
        match op.index {
            Index::Fixed(post) => insn.emit_u8(post | ind).at(span),
            Index::ExtIndirect => {
                check_range(v, 16).at(span)?;
                insn.emit_u8(0x9F).at(span)?;
                insn.emit_u16(v as u16).at(span)
            }
            Index::Offset(rr) => {
                let widths: &[Width<Off>] = if op.indirect {
                    &INDIRECT_WIDTHS
                } else {
                    &OFFSET_WIDTHS
                };
                let forced = op.force.map(Force::offset);
                let rr = rr << 5;
                match choose_width(v, op.val.undefined, widths, forced).at(span)? {
                    Off::Zero => insn.emit_u8(0x84 | rr | ind).at(span),
                    Off::Five => insn.emit_u8(rr | (v as u8 & 0x1F)).at(span),
                    Off::Byte => {
                        insn.emit_u8(0x88 | rr | ind).at(span)?;
                        insn.emit_u8(v as u8).at(span)
                    }
                    Off::Word => {
                        insn.emit_u8(0x89 | rr | ind).at(span)?;
                        insn.emit_u16(v as u16).at(span)
                    }
                }
            }
            Index::Pc => {
                let forced = op.force.map(Force::offset);
                match choose_width(v, op.val.undefined, &PC_WIDTHS, forced).at(span)? {
                    Off::Byte => {
                        insn.emit_u8(0x8C | ind).at(span)?;
                        insn.emit_u8(v as u8).at(span)
                    }
                    _ => {
                        insn.emit_u8(0x8D | ind).at(span)?;
                        insn.emit_u16(v as u16).at(span)
                    }
                }
            }
            Index::Pcr => {
                let len = insn.len() as i64;
                let reaches = [
                    Reach::new(Off::Byte, 8, len + 2),
                    Reach::new(Off::Word, 16, len + 3),
                ];
                let address = insn.address() as i64;
                let (target, forced) = if op.val.undefined {
                    (address, Some(op.force.map_or(Off::Word, Force::offset)))
                } else {
                    check_range(v, ADDRESS_BITS).at(span)?;
                    (v, op.force.map(Force::offset))
                };
                let b = relax_branch_in(ADDRESS_BITS, address, target, 1, &reaches, forced).at(span)?;
                if b.size == Off::Byte {
                    insn.emit_u8(0x8C | ind).at(span)?;
                    insn.emit_u8(b.delta as u8).at(span)
                } else {
                    insn.emit_u8(0x8D | ind).at(span)?;
                    insn.emit_u16(b.delta as u16).at(span)
                }
            }
        }
    }

    fn emit_list(&self, insn: &mut AsmInsn, pos: Pos, op: &Operand) -> Result<(), AsmError> {
        if op.mode == Mode::Imm {
            check_range(op.val.value, 8).at(op.span)?;
            return insn.emit_u8(op.val.value as u8).at(op.span);
        }
        let (own, other) = if pos == Pos::ListS { (0x100, 0x040) } else { (0x040, 0x100) };
        if op.list & own != 0 {
            return Err(AsmError::new(ErrorKind::RegisterNotAllowed, op.span));
        }
        let mut byte = (op.list & 0xBF) as u8;
        if op.list & other != 0 {
            byte |= 0x40;
        }
        insn.emit_u8(byte).at(op.span)
    }
}

impl Backend for Mc6809 {
    fn encode(
        &self,
        insn: &mut AsmInsn,
        name: &Token<'_>,
        cur: &mut Cursor<'_, '_>,
        ctx: &EvalContext<'_>,
    ) -> Result<(), AsmError> {
        let mnemonic = name.text();
        let mut op = Operand::none();
        if !cur.at_end() {
            op = parse_operand(cur, ctx, Self::syntax(mnemonic))?;
            insn.note_undefined(&op.val, op.span);
        }

        if op.mode == Mode::Addr {
            let direct = !op.val.undefined
                && self.on_direct_page(op.val.value)
                && Self::has_form(mnemonic, Mode::Dir);
            op.mode = if direct { Mode::Dir } else { Mode::Ext };
        }

        let (found, branch) = if op.mode == Mode::Rel {
            let (found, b) = self.branch(insn, mnemonic, &op)?;
            (found, Some(b))
        } else {
            let found = Self::find(mnemonic, op.mode).map_err(|r| {
                let span = if r.slot.is_some() { op.span } else { name.span };
                AsmError::new(r.kind, span)
            })?;
            (found, None)
        };
        insn.advance(EncodeStage::NameResolved);
        insn.advance(EncodeStage::AddrModeDetermined);

        let entry = found.entry;
        if let Some(prefix) = found.prefix {
            insn.emit_u8(prefix).at(name.span)?;
        }
        insn.emit_u8(entry.opcode() as u8).at(name.span)?;

        let slot = entry.slot(0);
        let v = op.val.value;
        match slot.pos {
            Pos::None => {}
            Pos::Imm => {
                if entry.size() == Sz::Word {
                    check_range(v, 16).at(op.span)?;
                    insn.emit_u16(v as u16).at(op.span)?;
                } else {
                    check_range(v, 8).at(op.span)?;
                    insn.emit_u8(v as u8).at(op.span)?;
                }
            }
            Pos::Byte => {
                let ok = op.val.undefined || (0..=0xFF).contains(&v) || self.on_direct_page(v);
                if !ok {
                    return Err(AsmError::new(ErrorKind::OverflowRange, op.span));
                }
                insn.emit_u8(v as u8).at(op.span)?;
            }
            Pos::Word => {
                check_range(v, 16).at(op.span)?;
                insn.emit_u16(v as u16).at(op.span)?;
            }
            Pos::Post => self.emit_indexed(insn, &op)?,
            Pos::Rel => {
                let delta = branch.map_or(0, |b| b.delta);
                if slot.mode == Mode::Rel8 {
                    insn.emit_u8(delta as u8).at(op.span)?;
                } else {
                    insn.emit_u16(delta as u16).at(op.span)?;
                }
            }
            Pos::Pair => insn.emit_u8(op.pair).at(op.span)?,
            Pos::ListS | Pos::ListU => self.emit_list(insn, slot.pos, &op)?,
        }
        insn.advance(EncodeStage::OperandsEncoded);
        Ok(())
    }

    fn decode(&self, insn: &mut DisInsn<'_>, out: &mut TextOut) -> Result<(), ErrorKind> {
        let first = insn.read_u8()?;
        let (prefix, opcode) = if search::is_prefix(first, PAGES) {
            (Some(first), insn.read_u8()?)
        } else {
            (None, first)
        };
        insn.advance(DecodeStage::OpcodeRead);
        let found = search::search_opcode(prefix, u16::from(opcode), PAGES, |_| true)?;
        insn.advance(DecodeStage::EntryResolved);
        let entry = found.entry;
        out.name(entry.name());

        let slot = entry.slot(0);
        if slot.is_none() {
            insn.advance(DecodeStage::OperandsDecoded);
            return Ok(());
        }
        out.gap();
        match slot.pos {
            Pos::Imm => {
                let v = if entry.size() == Sz::Word {
                    u64::from(insn.read_u16()?)
                } else {
                    u64::from(insn.read_u8()?)
                };
                out.ch('#').hex(v);
            }
            Pos::Byte => {
                out.ch('<').hex(u64::from(insn.read_u8()?));
            }
            Pos::Word => {
                let addr = insn.read_u16()?;
                if self.on_direct_page(i64::from(addr)) && Self::has_form(entry.name(), Mode::Dir) {
                    out.ch('>');
                }
                out.hex(u64::from(addr));
            }
            Pos::Rel => {
                let delta = if slot.mode == Mode::Rel8 {
                    sign_extend(u64::from(insn.read_u8()?), 8)
                } else {
                    sign_extend(u64::from(insn.read_u16()?), 16)
                };
                let target = (insn.address() as i64 + insn.len() as i64 + delta) & 0xFFFF;
                out.hex(target as u64);
            }
            Pos::Post => self.decode_indexed(insn, out)?,
            Pos::Pair => {
                let post = insn.read_u8()?;
                let name = |code: u8| PAIR_REGS.iter().find(|&&(_, c)| c == code).map(|&(n, _)| n);
                let (src, dst) = (post >> 4, post & 0x0F);
                match (name(src), name(dst)) {
                    (Some(s), Some(d)) if (src >= 8) == (dst >= 8) => {
                        out.name(s).ch(',').name(d);
                    }
                    _ => return Err(ErrorKind::UnknownRegister),
                }
            }
            Pos::ListS | Pos::ListU => {
                let mask = insn.read_u8()?;
                if mask == 0 {
                    out.ch('#').hex(0);
                } else {
                    let other = if slot.pos == Pos::ListS { "U" } else { "S" };
                    let order = [
                        (0x01, "CC"),
                        (0x02, "A"),
                        (0x04, "B"),
                        (0x08, "DP"),
                        (0x10, "X"),
                        (0x20, "Y"),
                        (0x40, other),
                        (0x80, "PC"),
                    ];
                    let mut first = true;
                    for (bit, reg) in order {
                        if mask & bit != 0 {
                            if !first {
                                out.ch(',');
                            }
                            out.name(reg);
                            first = false;
                        }
                    }
                }
            }
            Pos::None => {}
        }
        insn.advance(DecodeStage::OperandsDecoded);
        Ok(())
    }
}

impl Mc6809 {
    fn decode_indexed(&self, insn: &mut DisInsn<'_>, out: &mut TextOut) -> Result<(), ErrorKind> {
        let post = insn.read_u8()?;
        let reg = INDEX[usize::from((post >> 5) & 3)];
        if post & 0x80 == 0 {
            let n = sign_extend(u64::from(post & 0x1F), 5);
            if n == 0 {
                out.text("<<");
            }
            out.dec(n).ch(',').name(reg);
            return Ok(());
        }
        let indirect = post & 0x10 != 0;
        if indirect {
            out.ch('[');
        }
        match post & 0x0F {
            0x00 | 0x02 if indirect => return Err(ErrorKind::IllegalOperandMode),
            0x00 => {
                out.ch(',').name(reg).ch('+');
            }
            0x01 => {
                out.ch(',').name(reg).text("++");
            }
            0x02 => {
                out.ch(',').ch('-').name(reg);
            }
            0x03 => {
                out.ch(',').text("--").name(reg);
            }
            0x04 => {
                out.ch(',').name(reg);
            }
            0x05 => {
                out.name("B").ch(',').name(reg);
            }
            0x06 => {
                out.name("A").ch(',').name(reg);
            }
            0x0B => {
                out.name("D").ch(',').name(reg);
            }
            0x08 => {
                let n = sign_extend(u64::from(insn.read_u8()?), 8);
                if n == 0 || (!indirect && fits_signed(n, 5)) {
                    out.ch('<');
                }
                out.dec(n).ch(',').name(reg);
            }
            0x09 => {
                let n = sign_extend(u64::from(insn.read_u16()?), 16);
                if fits_signed(n, 8) {
                    out.ch('>');
                }
                out.dec(n).ch(',').name(reg);
            }
            0x0C => {
                let n = sign_extend(u64::from(insn.read_u8()?), 8);
                let target = (insn.address() as i64 + insn.len() as i64 + n) & 0xFFFF;
                out.hex(target as u64).ch(',').name("PCR");
            }
            0x0D => {
                let n = sign_extend(u64::from(insn.read_u16()?), 16);
                let end = insn.address() as i64 + insn.len() as i64;
                let target = (end + n) & 0xFFFF;
                // One byte shorter with an 8-bit offset.
                if fits_signed(target - (end - 1), 8) {
                    out.ch('>');
                }
                out.hex(target as u64).ch(',').name("PCR");
            }
            0x0F if indirect => {
                out.hex(u64::from(insn.read_u16()?));
            }
            _ => return Err(ErrorKind::IllegalOperandMode),
        }
        if indirect {
            out.ch(']');
        }
        Ok(())
    }
}
