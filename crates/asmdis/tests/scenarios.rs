#![cfg(not(target_arch = "wasm32"))]
//! Behaviour that holds across targets: branch sizing, table priority,
//! configuration-gated entries and determinism.

use asmdis::entry::{Entry, Flags, Isa, Page, Slot};
use asmdis::search::{accept_slots, search_name, search_opcode};
use asmdis::{assemble_line, disassemble, Assembler, Config, Cpu, ErrorKind, NoSymbols};

// ── Branch sizing ───────────────────────────────────────────────────────

#[test]
fn branch_to_self_uses_short_form() {
    let out = assemble_line(Cpu::I8086, 0x100, "jmp $").unwrap();
    assert_eq!(out.bytes, [0xEB, 0xFE]);
    assert_eq!(out.address, 0x100);

    let out = assemble_line(Cpu::Mc6809, 0x100, "bra *").unwrap();
    assert_eq!(out.bytes, [0x20, 0xFE]);
}

#[test]
fn smallest_reaching_branch_wins() {
    assert_eq!(assemble_line(Cpu::I8086, 0, "jmp 100").unwrap().bytes, [0xEB, 0x62]);
    assert_eq!(
        assemble_line(Cpu::I8086, 0, "jmp 200").unwrap().bytes,
        [0xE9, 0xC5, 0x00]
    );
    assert_eq!(
        assemble_line(Cpu::Mc68000, 0x1000, "bra $1002").unwrap().bytes,
        [0x60, 0x00, 0x00, 0x00]
    );
}

#[test]
fn forced_short_branch_out_of_range() {
    for (cpu, addr, line) in [
        (Cpu::I8086, 0, "jmp short 200"),
        (Cpu::I8086, 0, "jnz 200"),
        (Cpu::Mc6809, 0, "beq $200"),
        (Cpu::Mc68000, 0x1000, "bra.s $2000"),
        (Cpu::Mc68000, 0x1000, "bra $20000"),
    ] {
        let out = assemble_line(cpu, addr, line).unwrap();
        assert_eq!(out.error.map(|e| e.kind), Some(ErrorKind::OperandTooFar), "{line}");
        assert!(!out.is_ok());
    }
}

#[test]
fn relative_operands_round_trip_across_the_top_of_memory() {
    let code = [0x20, 0x1A, 0x30, 0x8C, 0x10, 0x16, 0x00, 0x10];
    let lines = disassemble(Cpu::Mc6809, 0xFFF0, &code).unwrap();
    let texts: Vec<&str> = lines.iter().map(|d| d.text.as_str()).collect();
    assert_eq!(texts, ["bra $C", "leax $5,pcr", "lbra $8"]);
    for d in &lines {
        let out = assemble_line(Cpu::Mc6809, d.address, &d.text).unwrap();
        assert!(out.is_ok(), "`{}`: {:?}", d.text, out.error);
        assert_eq!(out.bytes, d.bytes, "`{}` at {:#x}", d.text, d.address);
    }

    let lines = disassemble(Cpu::Mc68000, 0xFF_FFF0, &[0x60, 0x1E, 0x41, 0xFA, 0x00, 0x1A]).unwrap();
    for d in &lines {
        let out = assemble_line(Cpu::Mc68000, d.address, &d.text).unwrap();
        assert_eq!(out.bytes, d.bytes, "`{}` at {:#x}", d.text, d.address);
    }
}

// ── Configuration-gated entries ─────────────────────────────────────────

#[test]
fn quick_alias_follows_configuration() {
    let with = Assembler::new(Config::new(Cpu::Mc68000)).unwrap();
    assert_eq!(with.encode(0, "add #1,d3", &NoSymbols).bytes, [0x52, 0x43]);

    let without = Assembler::new(Config::new(Cpu::Mc68000).with_alias_entries(false)).unwrap();
    assert_eq!(
        without.encode(0, "add #1,d3", &NoSymbols).bytes,
        [0xD6, 0x7C, 0x00, 0x01]
    );

    // Both spellings decode to their canonical mnemonic.
    let lines = disassemble(Cpu::Mc68000, 0, &[0x52, 0x43, 0xD6, 0x7C, 0x00, 0x01]).unwrap();
    let text: Vec<_> = lines.iter().map(|d| d.text.as_str()).collect();
    assert_eq!(text, ["addq.w #$1,d3", "add.w #$1,d3"]);
}

#[test]
fn direct_page_register_selects_short_addressing() {
    let asm = Assembler::new(Config::new(Cpu::Mc6809).with_direct_page(0x12)).unwrap();
    assert_eq!(asm.encode(0, "lda $1234", &NoSymbols).bytes, [0x96, 0x34]);
    assert_eq!(asm.encode(0, "lda $0034", &NoSymbols).bytes, [0xB6, 0x00, 0x34]);
}

// ── Table priority ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    None,
    Acc,
    Reg,
    Imm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pos {
    None,
    Low3,
    Byte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Demo;

impl Isa for Demo {
    type Mode = Mode;
    type Pos = Pos;
    type Size = u8;

    const NONE_MODE: Mode = Mode::None;
    const NONE_POS: Pos = Pos::None;

    fn operand_mask(_mode: Mode, pos: Pos, _size: u8) -> u16 {
        match pos {
            Pos::Low3 => 0x07,
            Pos::None | Pos::Byte => 0,
        }
    }

    fn accept_mode(parsed: Mode, table: Mode) -> bool {
        parsed == table || (table == Mode::Reg && parsed == Mode::Acc)
    }
}

static LOADS: [Entry<Demo>; 2] = [
    Entry::new(
        "LD",
        0x10,
        Flags::two(Slot::new(Mode::Acc, Pos::None), Slot::new(Mode::Imm, Pos::Byte), 1),
    ),
    Entry::new(
        "LD",
        0x18,
        Flags::two(Slot::new(Mode::Reg, Pos::Low3), Slot::new(Mode::Imm, Pos::Byte), 1),
    ),
];

static PAGES: [Page<Demo>; 1] = [Page::new(None, &LOADS)];

#[test]
fn first_accepting_entry_wins() {
    let acc = [Mode::Acc, Mode::Imm, Mode::None];
    let found = search_name("ld", &PAGES, |e| accept_slots(&acc, e)).unwrap();
    assert_eq!(found.entry.opcode(), 0x10);

    let reg = [Mode::Reg, Mode::Imm, Mode::None];
    let found = search_name("ld", &PAGES, |e| accept_slots(&reg, e)).unwrap();
    assert_eq!(found.entry.opcode(), 0x18);
}

#[test]
fn name_search_reports_best_rejection() {
    let missing = [Mode::Reg, Mode::None, Mode::None];
    let reject = search_name("ld", &PAGES, |e| accept_slots(&missing, e)).unwrap_err();
    assert_eq!(reject.kind, ErrorKind::MissingOperand);
    assert_eq!(reject.slot, Some(1));

    let reject = search_name("st", &PAGES, |e| accept_slots(&missing, e)).unwrap_err();
    assert_eq!(reject.kind, ErrorKind::UnknownInstruction);
}

#[test]
fn opcode_search_masks_operand_bits() {
    let found = search_opcode(None, 0x1B, &PAGES, |_| true).unwrap();
    assert_eq!(found.entry.opcode(), 0x18);
    assert_eq!(found.prefix, None);
    assert_eq!(
        search_opcode(Some(0x10), 0x18, &PAGES, |_| true).unwrap_err(),
        ErrorKind::UnknownInstruction
    );
}

// ── Determinism ─────────────────────────────────────────────────────────

#[test]
fn encoding_is_deterministic() {
    let a = Assembler::new(Config::new(Cpu::Mc68000)).unwrap();
    let b = Assembler::new(Config::new(Cpu::Mc68000)).unwrap();
    for line in ["movem.l d0-d3/a0,-(sp)", "bra $1100", "add #1,d3", "bogus"] {
        let first = a.encode(0x1000, line, &NoSymbols);
        assert_eq!(first, a.encode(0x1000, line, &NoSymbols), "{line}");
        assert_eq!(first, b.encode(0x1000, line, &NoSymbols), "{line}");
    }
}

#[test]
fn decoding_is_deterministic() {
    let bytes = [0x10, 0x27, 0x01, 0xFC, 0x87, 0xA6, 0x84];
    let first = disassemble(Cpu::Mc6809, 0, &bytes).unwrap();
    assert_eq!(first, disassemble(Cpu::Mc6809, 0, &bytes).unwrap());
    let consumed: usize = first.iter().map(|d| d.len()).sum();
    assert_eq!(consumed, bytes.len());
}
