//! Performance benchmarks for `asmdis`.
//!
//! Measures:
//! - Single instruction latency (per target)
//! - Line throughput when encoding a block with one assembler
//! - Decode throughput over a block of machine code
//! - Setup cost of the one-shot helpers versus a reused assembler
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use asmdis::{assemble_line, disassemble, Assembler, Config, Cpu, NoSymbols, Symbols};

// ─── Single-Instruction Latency ─────────────────────────────────────────

fn bench_single_instruction(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_instruction");

    let cases = [
        ("i8086_mov_reg_imm", Cpu::I8086, "mov bx, 1234h"),
        ("i8086_mov_mem", Cpu::I8086, "mov word ptr [bx+di+10h], 1234h"),
        ("i8086_jmp", Cpu::I8086, "jmp 200"),
        ("mc6809_lda_imm", Cpu::Mc6809, "lda #$12"),
        ("mc6809_lda_indexed", Cpu::Mc6809, "lda [1000,s]"),
        ("mc68000_move", Cpu::Mc68000, "move.l 4(a0,d1.l),d0"),
        ("mc68000_movem", Cpu::Mc68000, "movem.l d0-d3/a0,-(sp)"),
        ("mc68000_quick_alias", Cpu::Mc68000, "add #1,d3"),
    ];
    for (name, cpu, line) in cases {
        let asm = Assembler::new(Config::new(cpu)).unwrap();
        group.bench_function(name, |b| {
            b.iter(|| asm.encode(0x1000, black_box(line), &NoSymbols))
        });
    }

    group.finish();
}

// ─── Encode Throughput ──────────────────────────────────────────────────

fn i8086_block(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| match i % 5 {
            0 => "mov ax, bx".to_string(),
            1 => format!("add cx, {}", i),
            2 => format!("mov [bx+si+{}], dx", i % 100),
            3 => format!("jmp {}", i * 3),
            _ => "rep movsb".to_string(),
        })
        .collect()
}

fn mc6809_block(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| match i % 4 {
            0 => format!("lda #{}", i % 256),
            1 => format!("ldx ${:X}", i * 7),
            2 => format!("sta {},y", i % 64),
            _ => "pshs a,b,x".to_string(),
        })
        .collect()
}

fn mc68000_block(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| match i % 4 {
            0 => "move.l d0,d1".to_string(),
            1 => format!("addq.w #{},d{}", i % 8 + 1, i % 8),
            2 => format!("move.w {}(a6),d0", i * 2),
            _ => format!("lea ${:X}(pc),a0", 0x1000 + i * 2),
        })
        .collect()
}

fn bench_encode_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_throughput");

    let blocks = [
        ("i8086_1000_lines", Cpu::I8086, i8086_block(1000)),
        ("mc6809_1000_lines", Cpu::Mc6809, mc6809_block(1000)),
        ("mc68000_1000_lines", Cpu::Mc68000, mc68000_block(1000)),
    ];
    for (name, cpu, lines) in &blocks {
        let asm = Assembler::new(Config::new(*cpu)).unwrap();
        let text_len: usize = lines.iter().map(|l| l.len() + 1).sum();
        group.throughput(Throughput::Bytes(text_len as u64));
        group.bench_function(*name, |b| {
            b.iter(|| {
                let mut addr = 0x1000u64;
                for line in lines {
                    let out = asm.encode(addr, black_box(line), &NoSymbols);
                    addr += out.bytes.len() as u64;
                }
                addr
            })
        });
    }

    group.finish();
}

// ─── Decode Throughput ──────────────────────────────────────────────────

fn machine_code(cpu: Cpu, lines: &[String]) -> Vec<u8> {
    let asm = Assembler::new(Config::new(cpu)).unwrap();
    let mut code = Vec::new();
    for line in lines {
        let out = asm.encode(0x1000 + code.len() as u64, line, &NoSymbols);
        code.extend_from_slice(&out.bytes);
    }
    code
}

fn bench_decode_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_throughput");

    let blocks = [
        ("i8086", Cpu::I8086, machine_code(Cpu::I8086, &i8086_block(1000))),
        ("mc6809", Cpu::Mc6809, machine_code(Cpu::Mc6809, &mc6809_block(1000))),
        ("mc68000", Cpu::Mc68000, machine_code(Cpu::Mc68000, &mc68000_block(1000))),
    ];
    for (name, cpu, code) in &blocks {
        group.throughput(Throughput::Bytes(code.len() as u64));
        group.bench_function(*name, |b| {
            b.iter(|| disassemble(*cpu, 0x1000, black_box(code)).unwrap())
        });
    }

    // Random bytes exercise the unknown-instruction path.
    let noise: Vec<u8> = (0u32..4096).map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8).collect();
    group.throughput(Throughput::Bytes(noise.len() as u64));
    group.bench_function("mc68000_noise", |b| {
        b.iter(|| disassemble(Cpu::Mc68000, 0, black_box(&noise)).unwrap())
    });

    group.finish();
}

// ─── Reused Assembler vs One-Shot ───────────────────────────────────────

fn bench_reuse_vs_oneshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("reuse_vs_oneshot");

    group.bench_function("oneshot", |b| {
        b.iter(|| assemble_line(Cpu::Mc68000, 0, black_box("move.l d0,d1")).unwrap())
    });

    let asm = Assembler::new(Config::new(Cpu::Mc68000)).unwrap();
    group.bench_function("reused", |b| {
        b.iter(|| asm.encode(0, black_box("move.l d0,d1"), &NoSymbols))
    });

    let mut syms = Symbols::new();
    for i in 0..500 {
        syms.define(&format!("label{i}"), i * 4);
    }
    group.bench_function("reused_with_symbols", |b| {
        b.iter(|| asm.encode(0, black_box("lea label250(pc),a0"), &syms))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_single_instruction,
    bench_encode_throughput,
    bench_decode_throughput,
    bench_reuse_vs_oneshot,
);
criterion_main!(benches);
