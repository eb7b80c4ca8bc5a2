//! Basic example: encode a few lines per target, then disassemble them.
//!
//! Run with: `cargo run --example basic`

use asmdis::{disassemble, Assembler, Config, Cpu, Symbols};

fn main() {
    println!("=== asmdis basic example ===\n");

    let mut syms = Symbols::new();
    syms.define("buffer", 0x2000).define("count", 16);

    let programs: [(Cpu, u64, &[&str]); 3] = [
        (
            Cpu::I8086,
            0x100,
            &["mov cx, count", "mov si, buffer", "rep movsb", "jmp $"],
        ),
        (
            Cpu::Mc6809,
            0x1000,
            &["ldx #buffer", "lda count,x", "pshs a,b,x", "bra *"],
        ),
        (
            Cpu::Mc68000,
            0x1000,
            &["lea buffer,a0", "add #1,d3", "movem.l d0-d3/a0,-(sp)", "rts"],
        ),
    ];

    for (cpu, origin, lines) in programs {
        println!("{cpu}:");
        let asm = match Assembler::new(Config::new(cpu)) {
            Ok(asm) => asm,
            Err(e) => {
                println!("   unavailable: {e}");
                continue;
            }
        };

        let mut code = Vec::new();
        let mut addr = origin;
        for line in lines {
            let out = asm.encode(addr, line, &syms);
            match out.error {
                Some(err) if !out.is_ok() => println!("   {addr:06X}  {line:<28} error: {err}"),
                _ => println!("   {addr:06X}  {line:<28} {}", hex(&out.bytes)),
            }
            addr += out.bytes.len() as u64;
            code.extend_from_slice(&out.bytes);
        }

        println!("\n   Disassembly:");
        if let Ok(decoded) = disassemble(cpu, origin, &code) {
            for d in decoded {
                println!("   {:06X}  {:<16} {}", d.address, hex(&d.bytes), d.text);
            }
        }
        println!();
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}
