#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary bytes must never panic and must consume them all.
    for cpu in [asmdis::Cpu::I8086, asmdis::Cpu::I80186] {
        if let Ok(lines) = asmdis::disassemble(cpu, 0x100, data) {
            let consumed: usize = lines.iter().map(|d| d.len()).sum();
            assert_eq!(consumed, data.len());
        }
    }

    // Encoding arbitrary text line by line must never panic.
    if let Ok(text) = core::str::from_utf8(data) {
        let asm = asmdis::Assembler::new(asmdis::Config::new(asmdis::Cpu::I80186)).unwrap();
        let mut addr = 0x100u64;
        for line in text.lines() {
            let out = asm.encode(addr, line, &asmdis::NoSymbols);
            addr = addr.wrapping_add(out.bytes.len() as u64);
        }
    }
});
