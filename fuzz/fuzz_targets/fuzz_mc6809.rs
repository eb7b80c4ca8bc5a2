#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary bytes must never panic and must consume them all.
    if let Ok(lines) = asmdis::disassemble(asmdis::Cpu::Mc6809, 0, data) {
        let consumed: usize = lines.iter().map(|d| d.len()).sum();
        assert_eq!(consumed, data.len());
    }

    // Fuzz both branch configurations and a non-zero direct page.
    if let Ok(text) = core::str::from_utf8(data) {
        let base = asmdis::Config::new(asmdis::Cpu::Mc6809);
        for config in [base, base.with_long_branch(true).with_direct_page(0x20)] {
            let asm = asmdis::Assembler::new(config).unwrap();
            for line in text.lines() {
                let _ = asm.encode(0x2000, line, &asmdis::NoSymbols);
            }
        }
    }
});
