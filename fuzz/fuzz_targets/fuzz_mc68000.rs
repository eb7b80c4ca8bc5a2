#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary bytes must never panic and must consume them all.
    if let Ok(lines) = asmdis::disassemble(asmdis::Cpu::Mc68000, 0x1000, data) {
        let consumed: usize = lines.iter().map(|d| d.len()).sum();
        assert_eq!(consumed, data.len());
    }

    // Fuzz with and without the quick/immediate alias entries.
    if let Ok(text) = core::str::from_utf8(data) {
        for aliases in [true, false] {
            let config = asmdis::Config::new(asmdis::Cpu::Mc68000).with_alias_entries(aliases);
            let asm = asmdis::Assembler::new(config).unwrap();
            for line in text.lines() {
                let _ = asm.encode(0x1000, line, &asmdis::NoSymbols);
            }
        }
    }
});
