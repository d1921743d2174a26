//! Fuzz target for LineFramer reassembly
//!
//! Prevent framing desync and unbounded buffering (HIGH priority)
//!
//! # Strategy
//!
//! - Arbitrary bytes: Random stream content, terminators anywhere
//! - Arbitrary chunking: The same stream cut at fuzzer-chosen offsets
//! - Small limits: Line limits from 1 to 64 bytes to hit boundaries often
//!
//! # Invariants
//!
//! - Output is identical for every chunking of the same stream
//! - No produced line exceeds the limit or contains `\n`
//! - Buffered residue never exceeds limit + 1 bytes
//! - After an error nothing else is produced
//! - NEVER panic

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use relay_core::LineFramer;

#[derive(Debug, Clone, Arbitrary)]
struct FramerInput {
    max_line_len: u8,
    stream: Vec<u8>,
    cuts: Vec<u16>,
}

fn run(max: usize, chunks: &[&[u8]]) -> Vec<Result<Vec<u8>, ()>> {
    let mut framer = LineFramer::new(max);
    let mut out = Vec::new();

    for chunk in chunks {
        for result in framer.feed(chunk) {
            match result {
                Ok(line) => {
                    assert!(line.len() <= max, "line longer than limit");
                    assert!(!line.contains(&b'\n'), "terminator leaked into line");
                    out.push(Ok(line.to_vec()));
                },
                Err(_) => out.push(Err(())),
            }
        }
        assert!(framer.buffered() <= max + 1, "residue exceeds limit");
    }

    if let Some(pos) = out.iter().position(Result::is_err) {
        assert_eq!(pos, out.len() - 1, "output after framing error");
    }

    out
}

fuzz_target!(|input: FramerInput| {
    let max = (input.max_line_len % 64) as usize + 1;
    let stream = &input.stream;

    let mut cuts: Vec<usize> = input.cuts.iter().map(|c| *c as usize % (stream.len() + 1)).collect();
    cuts.sort_unstable();
    cuts.dedup();

    let mut chunks = Vec::new();
    let mut start = 0;
    for cut in cuts {
        chunks.push(&stream[start..cut]);
        start = cut;
    }
    chunks.push(&stream[start..]);

    let whole = run(max, &[stream.as_slice()]);
    let chunked = run(max, &chunks);

    assert_eq!(whole, chunked, "output depends on chunking");
});
