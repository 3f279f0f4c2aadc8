//! Fuzz target: `FrameAssembler::feed` + `decode_event`
//!
//! Drives arbitrary byte sequences into the streaming frame assembler and
//! decodes whatever comes out under both addressing modes.  Asserts that
//! nothing panics, every emitted frame starts with SOF and fits
//! `MAX_FRAME`, and that a reset assembler accepts the same bytes again.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use domotouch::bus::address::AddressingMode;
use domotouch::bus::frame::{FrameAssembler, MAX_FRAME, SOF, decode_event};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut asm = FrameAssembler::new();
    let mut first_pass = 0usize;

    asm.feed(data, |frame| {
        assert!(frame.len() <= MAX_FRAME, "frame exceeds MAX_FRAME");
        assert_eq!(frame[0], SOF, "frame must start with SOF");
        let _ = decode_event(&frame, AddressingMode::Absolute);
        let _ = decode_event(&frame, AddressingMode::ModuleChannel);
        first_pass += 1;
    });

    // Same bytes after a reset give the same frames.
    asm.reset();
    let mut second_pass = 0usize;
    asm.feed(data, |_| second_pass += 1);
    assert_eq!(first_pass, second_pass);

    // Raw input straight into the decoder.
    let _ = decode_event(data, AddressingMode::Absolute);
});
