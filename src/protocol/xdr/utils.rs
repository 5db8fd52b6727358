//! Alignment helpers shared by the opaque and string codecs.

use std::io::{Read, Write};

/// Every XDR item ends on a 4-byte boundary.
const UNIT: usize = 4;
const ZEROS: [u8; UNIT] = [0; UNIT];

/// Filler bytes that follow a body of `len` bytes.
const fn pad_len(len: usize) -> usize {
    (UNIT - len % UNIT) % UNIT
}

/// Consumes the filler after a body of `len` bytes. Its content is ignored.
pub fn read_padding(len: usize, src: &mut impl Read) -> std::io::Result<()> {
    let mut skipped = [0u8; UNIT];
    src.read_exact(&mut skipped[..pad_len(len)])
}

pub fn write_padding(len: usize, dest: &mut impl Write) -> std::io::Result<()> {
    dest.write_all(&ZEROS[..pad_len(len)])
}

pub fn invalid_data(message: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message)
}
