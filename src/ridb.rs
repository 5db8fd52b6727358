//! Records of the reverse-index database kept next to a fileserver's volumes.
//!
//! The database maps each file back to its name: keys are the vnode and
//! uniquifier (both little-endian) followed by a NUL-padded UTF-8 name, and
//! values are NUL-padded UTF-8 names. This module only decodes records read
//! from the store; it never writes them.
//!
//! The store is an LMDB environment. Records reach [`decode_records`] either
//! as raw pairs or, through [`decode_dump`], as the text `mdb_dump` prints
//! for it (both its `print` and `bytevalue` formats).

use std::collections::BTreeMap;
use std::fmt;
use std::io;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::CodecError;

/// Decoded key of a reverse-index record.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RidbKey {
    pub vnode: u32,
    pub unique: u32,
    pub name: String,
}

impl fmt::Display for RidbKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {:?})", self.vnode, self.unique, self.name)
    }
}

pub fn decode_key(key: &[u8]) -> Result<RidbKey, CodecError> {
    let mut src = key;
    let vnode = src.read_u32::<LittleEndian>().map_err(|e| CodecError::new("ridb key vnode", e))?;
    let unique =
        src.read_u32::<LittleEndian>().map_err(|e| CodecError::new("ridb key uniquifier", e))?;
    let name = padded_utf8(src).map_err(|e| CodecError::new("ridb key name", e))?;
    Ok(RidbKey { vnode, unique, name })
}

pub fn decode_value(value: &[u8]) -> Result<String, CodecError> {
    padded_utf8(value).map_err(|e| CodecError::new("ridb value", e))
}

/// Decodes every `(key, value)` pair, failing on the first malformed record.
pub fn decode_records<'a, I>(records: I) -> Result<BTreeMap<RidbKey, String>, CodecError>
where
    I: IntoIterator<Item = (&'a [u8], &'a [u8])>,
{
    records
        .into_iter()
        .map(|(key, value)| -> Result<_, CodecError> { Ok((decode_key(key)?, decode_value(value)?)) })
        .collect()
}

/// Decodes the records of an `mdb_dump` listing of the store.
pub fn decode_dump(dump: &str) -> Result<BTreeMap<RidbKey, String>, CodecError> {
    let mut lines = dump.lines();
    let mut printable = false;
    for line in lines.by_ref() {
        match line {
            "HEADER=END" => break,
            "format=print" => printable = true,
            _ => {}
        }
    }

    let mut items = Vec::new();
    for line in lines {
        if line == "DATA=END" {
            break;
        }
        let Some(body) = line.strip_prefix(' ') else {
            return Err(CodecError::new("ridb dump line", invalid(format!("unexpected line {line:?}"))));
        };
        let bytes = if printable { unescape(body) } else { unhex(body) };
        items.push(bytes.map_err(|e| CodecError::new("ridb dump line", e))?);
    }
    if items.len() % 2 != 0 {
        return Err(CodecError::new("ridb dump", invalid("key without a value".to_string())));
    }
    decode_records(items.chunks_exact(2).map(|pair| (pair[0].as_slice(), pair[1].as_slice())))
}

/// `print` format: bytes as-is, `\\` for a backslash, `\xx` hex otherwise.
fn unescape(text: &str) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len());
    let mut bytes = text.bytes();
    while let Some(b) = bytes.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match bytes.next() {
            Some(b'\\') => out.push(b'\\'),
            Some(hi) => {
                let lo = bytes.next().ok_or_else(|| invalid("truncated escape".to_string()))?;
                out.push(hex_pair(hi, lo)?);
            }
            None => return Err(invalid("trailing backslash".to_string())),
        }
    }
    Ok(out)
}

/// `bytevalue` format: two hex digits per byte.
fn unhex(text: &str) -> io::Result<Vec<u8>> {
    let digits = text.as_bytes();
    if digits.len() % 2 != 0 {
        return Err(invalid("odd number of hex digits".to_string()));
    }
    digits.chunks_exact(2).map(|pair| hex_pair(pair[0], pair[1])).collect()
}

fn hex_pair(hi: u8, lo: u8) -> io::Result<u8> {
    let digit = |d: u8| {
        char::from(d)
            .to_digit(16)
            .ok_or_else(|| invalid(format!("bad hex digit {:?}", char::from(d))))
    };
    Ok((digit(hi)? * 16 + digit(lo)?) as u8)
}

fn invalid(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

/// UTF-8 text with any trailing NUL padding removed.
fn padded_utf8(bytes: &[u8]) -> io::Result<String> {
    let text = std::str::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(text.trim_end_matches('\0').to_string())
}
