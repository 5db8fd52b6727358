//! XDR encoding as used by rxgen-generated AFS stubs.
//!
//! <https://datatracker.ietf.org/doc/html/rfc4506>
//!
//! Every value occupies a whole number of 4-byte big-endian units. rxgen
//! widens the small C types: `char` and `u_short` each travel as a full
//! 4-byte unit, so the `u8` and `u16` implementations below do the same and
//! reject out-of-range values on decode.
//!
//! Variable-length arrays carry a 4-byte length prefix. Where the interface
//! definition gives an upper bound the decoder checks it before allocating.

use std::io::{Read, Write};

use byteorder::BigEndian;
use byteorder::{ReadBytesExt, WriteBytesExt};
use num_traits::{FromPrimitive, ToPrimitive};

use crate::error::CodecError;

pub mod afsint;
pub mod rx;
mod utils;

/// XDR assumes big endian encoding.
pub type XDREndian = BigEndian;

pub trait Serialize {
    /// Serializes the implementing type to the provided writer.
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()>;
}

pub trait Deserialize {
    /// Deserializes data from the provided reader into the implementing type.
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()>;
}

/// Deserialization based on the [Default] trait of the type T.
pub fn deserialize<T>(src: &mut impl Read) -> std::io::Result<T>
where
    T: Deserialize + Default,
{
    let mut val = T::default();
    val.deserialize(src)?;

    Ok(val)
}

/// Encodes a value into a fresh buffer.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    value.serialize(&mut buf)?;
    Ok(buf)
}

/// Decodes a value from `bytes`, failing with [`CodecError`] when the buffer
/// is truncated or malformed. Trailing bytes are left unread.
pub fn decode<T>(bytes: &[u8]) -> Result<T, CodecError>
where
    T: Deserialize + Default,
{
    let mut src = bytes;
    deserialize::<T>(&mut src).map_err(|e| CodecError::new(std::any::type_name::<T>(), e))
}

/// Marker trait for XDR `enum` type serialization.
pub trait SerializeEnum: ToPrimitive {}

/// Enumerations have the same representation as signed integers.
impl<T: SerializeEnum> Serialize for T {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        if let Some(val) = self.to_i32() {
            return dest.write_i32::<XDREndian>(val);
        }
        Err(utils::invalid_data("Invalid enum value"))
    }
}

/// Marker trait for XDR `enum` type deserialization.
pub trait DeserializeEnum: FromPrimitive {}

impl<T: DeserializeEnum> Deserialize for T {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        let val = src.read_i32::<XDREndian>()?;
        if let Some(val) = FromPrimitive::from_i32(val) {
            *self = val;
            return Ok(());
        }

        Err(utils::invalid_data("Invalid enum value"))
    }
}

impl Serialize for bool {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_i32::<XDREndian>(if *self { 1 } else { 0 })
    }
}

impl Deserialize for bool {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        match src.read_i32::<XDREndian>()? {
            0 => *self = false,
            1 => *self = true,
            _ => return Err(utils::invalid_data("Invalid value for bool enum")),
        }
        Ok(())
    }
}

/// `xdr_char`: one byte widened to a 4-byte unit.
impl Serialize for u8 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_u32::<XDREndian>(u32::from(*self))
    }
}

impl Deserialize for u8 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        // rxgen sign-extends `char`, so accept both 0..=255 and -128..=-1.
        let raw = src.read_i32::<XDREndian>()?;
        *self = match raw {
            0..=255 => raw as u8,
            -128..=-1 => raw as i8 as u8,
            _ => return Err(utils::invalid_data("char out of range")),
        };
        Ok(())
    }
}

/// `xdr_u_short`: two bytes widened to a 4-byte unit.
impl Serialize for u16 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_u32::<XDREndian>(u32::from(*self))
    }
}

impl Deserialize for u16 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        let Some(val) = src.read_u32::<XDREndian>()?.to_u16() else {
            return Err(utils::invalid_data("u_short out of range"));
        };
        *self = val;
        Ok(())
    }
}

impl Serialize for i32 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_i32::<XDREndian>(*self)
    }
}

impl Deserialize for i32 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_i32::<XDREndian>()?;
        Ok(())
    }
}

impl Serialize for u32 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_u32::<XDREndian>(*self)
    }
}

impl Deserialize for u32 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_u32::<XDREndian>()?;
        Ok(())
    }
}

/// Object lengths in XDR are always serialized as [u32]. This wrapper
/// type provides a way to serialize the [usize] type common to Rust as [u32].
#[derive(Default)]
pub(crate) struct UsizeAsU32(pub(crate) usize);

impl Serialize for UsizeAsU32 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        let Some(val) = self.0.to_u32() else {
            return Err(utils::invalid_data("cannot cast `usize` to `u32`"));
        };

        val.serialize(dest)
    }
}

impl Deserialize for UsizeAsU32 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        let Some(val) = deserialize::<u32>(src)?.to_usize() else {
            return Err(utils::invalid_data("cannot cast `u32` to `usize`"));
        };

        self.0 = val;
        Ok(())
    }
}

/// Reads a length prefix and checks it against the interface bound.
pub(crate) fn read_bounded_len(src: &mut impl Read, max: usize) -> std::io::Result<usize> {
    let length = deserialize::<UsizeAsU32>(src)?.0;
    if length > max {
        return Err(utils::invalid_data("array length exceeds its bound"));
    }
    Ok(length)
}

/// Variable-length opaque data.
impl Serialize for [u8] {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        UsizeAsU32(self.len()).serialize(dest)?;
        dest.write_all(self)?;
        utils::write_padding(self.len(), dest)?;

        Ok(())
    }
}

impl Deserialize for Vec<u8> {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        let length = read_bounded_len(src, MAX_OPAQUE_LEN)?;
        self.resize(length, 0);

        src.read_exact(self)?;
        utils::read_padding(length, src)?;

        Ok(())
    }
}

/// Upper bound on any opaque or string body we are willing to allocate.
pub const MAX_OPAQUE_LEN: usize = 1 << 20;

/// AFS names are UTF-8 on the wire.
impl Serialize for str {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.as_bytes().serialize(dest)
    }
}

impl Deserialize for String {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        let bytes = deserialize::<Vec<u8>>(src)?;
        match String::from_utf8(bytes) {
            Ok(s) => {
                *self = s;
                Ok(())
            }
            Err(_) => {
                self.clear();
                Err(utils::invalid_data("string is not UTF-8"))
            }
        }
    }
}

/// Fixed-length array: each element in turn, no length prefix.
impl<const N: usize, T: Serialize> Serialize for [T; N] {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        for i in self {
            i.serialize(dest)?;
        }

        Ok(())
    }
}

impl<const N: usize, T: Deserialize> Deserialize for [T; N] {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        for i in self {
            i.deserialize(src)?;
        }

        Ok(())
    }
}

/// Macro for implementing XDR serialization for structs.
///
/// Fields are written in the listed order, which must match the interface
/// definition exactly.
#[macro_export]
macro_rules! SerializeStruct {
    (
        $t:ident,
        $($element:ident),*
    ) => {
        impl Serialize for $t {
            fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
                $(self.$element.serialize(dest)?;)*
                Ok(())
            }
        }
    };
}

#[macro_export]
macro_rules! DeserializeStruct {
    (
        $t:ident,
        $($element:ident),*
    ) => {
        impl Deserialize for $t {
            fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
                $(self.$element.deserialize(src)?;)*
                Ok(())
            }
        }
    };
}

pub use crate::DeserializeStruct;
pub use crate::SerializeStruct;
