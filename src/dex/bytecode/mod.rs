//! The binary layout of dex containers.
//!
//! A container is `magic`, a CRC-32 of everything that follows it, the string, type, proto and
//! method pools, and finally the class definitions. All integers are little-endian.
mod class_def;
mod errors;
mod pools;
mod raw_instruction;
mod reader;
pub(crate) mod reader_utils;
mod writer;

use std::{
    io::{Read, Write},
    num::TryFromIntError,
};

pub use errors::{DecodeError, EncodeError};
use num_traits::ToBytes;
pub use reader::Reader;
pub use writer::Writer;

use self::reader_utils::ValueReaderExt;
use super::DexFile;

const MAGIC: [u8; 8] = *b"dex\n035\0";

/// The stored value of an absent type index.
const NO_INDEX: u32 = 0xFFFF_FFFF;

trait FromReader: Sized {
    fn from_reader<R: Read>(reader: &mut R) -> Result<Self, DecodeError>;
}

trait ToWriter {
    fn to_writer<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError>;
}

fn read_length<R: Read>(reader: &mut R) -> Result<usize, DecodeError> {
    let length: u32 = reader.read_value()?;
    usize::try_from(length).map_err(|_| DecodeError::UnexpectedData)
}

fn write_length<Len>(writer: &mut impl Write, length: usize) -> Result<(), EncodeError>
where
    usize: TryInto<Len, Error = TryFromIntError>,
    Len: ToBytes,
{
    let length: Len = length.try_into()?;
    writer.write_all(length.to_le_bytes().as_ref())?;
    Ok(())
}

/// Hands out the memory an encoded image is written into.
///
/// A VM usually requires redefined class bytes to live in memory it allocated itself.
pub trait Allocator {
    /// The memory region handed out.
    type Buffer: AsRef<[u8]> + AsMut<[u8]>;

    /// Allocates `size` bytes, or returns [`None`] if the memory is not available.
    fn allocate(&self, size: usize) -> Option<Self::Buffer>;
}

/// An [`Allocator`] backed by the Rust heap.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl Allocator for HeapAllocator {
    type Buffer = Vec<u8>;

    fn allocate(&self, size: usize) -> Option<Self::Buffer> {
        Some(vec![0u8; size])
    }
}

/// Decodes the definition of `class_name` (a binary name such as `pkg/Foo`) out of `bytes`.
///
/// The returned [`DexFile`] holds exactly one class.
///
/// # Errors
/// See [`DecodeError`] for more information.
pub fn decode(bytes: &[u8], class_name: &str) -> Result<DexFile, DecodeError> {
    let reader = Reader::new(bytes)?;
    let class_idx = reader
        .find_class_index(class_name)
        .ok_or_else(|| DecodeError::ClassNotFound(class_name.to_owned()))?;
    let class = reader.create_class_ir(class_idx)?;
    Ok(DexFile {
        classes: vec![class],
    })
}

/// Encodes `dex` into a buffer obtained from `allocator`.
///
/// # Errors
/// See [`EncodeError`] for more information.
pub fn encode<A: Allocator>(dex: &DexFile, allocator: &A) -> Result<A::Buffer, EncodeError> {
    Writer::new(dex).create_image(allocator)
}
