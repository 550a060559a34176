use std::num::TryFromIntError;

use crate::{dex::Label, types::method_descriptor::InvalidDescriptor};

/// An error that occurs when decoding a dex container.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The buffer ended early.
    #[error("Failed to read from buffer: {0}")]
    ReadFail(#[from] std::io::Error),
    /// The buffer does not start with the dex magic.
    #[error("The buffer does not contain a dex container")]
    NotAContainer,
    /// The stored checksum does not match the content.
    #[error("Checksum mismatch, expected {expected:#010x}, but found {found:#010x}")]
    ChecksumMismatch {
        /// The checksum stored in the header.
        expected: u32,
        /// The checksum of the content.
        found: u32,
    },
    /// An index does not point into its pool.
    #[error("Index {index} is out of bounds of the {pool} pool")]
    BadPoolIndex {
        /// The pool being accessed.
        pool: &'static str,
        /// The offending index.
        index: u32,
    },
    /// A pool entry holds the wrong kind of type.
    #[error("Expected a class type, but found {0}")]
    NotAClassType(String),
    /// The opcode cannot be recognized.
    #[error("Unexpected opcode {0:#04x}")]
    UnexpectedOpCode(u8),
    /// A branch points outside the method body.
    #[error("Branch at instruction {at} jumps out of the method body by {offset}")]
    InvalidBranchTarget {
        /// The index of the branch instruction.
        at: usize,
        /// The relative offset of the branch.
        offset: i32,
    },
    /// The access flags contain unknown bits.
    #[error("Unknown access flags {0:#x}")]
    UnknownFlags(u32),
    /// A type descriptor is invalid.
    #[error("Fail to parse descriptor: {0}")]
    InvalidDescriptor(#[from] InvalidDescriptor),
    /// A string in the string pool is not valid UTF-8.
    #[error("Invalid UTF-8 string")]
    BrokenUtf8,
    /// There are unread bytes after the class definitions.
    #[error("Unexpected data at the end of the container")]
    UnexpectedData,
    /// The requested class is not defined in the container.
    #[error("Class {0} is not defined in the container")]
    ClassNotFound(String),
}

impl DecodeError {
    /// Whether the failure is the class-index lookup rather than a damaged layout.
    #[must_use]
    pub const fn is_class_not_found(&self) -> bool {
        matches!(self, Self::ClassNotFound(_))
    }
}

/// An error that occurs when encoding a [`DexFile`](crate::dex::DexFile).
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// Writing into the intermediate buffer failed.
    #[error("IO Error: {0}")]
    IO(#[from] std::io::Error),
    /// A count or index does not fit in its field.
    #[error("Out of range error: {0}")]
    OutOfRange(#[from] TryFromIntError),
    /// A branch targets a label that is never placed.
    #[error("Undefined label {0}")]
    UndefinedLabel(Label),
    /// A label is placed twice in one method body.
    #[error("Duplicate label {0}")]
    DuplicateLabel(Label),
    /// A label placed after the last instruction is used as a branch target.
    #[error("Label {0} does not precede any instruction")]
    DanglingLabel(Label),
    /// The allocator refused to hand out the image buffer.
    #[error("Failed to allocate {0} bytes for the image")]
    AllocationFailed(usize),
}
