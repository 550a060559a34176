use super::{
    DecodeError, FromReader, MAGIC, NO_INDEX,
    class_def::{RawClassDef, RawCode, RawEncodedMethod},
    pools::Pools,
    raw_instruction::lift,
    read_length,
    reader_utils::ValueReaderExt,
};
use crate::{
    dex::{AccessFlags, ClassDef, ClassRef, Code, DexFile, EncodedMethod},
    types::Descriptor,
};

/// A parsed container whose class definitions are turned into IR on demand.
#[derive(Debug)]
pub struct Reader {
    pools: Pools,
    class_defs: Vec<RawClassDef>,
}

impl Reader {
    /// Parses the header, the pools and the class definitions of a container.
    ///
    /// # Errors
    /// See [`DecodeError`] for more information.
    pub fn new(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = bytes;
        let magic: [u8; 8] = reader.read_value()?;
        if magic != MAGIC {
            return Err(DecodeError::NotAContainer);
        }
        let expected: u32 = reader.read_value()?;
        let found = crc32fast::hash(reader);
        if expected != found {
            return Err(DecodeError::ChecksumMismatch { expected, found });
        }
        let pools = Pools::from_reader(&mut reader)?;
        let class_count = read_length(&mut reader)?;
        let class_defs = (0..class_count)
            .map(|_| RawClassDef::from_reader(&mut reader))
            .collect::<Result<_, _>>()?;
        if !reader.is_empty() {
            return Err(DecodeError::UnexpectedData);
        }
        Ok(Self { pools, class_defs })
    }

    /// The number of classes defined in the container.
    #[must_use]
    pub fn class_count(&self) -> usize {
        self.class_defs.len()
    }

    /// Finds the position of the definition of `binary_name`.
    #[must_use]
    pub fn find_class_index(&self, binary_name: &str) -> Option<usize> {
        let descriptor = ClassRef::new(binary_name).descriptor();
        let type_idx = self.pools.find_type(&descriptor)?;
        self.class_defs
            .iter()
            .position(|it| it.class_idx == type_idx)
    }

    /// Builds the IR of the class definition at `index`.
    ///
    /// # Errors
    /// See [`DecodeError`] for more information.
    pub fn create_class_ir(&self, index: usize) -> Result<ClassDef, DecodeError> {
        let RawClassDef {
            class_idx,
            access_flags,
            super_idx,
            methods,
        } = self
            .class_defs
            .get(index)
            .ok_or_else(|| DecodeError::ClassNotFound(format!("#{index}")))?;
        let class = self.pools.class_ref(*class_idx)?;
        let access_flags =
            AccessFlags::from_bits(*access_flags).ok_or(DecodeError::UnknownFlags(*access_flags))?;
        let super_class = match *super_idx {
            NO_INDEX => None,
            it => Some(self.pools.class_ref(it)?),
        };
        let methods = methods
            .iter()
            .map(|it| self.method_ir(it))
            .collect::<Result<_, _>>()?;
        Ok(ClassDef {
            class,
            access_flags,
            super_class,
            methods,
        })
    }

    /// Builds the IR of every class in the container.
    ///
    /// # Errors
    /// See [`DecodeError`] for more information.
    pub fn read_all(&self) -> Result<DexFile, DecodeError> {
        let classes = (0..self.class_defs.len())
            .map(|idx| self.create_class_ir(idx))
            .collect::<Result<_, _>>()?;
        Ok(DexFile { classes })
    }

    fn method_ir(&self, raw: &RawEncodedMethod) -> Result<EncodedMethod, DecodeError> {
        let id = self.pools.method(raw.method_idx)?;
        let access_flags = AccessFlags::from_bits(raw.access_flags)
            .ok_or(DecodeError::UnknownFlags(raw.access_flags))?;
        let code = raw
            .code
            .as_ref()
            .map(|code| self.code_ir(code))
            .transpose()?;
        Ok(EncodedMethod {
            id,
            access_flags,
            code,
        })
    }

    fn code_ir(&self, raw: &RawCode) -> Result<Code, DecodeError> {
        Ok(Code {
            registers: raw.registers,
            ins: raw.ins,
            outs: raw.outs,
            instructions: lift(&raw.instructions, &self.pools)?,
        })
    }
}
