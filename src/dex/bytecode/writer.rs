use super::{
    Allocator, EncodeError, MAGIC, NO_INDEX, ToWriter,
    class_def::{RawClassDef, RawCode, RawEncodedMethod},
    pools::PoolBuilder,
    raw_instruction::lower,
    write_length,
};
use crate::{
    dex::{ClassDef, Code, DexFile, EncodedMethod},
    types::Descriptor,
};

/// Lays out a [`DexFile`] as a container image.
#[derive(Debug)]
pub struct Writer<'a> {
    dex: &'a DexFile,
}

impl<'a> Writer<'a> {
    /// Creates a writer for `dex`.
    #[must_use]
    pub const fn new(dex: &'a DexFile) -> Self {
        Self { dex }
    }

    /// Encodes the container into memory handed out by `allocator`.
    ///
    /// Pools are sorted, so equal IR always yields identical bytes.
    ///
    /// # Errors
    /// See [`EncodeError`] for more information.
    pub fn create_image<A: Allocator>(&self, allocator: &A) -> Result<A::Buffer, EncodeError> {
        let pools = PoolBuilder::build(self.dex)?;
        let class_defs = self
            .dex
            .classes
            .iter()
            .map(|it| raw_class_def(it, &pools))
            .collect::<Result<Vec<_>, _>>()?;

        let mut body = Vec::new();
        pools.pools().to_writer(&mut body)?;
        write_length::<u32>(&mut body, class_defs.len())?;
        for class_def in &class_defs {
            class_def.to_writer(&mut body)?;
        }
        let checksum = crc32fast::hash(&body);

        let size = MAGIC.len() + size_of::<u32>() + body.len();
        let mut image = allocator
            .allocate(size)
            .ok_or(EncodeError::AllocationFailed(size))?;
        let dst = image.as_mut();
        if dst.len() < size {
            return Err(EncodeError::AllocationFailed(size));
        }
        let (header, rest) = dst.split_at_mut(MAGIC.len());
        header.copy_from_slice(&MAGIC);
        let (crc, rest) = rest.split_at_mut(size_of::<u32>());
        crc.copy_from_slice(&checksum.to_le_bytes());
        rest[..body.len()].copy_from_slice(&body);
        Ok(image)
    }
}

fn raw_class_def(class: &ClassDef, pools: &PoolBuilder) -> Result<RawClassDef, EncodeError> {
    let methods = class
        .methods
        .iter()
        .map(|it| raw_method(it, pools))
        .collect::<Result<_, _>>()?;
    Ok(RawClassDef {
        class_idx: pools.type_index(&class.class.descriptor()),
        access_flags: class.access_flags.bits(),
        super_idx: class
            .super_class
            .as_ref()
            .map_or(NO_INDEX, |it| pools.type_index(&it.descriptor())),
        methods,
    })
}

fn raw_method(method: &EncodedMethod, pools: &PoolBuilder) -> Result<RawEncodedMethod, EncodeError> {
    let code = method
        .code
        .as_ref()
        .map(|it| raw_code(it, pools))
        .transpose()?;
    Ok(RawEncodedMethod {
        method_idx: pools.method_index(&method.id),
        access_flags: method.access_flags.bits(),
        code,
    })
}

fn raw_code(code: &Code, pools: &PoolBuilder) -> Result<RawCode, EncodeError> {
    Ok(RawCode {
        registers: code.registers,
        ins: code.ins,
        outs: code.outs,
        instructions: lower(&code.instructions, pools)?,
    })
}
