use std::io::{Read, Write};

use super::{
    DecodeError, EncodeError, FromReader, ToWriter, read_length, raw_instruction::RawInstruction,
    reader_utils::ValueReaderExt, write_length,
};

#[derive(Debug, Clone)]
pub(super) struct RawClassDef {
    pub class_idx: u32,
    pub access_flags: u32,
    pub super_idx: u32,
    pub methods: Vec<RawEncodedMethod>,
}

#[derive(Debug, Clone)]
pub(super) struct RawEncodedMethod {
    pub method_idx: u32,
    pub access_flags: u32,
    pub code: Option<RawCode>,
}

#[derive(Debug, Clone)]
pub(super) struct RawCode {
    pub registers: u16,
    pub ins: u16,
    pub outs: u16,
    pub instructions: Vec<RawInstruction>,
}

impl FromReader for RawClassDef {
    fn from_reader<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let class_idx = reader.read_value()?;
        let access_flags = reader.read_value()?;
        let super_idx = reader.read_value()?;
        let method_count = read_length(reader)?;
        let methods = (0..method_count)
            .map(|_| RawEncodedMethod::from_reader(reader))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            class_idx,
            access_flags,
            super_idx,
            methods,
        })
    }
}

impl ToWriter for RawClassDef {
    fn to_writer<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_all(&self.class_idx.to_le_bytes())?;
        writer.write_all(&self.access_flags.to_le_bytes())?;
        writer.write_all(&self.super_idx.to_le_bytes())?;
        write_length::<u32>(writer, self.methods.len())?;
        for method in &self.methods {
            method.to_writer(writer)?;
        }
        Ok(())
    }
}

impl FromReader for RawEncodedMethod {
    fn from_reader<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let method_idx = reader.read_value()?;
        let access_flags = reader.read_value()?;
        let has_code: u8 = reader.read_value()?;
        let code = match has_code {
            0 => None,
            1 => Some(RawCode::from_reader(reader)?),
            _ => return Err(DecodeError::UnexpectedData),
        };
        Ok(Self {
            method_idx,
            access_flags,
            code,
        })
    }
}

impl ToWriter for RawEncodedMethod {
    fn to_writer<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_all(&self.method_idx.to_le_bytes())?;
        writer.write_all(&self.access_flags.to_le_bytes())?;
        match &self.code {
            None => writer.write_all(&[0])?,
            Some(code) => {
                writer.write_all(&[1])?;
                code.to_writer(writer)?;
            }
        }
        Ok(())
    }
}

impl FromReader for RawCode {
    fn from_reader<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let registers = reader.read_value()?;
        let ins = reader.read_value()?;
        let outs = reader.read_value()?;
        let insn_count = read_length(reader)?;
        let instructions = (0..insn_count)
            .map(|_| RawInstruction::read_one(reader))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            registers,
            ins,
            outs,
            instructions,
        })
    }
}

impl ToWriter for RawCode {
    fn to_writer<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_all(&self.registers.to_le_bytes())?;
        writer.write_all(&self.ins.to_le_bytes())?;
        writer.write_all(&self.outs.to_le_bytes())?;
        write_length::<u32>(writer, self.instructions.len())?;
        for insn in &self.instructions {
            insn.write_one(writer)?;
        }
        Ok(())
    }
}
