//! Instructions as stored in a container: pool indices and relative branch offsets.
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    io::{Read, Write},
};

use super::{
    DecodeError, EncodeError, pools::PoolBuilder, pools::Pools, reader_utils::ValueReaderExt,
    write_length,
};
use crate::{
    dex::{BinaryOp, Comparison, Instruction, InvokeKind, Label, Reg, ValueKind},
    types::Descriptor,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum RawInstruction {
    Nop,
    Move { kind: ValueKind, dst: u16, src: u16 },
    MoveResult { kind: ValueKind, dst: u16 },
    ReturnVoid,
    Return { kind: ValueKind, src: u16 },
    Const { dst: u16, value: i32 },
    ConstWide { dst: u16, value: i64 },
    ConstString { dst: u16, string_idx: u32 },
    NewInstance { dst: u16, type_idx: u32 },
    Throw { src: u16 },
    Goto { offset: i32 },
    If { cmp: Comparison, a: u16, b: u16, offset: i32 },
    IfZero { cmp: Comparison, a: u16, offset: i32 },
    Binary { op: BinaryOp, dst: u16, a: u16, b: u16 },
    Invoke { kind: InvokeKind, method_idx: u32, args: Vec<u16> },
}

const fn kind_from_offset(offset: u8) -> Option<ValueKind> {
    match offset {
        0 => Some(ValueKind::Single),
        1 => Some(ValueKind::Wide),
        2 => Some(ValueKind::Object),
        _ => None,
    }
}

const fn kind_offset(kind: ValueKind) -> u8 {
    match kind {
        ValueKind::Single => 0,
        ValueKind::Wide => 1,
        ValueKind::Object => 2,
    }
}

const COMPARISONS: [Comparison; 6] = [
    Comparison::Eq,
    Comparison::Ne,
    Comparison::Lt,
    Comparison::Ge,
    Comparison::Gt,
    Comparison::Le,
];

const fn comparison_offset(cmp: Comparison) -> u8 {
    match cmp {
        Comparison::Eq => 0,
        Comparison::Ne => 1,
        Comparison::Lt => 2,
        Comparison::Ge => 3,
        Comparison::Gt => 4,
        Comparison::Le => 5,
    }
}

const INVOKE_KINDS: [InvokeKind; 5] = [
    InvokeKind::Virtual,
    InvokeKind::Super,
    InvokeKind::Direct,
    InvokeKind::Static,
    InvokeKind::Interface,
];

const fn invoke_offset(kind: InvokeKind) -> u8 {
    match kind {
        InvokeKind::Virtual => 0,
        InvokeKind::Super => 1,
        InvokeKind::Direct => 2,
        InvokeKind::Static => 3,
        InvokeKind::Interface => 4,
    }
}

mod opcode {
    pub(super) const NOP: u8 = 0x00;
    pub(super) const MOVE: u8 = 0x01;
    pub(super) const MOVE_WIDE: u8 = 0x04;
    pub(super) const MOVE_OBJECT: u8 = 0x07;
    pub(super) const MOVE_RESULT: u8 = 0x0a;
    pub(super) const RETURN_VOID: u8 = 0x0e;
    pub(super) const RETURN: u8 = 0x0f;
    pub(super) const CONST: u8 = 0x14;
    pub(super) const CONST_WIDE: u8 = 0x18;
    pub(super) const CONST_STRING: u8 = 0x1a;
    pub(super) const NEW_INSTANCE: u8 = 0x22;
    pub(super) const THROW: u8 = 0x27;
    pub(super) const GOTO: u8 = 0x28;
    pub(super) const IF_TEST: u8 = 0x32;
    pub(super) const IF_TESTZ: u8 = 0x38;
    pub(super) const INVOKE: u8 = 0x6e;
    pub(super) const ADD_INT: u8 = 0x90;
}

impl RawInstruction {
    pub(super) fn opcode(&self) -> u8 {
        match self {
            Self::Nop => opcode::NOP,
            Self::Move { kind, .. } => match kind {
                ValueKind::Single => opcode::MOVE,
                ValueKind::Wide => opcode::MOVE_WIDE,
                ValueKind::Object => opcode::MOVE_OBJECT,
            },
            Self::MoveResult { kind, .. } => opcode::MOVE_RESULT + kind_offset(*kind),
            Self::ReturnVoid => opcode::RETURN_VOID,
            Self::Return { kind, .. } => opcode::RETURN + kind_offset(*kind),
            Self::Const { .. } => opcode::CONST,
            Self::ConstWide { .. } => opcode::CONST_WIDE,
            Self::ConstString { .. } => opcode::CONST_STRING,
            Self::NewInstance { .. } => opcode::NEW_INSTANCE,
            Self::Throw { .. } => opcode::THROW,
            Self::Goto { .. } => opcode::GOTO,
            Self::If { cmp, .. } => opcode::IF_TEST + comparison_offset(*cmp),
            Self::IfZero { cmp, .. } => opcode::IF_TESTZ + comparison_offset(*cmp),
            Self::Binary { op, .. } => match op {
                BinaryOp::Add => opcode::ADD_INT,
                BinaryOp::Sub => opcode::ADD_INT + 1,
                BinaryOp::Mul => opcode::ADD_INT + 2,
            },
            Self::Invoke { kind, .. } => opcode::INVOKE + invoke_offset(*kind),
        }
    }

    pub(super) fn read_one<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let opcode: u8 = reader.read_value()?;
        let insn = match opcode {
            opcode::NOP => Self::Nop,
            opcode::MOVE | opcode::MOVE_WIDE | opcode::MOVE_OBJECT => {
                let kind = match opcode {
                    opcode::MOVE => ValueKind::Single,
                    opcode::MOVE_WIDE => ValueKind::Wide,
                    _ => ValueKind::Object,
                };
                Self::Move {
                    kind,
                    dst: reader.read_value()?,
                    src: reader.read_value()?,
                }
            }
            op @ 0x0a..=0x0c => Self::MoveResult {
                kind: kind_from_offset(op - opcode::MOVE_RESULT)
                    .ok_or(DecodeError::UnexpectedOpCode(op))?,
                dst: reader.read_value()?,
            },
            opcode::RETURN_VOID => Self::ReturnVoid,
            op @ 0x0f..=0x11 => Self::Return {
                kind: kind_from_offset(op - opcode::RETURN)
                    .ok_or(DecodeError::UnexpectedOpCode(op))?,
                src: reader.read_value()?,
            },
            opcode::CONST => Self::Const {
                dst: reader.read_value()?,
                value: reader.read_value()?,
            },
            opcode::CONST_WIDE => Self::ConstWide {
                dst: reader.read_value()?,
                value: reader.read_value()?,
            },
            opcode::CONST_STRING => Self::ConstString {
                dst: reader.read_value()?,
                string_idx: reader.read_value()?,
            },
            opcode::NEW_INSTANCE => Self::NewInstance {
                dst: reader.read_value()?,
                type_idx: reader.read_value()?,
            },
            opcode::THROW => Self::Throw {
                src: reader.read_value()?,
            },
            opcode::GOTO => Self::Goto {
                offset: reader.read_value()?,
            },
            op @ 0x32..=0x37 => Self::If {
                cmp: COMPARISONS[usize::from(op - opcode::IF_TEST)],
                a: reader.read_value()?,
                b: reader.read_value()?,
                offset: reader.read_value()?,
            },
            op @ 0x38..=0x3d => Self::IfZero {
                cmp: COMPARISONS[usize::from(op - opcode::IF_TESTZ)],
                a: reader.read_value()?,
                offset: reader.read_value()?,
            },
            op @ 0x6e..=0x72 => {
                let kind = INVOKE_KINDS[usize::from(op - opcode::INVOKE)];
                let method_idx = reader.read_value()?;
                let argc: u8 = reader.read_value()?;
                let args = (0..argc)
                    .map(|_| reader.read_value())
                    .collect::<std::io::Result<_>>()?;
                Self::Invoke {
                    kind,
                    method_idx,
                    args,
                }
            }
            op @ 0x90..=0x92 => Self::Binary {
                op: match op {
                    0x90 => BinaryOp::Add,
                    0x91 => BinaryOp::Sub,
                    _ => BinaryOp::Mul,
                },
                dst: reader.read_value()?,
                a: reader.read_value()?,
                b: reader.read_value()?,
            },
            unexpected => Err(DecodeError::UnexpectedOpCode(unexpected))?,
        };
        Ok(insn)
    }

    pub(super) fn write_one<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_all(&[self.opcode()])?;
        match self {
            Self::Nop | Self::ReturnVoid => {}
            Self::Move { dst, src, .. } => {
                writer.write_all(&dst.to_le_bytes())?;
                writer.write_all(&src.to_le_bytes())?;
            }
            Self::MoveResult { dst, .. } => writer.write_all(&dst.to_le_bytes())?,
            Self::Return { src, .. } | Self::Throw { src } => {
                writer.write_all(&src.to_le_bytes())?;
            }
            Self::Const { dst, value } => {
                writer.write_all(&dst.to_le_bytes())?;
                writer.write_all(&value.to_le_bytes())?;
            }
            Self::ConstWide { dst, value } => {
                writer.write_all(&dst.to_le_bytes())?;
                writer.write_all(&value.to_le_bytes())?;
            }
            Self::ConstString {
                dst,
                string_idx: idx,
            }
            | Self::NewInstance { dst, type_idx: idx } => {
                writer.write_all(&dst.to_le_bytes())?;
                writer.write_all(&idx.to_le_bytes())?;
            }
            Self::Goto { offset } => writer.write_all(&offset.to_le_bytes())?,
            Self::If { a, b, offset, .. } => {
                writer.write_all(&a.to_le_bytes())?;
                writer.write_all(&b.to_le_bytes())?;
                writer.write_all(&offset.to_le_bytes())?;
            }
            Self::IfZero { a, offset, .. } => {
                writer.write_all(&a.to_le_bytes())?;
                writer.write_all(&offset.to_le_bytes())?;
            }
            Self::Binary { dst, a, b, .. } => {
                writer.write_all(&dst.to_le_bytes())?;
                writer.write_all(&a.to_le_bytes())?;
                writer.write_all(&b.to_le_bytes())?;
            }
            Self::Invoke {
                method_idx, args, ..
            } => {
                writer.write_all(&method_idx.to_le_bytes())?;
                write_length::<u8>(writer, args.len())?;
                for arg in args {
                    writer.write_all(&arg.to_le_bytes())?;
                }
            }
        }
        Ok(())
    }

    const fn offset(&self) -> Option<i32> {
        match self {
            Self::Goto { offset } | Self::If { offset, .. } | Self::IfZero { offset, .. } => {
                Some(*offset)
            }
            _ => None,
        }
    }
}

fn branch_target(at: usize, offset: i32, len: usize) -> Result<usize, DecodeError> {
    i64::try_from(at)
        .ok()
        .map(|at| at + i64::from(offset))
        .and_then(|target| usize::try_from(target).ok())
        .filter(|target| *target < len)
        .ok_or(DecodeError::InvalidBranchTarget { at, offset })
}

/// Resolves pool indices and turns branch offsets into labels.
///
/// Labels are numbered in the order of their positions, so decoding is deterministic.
pub(super) fn lift(raw: &[RawInstruction], pools: &Pools) -> Result<Vec<Instruction>, DecodeError> {
    let targets = raw
        .iter()
        .enumerate()
        .filter_map(|(at, insn)| insn.offset().map(|offset| (at, offset)))
        .map(|(at, offset)| branch_target(at, offset, raw.len()))
        .collect::<Result<BTreeSet<_>, _>>()?;
    let labels: BTreeMap<usize, Label> = targets
        .into_iter()
        .zip(0u32..)
        .map(|(position, id)| (position, Label(id)))
        .collect();
    let label_at = |at: usize, offset: i32| -> Result<Label, DecodeError> {
        let target = branch_target(at, offset, raw.len())?;
        labels
            .get(&target)
            .copied()
            .ok_or(DecodeError::InvalidBranchTarget { at, offset })
    };

    let mut instructions = Vec::with_capacity(raw.len() + labels.len());
    for (at, insn) in raw.iter().enumerate() {
        if let Some(label) = labels.get(&at) {
            instructions.push(Instruction::Label(*label));
        }
        let lifted = match insn {
            RawInstruction::Nop => Instruction::Nop,
            RawInstruction::Move { kind, dst, src } => Instruction::Move {
                kind: *kind,
                dst: Reg(*dst),
                src: Reg(*src),
            },
            RawInstruction::MoveResult { kind, dst } => Instruction::MoveResult {
                kind: *kind,
                dst: Reg(*dst),
            },
            RawInstruction::ReturnVoid => Instruction::ReturnVoid,
            RawInstruction::Return { kind, src } => Instruction::Return {
                kind: *kind,
                src: Reg(*src),
            },
            RawInstruction::Const { dst, value } => Instruction::Const {
                dst: Reg(*dst),
                value: *value,
            },
            RawInstruction::ConstWide { dst, value } => Instruction::ConstWide {
                dst: Reg(*dst),
                value: *value,
            },
            RawInstruction::ConstString { dst, string_idx } => Instruction::ConstString {
                dst: Reg(*dst),
                value: pools.string(*string_idx)?.to_owned(),
            },
            RawInstruction::NewInstance { dst, type_idx } => Instruction::NewInstance {
                dst: Reg(*dst),
                class: pools.field_type(*type_idx)?,
            },
            RawInstruction::Throw { src } => Instruction::Throw { src: Reg(*src) },
            RawInstruction::Goto { offset } => Instruction::Goto {
                target: label_at(at, *offset)?,
            },
            RawInstruction::If { cmp, a, b, offset } => Instruction::If {
                cmp: *cmp,
                a: Reg(*a),
                b: Reg(*b),
                target: label_at(at, *offset)?,
            },
            RawInstruction::IfZero { cmp, a, offset } => Instruction::IfZero {
                cmp: *cmp,
                a: Reg(*a),
                target: label_at(at, *offset)?,
            },
            RawInstruction::Binary { op, dst, a, b } => Instruction::Binary {
                op: *op,
                dst: Reg(*dst),
                a: Reg(*a),
                b: Reg(*b),
            },
            RawInstruction::Invoke {
                kind,
                method_idx,
                args,
            } => Instruction::Invoke {
                kind: *kind,
                method: pools.method(*method_idx)?,
                args: args.iter().copied().map(Reg).collect(),
            },
        };
        instructions.push(lifted);
    }
    Ok(instructions)
}

/// Lowers instructions to their stored form, the inverse of [`lift`].
pub(super) fn lower(
    instructions: &[Instruction],
    pools: &PoolBuilder,
) -> Result<Vec<RawInstruction>, EncodeError> {
    let mut positions: HashMap<Label, usize> = HashMap::new();
    let mut len = 0usize;
    for insn in instructions {
        if let Instruction::Label(label) = insn {
            if positions.insert(*label, len).is_some() {
                return Err(EncodeError::DuplicateLabel(*label));
            }
        } else {
            len += 1;
        }
    }
    let offset_to = |at: usize, label: Label| -> Result<i32, EncodeError> {
        let target = *positions
            .get(&label)
            .ok_or(EncodeError::UndefinedLabel(label))?;
        if target >= len {
            return Err(EncodeError::DanglingLabel(label));
        }
        Ok(i32::try_from(target)? - i32::try_from(at)?)
    };

    let mut lowered = Vec::with_capacity(len);
    for insn in instructions {
        let at = lowered.len();
        let raw = match insn {
            Instruction::Label(_) => continue,
            Instruction::Nop => RawInstruction::Nop,
            Instruction::Move { kind, dst, src } => RawInstruction::Move {
                kind: *kind,
                dst: dst.0,
                src: src.0,
            },
            Instruction::MoveResult { kind, dst } => RawInstruction::MoveResult {
                kind: *kind,
                dst: dst.0,
            },
            Instruction::ReturnVoid => RawInstruction::ReturnVoid,
            Instruction::Return { kind, src } => RawInstruction::Return {
                kind: *kind,
                src: src.0,
            },
            Instruction::Const { dst, value } => RawInstruction::Const {
                dst: dst.0,
                value: *value,
            },
            Instruction::ConstWide { dst, value } => RawInstruction::ConstWide {
                dst: dst.0,
                value: *value,
            },
            Instruction::ConstString { dst, value } => RawInstruction::ConstString {
                dst: dst.0,
                string_idx: pools.string_index(value),
            },
            Instruction::NewInstance { dst, class } => RawInstruction::NewInstance {
                dst: dst.0,
                type_idx: pools.type_index(&class.descriptor()),
            },
            Instruction::Throw { src } => RawInstruction::Throw { src: src.0 },
            Instruction::Goto { target } => RawInstruction::Goto {
                offset: offset_to(at, *target)?,
            },
            Instruction::If { cmp, a, b, target } => RawInstruction::If {
                cmp: *cmp,
                a: a.0,
                b: b.0,
                offset: offset_to(at, *target)?,
            },
            Instruction::IfZero { cmp, a, target } => RawInstruction::IfZero {
                cmp: *cmp,
                a: a.0,
                offset: offset_to(at, *target)?,
            },
            Instruction::Binary { op, dst, a, b } => RawInstruction::Binary {
                op: *op,
                dst: dst.0,
                a: a.0,
                b: b.0,
            },
            Instruction::Invoke { kind, method, args } => RawInstruction::Invoke {
                kind: *kind,
                method_idx: pools.method_index(method),
                args: args.iter().map(|it| it.0).collect(),
            },
        };
        lowered.push(raw);
    }
    Ok(lowered)
}
