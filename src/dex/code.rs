//! Method bodies in their editable, label-based form.
use std::fmt::Display;

use itertools::Itertools;

use super::MethodRef;
use crate::types::field_type::FieldType;

/// A virtual register.
#[derive(
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Clone,
    Copy,
    derive_more::From,
    derive_more::Into,
    derive_more::Display,
)]
#[display("v{_0}")]
pub struct Reg(pub u16);

/// A branch target. Labels are pseudo-instructions that occupy no space in the encoded form.
#[derive(
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Clone,
    Copy,
    derive_more::From,
    derive_more::Display,
)]
#[display(":L{_0}")]
pub struct Label(pub u32);

/// The kind of value moved or returned by an instruction.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum ValueKind {
    /// A 32-bit primitive value.
    Single,
    /// A 64-bit primitive value held in a register pair.
    Wide,
    /// A reference.
    Object,
}

impl ValueKind {
    /// The kind of register(s) holding a value of the given type.
    #[must_use]
    pub const fn of(field_type: &FieldType) -> Self {
        if field_type.is_wide() {
            Self::Wide
        } else if field_type.is_reference() {
            Self::Object
        } else {
            Self::Single
        }
    }

    /// The registers used by a value of this kind starting at `reg`.
    #[must_use]
    pub fn registers(self, reg: Reg) -> Vec<Reg> {
        match self {
            Self::Wide => vec![reg, Reg(reg.0 + 1)],
            Self::Single | Self::Object => vec![reg],
        }
    }
}

/// The dispatch kind of an invoke instruction.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, derive_more::Display)]
pub enum InvokeKind {
    /// `invoke-virtual`
    #[display("virtual")]
    Virtual,
    /// `invoke-super`
    #[display("super")]
    Super,
    /// `invoke-direct`
    #[display("direct")]
    Direct,
    /// `invoke-static`
    #[display("static")]
    Static,
    /// `invoke-interface`
    #[display("interface")]
    Interface,
}

/// A comparison used by conditional branches.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, derive_more::Display)]
pub enum Comparison {
    /// Equal.
    #[display("eq")]
    Eq,
    /// Not equal.
    #[display("ne")]
    Ne,
    /// Less than.
    #[display("lt")]
    Lt,
    /// Greater or equal.
    #[display("ge")]
    Ge,
    /// Greater than.
    #[display("gt")]
    Gt,
    /// Less or equal.
    #[display("le")]
    Le,
}

/// A binary integer operation.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, derive_more::Display)]
pub enum BinaryOp {
    /// `add-int`
    #[display("add-int")]
    Add,
    /// `sub-int`
    #[display("sub-int")]
    Sub,
    /// `mul-int`
    #[display("mul-int")]
    Mul,
}

/// An instruction in a method body.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum Instruction {
    /// A branch target; occupies no space.
    Label(Label),
    /// `nop`
    Nop,
    /// `move`, `move-wide` or `move-object`.
    Move {
        /// What is moved.
        kind: ValueKind,
        /// Destination register.
        dst: Reg,
        /// Source register.
        src: Reg,
    },
    /// `move-result`, `move-result-wide` or `move-result-object`.
    MoveResult {
        /// What is moved.
        kind: ValueKind,
        /// Destination register.
        dst: Reg,
    },
    /// `return-void`
    ReturnVoid,
    /// `return`, `return-wide` or `return-object`.
    Return {
        /// What is returned.
        kind: ValueKind,
        /// Register holding the returned value.
        src: Reg,
    },
    /// `const`
    Const {
        /// Destination register.
        dst: Reg,
        /// The literal.
        value: i32,
    },
    /// `const-wide`
    ConstWide {
        /// Destination register pair.
        dst: Reg,
        /// The literal.
        value: i64,
    },
    /// `const-string`
    ConstString {
        /// Destination register.
        dst: Reg,
        /// The literal.
        value: String,
    },
    /// `new-instance`
    NewInstance {
        /// Destination register.
        dst: Reg,
        /// The instantiated class type.
        class: FieldType,
    },
    /// `throw`
    Throw {
        /// Register holding the exception.
        src: Reg,
    },
    /// `goto`
    Goto {
        /// Branch target.
        target: Label,
    },
    /// `if-<cmp>`
    If {
        /// The comparison.
        cmp: Comparison,
        /// Left operand.
        a: Reg,
        /// Right operand.
        b: Reg,
        /// Branch target.
        target: Label,
    },
    /// `if-<cmp>z`
    IfZero {
        /// The comparison against zero.
        cmp: Comparison,
        /// The operand.
        a: Reg,
        /// Branch target.
        target: Label,
    },
    /// `add-int`, `sub-int` or `mul-int`.
    Binary {
        /// The operation.
        op: BinaryOp,
        /// Destination register.
        dst: Reg,
        /// Left operand.
        a: Reg,
        /// Right operand.
        b: Reg,
    },
    /// `invoke-<kind>`
    Invoke {
        /// The dispatch kind.
        kind: InvokeKind,
        /// The invoked method.
        method: MethodRef,
        /// Argument registers, the receiver first for non-static kinds.
        args: Vec<Reg>,
    },
}

impl Instruction {
    /// Whether the instruction leaves the method normally.
    #[must_use]
    pub const fn is_return(&self) -> bool {
        matches!(self, Self::ReturnVoid | Self::Return { .. })
    }

    /// The branch target of the instruction, if any.
    #[must_use]
    pub const fn branch_target(&self) -> Option<Label> {
        match self {
            Self::Goto { target } | Self::If { target, .. } | Self::IfZero { target, .. } => {
                Some(*target)
            }
            _ => None,
        }
    }

    /// Creates an `invoke-static` of `method` with the given arguments.
    #[must_use]
    pub fn invoke_static(method: MethodRef, args: Vec<Reg>) -> Self {
        Self::Invoke {
            kind: InvokeKind::Static,
            method,
            args,
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Label(label) => write!(f, "{label}"),
            Self::Nop => write!(f, "nop"),
            Self::Move { kind, dst, src } => write!(f, "move{} {dst}, {src}", suffix(*kind)),
            Self::MoveResult { kind, dst } => write!(f, "move-result{} {dst}", suffix(*kind)),
            Self::ReturnVoid => write!(f, "return-void"),
            Self::Return { kind, src } => write!(f, "return{} {src}", suffix(*kind)),
            Self::Const { dst, value } => write!(f, "const {dst}, {value}"),
            Self::ConstWide { dst, value } => write!(f, "const-wide {dst}, {value}"),
            Self::ConstString { dst, value } => write!(f, "const-string {dst}, {value:?}"),
            Self::NewInstance { dst, class } => write!(f, "new-instance {dst}, {class}"),
            Self::Throw { src } => write!(f, "throw {src}"),
            Self::Goto { target } => write!(f, "goto {target}"),
            Self::If { cmp, a, b, target } => write!(f, "if-{cmp} {a}, {b}, {target}"),
            Self::IfZero { cmp, a, target } => write!(f, "if-{cmp}z {a}, {target}"),
            Self::Binary { op, dst, a, b } => write!(f, "{op} {dst}, {a}, {b}"),
            Self::Invoke { kind, method, args } => {
                write!(f, "invoke-{kind} {{{}}}, {method}", args.iter().join(", "))
            }
        }
    }
}

const fn suffix(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Single => "",
        ValueKind::Wide => "-wide",
        ValueKind::Object => "-object",
    }
}

/// The body of a method.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Code {
    /// The number of registers used by the method.
    pub registers: u16,
    /// The number of registers holding incoming arguments; they are the last `ins` registers.
    pub ins: u16,
    /// The number of argument registers needed by the invokes in the body.
    pub outs: u16,
    /// The instructions, with labels interleaved.
    pub instructions: Vec<Instruction>,
}

impl Code {
    /// The first register holding an incoming argument.
    #[must_use]
    pub const fn first_in_register(&self) -> Reg {
        Reg(self.registers.saturating_sub(self.ins))
    }

    /// The registers holding the incoming arguments, `this` first for instance methods.
    #[must_use]
    pub fn in_registers(&self) -> Vec<Reg> {
        let first = self.first_in_register().0;
        (first..self.registers).map(Reg).collect()
    }

    /// Raises `outs` so that an invoke with `args` argument registers fits.
    pub fn reserve_outs(&mut self, args: usize) {
        let args = u16::try_from(args).unwrap_or(u16::MAX);
        self.outs = self.outs.max(args);
    }

    /// Iterates over the real instructions, skipping labels.
    pub fn real_instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions
            .iter()
            .filter(|it| !matches!(it, Instruction::Label(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::ClassRef;

    #[test]
    fn in_registers_are_the_last_ones() {
        let code = Code {
            registers: 5,
            ins: 2,
            outs: 0,
            instructions: vec![Instruction::ReturnVoid],
        };
        assert_eq!(code.first_in_register(), Reg(3));
        assert_eq!(code.in_registers(), vec![Reg(3), Reg(4)]);
    }

    #[test]
    fn display_invoke() {
        let insn = Instruction::invoke_static(
            MethodRef::new(ClassRef::new("pkg/Hook"), "onBar", "(I)V".parse().unwrap()),
            vec![Reg(1)],
        );
        assert_eq!(insn.to_string(), "invoke-static {v1}, pkg/Hook.onBar(I)V");
    }

    #[test]
    fn labels_are_not_real_instructions() {
        let code = Code {
            registers: 1,
            ins: 0,
            outs: 0,
            instructions: vec![
                Instruction::Label(Label(0)),
                Instruction::Nop,
                Instruction::Goto { target: Label(0) },
            ],
        };
        assert_eq!(code.real_instructions().count(), 2);
        assert_eq!(code.instructions[2].branch_target(), Some(Label(0)));
    }
}
