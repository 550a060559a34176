use super::{ApplyOutcome, HookRef, ins_match_prototype};
use crate::{
    dex::{Code, Instruction, MethodRef, Reg, ValueKind},
    types::method_descriptor::{MethodDescriptor, ReturnType},
};

/// Replaces a parameter of `target` on entry with the value `hook` returns for it.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ModifyParameter {
    /// The method to instrument.
    pub target: MethodRef,
    /// The index of the parameter in the prototype, not counting `this`.
    pub parameter_index: usize,
    /// The static method computing the new value, `(T)T` for a parameter of type `T`.
    pub hook: HookRef,
}

impl ModifyParameter {
    /// Creates a transform that rewrites parameter `parameter_index` of `target`.
    #[must_use]
    pub fn new(target: MethodRef, parameter_index: usize, hook: HookRef) -> Self {
        Self {
            target,
            parameter_index,
            hook,
        }
    }

    /// The register holding the parameter, given the first incoming register.
    fn parameter_register(&self, first_in: Reg, is_static: bool) -> Option<Reg> {
        let params = &self.target.descriptor.parameters_types;
        params.get(self.parameter_index)?;
        let offset: u16 = params[..self.parameter_index]
            .iter()
            .map(|it| it.register_width())
            .sum::<u16>()
            + u16::from(!is_static);
        first_in.0.checked_add(offset).map(Reg)
    }

    pub(super) fn apply(&self, code: &mut Code, is_static: bool) -> ApplyOutcome {
        let Some(param_type) = self
            .target
            .descriptor
            .parameters_types
            .get(self.parameter_index)
        else {
            return ApplyOutcome::Skipped("parameter index out of range");
        };
        if !ins_match_prototype(code, &self.target, is_static) {
            return ApplyOutcome::Skipped("incoming registers do not match the prototype");
        }
        let Some(reg) = self.parameter_register(code.first_in_register(), is_static) else {
            return ApplyOutcome::Skipped("parameter register out of range");
        };
        let kind = ValueKind::of(param_type);
        let args = kind.registers(reg);
        code.reserve_outs(args.len());
        let hook = self.hook.with_descriptor(MethodDescriptor::new(
            vec![param_type.clone()],
            ReturnType::Some(param_type.clone()),
        ));
        code.instructions.splice(
            0..0,
            [
                Instruction::invoke_static(hook, args),
                Instruction::MoveResult { kind, dst: reg },
            ],
        );
        ApplyOutcome::Instrumented
    }
}
