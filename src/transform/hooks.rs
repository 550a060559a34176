use super::{ApplyOutcome, HookRef, ins_match_prototype};
use crate::{
    dex::{Code, Instruction, MethodRef},
    types::{
        field_type::FieldType,
        method_descriptor::{MethodDescriptor, ReturnType},
    },
};

/// Calls `hook` with every argument of `target` before its first instruction.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct EntryHook {
    /// The method to instrument.
    pub target: MethodRef,
    /// The static method to call.
    pub hook: HookRef,
    /// Whether `this` is passed as `java/lang/Object` rather than as the declaring class.
    pub this_as_object: bool,
}

impl EntryHook {
    /// Creates an entry hook passing `this` with its precise type.
    #[must_use]
    pub fn new(target: MethodRef, hook: HookRef) -> Self {
        Self {
            target,
            hook,
            this_as_object: false,
        }
    }

    /// Sets whether `this` is passed as `java/lang/Object`.
    #[must_use]
    pub fn this_as_object(mut self, this_as_object: bool) -> Self {
        self.this_as_object = this_as_object;
        self
    }

    /// The descriptor of the hook: `this` (for instance methods) and the parameters, returning `V`.
    #[must_use]
    pub fn hook_descriptor(&self, is_static: bool) -> MethodDescriptor {
        let this_type = if self.this_as_object {
            FieldType::object()
        } else {
            FieldType::Object(self.target.owner.clone())
        };
        let parameters = (!is_static)
            .then_some(this_type)
            .into_iter()
            .chain(self.target.descriptor.parameters_types.iter().cloned())
            .collect();
        MethodDescriptor::new(parameters, ReturnType::Void)
    }

    pub(super) fn apply(&self, code: &mut Code, is_static: bool) -> ApplyOutcome {
        if !ins_match_prototype(code, &self.target, is_static) {
            return ApplyOutcome::Skipped("incoming registers do not match the prototype");
        }
        let args = code.in_registers();
        code.reserve_outs(args.len());
        let hook = self.hook.with_descriptor(self.hook_descriptor(is_static));
        // Ahead of any label: a branch to the first instruction must not re-run the hook.
        code.instructions.insert(0, Instruction::invoke_static(hook, args));
        ApplyOutcome::Instrumented
    }
}

/// Calls `hook` right before every return of `target`.
///
/// Value-returning methods pass the returned value through the hook, which may replace it.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ExitHook {
    /// The method to instrument.
    pub target: MethodRef,
    /// The static method to call.
    pub hook: HookRef,
}

impl ExitHook {
    /// Creates an exit hook.
    #[must_use]
    pub fn new(target: MethodRef, hook: HookRef) -> Self {
        Self { target, hook }
    }

    /// The descriptor of the hook: `(R)R` for a method returning `R`, `()V` otherwise.
    #[must_use]
    pub fn hook_descriptor(&self) -> MethodDescriptor {
        match &self.target.descriptor.return_type {
            ReturnType::Void => MethodDescriptor::new(Vec::new(), ReturnType::Void),
            ReturnType::Some(ty) => {
                MethodDescriptor::new(vec![ty.clone()], ReturnType::Some(ty.clone()))
            }
        }
    }

    pub(super) fn apply(&self, code: &mut Code) -> ApplyOutcome {
        let returns_value = matches!(self.target.descriptor.return_type, ReturnType::Some(_));
        let hook = self.hook.with_descriptor(self.hook_descriptor());
        let mut max_args = 0;
        let mut wrapped = 0usize;
        let mut rewritten = Vec::with_capacity(code.instructions.len());
        for insn in code.instructions.drain(..) {
            match &insn {
                Instruction::ReturnVoid if !returns_value => {
                    rewritten.push(Instruction::invoke_static(hook.clone(), Vec::new()));
                    wrapped += 1;
                }
                Instruction::Return { kind, src } if returns_value => {
                    wrapped += 1;
                    let args = kind.registers(*src);
                    max_args = max_args.max(args.len());
                    rewritten.push(Instruction::invoke_static(hook.clone(), args));
                    rewritten.push(Instruction::MoveResult {
                        kind: *kind,
                        dst: *src,
                    });
                }
                _ => {}
            }
            rewritten.push(insn);
        }
        code.instructions = rewritten;
        if wrapped == 0 {
            return ApplyOutcome::NoCallSites;
        }
        code.reserve_outs(max_args);
        ApplyOutcome::Instrumented
    }
}
