use super::{ApplyOutcome, HookRef};
use crate::{
    dex::{Code, Instruction, InvokeKind, MethodRef},
    types::{field_type::FieldType, method_descriptor::MethodDescriptor},
};

/// Redirects the calls to `original` made by `target` to the static method `detour`.
///
/// The receiver becomes the first argument of the detour, which usually performs the original
/// call itself and observes it on the way.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DetourInvoke {
    /// The method whose call sites are rewritten.
    pub target: MethodRef,
    /// The interface or virtual method being called.
    pub original: MethodRef,
    /// The static method called instead.
    pub detour: HookRef,
}

impl DetourInvoke {
    /// Creates a detour of the calls to `original` inside `target`.
    #[must_use]
    pub fn new(target: MethodRef, original: MethodRef, detour: HookRef) -> Self {
        Self {
            target,
            original,
            detour,
        }
    }

    /// The descriptor of the detour: `(Owner, params...)R`.
    #[must_use]
    pub fn detour_descriptor(&self) -> MethodDescriptor {
        let receiver = FieldType::Object(self.original.owner.clone());
        let parameters = std::iter::once(receiver)
            .chain(self.original.descriptor.parameters_types.iter().cloned())
            .collect();
        MethodDescriptor::new(parameters, self.original.descriptor.return_type.clone())
    }

    pub(super) fn apply(&self, code: &mut Code, kind: InvokeKind) -> ApplyOutcome {
        let detour = self.detour.with_descriptor(self.detour_descriptor());
        let mut call_sites = 0usize;
        for insn in &mut code.instructions {
            match insn {
                Instruction::Invoke {
                    kind: invoke_kind,
                    method,
                    args,
                } if *invoke_kind == kind && *method == self.original => {
                    *insn = Instruction::invoke_static(detour.clone(), std::mem::take(args));
                    call_sites += 1;
                }
                _ => {}
            }
        }
        if call_sites == 0 {
            return ApplyOutcome::NoCallSites;
        }
        tracing::trace!(original = %self.original, call_sites, "detoured");
        ApplyOutcome::Instrumented
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dex::{ClassRef, Reg},
        tests::{foo_dex, hook_class},
    };

    fn call() -> MethodRef {
        MethodRef::new(
            ClassRef::new("pkg/Foo"),
            "call",
            "(Lpkg/Service;)Ljava/lang/String;".parse().unwrap(),
        )
    }

    fn service_name() -> MethodRef {
        MethodRef::new(
            ClassRef::new("pkg/Service"),
            "name",
            "()Ljava/lang/String;".parse().unwrap(),
        )
    }

    #[test]
    fn interface_call_is_redirected() {
        let mut dex = foo_dex();
        let detour = DetourInvoke::new(call(), service_name(), HookRef::new(hook_class(), "name"));
        let code = dex.find_method_mut(&call()).unwrap().code.as_mut().unwrap();
        assert_eq!(
            detour.apply(code, InvokeKind::Interface),
            ApplyOutcome::Instrumented
        );
        assert_eq!(
            code.instructions[0],
            Instruction::invoke_static(
                MethodRef::new(
                    hook_class(),
                    "name",
                    "(Lpkg/Service;)Ljava/lang/String;".parse().unwrap()
                ),
                vec![Reg(2)]
            )
        );
    }

    #[test]
    fn kind_must_match() {
        let mut dex = foo_dex();
        let detour = DetourInvoke::new(call(), service_name(), HookRef::new(hook_class(), "name"));
        let code = dex.find_method_mut(&call()).unwrap().code.as_mut().unwrap();
        let before = code.clone();
        assert_eq!(
            detour.apply(code, InvokeKind::Virtual),
            ApplyOutcome::NoCallSites
        );
        assert_eq!(code, &before);
    }
}
