//! Rewrites of a single method, applied to the IR of its declaring class.
//!
//! A [`Transform`] names one target method and the hook it splices in. Several transforms may
//! target the same class; they are then applied one after another to the same [`DexFile`].
mod detour;
mod hooks;
mod parameter;

use std::fmt::Display;

use sha2::{Digest, Sha256};

pub use detour::DetourInvoke;
pub use hooks::{EntryHook, ExitHook};
pub use parameter::ModifyParameter;

use crate::{
    dex::{ClassRef, Code, DexFile, MethodRef},
    types::method_descriptor::MethodDescriptor,
};

/// A static method in the instrumentation payload, named without its descriptor.
///
/// The descriptor is derived from the method being instrumented.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct HookRef {
    /// The class declaring the hook.
    pub class: ClassRef,
    /// The name of the hook.
    pub method: String,
}

impl HookRef {
    /// Creates a reference to `class.method`.
    pub fn new<S: Into<String>>(class: ClassRef, method: S) -> Self {
        Self {
            class,
            method: method.into(),
        }
    }

    /// The hook as a method reference with the given descriptor.
    #[must_use]
    pub fn with_descriptor(&self, descriptor: MethodDescriptor) -> MethodRef {
        MethodRef::new(self.class.clone(), self.method.clone(), descriptor)
    }
}

impl Display for HookRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.class, self.method)
    }
}

/// What applying a [`Transform`] did to the IR.
#[derive(Debug, PartialEq, Eq, Clone, Copy, derive_more::Display)]
pub enum ApplyOutcome {
    /// The target method was rewritten.
    #[display("instrumented")]
    Instrumented,
    /// The class does not declare the target method.
    #[display("method not found")]
    MethodNotFound,
    /// The target method exists but cannot be rewritten (e.g., it has no code).
    #[display("skipped: {_0}")]
    Skipped(&'static str),
    /// The target method does not contain the call to redirect.
    #[display("no call sites")]
    NoCallSites,
}

impl ApplyOutcome {
    /// Whether the IR was changed.
    #[must_use]
    pub const fn is_instrumented(self) -> bool {
        matches!(self, Self::Instrumented)
    }
}

/// A rewrite of one method.
#[derive(Debug, PartialEq, Eq, Clone, derive_more::From)]
pub enum Transform {
    /// Calls a hook when the method is entered.
    EntryHook(EntryHook),
    /// Calls a hook on every normal exit of the method.
    ExitHook(ExitHook),
    /// Passes a parameter through a hook on method entry.
    ModifyParameter(ModifyParameter),
    /// Redirects `invoke-interface` calls made by the method.
    #[from(skip)]
    DetourInterfaceInvoke(DetourInvoke),
    /// Redirects `invoke-virtual` calls made by the method.
    #[from(skip)]
    DetourVirtualInvoke(DetourInvoke),
}

impl Transform {
    /// The method rewritten by this transform.
    #[must_use]
    pub fn target(&self) -> &MethodRef {
        match self {
            Self::EntryHook(it) => &it.target,
            Self::ExitHook(it) => &it.target,
            Self::ModifyParameter(it) => &it.target,
            Self::DetourInterfaceInvoke(it) | Self::DetourVirtualInvoke(it) => &it.target,
        }
    }

    /// The binary name of the class this transform applies to.
    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.target().owner.binary_name
    }

    /// Rewrites the target method in `dex`.
    ///
    /// When the method cannot be rewritten, `dex` is left untouched and the reason is logged.
    pub fn apply(&self, dex: &mut DexFile) -> ApplyOutcome {
        let outcome = match target_code(dex, self.target()) {
            Ok(TargetMethod { code, is_static }) => match self {
                Self::EntryHook(it) => it.apply(code, is_static),
                Self::ExitHook(it) => it.apply(code),
                Self::ModifyParameter(it) => it.apply(code, is_static),
                Self::DetourInterfaceInvoke(it) => {
                    it.apply(code, crate::dex::InvokeKind::Interface)
                }
                Self::DetourVirtualInvoke(it) => it.apply(code, crate::dex::InvokeKind::Virtual),
            },
            Err(outcome) => outcome,
        };
        if outcome.is_instrumented() {
            tracing::debug!(transform = %self, "method instrumented");
        } else {
            tracing::warn!(transform = %self, %outcome, "method not instrumented");
        }
        outcome
    }
}

impl Display for Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EntryHook(it) => {
                write!(f, "entry-hook {} -> {}", it.target, it.hook)?;
                if it.this_as_object {
                    write!(f, " (this as object)")?;
                }
                Ok(())
            }
            Self::ExitHook(it) => write!(f, "exit-hook {} -> {}", it.target, it.hook),
            Self::ModifyParameter(it) => write!(
                f,
                "modify-parameter {} #{} -> {}",
                it.target, it.parameter_index, it.hook
            ),
            Self::DetourInterfaceInvoke(it) => write!(
                f,
                "detour-interface {} in {} -> {}",
                it.original, it.target, it.detour
            ),
            Self::DetourVirtualInvoke(it) => write!(
                f,
                "detour-virtual {} in {} -> {}",
                it.original, it.target, it.detour
            ),
        }
    }
}

/// A digest identifying a list of transforms, in order.
#[must_use]
pub fn fingerprint(transforms: &[Transform]) -> String {
    let mut hasher = Sha256::new();
    for transform in transforms {
        hasher.update(transform.to_string().as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

struct TargetMethod<'a> {
    code: &'a mut Code,
    is_static: bool,
}

fn target_code<'a>(
    dex: &'a mut DexFile,
    target: &MethodRef,
) -> Result<TargetMethod<'a>, ApplyOutcome> {
    let method = dex
        .find_method_mut(target)
        .ok_or(ApplyOutcome::MethodNotFound)?;
    let is_static = method.is_static();
    let code = method
        .code
        .as_mut()
        .ok_or(ApplyOutcome::Skipped("method has no code"))?;
    Ok(TargetMethod { code, is_static })
}

/// Whether the incoming registers of `code` hold exactly the arguments of `target`.
fn ins_match_prototype(code: &Code, target: &MethodRef, is_static: bool) -> bool {
    code.ins == target.descriptor.parameter_registers() + u16::from(!is_static)
}
