//! The editable in-memory representation of a dex container and its codec.
//!
//! A [`DexFile`] is produced by [`decode`], edited in place (usually by a
//! [`Transform`](crate::transform::Transform)) and turned back into bytes by [`encode`].
//! Only [`bytecode`] knows the binary layout; everything else works on the IR.
pub mod bytecode;
mod code;
mod references;

use bitflags::bitflags;

pub use bytecode::{
    Allocator, DecodeError, EncodeError, HeapAllocator, Reader, Writer, decode, encode,
};
pub use code::{BinaryOp, Code, Comparison, Instruction, InvokeKind, Label, Reg, ValueKind};
pub use references::{ClassRef, MethodRef};

use crate::types::method_descriptor::MethodDescriptor;

/// A decoded dex container.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct DexFile {
    /// The classes defined in the container.
    pub classes: Vec<ClassDef>,
}

impl DexFile {
    /// Finds the definition of the given class.
    #[must_use]
    pub fn find_class(&self, class: &ClassRef) -> Option<&ClassDef> {
        self.classes.iter().find(|it| &it.class == class)
    }

    /// Finds the definition of the given class for editing.
    pub fn find_class_mut(&mut self, class: &ClassRef) -> Option<&mut ClassDef> {
        self.classes.iter_mut().find(|it| &it.class == class)
    }

    /// Finds the method named by `method` for editing.
    pub fn find_method_mut(&mut self, method: &MethodRef) -> Option<&mut EncodedMethod> {
        self.find_class_mut(&method.owner)?
            .find_method_mut(&method.name, &method.descriptor)
    }
}

/// A class definition.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ClassDef {
    /// The defined class.
    pub class: ClassRef,
    /// The access flags of the class.
    pub access_flags: AccessFlags,
    /// The super class, absent only for `java/lang/Object`.
    pub super_class: Option<ClassRef>,
    /// The methods declared by the class.
    pub methods: Vec<EncodedMethod>,
}

impl ClassDef {
    /// Finds a declared method by name and prototype.
    #[must_use]
    pub fn find_method(&self, name: &str, descriptor: &MethodDescriptor) -> Option<&EncodedMethod> {
        self.methods.iter().find(|it| it.id.matches(name, descriptor))
    }

    /// Finds a declared method by name and prototype for editing.
    pub fn find_method_mut(
        &mut self,
        name: &str,
        descriptor: &MethodDescriptor,
    ) -> Option<&mut EncodedMethod> {
        self.methods
            .iter_mut()
            .find(|it| it.id.matches(name, descriptor))
    }
}

/// A method declared by a [`ClassDef`].
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct EncodedMethod {
    /// The method's identity.
    pub id: MethodRef,
    /// The access flags of the method.
    pub access_flags: AccessFlags,
    /// The body of the method, absent for abstract and native methods.
    pub code: Option<Code>,
}

impl EncodedMethod {
    /// Whether the method has no `this` argument.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(AccessFlags::STATIC)
    }
}

bitflags! {
    /// The access flags of classes and methods.
    #[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
    pub struct AccessFlags: u32 {
        /// Declared `public`.
        const PUBLIC = 0x0001;
        /// Declared `private`.
        const PRIVATE = 0x0002;
        /// Declared `protected`.
        const PROTECTED = 0x0004;
        /// Declared `static`.
        const STATIC = 0x0008;
        /// Declared `final`.
        const FINAL = 0x0010;
        /// Declared `synchronized`.
        const SYNCHRONIZED = 0x0020;
        /// A bridge method generated by the compiler.
        const BRIDGE = 0x0040;
        /// Declared with variable arguments.
        const VARARGS = 0x0080;
        /// Declared `native`.
        const NATIVE = 0x0100;
        /// Is an interface.
        const INTERFACE = 0x0200;
        /// Declared `abstract`.
        const ABSTRACT = 0x0400;
        /// Declared `strictfp`.
        const STRICT = 0x0800;
        /// Not present in the source code.
        const SYNTHETIC = 0x1000;
        /// Is an annotation interface.
        const ANNOTATION = 0x2000;
        /// Is an enum class.
        const ENUM = 0x4000;
        /// A constructor or static initializer.
        const CONSTRUCTOR = 0x1_0000;
        /// Declared `synchronized` on a native method.
        const DECLARED_SYNCHRONIZED = 0x2_0000;
    }
}
