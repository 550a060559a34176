//! References to dex elements.
use std::fmt::Display;

use crate::types::{Descriptor, method_descriptor::MethodDescriptor};

/// A reference to a class, identified by its binary name (e.g., `java/lang/Thread`).
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash)]
pub struct ClassRef {
    /// The binary name of the class.
    pub binary_name: String,
}

impl ClassRef {
    /// The binary name of `java.lang.Object`.
    pub const JAVA_LANG_OBJECT: &'static str = "java/lang/Object";

    /// Creates a new [`ClassRef`] from a binary name.
    pub fn new<S: Into<String>>(binary_name: S) -> Self {
        ClassRef {
            binary_name: binary_name.into(),
        }
    }

    /// Creates a [`ClassRef`] from a type descriptor such as `Lpkg/Foo;`.
    #[must_use]
    pub fn from_descriptor(descriptor: &str) -> Option<Self> {
        descriptor
            .strip_prefix('L')
            .and_then(|it| it.strip_suffix(';'))
            .filter(|it| !it.is_empty())
            .map(Self::new)
    }
}

impl Descriptor for ClassRef {
    fn descriptor(&self) -> String {
        format!("L{};", self.binary_name)
    }
}

impl Display for ClassRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.binary_name)
    }
}

/// A reference to a method, the IR form of a `method_id` pool entry.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub struct MethodRef {
    /// The reference to the class declaring the method.
    pub owner: ClassRef,
    /// The name of the method.
    pub name: String,
    /// The prototype of the method.
    pub descriptor: MethodDescriptor,
}

impl MethodRef {
    /// Creates a new method reference.
    pub fn new<S: Into<String>>(owner: ClassRef, name: S, descriptor: MethodDescriptor) -> Self {
        Self {
            owner,
            name: name.into(),
            descriptor,
        }
    }

    /// Checks whether this reference names the given method.
    #[must_use]
    pub fn matches(&self, name: &str, descriptor: &MethodDescriptor) -> bool {
        self.name == name && &self.descriptor == descriptor
    }
}

impl Display for MethodRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}{}", self.owner, self.name, self.descriptor.descriptor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::arb_class_name;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn descriptor_round_trip(class_name in arb_class_name()) {
            let class = ClassRef::new(class_name);
            prop_assert_eq!(ClassRef::from_descriptor(&class.descriptor()), Some(class));
        }
    }

    #[test]
    fn rejects_non_class_descriptors() {
        assert_eq!(ClassRef::from_descriptor("I"), None);
        assert_eq!(ClassRef::from_descriptor("L;"), None);
        assert_eq!(ClassRef::from_descriptor("[Lpkg/Foo;"), None);
    }

    #[test]
    fn method_display() {
        let method = MethodRef::new(
            ClassRef::new("pkg/Foo"),
            "bar",
            "(I)V".parse().unwrap(),
        );
        assert_eq!(method.to_string(), "pkg/Foo.bar(I)V");
    }
}
