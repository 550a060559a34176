//! Field types, i.e., the types of parameters, return values and registers.
use std::{fmt::Display, str::FromStr};

use itertools::Itertools;

use super::{Descriptor, method_descriptor::InvalidDescriptor};
use crate::dex::ClassRef;

/// A primitive type.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum PrimitiveType {
    /// The `boolean` type.
    Boolean,
    /// The `char` type.
    Char,
    /// The `float` type.
    Float,
    /// The `double` type.
    Double,
    /// The `byte` type.
    Byte,
    /// The `short` type.
    Short,
    /// The `int` type.
    Int,
    /// The `long` type.
    Long,
}

impl TryFrom<char> for PrimitiveType {
    type Error = InvalidDescriptor;

    fn try_from(descriptor: char) -> Result<Self, Self::Error> {
        match descriptor {
            'Z' => Ok(Self::Boolean),
            'C' => Ok(Self::Char),
            'F' => Ok(Self::Float),
            'D' => Ok(Self::Double),
            'B' => Ok(Self::Byte),
            'S' => Ok(Self::Short),
            'I' => Ok(Self::Int),
            'J' => Ok(Self::Long),
            _ => Err(InvalidDescriptor),
        }
    }
}

impl PrimitiveType {
    const fn descriptor_char(self) -> char {
        match self {
            Self::Boolean => 'Z',
            Self::Char => 'C',
            Self::Float => 'F',
            Self::Double => 'D',
            Self::Byte => 'B',
            Self::Short => 'S',
            Self::Int => 'I',
            Self::Long => 'J',
        }
    }
}

impl Display for PrimitiveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Boolean => "boolean",
            Self::Char => "char",
            Self::Float => "float",
            Self::Double => "double",
            Self::Byte => "byte",
            Self::Short => "short",
            Self::Int => "int",
            Self::Long => "long",
        };
        f.write_str(name)
    }
}

/// The type of a value held in one (or two, for wide values) registers.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub enum FieldType {
    /// A primitive type.
    Base(PrimitiveType),
    /// A class or interface type.
    Object(ClassRef),
    /// An array type.
    Array(Box<FieldType>),
}

impl FieldType {
    /// Creates an array type with the given element type.
    #[must_use]
    pub fn into_array_type(self) -> Self {
        Self::Array(Box::new(self))
    }

    /// Creates an array type with `dimensions` dimensions.
    #[must_use]
    pub fn array_of(element: FieldType, dimensions: u8) -> Self {
        (0..dimensions).fold(element, |acc, _| acc.into_array_type())
    }

    /// The `java/lang/Object` type.
    #[must_use]
    pub fn object() -> Self {
        Self::Object(ClassRef::new(ClassRef::JAVA_LANG_OBJECT))
    }

    /// Returns `true` for `long` and `double`, which occupy a register pair.
    #[must_use]
    pub const fn is_wide(&self) -> bool {
        matches!(
            self,
            Self::Base(PrimitiveType::Long | PrimitiveType::Double)
        )
    }

    /// Returns `true` for class and array types.
    #[must_use]
    pub const fn is_reference(&self) -> bool {
        matches!(self, Self::Object(_) | Self::Array(_))
    }

    /// The number of registers a value of this type occupies.
    #[must_use]
    pub const fn register_width(&self) -> u16 {
        if self.is_wide() { 2 } else { 1 }
    }
}

impl Descriptor for FieldType {
    fn descriptor(&self) -> String {
        match self {
            Self::Base(it) => it.descriptor_char().to_string(),
            Self::Object(class) => class.descriptor(),
            Self::Array(inner) => format!("[{}", inner.descriptor()),
        }
    }
}

impl Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Base(it) => it.fmt(f),
            Self::Object(class) => class.fmt(f),
            Self::Array(inner) => write!(f, "{inner}[]"),
        }
    }
}

impl FromStr for FieldType {
    type Err = InvalidDescriptor;

    fn from_str(descriptor: &str) -> Result<Self, Self::Err> {
        let mut chars = descriptor.chars();
        match chars.next() {
            Some('[') => Self::from_str(chars.as_str()).map(Self::into_array_type),
            Some('L') => {
                let binary_name: String = chars.take_while_ref(|c| *c != ';').collect();
                match (chars.next(), chars.next()) {
                    (Some(';'), None) if !binary_name.is_empty() => {
                        Ok(Self::Object(ClassRef::new(binary_name)))
                    }
                    _ => Err(InvalidDescriptor),
                }
            }
            Some(c) => match chars.next() {
                None => PrimitiveType::try_from(c).map(Self::Base),
                Some(_) => Err(InvalidDescriptor),
            },
            None => Err(InvalidDescriptor),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tests::arb_field_type;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn descriptor_round_trip(field_type in arb_field_type()) {
            let descriptor = field_type.descriptor();
            prop_assert_eq!(FieldType::from_str(&descriptor), Ok(field_type));
        }
    }

    #[test]
    fn wide_types() {
        assert_eq!(FieldType::Base(PrimitiveType::Long).register_width(), 2);
        assert_eq!(FieldType::Base(PrimitiveType::Double).register_width(), 2);
        assert_eq!(FieldType::Base(PrimitiveType::Int).register_width(), 1);
        assert_eq!(FieldType::object().register_width(), 1);
    }

    #[test]
    fn object_descriptor() {
        assert_eq!(FieldType::object().descriptor(), "Ljava/lang/Object;");
        assert_eq!(
            FieldType::from_str("[[Ljava/lang/String;").map(|it| it.descriptor()),
            Ok("[[Ljava/lang/String;".to_owned())
        );
    }

    #[test]
    fn invalid_descriptors() {
        for descriptor in ["", "V", "L;", "Ljava/lang/String", "II", "Ljava/lang/String;I", "["] {
            assert!(FieldType::from_str(descriptor).is_err(), "{descriptor}");
        }
    }
}
