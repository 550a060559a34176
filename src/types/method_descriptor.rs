//! Method descriptors, the prototypes of dex method references.

use itertools::Itertools;
use std::{
    fmt::Display,
    str::{Chars, FromStr},
};

use super::{
    Descriptor,
    field_type::{FieldType, PrimitiveType},
};
use crate::dex::ClassRef;

/// The descriptor of a method.
/// Consists of the parameters types and the return type.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub struct MethodDescriptor {
    /// The type of the parameters.
    pub parameters_types: Vec<FieldType>,
    /// The return type.
    pub return_type: ReturnType,
}

/// Denotes the return type of a method.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub enum ReturnType {
    /// The method returns a specific type.
    Some(FieldType),
    /// The return type of the method is `void`.
    Void,
}

impl Display for ReturnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReturnType::Some(t) => t.fmt(f),
            ReturnType::Void => write!(f, "void"),
        }
    }
}

impl Display for MethodDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.descriptor())
    }
}

impl Descriptor for MethodDescriptor {
    fn descriptor(&self) -> String {
        format!(
            "({}){}",
            self.parameters_types.iter().map(FieldType::descriptor).join(""),
            self.return_type.descriptor()
        )
    }
}

impl MethodDescriptor {
    /// Creates a descriptor from its parts.
    #[must_use]
    pub fn new(parameters_types: Vec<FieldType>, return_type: ReturnType) -> Self {
        Self {
            parameters_types,
            return_type,
        }
    }

    /// The number of registers taken by the parameters, not counting `this`.
    #[must_use]
    pub fn parameter_registers(&self) -> u16 {
        self.parameters_types
            .iter()
            .map(FieldType::register_width)
            .sum()
    }

    /// Parses a single parameter type and advances the iterator past it.
    /// For an input as follows.
    /// ```text
    ///   L      java/lang/String;IJB)V
    ///   ^      ^
    ///   prefix remaining
    /// ````
    /// It returns a [`FieldType::Object`] with `"java/lang/String"` and leaves `remaining` at
    /// `IJB)V`.
    fn parse_single_param(
        prefix: char,
        remaining: &mut Chars<'_>,
    ) -> Result<FieldType, InvalidDescriptor> {
        if let Ok(p) = PrimitiveType::try_from(prefix) {
            Ok(FieldType::Base(p))
        } else {
            match prefix {
                'L' => {
                    let binary_name: String = remaining.take_while_ref(|c| *c != ';').collect();
                    match remaining.next() {
                        Some(';') if !binary_name.is_empty() => {
                            Ok(FieldType::Object(ClassRef::new(binary_name)))
                        }
                        _ => Err(InvalidDescriptor),
                    }
                }
                '[' => {
                    let next_prefix = remaining.next().ok_or(InvalidDescriptor)?;
                    Self::parse_single_param(next_prefix, remaining).map(FieldType::into_array_type)
                }
                _ => Err(InvalidDescriptor),
            }
        }
    }
}

impl FromStr for MethodDescriptor {
    type Err = InvalidDescriptor;

    fn from_str(descriptor: &str) -> Result<Self, Self::Err> {
        let mut chars = descriptor.chars();
        if chars.next() != Some('(') {
            return Err(InvalidDescriptor);
        }
        let mut parameters_types = Vec::new();
        let return_type = loop {
            match chars.next() {
                Some(')') => break ReturnType::from_str(chars.as_str())?,
                Some(c) => {
                    let param = Self::parse_single_param(c, &mut chars)?;
                    parameters_types.push(param);
                }
                None => Err(InvalidDescriptor)?,
            }
        };
        Ok(Self {
            parameters_types,
            return_type,
        })
    }
}

/// An error indicating that the descriptor string is invalid.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("Invalid descriptor")]
pub struct InvalidDescriptor;

impl FromStr for ReturnType {
    type Err = InvalidDescriptor;
    fn from_str(descriptor: &str) -> Result<Self, Self::Err> {
        if descriptor == "V" {
            Ok(ReturnType::Void)
        } else {
            FieldType::from_str(descriptor).map(ReturnType::Some)
        }
    }
}

impl Descriptor for ReturnType {
    fn descriptor(&self) -> String {
        match self {
            ReturnType::Some(it) => it.descriptor(),
            ReturnType::Void => "V".to_owned(),
        }
    }
}
