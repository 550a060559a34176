//! Module containing the type descriptors used by dex method references.
pub mod field_type;
pub mod method_descriptor;

/// Trait for types that have a descriptor.
pub trait Descriptor {
    /// Returns the descriptor of the type.
    fn descriptor(&self) -> String;
}
