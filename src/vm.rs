//! The capabilities the host VM offers to the instrumenter.
//!
//! The trait mirrors the handful of JVMTI entry points the engine needs:
//! `FindClass`, `SetEventNotificationMode` for the class-file-load-hook event,
//! `RetransformClasses`, `RedefineClasses` and `Allocate`.

use crate::dex::Allocator;

/// A class being loaded or retransformed, as handed to the class-file-load hook.
#[derive(Debug, Clone, Copy)]
pub struct ClassFileLoad<'a> {
    /// The binary name of the class (e.g., `pkg/Foo`).
    pub class_name: &'a str,
    /// The current container bytes holding the class.
    pub class_data: &'a [u8],
}

/// New bytes for a loaded class, the input of [`VirtualMachine::redefine_classes`].
#[derive(Debug)]
pub struct ClassDefinition<'a, H> {
    /// The class to redefine.
    pub class: &'a H,
    /// The replacement container bytes.
    pub class_data: &'a [u8],
}

/// The callback a VM invokes for every class it (re)loads during a retransformation.
///
/// Returning [`None`] keeps the class bytes unmodified.
pub type ClassFileLoadHook<'h, A> =
    dyn FnMut(ClassFileLoad<'_>) -> Option<<A as Allocator>::Buffer> + 'h;

/// An error reported by the host VM.
#[derive(Debug, thiserror::Error)]
pub enum VmError {
    /// The class cannot be retransformed or redefined.
    #[error("Class {0} is not modifiable")]
    UnmodifiableClass(String),
    /// The VM rejected the new class bytes.
    #[error("The VM rejected the class bytes of {0}")]
    InvalidClassFormat(String),
    /// The event notification mode cannot be changed.
    #[error("Failed to change the notification mode of the class-file-load hook")]
    NotificationMode,
    /// Any other failure, with the VM's error code.
    #[error("VM call failed with error code {0}")]
    Code(u32),
}

/// The host VM.
pub trait VirtualMachine {
    /// An opaque reference to a loaded class, valid for one instrumentation batch.
    type ClassHandle;
    /// The allocator class bytes handed to the VM must come from.
    type Allocator: Allocator;

    /// Looks up a loaded class by its binary name.
    fn find_class(&self, binary_name: &str) -> Option<Self::ClassHandle>;

    /// Enables or disables the class-file-load-hook notification.
    ///
    /// # Errors
    /// Returns [`VmError`] if the VM refuses to change the mode.
    fn set_class_file_load_hook_enabled(&self, enabled: bool) -> Result<(), VmError>;

    /// Retransforms `class`, synchronously calling `hook` for every class file load it triggers.
    ///
    /// # Errors
    /// Returns [`VmError`] if the retransformation fails.
    fn retransform_class(
        &self,
        class: &Self::ClassHandle,
        hook: &mut ClassFileLoadHook<'_, Self::Allocator>,
    ) -> Result<(), VmError>;

    /// Replaces the bytes of every given class in one atomic operation.
    ///
    /// # Errors
    /// Returns [`VmError`] if any of the classes cannot be redefined; none is changed then.
    fn redefine_classes(
        &self,
        definitions: &[ClassDefinition<'_, Self::ClassHandle>],
    ) -> Result<(), VmError>;

    /// The allocator owned by the VM.
    fn allocator(&self) -> &Self::Allocator;
}
