//! The class-file-load hook installed for the duration of one retransformation.
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
};

use crate::{
    dex::{self, Allocator, DecodeError, EncodeError},
    transform::Transform,
    vm::ClassFileLoad,
};

/// Why the bytes of a class could not be rewritten.
#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    /// The class bytes cannot be decoded.
    #[error("Malformed container: {0}")]
    Decode(#[from] DecodeError),
    /// The rewritten IR cannot be encoded.
    #[error("Failed to encode the rewritten class: {0}")]
    Encode(#[from] EncodeError),
    /// Rewriting panicked.
    #[error("Rewriting panicked: {0}")]
    Panicked(String),
}

/// What the bridge observed during one retransformation.
#[derive(Debug)]
pub enum BridgeOutcome {
    /// The VM never loaded the target class.
    NotReached,
    /// The class was rewritten into these bytes.
    Rewritten(Vec<u8>),
    /// The class was loaded but could not be rewritten; the VM kept the original bytes.
    Failed(RewriteError),
}

/// Rewrites one class when the VM loads it, applying all transforms targeting that class.
///
/// Loads of any other class pass through untouched.
#[derive(Debug)]
pub struct ClassFileLoadBridge<'t> {
    class_name: &'t str,
    transforms: &'t [&'t Transform],
    outcome: BridgeOutcome,
}

impl<'t> ClassFileLoadBridge<'t> {
    /// Creates a bridge rewriting `class_name` with `transforms`, applied in order.
    #[must_use]
    pub const fn new(class_name: &'t str, transforms: &'t [&'t Transform]) -> Self {
        Self {
            class_name,
            transforms,
            outcome: BridgeOutcome::NotReached,
        }
    }

    /// Handles a class file load, returning the new bytes allocated by `allocator`.
    ///
    /// Returns [`None`] for other classes and when rewriting fails.
    pub fn on_class_file_load<A: Allocator>(
        &mut self,
        event: ClassFileLoad<'_>,
        allocator: &A,
    ) -> Option<A::Buffer> {
        if event.class_name != self.class_name {
            return None;
        }
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.rewrite(event.class_data, allocator)
        }))
        .unwrap_or_else(|payload| Err(RewriteError::Panicked(panic_message(payload.as_ref()))));
        match result {
            Ok(image) => {
                tracing::debug!(class = self.class_name, size = image.as_ref().len(), "class rewritten");
                self.outcome = BridgeOutcome::Rewritten(image.as_ref().to_vec());
                Some(image)
            }
            Err(error) => {
                tracing::error!(class = self.class_name, %error, "failed to rewrite class");
                self.outcome = BridgeOutcome::Failed(error);
                None
            }
        }
    }

    /// What happened during the retransformation.
    #[must_use]
    pub fn into_outcome(self) -> BridgeOutcome {
        self.outcome
    }

    fn rewrite<A: Allocator>(
        &self,
        class_data: &[u8],
        allocator: &A,
    ) -> Result<A::Buffer, RewriteError> {
        let mut ir = dex::decode(class_data, self.class_name)?;
        for transform in self.transforms {
            transform.apply(&mut ir);
        }
        Ok(dex::encode(&ir, allocator)?)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
