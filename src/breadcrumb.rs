//! A process-wide marker recording which payload finished instrumenting the process.
use std::{fmt::Display, sync::OnceLock};

use sha2::{Digest, Sha256};

/// The SHA-256 digest of an instrumentation payload, hex encoded.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct PayloadHash(String);

impl PayloadHash {
    /// Hashes the payload bytes.
    #[must_use]
    pub fn of(payload: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(payload)))
    }

    /// The hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PayloadHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The process was instrumented with a different payload.
///
/// Instrumenting again is unsafe; the process has to be restarted.
#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
#[error("The process was instrumented with payload {recorded}, but the current payload is {current}")]
pub struct PayloadHashMismatch {
    /// The hash recorded by the breadcrumb.
    pub recorded: PayloadHash,
    /// The hash of the payload being attached.
    pub current: PayloadHash,
}

/// What the breadcrumb says about a payload.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BreadcrumbState {
    /// Instrumentation never finished in this process.
    Absent,
    /// This payload already finished instrumenting the process.
    Finished,
}

/// A write-once record of the payload that finished instrumenting the process.
#[derive(Debug, Default)]
pub struct Breadcrumb {
    finished: OnceLock<PayloadHash>,
}

impl Breadcrumb {
    /// Creates an empty breadcrumb.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            finished: OnceLock::new(),
        }
    }

    /// The breadcrumb of the current process.
    pub fn global() -> &'static Breadcrumb {
        static GLOBAL: Breadcrumb = Breadcrumb::new();
        &GLOBAL
    }

    /// Compares `hash` with the recorded payload.
    ///
    /// # Errors
    /// Returns [`PayloadHashMismatch`] if a different payload finished instrumenting.
    pub fn check(&self, hash: &PayloadHash) -> Result<BreadcrumbState, PayloadHashMismatch> {
        match self.finished.get() {
            None => Ok(BreadcrumbState::Absent),
            Some(recorded) if recorded == hash => Ok(BreadcrumbState::Finished),
            Some(recorded) => Err(PayloadHashMismatch {
                recorded: recorded.clone(),
                current: hash.clone(),
            }),
        }
    }

    /// Records that `hash` finished instrumenting. Later calls are ignored.
    pub fn mark_finished(&self, hash: PayloadHash) {
        if let Err(ignored) = self.finished.set(hash) {
            tracing::warn!(payload = %ignored, "breadcrumb already written");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_sha256_hex() {
        assert_eq!(
            PayloadHash::of(b"").as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn absent_until_marked() {
        let breadcrumb = Breadcrumb::new();
        let hash = PayloadHash::of(b"payload");
        assert_eq!(breadcrumb.check(&hash), Ok(BreadcrumbState::Absent));
        breadcrumb.mark_finished(hash.clone());
        assert_eq!(breadcrumb.check(&hash), Ok(BreadcrumbState::Finished));
    }

    #[test]
    fn different_payload_is_a_mismatch() {
        let breadcrumb = Breadcrumb::new();
        breadcrumb.mark_finished(PayloadHash::of(b"v1"));
        let err = breadcrumb.check(&PayloadHash::of(b"v2")).unwrap_err();
        assert_eq!(err.recorded, PayloadHash::of(b"v1"));
        assert_eq!(err.current, PayloadHash::of(b"v2"));
    }

    #[test]
    fn first_mark_wins() {
        let breadcrumb = Breadcrumb::new();
        breadcrumb.mark_finished(PayloadHash::of(b"v1"));
        breadcrumb.mark_finished(PayloadHash::of(b"v2"));
        assert_eq!(
            breadcrumb.check(&PayloadHash::of(b"v1")),
            Ok(BreadcrumbState::Finished)
        );
    }

    #[test]
    fn global_is_a_singleton() {
        assert!(std::ptr::eq(Breadcrumb::global(), Breadcrumb::global()));
    }
}
