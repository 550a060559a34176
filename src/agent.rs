//! Attaching to a process: the breadcrumb check, cache setup and the instrumentation batch.
use std::path::PathBuf;

use crate::{
    breadcrumb::{Breadcrumb, BreadcrumbState, PayloadHash, PayloadHashMismatch},
    catalog,
    instrument::{
        BatchReport, DiagnosticsReporter, InstrumentError, Instrumenter, TransformCache,
        cache_root_for,
    },
    transform::fingerprint,
    types::method_descriptor::InvalidDescriptor,
    vm::VirtualMachine,
};

/// The kind of deployment the agent instruments the process for.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum SwapMode {
    /// Code changes applied to a running application.
    #[default]
    ApplyChanges,
    /// Resource overlays swapped into a running application.
    OverlaySwap,
}

/// How the agent instruments the process.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Which transforms to apply.
    pub mode: SwapMode,
    /// The directory under which cache roots are created.
    pub cache_base: PathBuf,
    /// Forces caching on or off; by default only overlay swaps are cached.
    pub caching: Option<bool>,
}

impl AgentConfig {
    /// Creates a configuration for applying changes with caches under `cache_base`.
    pub fn new<P: Into<PathBuf>>(cache_base: P) -> Self {
        Self {
            mode: SwapMode::default(),
            cache_base: cache_base.into(),
            caching: None,
        }
    }

    /// Sets the swap mode.
    #[must_use]
    pub fn with_mode(mut self, mode: SwapMode) -> Self {
        self.mode = mode;
        self
    }

    /// Forces caching on or off.
    #[must_use]
    pub fn with_caching(mut self, enabled: bool) -> Self {
        self.caching = Some(enabled);
        self
    }

    /// Whether the transform cache is used.
    ///
    /// The cache directory is wiped whenever the application is installed, which happens before
    /// every code change, so caching only pays off for overlay swaps.
    #[must_use]
    pub fn caching_enabled(&self) -> bool {
        self.caching.unwrap_or(matches!(self.mode, SwapMode::OverlaySwap))
    }
}

/// The instrumentation payload: the container defining the hook classes.
#[derive(Debug, Clone)]
pub struct Payload {
    bytes: Vec<u8>,
}

impl Payload {
    /// Wraps the payload bytes.
    pub fn new<B: Into<Vec<u8>>>(bytes: B) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// The identity of the payload.
    #[must_use]
    pub fn hash(&self) -> PayloadHash {
        PayloadHash::of(&self.bytes)
    }
}

/// What an attach attempt did.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum AttachOutcome {
    /// The process was instrumented now.
    Instrumented(BatchReport),
    /// The same payload already instrumented the process; nothing was done.
    AlreadyInstrumented,
}

/// Why an attach attempt failed. The process keeps running in every case.
#[derive(Debug, thiserror::Error)]
pub enum AttachError {
    /// A different payload already instrumented the process, which must be restarted.
    #[error(transparent)]
    PayloadHashMismatch(#[from] PayloadHashMismatch),
    /// The transform catalog is broken.
    #[error("Invalid transform catalog: {0}")]
    Catalog(#[from] InvalidDescriptor),
    /// The instrumentation batch failed.
    #[error(transparent)]
    Instrumentation(#[from] InstrumentError),
}

/// Instruments the process for `config.mode`, unless `payload` already did.
///
/// On success the breadcrumb is marked, so later attach attempts with the same payload return
/// [`AttachOutcome::AlreadyInstrumented`] right away.
///
/// # Errors
/// See [`AttachError`] for more information.
pub fn attach<V: VirtualMachine>(
    vm: &V,
    config: &AgentConfig,
    payload: &Payload,
    breadcrumb: &Breadcrumb,
    reporter: &dyn DiagnosticsReporter,
) -> Result<AttachOutcome, AttachError> {
    let hash = payload.hash();
    match breadcrumb.check(&hash) {
        Ok(BreadcrumbState::Finished) => {
            tracing::info!(payload = %hash, "process already instrumented");
            return Ok(AttachOutcome::AlreadyInstrumented);
        }
        Ok(BreadcrumbState::Absent) => {}
        Err(mismatch) => {
            reporter.unhandled_failure(&mismatch.to_string());
            return Err(mismatch.into());
        }
    }

    let transforms = match config.mode {
        SwapMode::ApplyChanges => catalog::apply_changes()?,
        SwapMode::OverlaySwap => catalog::overlay_swap()?,
    };
    let cache = if config.caching_enabled() {
        let root = cache_root_for(&config.cache_base, hash.as_str(), &fingerprint(&transforms));
        match TransformCache::create(&root) {
            Ok(cache) => Some(cache),
            Err(error) => {
                tracing::warn!(root = %root.display(), %error, "caching disabled");
                None
            }
        }
    } else {
        None
    };

    let instrumenter = Instrumenter::new(vm, cache, reporter);
    let report = match instrumenter.instrument(&transforms) {
        Ok(report) => report,
        Err(error) => {
            if !matches!(error, InstrumentError::RetransformFailed(_)) {
                reporter.unhandled_failure(&error.to_string());
            }
            return Err(error.into());
        }
    };
    breadcrumb.mark_finished(hash);
    tracing::info!(mode = ?config.mode, classes = report.len(), "finished instrumenting");
    Ok(AttachOutcome::Instrumented(report))
}
