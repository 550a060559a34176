//! Runs batches of transforms against the classes loaded in a VM.
//!
//! Every class of a batch is either redefined from the [`TransformCache`] (only when every
//! class hits) or retransformed through a [`ClassFileLoadBridge`]. A class that fails to be
//! retransformed never stops the others; the failures are collected in a [`BatchReport`].
pub mod bridge;
pub mod cache;
pub mod report;


pub use bridge::{BridgeOutcome, ClassFileLoadBridge, RewriteError};
pub use cache::{TransformCache, cache_root_for};
pub use report::{BatchReport, ClassFailure, ClassOutcome, DiagnosticsReporter, TracingReporter};

use crate::{
    transform::Transform,
    vm::{ClassDefinition, ClassFileLoad, VirtualMachine, VmError},
};

/// An error that aborts or fails an instrumentation batch.
#[derive(Debug, thiserror::Error)]
pub enum InstrumentError {
    /// A target class is not loaded; nothing was instrumented.
    #[error("Class {0} is not loaded")]
    ClassNotFound(String),
    /// The class-file-load hook cannot be enabled; nothing was instrumented.
    #[error("Failed to enable the class-file-load hook: {0}")]
    EventSetup(#[source] VmError),
    /// Some classes were not instrumented; the others were.
    #[error("{} of {} classes failed to be instrumented", .0.failures().len(), .0.len())]
    RetransformFailed(BatchReport),
}

struct ClassBatch<'t, H> {
    name: &'t str,
    handle: H,
    transforms: Vec<&'t Transform>,
}

/// Applies batches of transforms to a running VM.
pub struct Instrumenter<'a, V: VirtualMachine> {
    vm: &'a V,
    cache: Option<TransformCache>,
    caching_enabled: bool,
    reporter: &'a dyn DiagnosticsReporter,
}

impl<V: VirtualMachine> std::fmt::Debug for Instrumenter<'_, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instrumenter")
            .field("cache", &self.cache)
            .field("caching_enabled", &self.caching_enabled)
            .finish_non_exhaustive()
    }
}

impl<'a, V: VirtualMachine> Instrumenter<'a, V> {
    /// Creates an instrumenter; caching is enabled whenever `cache` is present.
    pub fn new(
        vm: &'a V,
        cache: Option<TransformCache>,
        reporter: &'a dyn DiagnosticsReporter,
    ) -> Self {
        let caching_enabled = cache.is_some();
        Self {
            vm,
            cache,
            caching_enabled,
            reporter,
        }
    }

    /// Enables or disables both reading and populating the cache.
    pub fn set_caching_enabled(&mut self, enabled: bool) {
        self.caching_enabled = enabled;
    }

    fn active_cache(&self) -> Option<&TransformCache> {
        self.cache.as_ref().filter(|_| self.caching_enabled)
    }

    /// Instruments every class targeted by `transforms`.
    ///
    /// Transforms targeting the same class are applied together, in the given order.
    ///
    /// # Errors
    /// - [`InstrumentError::ClassNotFound`] if a target class is not loaded.
    /// - [`InstrumentError::EventSetup`] if the class-file-load hook cannot be enabled.
    /// - [`InstrumentError::RetransformFailed`] if at least one class was not instrumented.
    pub fn instrument(&self, transforms: &[Transform]) -> Result<BatchReport, InstrumentError> {
        let batch = self.resolve_classes(transforms)?;
        if batch.is_empty() {
            return Ok(BatchReport::default());
        }

        self.vm
            .set_class_file_load_hook_enabled(true)
            .map_err(InstrumentError::EventSetup)?;
        let report = match self.redefine_from_cache(&batch) {
            Some(report) => report,
            None => self.retransform(&batch),
        };
        if let Err(error) = self.vm.set_class_file_load_hook_enabled(false) {
            tracing::warn!(%error, "failed to disable the class-file-load hook");
        }

        if report.is_success() {
            tracing::info!(classes = report.len(), "instrumentation finished");
            Ok(report)
        } else {
            self.reporter.instrumentation_failures(&report.failures());
            Err(InstrumentError::RetransformFailed(report))
        }
    }

    fn resolve_classes<'t>(
        &self,
        transforms: &'t [Transform],
    ) -> Result<Vec<ClassBatch<'t, V::ClassHandle>>, InstrumentError> {
        let mut batch: Vec<ClassBatch<'t, V::ClassHandle>> = Vec::new();
        for transform in transforms {
            let name = transform.class_name();
            if let Some(class) = batch.iter_mut().find(|it| it.name == name) {
                class.transforms.push(transform);
                continue;
            }
            let Some(handle) = self.vm.find_class(name) else {
                tracing::error!(class = name, "target class is not loaded");
                return Err(InstrumentError::ClassNotFound(name.to_owned()));
            };
            batch.push(ClassBatch {
                name,
                handle,
                transforms: vec![transform],
            });
        }
        Ok(batch)
    }

    /// Redefines every class from the cache, or returns [`None`] if any entry is missing.
    fn redefine_from_cache(&self, batch: &[ClassBatch<'_, V::ClassHandle>]) -> Option<BatchReport> {
        let cache = self.active_cache()?;
        let mut entries = Vec::with_capacity(batch.len());
        for class in batch {
            match cache.read_class(class.name) {
                Ok(Some(bytes)) => entries.push(bytes),
                Ok(None) => {
                    tracing::debug!(class = class.name, "cache miss");
                    return None;
                }
                Err(error) => {
                    tracing::warn!(class = class.name, %error, "failed to read cache entry");
                    return None;
                }
            }
        }
        let definitions: Vec<_> = batch
            .iter()
            .zip(&entries)
            .map(|(class, bytes)| ClassDefinition {
                class: &class.handle,
                class_data: bytes,
            })
            .collect();
        if let Err(error) = self.vm.redefine_classes(&definitions) {
            tracing::warn!(%error, "redefinition from cache failed, retransforming instead");
            return None;
        }
        let mut report = BatchReport::default();
        for class in batch {
            report.record(class.name, ClassOutcome::Redefined);
        }
        Some(report)
    }

    fn retransform(&self, batch: &[ClassBatch<'_, V::ClassHandle>]) -> BatchReport {
        let mut report = BatchReport::default();
        for class in batch {
            let outcome = self.retransform_one(class);
            if let ClassOutcome::Failed(reason) = &outcome {
                tracing::warn!(class = class.name, %reason, "class not instrumented");
            }
            report.record(class.name, outcome);
        }
        report
    }

    fn retransform_one(&self, class: &ClassBatch<'_, V::ClassHandle>) -> ClassOutcome {
        let allocator = self.vm.allocator();
        let mut bridge = ClassFileLoadBridge::new(class.name, &class.transforms);
        let mut hook = |event: ClassFileLoad<'_>| bridge.on_class_file_load(event, allocator);
        let result = self.vm.retransform_class(&class.handle, &mut hook);
        match (result, bridge.into_outcome()) {
            (Err(error), _) => ClassOutcome::Failed(format!("retransformation failed: {error}")),
            (Ok(()), BridgeOutcome::Rewritten(bytes)) => {
                if let Some(cache) = self.active_cache() {
                    if let Err(error) = cache.write_class(class.name, &bytes) {
                        tracing::warn!(class = class.name, %error, "failed to write cache entry");
                    }
                }
                ClassOutcome::Retransformed
            }
            (Ok(()), BridgeOutcome::Failed(error)) => ClassOutcome::Failed(error.to_string()),
            (Ok(()), BridgeOutcome::NotReached) => {
                ClassOutcome::Failed("the class never reached the class-file-load hook".to_owned())
            }
        }
    }
}
