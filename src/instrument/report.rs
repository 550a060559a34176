//! The result of one instrumentation batch and where failures are reported.
use std::fmt::Display;

/// What happened to one class of a batch.
#[derive(Debug, PartialEq, Eq, Clone, derive_more::Display)]
pub enum ClassOutcome {
    /// Redefined from cached bytes.
    #[display("redefined from cache")]
    Redefined,
    /// Rewritten through a retransformation.
    #[display("retransformed")]
    Retransformed,
    /// Not instrumented.
    #[display("failed: {_0}")]
    Failed(String),
}

/// A class that could not be instrumented and why.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ClassFailure {
    /// The binary name of the class.
    pub class_name: String,
    /// A description of the failure.
    pub reason: String,
}

impl Display for ClassFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.class_name, self.reason)
    }
}

/// The outcome of every class of a batch, in the order the classes were first requested.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct BatchReport {
    outcomes: Vec<(String, ClassOutcome)>,
}

impl BatchReport {
    pub(crate) fn record<S: Into<String>>(&mut self, class_name: S, outcome: ClassOutcome) {
        self.outcomes.push((class_name.into(), outcome));
    }

    /// The outcome of `class_name`, if it was part of the batch.
    #[must_use]
    pub fn outcome(&self, class_name: &str) -> Option<&ClassOutcome> {
        self.iter()
            .find(|(name, _)| *name == class_name)
            .map(|(_, outcome)| outcome)
    }

    /// Iterates over the classes of the batch and their outcomes.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ClassOutcome)> {
        self.outcomes
            .iter()
            .map(|(name, outcome)| (name.as_str(), outcome))
    }

    /// The number of classes in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether the batch was empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// The classes that failed.
    #[must_use]
    pub fn failures(&self) -> Vec<ClassFailure> {
        self.iter()
            .filter_map(|(name, outcome)| match outcome {
                ClassOutcome::Failed(reason) => Some(ClassFailure {
                    class_name: name.to_owned(),
                    reason: reason.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Whether every class was instrumented.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self
            .iter()
            .any(|(_, it)| matches!(it, ClassOutcome::Failed(_)))
    }
}

/// Receives instrumentation failures, e.g. to attach them to crash reports.
pub trait DiagnosticsReporter {
    /// Called once per batch in which at least one class failed.
    fn instrumentation_failures(&self, failures: &[ClassFailure]);

    /// Called when instrumentation is abandoned altogether.
    fn unhandled_failure(&self, message: &str);
}

/// A [`DiagnosticsReporter`] that logs everything at `error` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl DiagnosticsReporter for TracingReporter {
    fn instrumentation_failures(&self, failures: &[ClassFailure]) {
        for failure in failures {
            tracing::error!(
                class = %failure.class_name,
                reason = %failure.reason,
                "instrumentation failed"
            );
        }
    }

    fn unhandled_failure(&self, message: &str) {
        tracing::error!(reason = message, "instrumentation abandoned");
    }
}
