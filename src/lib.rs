#![warn(
    clippy::pedantic,
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms
)]
#![deny(rustdoc::broken_intra_doc_links)]

//! `dexhook` rewrites the bytecode of classes already loaded in a running VM.
//!
//! A batch of [`transform::Transform`]s (entry and exit hooks, parameter rewrites and call
//! detours) is applied by an [`instrument::Instrumenter`], which drives the VM's
//! retransformation and answers its class-file-load events by decoding the class container,
//! rewriting the IR and encoding it again. Rewritten classes can be cached on disk and
//! redefined directly on the next attach.

pub mod agent;
pub mod breadcrumb;
pub mod catalog;
pub mod dex;
pub mod instrument;
pub mod transform;
pub mod types;
pub mod vm;

/// Test utilities
#[cfg(test)]
pub(crate) mod tests;
