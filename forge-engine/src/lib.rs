//! # forge-engine — In-process orchestration for WorkflowForge
//!
//! The [`Smith`] drives a `forge_core::Workflow` against a
//! `forge_core::Foundry`: operations in definition order, each wrapped
//! in the Russian-doll middleware pipeline, outputs recorded into
//! properties, reverse-order saga compensation on failure, cooperative
//! cancellation, and per-operation/whole-workflow deadlines.
//!
//! No durability, no distribution — one process, one linear sequence
//! per run, parallel runs isolated by giving each its own foundry.
//! Resilience (retry, circuit breaking) belongs in wrapper operations
//! the smith cannot tell apart from plain ones.
//!
//! [`Forge`] is the factory surface; [`TracingLogger`] bridges the
//! logger port onto `tracing`.

#![deny(missing_docs)]

pub mod kit;
pub mod logging;
pub mod smith;

pub use kit::Forge;
pub use logging::TracingLogger;
pub use smith::Smith;
