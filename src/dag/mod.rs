// src/dag/mod.rs

//! Pipeline definition: task specs and the dependency graph.
//!
//! - [`spec`] holds the immutable [`TaskSpec`] and its per-kind payloads.
//! - [`graph`] holds the [`DependencyGraph`], its validation and the
//!   topological layering used by the engine.

pub mod graph;
pub mod spec;

pub use graph::DependencyGraph;
pub use spec::{
    FormatDescriptor, LoadSpec, QualityCheckSpec, SentinelRole, SourceLocation, TaskBehavior,
    TaskSpec,
};
