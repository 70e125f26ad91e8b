//! Shared fixtures for unit tests.
//!
//! Tests describe types declaratively with [`layout::LayoutBuilder`], which writes the same
//! metadata structures the runtime would emit into an in-memory [`crate::Image`]. The
//! [`runtime::StubRuntime`] answers name lookups for every type emitted this way and counts
//! the queries made against it; [`visitor::Recorder`] captures the callbacks of a walk.

pub mod layout;
pub mod runtime;
