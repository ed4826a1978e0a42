//! Core pipeline building blocks: dimension policy, resizing, compositing, PNG save
//! helpers, prompt synthesis and the artifact cleanup guard. These are internal
//! primitives consumed by the high-level `api` module.
pub mod artifacts;
pub mod params;
pub mod processing;
pub mod prompt;
