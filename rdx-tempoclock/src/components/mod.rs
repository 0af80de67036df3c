//! Contains the building blocks composed into a `Clock`.
//!
//! Currently this is the lifecycle [`Emitter`](emitter::Emitter), an owned
//! observer registry that a clock uses to announce start, stop and pause
//! transitions.

pub mod emitter;
