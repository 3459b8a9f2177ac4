//! JavaScript engine adapter using V8 backend.
//!
//! This crate provides a V8-backed implementation of the `JsEngine` trait,
//! including a thread-safe interrupt handle built on isolate termination.

mod bindings;
mod conversions;
mod engine;

pub use engine::{V8Engine, V8Interrupt};
