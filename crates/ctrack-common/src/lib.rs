//! ctrack Common - Shared types for the compliance tracker core
//!
//! This crate provides the primitives every other ctrack crate builds on:
//! - Validated identifiers (node ids, control codes)
//! - The error taxonomy
//! - The injected session store used for "resume where you left off"
//!
//! # Architecture
//!
//! ## Value Objects
//! Immutable, self-validating primitives (`NodeId`, `ControlCode`).
//!
//! ## Injected State
//! Nothing in the core touches ambient global state. Anything that must
//! survive between sessions goes through a [`SessionStore`] handed in by the
//! caller, so aggregation and resolution stay pure and testable.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod domain;
pub mod error;

pub use domain::*;
pub use error::*;
