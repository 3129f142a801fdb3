//! ctrack Domain Primitives
//!
//! - **Value Objects**: `NodeId`, `ControlCode`
//! - **Session Store**: injected key/value persistence for navigation state

pub mod session_store;
pub mod value_objects;

pub use session_store::*;
pub use value_objects::*;
