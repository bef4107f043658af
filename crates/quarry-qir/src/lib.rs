//! Quarry Query Intermediate Representation
//!
//! Lambda-calculus-with-relational-operators trees produced by the
//! translator and consumed by the wire codec.

pub mod expr;
pub mod display;
pub mod validate;

pub use expr::*;
pub use validate::{validate, ValidateError};
