//! # shotlist-core
//!
//! Core types, traits, and abstractions for the shotlist recall engine.
//!
//! This crate provides the foundational data structures and trait definitions
//! that other shotlist crates depend on.

pub mod defaults;
pub mod error;
pub mod models;
pub mod tags;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use tags::{TagCategory, TagOverlap, TagVector};
pub use traits::*;
