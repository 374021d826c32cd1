//! Core types for hyv.

pub mod message;

pub use message::*;
