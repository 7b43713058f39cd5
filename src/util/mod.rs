//! Utility modules for Sigmaview
//!
//! Provides the nesting-aware string splitting shared by the compiler
//! and the query parser.

pub mod split;

pub use split::{is_fully_parenthesized, split_top_level};
