//! stepforge - token-budgeted prompt and code packing
//!
//! Splits a prompt and the relevant parts of a source file into ordered
//! steps that each fit a per-step token ceiling, with the whole sequence
//! kept under a global ceiling.

pub mod config;
pub mod core;
