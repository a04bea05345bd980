//! Strata migration command-line tool
//!
//! The binary (`main.rs`) is a thin shell over this library so the argument
//! handling and report formatting can be tested on their own.

pub mod cli;
pub mod report;
