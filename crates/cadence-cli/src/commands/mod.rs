//! CLI command implementations.

pub mod check;
pub mod common;
pub mod drivers;
pub mod run;
pub mod walk;
