//! Line-oriented operator console: grammar plus executor.

pub mod commands;
pub mod grammar;
