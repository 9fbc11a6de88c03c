//! Command-line presentation layer

pub mod commands;
pub mod display;
