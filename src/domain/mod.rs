//! Domain module - Core types and traits

pub mod ports;

pub use ports::*;
