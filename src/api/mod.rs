//! API Module
//!
//! Provides the REST plugin protocol and the server that hosts it.

pub mod rest;
pub mod server;

pub use rest::*;
pub use server::*;
