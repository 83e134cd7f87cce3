//! chinook-ask - natural-language questions over the Chinook music store.
//!
//! This library exposes the core modules for use by the binary and integration tests.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod safety;
