//! Integration tests for chinook-ask.

pub mod common;
pub mod pipeline_test;
pub mod provision_test;
pub mod store_test;
