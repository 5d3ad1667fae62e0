// Shared test support code for scenario tests.
// This module provides common utilities that all test files can use.

pub mod harness;

pub use harness::{init_test_logging, settings, TestEngine};
