//! Shared test utilities for soilscan integration tests.
//!
//! This module provides:
//! - `MockEndpoints`, a scripted stand-in for the upload and processing API
//! - `TestHarness`, which wires a session to the mock and captures notices

pub mod harness;

pub use harness::{csv, MockEndpoints, TestHarness};
