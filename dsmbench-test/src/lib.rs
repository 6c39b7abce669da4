//! Test utilities for the dsmbench workspace.
//!
//! This crate provides utilities to facilitate testing of the benchmark harness and the fabric it
//! drives. See the modules for all available utilities.

pub mod tracing;
