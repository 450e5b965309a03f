//! STRIKE ENGINE: strike execution and risk-control loop
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod exchange;
pub mod analysis;
pub mod strategy;
pub mod engine;
pub mod storage;
