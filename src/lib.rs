//! Domotouch controller library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod bus;
pub mod config;
pub mod devices;
pub mod error;
pub mod storage;
pub mod udsm;

// Both backends compile; the ESP-IDF halves are gated inside.
pub mod adapters;
