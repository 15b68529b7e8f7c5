//! PlantDaddy node firmware library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module, so the library
//! and its tests build on the host with no hardware.

#![deny(unused_must_use)]

pub mod app;
pub mod ble;
pub mod config;
pub mod events;
pub mod power;
pub mod sensors;
pub mod telemetry;

pub mod adapters;
