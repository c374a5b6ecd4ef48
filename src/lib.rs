//! voice-playback-rs library crate
//!
//! This module exposes internal types for integration testing.
//! The main binary is in main.rs.

#[macro_use]
extern crate log;

pub mod chunks;
pub mod config;
pub mod constants;
pub mod ducking;
pub mod error;
pub mod event;
pub mod net;
pub mod options;
pub mod player;
pub mod sink;
pub mod tone;
pub mod watchdog;
