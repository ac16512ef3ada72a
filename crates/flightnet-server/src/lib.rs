//! Shared library surface for the flight network server and its tests.

pub mod api;
pub mod config;
pub mod state;
pub mod terrain;
