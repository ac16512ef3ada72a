//! Flightnet CLI - offline tools for flight network files.
//!
//! The `flightnet` binary links buildings, prints distance labels and
//! exports a network from a snapshot JSON, a buildings JSON and optional
//! settings.

pub mod project;

pub use project::{link_summary, load_json, write_json, ProjectFiles};
