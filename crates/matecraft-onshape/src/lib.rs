//! Onshape REST bindings for matecraft.
//!
//! [`OnshapeClient`] implements both boundary traits of `matecraft-core`:
//! assembly reads and mutations go through the assemblies API, script
//! evaluation through the part-studio FeatureScript endpoint. Results of
//! evaluation are decoded from FeatureScript value trees to plain JSON
//! before they reach the core.

pub mod client;
pub mod config;
pub mod fsvalue;
pub mod wire;

pub use client::{build_http_client, OnshapeClient};
pub use config::{ConfigError, OnshapeConfig};
