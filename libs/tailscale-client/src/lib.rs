//! Tailscale control-plane API models

pub mod models;

pub use models::*;
