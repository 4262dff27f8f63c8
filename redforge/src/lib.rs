//! redforge library
//!
//! Deployment lifecycle, Terraform/Ansible orchestration and the HTTP API.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod models;
pub mod server;
pub mod services;
pub mod storage;
pub mod store;
pub mod utils;
