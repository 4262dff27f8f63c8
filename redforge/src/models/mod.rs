//! Domain models

pub mod activity;
pub mod catalog;
pub mod deployment;
pub mod infrastructure;
