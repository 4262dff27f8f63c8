//! Integration tests for redforge

mod common;
mod test_api;
mod test_fsm;
mod test_pipelines;
