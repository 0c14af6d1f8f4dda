//! Integration tests

mod common;
mod config_test;
mod entry_flow_test;
mod exit_flow_test;
