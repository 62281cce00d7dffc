//! Integration tests for lmis-harvest
//!
//! These tests run wiremock servers that imitate the report portal and drive
//! the transport, discovery and full harvest cycle against them.

mod common;
mod discovery_tests;
mod harvest_tests;
mod transport_tests;
