//! Integration test common infrastructure.
//!
//! Drives a full in-process hub: real registries, real dispatch, real
//! broadcast fabric - only the WebSocket transport is replaced by direct
//! queues, so suites run hermetically without ports or built binaries.

pub mod harness;

#[allow(unused_imports)]
pub use harness::{TestClient, TestServer};
