//! Shared test utilities for snmp-trapd integration tests.

// Not every test file uses every helper
#![allow(dead_code)]
#![allow(unused_imports)]

mod device;
mod fixtures;

pub use device::*;
pub use fixtures::*;
