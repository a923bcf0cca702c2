//! Command-line support for the `snmp-trapd` daemon.
//!
//! Argument parsing, tracing setup, OID name hints and JSON-lines output.
//!
//! This module is only available with the `cli` feature.

pub mod args;
pub mod hints;
pub mod output;
