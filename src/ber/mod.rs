//! BER (Basic Encoding Rules) codec for SNMP.
//!
//! Decoding is strict: definite lengths only, no zero-length INTEGER or OID,
//! no trailing bytes, and every error carries the byte offset where it was
//! detected. Encoding is used for discovery reports, inform acknowledgements
//! and test traffic.

mod decode;
mod encode;
mod length;
pub mod tag;
mod value;

pub use decode::*;
pub use encode::*;
pub use length::*;
pub use value::BerValue;
