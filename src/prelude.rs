//! Commonly used types in one import.
//!
//! ```rust,no_run
//! use snmp_trapd::prelude::*;
//! ```

pub use crate::dispatch::{TrapReceiver, TrapReceiverBuilder};
pub use crate::error::{Error, Result};
pub use crate::oid::Oid;
pub use crate::store::{DecodedTrap, TrapKind, TrapStateStore};
pub use crate::v3::{AuthProtocol, PrivProtocol};
pub use crate::value::Value;
pub use crate::varbind::VarBind;

#[doc(no_inline)]
pub use crate::oid;
