//! Core types for the guest-Python embedding bridge.
//!
//! This crate contains the fundamental types that are independent of the
//! guest interpreter:
//! - `BridgeValue` - The closed set of value kinds that may cross the boundary
//! - `ForeignObject` - Reference-counted proxy for an opaque guest object
//! - `ScriptOrigin` - Normalized document origin used for policy lookups
//! - `SecurityPolicy` - Allow-list based capability policy (builtins, modules,
//!   network, resource limits)
//! - `DomHost` - The four-primitive DOM collaborator trait

pub mod dom;
pub mod error;
pub mod origin;
pub mod policy;
pub mod value;

pub use dom::{DomHost, NodeId, PageDom};
pub use error::{EmbedError, EmbedResult};
pub use origin::ScriptOrigin;
pub use policy::{ResourceLimits, SecurityPolicy};
pub use value::{BridgeValue, ForeignObject};
