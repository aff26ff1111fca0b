//! Guest Python interpreter embedded behind a capability sandbox.
//!
//! The engine hosts one guest interpreter per process. Scripts compile
//! into cached artifacts, run inside sandboxed namespaces under a
//! re-entrant execution lock, and exchange values with the host through
//! the closed `BridgeValue` set, proxying everything else by reference.

mod bridge;
mod dom_glue;
mod exec_lock;
mod foreign;
mod guest_error;
mod limits;
mod sandbox;

pub mod engine;
pub mod script;

pub use engine::{Engine, EngineConfig, EngineState, ExceptionReporter};
pub use script::{ScriptState, ScriptUnit, muted_error};

pub use pyweb_core::{
    BridgeValue, DomHost, EmbedError, EmbedResult, ForeignObject, NodeId, PageDom, ResourceLimits,
    ScriptOrigin, SecurityPolicy,
};
