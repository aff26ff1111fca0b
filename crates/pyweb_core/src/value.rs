//! Bridge value representation.
//!
//! `BridgeValue` is the only type that crosses the guest/host boundary.
//! Every conversion routine in the engine maps to and from exactly this
//! set; anything the guest produces that is not representable here is
//! wrapped as a `ForeignObject` instead of being converted.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

/// The closed sum of value kinds that may cross the runtime boundary.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum BridgeValue {
    /// Guest `None` / host absent value.
    #[default]
    Null,
    Bool(bool),
    /// Integral values that fit 64 bits convert exactly; larger guest
    /// integers fall back to `Float` (documented precision loss).
    Int(i64),
    Float(f64),
    Str(String),
    Seq(Vec<BridgeValue>),
    Map(IndexMap<String, BridgeValue>),
    /// An opaque guest object proxied by reference, never converted.
    Foreign(ForeignObject),
}

impl BridgeValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            BridgeValue::Null => "null",
            BridgeValue::Bool(_) => "bool",
            BridgeValue::Int(_) => "int",
            BridgeValue::Float(_) => "float",
            BridgeValue::Str(_) => "str",
            BridgeValue::Seq(_) => "seq",
            BridgeValue::Map(_) => "map",
            BridgeValue::Foreign(_) => "foreign",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, BridgeValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            BridgeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            BridgeValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view: ints widen to f64, floats pass through.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            BridgeValue::Int(i) => Some(*i as f64),
            BridgeValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            BridgeValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[BridgeValue]> {
        match self {
            BridgeValue::Seq(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, BridgeValue>> {
        match self {
            BridgeValue::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_foreign(&self) -> Option<&ForeignObject> {
        match self {
            BridgeValue::Foreign(obj) => Some(obj),
            _ => None,
        }
    }

    /// True when no `Foreign` node appears anywhere in the tree, i.e. the
    /// value is fully owned by the host and round-trips losslessly.
    pub fn is_foreign_free(&self) -> bool {
        match self {
            BridgeValue::Foreign(_) => false,
            BridgeValue::Seq(items) => items.iter().all(BridgeValue::is_foreign_free),
            BridgeValue::Map(map) => map.values().all(BridgeValue::is_foreign_free),
            _ => true,
        }
    }
}

impl From<bool> for BridgeValue {
    fn from(b: bool) -> Self {
        BridgeValue::Bool(b)
    }
}

impl From<i64> for BridgeValue {
    fn from(i: i64) -> Self {
        BridgeValue::Int(i)
    }
}

impl From<f64> for BridgeValue {
    fn from(f: f64) -> Self {
        BridgeValue::Float(f)
    }
}

impl From<&str> for BridgeValue {
    fn from(s: &str) -> Self {
        BridgeValue::Str(s.to_string())
    }
}

impl From<String> for BridgeValue {
    fn from(s: String) -> Self {
        BridgeValue::Str(s)
    }
}

impl From<Vec<BridgeValue>> for BridgeValue {
    fn from(items: Vec<BridgeValue>) -> Self {
        BridgeValue::Seq(items)
    }
}

/// Host-side proxy for a guest object that has no `BridgeValue` mapping.
///
/// The engine registers the underlying guest object under a numeric id
/// when the proxy is created (one guest refcount increment); when the
/// last clone of the proxy is dropped the releaser fires exactly once
/// and the engine decrements that refcount under the execution lock.
#[derive(Clone)]
pub struct ForeignObject {
    inner: Arc<ForeignInner>,
}

struct ForeignInner {
    id: u64,
    type_name: String,
    releaser: Option<Box<dyn Fn(u64) + Send + Sync>>,
}

impl ForeignObject {
    pub fn new(
        id: u64,
        type_name: impl Into<String>,
        releaser: impl Fn(u64) + Send + Sync + 'static,
    ) -> Self {
        ForeignObject {
            inner: Arc::new(ForeignInner {
                id,
                type_name: type_name.into(),
                releaser: Some(Box::new(releaser)),
            }),
        }
    }

    /// A detached proxy with no backing registry entry. Test helper.
    pub fn detached(id: u64, type_name: impl Into<String>) -> Self {
        ForeignObject {
            inner: Arc::new(ForeignInner {
                id,
                type_name: type_name.into(),
                releaser: None,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The guest-side type name of the proxied object.
    pub fn type_name(&self) -> &str {
        &self.inner.type_name
    }
}

impl Drop for ForeignInner {
    fn drop(&mut self) {
        if let Some(release) = self.releaser.take() {
            release(self.id);
        }
    }
}

impl PartialEq for ForeignObject {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl fmt::Debug for ForeignObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignObject")
            .field("id", &self.inner.id)
            .field("type_name", &self.inner.type_name)
            .finish()
    }
}
