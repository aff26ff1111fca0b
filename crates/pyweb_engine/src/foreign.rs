//! Foreign-object registry and deferred release queue.
//!
//! Guest objects with no `BridgeValue` mapping are pinned here under a
//! numeric id while a host-side `ForeignObject` proxy is alive. Proxy
//! drops can happen on any thread, without the execution lock, so a drop
//! only enqueues the id; the registry entry (and with it the pinned
//! guest reference) is removed the next time the engine enters the
//! interpreter. Namespace drops from script units use the same queue.

use std::sync::Mutex;

use hashbrown::HashMap;
use rustpython_vm::PyObjectRef;

static DEFERRED: Mutex<DeferredReleases> = Mutex::new(DeferredReleases {
    foreign_ids: Vec::new(),
    namespace_ids: Vec::new(),
});

struct DeferredReleases {
    foreign_ids: Vec<u64>,
    namespace_ids: Vec<u64>,
}

/// Releaser installed into every `ForeignObject` the bridge creates.
pub(crate) fn enqueue_foreign_release(id: u64) {
    DEFERRED
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .foreign_ids
        .push(id);
}

pub(crate) fn enqueue_namespace_release(id: u64) {
    DEFERRED
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .namespace_ids
        .push(id);
}

/// Drains `(foreign ids, namespace ids)` queued since the last entry
/// into the interpreter. Called with the execution lock held.
pub(crate) fn drain_deferred() -> (Vec<u64>, Vec<u64>) {
    let mut deferred = DEFERRED.lock().unwrap_or_else(|e| e.into_inner());
    (
        std::mem::take(&mut deferred.foreign_ids),
        std::mem::take(&mut deferred.namespace_ids),
    )
}

/// Id-to-guest-object table. Insertion pins the object (one strong
/// reference); removal releases it.
pub(crate) struct ForeignRegistry {
    objects: HashMap<u64, PyObjectRef>,
    next_id: u64,
}

impl ForeignRegistry {
    pub(crate) fn new() -> Self {
        ForeignRegistry {
            objects: HashMap::new(),
            next_id: 1,
        }
    }

    pub(crate) fn insert(&mut self, object: PyObjectRef) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.objects.insert(id, object);
        id
    }

    pub(crate) fn get(&self, id: u64) -> Option<&PyObjectRef> {
        self.objects.get(&id)
    }

    pub(crate) fn remove(&mut self, id: u64) -> Option<PyObjectRef> {
        self.objects.remove(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.objects.len()
    }

    pub(crate) fn clear(&mut self) {
        self.objects.clear();
    }
}
