use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::key::ComputationKey;
use crate::locker::Locker;
use crate::node::Node;

/// A record of one execution of a computation function: its graph node plus
/// the type-erased value it produced.
#[derive(Clone)]
pub(crate) struct Computation {
    pub node: Arc<Node>,
    pub value: Arc<dyn Any + Send + Sync>,
}

/// Per-executor memoization of sub-computations.
///
/// Holds at most one computation per key per re-run cycle. Entries whose
/// node has been invalidated are dropped eagerly at the start of each
/// re-run; valid entries survive so unchanged sub-computations are reused
/// across re-runs.
pub(crate) struct ComputationCache {
    computations: Mutex<HashMap<ComputationKey, Computation, ahash::RandomState>>,
    /// Serializes builders of the same key so concurrent callers share a
    /// single execution.
    pub(crate) locker: Locker<ComputationKey>,
}

impl ComputationCache {
    pub fn new() -> Self {
        Self {
            computations: Mutex::new(HashMap::default()),
            locker: Locker::new(),
        }
    }

    pub fn get(&self, key: &ComputationKey) -> Option<Computation> {
        self.computations.lock().get(key).cloned()
    }

    /// Add a computation for `key`, keeping an existing entry if present.
    pub fn set(&self, key: ComputationKey, computation: Computation) {
        self.computations.lock().entry(key).or_insert(computation);
    }

    /// Drop every entry whose node has been invalidated. Called once per
    /// re-run cycle, before the computation executes.
    pub fn clean_invalidated(&self) {
        self.computations
            .lock()
            .retain(|_, computation| !computation.node.is_invalidated());
    }
}
