use std::any::TypeId;
use std::fmt::Debug;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Trait for sub-computation cache keys.
///
/// Cache keys must be hashable, comparable, cloneable, and thread-safe.
pub trait Key: Hash + Eq + Clone + Send + Sync + Debug + 'static {}

// Blanket implementation for all types that satisfy the bounds.
impl<T> Key for T where T: Hash + Eq + Clone + Send + Sync + Debug + 'static {}

/// Internal type-erased cache key.
///
/// Combines the key type, the cached value type, and a hash of the user's
/// key, so that callers handing the same `"users"` string to computations
/// with different key or value types never collide in the cache.
#[derive(Clone)]
pub(crate) struct ComputationKey {
    key_type: TypeId,
    value_type: TypeId,
    key_hash: u64,
    /// Debug representation for log and error messages.
    debug_repr: Arc<str>,
}

impl ComputationKey {
    pub fn new<T: 'static, K: Key>(key: &K) -> Self {
        let mut hasher = ahash::AHasher::default();
        key.hash(&mut hasher);

        Self {
            key_type: TypeId::of::<K>(),
            value_type: TypeId::of::<T>(),
            key_hash: hasher.finish(),
            debug_repr: Arc::from(format!("{key:?}")),
        }
    }
}

impl Debug for ComputationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.debug_repr)
    }
}

impl Hash for ComputationKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key_type.hash(state);
        self.value_type.hash(state);
        self.key_hash.hash(state);
    }
}

impl PartialEq for ComputationKey {
    fn eq(&self, other: &Self) -> bool {
        self.key_type == other.key_type
            && self.value_type == other.value_type
            && self.key_hash == other.key_hash
    }
}

impl Eq for ComputationKey {}
