use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::cache::{Computation, ComputationCache};
use crate::error::Error;
use crate::key::{ComputationKey, Key};
use crate::node::Node;
use crate::resource::Resource;

/// The context handed to a computation function.
///
/// A scope produced by a [`Rerunner`] carries the current computation and
/// the executor's memo cache; dependencies and cached sub-computations
/// attach to it. A scope can also be [`detached`], in which case the
/// reactive operations degrade gracefully: `add_dependency` is a no-op and
/// `cache` simply invokes its function.
///
/// [`Rerunner`]: crate::Rerunner
/// [`detached`]: Scope::detached
pub struct Scope {
    inner: Option<ScopeInner>,
}

#[derive(Clone)]
pub(crate) struct ScopeInner {
    /// The node every dependency added through this scope attaches to.
    pub computation: Arc<Node>,
    pub cache: Arc<ComputationCache>,
    pub cancel: CancelToken,
}

impl Scope {
    /// A scope with no executor behind it.
    pub fn detached() -> Scope {
        Scope { inner: None }
    }

    pub(crate) fn reactive(
        computation: Arc<Node>,
        cache: Arc<ComputationCache>,
        cancel: CancelToken,
    ) -> Scope {
        Scope {
            inner: Some(ScopeInner {
                computation,
                cache,
                cancel,
            }),
        }
    }

    /// Whether this scope belongs to a running executor.
    pub fn has_rerunner(&self) -> bool {
        self.inner.is_some()
    }

    /// Whether the executor behind this scope has been stopped. In-flight
    /// computations are expected to observe this and abort.
    pub fn is_canceled(&self) -> bool {
        self.inner
            .as_ref()
            .map_or(false, |inner| inner.cancel.is_canceled())
    }

    /// Record that the current computation depends on `resource`, so
    /// invalidating the resource re-runs the computation.
    ///
    /// On a detached scope the edge attaches to a throwaway released node,
    /// making the call a no-op with correct accounting.
    pub fn add_dependency(&self, resource: &Resource) {
        match &self.inner {
            Some(inner) => resource.node().add_out(&inner.computation),
            None => resource.node().add_out(&Node::pre_released()),
        }
    }

    /// Run `f` as a memoized sub-computation identified by `key`.
    ///
    /// Within one re-run cycle, at most one execution of `f` happens per
    /// key: concurrent callers block on a per-key lock and share the first
    /// result. A cached sub-computation is reused across re-runs until its
    /// own dependencies are invalidated. Either way the sub-computation is
    /// linked as a dependency of the current computation before its value is
    /// returned.
    ///
    /// On a detached scope, `f` simply runs and its value is returned.
    pub fn cache<K, T, F>(&self, key: K, f: F) -> Result<Arc<T>, Error>
    where
        K: Key,
        T: Send + Sync + 'static,
        F: FnOnce(&Scope) -> Result<T, Error>,
    {
        let Some(inner) = &self.inner else {
            return f(self).map(Arc::new);
        };

        let key = ComputationKey::new::<T, K>(&key);
        // Held for the whole build: same-key callers serialize, so a slow
        // builder is executed once, not raced.
        let _guard = inner.cache.locker.lock(key.clone());

        if let Some(child) = inner.cache.get(&key) {
            if let Ok(value) = child.value.clone().downcast::<T>() {
                child.node.add_out(&inner.computation);
                return Ok(value);
            }
        }

        let (node, value) = run_child(inner, f)?;
        inner.cache.set(
            key,
            Computation {
                node: node.clone(),
                value: value.clone(),
            },
        );
        node.add_out(&inner.computation);
        Ok(value)
    }
}

/// Execute `f` under a fresh child computation node. On failure the node is
/// released asynchronously and the error propagates.
fn run_child<T, F>(parent: &ScopeInner, f: F) -> Result<(Arc<Node>, Arc<T>), Error>
where
    T: Send + Sync + 'static,
    F: FnOnce(&Scope) -> Result<T, Error>,
{
    let node = Node::new();
    let scope = Scope::reactive(node.clone(), parent.cache.clone(), parent.cancel.clone());
    match f(&scope) {
        Ok(value) => Ok((node, Arc::new(value))),
        Err(err) => {
            std::thread::spawn(move || node.release());
            Err(err)
        }
    }
}

/// Cancellation signal shared between an executor and its computations.
///
/// Doubles as the executor's timer: `wait_for` sleeps until the timeout
/// elapses or the token is canceled, whichever comes first.
#[derive(Clone)]
pub(crate) struct CancelToken {
    inner: Arc<CancelState>,
}

struct CancelState {
    canceled: Mutex<bool>,
    condvar: Condvar,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancelState {
                canceled: Mutex::new(false),
                condvar: Condvar::new(),
            }),
        }
    }

    pub fn cancel(&self) {
        let mut canceled = self.inner.canceled.lock();
        *canceled = true;
        self.inner.condvar.notify_all();
    }

    pub fn is_canceled(&self) -> bool {
        *self.inner.canceled.lock()
    }

    /// Sleep for `timeout` or until canceled. Returns true if canceled.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut canceled = self.inner.canceled.lock();
        while !*canceled {
            if self
                .inner
                .condvar
                .wait_until(&mut canceled, deadline)
                .timed_out()
            {
                return *canceled;
            }
        }
        true
    }
}
