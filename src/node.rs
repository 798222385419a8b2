use std::sync::{Arc, Weak};
use std::thread;

use parking_lot::Mutex;

/// A one-shot callback registered on a node.
pub(crate) type Handler = Box<dyn FnOnce() + Send + 'static>;

/// A node in the dependency graph.
///
/// A node might be an input to a computation, such as a [`Resource`], or a
/// (sub-)computation itself. Edges point from a node to the nodes that
/// depend on it, so invalidation flows from leaves towards the computations
/// that consumed them.
///
/// A node moves through two monotone state transitions: it can become
/// *invalidated* (its value is stale and dependents must re-run), and it can
/// become *released* (nothing will ever use it again). Neither transition is
/// reversible.
///
/// Release bookkeeping runs in the opposite direction of invalidation: every
/// edge registers a watch on the dependent, and when the dependent releases,
/// the source drops the edge and decrements its live-dependent count. A node
/// that is invalidated and has lost its last live dependent releases itself,
/// which in turn ripples further towards the leaves.
///
/// [`Resource`]: crate::Resource
pub(crate) struct Node {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    /// Nodes depending on this one.
    out: Vec<Arc<Node>>,
    /// Dependents that have not been released yet.
    live_dependents: usize,
    /// Whether any dependent was ever added. Release handlers only fire for
    /// nodes that were actually used by some computation.
    saw_dependent: bool,
    invalidated: bool,
    released: bool,
    on_invalidate: Vec<Handler>,
    on_release: Vec<Handler>,
}

impl State {
    /// Transition to released if the node is invalidated, was used, and has
    /// no live dependents left. Returns the handlers to dispatch.
    fn take_release_if_ready(&mut self) -> Vec<Handler> {
        if !self.released && self.invalidated && self.saw_dependent && self.live_dependents == 0 {
            self.released = true;
            std::mem::take(&mut self.on_release)
        } else {
            Vec::new()
        }
    }
}

/// Run handlers on a fresh task, outside every node lock. A single task per
/// batch keeps handlers registered on one node in registration order.
fn dispatch(handlers: Vec<Handler>) {
    if handlers.is_empty() {
        return;
    }
    thread::spawn(move || {
        for handler in handlers {
            handler();
        }
    });
}

impl Node {
    pub fn new() -> Arc<Node> {
        Arc::new(Node {
            state: Mutex::new(State::default()),
        })
    }

    /// A throwaway node that is already released. Attaching an edge to it is
    /// a no-op with correct accounting.
    pub fn pre_released() -> Arc<Node> {
        let node = Node::new();
        node.state.lock().released = true;
        node
    }

    pub fn is_invalidated(&self) -> bool {
        self.state.lock().invalidated
    }

    fn is_released(&self) -> bool {
        self.state.lock().released
    }

    /// Record `target` as a dependent of this node.
    ///
    /// If this node is already invalidated, `target` is invalidated
    /// promptly. If this node is already released, `target` is dead on
    /// arrival: it gets invalidated and released instead of recorded.
    /// Existing edges are not re-added.
    pub fn add_out(self: &Arc<Self>, target: &Arc<Node>) {
        if target.is_released() {
            // A released dependent contributes nothing to invalidation or
            // release accounting.
            return;
        }

        let invalidated;
        {
            let mut state = self.state.lock();
            if state.released {
                let target = target.clone();
                drop(state);
                thread::spawn(move || {
                    target.invalidate();
                    target.release();
                });
                return;
            }
            if state.out.iter().any(|o| Arc::ptr_eq(o, target)) {
                return;
            }
            state.out.push(target.clone());
            state.live_dependents += 1;
            state.saw_dependent = true;
            invalidated = state.invalidated;
        }

        if invalidated {
            target.invalidate();
        }

        let source = Arc::downgrade(self);
        let dependent: Weak<Node> = Arc::downgrade(target);
        target.handle_release(Box::new(move || {
            if let Some(source) = source.upgrade() {
                source.dependent_released(dependent.as_ptr());
            }
        }));
    }

    /// Permanently mark this node as stale and forward the invalidation to
    /// all dependents. Idempotent after the first call.
    pub fn invalidate(&self) {
        let (invalidate_handlers, release_handlers, out);
        {
            let mut state = self.state.lock();
            if state.invalidated {
                return;
            }
            state.invalidated = true;
            invalidate_handlers = std::mem::take(&mut state.on_invalidate);
            out = state.out.clone();
            release_handlers = state.take_release_if_ready();
        }
        dispatch(invalidate_handlers);
        dispatch(release_handlers);
        for dependent in out {
            dependent.invalidate();
        }
    }

    /// Invalidate a snapshot of the current dependents without marking this
    /// node itself; new dependents may still be added afterwards.
    pub fn strobe(&self) {
        let out = self.state.lock().out.clone();
        for dependent in out {
            dependent.invalidate();
        }
    }

    /// Mark this node as released, run its release handlers, and forward the
    /// release to all dependents. Idempotent.
    pub fn release(&self) {
        let (handlers, out);
        {
            let mut state = self.state.lock();
            if state.released {
                return;
            }
            state.released = true;
            handlers = std::mem::take(&mut state.on_release);
            out = std::mem::take(&mut state.out);
        }
        dispatch(handlers);
        for dependent in out {
            dependent.release();
        }
    }

    /// One dependent of this node was released; forget its edge and release
    /// this node too once it is invalidated with no dependents left.
    fn dependent_released(&self, dependent: *const Node) {
        let handlers;
        {
            let mut state = self.state.lock();
            state.out.retain(|o| !std::ptr::eq(Arc::as_ptr(o), dependent));
            state.live_dependents = state.live_dependents.saturating_sub(1);
            handlers = state.take_release_if_ready();
        }
        dispatch(handlers);
    }

    /// Register a handler to run once when this node is invalidated. If it
    /// already is, the handler runs immediately on a fresh task.
    pub fn handle_invalidate(&self, handler: Handler) {
        let mut state = self.state.lock();
        if state.invalidated {
            drop(state);
            dispatch(vec![handler]);
        } else {
            state.on_invalidate.push(handler);
        }
    }

    /// Register a handler to run once when this node is released. If it
    /// already is, the handler runs immediately on a fresh task.
    pub fn handle_release(&self, handler: Handler) {
        let mut state = self.state.lock();
        if state.released {
            drop(state);
            dispatch(vec![handler]);
        } else {
            state.on_release.push(handler);
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        // A node dropped without an explicit release (a cache eviction, for
        // example) still owes its watchers a notification, or leaf cleanup
        // would be lost. The release is not forwarded to dependents here:
        // eviction must not tear down a still-live computation.
        let state = self.state.get_mut();
        if !state.released {
            state.released = true;
            dispatch(std::mem::take(&mut state.on_release));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    const TICK: Duration = Duration::from_millis(500);

    #[test]
    fn invalidate_runs_handler_once() {
        let node = Node::new();
        let (tx, rx) = mpsc::channel();
        node.handle_invalidate(Box::new(move || {
            tx.send(()).unwrap();
        }));
        node.invalidate();
        node.invalidate();
        rx.recv_timeout(TICK).unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn handler_registered_after_invalidation_fires() {
        let node = Node::new();
        node.invalidate();
        let (tx, rx) = mpsc::channel();
        node.handle_invalidate(Box::new(move || {
            tx.send(()).unwrap();
        }));
        rx.recv_timeout(TICK).unwrap();
    }

    #[test]
    fn invalidation_reaches_dependents() {
        let source = Node::new();
        let dependent = Node::new();
        source.add_out(&dependent);
        source.invalidate();
        assert!(dependent.is_invalidated());
    }

    #[test]
    fn strobe_leaves_source_valid() {
        let source = Node::new();
        let dependent = Node::new();
        source.add_out(&dependent);
        source.strobe();
        assert!(dependent.is_invalidated());
        assert!(!source.is_invalidated());

        // The source still accepts fresh dependents.
        let next = Node::new();
        source.add_out(&next);
        assert!(!next.is_invalidated());
    }

    #[test]
    fn release_fires_after_last_dependent_goes_away() {
        let source = Node::new();
        let dependent = Node::new();
        source.add_out(&dependent);

        let (tx, rx) = mpsc::channel();
        source.handle_release(Box::new(move || {
            tx.send(()).unwrap();
        }));

        source.invalidate();
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        dependent.release();
        rx.recv_timeout(TICK).unwrap();
    }

    #[test]
    fn release_requires_a_dependent() {
        let node = Node::new();
        let (tx, rx) = mpsc::channel();
        node.handle_release(Box::new(move || {
            tx.send(()).unwrap();
        }));
        node.invalidate();
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn edge_from_released_source_kills_dependent() {
        let source = Node::new();
        source.invalidate();
        source.release();

        let dependent = Node::new();
        source.add_out(&dependent);

        let (tx, rx) = mpsc::channel();
        dependent.handle_invalidate(Box::new(move || {
            tx.send(()).unwrap();
        }));
        rx.recv_timeout(TICK).unwrap();
    }

    #[test]
    fn edge_to_pre_released_target_is_a_no_op() {
        let source = Node::new();
        source.add_out(&Node::pre_released());

        let (tx, rx) = mpsc::channel();
        source.handle_release(Box::new(move || {
            tx.send(()).unwrap();
        }));
        source.invalidate();
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn dropping_a_dependent_counts_as_release() {
        let source = Node::new();
        let (tx, rx) = mpsc::channel();
        source.handle_release(Box::new(move || {
            tx.send(()).unwrap();
        }));

        {
            let dependent = Node::new();
            source.add_out(&dependent);
            source.invalidate();
        }
        rx.recv_timeout(TICK).unwrap();
    }

    #[test]
    fn duplicate_edges_collapse() {
        let source = Node::new();
        let dependent = Node::new();
        source.add_out(&dependent);
        source.add_out(&dependent);

        let fired = Arc::new(AtomicUsize::new(0));
        let observed = fired.clone();
        source.handle_release(Box::new(move || {
            observed.fetch_add(1, Ordering::SeqCst);
        }));

        source.invalidate();
        dependent.release();
        let deadline = Instant::now() + TICK;
        while fired.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
