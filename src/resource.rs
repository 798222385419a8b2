use std::sync::Arc;
use std::thread;

use crate::node::Node;

/// A leaf-level dependency of a computation, standing in for an external
/// data source.
///
/// Computations record that they read a resource with
/// [`Scope::add_dependency`]; the owner of the resource signals changes with
/// [`invalidate`] or [`strobe`]. Cheap to clone; clones share the same
/// underlying graph node.
///
/// [`Scope::add_dependency`]: crate::Scope::add_dependency
/// [`invalidate`]: Resource::invalidate
/// [`strobe`]: Resource::strobe
#[derive(Clone)]
pub struct Resource {
    node: Arc<Node>,
}

impl Resource {
    /// Create a new resource.
    pub fn new() -> Self {
        Self { node: Node::new() }
    }

    /// Permanently invalidate the resource, re-running every computation
    /// that depends on it. Future computations that add a dependency on an
    /// invalidated resource are invalidated from birth.
    pub fn invalidate(&self) {
        let node = self.node.clone();
        thread::spawn(move || node.invalidate());
    }

    /// Invalidate all computations currently depending on the resource. The
    /// resource itself stays valid and usable by future computations.
    pub fn strobe(&self) {
        let node = self.node.clone();
        thread::spawn(move || node.strobe());
    }

    /// Register a handler to run once no live computation depends on the
    /// resource any longer.
    ///
    /// For the handler to ever run, at least one computation must have added
    /// a dependency on the resource.
    pub fn cleanup(&self, handler: impl FnOnce() + Send + 'static) {
        self.node.handle_release(Box::new(handler));
    }

    pub(crate) fn node(&self) -> &Arc<Node> {
        &self.node
    }
}

impl Default for Resource {
    fn default() -> Self {
        Self::new()
    }
}
