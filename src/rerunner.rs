use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::cache::ComputationCache;
use crate::error::Error;
use crate::node::Node;
use crate::scope::{CancelToken, Scope};

/// Retry delays back off exponentially up to this cap.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

type ComputeFn = dyn Fn(&Scope) -> Result<(), Error> + Send + Sync;

/// Automatically re-runs a computation whenever its dependencies change.
///
/// The computation stops when it returns a non-retry error or after calling
/// [`stop`] (dropping the handle stops it too). There is no way to get the
/// output value out of a `Rerunner`; the computation should communicate its
/// result through side effects before returning.
///
/// [`stop`]: Rerunner::stop
pub struct Rerunner {
    shared: Arc<RerunnerShared>,
}

struct RerunnerShared {
    f: Box<ComputeFn>,
    cache: Arc<ComputationCache>,
    min_rerun_interval: Duration,
    cancel: CancelToken,
    state: Mutex<RerunnerState>,
}

struct RerunnerState {
    computation: Option<Arc<Node>>,
    retry_delay: Duration,
    last_run: Option<Instant>,
    stopped: bool,
}

impl Rerunner {
    /// Start running `f` continuously. The first run is scheduled
    /// immediately; later runs wait out at least `min_rerun_interval` since
    /// the previous one.
    pub fn new<F>(f: F, min_rerun_interval: Duration) -> Rerunner
    where
        F: Fn(&Scope) -> Result<(), Error> + Send + Sync + 'static,
    {
        let shared = Arc::new(RerunnerShared {
            f: Box::new(f),
            cache: Arc::new(ComputationCache::new()),
            min_rerun_interval,
            cancel: CancelToken::new(),
            state: Mutex::new(RerunnerState {
                computation: None,
                retry_delay: min_rerun_interval,
                last_run: None,
                stopped: false,
            }),
        });
        spawn_rerun(shared.clone());
        Rerunner { shared }
    }

    /// Stop the executor and release the current computation. Idempotent.
    pub fn stop(&self) {
        // Cancel before taking the lock; a running computation may hold it
        // for a long time.
        self.shared.cancel.cancel();

        let mut state = self.shared.state.lock();
        state.stopped = true;
        if let Some(computation) = state.computation.take() {
            release_async(computation);
        }
    }
}

impl Drop for Rerunner {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_rerun(shared: Arc<RerunnerShared>) {
    thread::spawn(move || rerun(shared));
}

/// One re-run cycle: wait out the delay, execute the computation under a
/// fresh node, then install the result or schedule a retry.
fn rerun(shared: Arc<RerunnerShared>) {
    let delay = {
        let state = shared.state.lock();
        match state.last_run {
            // An executor that has never run starts right away.
            None => Duration::ZERO,
            Some(last_run) => state.retry_delay.saturating_sub(last_run.elapsed()),
        }
    };
    if shared.cancel.wait_for(delay) {
        return;
    }

    let mut state = shared.state.lock();
    if state.stopped {
        return;
    }

    shared.cache.clean_invalidated();

    let computation = Node::new();
    let scope = Scope::reactive(
        computation.clone(),
        shared.cache.clone(),
        shared.cancel.clone(),
    );
    tracing::trace!("running computation");
    let result = (shared.f)(&scope);
    state.last_run = Some(Instant::now());

    match result {
        Err(Error::Retry) => {
            state.retry_delay = next_retry_delay(state.retry_delay);
            tracing::debug!(retry_delay = ?state.retry_delay, "computation asked for a retry");
            release_async(computation);
            spawn_rerun(shared.clone());
        }
        Err(err) => {
            tracing::debug!(error = %err, "computation failed, stopping");
            state.stopped = true;
            release_async(computation);
            if let Some(current) = state.computation.take() {
                release_async(current);
            }
        }
        Ok(()) => {
            let previous = state.computation.replace(computation.clone());
            state.retry_delay = shared.min_rerun_interval;

            // Schedule a re-run whenever the new node becomes invalidated,
            // which may already have happened during the run.
            let weak: Weak<RerunnerShared> = Arc::downgrade(&shared);
            computation.handle_invalidate(Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    rerun(shared);
                }
            }));

            // The old computation is released only once the new one is
            // installed and wired, so there is no window without a live
            // computation.
            if let Some(previous) = previous {
                release_async(previous);
            }
        }
    }
}

fn next_retry_delay(delay: Duration) -> Duration {
    (delay * 2).min(MAX_RETRY_DELAY)
}

fn release_async(node: Arc<Node>) {
    thread::spawn(move || node.release());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_doubles() {
        let mut delay = Duration::from_millis(10);
        let mut observed = Vec::new();
        for _ in 0..4 {
            delay = next_retry_delay(delay);
            observed.push(delay);
        }
        assert_eq!(
            observed,
            vec![
                Duration::from_millis(20),
                Duration::from_millis(40),
                Duration::from_millis(80),
                Duration::from_millis(160),
            ]
        );
    }

    #[test]
    fn retry_delay_caps_at_one_minute() {
        assert_eq!(next_retry_delay(Duration::from_secs(45)), MAX_RETRY_DELAY);
        assert_eq!(next_retry_delay(MAX_RETRY_DELAY), MAX_RETRY_DELAY);
    }
}
