//! Serialized work lanes.
//!
//! A lane runs one job at a time, in submission order, on its own tokio
//! task. Cancellation is generational: `cancel_all` trips the token every
//! queued and running job was handed, then starts a fresh generation for
//! whatever gets enqueued next.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, trace};

type Job = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, ()> + Send>;

pub const REFRESH_NETWORK_LANE: &str = "refresh-network";
pub const USER_NETWORK_LANE: &str = "user-network";
pub const PREPARE_LANE: &str = "prepare";

pub struct Lane {
    name: &'static str,
    tx: mpsc::UnboundedSender<(CancellationToken, Job)>,
    parent: CancellationToken,
    generation: Mutex<CancellationToken>,
    pending: Arc<AtomicUsize>,
}

impl Lane {
    /// Spawn the lane's worker on the current runtime. Cancelling `parent`
    /// cancels every generation for good.
    pub fn spawn(name: &'static str, parent: &CancellationToken) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<(CancellationToken, Job)>();
        let pending = Arc::new(AtomicUsize::new(0));

        let worker_pending = pending.clone();
        tokio::spawn(async move {
            while let Some((token, job)) = rx.recv().await {
                if token.is_cancelled() {
                    trace!(lane = name, "skipping cancelled job");
                } else if AssertUnwindSafe(job(token)).catch_unwind().await.is_err() {
                    error!(lane = name, "job panicked");
                }
                worker_pending.fetch_sub(1, Ordering::SeqCst);
            }
            trace!(lane = name, "lane closed");
        });

        Self {
            name,
            tx,
            parent: parent.clone(),
            generation: Mutex::new(parent.child_token()),
            pending,
        }
    }

    /// Run `job` under the lane's current generation.
    pub fn enqueue<F, Fut>(&self, job: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let token = self.generation.lock().clone();
        self.send(token, job);
    }

    /// Run `job` as a follow-up of work holding `origin`: it is skipped or
    /// cancelled as soon as `origin` is, whatever this lane's generation.
    pub fn enqueue_linked<F, Fut>(&self, origin: &CancellationToken, job: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.send(origin.child_token(), job);
    }

    fn send<F, Fut>(&self, token: CancellationToken, job: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let job: Job = Box::new(move |token| job(token).boxed());

        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send((token, job)).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            trace!(lane = self.name, "lane worker gone, job dropped");
        }
    }

    pub fn cancel_all(&self) {
        let mut generation = self.generation.lock();
        generation.cancel();
        *generation = self.parent.child_token();
    }

    /// Queued plus running jobs
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }
}
