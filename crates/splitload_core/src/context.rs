//! Designated scheduling context and the blocking rendezvous onto it.
//!
//! # Responsibility
//! - Abstract the single execution context where activation must run.
//! - Provide a main-thread task queue the host drains from its own loop.
//! - Run one unit of work on the context and block until it reports back.
//!
//! # Invariants
//! - Work already on the designated context runs inline, never re-posted.
//! - The rendezvous has no timeout; a context that never drains blocks the
//!   caller indefinitely.
//! - Work dropped without running (context shut down) surfaces as
//!   `RendezvousError::Interrupted`, never as a hang.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::marker::PhantomData;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

/// Unit of work posted to a scheduling context.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// The one execution context allowed to run activation work.
pub trait SchedulingContext: Send + Sync {
    /// Whether the calling thread is this context.
    fn is_current(&self) -> bool;

    /// Queues one task. Returns the task back when the context is gone.
    fn post(&self, task: Task) -> Result<(), Task>;
}

/// Context that treats every thread as designated.
///
/// Suitable for hosts without a thread-affinity constraint.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineContext;

impl SchedulingContext for InlineContext {
    fn is_current(&self) -> bool {
        true
    }

    fn post(&self, task: Task) -> Result<(), Task> {
        task();
        Ok(())
    }
}

/// Handle to a main-thread task queue.
#[derive(Debug, Clone)]
pub struct MainQueue {
    sender: Sender<Task>,
    thread: ThreadId,
}

/// Draining side of a `MainQueue`; stays on the thread that bound it.
pub struct MainLoop {
    receiver: Receiver<Task>,
    _not_send: PhantomData<*const ()>,
}

impl MainQueue {
    /// Binds the calling thread as the designated context.
    pub fn bind() -> (MainQueue, MainLoop) {
        let (sender, receiver) = channel::unbounded();
        let queue = MainQueue {
            sender,
            thread: thread::current().id(),
        };
        let main_loop = MainLoop {
            receiver,
            _not_send: PhantomData,
        };
        (queue, main_loop)
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread
    }
}

impl SchedulingContext for MainQueue {
    fn is_current(&self) -> bool {
        thread::current().id() == self.thread
    }

    fn post(&self, task: Task) -> Result<(), Task> {
        self.sender.send(task).map_err(|err| err.into_inner())
    }
}

impl MainLoop {
    /// Runs every task queued right now. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(task) => {
                    task();
                    ran += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return ran,
            }
        }
    }

    /// Drains tasks as they arrive for `duration`. Returns how many ran.
    pub fn run_for(&self, duration: Duration) -> usize {
        let deadline = Instant::now() + duration;
        let mut ran = 0;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return ran + self.run_pending();
            }
            match self.receiver.recv_timeout(remaining) {
                Ok(task) => {
                    task();
                    ran += 1;
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return ran
                }
            }
        }
    }

    /// Drains tasks until `done` returns true, checking it every `tick`.
    pub fn run_until(&self, tick: Duration, mut done: impl FnMut() -> bool) -> usize {
        let mut ran = 0;
        while !done() {
            match self.receiver.recv_timeout(tick) {
                Ok(task) => {
                    task();
                    ran += 1;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        ran + self.run_pending()
    }
}

/// Failure to hand work to, or hear back from, the designated context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendezvousError {
    /// The context no longer accepts work.
    ContextClosed,
    /// The work was dropped before it reported a result.
    Interrupted,
}

impl Display for RendezvousError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ContextClosed => write!(f, "designated context is closed"),
            Self::Interrupted => {
                write!(f, "interrupted while waiting for the designated context")
            }
        }
    }
}

impl Error for RendezvousError {}

/// Runs `work` on `context` and blocks until it returns.
///
/// Runs inline when the caller already is the designated context.
pub fn run_on_context<T, F>(context: &dyn SchedulingContext, work: F) -> Result<T, RendezvousError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    if context.is_current() {
        return Ok(work());
    }

    let (reply_tx, reply_rx) = channel::bounded::<T>(1);
    let posted = context.post(Box::new(move || {
        let _ = reply_tx.send(work());
    }));
    if posted.is_err() {
        warn!("event=rendezvous module=context status=error error_code=context_closed");
        return Err(RendezvousError::ContextClosed);
    }

    debug!("event=rendezvous module=context status=wait");
    reply_rx.recv().map_err(|_| {
        warn!("event=rendezvous module=context status=error error_code=interrupted");
        RendezvousError::Interrupted
    })
}
