//! Cross-thread event queue
//!
//! A generic FIFO of event objects shared between producer threads (the
//! decoder engine) and a single consumer thread (the event loop), plus the
//! wake primitive that tells the consumer to come drain it. The queue itself
//! is authoritative; the wake signal is only a hint and may be coalesced, so
//! a signal per empty-to-nonempty transition is sufficient.
//!
//! Draining swaps the whole backlog out under a short-held lock and processes
//! it lock-free, so producers never wait on consumer processing time.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam::channel::{self, Receiver, Sender};
use tokio::sync::Notify;

/// The event-loop wake primitive.
///
/// An opaque "please call me back on your thread soon" mechanism. `signal`
/// must be callable from any thread; `close` releases whatever resource backs
/// the signalling and makes further signals no-ops.
pub trait Waker: Send + Sync {
    fn signal(&self);
    fn close(&self);
}

/// Waker backed by a crossbeam channel.
///
/// The consumer thread blocks on the paired [`Receiver`]; a disconnect means
/// the waker was closed and the loop should exit.
pub struct ChannelWaker {
    sender: Mutex<Option<Sender<()>>>,
}

impl ChannelWaker {
    pub fn new() -> (Arc<Self>, Receiver<()>) {
        let (sender, receiver) = channel::unbounded();
        (
            Arc::new(Self {
                sender: Mutex::new(Some(sender)),
            }),
            receiver,
        )
    }
}

impl Waker for ChannelWaker {
    fn signal(&self) {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sender) = guard.as_ref() {
            let _ = sender.send(());
        }
    }

    fn close(&self) {
        // Dropping the sender disconnects the receiver and ends the loop
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Waker backed by [`tokio::sync::Notify`] for async event loops.
pub struct NotifyWaker {
    notify: Notify,
    closed: AtomicBool,
}

impl NotifyWaker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Wait for the next signal. Returns `false` once the waker is closed.
    pub async fn wait(&self) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        self.notify.notified().await;
        !self.closed.load(Ordering::Acquire)
    }
}

impl Waker for NotifyWaker {
    fn signal(&self) {
        self.notify.notify_one();
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
        self.notify.notify_one();
    }
}

/// Waker that does nothing; for polling-style consumers and tests.
pub struct NoopWaker;

impl Waker for NoopWaker {
    fn signal(&self) {}
    fn close(&self) {}
}

struct QueueState<E> {
    events: VecDeque<E>,
    closed: bool,
}

/// Thread-safe FIFO of events with bulk-swap draining.
///
/// Ordering across event kinds is preserved exactly as enqueued. The internal
/// lock is held only for push and swap, never across event processing.
pub struct EventQueue<E> {
    state: Mutex<QueueState<E>>,
    waker: Arc<dyn Waker>,
}

impl<E: Send> EventQueue<E> {
    pub fn new(waker: Arc<dyn Waker>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                events: VecDeque::new(),
                closed: false,
            }),
            waker,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue an event from any thread.
    ///
    /// Signals the waker only when the queue transitions from empty to
    /// nonempty; later pushes ride the already-pending wake-up. Returns
    /// `false` if the queue is closed and the event was discarded.
    pub fn push(&self, event: E) -> bool {
        let was_empty = {
            let mut state = self.lock();
            if state.closed {
                return false;
            }
            let was_empty = state.events.is_empty();
            state.events.push_back(event);
            was_empty
        };

        if was_empty {
            self.waker.signal();
        }
        true
    }

    /// Drain every pending event on the consumer thread.
    ///
    /// Swaps the backlog out under the lock, hands each event to `handle`
    /// with no lock held, and loops until producers stop refilling the queue
    /// mid-drain, so the consumer never goes idle with work pending.
    pub fn drain(&self, mut handle: impl FnMut(E)) {
        loop {
            let batch = {
                let mut state = self.lock();
                if state.events.is_empty() {
                    return;
                }
                std::mem::take(&mut state.events)
            };

            tracing::trace!(batch = batch.len(), "draining event batch");
            for event in batch {
                handle(event);
            }
        }
    }

    /// Discard pending events, refuse future pushes and close the waker.
    pub fn close(&self) {
        {
            let mut state = self.lock();
            state.closed = true;
            state.events.clear();
        }
        self.waker.close();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Pending event count; meaningful only for tests and diagnostics.
    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
