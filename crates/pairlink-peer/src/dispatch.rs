//! Ordered, single-threaded delivery of listener callbacks.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::{self, JoinHandle};

use arc_swap::ArcSwapOption;
use pairlink_transport::Peer;
use tracing::{debug, error};

use crate::callback::{ConnectionListener, StubListener};
use crate::error::{PeerError, Result};

/// One callback to deliver.
pub(crate) enum Event<M> {
    Connected(Peer),
    ConnectionFailed(PeerError),
    Disconnected(Peer),
    Message(M),
}

impl<M> Event<M> {
    fn kind(&self) -> &'static str {
        match self {
            Event::Connected(_) => "connected",
            Event::ConnectionFailed(_) => "connection_failed",
            Event::Disconnected(_) => "disconnected",
            Event::Message(_) => "message",
        }
    }

    fn deliver(self, listener: &dyn ConnectionListener<M>) {
        match self {
            Event::Connected(peer) => listener.on_connected(&peer),
            Event::ConnectionFailed(err) => listener.on_connection_failed(&err),
            Event::Disconnected(peer) => listener.on_disconnected(&peer),
            Event::Message(message) => listener.on_message(message),
        }
    }
}

enum Envelope<M> {
    Event(Event<M>),
    Shutdown,
}

/// The registered listener, held weakly.
///
/// Unset and expired both resolve to the stub at delivery time.
pub(crate) struct ListenerSlot<M> {
    current: ArcSwapOption<Weak<dyn ConnectionListener<M>>>,
    stub: Arc<dyn ConnectionListener<M>>,
}

impl<M: 'static> ListenerSlot<M> {
    pub(crate) fn new() -> Self {
        Self {
            current: ArcSwapOption::empty(),
            stub: Arc::new(StubListener),
        }
    }

    pub(crate) fn set<L>(&self, listener: &Arc<L>)
    where
        L: ConnectionListener<M> + 'static,
    {
        let weak = Arc::downgrade(listener);
        let weak: Weak<dyn ConnectionListener<M>> = weak;
        self.current.store(Some(Arc::new(weak)));
    }

    pub(crate) fn clear(&self) {
        self.current.store(None);
    }

    pub(crate) fn resolve(&self) -> Arc<dyn ConnectionListener<M>> {
        let current = self.current.load_full();
        let Some(weak) = current.as_ref() else {
            return Arc::clone(&self.stub);
        };
        if let Some(listener) = weak.upgrade() {
            return listener;
        }
        // Only reset if nobody installed a new listener in the meantime.
        self.current.compare_and_swap(&current, None);
        debug!("listener was dropped; falling back to stub");
        Arc::clone(&self.stub)
    }
}

/// Owns the dispatch thread and the queue feeding it.
pub(crate) struct Dispatcher<M> {
    tx: Sender<Envelope<M>>,
    slot: Arc<ListenerSlot<M>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<M: Send + 'static> Dispatcher<M> {
    pub(crate) fn spawn(thread_name: String) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let slot = Arc::new(ListenerSlot::new());
        let worker_slot = Arc::clone(&slot);
        let handle = thread::Builder::new()
            .name(thread_name)
            .spawn(move || run(rx, worker_slot))
            .map_err(PeerError::Spawn)?;
        Ok(Self {
            tx,
            slot,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub(crate) fn listener(&self) -> &ListenerSlot<M> {
        &self.slot
    }

    /// Queue an event. Never waits for the listener.
    pub(crate) fn enqueue(&self, event: Event<M>) {
        let kind = event.kind();
        if self.tx.send(Envelope::Event(event)).is_err() {
            debug!(event = kind, "dispatcher stopped; dropping event");
        }
    }

    /// Deliver everything already queued, then stop the thread.
    ///
    /// Does not wait when called from a callback.
    pub(crate) fn shutdown(&self) {
        let _ = self.tx.send(Envelope::Shutdown);
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            error!("dispatch thread panicked");
        }
    }
}

fn run<M: 'static>(rx: Receiver<Envelope<M>>, slot: Arc<ListenerSlot<M>>) {
    while let Ok(envelope) = rx.recv() {
        let event = match envelope {
            Envelope::Event(event) => event,
            Envelope::Shutdown => break,
        };
        let kind = event.kind();
        let listener = slot.resolve();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| event.deliver(listener.as_ref())));
        if outcome.is_err() {
            error!(event = kind, "listener panicked; continuing delivery");
        }
    }
    debug!("dispatcher stopped");
}
