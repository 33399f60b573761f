//! The connection state machine shared by both roles.
//!
//! Work is split across named threads:
//!
//! - the caller's thread runs `connect`, `disconnect`, `send` and
//!   `set_listener`, none of which block on the transport except `send`;
//! - the `-connect` worker drains a command queue and performs lookups, opens
//!   and the accept loop, so overlapping requests run one at a time;
//! - one `-reader` thread per live channel pumps decoded messages;
//! - the `-dispatch` thread invokes the listener.
//!
//! Compound transitions (publish channel, change state, queue event) happen
//! under one mutex so listeners observe `connected`, messages and
//! `disconnected` in that order, exactly once per connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use pairlink_codec::{CodecError, MessageReceiver, MessageSender};
use pairlink_transport::{find_peer, OpenMode, Peer, PeerAcceptor, PeerDirectory, SharedIdentifier};
use tracing::{debug, error, info, warn};

use crate::callback::ConnectionListener;
use crate::channel::PeerChannel;
use crate::config::ManagerConfig;
use crate::dispatch::{Dispatcher, Event};
use crate::error::{PeerError, Result};
use crate::state::{AtomicState, ConnectionState, Role};

type CodecFactory<S, R> = dyn Fn() -> (S, R) + Send + Sync;

enum Command {
    Connect,
    Listen,
    Shutdown,
}

struct Shared<S: MessageSender, R: MessageReceiver> {
    role: Role,
    identifier: SharedIdentifier,
    directory: Arc<dyn PeerDirectory>,
    config: ManagerConfig,
    codecs: Box<CodecFactory<S, R>>,
    state: AtomicState,
    channel: ArcSwapOption<PeerChannel<S>>,
    dispatcher: Dispatcher<R::Message>,
    acceptor: Mutex<Option<Arc<dyn PeerAcceptor>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    transition: Mutex<()>,
    listening: AtomicBool,
    shutting_down: AtomicBool,
}

/// Owns at most one channel to a peer sharing this manager's identifier.
///
/// A client-role manager locates and opens the channel on
/// [`connect`](Self::connect); a server-role manager accepts it from the
/// accept loop started by [`listen`](Self::listen). Dropping the manager
/// tears it down.
pub struct ConnectionManager<S: MessageSender, R: MessageReceiver> {
    shared: Arc<Shared<S, R>>,
    commands: Sender<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<S, R> ConnectionManager<S, R>
where
    S: MessageSender + Default,
    R: MessageReceiver + Default,
{
    /// Manager whose channels use default-constructed codecs.
    pub fn new(
        role: Role,
        identifier: SharedIdentifier,
        directory: Arc<dyn PeerDirectory>,
        config: ManagerConfig,
    ) -> Result<Self> {
        Self::with_codecs(role, identifier, directory, config, || {
            (S::default(), R::default())
        })
    }
}

impl<S: MessageSender, R: MessageReceiver> ConnectionManager<S, R> {
    /// Manager that builds a fresh codec pair for every channel.
    pub fn with_codecs(
        role: Role,
        identifier: SharedIdentifier,
        directory: Arc<dyn PeerDirectory>,
        config: ManagerConfig,
        codecs: impl Fn() -> (S, R) + Send + Sync + 'static,
    ) -> Result<Self> {
        let dispatcher = Dispatcher::spawn(config.thread_name("dispatch"))?;
        let worker_name = config.thread_name("connect");
        let shared = Arc::new(Shared {
            role,
            identifier,
            directory,
            config,
            codecs: Box::new(codecs),
            state: AtomicState::new(ConnectionState::Disconnected),
            channel: ArcSwapOption::empty(),
            dispatcher,
            acceptor: Mutex::new(None),
            reader: Mutex::new(None),
            transition: Mutex::new(()),
            listening: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
        });

        let (commands, rx) = mpsc::channel();
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(worker_name)
            .spawn(move || worker_shared.run_worker(rx));
        let worker = match worker {
            Ok(handle) => handle,
            Err(err) => {
                shared.dispatcher.shutdown();
                return Err(PeerError::Spawn(err));
            }
        };
        debug!(role = %role, identifier = %identifier, "connection manager created");

        Ok(Self {
            shared,
            commands,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn role(&self) -> Role {
        self.shared.role
    }

    pub fn identifier(&self) -> &SharedIdentifier {
        &self.shared.identifier
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.load()
    }

    /// True exactly while the state is [`ConnectionState::Connected`].
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// The peer of the current channel, if any.
    pub fn peer(&self) -> Option<Peer> {
        self.shared
            .channel
            .load_full()
            .map(|channel| channel.peer().clone())
    }

    /// Register the listener for subsequent events. Held weakly: once the
    /// caller drops its `Arc`, events go to a stub.
    pub fn set_listener<L>(&self, listener: &Arc<L>)
    where
        L: ConnectionListener<R::Message> + 'static,
    {
        self.shared.dispatcher.listener().set(listener);
    }

    /// Route subsequent events to the stub.
    pub fn clear_listener(&self) {
        self.shared.dispatcher.listener().clear();
    }

    /// Refresh every directory candidate so later lookups are warm.
    /// Failures are logged, not returned.
    pub fn warm_up(&self) {
        if let Err(err) = self.shared.directory.warm_up() {
            warn!(error = %err, "peer directory warm-up failed");
        }
    }

    /// Ask the worker to locate and open a channel (client role).
    ///
    /// Returns once queued. The outcome arrives as `on_connected` or
    /// `on_connection_failed`; if already connected, `on_connected` is
    /// delivered again for the existing channel.
    pub fn connect(&self) -> Result<()> {
        self.require_role(Role::Client)?;
        self.queue(Command::Connect)
    }

    /// Start the accept loop (server role).
    pub fn listen(&self) -> Result<()> {
        self.require_role(Role::Server)?;
        if self.shared.is_shutting_down() {
            return Err(PeerError::ShutDown);
        }
        if self.shared.listening.swap(true, Ordering::AcqRel) {
            return Err(PeerError::AlreadyListening);
        }
        self.queue(Command::Listen)
    }

    /// Close the current channel without waiting for the reader to stop.
    /// `on_disconnected` follows once it has.
    pub fn disconnect(&self) -> Result<()> {
        let _transition = self.shared.lock_transition();
        if !self
            .shared
            .state
            .transition(ConnectionState::Connected, ConnectionState::Disconnecting)
        {
            return Err(PeerError::NotConnected);
        }
        if let Some(channel) = self.shared.channel.load_full() {
            info!(peer = %channel.peer(), "disconnecting");
            channel.close();
        }
        Ok(())
    }

    /// Write one message on the current channel (blocking).
    ///
    /// A stream failure closes the channel, which then disconnects the same
    /// way a read failure does.
    pub fn send(&self, message: &S::Message) -> Result<()> {
        if !self.is_connected() {
            return Err(PeerError::NotConnected);
        }
        let channel = self
            .shared
            .channel
            .load_full()
            .ok_or(PeerError::NotConnected)?;
        match channel.send(message) {
            Err(PeerError::Codec(err @ (CodecError::Io(_) | CodecError::ConnectionClosed))) => {
                warn!(peer = %channel.peer(), error = %err, "write failed; closing channel");
                self.shared.fail_channel(&channel);
                Err(PeerError::Codec(err))
            }
            other => other,
        }
    }

    /// Stop everything: accept loop, channel, worker, reader and dispatcher.
    ///
    /// Events already queued are still delivered. Idempotent; safe to call
    /// from a listener callback.
    pub fn teardown(&self) {
        let shared = &self.shared;
        if shared.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(role = %shared.role, identifier = %shared.identifier, "tearing down");
        {
            let _transition = shared.lock_transition();
            if let Some(acceptor) = lock(&shared.acceptor).take() {
                acceptor.close();
            }
            if let Some(channel) = shared.channel.load_full() {
                shared
                    .state
                    .transition(ConnectionState::Connected, ConnectionState::Disconnecting);
                channel.close();
            }
        }
        let _ = self.commands.send(Command::Shutdown);
        if let Some(worker) = lock(&self.worker).take() {
            join_thread(worker, "connect");
        }
        shared.join_reader();
        shared.dispatcher.shutdown();
    }

    fn require_role(&self, expected: Role) -> Result<()> {
        if self.shared.role == expected {
            Ok(())
        } else {
            Err(PeerError::WrongRole { expected })
        }
    }

    fn queue(&self, command: Command) -> Result<()> {
        if self.shared.is_shutting_down() {
            return Err(PeerError::ShutDown);
        }
        self.commands.send(command).map_err(|_| PeerError::ShutDown)
    }
}

impl<S: MessageSender, R: MessageReceiver> Drop for ConnectionManager<S, R> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<S: MessageSender, R: MessageReceiver> Shared<S, R> {
    fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    fn lock_transition(&self) -> MutexGuard<'_, ()> {
        lock(&self.transition)
    }

    fn join_reader(&self) {
        let handle = lock(&self.reader).take();
        if let Some(handle) = handle {
            join_thread(handle, "reader");
        }
    }

    fn run_worker(self: Arc<Self>, commands: Receiver<Command>) {
        while let Ok(command) = commands.recv() {
            match command {
                Command::Connect => self.connect_once(),
                Command::Listen => self.accept_loop(&commands),
                Command::Shutdown => break,
            }
            if self.is_shutting_down() {
                break;
            }
        }
        debug!(role = %self.role, "worker stopped");
    }

    fn connect_once(self: &Arc<Self>) {
        if self.is_shutting_down() {
            return;
        }
        {
            let _transition = self.lock_transition();
            if self.state.load() == ConnectionState::Connected {
                if let Some(channel) = self.channel.load_full() {
                    debug!(peer = %channel.peer(), "already connected; repeating on_connected");
                    self.dispatcher
                        .enqueue(Event::Connected(channel.peer().clone()));
                    return;
                }
            }
        }

        // A previous channel still winding down reports its disconnect first.
        self.join_reader();
        self.state.swap(ConnectionState::Connecting);
        info!(identifier = %self.identifier, "connecting");

        let outcome = self
            .open_channel()
            .and_then(|(channel, receiver)| self.activate(channel, receiver));
        if let Err(err) = outcome {
            warn!(identifier = %self.identifier, error = %err, "connection failed");
            self.state.swap(ConnectionState::Disconnected);
            self.dispatcher.enqueue(Event::ConnectionFailed(err));
        }
    }

    fn open_channel(&self) -> Result<(PeerChannel<S>, R)> {
        let peer = find_peer(self.directory.as_ref(), &self.identifier)?.ok_or(
            PeerError::LookupFailed {
                identifier: self.identifier,
            },
        )?;

        let mut mode = OpenMode::Verified;
        let stream = loop {
            match self.directory.open(&peer, &self.identifier, mode) {
                Ok(stream) => break stream,
                Err(err) => match mode.fallback() {
                    Some(next) => {
                        info!(peer = %peer, mode = %mode, error = %err, retry = %next, "open failed; retrying");
                        mode = next;
                    }
                    None => {
                        return Err(PeerError::ConnectFailed {
                            peer: peer.name().to_string(),
                            source: err,
                        });
                    }
                },
            }
        };
        debug!(peer = %peer, mode = %mode, "stream opened");

        let (sender, receiver) = (self.codecs)();
        PeerChannel::establish(stream, peer, sender, receiver, &self.config)
    }

    /// Publish the channel, announce it, then start its reader.
    fn activate(self: &Arc<Self>, channel: PeerChannel<S>, receiver: R) -> Result<()> {
        let channel = Arc::new(channel);
        let _transition = self.lock_transition();
        if self.is_shutting_down() {
            channel.close();
            return Err(PeerError::ShutDown);
        }

        let peer = channel.peer().clone();
        self.channel.store(Some(Arc::clone(&channel)));
        self.state.swap(ConnectionState::Connected);
        info!(peer = %peer, role = %self.role, "connected");
        self.dispatcher.enqueue(Event::Connected(peer));

        let shared = Arc::clone(self);
        let reader_channel = Arc::clone(&channel);
        let spawned = thread::Builder::new()
            .name(self.config.thread_name("reader"))
            .spawn(move || shared.read_loop(reader_channel, receiver));
        match spawned {
            Ok(handle) => {
                *lock(&self.reader) = Some(handle);
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "failed to start reader");
                self.finish_locked(&channel);
                Err(PeerError::Spawn(err))
            }
        }
    }

    fn read_loop(self: Arc<Self>, channel: Arc<PeerChannel<S>>, mut receiver: R) {
        debug!(peer = %channel.peer(), "reader started");
        let dispatcher = &self.dispatcher;
        loop {
            match receiver.read_next(&mut |message| dispatcher.enqueue(Event::Message(message))) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(peer = %channel.peer(), "stream ended");
                    break;
                }
                Err(err) => {
                    if channel.is_open() {
                        warn!(peer = %channel.peer(), error = %err, "read failed");
                    } else {
                        debug!(peer = %channel.peer(), error = %err, "read stopped after close");
                    }
                    break;
                }
            }
        }
        let _transition = self.lock_transition();
        self.finish_locked(&channel);
    }

    /// Retire `channel`. Caller holds the transition lock.
    fn finish_locked(&self, channel: &Arc<PeerChannel<S>>) {
        channel.close();
        let current = self.channel.load_full();
        if current
            .as_ref()
            .is_some_and(|active| Arc::ptr_eq(active, channel))
        {
            self.channel.store(None);
        }
        self.state.swap(ConnectionState::Disconnected);
        info!(peer = %channel.peer(), "disconnected");
        self.dispatcher
            .enqueue(Event::Disconnected(channel.peer().clone()));
    }

    fn fail_channel(&self, channel: &Arc<PeerChannel<S>>) {
        let _transition = self.lock_transition();
        let current = self.channel.load_full();
        if current
            .as_ref()
            .is_some_and(|active| Arc::ptr_eq(active, channel))
        {
            self.state
                .transition(ConnectionState::Connected, ConnectionState::Disconnecting);
        }
        channel.close();
    }

    fn accept_loop(self: &Arc<Self>, commands: &Receiver<Command>) {
        info!(identifier = %self.identifier, "accept loop started");
        while !self.is_shutting_down() {
            match self.accept_once() {
                Ok(()) => self.join_reader(),
                Err(_) if self.is_shutting_down() => break,
                Err(err) => {
                    let delay = self.config.accept_retry_delay;
                    warn!(error = %err, ?delay, "accept failed; retrying");
                    if wait_for_shutdown(commands, delay) {
                        break;
                    }
                }
            }
        }
        self.listening.store(false, Ordering::Release);
        info!(identifier = %self.identifier, "accept loop stopped");
    }

    /// Listen, accept one stream and activate it. The listening endpoint is
    /// closed before the channel goes live.
    fn accept_once(self: &Arc<Self>) -> Result<()> {
        let acceptor: Arc<dyn PeerAcceptor> = Arc::from(self.directory.listen(&self.identifier)?);
        {
            let _transition = self.lock_transition();
            if self.is_shutting_down() {
                acceptor.close();
                return Err(PeerError::ShutDown);
            }
            *lock(&self.acceptor) = Some(Arc::clone(&acceptor));
        }

        debug!(identifier = %self.identifier, "waiting for peer");
        let accepted = acceptor.accept();
        acceptor.close();
        lock(&self.acceptor).take();
        let (stream, peer) = accepted?;

        self.state.swap(ConnectionState::Connecting);
        debug!(peer = %peer, "accepted stream");
        let (sender, receiver) = (self.codecs)();
        let established = PeerChannel::establish(stream, peer, sender, receiver, &self.config)
            .and_then(|(channel, receiver)| self.activate(channel, receiver));
        if established.is_err() {
            self.state.swap(ConnectionState::Disconnected);
        }
        established
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn join_thread(handle: JoinHandle<()>, what: &'static str) {
    if handle.thread().id() == thread::current().id() {
        return;
    }
    if handle.join().is_err() {
        error!(thread = what, "thread panicked");
    }
}

/// Sleep up to `delay`; true if shutdown was requested meanwhile.
fn wait_for_shutdown(commands: &Receiver<Command>, delay: Duration) -> bool {
    match commands.recv_timeout(delay) {
        Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => true,
        Ok(_) | Err(RecvTimeoutError::Timeout) => false,
    }
}
